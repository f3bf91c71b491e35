//! Session binding: turns auth-state changes into store commands.
//!
//! The auth collaborator resolves an identity first; only then does the
//! binder issue a single merge (sign-in) or reset (sign-out) command.

use std::fmt::Display;
use std::future::Future;

use tracing::{info, warn};

use crate::types::UserKey;

use super::handle::{RuntimeError, StorefrontHandle};

/// Resolved authentication state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// An authenticated user.
    SignedIn(UserKey),
    /// No authenticated user.
    SignedOut,
}

impl AuthState {
    /// `SignedOut` for an absent, empty or guest id.
    pub fn from_user_id(id: Option<&str>) -> Self {
        let user = UserKey::from_session(id);
        if user.is_guest() {
            Self::SignedOut
        } else {
            Self::SignedIn(user)
        }
    }
}

/// Applies auth-state changes to a running storefront.
#[derive(Clone)]
pub struct SessionBinder {
    handle: StorefrontHandle,
}

impl SessionBinder {
    /// Binder issuing commands through `handle`.
    pub fn new(handle: StorefrontHandle) -> Self {
        Self { handle }
    }

    /// Sign-in merges the guest session into the user; sign-out returns to
    /// guest. Returns the key now active.
    pub async fn apply(&self, state: AuthState) -> Result<UserKey, RuntimeError> {
        match state {
            AuthState::SignedIn(user) => {
                let merge = self.handle.merge_into_user(user.clone()).await?;
                info!(
                    user = %user,
                    cart_moved = merge.cart.moved,
                    favorites_moved = merge.favorites.moved,
                    "session bound to user"
                );
                Ok(user)
            }
            AuthState::SignedOut => {
                self.handle.reset_to_guest().await?;
                info!("session bound to guest");
                Ok(UserKey::guest())
            }
        }
    }

    /// Awaits `identity` to completion, then applies the result. A failed
    /// resolution is treated as signed out.
    pub async fn resolve<F, E>(&self, identity: F) -> Result<UserKey, RuntimeError>
    where
        F: Future<Output = Result<Option<String>, E>>,
        E: Display,
    {
        let state = match identity.await {
            Ok(id) => AuthState::from_user_id(id.as_deref()),
            Err(err) => {
                warn!(error = %err, "identity resolution failed; continuing as guest");
                AuthState::SignedOut
            }
        };
        self.apply(state).await
    }
}
