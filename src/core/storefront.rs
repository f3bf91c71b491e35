//! Cart and favorites bound to one session and one active user.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    core::{
        cart::CartStore,
        favorites::FavoritesStore,
        partition::MergeOutcome,
        store::StoreError,
    },
    line::CartLineDraft,
    op::StoredOp,
    types::UserKey,
};

/// Merge statistics for both stores after a login.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginMerge {
    /// Cart lines folded into the user.
    pub cart: MergeOutcome,
    /// Favorite ids folded into the user.
    pub favorites: MergeOutcome,
}

/// Cart and favorites stores that always share one active user.
///
/// Constructed once per application and handed to whatever needs it. The
/// stores are only reachable read-only; writes go through the scoped methods
/// below, and only [`set_active_user`](Self::set_active_user),
/// [`merge_into_user`](Self::merge_into_user) and
/// [`reset_to_guest`](Self::reset_to_guest) change the active user.
#[derive(Debug, Clone, Default)]
pub struct Storefront {
    cart: CartStore,
    favorites: FavoritesStore,
}

impl Storefront {
    /// Binds two stores. Favorites follow the cart's active user if they differ.
    pub fn new(cart: CartStore, mut favorites: FavoritesStore) -> Self {
        let active = cart.active_user().clone();
        if favorites.active_user() != &active {
            info!(
                cart_user = %active,
                favorites_user = %favorites.active_user(),
                "aligning favorites to the cart's active user"
            );
            favorites.set_active_user(active);
        }
        Self { cart, favorites }
    }

    /// Read-only cart store.
    pub fn cart(&self) -> &CartStore {
        &self.cart
    }

    /// Read-only favorites store.
    pub fn favorites(&self) -> &FavoritesStore {
        &self.favorites
    }

    /// Key shared by both stores.
    pub fn active_user(&self) -> &UserKey {
        self.cart.active_user()
    }

    /// See [`CartStore::upsert_line`].
    pub fn upsert_line(&mut self, draft: CartLineDraft) -> Result<u32, StoreError> {
        self.cart.upsert_line(draft)
    }

    /// See [`CartStore::remove_line`].
    pub fn remove_line(&mut self, product_id: &str) -> bool {
        self.cart.remove_line(product_id)
    }

    /// See [`CartStore::set_quantity`].
    pub fn set_quantity(&mut self, product_id: &str, quantity: u32) -> Result<bool, StoreError> {
        self.cart.set_quantity(product_id, quantity)
    }

    /// Empties the active cart.
    pub fn clear_cart(&mut self) -> usize {
        self.cart.clear()
    }

    /// See [`FavoritesStore::toggle`].
    pub fn toggle_favorite(&mut self, product_id: &str) -> bool {
        self.favorites.toggle(product_id)
    }

    /// Empties the active favorites set.
    pub fn clear_favorites(&mut self) -> usize {
        self.favorites.clear()
    }

    /// Takes pending ops from both stores as `(cart, favorites)`.
    pub fn drain_pending_ops(&mut self) -> (Vec<StoredOp>, Vec<StoredOp>) {
        (self.cart.drain_pending_ops(), self.favorites.drain_pending_ops())
    }

    /// Switches both stores to `user`, without merging.
    pub fn set_active_user(&mut self, user: UserKey) {
        self.cart.set_active_user(user.clone());
        self.favorites.set_active_user(user);
    }

    /// Login: folds guest cart and guest favorites into `user` and activates it.
    pub fn merge_into_user(&mut self, user: UserKey) -> Result<LoginMerge, StoreError> {
        if user.is_guest() {
            return Err(StoreError::GuestMergeTarget);
        }
        let cart = self.cart.merge_into_user(user.clone())?;
        let favorites = self.favorites.merge_into_user(user.clone())?;
        info!(
            user = %user,
            cart_moved = cart.moved,
            favorites_moved = favorites.moved,
            "guest session merged on login"
        );
        Ok(LoginMerge { cart, favorites })
    }

    /// Logout: guest becomes active in both stores; no partition is cleared.
    pub fn reset_to_guest(&mut self) {
        self.cart.reset_to_guest();
        self.favorites.reset_to_guest();
    }

    /// Splits into the two stores, e.g. for persistence.
    pub fn into_parts(self) -> (CartStore, FavoritesStore) {
        (self.cart, self.favorites)
    }
}
