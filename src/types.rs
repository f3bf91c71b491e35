//! Shared primitive identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Product identifier as issued by the catalog.
pub type ProductId = String;
/// Monotonic mutation sequence number.
pub type OpSeq = u64;

/// Literal key reserved for the unauthenticated partition.
pub const GUEST: &str = "guest";

/// Identity that owns a partition: an authenticated user id or the guest sentinel.
///
/// A `UserKey` is never empty; an empty id is treated as guest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct UserKey(String);

impl UserKey {
    /// Builds a key from an opaque user id, mapping an empty id to guest.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        if id.is_empty() { Self::guest() } else { Self(id) }
    }

    /// The guest sentinel key.
    pub fn guest() -> Self {
        Self(GUEST.to_string())
    }

    /// Maps an optional session id to a key; absent ids resolve to guest.
    pub fn from_session(id: Option<&str>) -> Self {
        id.map_or_else(Self::guest, Self::new)
    }

    /// True for the guest sentinel.
    pub fn is_guest(&self) -> bool {
        self.0 == GUEST
    }

    /// Borrows the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UserKey {
    fn default() -> Self {
        Self::guest()
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for UserKey {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for UserKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<UserKey> for String {
    fn from(value: UserKey) -> Self {
        value.0
    }
}
