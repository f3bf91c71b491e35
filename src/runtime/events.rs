//! Runtime event stream payloads.

use crate::{
    core::storefront::LoginMerge,
    types::{OpSeq, UserKey},
};

/// Events emitted from the single-writer runtime loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// The active cart changed.
    CartChanged {
        /// Runtime revision after the change.
        revision: OpSeq,
    },
    /// The active favorites set changed.
    FavoritesChanged {
        /// Runtime revision after the change.
        revision: OpSeq,
    },
    /// Both stores now point at a different partition.
    ActiveUserChanged {
        /// Newly active key.
        user: UserKey,
    },
    /// A guest session was folded into a user on login.
    Merged {
        /// Receiving user.
        user: UserKey,
        /// Merge statistics.
        merge: LoginMerge,
    },
    /// Storage holds every change up to this revision.
    DurableUpTo {
        /// Highest revision written.
        revision: OpSeq,
    },
    /// A storage write failed. In-memory state is unaffected.
    PersistFailed {
        /// Error description.
        message: String,
    },
}
