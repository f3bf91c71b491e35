//! Mutation records kept for diagnostics and change notification.

use serde::{Deserialize, Serialize};

use crate::{
    core::partition::MergeOutcome,
    types::{OpSeq, ProductId, UserKey},
};

/// One applied store mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Op {
    /// Active partition switched.
    ActiveUserSet {
        /// Previously active key.
        prev: UserKey,
        /// Newly active key.
        user: UserKey,
    },
    /// A cart line was appended or its quantity incremented.
    LineUpserted {
        /// Partition owner.
        user: UserKey,
        /// Product id of the line.
        product_id: ProductId,
        /// Units added by this call.
        added: u32,
        /// Resulting quantity.
        quantity: u32,
    },
    /// A cart line was deleted.
    LineRemoved {
        /// Partition owner.
        user: UserKey,
        /// Product id of the removed line.
        product_id: ProductId,
    },
    /// A cart line quantity was overwritten.
    QuantitySet {
        /// Partition owner.
        user: UserKey,
        /// Product id of the line.
        product_id: ProductId,
        /// Quantity before the change.
        prev: u32,
        /// Quantity after the change.
        quantity: u32,
    },
    /// A favorite id was added or removed.
    FavoriteToggled {
        /// Partition owner.
        user: UserKey,
        /// Toggled product id.
        product_id: ProductId,
        /// Whether the id is present after the toggle.
        present: bool,
    },
    /// The active partition was emptied.
    Cleared {
        /// Partition owner.
        user: UserKey,
        /// Number of elements removed.
        removed: usize,
    },
    /// The guest partition was folded into a user partition.
    Merged {
        /// Receiving user.
        user: UserKey,
        /// Merge statistics.
        outcome: MergeOutcome,
    },
}

impl Op {
    /// Partition owner the op applied to (the new key for [`Op::ActiveUserSet`]).
    pub fn user(&self) -> &UserKey {
        match self {
            Op::ActiveUserSet { user, .. }
            | Op::LineUpserted { user, .. }
            | Op::LineRemoved { user, .. }
            | Op::QuantitySet { user, .. }
            | Op::FavoriteToggled { user, .. }
            | Op::Cleared { user, .. }
            | Op::Merged { user, .. } => user,
        }
    }
}

/// Op plus sequence metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOp {
    /// Per-store monotonic sequence.
    pub seq: OpSeq,
    /// Wall-clock time in milliseconds.
    pub ts_ms: u64,
    /// Operation body.
    pub op: Op,
}
