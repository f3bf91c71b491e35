//! The per-kind half of the identity-partitioned store.
//!
//! A [`PartitionKind`] names the data held for one user and the rule used to
//! fold a guest partition into a user partition. The store itself
//! ([`crate::core::store::PartitionedStore`]) is shared by every kind.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

/// Counts reported by a merge-on-login.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    /// Guest elements folded into the user partition.
    pub moved: usize,
    /// Of those, elements whose key already existed on the user side.
    pub conflicts: usize,
}

/// Partition shape plus merge rule.
pub trait PartitionKind: Send + Sync + 'static {
    /// Data held for one user.
    type Partition: Debug + Clone + Default + PartialEq + Serialize + Send + Sync;

    /// Short name used in logs and diagnostics.
    const NAME: &'static str;
    /// Field holding the partition in the pre-partitioning flat layout.
    const LEGACY_FIELD: &'static str;

    /// Number of elements (lines or ids) in `partition`.
    fn len(partition: &Self::Partition) -> usize;

    /// Folds `from` into `into`. Must be deterministic.
    fn merge(into: &mut Self::Partition, from: Self::Partition) -> MergeOutcome;

    /// Best-effort decode of a persisted partition. Elements that cannot be
    /// read are dropped, and the per-partition invariants are restored.
    fn decode_lenient(value: &serde_json::Value) -> Self::Partition;
}
