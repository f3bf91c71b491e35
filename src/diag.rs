//! Read-only introspection over the stores.
//!
//! Reports are plain data, so they can be logged or serialized without
//! handing out access to the partitions themselves.

use serde::Serialize;

use crate::{
    core::{
        partition::PartitionKind,
        store::PartitionedStore,
        storefront::Storefront,
    },
    op::StoredOp,
    types::{OpSeq, UserKey},
};

/// Size of one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionSummary {
    /// Partition owner.
    pub user: UserKey,
    /// Number of lines or ids held.
    pub len: usize,
}

/// Snapshot of one store's shape and recent activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionReport {
    /// Store kind, e.g. `"cart"`.
    pub kind: &'static str,
    /// Active partition owner.
    pub active_user: UserKey,
    /// Every materialized partition, ordered by user key.
    pub partitions: Vec<PartitionSummary>,
    /// Sequence of the last recorded op.
    pub latest_op_seq: OpSeq,
    /// Recent ops, oldest first.
    pub recent_ops: Vec<StoredOp>,
}

/// Reports for both stores plus persistence state, when known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorefrontReport {
    /// Cart store report.
    pub cart: PartitionReport,
    /// Favorites store report.
    pub favorites: PartitionReport,
    /// Highest revision confirmed written to storage.
    pub durable_revision: Option<OpSeq>,
    /// Most recent storage failure, if any write has failed.
    pub last_persist_error: Option<String>,
}

/// Diagnostic view of a store.
pub trait Inspect {
    /// Output of [`Inspect::report`].
    type Report;

    /// Builds a report without mutating the store.
    fn report(&self) -> Self::Report;
}

impl<K: PartitionKind> Inspect for PartitionedStore<K> {
    type Report = PartitionReport;

    fn report(&self) -> PartitionReport {
        let mut partitions: Vec<PartitionSummary> = self
            .partitions()
            .map(|(user, partition)| PartitionSummary {
                user: user.clone(),
                len: K::len(partition),
            })
            .collect();
        partitions.sort_by(|a, b| a.user.cmp(&b.user));

        PartitionReport {
            kind: K::NAME,
            active_user: self.active_user().clone(),
            partitions,
            latest_op_seq: self.latest_op_seq(),
            recent_ops: self.recent_ops().cloned().collect(),
        }
    }
}

impl Inspect for Storefront {
    type Report = StorefrontReport;

    fn report(&self) -> StorefrontReport {
        StorefrontReport {
            cart: self.cart().report(),
            favorites: self.favorites().report(),
            durable_revision: None,
            last_persist_error: None,
        }
    }
}

impl PartitionReport {
    /// Length of `user`'s partition, if materialized.
    pub fn partition_len(&self, user: &UserKey) -> Option<usize> {
        self.partitions
            .iter()
            .find(|summary| &summary.user == user)
            .map(|summary| summary.len)
    }
}
