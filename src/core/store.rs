//! Generic identity-partitioned store shared by the cart and favorites kinds.

use std::collections::{BTreeMap, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};

use hashbrown::HashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::{
    core::partition::{MergeOutcome, PartitionKind},
    op::{Op, StoredOp},
    types::{OpSeq, ProductId, UserKey},
};

/// Recent ops retained for diagnostics unless configured otherwise.
pub const DEFAULT_RECENT_OPS: usize = 32;

/// Rejected store operation. The store is unchanged when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// `set_quantity` was given a quantity below 1.
    #[error("quantity must be at least 1, got {0}")]
    InvalidQuantity(u32),
    /// A cart line was offered with a price below zero.
    #[error("unit price must not be negative, got {0}")]
    NegativePrice(Decimal),
    /// The line's quantity or the cart total would no longer be representable.
    #[error("cart total would overflow after changing {0}")]
    AmountOverflow(ProductId),
    /// `merge_into_user` was called with the guest key.
    #[error("the guest partition cannot be a merge target")]
    GuestMergeTarget,
}

/// Full contents of one store: what the durable cache writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot<P> {
    /// Key of the active partition.
    pub active_user_key: UserKey,
    /// Every materialized partition.
    pub partitions: BTreeMap<UserKey, P>,
}

impl<P> StoreSnapshot<P> {
    /// No partitions, guest active.
    pub fn initial() -> Self {
        Self {
            active_user_key: UserKey::guest(),
            partitions: BTreeMap::new(),
        }
    }
}

impl<P> Default for StoreSnapshot<P> {
    fn default() -> Self {
        Self::initial()
    }
}

/// Partition map keyed by user, with a single active key.
///
/// Every read and write goes to the active partition. Only
/// [`set_active_user`](Self::set_active_user), [`merge_into_user`](Self::merge_into_user)
/// and [`reset_to_guest`](Self::reset_to_guest) name a user.
#[derive(Debug, Clone)]
pub struct PartitionedStore<K: PartitionKind> {
    partitions: HashMap<UserKey, K::Partition>,
    active: UserKey,
    empty: K::Partition,
    pending_ops: Vec<StoredOp>,
    recent_ops: VecDeque<StoredOp>,
    recent_capacity: usize,
    next_op_seq: OpSeq,
}

impl<K: PartitionKind> Default for PartitionedStore<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: PartitionKind> PartitionedStore<K> {
    /// Empty store with guest active.
    pub fn new() -> Self {
        Self::with_recent_capacity(DEFAULT_RECENT_OPS)
    }

    /// Like [`new`](Self::new), keeping `recent_capacity` recent ops for diagnostics.
    pub fn with_recent_capacity(recent_capacity: usize) -> Self {
        Self {
            partitions: HashMap::new(),
            active: UserKey::guest(),
            empty: K::Partition::default(),
            pending_ops: Vec::new(),
            recent_ops: VecDeque::with_capacity(recent_capacity),
            recent_capacity,
            next_op_seq: 1,
        }
    }

    /// Rebuilds a store from persisted contents. No ops are recorded.
    pub fn from_snapshot(snapshot: StoreSnapshot<K::Partition>, recent_capacity: usize) -> Self {
        let mut store = Self::with_recent_capacity(recent_capacity);
        store.active = snapshot.active_user_key;
        store.partitions.extend(snapshot.partitions);
        store
    }

    /// Copies out the partitions and active key for persistence.
    pub fn export_snapshot(&self) -> StoreSnapshot<K::Partition> {
        StoreSnapshot {
            active_user_key: self.active.clone(),
            partitions: self
                .partitions
                .iter()
                .map(|(user, partition)| (user.clone(), partition.clone()))
                .collect(),
        }
    }

    /// Key of the partition every read and write goes to.
    pub fn active_user(&self) -> &UserKey {
        &self.active
    }

    /// Points the store at `user`'s partition. Partition contents are untouched.
    pub fn set_active_user(&mut self, user: UserKey) {
        if self.active == user {
            return;
        }
        let prev = std::mem::replace(&mut self.active, user.clone());
        self.record(Op::ActiveUserSet { prev, user });
    }

    /// Logout: guest becomes active. Neither partition is cleared.
    pub fn reset_to_guest(&mut self) {
        self.set_active_user(UserKey::guest());
    }

    /// The active partition, or an empty one if it was never written.
    pub fn active_partition(&self) -> &K::Partition {
        self.partitions.get(&self.active).unwrap_or(&self.empty)
    }

    /// Empties the active partition and returns how many elements it held.
    pub fn clear(&mut self) -> usize {
        let Some(partition) = self.partitions.get_mut(&self.active) else {
            return 0;
        };
        let removed = K::len(partition);
        if removed == 0 {
            return 0;
        }
        *partition = K::Partition::default();
        let user = self.active.clone();
        self.record(Op::Cleared { user, removed });
        removed
    }

    /// Folds the guest partition into `user`'s, empties guest, and activates `user`.
    ///
    /// Runs as one call, so no caller can observe a merged user partition next
    /// to a guest partition that still holds the merged data.
    pub fn merge_into_user(&mut self, user: UserKey) -> Result<MergeOutcome, StoreError> {
        if user.is_guest() {
            return Err(StoreError::GuestMergeTarget);
        }

        let guest = std::mem::take(self.partitions.entry(UserKey::guest()).or_default());
        let target = self.partitions.entry(user.clone()).or_default();
        let outcome = K::merge(target, guest);
        self.active = user.clone();

        debug!(
            kind = K::NAME,
            user = %user,
            moved = outcome.moved,
            conflicts = outcome.conflicts,
            "merged guest partition"
        );
        self.record(Op::Merged { user, outcome });
        Ok(outcome)
    }

    /// Number of materialized partitions, empty ones included.
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Takes the ops recorded since the last drain.
    pub fn drain_pending_ops(&mut self) -> Vec<StoredOp> {
        std::mem::take(&mut self.pending_ops)
    }

    /// True if ops were recorded since the last drain.
    pub fn has_pending_ops(&self) -> bool {
        !self.pending_ops.is_empty()
    }

    /// Most recent ops, oldest first.
    pub fn recent_ops(&self) -> impl Iterator<Item = &StoredOp> {
        self.recent_ops.iter()
    }

    /// Sequence of the last recorded op, 0 if none.
    pub fn latest_op_seq(&self) -> OpSeq {
        self.next_op_seq.saturating_sub(1)
    }

    pub(crate) fn partitions(&self) -> impl Iterator<Item = (&UserKey, &K::Partition)> {
        self.partitions.iter()
    }

    /// Active partition, materialized as empty on first write.
    pub(crate) fn active_partition_mut(&mut self) -> &mut K::Partition {
        self.partitions.entry(self.active.clone()).or_default()
    }

    /// Active partition only if it already exists.
    pub(crate) fn existing_active_partition_mut(&mut self) -> Option<&mut K::Partition> {
        self.partitions.get_mut(&self.active)
    }

    pub(crate) fn record(&mut self, op: Op) -> OpSeq {
        let seq = self.next_op_seq;
        self.next_op_seq += 1;
        let stored = StoredOp {
            seq,
            ts_ms: now_ms(),
            op,
        };
        if self.recent_capacity > 0 {
            if self.recent_ops.len() == self.recent_capacity {
                self.recent_ops.pop_front();
            }
            self.recent_ops.push_back(stored.clone());
        }
        self.pending_ops.push(stored);
        seq
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
