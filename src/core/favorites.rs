//! Favorites partitions: product id sets, merged by union.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    core::{
        partition::{MergeOutcome, PartitionKind},
        store::PartitionedStore,
    },
    op::Op,
    types::ProductId,
};

/// Marker for the favorites instantiation of [`PartitionedStore`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Favorites;

/// Store holding one favorites set per user.
pub type FavoritesStore = PartitionedStore<Favorites>;

/// One user's favorites; a set that keeps insertion order for display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FavoritesPartition {
    ids: Vec<ProductId>,
}

impl FavoritesPartition {
    /// Ids in insertion order.
    pub fn ids(&self) -> &[ProductId] {
        &self.ids
    }

    /// Membership test.
    pub fn contains(&self, product_id: &str) -> bool {
        self.ids.iter().any(|id| id == product_id)
    }

    /// `true` when no id is stored.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Returns false if the id was already present.
    fn insert(&mut self, product_id: ProductId) -> bool {
        if self.contains(&product_id) {
            return false;
        }
        self.ids.push(product_id);
        true
    }
}

impl FromIterator<ProductId> for FavoritesPartition {
    fn from_iter<I: IntoIterator<Item = ProductId>>(iter: I) -> Self {
        let mut partition = Self::default();
        for id in iter {
            partition.insert(id);
        }
        partition
    }
}

impl PartitionKind for Favorites {
    type Partition = FavoritesPartition;

    const NAME: &'static str = "favorites";
    const LEGACY_FIELD: &'static str = "favorites";

    fn len(partition: &FavoritesPartition) -> usize {
        partition.ids.len()
    }

    fn merge(into: &mut FavoritesPartition, from: FavoritesPartition) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        for id in from.ids {
            outcome.moved += 1;
            if !into.insert(id) {
                outcome.conflicts += 1;
            }
        }
        outcome
    }

    fn decode_lenient(value: &serde_json::Value) -> FavoritesPartition {
        let Some(items) = value.as_array() else {
            if !value.is_null() {
                warn!(kind = Self::NAME, "partition is not an array; treating as empty");
            }
            return FavoritesPartition::default();
        };

        items
            .iter()
            .filter_map(|item| match item {
                serde_json::Value::String(id) if !id.is_empty() => Some(id.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                other => {
                    warn!(kind = Self::NAME, value = %other, "dropping unreadable favorite id");
                    None
                }
            })
            .collect()
    }
}

impl PartitionedStore<Favorites> {
    /// Adds `product_id` if absent, removes it if present. Returns whether it
    /// is present afterwards.
    pub fn toggle(&mut self, product_id: &str) -> bool {
        let user = self.active_user().clone();
        let partition = self.active_partition_mut();
        let present = match partition.ids.iter().position(|id| id == product_id) {
            Some(pos) => {
                partition.ids.remove(pos);
                false
            }
            None => {
                partition.ids.push(product_id.to_string());
                true
            }
        };

        self.record(Op::FavoriteToggled {
            user,
            product_id: product_id.to_string(),
            present,
        });
        present
    }

    /// Membership in the active user's favorites.
    pub fn contains(&self, product_id: &str) -> bool {
        self.active_partition().contains(product_id)
    }

    /// The active user's favorites in insertion order.
    pub fn ids(&self) -> &[ProductId] {
        self.active_partition().ids()
    }
}
