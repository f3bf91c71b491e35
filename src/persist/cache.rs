//! Typed load/save of one store under one storage key.

use std::marker::PhantomData;

use tracing::{debug, warn};

use crate::{
    config::{ConfigError, StoreConfig},
    core::{
        cart::Cart,
        favorites::Favorites,
        partition::PartitionKind,
        store::{DEFAULT_RECENT_OPS, PartitionedStore},
        storefront::Storefront,
    },
};

use super::{KvStorage, PersistResult, layout};

/// Binds a [`PartitionKind`] to the storage key its document lives under.
#[derive(Debug, Clone)]
pub struct DurableCache<K> {
    key: String,
    recent_ops_capacity: usize,
    _kind: PhantomData<fn() -> K>,
}

impl<K: PartitionKind> DurableCache<K> {
    /// Cache for the document stored under `key`.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            recent_ops_capacity: DEFAULT_RECENT_OPS,
            _kind: PhantomData,
        }
    }

    /// Capacity of the recent-ops ring on stores built by [`load`](Self::load).
    pub fn with_recent_ops(mut self, capacity: usize) -> Self {
        self.recent_ops_capacity = capacity;
        self
    }

    /// Storage key of the document.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Rebuilds the store from storage. Never fails: read errors and
    /// unreadable documents fall back to the initial state.
    pub fn load(&self, storage: &dyn KvStorage) -> PartitionedStore<K> {
        let raw = match storage.get(&self.key) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(kind = K::NAME, key = %self.key, error = %err, "storage read failed; starting empty");
                None
            }
        };
        let decoded = layout::decode::<K>(raw.as_deref());
        debug!(
            kind = K::NAME,
            key = %self.key,
            layout = ?decoded.layout,
            partitions = decoded.snapshot.partitions.len(),
            "loaded persisted state"
        );
        PartitionedStore::from_snapshot(decoded.snapshot, self.recent_ops_capacity)
    }

    /// Serializes the full store in the current layout.
    pub fn encode(&self, store: &PartitionedStore<K>) -> PersistResult<String> {
        layout::encode(&store.export_snapshot())
    }

    /// Encodes the store and writes it under [`key`](Self::key).
    pub fn save(&self, storage: &mut dyn KvStorage, store: &PartitionedStore<K>) -> PersistResult<()> {
        let payload = self.encode(store)?;
        storage.set(&self.key, &payload)
    }
}

/// Caches for both stores, keyed per `config`.
///
/// # Errors
///
/// Returns `ConfigError` if `config` fails [`StoreConfig::validate`], e.g.
/// when both stores would share one storage key.
pub fn caches(config: &StoreConfig) -> Result<(DurableCache<Cart>, DurableCache<Favorites>), ConfigError> {
    config.validate()?;
    Ok((
        DurableCache::new(config.cart_key.clone()).with_recent_ops(config.recent_ops_capacity),
        DurableCache::new(config.favorites_key.clone()).with_recent_ops(config.recent_ops_capacity),
    ))
}

/// Loads both stores from `storage`.
///
/// # Errors
///
/// Returns `ConfigError` for an invalid `config`. Storage and decode failures
/// are not errors; they yield empty stores.
pub fn load_storefront(storage: &dyn KvStorage, config: &StoreConfig) -> Result<Storefront, ConfigError> {
    let (cart_cache, favorites_cache) = caches(config)?;
    Ok(Storefront::new(cart_cache.load(storage), favorites_cache.load(storage)))
}
