//! Persisted document layout and migration from older layouts.
//!
//! Current layout, one document per store:
//!
//! ```json
//! { "schemaVersion": 2, "activeUserKey": "guest", "partitions": { "guest": [] } }
//! ```
//!
//! Older documents hold a single unpartitioned list under the kind's legacy
//! field (`{"items": [...]}` for carts, `{"favorites": [...]}` for favorites),
//! optionally wrapped as `{"state": {...}, "version": 0}`. Those migrate into
//! the guest partition. Decoding never fails: anything unreadable yields the
//! initial state.

use std::collections::{BTreeMap, btree_map::Entry};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::{
    core::{partition::PartitionKind, store::StoreSnapshot},
    types::UserKey,
};

use super::PersistResult;

/// Version written by [`encode`].
pub const SCHEMA_VERSION: u32 = 2;

/// Which layout a document was recognized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedLayout {
    /// Nothing stored yet.
    Missing,
    /// Partitioned layout at or below [`SCHEMA_VERSION`].
    Current,
    /// Partitioned layout written by a newer version; read best-effort.
    Newer(u32),
    /// Flat pre-partitioning layout, migrated into the guest partition.
    Legacy,
    /// Could not be read; replaced by the initial state.
    Unreadable,
}

/// Result of [`decode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded<P> {
    /// Reconstructed store contents.
    pub snapshot: StoreSnapshot<P>,
    /// Layout the document was recognized as.
    pub layout: DetectedLayout,
}

impl<P> Decoded<P> {
    fn initial(layout: DetectedLayout) -> Self {
        Self {
            snapshot: StoreSnapshot::initial(),
            layout,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PersistedStateRef<'a, P> {
    schema_version: u32,
    active_user_key: &'a UserKey,
    partitions: &'a BTreeMap<UserKey, P>,
}

/// Serializes a snapshot in the current layout.
pub fn encode<P: Serialize>(snapshot: &StoreSnapshot<P>) -> PersistResult<String> {
    let doc = PersistedStateRef {
        schema_version: SCHEMA_VERSION,
        active_user_key: &snapshot.active_user_key,
        partitions: &snapshot.partitions,
    };
    Ok(serde_json::to_string(&doc)?)
}

/// Reads a stored document, migrating older layouts.
pub fn decode<K: PartitionKind>(raw: Option<&str>) -> Decoded<K::Partition> {
    let Some(raw) = raw else {
        return Decoded::initial(DetectedLayout::Missing);
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => decode_value::<K>(value),
        Err(err) => {
            warn!(kind = K::NAME, error = %err, "persisted state is not valid JSON; starting empty");
            Decoded::initial(DetectedLayout::Unreadable)
        }
    }
}

/// Same as [`decode`] for an already-parsed document.
pub fn decode_value<K: PartitionKind>(value: Value) -> Decoded<K::Partition> {
    let Value::Object(mut doc) = value else {
        warn!(kind = K::NAME, "persisted state is not an object; starting empty");
        return Decoded::initial(DetectedLayout::Unreadable);
    };

    if !doc.contains_key("partitions") && !doc.contains_key(K::LEGACY_FIELD) {
        if let Some(Value::Object(inner)) = doc.remove("state") {
            doc = inner;
        }
    }

    if let Some(partitions) = doc.get("partitions") {
        let Some(partitions) = partitions.as_object() else {
            warn!(kind = K::NAME, "partitions field is not an object; starting empty");
            return Decoded::initial(DetectedLayout::Unreadable);
        };
        return decode_partitioned::<K>(&doc, partitions);
    }

    if let Some(flat) = doc.get(K::LEGACY_FIELD) {
        let guest = K::decode_lenient(flat);
        info!(
            kind = K::NAME,
            len = K::len(&guest),
            "migrated flat layout into the guest partition"
        );
        let mut snapshot = StoreSnapshot::initial();
        snapshot.partitions.insert(UserKey::guest(), guest);
        return Decoded {
            snapshot,
            layout: DetectedLayout::Legacy,
        };
    }

    warn!(kind = K::NAME, "unrecognized persisted layout; starting empty");
    Decoded::initial(DetectedLayout::Unreadable)
}

fn decode_partitioned<K: PartitionKind>(
    doc: &Map<String, Value>,
    partitions: &Map<String, Value>,
) -> Decoded<K::Partition> {
    let layout = match doc.get("schemaVersion").and_then(Value::as_u64) {
        Some(v) if v > u64::from(SCHEMA_VERSION) => {
            let v = u32::try_from(v).unwrap_or(u32::MAX);
            warn!(kind = K::NAME, schema_version = v, "reading newer schema best-effort");
            DetectedLayout::Newer(v)
        }
        _ => DetectedLayout::Current,
    };

    let active_user_key = doc
        .get("activeUserKey")
        .and_then(Value::as_str)
        .map_or_else(UserKey::guest, UserKey::new);

    let mut out = BTreeMap::new();
    for (user, value) in partitions {
        let partition = K::decode_lenient(value);
        match out.entry(UserKey::new(user.as_str())) {
            Entry::Vacant(slot) => {
                slot.insert(partition);
            }
            // "" and "guest" both map to the guest key.
            Entry::Occupied(mut slot) => {
                K::merge(slot.get_mut(), partition);
            }
        }
    }

    Decoded {
        snapshot: StoreSnapshot {
            active_user_key,
            partitions: out,
        },
        layout,
    }
}
