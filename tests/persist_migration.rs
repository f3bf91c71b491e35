use std::num::NonZeroU32;

use rust_decimal::Decimal;
use serde_json::{Value, json};

use cartstore::{
    config::StoreConfig,
    core::{
        cart::{Cart, CartStore},
        favorites::Favorites,
    },
    line::CartLineDraft,
    persist::{
        KvStorage,
        cache::{DurableCache, load_storefront},
        layout::{self, DetectedLayout, SCHEMA_VERSION},
        memory::MemoryKvStorage,
    },
    types::UserKey,
};

fn decode_cart(raw: &str) -> layout::Decoded<cartstore::core::cart::CartPartition> {
    layout::decode::<Cart>(Some(raw))
}

#[test]
fn flat_cart_migrates_into_the_guest_partition() {
    let decoded = decode_cart(r#"{"items":[{"id":"X","quantity":2,"price":10}]}"#);
    assert_eq!(decoded.layout, DetectedLayout::Legacy);
    assert!(decoded.snapshot.active_user_key.is_guest());

    let guest = &decoded.snapshot.partitions[&UserKey::guest()];
    assert_eq!(guest.lines().len(), 1);
    let line = &guest.lines()[0];
    assert_eq!(line.product_id, "X");
    assert_eq!(line.quantity, 2);
    assert_eq!(line.unit_price, Decimal::from(10));
    assert_eq!(line.title, "");
}

#[test]
fn persist_envelope_is_unwrapped() {
    let raw = json!({
        "state": { "items": [{ "id": "X", "title": "Mug", "price": "12.50", "quantity": 1 }] },
        "version": 0
    })
    .to_string();

    let decoded = decode_cart(&raw);
    assert_eq!(decoded.layout, DetectedLayout::Legacy);
    let guest = &decoded.snapshot.partitions[&UserKey::guest()];
    assert_eq!(guest.total(), Decimal::new(1250, 2));
}

#[test]
fn flat_favorites_migrate_into_the_guest_partition() {
    let raw = r#"{"state":{"favorites":["a","b","a",7]},"version":0}"#;
    let decoded = layout::decode::<Favorites>(Some(raw));
    assert_eq!(decoded.layout, DetectedLayout::Legacy);
    assert_eq!(
        decoded.snapshot.partitions[&UserKey::guest()].ids(),
        ["a", "b", "7"]
    );
}

#[test]
fn unreadable_lines_are_dropped_and_the_rest_kept() {
    let raw = json!({
        "items": [
            { "id": "ok", "price": 1, "quantity": 3 },
            { "id": "", "price": 1 },
            { "id": "neg", "price": -5 },
            { "price": 2 },
            "garbage",
            { "id": "zero", "price": 4, "quantity": 0 },
            { "id": "ok", "price": 1, "quantity": 2 }
        ]
    })
    .to_string();

    let decoded = decode_cart(&raw);
    let guest = &decoded.snapshot.partitions[&UserKey::guest()];
    let got: Vec<_> = guest
        .lines()
        .iter()
        .map(|l| (l.product_id.as_str(), l.quantity))
        .collect();
    assert_eq!(got, vec![("ok", 5), ("zero", 1)]);
}

#[test]
fn missing_or_malformed_documents_fall_back_to_initial_state() {
    let missing = layout::decode::<Cart>(None);
    assert_eq!(missing.layout, DetectedLayout::Missing);
    assert!(missing.snapshot.partitions.is_empty());

    for raw in ["not json", "[1,2,3]", r#"{"something":"else"}"#, r#"{"partitions":[]}"#] {
        let decoded = decode_cart(raw);
        assert_eq!(decoded.layout, DetectedLayout::Unreadable, "input: {raw}");
        assert!(decoded.snapshot.active_user_key.is_guest());
        assert!(decoded.snapshot.partitions.is_empty());
    }
}

#[test]
fn partitioned_document_without_active_key_defaults_to_guest() {
    let raw = json!({
        "schemaVersion": 2,
        "partitions": { "u1": [{ "productId": "p", "unitPrice": "1", "quantity": 1 }] }
    })
    .to_string();

    let decoded = decode_cart(&raw);
    assert_eq!(decoded.layout, DetectedLayout::Current);
    assert!(decoded.snapshot.active_user_key.is_guest());
    assert_eq!(decoded.snapshot.partitions[&UserKey::new("u1")].count(), 1);
}

#[test]
fn empty_and_guest_partition_keys_are_merged() {
    let raw = json!({
        "schemaVersion": 2,
        "activeUserKey": "",
        "partitions": {
            "": [{ "productId": "p", "unitPrice": "1", "quantity": 1 }],
            "guest": [{ "productId": "p", "unitPrice": "1", "quantity": 2 }]
        }
    })
    .to_string();

    let decoded = decode_cart(&raw);
    assert!(decoded.snapshot.active_user_key.is_guest());
    assert_eq!(decoded.snapshot.partitions.len(), 1);
    assert_eq!(decoded.snapshot.partitions[&UserKey::guest()].count(), 3);
}

#[test]
fn newer_schema_is_read_best_effort() {
    let raw = json!({
        "schemaVersion": SCHEMA_VERSION + 5,
        "activeUserKey": "u1",
        "partitions": { "u1": [{ "productId": "p", "unitPrice": "2", "quantity": 1, "giftWrap": true }] },
        "extra": {}
    })
    .to_string();

    let decoded = decode_cart(&raw);
    assert_eq!(decoded.layout, DetectedLayout::Newer(SCHEMA_VERSION + 5));
    assert_eq!(decoded.snapshot.active_user_key.as_str(), "u1");
    assert_eq!(decoded.snapshot.partitions[&UserKey::new("u1")].total(), Decimal::from(2));
}

#[test]
fn encoded_documents_carry_version_and_decode_to_the_same_state() {
    let mut cart = CartStore::new();
    cart.upsert_line(
        CartLineDraft::new("p1", "Lamp", Decimal::new(1999, 2))
            .with_images(vec!["lamp.jpg".to_string()])
            .with_quantity(NonZeroU32::new(2).expect("nonzero")),
    )
    .expect("upsert");
    cart.merge_into_user(UserKey::new("u1")).expect("merge");
    cart.reset_to_guest();
    cart.upsert_line(CartLineDraft::new("p2", "Cup", Decimal::from(4)))
        .expect("upsert");

    let cache = DurableCache::<Cart>::new("cart-storage");
    let encoded = cache.encode(&cart).expect("encode");

    let value: Value = serde_json::from_str(&encoded).expect("json");
    assert_eq!(value["schemaVersion"], json!(SCHEMA_VERSION));
    assert_eq!(value["activeUserKey"], json!("guest"));
    assert_eq!(value["partitions"]["u1"][0]["productId"], json!("p1"));

    let decoded = layout::decode::<Cart>(Some(&encoded));
    assert_eq!(decoded.layout, DetectedLayout::Current);
    assert_eq!(decoded.snapshot, cart.export_snapshot());
}

#[test]
fn cache_load_migrates_from_storage() {
    let storage = MemoryKvStorage::with_entries([
        (
            "cart-storage",
            r#"{"state":{"items":[{"id":"X","quantity":2,"price":10}]},"version":0}"#,
        ),
        ("favorites-storage", r#"{"state":{"favorites":["X"]},"version":0}"#),
    ]);

    let shop = load_storefront(&storage, &StoreConfig::default()).expect("config");
    assert!(shop.active_user().is_guest());
    assert_eq!(shop.cart().total(), Decimal::from(20));
    assert!(shop.favorites().contains("X"));
}

#[test]
fn cache_save_then_load_restores_partitions_and_active_user() {
    let mut storage = MemoryKvStorage::new();
    let cache = DurableCache::<Cart>::new("cart-storage");

    let mut cart = CartStore::new();
    cart.set_active_user(UserKey::new("u7"));
    cart.upsert_line(CartLineDraft::new("p", "Pen", Decimal::from(1)))
        .expect("upsert");
    cache.save(&mut storage, &cart).expect("save");

    let restored = cache.load(&storage);
    assert_eq!(restored.active_user().as_str(), "u7");
    assert_eq!(restored.count(), 1);
    assert_eq!(restored.export_snapshot(), cart.export_snapshot());
    assert!(!restored.has_pending_ops());

    storage.remove("cart-storage").expect("remove");
    assert_eq!(cache.load(&storage).partition_count(), 0);
}

#[test]
fn lines_whose_total_overflows_are_dropped_on_load() {
    let raw = r#"{"items":[{"id":"X","quantity":4000000000,"price":"79228162514264337593543950"}]}"#;
    let decoded = decode_cart(raw);
    let guest = &decoded.snapshot.partitions[&UserKey::guest()];
    assert!(guest.lines().is_empty());
    assert_eq!(guest.total(), Decimal::ZERO);

    let raw = json!({
        "items": [
            { "id": "a", "quantity": 1, "price": Decimal::MAX.to_string() },
            { "id": "b", "quantity": 1, "price": 1 },
            { "id": "c", "quantity": 1, "price": 0 }
        ]
    })
    .to_string();
    let decoded = decode_cart(&raw);
    let guest = &decoded.snapshot.partitions[&UserKey::guest()];
    let ids: Vec<_> = guest.lines().iter().map(|l| l.product_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "c"]);
    assert_eq!(guest.checked_total(), Some(Decimal::MAX));
}
