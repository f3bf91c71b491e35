use std::num::NonZeroU32;

use rust_decimal::Decimal;
use tempfile::TempDir;

use cartstore::{
    config::StoreConfig,
    core::storefront::Storefront,
    line::CartLineDraft,
    persist::{
        KvStorage,
        cache::{caches, load_storefront},
        sqlite::SqliteKvStorage,
    },
    types::UserKey,
};

fn draft(id: &str, cents: i64, qty: u32) -> CartLineDraft {
    CartLineDraft::new(id, format!("Item {id}"), Decimal::new(cents, 2))
        .with_quantity(NonZeroU32::new(qty).expect("qty"))
}

#[test]
fn storefront_round_trips_through_sqlite_file() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("storefront.db");
    let config = StoreConfig::default();

    let mut shop = Storefront::default();
    shop.upsert_line(draft("p1", 1250, 2)).expect("upsert");
    shop.toggle_favorite("p1");
    shop.merge_into_user(UserKey::new("u1")).expect("merge");
    shop.upsert_line(draft("p2", 300, 1)).expect("upsert");
    shop.reset_to_guest();
    shop.toggle_favorite("g1");

    {
        let mut storage = SqliteKvStorage::open(&db_path).expect("open sqlite");
        let (cart_cache, favorites_cache) = caches(&config).expect("config");
        cart_cache.save(&mut storage, shop.cart()).expect("save cart");
        favorites_cache
            .save(&mut storage, shop.favorites())
            .expect("save favorites");
        storage.flush().expect("flush");
    }

    let storage = SqliteKvStorage::open(&db_path).expect("reopen sqlite");
    let restored = load_storefront(&storage, &config).expect("config");

    assert!(restored.active_user().is_guest());
    assert_eq!(restored.favorites().ids(), ["g1"]);
    assert_eq!(restored.cart().export_snapshot(), shop.cart().export_snapshot());
    assert_eq!(
        restored.favorites().export_snapshot(),
        shop.favorites().export_snapshot()
    );

    let mut restored = restored;
    restored
        .merge_into_user(UserKey::new("u1"))
        .expect("merge after restart");
    assert_eq!(restored.cart().total(), Decimal::new(2800, 2));
    assert_eq!(restored.favorites().ids(), ["p1", "g1"]);
}

#[test]
fn set_overwrites_and_stamps_the_key() {
    let mut storage = SqliteKvStorage::open_in_memory().expect("open");
    assert_eq!(storage.get("k").expect("get"), None);
    assert_eq!(storage.updated_ms("k").expect("updated"), None);

    storage.set("k", "one").expect("set");
    storage.set("k", "two").expect("set");
    assert_eq!(storage.get("k").expect("get").as_deref(), Some("two"));
    assert!(storage.updated_ms("k").expect("updated").is_some());

    storage.remove("k").expect("remove");
    assert_eq!(storage.get("k").expect("get"), None);
}

#[test]
fn legacy_rows_migrate_on_load() {
    let mut storage = SqliteKvStorage::open_in_memory().expect("open");
    storage
        .set(
            "cart-storage",
            r#"{"state":{"items":[{"id":"X","quantity":2,"price":10}]},"version":0}"#,
        )
        .expect("seed");

    let (cart_cache, favorites_cache) = caches(&StoreConfig::default()).expect("config");
    let cart = cart_cache.load(&storage);
    assert_eq!(cart.count(), 2);
    assert_eq!(cart.total(), Decimal::from(20));

    let favorites = favorites_cache.load(&storage);
    assert_eq!(favorites.partition_count(), 0);

    cart_cache.save(&mut storage, &cart).expect("save");
    let raw = storage.get("cart-storage").expect("get").expect("row");
    assert!(raw.contains("\"schemaVersion\":2"));
}
