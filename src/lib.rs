//! Per-user cart and favorites state with merge-on-login and a durable cache.
//!
//! # Examples
//!
//! Synchronous usage with [`core::storefront::Storefront`]:
//! ```
//! use cartstore::{
//!     core::storefront::Storefront,
//!     line::CartLineDraft,
//!     types::UserKey,
//! };
//! use rust_decimal::Decimal;
//!
//! let mut shop = Storefront::default();
//! shop.upsert_line(CartLineDraft::new("p1", "Mug", Decimal::new(1250, 2)))
//!     .expect("upsert");
//! shop.toggle_favorite("p2");
//!
//! let merge = shop.merge_into_user(UserKey::new("uid-1")).expect("merge");
//! assert_eq!(merge.cart.moved, 1);
//! assert_eq!(shop.cart().count(), 1);
//! assert!(shop.favorites().contains("p2"));
//! ```
//!
//! Runtime usage with a persistent store:
//! ```no_run
//! use cartstore::{
//!     config::StoreConfig,
//!     line::CartLineDraft,
//!     persist::sqlite::SqliteKvStorage,
//!     runtime::{binder::SessionBinder, handle::open_storefront},
//! };
//! use rust_decimal::Decimal;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let storage = SqliteKvStorage::open("storefront.db").expect("open sqlite");
//! let handle = open_storefront(Box::new(storage), StoreConfig::default()).expect("start");
//! handle
//!     .upsert_line(CartLineDraft::new("p1", "Mug", Decimal::new(1250, 2)))
//!     .await
//!     .expect("upsert");
//!
//! let binder = SessionBinder::new(handle.clone());
//! binder
//!     .resolve(async { Ok::<_, std::io::Error>(Some("uid-1".to_string())) })
//!     .await
//!     .expect("bind");
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```
#![deny(missing_docs)]

/// Store configuration and environment loading.
pub mod config;
/// In-memory partitioned stores.
pub mod core;
/// Read-only diagnostics over the stores.
pub mod diag;
/// Cart line records.
pub mod line;
/// Mutation op records.
pub mod op;
/// Durable cache: storage abstraction, layout migration and backends.
pub mod persist;
/// Single-writer runtime, session binder and events.
pub mod runtime;
/// Shared identifiers.
pub mod types;
