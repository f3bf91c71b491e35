//! In-memory partitioned stores and the merge-on-login procedure.

/// Cart partitions and cart operations.
pub mod cart;
/// Favorites partitions and favorites operations.
pub mod favorites;
/// Per-kind partition shape and merge rule.
pub mod partition;
/// Generic identity-partitioned store.
pub mod store;
/// Cart and favorites bound to one session.
pub mod storefront;
