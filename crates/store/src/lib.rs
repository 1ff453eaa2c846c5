//! Relational persistence for the shop core.
//!
//! [`ShopStore`] is the entry point: non-locking reads, user registration and
//! [`ShopStore::begin`], which opens a [`StoreTx`]. Everything that writes
//! goods inventory or orders goes through a transaction so that row locks,
//! checks and writes commit or roll back as one unit.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use store::{GoodsFilter, OrderQuery, ShopStore, StoreTx};
