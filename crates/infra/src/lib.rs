//! Infrastructure layer: ledger stores and the settlement service.
//!
//! - [`store`]: the `LedgerStore` trait with in-memory and Postgres backends
//! - [`service`]: validation, lookup resolution and read-model assembly on top
//!   of any store

pub mod service;
pub mod store;

pub use service::SettlementService;
pub use store::{InMemoryLedgerStore, LedgerStore, PostgresLedgerStore, StoreError, StoreResult};
