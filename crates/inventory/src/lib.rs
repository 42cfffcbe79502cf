//! Warehouses and stock levels.
//!
//! Plain domain records and their validation rules (no IO, no HTTP, no storage).

pub mod stock;
pub mod warehouse;

pub use stock::{InventoryLine, InventoryRecord, InventoryUpsertRow};
pub use warehouse::{NewWarehouse, Warehouse};
