//! `imprint-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the error taxonomy, audit metadata, money helpers and lookups.

pub mod audit;
pub mod entity;
pub mod error;
pub mod id;
pub mod lookup;
pub mod money;

pub use audit::{Actor, RecordMeta};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{
    ContractId, CustomerId, InventoryId, InvoiceId, InvoiceItemId, ListItemId, PartyId,
    PaymentId, ProductId, ProjectId, ReturnId, UserId, WarehouseId,
};
pub use lookup::{ListItem, ListKind, NewListItem};
pub use rust_decimal::Decimal;
