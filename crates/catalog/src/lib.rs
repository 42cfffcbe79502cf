//! Catalog: products and the contracts behind them.
//!
//! Pure domain records and rules (no IO, no HTTP, no storage).

pub mod contract;
pub mod product;

pub use contract::{
    Contract, ContractedParty, NewContract, NewParty, Party, PartyKind, PartyRef,
};
pub use product::{Isbn, NewProduct, Product, ProductStatus};
