//! Ledger store boundary.
//!
//! One trait covers every table the settlement engine touches. Each method is
//! a single transaction: it either commits completely or leaves the store as
//! it was. Batch methods report the failing row's position through
//! [`StoreError::Batch`].

pub mod in_memory;
pub mod postgres;
mod schema;

use std::sync::Arc;

use thiserror::Error;

use imprint_catalog::{
    Contract, ContractedParty, NewContract, NewParty, NewProduct, Party, Product,
};
use imprint_core::{
    Actor, ContractId, CustomerId, DomainError, InvoiceId, InvoiceItemId, ListItem, ListItemId,
    NewListItem, PaymentId, ProductId, WarehouseId,
};
use imprint_inventory::{InventoryLine, InventoryRecord, NewWarehouse, Warehouse};
use imprint_sales::{
    Customer, Distribution, InvoiceItem, InvoicePatch, InvoiceQuery, InvoiceRecord, ItemAllocation,
    ItemReturn, NewCustomer, NewInvoice, NewInvoiceItem, NewPayment, NewReturn, Payment,
    PaymentUpsert, RowError,
};

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Connection, driver or decoding failure.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A row of a batch failed; nothing from the batch was committed.
    #[error("row {index}: {source}")]
    Batch {
        index: usize,
        #[source]
        source: Box<StoreError>,
    },
}

impl StoreError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Attach a batch row index. Already indexed errors keep their index.
    pub fn at_row(self, index: usize) -> Self {
        match self {
            StoreError::Batch { .. } => self,
            other => StoreError::Batch {
                index,
                source: Box::new(other),
            },
        }
    }

    /// The error with any batch wrapping removed.
    pub fn root(&self) -> &StoreError {
        match self {
            StoreError::Batch { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn row_index(&self) -> Option<usize> {
        match self {
            StoreError::Batch { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), StoreError::Domain(e) if e.is_not_found())
    }
}

impl From<RowError> for StoreError {
    fn from(err: RowError) -> Self {
        StoreError::Domain(err.error).at_row(err.index)
    }
}

/// Persistence for invoices, items, payments and their supporting tables.
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    // Lookups

    async fn insert_list_item(&self, item: NewListItem) -> StoreResult<ListItem>;

    async fn get_list_item(&self, id: ListItemId) -> StoreResult<ListItem>;

    // Catalog and stock

    async fn insert_product(&self, product: NewProduct, actor: &Actor) -> StoreResult<Product>;

    async fn get_product(&self, id: ProductId) -> StoreResult<Product>;

    /// Fails with `Integrity` while inventory rows reference the product.
    /// Invoice items keep their line but lose the product reference.
    async fn delete_product(&self, id: ProductId) -> StoreResult<()>;

    async fn insert_warehouse(
        &self,
        warehouse: NewWarehouse,
        actor: &Actor,
    ) -> StoreResult<Warehouse>;

    async fn get_warehouse(&self, id: WarehouseId) -> StoreResult<Warehouse>;

    /// Fails with `Integrity` while inventory rows reference the warehouse.
    /// Invoices keep existing with no warehouse.
    async fn delete_warehouse(&self, id: WarehouseId) -> StoreResult<()>;

    /// Insert or update stock keyed on `(product, warehouse)`. All-or-nothing.
    async fn upsert_inventory(
        &self,
        lines: Vec<InventoryLine>,
        actor: &Actor,
    ) -> StoreResult<Vec<InventoryRecord>>;

    async fn list_inventory(
        &self,
        warehouse: Option<WarehouseId>,
    ) -> StoreResult<Vec<InventoryRecord>>;

    // Parties and contracts

    async fn insert_party(&self, party: NewParty) -> StoreResult<Party>;

    /// `NotFound` unless a party of that kind has that id.
    async fn get_party(&self, party: ContractedParty) -> StoreResult<Party>;

    /// Fails with `Integrity` when the party or contract type is missing.
    async fn insert_contract(
        &self,
        contract: NewContract,
        party: ContractedParty,
        actor: &Actor,
    ) -> StoreResult<Contract>;

    async fn get_contract(&self, id: ContractId) -> StoreResult<Contract>;

    // Customers

    async fn insert_customer(&self, customer: NewCustomer, actor: &Actor) -> StoreResult<Customer>;

    async fn get_customer(&self, id: CustomerId) -> StoreResult<Customer>;

    // Invoices and items

    /// Insert a header with its initial items. The composite id is derived
    /// from the assigned row id.
    async fn insert_invoice(
        &self,
        invoice: NewInvoice,
        items: Vec<NewInvoiceItem>,
        actor: &Actor,
    ) -> StoreResult<InvoiceRecord>;

    async fn load_invoice(&self, id: InvoiceId) -> StoreResult<InvoiceRecord>;

    /// Invoices matching `query`, ascending by id.
    async fn list_invoices(&self, query: &InvoiceQuery) -> StoreResult<Vec<InvoiceRecord>>;

    async fn update_invoice(
        &self,
        id: InvoiceId,
        patch: InvoicePatch,
        actor: &Actor,
    ) -> StoreResult<InvoiceRecord>;

    /// Delete an invoice with its items and payments. Children are detached
    /// and keep their composite id.
    async fn delete_invoice(&self, id: InvoiceId) -> StoreResult<()>;

    async fn insert_items(
        &self,
        invoice_id: InvoiceId,
        items: Vec<NewInvoiceItem>,
        actor: &Actor,
    ) -> StoreResult<Vec<InvoiceItem>>;

    /// Recompute derived item fields; returns the ids that changed.
    async fn recalculate_items(
        &self,
        invoice_id: InvoiceId,
        actor: &Actor,
    ) -> StoreResult<Vec<InvoiceItemId>>;

    /// Spread the ledger total over the items in id order.
    async fn distribute_ledger_payments(
        &self,
        invoice_id: InvoiceId,
        actor: &Actor,
    ) -> StoreResult<Distribution>;

    async fn allocate_item_payments(
        &self,
        invoice_id: InvoiceId,
        allocations: Vec<ItemAllocation>,
        actor: &Actor,
    ) -> StoreResult<Vec<InvoiceItem>>;

    /// Split a child off `parent`, copying paid items (or all items).
    async fn generate_child_invoice(
        &self,
        parent: InvoiceId,
        paid_items_only: bool,
        actor: &Actor,
    ) -> StoreResult<InvoiceRecord>;

    // Payment ledger

    /// Append a payment with its ledger snapshot. Items are left untouched.
    async fn record_payment(&self, payment: NewPayment, actor: &Actor) -> StoreResult<Payment>;

    async fn upsert_payments(
        &self,
        rows: Vec<PaymentUpsert>,
        actor: &Actor,
    ) -> StoreResult<Vec<Payment>>;

    async fn list_payments(&self, invoice_id: Option<InvoiceId>) -> StoreResult<Vec<Payment>>;

    async fn delete_payment(&self, id: PaymentId) -> StoreResult<()>;

    // Returns

    /// Record a return after checking the invoice accepts returns and that
    /// the line's returned total stays within its quantity.
    async fn record_return(&self, ret: NewReturn, actor: &Actor) -> StoreResult<ItemReturn>;

    /// Returns against the items of `invoice_id`, ascending by id.
    async fn list_returns(&self, invoice_id: InvoiceId) -> StoreResult<Vec<ItemReturn>>;
}

#[async_trait::async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn insert_list_item(&self, item: NewListItem) -> StoreResult<ListItem> {
        (**self).insert_list_item(item).await
    }

    async fn get_list_item(&self, id: ListItemId) -> StoreResult<ListItem> {
        (**self).get_list_item(id).await
    }

    async fn insert_product(&self, product: NewProduct, actor: &Actor) -> StoreResult<Product> {
        (**self).insert_product(product, actor).await
    }

    async fn get_product(&self, id: ProductId) -> StoreResult<Product> {
        (**self).get_product(id).await
    }

    async fn delete_product(&self, id: ProductId) -> StoreResult<()> {
        (**self).delete_product(id).await
    }

    async fn insert_warehouse(
        &self,
        warehouse: NewWarehouse,
        actor: &Actor,
    ) -> StoreResult<Warehouse> {
        (**self).insert_warehouse(warehouse, actor).await
    }

    async fn get_warehouse(&self, id: WarehouseId) -> StoreResult<Warehouse> {
        (**self).get_warehouse(id).await
    }

    async fn delete_warehouse(&self, id: WarehouseId) -> StoreResult<()> {
        (**self).delete_warehouse(id).await
    }

    async fn upsert_inventory(
        &self,
        lines: Vec<InventoryLine>,
        actor: &Actor,
    ) -> StoreResult<Vec<InventoryRecord>> {
        (**self).upsert_inventory(lines, actor).await
    }

    async fn list_inventory(
        &self,
        warehouse: Option<WarehouseId>,
    ) -> StoreResult<Vec<InventoryRecord>> {
        (**self).list_inventory(warehouse).await
    }

    async fn insert_party(&self, party: NewParty) -> StoreResult<Party> {
        (**self).insert_party(party).await
    }

    async fn get_party(&self, party: ContractedParty) -> StoreResult<Party> {
        (**self).get_party(party).await
    }

    async fn insert_contract(
        &self,
        contract: NewContract,
        party: ContractedParty,
        actor: &Actor,
    ) -> StoreResult<Contract> {
        (**self).insert_contract(contract, party, actor).await
    }

    async fn get_contract(&self, id: ContractId) -> StoreResult<Contract> {
        (**self).get_contract(id).await
    }

    async fn insert_customer(&self, customer: NewCustomer, actor: &Actor) -> StoreResult<Customer> {
        (**self).insert_customer(customer, actor).await
    }

    async fn get_customer(&self, id: CustomerId) -> StoreResult<Customer> {
        (**self).get_customer(id).await
    }

    async fn insert_invoice(
        &self,
        invoice: NewInvoice,
        items: Vec<NewInvoiceItem>,
        actor: &Actor,
    ) -> StoreResult<InvoiceRecord> {
        (**self).insert_invoice(invoice, items, actor).await
    }

    async fn load_invoice(&self, id: InvoiceId) -> StoreResult<InvoiceRecord> {
        (**self).load_invoice(id).await
    }

    async fn list_invoices(&self, query: &InvoiceQuery) -> StoreResult<Vec<InvoiceRecord>> {
        (**self).list_invoices(query).await
    }

    async fn update_invoice(
        &self,
        id: InvoiceId,
        patch: InvoicePatch,
        actor: &Actor,
    ) -> StoreResult<InvoiceRecord> {
        (**self).update_invoice(id, patch, actor).await
    }

    async fn delete_invoice(&self, id: InvoiceId) -> StoreResult<()> {
        (**self).delete_invoice(id).await
    }

    async fn insert_items(
        &self,
        invoice_id: InvoiceId,
        items: Vec<NewInvoiceItem>,
        actor: &Actor,
    ) -> StoreResult<Vec<InvoiceItem>> {
        (**self).insert_items(invoice_id, items, actor).await
    }

    async fn recalculate_items(
        &self,
        invoice_id: InvoiceId,
        actor: &Actor,
    ) -> StoreResult<Vec<InvoiceItemId>> {
        (**self).recalculate_items(invoice_id, actor).await
    }

    async fn distribute_ledger_payments(
        &self,
        invoice_id: InvoiceId,
        actor: &Actor,
    ) -> StoreResult<Distribution> {
        (**self).distribute_ledger_payments(invoice_id, actor).await
    }

    async fn allocate_item_payments(
        &self,
        invoice_id: InvoiceId,
        allocations: Vec<ItemAllocation>,
        actor: &Actor,
    ) -> StoreResult<Vec<InvoiceItem>> {
        (**self)
            .allocate_item_payments(invoice_id, allocations, actor)
            .await
    }

    async fn generate_child_invoice(
        &self,
        parent: InvoiceId,
        paid_items_only: bool,
        actor: &Actor,
    ) -> StoreResult<InvoiceRecord> {
        (**self)
            .generate_child_invoice(parent, paid_items_only, actor)
            .await
    }

    async fn record_payment(&self, payment: NewPayment, actor: &Actor) -> StoreResult<Payment> {
        (**self).record_payment(payment, actor).await
    }

    async fn upsert_payments(
        &self,
        rows: Vec<PaymentUpsert>,
        actor: &Actor,
    ) -> StoreResult<Vec<Payment>> {
        (**self).upsert_payments(rows, actor).await
    }

    async fn list_payments(&self, invoice_id: Option<InvoiceId>) -> StoreResult<Vec<Payment>> {
        (**self).list_payments(invoice_id).await
    }

    async fn delete_payment(&self, id: PaymentId) -> StoreResult<()> {
        (**self).delete_payment(id).await
    }

    async fn record_return(&self, ret: NewReturn, actor: &Actor) -> StoreResult<ItemReturn> {
        (**self).record_return(ret, actor).await
    }

    async fn list_returns(&self, invoice_id: InvoiceId) -> StoreResult<Vec<ItemReturn>> {
        (**self).list_returns(invoice_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_wrapping_keeps_first_index() {
        let err = StoreError::from(DomainError::not_found("invoice", 4))
            .at_row(2)
            .at_row(5);
        assert_eq!(err.row_index(), Some(2));
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "row 2: invoice 4 not found");
    }

    #[test]
    fn row_errors_convert_to_batch() {
        let err: StoreError = RowError {
            index: 3,
            error: DomainError::field("paid_amount", "negative"),
        }
        .into();
        assert_eq!(err.row_index(), Some(3));
        assert!(matches!(err.root(), StoreError::Domain(DomainError::Validation { .. })));
    }
}
