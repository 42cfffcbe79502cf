//! Settlement orchestration.
//!
//! `SettlementService` sits between the HTTP layer and a [`LedgerStore`]. It
//! validates inputs, resolves lookup references, turns missing references into
//! `NotFound` before the store sees them, and assembles the read models.
//!
//! ```text
//! request
//!   ↓
//! 1. Validate input rows (field errors carry the row index for batches)
//!   ↓
//! 2. Resolve references (lookup kinds, customer, warehouse, parent, products, parties)
//!   ↓
//! 3. One store call = one transaction
//!   ↓
//! 4. Build the view (settlement + ledger) from what was committed
//! ```

use tracing::{debug, info, instrument, Span};

use imprint_catalog::{Contract, NewContract, NewParty, NewProduct, Party, Product};
use imprint_core::{
    Actor, ContractId, CustomerId, DomainError, InvoiceId, InvoiceItemId, ListItem, ListItemId,
    ListKind, NewListItem, PaymentId, ProductId, WarehouseId,
};
use imprint_inventory::{InventoryRecord, InventoryUpsertRow, NewWarehouse, Warehouse};
use imprint_sales::{
    Customer, Distribution, InvoiceFilter, InvoiceItem, InvoicePatch, InvoiceQuery, InvoiceView,
    ItemAllocation, ItemReturn, NewCustomer, NewInvoice, NewInvoiceItem, NewPayment, NewReturn,
    Payment, PaymentStatusReport, PaymentUpsert, RowError,
};

use crate::store::{LedgerStore, StoreError, StoreResult};

#[derive(Debug, Clone)]
pub struct SettlementService<S> {
    store: S,
}

impl<S> SettlementService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

fn validate_rows<T>(
    rows: &[T],
    check: impl Fn(&T) -> Result<(), DomainError>,
) -> Result<(), RowError> {
    for (index, row) in rows.iter().enumerate() {
        check(row).map_err(|error| RowError { index, error })?;
    }
    Ok(())
}

impl<S> SettlementService<S>
where
    S: LedgerStore,
{
    // Lookups

    pub async fn create_list_item(&self, item: NewListItem) -> StoreResult<ListItem> {
        item.validate()?;
        self.store.insert_list_item(item).await
    }

    /// Resolve `id` as an active entry of `kind`. A missing entry is reported
    /// against `field` rather than as a bare `NotFound`.
    async fn resolve_list_item(
        &self,
        field: &str,
        id: Option<ListItemId>,
        kind: ListKind,
    ) -> StoreResult<()> {
        let Some(id) = id else {
            return Ok(());
        };
        let item = match self.store.get_list_item(id).await {
            Ok(item) => item,
            Err(err) if err.is_not_found() => {
                return Err(DomainError::field(field, format!("list item {id} does not exist")).into());
            }
            Err(err) => return Err(err),
        };
        item.ensure_usable_as(field, kind)?;
        Ok(())
    }

    async fn ensure_warehouse(&self, id: Option<WarehouseId>) -> StoreResult<()> {
        if let Some(id) = id {
            self.store.get_warehouse(id).await?;
        }
        Ok(())
    }

    async fn ensure_customer(&self, id: Option<CustomerId>) -> StoreResult<()> {
        if let Some(id) = id {
            self.store.get_customer(id).await?;
        }
        Ok(())
    }

    async fn ensure_invoice(&self, id: InvoiceId) -> StoreResult<()> {
        self.store.load_invoice(id).await.map(|_| ())
    }

    async fn ensure_products(&self, items: &[NewInvoiceItem]) -> StoreResult<()> {
        for (index, item) in items.iter().enumerate() {
            if let Some(product) = item.product_id {
                self.store
                    .get_product(product)
                    .await
                    .map_err(|e| e.at_row(index))?;
            }
        }
        Ok(())
    }

    // Customers

    pub async fn create_customer(
        &self,
        customer: NewCustomer,
        actor: &Actor,
    ) -> StoreResult<Customer> {
        customer.validate()?;
        self.resolve_list_item("customer_type", customer.customer_type, ListKind::CustomerType)
            .await?;
        self.store.insert_customer(customer, actor).await
    }

    pub async fn get_customer(&self, id: CustomerId) -> StoreResult<Customer> {
        self.store.get_customer(id).await
    }

    // Invoices

    #[instrument(skip(self, invoice, items, actor), fields(user_id = %actor.user_id(), invoice_id), err)]
    pub async fn create_invoice(
        &self,
        invoice: NewInvoice,
        items: Vec<NewInvoiceItem>,
        actor: &Actor,
    ) -> StoreResult<InvoiceView> {
        invoice.validate()?;
        validate_rows(&items, NewInvoiceItem::validate)?;

        self.resolve_list_item("invoice_type", invoice.invoice_type, ListKind::InvoiceType)
            .await?;
        self.resolve_list_item("payment_method", invoice.payment_method, ListKind::PaymentMethod)
            .await?;
        self.ensure_customer(invoice.customer_id).await?;
        self.ensure_warehouse(invoice.warehouse_id).await?;
        if let Some(parent) = invoice.main_invoice {
            self.ensure_invoice(parent).await?;
        }
        self.ensure_products(&items).await?;

        let record = self.store.insert_invoice(invoice, items, actor).await?;
        Span::current().record("invoice_id", record.invoice.id.get());
        info!(composite_id = %record.invoice.composite_id, "invoice created");
        Ok(record.into())
    }

    pub async fn get_invoice(&self, id: InvoiceId) -> StoreResult<InvoiceView> {
        Ok(self.store.load_invoice(id).await?.into())
    }

    /// Stored-column filters run in the store; the payment-status bucket is
    /// applied afterwards over the computed settlement.
    #[instrument(skip(self, filter), fields(matched), err)]
    pub async fn list_invoices(&self, filter: &InvoiceFilter) -> StoreResult<Vec<InvoiceView>> {
        let records = self.store.list_invoices(&filter.query).await?;
        let views: Vec<InvoiceView> = records
            .into_iter()
            .filter(|record| {
                filter
                    .payment_status
                    .is_none_or(|category| category.matches(&record.settlement()))
            })
            .map(InvoiceView::from)
            .collect();
        Span::current().record("matched", views.len());
        Ok(views)
    }

    pub async fn list_children(&self, parent: InvoiceId) -> StoreResult<Vec<InvoiceView>> {
        self.ensure_invoice(parent).await?;
        let filter = InvoiceFilter {
            query: InvoiceQuery::children_of(parent),
            payment_status: None,
        };
        self.list_invoices(&filter).await
    }

    #[instrument(skip(self, patch, actor), fields(invoice_id = %id, user_id = %actor.user_id()), err)]
    pub async fn update_invoice(
        &self,
        id: InvoiceId,
        patch: InvoicePatch,
        actor: &Actor,
    ) -> StoreResult<InvoiceView> {
        patch.validate()?;
        self.ensure_invoice(id).await?;
        self.resolve_list_item("invoice_type", patch.invoice_type.flatten(), ListKind::InvoiceType)
            .await?;
        self.resolve_list_item(
            "payment_method",
            patch.payment_method.flatten(),
            ListKind::PaymentMethod,
        )
        .await?;
        self.ensure_customer(patch.customer_id.flatten()).await?;
        self.ensure_warehouse(patch.warehouse_id.flatten()).await?;

        Ok(self.store.update_invoice(id, patch, actor).await?.into())
    }

    #[instrument(skip(self), fields(invoice_id = %id), err)]
    pub async fn delete_invoice(&self, id: InvoiceId) -> StoreResult<()> {
        self.store.delete_invoice(id).await?;
        info!("invoice deleted with its items and payments");
        Ok(())
    }

    pub async fn list_items(&self, invoice_id: InvoiceId) -> StoreResult<Vec<InvoiceItem>> {
        Ok(self.store.load_invoice(invoice_id).await?.items)
    }

    #[instrument(skip(self, items, actor), fields(invoice_id = %invoice_id, rows = items.len()), err)]
    pub async fn add_items(
        &self,
        invoice_id: InvoiceId,
        items: Vec<NewInvoiceItem>,
        actor: &Actor,
    ) -> StoreResult<Vec<InvoiceItem>> {
        validate_rows(&items, NewInvoiceItem::validate)?;
        self.ensure_invoice(invoice_id).await?;
        self.ensure_products(&items).await?;
        self.store.insert_items(invoice_id, items, actor).await
    }

    pub async fn payment_status(&self, invoice_id: InvoiceId) -> StoreResult<PaymentStatusReport> {
        let record = self.store.load_invoice(invoice_id).await?;
        let report = PaymentStatusReport::from(&record);
        if !report.views_agree {
            debug!(
                invoice_id = %invoice_id,
                items_paid = %report.items_paid_total,
                ledger_paid = %report.ledger_paid_total,
                "item and ledger views disagree"
            );
        }
        Ok(report)
    }

    #[instrument(skip(self, actor), fields(parent_id = %parent, user_id = %actor.user_id()), err)]
    pub async fn generate_child_invoice(
        &self,
        parent: InvoiceId,
        paid_items_only: bool,
        actor: &Actor,
    ) -> StoreResult<InvoiceView> {
        let record = self
            .store
            .generate_child_invoice(parent, paid_items_only, actor)
            .await?;
        info!(
            composite_id = %record.invoice.composite_id,
            items = record.items.len(),
            "child invoice generated"
        );
        Ok(record.into())
    }

    pub async fn recalculate_items(
        &self,
        invoice_id: InvoiceId,
        actor: &Actor,
    ) -> StoreResult<Vec<InvoiceItemId>> {
        self.store.recalculate_items(invoice_id, actor).await
    }

    #[instrument(skip(self, actor), fields(invoice_id = %invoice_id), err)]
    pub async fn distribute_payments(
        &self,
        invoice_id: InvoiceId,
        actor: &Actor,
    ) -> StoreResult<Distribution> {
        let distribution = self
            .store
            .distribute_ledger_payments(invoice_id, actor)
            .await?;
        if !distribution.unallocated.is_zero() {
            info!(unallocated = %distribution.unallocated, "ledger exceeds item totals");
        }
        Ok(distribution)
    }

    pub async fn allocate_item_payments(
        &self,
        invoice_id: InvoiceId,
        allocations: Vec<ItemAllocation>,
        actor: &Actor,
    ) -> StoreResult<Vec<InvoiceItem>> {
        self.store
            .allocate_item_payments(invoice_id, allocations, actor)
            .await
    }

    // Payments

    #[instrument(skip(self, payment, actor), fields(invoice_id = %payment.invoice_id, user_id = %actor.user_id()), err)]
    pub async fn record_payment(&self, payment: NewPayment, actor: &Actor) -> StoreResult<Payment> {
        payment.validate()?;
        let payment = self.store.record_payment(payment, actor).await?;
        info!(
            payment_id = %payment.id,
            paid = %payment.snapshot.paid,
            remaining = %payment.snapshot.remaining,
            "payment recorded"
        );
        Ok(payment)
    }

    #[instrument(skip(self, rows, actor), fields(rows = rows.len()), err)]
    pub async fn upsert_payments(
        &self,
        rows: Vec<PaymentUpsert>,
        actor: &Actor,
    ) -> StoreResult<Vec<Payment>> {
        validate_rows(&rows, |row| row.payment.validate())?;
        self.store.upsert_payments(rows, actor).await
    }

    pub async fn list_payments(&self, invoice_id: Option<InvoiceId>) -> StoreResult<Vec<Payment>> {
        if let Some(id) = invoice_id {
            self.ensure_invoice(id).await?;
        }
        self.store.list_payments(invoice_id).await
    }

    pub async fn delete_payment(&self, id: PaymentId) -> StoreResult<()> {
        self.store.delete_payment(id).await
    }

    // Returns

    #[instrument(skip(self, ret, actor), fields(item_id = %ret.invoice_item, user_id = %actor.user_id()), err)]
    pub async fn record_return(&self, ret: NewReturn, actor: &Actor) -> StoreResult<ItemReturn> {
        ret.validate()?;
        let ret = self.store.record_return(ret, actor).await?;
        info!(
            return_id = %ret.id,
            invoice_id = %ret.invoice_id,
            quantity = ret.returned_quantity,
            "return recorded"
        );
        Ok(ret)
    }

    pub async fn list_returns(&self, invoice_id: InvoiceId) -> StoreResult<Vec<ItemReturn>> {
        self.store.list_returns(invoice_id).await
    }

    // Parties and contracts

    pub async fn create_party(&self, party: NewParty) -> StoreResult<Party> {
        party.validate()?;
        self.store.insert_party(party).await
    }

    /// The party must exist under the kind it is named with.
    #[instrument(skip(self, contract, actor), fields(project_id = %contract.project_id), err)]
    pub async fn create_contract(
        &self,
        contract: NewContract,
        actor: &Actor,
    ) -> StoreResult<Contract> {
        contract.validate()?;
        let party = contract.party.parse()?;
        self.store.get_party(party).await?;
        self.resolve_list_item("contract_type", contract.contract_type, ListKind::ContractType)
            .await?;
        self.store.insert_contract(contract, party, actor).await
    }

    pub async fn get_contract(&self, id: ContractId) -> StoreResult<Contract> {
        self.store.get_contract(id).await
    }

    // Warehouses, products and stock

    pub async fn create_warehouse(
        &self,
        warehouse: NewWarehouse,
        actor: &Actor,
    ) -> StoreResult<Warehouse> {
        warehouse.validate()?;
        self.resolve_list_item("warehouse_type", warehouse.warehouse_type, ListKind::WarehouseType)
            .await?;
        self.store.insert_warehouse(warehouse, actor).await
    }

    pub async fn delete_warehouse(&self, id: WarehouseId) -> StoreResult<()> {
        self.store.delete_warehouse(id).await
    }

    pub async fn create_product(&self, product: NewProduct, actor: &Actor) -> StoreResult<Product> {
        product.validate()?;
        self.resolve_list_item("genre", product.genre, ListKind::Genre)
            .await?;
        self.store.insert_product(product, actor).await
    }

    pub async fn delete_product(&self, id: ProductId) -> StoreResult<()> {
        self.store.delete_product(id).await
    }

    pub async fn list_inventory(
        &self,
        warehouse: Option<WarehouseId>,
    ) -> StoreResult<Vec<InventoryRecord>> {
        if let Some(id) = warehouse {
            self.store.get_warehouse(id).await?;
        }
        self.store.list_inventory(warehouse).await
    }

    #[instrument(skip(self, rows, actor), fields(rows = rows.len()), err)]
    pub async fn bulk_upsert_inventory(
        &self,
        rows: Vec<InventoryUpsertRow>,
        actor: &Actor,
    ) -> StoreResult<Vec<InventoryRecord>> {
        let lines = rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                row.validate()
                    .map_err(|e| StoreError::from(e).at_row(index))
            })
            .collect::<StoreResult<Vec<_>>>()?;
        self.store.upsert_inventory(lines, actor).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::NaiveDate;
    use imprint_core::{Decimal, UserId};
    use imprint_sales::PaymentStatusCategory;
    use rust_decimal_macros::dec;

    use crate::store::InMemoryLedgerStore;

    fn service() -> SettlementService<Arc<dyn LedgerStore>> {
        SettlementService::new(Arc::new(InMemoryLedgerStore::new()))
    }

    fn actor() -> Actor {
        Actor::now(UserId::new(9))
    }

    fn line(total: Decimal, paid: Decimal) -> NewInvoiceItem {
        NewInvoiceItem {
            product_id: None,
            quantity: 1,
            unit_price: total,
            discount_percent: Decimal::ZERO,
            total_price: Some(total),
            paid_amount: paid,
        }
    }

    fn list_item(kind: ListKind, value: &str) -> NewListItem {
        NewListItem {
            kind,
            value: value.into(),
            display_name_en: value.into(),
            display_name_ar: String::new(),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn lookup_of_wrong_kind_is_a_field_error() {
        let svc = service();
        let cash = svc
            .create_list_item(list_item(ListKind::PaymentMethod, "cash"))
            .await
            .unwrap();

        let invoice = NewInvoice {
            invoice_type: Some(cash.id),
            ..NewInvoice::default()
        };
        let err = svc.create_invoice(invoice, vec![], &actor()).await.unwrap_err();
        match err.root() {
            StoreError::Domain(DomainError::Validation { field, .. }) => {
                assert_eq!(field.as_deref(), Some("invoice_type"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_warehouse_is_not_found() {
        let svc = service();
        let invoice = NewInvoice {
            warehouse_id: Some(WarehouseId::new(5)),
            ..NewInvoice::default()
        };
        let err = svc.create_invoice(invoice, vec![], &actor()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn invalid_item_row_reports_index() {
        let svc = service();
        let mut bad = line(dec!(10), Decimal::ZERO);
        bad.quantity = 0;

        let err = svc
            .create_invoice(NewInvoice::default(), vec![line(dec!(5), dec!(0)), bad], &actor())
            .await
            .unwrap_err();
        assert_eq!(err.row_index(), Some(1));
    }

    #[tokio::test]
    async fn non_positive_payment_is_rejected() {
        let svc = service();
        let view = svc
            .create_invoice(NewInvoice::default(), vec![line(dec!(10), dec!(0))], &actor())
            .await
            .unwrap();
        let payment = NewPayment {
            invoice_id: view.invoice.id,
            amount: Decimal::ZERO,
            payment_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            reference_number: None,
            reference_type: None,
            notes: String::new(),
        };
        let err = svc.record_payment(payment, &actor()).await.unwrap_err();
        assert!(matches!(err.root(), StoreError::Domain(DomainError::Validation { .. })));
    }

    #[tokio::test]
    async fn payment_status_filter_runs_over_item_view() {
        let svc = service();
        svc.create_invoice(NewInvoice::default(), vec![line(dec!(10), dec!(10))], &actor())
            .await
            .unwrap();
        svc.create_invoice(NewInvoice::default(), vec![line(dec!(10), dec!(4))], &actor())
            .await
            .unwrap();
        svc.create_invoice(NewInvoice::default(), vec![line(dec!(10), dec!(0))], &actor())
            .await
            .unwrap();

        let count = |category| {
            let svc = &svc;
            async move {
                svc.list_invoices(&InvoiceFilter {
                    query: InvoiceQuery::default(),
                    payment_status: Some(category),
                })
                .await
                .unwrap()
                .len()
            }
        };
        assert_eq!(count(PaymentStatusCategory::FullyPaid).await, 1);
        assert_eq!(count(PaymentStatusCategory::PartiallyPaid).await, 1);
        assert_eq!(count(PaymentStatusCategory::Unpaid).await, 1);
        assert_eq!(count(PaymentStatusCategory::HasPartialPayments).await, 1);
    }

    #[tokio::test]
    async fn unknown_customer_is_not_found_on_create_and_update() {
        let svc = service();
        let invoice = NewInvoice {
            customer_id: Some(CustomerId::new(41)),
            ..NewInvoice::default()
        };
        let err = svc.create_invoice(invoice, vec![], &actor()).await.unwrap_err();
        assert!(err.is_not_found());

        let view = svc
            .create_invoice(NewInvoice::default(), vec![], &actor())
            .await
            .unwrap();
        let patch = InvoicePatch {
            customer_id: Some(Some(CustomerId::new(41))),
            ..InvoicePatch::default()
        };
        let err = svc
            .update_invoice(view.invoice.id, patch, &actor())
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let customer = svc
            .create_customer(
                NewCustomer {
                    institution_name: "Jarir Bookstore".into(),
                    ..NewCustomer::default()
                },
                &actor(),
            )
            .await
            .unwrap();
        let patch = InvoicePatch {
            customer_id: Some(Some(customer.id)),
            ..InvoicePatch::default()
        };
        let view = svc.update_invoice(view.invoice.id, patch, &actor()).await.unwrap();
        assert_eq!(view.invoice.customer_id, Some(customer.id));
    }

    #[tokio::test]
    async fn returns_respect_returnability_and_quantity() {
        let svc = service();
        let mut sold = line(dec!(30), Decimal::ZERO);
        sold.quantity = 3;
        let view = svc
            .create_invoice(NewInvoice::default(), vec![sold.clone()], &actor())
            .await
            .unwrap();
        let item_id = view.items[0].id;
        let ret = |quantity| NewReturn {
            invoice_item: item_id,
            returned_quantity: quantity,
            return_date: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
        };

        svc.record_return(ret(2), &actor()).await.unwrap();
        let err = svc.record_return(ret(2), &actor()).await.unwrap_err();
        assert!(matches!(err.root(), StoreError::Domain(DomainError::Validation { .. })));
        svc.record_return(ret(1), &actor()).await.unwrap();
        assert_eq!(svc.list_returns(view.invoice.id).await.unwrap().len(), 2);

        let final_sale = NewInvoice {
            is_returnable: false,
            ..NewInvoice::default()
        };
        let view = svc.create_invoice(final_sale, vec![sold], &actor()).await.unwrap();
        let err = svc
            .record_return(
                NewReturn {
                    invoice_item: view.items[0].id,
                    ..ret(1)
                },
                &actor(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err.root(), StoreError::Domain(DomainError::InvariantViolation(_))));

        let err = svc
            .record_return(
                NewReturn {
                    invoice_item: InvoiceItemId::new(999),
                    ..ret(1)
                },
                &actor(),
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn contract_party_must_exist_under_its_kind() {
        use imprint_catalog::{ContractedParty, PartyKind, PartyRef};
        use imprint_core::ProjectId;

        let svc = service();
        let translator = svc
            .create_party(NewParty {
                kind: PartyKind::Translator,
                name: "Layla Haddad".into(),
                details: String::new(),
            })
            .await
            .unwrap();
        let contract = |kind: &str| NewContract {
            project_id: ProjectId::new(1),
            contract_type: None,
            party: PartyRef {
                kind: kind.into(),
                id: translator.party.id(),
            },
            commission_percent: Some(dec!(10)),
            fixed_amount: None,
            free_copies: None,
            duration_months: Some(24),
            payment_schedule: String::new(),
        };

        let created = svc.create_contract(contract("translator"), &actor()).await.unwrap();
        assert_eq!(created.party, ContractedParty::Translator(translator.party.id()));
        assert_eq!(svc.get_contract(created.id).await.unwrap(), created);

        let err = svc.create_contract(contract("author"), &actor()).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), format!("author {} not found", translator.party.id()));

        let err = svc.create_contract(contract("editor"), &actor()).await.unwrap_err();
        assert!(matches!(err.root(), StoreError::Domain(DomainError::Validation { .. })));
    }

    #[tokio::test]
    async fn inventory_row_missing_field_reports_index() {
        let svc = service();
        let rows = vec![InventoryUpsertRow {
            product_id: None,
            warehouse_id: Some(WarehouseId::new(1)),
            quantity: Some(3),
        }];
        let err = svc.bulk_upsert_inventory(rows, &actor()).await.unwrap_err();
        assert_eq!(err.row_index(), Some(0));
        match err.root() {
            StoreError::Domain(DomainError::Validation { field, .. }) => {
                assert_eq!(field.as_deref(), Some("product_id"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
