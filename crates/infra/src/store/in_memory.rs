//! In-memory ledger store for development and tests.
//!
//! All tables live behind one lock. Writers work on a copy of the tables and
//! swap it in only when the whole operation succeeded, which gives every
//! method the same all-or-nothing behaviour as a database transaction.
//!
//! The copy covers every table, so each write costs O(total rows) and loading
//! n rows one request at a time is O(n^2). Fine for development and tests; use
//! the Postgres store for real volumes.
//!
//! A panic inside an operation happens before the swap, so the guarded tables
//! are still the last committed state and a poisoned lock is recovered.

use std::collections::BTreeMap;
use std::iter;
use std::sync::{PoisonError, RwLock};

use imprint_catalog::{
    Contract, ContractedParty, NewContract, NewParty, NewProduct, Party, Product,
};
use imprint_core::money::quantize;
use imprint_core::{
    Actor, ContractId, CustomerId, DomainError, InventoryId, InvoiceId, InvoiceItemId, ListItem,
    ListItemId, NewListItem, PartyId, PaymentId, ProductId, RecordMeta, ReturnId, WarehouseId,
};
use imprint_inventory::{InventoryLine, InventoryRecord, NewWarehouse, Warehouse};
use imprint_sales::{
    apply_allocations, distribute, plan_child_invoice, recalculate_items, returned_quantity,
    subtotal, Customer, Distribution, Invoice, InvoiceItem, InvoicePatch, InvoiceQuery,
    InvoiceRecord, ItemAllocation, ItemReturn, LedgerSnapshot, NewCustomer, NewInvoice,
    NewInvoiceItem, NewPayment, NewReturn, Payment, PaymentUpsert,
};

use super::{LedgerStore, StoreError, StoreResult};

#[derive(Debug, Clone, Default)]
struct Sequences {
    list_item: i64,
    party: i64,
    contract: i64,
    customer: i64,
    product: i64,
    warehouse: i64,
    inventory: i64,
    invoice: i64,
    item: i64,
    payment: i64,
    item_return: i64,
}

fn next(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

#[derive(Debug, Clone, Default)]
struct Tables {
    seq: Sequences,
    list_items: BTreeMap<ListItemId, ListItem>,
    parties: BTreeMap<PartyId, Party>,
    contracts: BTreeMap<ContractId, Contract>,
    customers: BTreeMap<CustomerId, Customer>,
    products: BTreeMap<ProductId, Product>,
    warehouses: BTreeMap<WarehouseId, Warehouse>,
    inventory: BTreeMap<InventoryId, InventoryRecord>,
    invoices: BTreeMap<InvoiceId, Invoice>,
    items: BTreeMap<InvoiceItemId, InvoiceItem>,
    payments: BTreeMap<PaymentId, Payment>,
    returns: BTreeMap<ReturnId, ItemReturn>,
}

impl Tables {
    fn invoice(&self, id: InvoiceId) -> StoreResult<&Invoice> {
        self.invoices
            .get(&id)
            .ok_or_else(|| DomainError::not_found("invoice", id).into())
    }

    fn items_of(&self, invoice_id: InvoiceId) -> Vec<InvoiceItem> {
        self.items
            .values()
            .filter(|item| item.invoice_id == invoice_id)
            .cloned()
            .collect()
    }

    fn payments_of(&self, invoice_id: InvoiceId) -> Vec<Payment> {
        self.payments
            .values()
            .filter(|payment| payment.invoice_id == invoice_id)
            .cloned()
            .collect()
    }

    fn record(&self, id: InvoiceId) -> StoreResult<InvoiceRecord> {
        Ok(InvoiceRecord {
            invoice: self.invoice(id)?.clone(),
            items: self.items_of(id),
            payments: self.payments_of(id),
        })
    }

    fn save_items(&mut self, items: Vec<InvoiceItem>) {
        for item in items {
            self.items.insert(item.id, item);
        }
    }

    // Foreign keys. Violations surface as `Integrity`, like the relational store.

    fn check_list_item(&self, id: Option<ListItemId>) -> StoreResult<()> {
        match id {
            Some(id) if !self.list_items.contains_key(&id) => Err(DomainError::integrity(
                format!("list item {id} does not exist"),
            )
            .into()),
            _ => Ok(()),
        }
    }

    fn check_warehouse(&self, id: Option<WarehouseId>) -> StoreResult<()> {
        match id {
            Some(id) if !self.warehouses.contains_key(&id) => Err(DomainError::integrity(
                format!("warehouse {id} does not exist"),
            )
            .into()),
            _ => Ok(()),
        }
    }

    fn check_product(&self, id: Option<ProductId>) -> StoreResult<()> {
        match id {
            Some(id) if !self.products.contains_key(&id) => Err(DomainError::integrity(
                format!("product {id} does not exist"),
            )
            .into()),
            _ => Ok(()),
        }
    }

    fn check_customer(&self, id: Option<CustomerId>) -> StoreResult<()> {
        match id {
            Some(id) if !self.customers.contains_key(&id) => Err(DomainError::integrity(
                format!("customer {id} does not exist"),
            )
            .into()),
            _ => Ok(()),
        }
    }

    fn find_party(&self, party: ContractedParty) -> Option<&Party> {
        self.parties.get(&party.id()).filter(|p| p.party == party)
    }

    fn check_invoice_refs(
        &self,
        main_invoice: Option<InvoiceId>,
        customer: Option<CustomerId>,
        warehouse: Option<WarehouseId>,
        invoice_type: Option<ListItemId>,
        payment_method: Option<ListItemId>,
    ) -> StoreResult<()> {
        if let Some(parent) = main_invoice {
            if !self.invoices.contains_key(&parent) {
                return Err(DomainError::integrity(format!("invoice {parent} does not exist")).into());
            }
        }
        self.check_customer(customer)?;
        self.check_warehouse(warehouse)?;
        self.check_list_item(invoice_type)?;
        self.check_list_item(payment_method)?;
        Ok(())
    }

    fn insert_invoice_row(&mut self, new: NewInvoice, meta: RecordMeta) -> StoreResult<InvoiceId> {
        let id = InvoiceId::new(next(&mut self.seq.invoice));
        let invoice = Invoice::from_new(id, new, meta);
        if self
            .invoices
            .values()
            .any(|other| other.composite_id == invoice.composite_id)
        {
            return Err(DomainError::conflict(format!(
                "composite id {} already exists",
                invoice.composite_id
            ))
            .into());
        }
        self.invoices.insert(id, invoice);
        Ok(id)
    }

    fn insert_new_items(
        &mut self,
        invoice_id: InvoiceId,
        items: Vec<NewInvoiceItem>,
        actor: &Actor,
    ) -> StoreResult<Vec<InvoiceItem>> {
        let mut inserted = Vec::with_capacity(items.len());
        for (index, new) in items.into_iter().enumerate() {
            self.check_product(new.product_id)
                .map_err(|e| e.at_row(index))?;
            let id = InvoiceItemId::new(next(&mut self.seq.item));
            let item = new.into_item(id, invoice_id, actor);
            self.items.insert(id, item.clone());
            inserted.push(item);
        }
        Ok(inserted)
    }

    fn append_payment(&mut self, new: NewPayment, actor: &Actor) -> StoreResult<Payment> {
        let invoice_id = new.invoice_id;
        self.invoice(invoice_id)?;

        let original_total = subtotal(&self.items_of(invoice_id));
        let amounts = self
            .payments
            .values()
            .filter(|p| p.invoice_id == invoice_id)
            .map(|p| p.amount)
            .chain(iter::once(quantize(new.amount)))
            .collect::<Vec<_>>();
        let snapshot = LedgerSnapshot::compute(original_total, amounts);

        let id = PaymentId::new(next(&mut self.seq.payment));
        let payment = new.record(id, snapshot, actor);
        self.payments.insert(id, payment.clone());
        Ok(payment)
    }

    fn upsert_payment(&mut self, row: PaymentUpsert, actor: &Actor) -> StoreResult<Payment> {
        match row.id {
            None => self.append_payment(row.payment, actor),
            Some(id) => {
                self.invoice(row.payment.invoice_id)?;
                let payment = self
                    .payments
                    .get_mut(&id)
                    .ok_or_else(|| StoreError::from(DomainError::not_found("payment", id)))?;
                payment.apply_update(row.payment, actor)?;
                Ok(payment.clone())
            }
        }
    }
}

/// Ledger store kept entirely in process memory.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    tables: RwLock<Tables>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, op: impl FnOnce(&Tables) -> StoreResult<T>) -> StoreResult<T> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        op(&tables)
    }

    fn write<T>(&self, op: impl FnOnce(&mut Tables) -> StoreResult<T>) -> StoreResult<T> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let mut working = tables.clone();
        let out = op(&mut working)?;
        *tables = working;
        Ok(out)
    }
}

#[async_trait::async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert_list_item(&self, item: NewListItem) -> StoreResult<ListItem> {
        self.write(|t| {
            if t
                .list_items
                .values()
                .any(|other| other.kind == item.kind && other.value == item.value)
            {
                return Err(DomainError::conflict(format!(
                    "{} '{}' already exists",
                    item.kind.code(),
                    item.value
                ))
                .into());
            }
            let id = ListItemId::new(next(&mut t.seq.list_item));
            let item = item.into_item(id);
            t.list_items.insert(id, item.clone());
            Ok(item)
        })
    }

    async fn get_list_item(&self, id: ListItemId) -> StoreResult<ListItem> {
        self.read(|t| {
            t.list_items
                .get(&id)
                .cloned()
                .ok_or_else(|| DomainError::not_found("list item", id).into())
        })
    }

    async fn insert_party(&self, party: NewParty) -> StoreResult<Party> {
        self.write(|t| {
            let id = PartyId::new(next(&mut t.seq.party));
            let party = party.into_party(id);
            t.parties.insert(id, party.clone());
            Ok(party)
        })
    }

    async fn get_party(&self, party: ContractedParty) -> StoreResult<Party> {
        self.read(|t| {
            t.find_party(party)
                .cloned()
                .ok_or_else(|| DomainError::not_found(party.kind().entity_name(), party.id()).into())
        })
    }

    async fn insert_contract(
        &self,
        contract: NewContract,
        party: ContractedParty,
        actor: &Actor,
    ) -> StoreResult<Contract> {
        self.write(|t| {
            if t.find_party(party).is_none() {
                return Err(DomainError::integrity(format!(
                    "{} {} does not exist",
                    party.kind().entity_name(),
                    party.id()
                ))
                .into());
            }
            t.check_list_item(contract.contract_type)?;
            let id = ContractId::new(next(&mut t.seq.contract));
            let contract = contract.into_contract(id, party, actor);
            t.contracts.insert(id, contract.clone());
            Ok(contract)
        })
    }

    async fn get_contract(&self, id: ContractId) -> StoreResult<Contract> {
        self.read(|t| {
            t.contracts
                .get(&id)
                .cloned()
                .ok_or_else(|| DomainError::not_found("contract", id).into())
        })
    }

    async fn insert_customer(&self, customer: NewCustomer, actor: &Actor) -> StoreResult<Customer> {
        self.write(|t| {
            t.check_list_item(customer.customer_type)?;
            let id = CustomerId::new(next(&mut t.seq.customer));
            let customer = customer.into_customer(id, actor);
            t.customers.insert(id, customer.clone());
            Ok(customer)
        })
    }

    async fn get_customer(&self, id: CustomerId) -> StoreResult<Customer> {
        self.read(|t| {
            t.customers
                .get(&id)
                .cloned()
                .ok_or_else(|| DomainError::not_found("customer", id).into())
        })
    }

    async fn insert_product(&self, product: NewProduct, actor: &Actor) -> StoreResult<Product> {
        self.write(|t| {
            t.check_list_item(product.genre)?;
            let id = ProductId::new(next(&mut t.seq.product));
            let product = product.into_product(id, actor);
            t.products.insert(id, product.clone());
            Ok(product)
        })
    }

    async fn get_product(&self, id: ProductId) -> StoreResult<Product> {
        self.read(|t| {
            t.products
                .get(&id)
                .cloned()
                .ok_or_else(|| DomainError::not_found("product", id).into())
        })
    }

    async fn delete_product(&self, id: ProductId) -> StoreResult<()> {
        self.write(|t| {
            if !t.products.contains_key(&id) {
                return Err(DomainError::not_found("product", id).into());
            }
            if t.inventory.values().any(|row| row.product_id == id) {
                return Err(DomainError::integrity(format!(
                    "product {id} is still referenced by inventory"
                ))
                .into());
            }
            for item in t.items.values_mut().filter(|i| i.product_id == Some(id)) {
                item.product_id = None;
            }
            t.products.remove(&id);
            Ok(())
        })
    }

    async fn insert_warehouse(
        &self,
        warehouse: NewWarehouse,
        actor: &Actor,
    ) -> StoreResult<Warehouse> {
        self.write(|t| {
            t.check_list_item(warehouse.warehouse_type)?;
            let id = WarehouseId::new(next(&mut t.seq.warehouse));
            let warehouse = warehouse.into_warehouse(id, actor);
            t.warehouses.insert(id, warehouse.clone());
            Ok(warehouse)
        })
    }

    async fn get_warehouse(&self, id: WarehouseId) -> StoreResult<Warehouse> {
        self.read(|t| {
            t.warehouses
                .get(&id)
                .cloned()
                .ok_or_else(|| DomainError::not_found("warehouse", id).into())
        })
    }

    async fn delete_warehouse(&self, id: WarehouseId) -> StoreResult<()> {
        self.write(|t| {
            if !t.warehouses.contains_key(&id) {
                return Err(DomainError::not_found("warehouse", id).into());
            }
            if t.inventory.values().any(|row| row.warehouse_id == id) {
                return Err(DomainError::integrity(format!(
                    "warehouse {id} is still referenced by inventory"
                ))
                .into());
            }
            for invoice in t.invoices.values_mut().filter(|i| i.warehouse_id == Some(id)) {
                invoice.warehouse_id = None;
            }
            t.warehouses.remove(&id);
            Ok(())
        })
    }

    async fn upsert_inventory(
        &self,
        lines: Vec<InventoryLine>,
        actor: &Actor,
    ) -> StoreResult<Vec<InventoryRecord>> {
        self.write(|t| {
            let mut saved = Vec::with_capacity(lines.len());
            for (index, line) in lines.into_iter().enumerate() {
                if !t.products.contains_key(&line.product_id) {
                    return Err(StoreError::from(DomainError::not_found("product", line.product_id))
                        .at_row(index));
                }
                if !t.warehouses.contains_key(&line.warehouse_id) {
                    return Err(StoreError::from(DomainError::not_found(
                        "warehouse",
                        line.warehouse_id,
                    ))
                    .at_row(index));
                }

                let existing = t
                    .inventory
                    .values()
                    .find(|row| row.key() == (line.product_id, line.warehouse_id))
                    .map(|row| row.id);
                let id = existing.unwrap_or_else(|| InventoryId::new(next(&mut t.seq.inventory)));
                let row = t
                    .inventory
                    .entry(id)
                    .or_insert_with(|| InventoryRecord::from_line(id, line, actor));
                if existing.is_some() {
                    row.set_quantity(line.quantity, actor);
                }
                saved.push(row.clone());
            }
            Ok(saved)
        })
    }

    async fn list_inventory(
        &self,
        warehouse: Option<WarehouseId>,
    ) -> StoreResult<Vec<InventoryRecord>> {
        self.read(|t| {
            Ok(t.inventory
                .values()
                .filter(|row| warehouse.is_none_or(|w| row.warehouse_id == w))
                .cloned()
                .collect())
        })
    }

    async fn insert_invoice(
        &self,
        invoice: NewInvoice,
        items: Vec<NewInvoiceItem>,
        actor: &Actor,
    ) -> StoreResult<InvoiceRecord> {
        self.write(|t| {
            t.check_invoice_refs(
                invoice.main_invoice,
                invoice.customer_id,
                invoice.warehouse_id,
                invoice.invoice_type,
                invoice.payment_method,
            )?;
            let id = t.insert_invoice_row(invoice, RecordMeta::created(actor))?;
            t.insert_new_items(id, items, actor)?;
            t.record(id)
        })
    }

    async fn load_invoice(&self, id: InvoiceId) -> StoreResult<InvoiceRecord> {
        self.read(|t| t.record(id))
    }

    async fn list_invoices(&self, query: &InvoiceQuery) -> StoreResult<Vec<InvoiceRecord>> {
        self.read(|t| {
            t.invoices
                .values()
                .filter(|invoice| query.matches(invoice))
                .map(|invoice| t.record(invoice.id))
                .collect()
        })
    }

    async fn update_invoice(
        &self,
        id: InvoiceId,
        patch: InvoicePatch,
        actor: &Actor,
    ) -> StoreResult<InvoiceRecord> {
        self.write(|t| {
            t.invoice(id)?;
            t.check_invoice_refs(
                None,
                patch.customer_id.flatten(),
                patch.warehouse_id.flatten(),
                patch.invoice_type.flatten(),
                patch.payment_method.flatten(),
            )?;
            if let Some(invoice) = t.invoices.get_mut(&id) {
                patch.apply(invoice, actor);
            }
            t.record(id)
        })
    }

    async fn delete_invoice(&self, id: InvoiceId) -> StoreResult<()> {
        self.write(|t| {
            t.invoice(id)?;
            t.invoices.remove(&id);
            t.items.retain(|_, item| item.invoice_id != id);
            t.returns.retain(|_, ret| ret.invoice_id != id);
            t.payments.retain(|_, payment| payment.invoice_id != id);
            for child in t.invoices.values_mut().filter(|i| i.main_invoice == Some(id)) {
                child.detach_from_parent();
            }
            Ok(())
        })
    }

    async fn insert_items(
        &self,
        invoice_id: InvoiceId,
        items: Vec<NewInvoiceItem>,
        actor: &Actor,
    ) -> StoreResult<Vec<InvoiceItem>> {
        self.write(|t| {
            t.invoice(invoice_id)?;
            t.insert_new_items(invoice_id, items, actor)
        })
    }

    async fn recalculate_items(
        &self,
        invoice_id: InvoiceId,
        actor: &Actor,
    ) -> StoreResult<Vec<InvoiceItemId>> {
        self.write(|t| {
            t.invoice(invoice_id)?;
            let mut items = t.items_of(invoice_id);
            let changed = recalculate_items(&mut items, actor);
            t.save_items(items);
            Ok(changed)
        })
    }

    async fn distribute_ledger_payments(
        &self,
        invoice_id: InvoiceId,
        actor: &Actor,
    ) -> StoreResult<Distribution> {
        self.write(|t| {
            t.invoice(invoice_id)?;
            let ledger_paid = t.payments_of(invoice_id).iter().map(|p| p.amount).sum();
            let mut items = t.items_of(invoice_id);
            let distribution = distribute(&mut items, ledger_paid, actor);
            t.save_items(items);
            Ok(distribution)
        })
    }

    async fn allocate_item_payments(
        &self,
        invoice_id: InvoiceId,
        allocations: Vec<ItemAllocation>,
        actor: &Actor,
    ) -> StoreResult<Vec<InvoiceItem>> {
        self.write(|t| {
            t.invoice(invoice_id)?;
            let mut items = t.items_of(invoice_id);
            apply_allocations(&mut items, &allocations, actor)?;
            t.save_items(items);
            Ok(t.items_of(invoice_id))
        })
    }

    async fn generate_child_invoice(
        &self,
        parent: InvoiceId,
        paid_items_only: bool,
        actor: &Actor,
    ) -> StoreResult<InvoiceRecord> {
        self.write(|t| {
            let parent = t.invoice(parent)?.clone();
            let items = t.items_of(parent.id);
            let plan = plan_child_invoice(&parent, &items, paid_items_only, actor);

            let child_id = t.insert_invoice_row(plan.invoice, plan.meta.clone())?;
            for snapshot in plan.items {
                let id = InvoiceItemId::new(next(&mut t.seq.item));
                t.items
                    .insert(id, snapshot.into_item(id, child_id, plan.meta.clone()));
            }
            t.record(child_id)
        })
    }

    async fn record_payment(&self, payment: NewPayment, actor: &Actor) -> StoreResult<Payment> {
        self.write(|t| t.append_payment(payment, actor))
    }

    async fn upsert_payments(
        &self,
        rows: Vec<PaymentUpsert>,
        actor: &Actor,
    ) -> StoreResult<Vec<Payment>> {
        self.write(|t| {
            let mut saved = Vec::with_capacity(rows.len());
            for (index, row) in rows.into_iter().enumerate() {
                saved.push(t.upsert_payment(row, actor).map_err(|e| e.at_row(index))?);
            }
            Ok(saved)
        })
    }

    async fn list_payments(&self, invoice_id: Option<InvoiceId>) -> StoreResult<Vec<Payment>> {
        self.read(|t| {
            Ok(t.payments
                .values()
                .filter(|p| invoice_id.is_none_or(|id| p.invoice_id == id))
                .cloned()
                .collect())
        })
    }

    async fn delete_payment(&self, id: PaymentId) -> StoreResult<()> {
        self.write(|t| {
            t.payments
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| DomainError::not_found("payment", id).into())
        })
    }

    async fn record_return(&self, ret: NewReturn, actor: &Actor) -> StoreResult<ItemReturn> {
        self.write(|t| {
            let item = t.items.get(&ret.invoice_item).cloned().ok_or_else(|| {
                StoreError::from(DomainError::not_found("invoice item", ret.invoice_item))
            })?;
            let invoice = t.invoice(item.invoice_id)?;
            ret.check_against(invoice, &item, returned_quantity(t.returns.values(), item.id))?;

            let id = ReturnId::new(next(&mut t.seq.item_return));
            let ret = ret.into_return(id, item.invoice_id, actor);
            t.returns.insert(id, ret.clone());
            Ok(ret)
        })
    }

    async fn list_returns(&self, invoice_id: InvoiceId) -> StoreResult<Vec<ItemReturn>> {
        self.read(|t| {
            t.invoice(invoice_id)?;
            Ok(t.returns
                .values()
                .filter(|r| r.invoice_id == invoice_id)
                .cloned()
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use imprint_core::{Decimal, UserId};
    use rust_decimal_macros::dec;

    fn actor() -> Actor {
        Actor::now(UserId::new(1))
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

    fn pay(invoice_id: InvoiceId, amount: Decimal) -> NewPayment {
        NewPayment {
            invoice_id,
            amount,
            payment_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            reference_number: None,
            reference_type: None,
            notes: String::new(),
        }
    }

    #[tokio::test]
    async fn panicking_writer_leaves_the_store_usable() {
        let store = InMemoryLedgerStore::new();
        let record = store
            .insert_invoice(NewInvoice::default(), vec![line(dec!(10), dec!(0))], &actor())
            .await
            .unwrap();

        let crashed = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = store.write(|t| -> StoreResult<()> {
                t.invoices.clear();
                panic!("arithmetic overflow");
            });
        }));
        assert!(crashed.is_err());

        let after = store.load_invoice(record.invoice.id).await.unwrap();
        assert_eq!(after.items.len(), 1);
        store.record_payment(pay(record.invoice.id, dec!(4)), &actor()).await.unwrap();
    }

    #[tokio::test]
    async fn failed_batch_leaves_items_untouched() {
        let store = InMemoryLedgerStore::new();
        let record = store
            .insert_invoice(NewInvoice::default(), vec![line(dec!(10), Decimal::ZERO)], &actor())
            .await
            .unwrap();
        let item_id = record.items[0].id;

        let err = store
            .allocate_item_payments(
                record.invoice.id,
                vec![
                    ItemAllocation { item_id, paid_amount: dec!(10) },
                    ItemAllocation { item_id: InvoiceItemId::new(99), paid_amount: dec!(1) },
                ],
                &actor(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.row_index(), Some(1));

        let after = store.load_invoice(record.invoice.id).await.unwrap();
        assert_eq!(after.items[0].paid_amount, Decimal::ZERO);
    }

    #[tokio::test]
    async fn failed_item_insert_rolls_back_header() {
        let store = InMemoryLedgerStore::new();
        let mut bad = line(dec!(10), Decimal::ZERO);
        bad.product_id = Some(ProductId::new(42));

        let err = store
            .insert_invoice(NewInvoice::default(), vec![line(dec!(5), Decimal::ZERO), bad], &actor())
            .await
            .unwrap_err();
        assert_eq!(err.row_index(), Some(1));
        assert!(store.list_invoices(&InvoiceQuery::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn snapshot_counts_every_payment_on_the_invoice() {
        let store = InMemoryLedgerStore::new();
        let record = store
            .insert_invoice(NewInvoice::default(), vec![line(dec!(100), Decimal::ZERO)], &actor())
            .await
            .unwrap();
        let id = record.invoice.id;

        store.record_payment(pay(id, dec!(30)), &actor()).await.unwrap();
        let second = store.record_payment(pay(id, dec!(50)), &actor()).await.unwrap();
        assert_eq!(second.snapshot.paid, dec!(80.00));
        assert_eq!(second.snapshot.remaining, dec!(20.00));

        // Earlier snapshots are not refreshed.
        let payments = store.list_payments(Some(id)).await.unwrap();
        assert_eq!(payments[0].snapshot.paid, dec!(30.00));
    }

    #[tokio::test]
    async fn bulk_upsert_reports_index_and_commits_nothing() {
        let store = InMemoryLedgerStore::new();
        let record = store
            .insert_invoice(NewInvoice::default(), vec![line(dec!(100), Decimal::ZERO)], &actor())
            .await
            .unwrap();
        let id = record.invoice.id;

        let rows = vec![
            PaymentUpsert { id: None, payment: pay(id, dec!(10)) },
            PaymentUpsert { id: Some(PaymentId::new(77)), payment: pay(id, dec!(10)) },
        ];
        let err = store.upsert_payments(rows, &actor()).await.unwrap_err();
        assert_eq!(err.row_index(), Some(1));
        assert!(err.is_not_found());
        assert!(store.list_payments(Some(id)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_list_value_conflicts() {
        let store = InMemoryLedgerStore::new();
        let new = NewListItem {
            kind: imprint_core::ListKind::PaymentMethod,
            value: "cash".into(),
            display_name_en: "Cash".into(),
            display_name_ar: "نقدي".into(),
            is_active: true,
        };
        store.insert_list_item(new.clone()).await.unwrap();
        let err = store.insert_list_item(new).await.unwrap_err();
        assert!(matches!(err.root(), StoreError::Domain(DomainError::Conflict(_))));
    }
}
