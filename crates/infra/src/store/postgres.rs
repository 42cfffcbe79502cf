//! Postgres-backed ledger store.
//!
//! Every trait method runs in its own transaction. Writers that derive values
//! from the current ledger (payment snapshots, redistribution, child copies)
//! lock the invoice row with `SELECT ... FOR UPDATE` first, so concurrent
//! writers on one invoice are serialized by the database.
//!
//! ## Error Mapping
//!
//! | PostgreSQL error code | StoreError | Scenario |
//! |-----------------------|------------|----------|
//! | `23505` unique violation | `Domain(Conflict)` | duplicate composite id or list value |
//! | `23503` foreign key violation | `Domain(Integrity)` | dangling or still-referenced row |
//! | `23514` check violation | `Domain(Validation)` | value outside a column constraint |
//! | anything else | `Backend` | connectivity, decoding, pool closed |

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgConnection, PgPool, Row};
use tracing::{instrument, Span};

use imprint_catalog::{
    Contract, ContractedParty, Isbn, NewContract, NewParty, NewProduct, Party, PartyKind, Product,
    ProductStatus,
};
use imprint_core::money::quantize;
use imprint_core::{
    Actor, ContractId, CustomerId, Decimal, DomainError, InventoryId, InvoiceId, InvoiceItemId,
    ListItem, ListItemId, ListKind, NewListItem, PartyId, PaymentId, ProductId, ProjectId,
    RecordMeta, ReturnId, UserId, WarehouseId,
};
use imprint_inventory::{InventoryLine, InventoryRecord, NewWarehouse, Warehouse};
use imprint_sales::{
    apply_allocations, distribute, plan_child_invoice, recalculate_items, subtotal, CompositeId,
    Customer, Distribution, Invoice, InvoiceItem, InvoicePatch, InvoiceQuery, InvoiceRecord,
    InvoiceScope, ItemAllocation, ItemReturn, LedgerSnapshot, NewCustomer, NewInvoice,
    NewInvoiceItem, NewPayment, NewReturn, Payment, PaymentUpsert,
};

use super::schema::SCHEMA;
use super::{LedgerStore, StoreError, StoreResult};

const INVOICE_COLUMNS: &str = "id, main_invoice_id, composite_id, customer_id, warehouse_id, \
    invoice_type_id, payment_method_id, is_returnable, discount_percent, tax_percent, notes, \
    created_by, updated_by, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, invoice_id, product_id, quantity, unit_price, discount_percent, \
    total_price, paid_amount, remaining_amount, is_paid, \
    created_by, updated_by, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, invoice_id, amount, payment_date, reference_number, \
    reference_type, notes, original_total, paid, remaining, ledger_note, \
    created_by, updated_by, created_at, updated_at";

const PRODUCT_COLUMNS: &str = "id, project_id, isbn, title, price, print_cost, status, genre_id, \
    published_at, is_direct_product, created_by, updated_by, created_at, updated_at";

const WAREHOUSE_COLUMNS: &str = "id, name_en, name_ar, warehouse_type_id, location, \
    created_by, updated_by, created_at, updated_at";

const CONTRACT_COLUMNS: &str = "id, project_id, contract_type_id, party_type, party_id, \
    commission_percent, fixed_amount, free_copies, duration_months, payment_schedule, \
    created_by, updated_by, created_at, updated_at";

const CUSTOMER_COLUMNS: &str = "id, customer_type_id, institution_name, contact_person, phone, \
    email, created_by, updated_by, created_at, updated_at";

const RETURN_COLUMNS: &str = "id, invoice_item_id, invoice_id, returned_quantity, return_date, \
    created_by, updated_by, created_at, updated_at";

const INVENTORY_COLUMNS: &str = "id, product_id, warehouse_id, quantity, \
    created_by, updated_by, created_at, updated_at";

/// Ledger store on a Postgres connection pool.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create missing tables and indexes.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn begin(&self) -> StoreResult<sqlx::Transaction<'static, sqlx::Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }

    async fn acquire(&self) -> StoreResult<sqlx::pool::PoolConnection<sqlx::Postgres>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire_connection", e))
    }
}

async fn commit(tx: sqlx::Transaction<'static, sqlx::Postgres>) -> StoreResult<()> {
    tx.commit()
        .await
        .map_err(|e| map_sqlx_error("commit_transaction", e))
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("{} ({})", db_err.message(), operation);
            match db_err.code().as_deref() {
                Some("23505") => DomainError::conflict(msg).into(),
                Some("23503") => DomainError::integrity(msg).into(),
                Some("23514") => DomainError::validation(msg).into(),
                _ => StoreError::backend(format!("database error in {operation}: {msg}")),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::backend(format!("connection pool closed in {operation}"))
        }
        other => StoreError::backend(format!("sqlx error in {operation}: {other}")),
    }
}

fn decode_error(err: DomainError) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(err))
}

/// `%term%` for ILIKE with the pattern metacharacters escaped.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn scope_code(scope: InvoiceScope) -> &'static str {
    match scope {
        InvoiceScope::All => "all",
        InvoiceScope::Main => "main",
        InvoiceScope::Sub => "sub",
    }
}

// SQLx row types

fn meta_from_row(row: &PgRow) -> Result<RecordMeta, sqlx::Error> {
    Ok(RecordMeta {
        created_by: row.try_get::<Option<i64>, _>("created_by")?.map(UserId::new),
        updated_by: row.try_get::<Option<i64>, _>("updated_by")?.map(UserId::new),
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

struct ListItemRow(ListItem);

impl<'r> FromRow<'r, PgRow> for ListItemRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let kind: String = row.try_get("list_type")?;
        Ok(Self(ListItem {
            id: ListItemId::new(row.try_get("id")?),
            kind: ListKind::from_code(&kind).map_err(decode_error)?,
            value: row.try_get("value")?,
            display_name_en: row.try_get("display_name_en")?,
            display_name_ar: row.try_get("display_name_ar")?,
            is_active: row.try_get("is_active")?,
        }))
    }
}

fn party_from_row(row: &PgRow, id_column: &str) -> Result<ContractedParty, sqlx::Error> {
    let kind: String = row.try_get("party_type")?;
    let kind = PartyKind::from_code(&kind).map_err(decode_error)?;
    Ok(ContractedParty::new(kind, PartyId::new(row.try_get(id_column)?)))
}

struct PartyRow(Party);

impl<'r> FromRow<'r, PgRow> for PartyRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self(Party {
            party: party_from_row(row, "id")?,
            name: row.try_get("name")?,
            details: row.try_get("details")?,
        }))
    }
}

struct ContractRow(Contract);

impl<'r> FromRow<'r, PgRow> for ContractRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self(Contract {
            id: ContractId::new(row.try_get("id")?),
            project_id: ProjectId::new(row.try_get("project_id")?),
            contract_type: row
                .try_get::<Option<i64>, _>("contract_type_id")?
                .map(ListItemId::new),
            party: party_from_row(row, "party_id")?,
            commission_percent: row.try_get("commission_percent")?,
            fixed_amount: row.try_get("fixed_amount")?,
            free_copies: row.try_get("free_copies")?,
            duration_months: row.try_get("duration_months")?,
            payment_schedule: row.try_get("payment_schedule")?,
            meta: meta_from_row(row)?,
        }))
    }
}

struct CustomerRow(Customer);

impl<'r> FromRow<'r, PgRow> for CustomerRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self(Customer {
            id: CustomerId::new(row.try_get("id")?),
            customer_type: row
                .try_get::<Option<i64>, _>("customer_type_id")?
                .map(ListItemId::new),
            institution_name: row.try_get("institution_name")?,
            contact_person: row.try_get("contact_person")?,
            phone: row.try_get("phone")?,
            email: row.try_get("email")?,
            meta: meta_from_row(row)?,
        }))
    }
}

struct ReturnRow(ItemReturn);

impl<'r> FromRow<'r, PgRow> for ReturnRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self(ItemReturn {
            id: ReturnId::new(row.try_get("id")?),
            invoice_item: InvoiceItemId::new(row.try_get("invoice_item_id")?),
            invoice_id: InvoiceId::new(row.try_get("invoice_id")?),
            returned_quantity: row.try_get("returned_quantity")?,
            return_date: row.try_get("return_date")?,
            meta: meta_from_row(row)?,
        }))
    }
}

struct ProductRow(Product);

impl<'r> FromRow<'r, PgRow> for ProductRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let isbn: String = row.try_get("isbn")?;
        let status: String = row.try_get("status")?;
        Ok(Self(Product {
            id: ProductId::new(row.try_get("id")?),
            project_id: row.try_get::<Option<i64>, _>("project_id")?.map(ProjectId::new),
            isbn: Isbn::parse(&isbn).map_err(decode_error)?,
            title: row.try_get("title")?,
            price: row.try_get("price")?,
            print_cost: row.try_get("print_cost")?,
            status: ProductStatus::parse(&status).map_err(decode_error)?,
            genre: row.try_get::<Option<i64>, _>("genre_id")?.map(ListItemId::new),
            published_at: row.try_get::<Option<NaiveDate>, _>("published_at")?,
            is_direct_product: row.try_get("is_direct_product")?,
            meta: meta_from_row(row)?,
        }))
    }
}

struct WarehouseRow(Warehouse);

impl<'r> FromRow<'r, PgRow> for WarehouseRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self(Warehouse {
            id: WarehouseId::new(row.try_get("id")?),
            name_en: row.try_get("name_en")?,
            name_ar: row.try_get("name_ar")?,
            warehouse_type: row
                .try_get::<Option<i64>, _>("warehouse_type_id")?
                .map(ListItemId::new),
            location: row.try_get("location")?,
            meta: meta_from_row(row)?,
        }))
    }
}

struct InventoryRow(InventoryRecord);

impl<'r> FromRow<'r, PgRow> for InventoryRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self(InventoryRecord {
            id: InventoryId::new(row.try_get("id")?),
            product_id: ProductId::new(row.try_get("product_id")?),
            warehouse_id: WarehouseId::new(row.try_get("warehouse_id")?),
            quantity: row.try_get("quantity")?,
            meta: meta_from_row(row)?,
        }))
    }
}

struct InvoiceRow(Invoice);

impl<'r> FromRow<'r, PgRow> for InvoiceRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let id = InvoiceId::new(row.try_get("id")?);
        let main_invoice = row
            .try_get::<Option<i64>, _>("main_invoice_id")?
            .map(InvoiceId::new);
        let composite_id = match row.try_get::<Option<String>, _>("composite_id")? {
            Some(stored) => CompositeId::from_stored(stored),
            None => CompositeId::for_invoice(id, main_invoice),
        };
        Ok(Self(Invoice {
            id,
            main_invoice,
            composite_id,
            customer_id: row
                .try_get::<Option<i64>, _>("customer_id")?
                .map(CustomerId::new),
            warehouse_id: row
                .try_get::<Option<i64>, _>("warehouse_id")?
                .map(WarehouseId::new),
            invoice_type: row
                .try_get::<Option<i64>, _>("invoice_type_id")?
                .map(ListItemId::new),
            payment_method: row
                .try_get::<Option<i64>, _>("payment_method_id")?
                .map(ListItemId::new),
            is_returnable: row.try_get("is_returnable")?,
            discount_percent: row.try_get("discount_percent")?,
            tax_percent: row.try_get("tax_percent")?,
            notes: row.try_get("notes")?,
            meta: meta_from_row(row)?,
        }))
    }
}

struct ItemRow(InvoiceItem);

impl<'r> FromRow<'r, PgRow> for ItemRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self(InvoiceItem {
            id: InvoiceItemId::new(row.try_get("id")?),
            invoice_id: InvoiceId::new(row.try_get("invoice_id")?),
            product_id: row
                .try_get::<Option<i64>, _>("product_id")?
                .map(ProductId::new),
            quantity: row.try_get("quantity")?,
            unit_price: row.try_get("unit_price")?,
            discount_percent: row.try_get("discount_percent")?,
            total_price: row.try_get("total_price")?,
            paid_amount: row.try_get("paid_amount")?,
            remaining_amount: row.try_get("remaining_amount")?,
            is_paid: row.try_get("is_paid")?,
            meta: meta_from_row(row)?,
        }))
    }
}

struct PaymentRow(Payment);

impl<'r> FromRow<'r, PgRow> for PaymentRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self(Payment {
            id: PaymentId::new(row.try_get("id")?),
            invoice_id: InvoiceId::new(row.try_get("invoice_id")?),
            amount: row.try_get("amount")?,
            payment_date: row.try_get("payment_date")?,
            reference_number: row.try_get("reference_number")?,
            reference_type: row.try_get("reference_type")?,
            notes: row.try_get("notes")?,
            snapshot: LedgerSnapshot {
                original_total: row.try_get("original_total")?,
                paid: row.try_get("paid")?,
                remaining: row.try_get("remaining")?,
            },
            ledger_note: row.try_get("ledger_note")?,
            meta: meta_from_row(row)?,
        }))
    }
}

// Queries shared by several operations. They take a bare connection so they
// run the same inside a transaction or on a pooled connection.

async fn next_id(conn: &mut PgConnection, table: &str) -> StoreResult<i64> {
    let row = sqlx::query("SELECT nextval(pg_get_serial_sequence($1, 'id')) AS id")
        .bind(table)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("next_id", e))?;
    row.try_get("id")
        .map_err(|e| map_sqlx_error("next_id", e))
}

async fn fetch_party(
    conn: &mut PgConnection,
    party: ContractedParty,
) -> StoreResult<Option<Party>> {
    let row = sqlx::query_as::<_, PartyRow>(
        "SELECT id, party_type, name, details FROM parties WHERE id = $1 AND party_type = $2",
    )
    .bind(party.id().get())
    .bind(party.kind().code())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("fetch_party", e))?;
    Ok(row.map(|row| row.0))
}

async fn fetch_invoice(
    conn: &mut PgConnection,
    id: InvoiceId,
    for_update: bool,
) -> StoreResult<Invoice> {
    let sql = format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1{}",
        if for_update { " FOR UPDATE" } else { "" }
    );
    sqlx::query_as::<_, InvoiceRow>(&sql)
        .bind(id.get())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_invoice", e))?
        .map(|row| row.0)
        .ok_or_else(|| DomainError::not_found("invoice", id).into())
}

async fn fetch_items(conn: &mut PgConnection, invoice_id: InvoiceId) -> StoreResult<Vec<InvoiceItem>> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM invoice_items WHERE invoice_id = $1 ORDER BY id");
    let rows = sqlx::query_as::<_, ItemRow>(&sql)
        .bind(invoice_id.get())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_items", e))?;
    Ok(rows.into_iter().map(|row| row.0).collect())
}

async fn fetch_payments(conn: &mut PgConnection, invoice_id: InvoiceId) -> StoreResult<Vec<Payment>> {
    let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE invoice_id = $1 ORDER BY id");
    let rows = sqlx::query_as::<_, PaymentRow>(&sql)
        .bind(invoice_id.get())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_payments", e))?;
    Ok(rows.into_iter().map(|row| row.0).collect())
}

async fn fetch_record(conn: &mut PgConnection, id: InvoiceId) -> StoreResult<InvoiceRecord> {
    let invoice = fetch_invoice(conn, id, false).await?;
    let items = fetch_items(conn, id).await?;
    let payments = fetch_payments(conn, id).await?;
    Ok(InvoiceRecord {
        invoice,
        items,
        payments,
    })
}

async fn exists(conn: &mut PgConnection, sql: &str, id: i64) -> StoreResult<bool> {
    let row = sqlx::query(sql)
        .bind(id)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("exists", e))?;
    row.try_get::<bool, _>(0)
        .map_err(|e| map_sqlx_error("exists", e))
}

async fn insert_invoice_row(
    conn: &mut PgConnection,
    new: NewInvoice,
    meta: RecordMeta,
) -> StoreResult<Invoice> {
    let id = InvoiceId::new(next_id(conn, "invoices").await?);
    let invoice = Invoice::from_new(id, new, meta);

    sqlx::query(
        r#"
        INSERT INTO invoices (
            id, main_invoice_id, composite_id, customer_id, warehouse_id,
            invoice_type_id, payment_method_id, is_returnable, discount_percent,
            tax_percent, notes, created_by, updated_by, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        "#,
    )
    .bind(invoice.id.get())
    .bind(invoice.main_invoice.map(InvoiceId::get))
    .bind(invoice.composite_id.as_str())
    .bind(invoice.customer_id.map(CustomerId::get))
    .bind(invoice.warehouse_id.map(WarehouseId::get))
    .bind(invoice.invoice_type.map(ListItemId::get))
    .bind(invoice.payment_method.map(ListItemId::get))
    .bind(invoice.is_returnable)
    .bind(invoice.discount_percent)
    .bind(invoice.tax_percent)
    .bind(&invoice.notes)
    .bind(invoice.meta.created_by.map(UserId::get))
    .bind(invoice.meta.updated_by.map(UserId::get))
    .bind(invoice.meta.created_at)
    .bind(invoice.meta.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("insert_invoice", e))?;

    Ok(invoice)
}

async fn insert_item_row(conn: &mut PgConnection, item: &InvoiceItem) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO invoice_items (
            id, invoice_id, product_id, quantity, unit_price, discount_percent,
            total_price, paid_amount, remaining_amount, is_paid,
            created_by, updated_by, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(item.id.get())
    .bind(item.invoice_id.get())
    .bind(item.product_id.map(ProductId::get))
    .bind(item.quantity)
    .bind(item.unit_price)
    .bind(item.discount_percent)
    .bind(item.total_price)
    .bind(item.paid_amount)
    .bind(item.remaining_amount)
    .bind(item.is_paid)
    .bind(item.meta.created_by.map(UserId::get))
    .bind(item.meta.updated_by.map(UserId::get))
    .bind(item.meta.created_at)
    .bind(item.meta.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("insert_item", e))?;
    Ok(())
}

async fn insert_new_items(
    conn: &mut PgConnection,
    invoice_id: InvoiceId,
    items: Vec<NewInvoiceItem>,
    actor: &Actor,
) -> StoreResult<Vec<InvoiceItem>> {
    let mut inserted = Vec::with_capacity(items.len());
    for (index, new) in items.into_iter().enumerate() {
        let id = InvoiceItemId::new(next_id(conn, "invoice_items").await?);
        let item = new.into_item(id, invoice_id, actor);
        insert_item_row(conn, &item)
            .await
            .map_err(|e| e.at_row(index))?;
        inserted.push(item);
    }
    Ok(inserted)
}

/// Persist the ledger fields of items changed by recalculation or allocation.
async fn save_item_ledger(conn: &mut PgConnection, items: &[InvoiceItem]) -> StoreResult<()> {
    for item in items {
        sqlx::query(
            r#"
            UPDATE invoice_items
            SET paid_amount = $2, remaining_amount = $3, is_paid = $4,
                updated_by = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(item.id.get())
        .bind(item.paid_amount)
        .bind(item.remaining_amount)
        .bind(item.is_paid)
        .bind(item.meta.updated_by.map(UserId::get))
        .bind(item.meta.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("save_item_ledger", e))?;
    }
    Ok(())
}

async fn append_payment(
    conn: &mut PgConnection,
    new: NewPayment,
    actor: &Actor,
) -> StoreResult<Payment> {
    let invoice_id = new.invoice_id;
    fetch_invoice(conn, invoice_id, true).await?;

    let original_total = subtotal(&fetch_items(conn, invoice_id).await?);
    let mut amounts: Vec<Decimal> = fetch_payments(conn, invoice_id)
        .await?
        .into_iter()
        .map(|p| p.amount)
        .collect();
    amounts.push(quantize(new.amount));
    let snapshot = LedgerSnapshot::compute(original_total, amounts);

    let id = PaymentId::new(next_id(conn, "payments").await?);
    let payment = new.record(id, snapshot, actor);

    sqlx::query(
        r#"
        INSERT INTO payments (
            id, invoice_id, amount, payment_date, reference_number, reference_type,
            notes, original_total, paid, remaining, ledger_note,
            created_by, updated_by, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        "#,
    )
    .bind(payment.id.get())
    .bind(payment.invoice_id.get())
    .bind(payment.amount)
    .bind(payment.payment_date)
    .bind(&payment.reference_number)
    .bind(&payment.reference_type)
    .bind(&payment.notes)
    .bind(payment.snapshot.original_total)
    .bind(payment.snapshot.paid)
    .bind(payment.snapshot.remaining)
    .bind(&payment.ledger_note)
    .bind(payment.meta.created_by.map(UserId::get))
    .bind(payment.meta.updated_by.map(UserId::get))
    .bind(payment.meta.created_at)
    .bind(payment.meta.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("insert_payment", e))?;

    Ok(payment)
}

async fn upsert_payment_row(
    conn: &mut PgConnection,
    row: PaymentUpsert,
    actor: &Actor,
) -> StoreResult<Payment> {
    let Some(id) = row.id else {
        return append_payment(conn, row.payment, actor).await;
    };
    fetch_invoice(conn, row.payment.invoice_id, false).await?;

    let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1 FOR UPDATE");
    let mut payment = sqlx::query_as::<_, PaymentRow>(&sql)
        .bind(id.get())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_payment", e))?
        .map(|row| row.0)
        .ok_or_else(|| StoreError::from(DomainError::not_found("payment", id)))?;

    payment.apply_update(row.payment, actor)?;

    sqlx::query(
        r#"
        UPDATE payments
        SET reference_number = $2, reference_type = $3, notes = $4,
            updated_by = $5, updated_at = $6
        WHERE id = $1
        "#,
    )
    .bind(payment.id.get())
    .bind(&payment.reference_number)
    .bind(&payment.reference_type)
    .bind(&payment.notes)
    .bind(payment.meta.updated_by.map(UserId::get))
    .bind(payment.meta.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("update_payment", e))?;

    Ok(payment)
}

#[async_trait::async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn insert_party(&self, party: NewParty) -> StoreResult<Party> {
        let mut conn = self.acquire().await?;
        let row = sqlx::query_as::<_, PartyRow>(
            r#"
            INSERT INTO parties (party_type, name, details)
            VALUES ($1, $2, $3)
            RETURNING id, party_type, name, details
            "#,
        )
        .bind(party.kind.code())
        .bind(party.name.trim())
        .bind(&party.details)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("insert_party", e))?;
        Ok(row.0)
    }

    async fn get_party(&self, party: ContractedParty) -> StoreResult<Party> {
        let mut conn = self.acquire().await?;
        fetch_party(&mut conn, party)
            .await?
            .ok_or_else(|| DomainError::not_found(party.kind().entity_name(), party.id()).into())
    }

    #[instrument(skip(self, contract, actor), fields(party = party.kind().code(), contract_id), err)]
    async fn insert_contract(
        &self,
        contract: NewContract,
        party: ContractedParty,
        actor: &Actor,
    ) -> StoreResult<Contract> {
        let mut tx = self.begin().await?;
        let id = ContractId::new(next_id(&mut tx, "contracts").await?);
        let contract = contract.into_contract(id, party, actor);

        sqlx::query(
            r#"
            INSERT INTO contracts (
                id, project_id, contract_type_id, party_type, party_id, commission_percent,
                fixed_amount, free_copies, duration_months, payment_schedule,
                created_by, updated_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(contract.id.get())
        .bind(contract.project_id.get())
        .bind(contract.contract_type.map(ListItemId::get))
        .bind(contract.party.kind().code())
        .bind(contract.party.id().get())
        .bind(contract.commission_percent)
        .bind(contract.fixed_amount)
        .bind(contract.free_copies)
        .bind(contract.duration_months)
        .bind(&contract.payment_schedule)
        .bind(contract.meta.created_by.map(UserId::get))
        .bind(contract.meta.updated_by.map(UserId::get))
        .bind(contract.meta.created_at)
        .bind(contract.meta.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_contract", e))?;

        commit(tx).await?;
        Span::current().record("contract_id", contract.id.get());
        Ok(contract)
    }

    async fn get_contract(&self, id: ContractId) -> StoreResult<Contract> {
        let mut conn = self.acquire().await?;
        let sql = format!("SELECT {CONTRACT_COLUMNS} FROM contracts WHERE id = $1");
        sqlx::query_as::<_, ContractRow>(&sql)
            .bind(id.get())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("get_contract", e))?
            .map(|row| row.0)
            .ok_or_else(|| DomainError::not_found("contract", id).into())
    }

    async fn insert_customer(&self, customer: NewCustomer, actor: &Actor) -> StoreResult<Customer> {
        let mut tx = self.begin().await?;
        let id = CustomerId::new(next_id(&mut tx, "customers").await?);
        let customer = customer.into_customer(id, actor);

        sqlx::query(
            r#"
            INSERT INTO customers (
                id, customer_type_id, institution_name, contact_person, phone, email,
                created_by, updated_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(customer.id.get())
        .bind(customer.customer_type.map(ListItemId::get))
        .bind(&customer.institution_name)
        .bind(&customer.contact_person)
        .bind(&customer.phone)
        .bind(&customer.email)
        .bind(customer.meta.created_by.map(UserId::get))
        .bind(customer.meta.updated_by.map(UserId::get))
        .bind(customer.meta.created_at)
        .bind(customer.meta.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_customer", e))?;

        commit(tx).await?;
        Ok(customer)
    }

    async fn get_customer(&self, id: CustomerId) -> StoreResult<Customer> {
        let mut conn = self.acquire().await?;
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1");
        sqlx::query_as::<_, CustomerRow>(&sql)
            .bind(id.get())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("get_customer", e))?
            .map(|row| row.0)
            .ok_or_else(|| DomainError::not_found("customer", id).into())
    }

    async fn insert_list_item(&self, item: NewListItem) -> StoreResult<ListItem> {
        let mut conn = self.acquire().await?;
        let row = sqlx::query_as::<_, ListItemRow>(
            r#"
            INSERT INTO list_items (list_type, value, display_name_en, display_name_ar, is_active)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, list_type, value, display_name_en, display_name_ar, is_active
            "#,
        )
        .bind(item.kind.code())
        .bind(&item.value)
        .bind(&item.display_name_en)
        .bind(&item.display_name_ar)
        .bind(item.is_active)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("insert_list_item", e))?;
        Ok(row.0)
    }

    async fn get_list_item(&self, id: ListItemId) -> StoreResult<ListItem> {
        let mut conn = self.acquire().await?;
        sqlx::query_as::<_, ListItemRow>(
            r#"
            SELECT id, list_type, value, display_name_en, display_name_ar, is_active
            FROM list_items
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("get_list_item", e))?
        .map(|row| row.0)
        .ok_or_else(|| DomainError::not_found("list item", id).into())
    }

    async fn insert_product(&self, product: NewProduct, actor: &Actor) -> StoreResult<Product> {
        let mut tx = self.begin().await?;
        let id = ProductId::new(next_id(&mut tx, "products").await?);
        let product = product.into_product(id, actor);

        sqlx::query(
            r#"
            INSERT INTO products (
                id, project_id, isbn, title, price, print_cost, status, genre_id,
                published_at, is_direct_product, created_by, updated_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(product.id.get())
        .bind(product.project_id.map(ProjectId::get))
        .bind(product.isbn.as_str())
        .bind(&product.title)
        .bind(product.price)
        .bind(product.print_cost)
        .bind(product.status.as_str())
        .bind(product.genre.map(ListItemId::get))
        .bind(product.published_at)
        .bind(product.is_direct_product)
        .bind(product.meta.created_by.map(UserId::get))
        .bind(product.meta.updated_by.map(UserId::get))
        .bind(product.meta.created_at)
        .bind(product.meta.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;

        commit(tx).await?;
        Ok(product)
    }

    async fn get_product(&self, id: ProductId) -> StoreResult<Product> {
        let mut conn = self.acquire().await?;
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id.get())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?
            .map(|row| row.0)
            .ok_or_else(|| DomainError::not_found("product", id).into())
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn delete_product(&self, id: ProductId) -> StoreResult<()> {
        let mut tx = self.begin().await?;
        if !exists(&mut tx, "SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)", id.get()).await? {
            return Err(DomainError::not_found("product", id).into());
        }
        if exists(
            &mut tx,
            "SELECT EXISTS (SELECT 1 FROM inventory WHERE product_id = $1)",
            id.get(),
        )
        .await?
        {
            return Err(DomainError::integrity(format!(
                "product {id} is still referenced by inventory"
            ))
            .into());
        }
        sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_product", e))?;
        commit(tx).await
    }

    async fn insert_warehouse(
        &self,
        warehouse: NewWarehouse,
        actor: &Actor,
    ) -> StoreResult<Warehouse> {
        let mut tx = self.begin().await?;
        let id = WarehouseId::new(next_id(&mut tx, "warehouses").await?);
        let warehouse = warehouse.into_warehouse(id, actor);

        sqlx::query(
            r#"
            INSERT INTO warehouses (
                id, name_en, name_ar, warehouse_type_id, location,
                created_by, updated_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(warehouse.id.get())
        .bind(&warehouse.name_en)
        .bind(&warehouse.name_ar)
        .bind(warehouse.warehouse_type.map(ListItemId::get))
        .bind(&warehouse.location)
        .bind(warehouse.meta.created_by.map(UserId::get))
        .bind(warehouse.meta.updated_by.map(UserId::get))
        .bind(warehouse.meta.created_at)
        .bind(warehouse.meta.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_warehouse", e))?;

        commit(tx).await?;
        Ok(warehouse)
    }

    async fn get_warehouse(&self, id: WarehouseId) -> StoreResult<Warehouse> {
        let mut conn = self.acquire().await?;
        let sql = format!("SELECT {WAREHOUSE_COLUMNS} FROM warehouses WHERE id = $1");
        sqlx::query_as::<_, WarehouseRow>(&sql)
            .bind(id.get())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("get_warehouse", e))?
            .map(|row| row.0)
            .ok_or_else(|| DomainError::not_found("warehouse", id).into())
    }

    #[instrument(skip(self), fields(warehouse_id = %id), err)]
    async fn delete_warehouse(&self, id: WarehouseId) -> StoreResult<()> {
        let mut tx = self.begin().await?;
        if !exists(&mut tx, "SELECT EXISTS (SELECT 1 FROM warehouses WHERE id = $1)", id.get()).await? {
            return Err(DomainError::not_found("warehouse", id).into());
        }
        if exists(
            &mut tx,
            "SELECT EXISTS (SELECT 1 FROM inventory WHERE warehouse_id = $1)",
            id.get(),
        )
        .await?
        {
            return Err(DomainError::integrity(format!(
                "warehouse {id} is still referenced by inventory"
            ))
            .into());
        }
        sqlx::query("DELETE FROM warehouses WHERE id = $1")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_warehouse", e))?;
        commit(tx).await
    }

    #[instrument(skip(self, lines, actor), fields(rows = lines.len()), err)]
    async fn upsert_inventory(
        &self,
        lines: Vec<InventoryLine>,
        actor: &Actor,
    ) -> StoreResult<Vec<InventoryRecord>> {
        let mut tx = self.begin().await?;
        let mut saved = Vec::with_capacity(lines.len());
        let sql = format!(
            r#"
            INSERT INTO inventory (
                product_id, warehouse_id, quantity, created_by, updated_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $4, $5, $5)
            ON CONFLICT (product_id, warehouse_id)
            DO UPDATE SET
                quantity = EXCLUDED.quantity,
                updated_by = EXCLUDED.updated_by,
                updated_at = EXCLUDED.updated_at
            RETURNING {INVENTORY_COLUMNS}
            "#
        );

        for (index, line) in lines.into_iter().enumerate() {
            let product_sql = "SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)";
            if !exists(&mut tx, product_sql, line.product_id.get()).await? {
                return Err(StoreError::from(DomainError::not_found("product", line.product_id))
                    .at_row(index));
            }
            let warehouse_sql = "SELECT EXISTS (SELECT 1 FROM warehouses WHERE id = $1)";
            if !exists(&mut tx, warehouse_sql, line.warehouse_id.get()).await? {
                return Err(StoreError::from(DomainError::not_found(
                    "warehouse",
                    line.warehouse_id,
                ))
                .at_row(index));
            }

            let row = sqlx::query_as::<_, InventoryRow>(&sql)
                .bind(line.product_id.get())
                .bind(line.warehouse_id.get())
                .bind(line.quantity)
                .bind(actor.user_id().get())
                .bind(actor.at())
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("upsert_inventory", e).at_row(index))?;
            saved.push(row.0);
        }

        commit(tx).await?;
        Ok(saved)
    }

    async fn list_inventory(
        &self,
        warehouse: Option<WarehouseId>,
    ) -> StoreResult<Vec<InventoryRecord>> {
        let mut conn = self.acquire().await?;
        let sql = format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventory \
             WHERE ($1::bigint IS NULL OR warehouse_id = $1) ORDER BY id"
        );
        let rows = sqlx::query_as::<_, InventoryRow>(&sql)
            .bind(warehouse.map(WarehouseId::get))
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("list_inventory", e))?;
        Ok(rows.into_iter().map(|row| row.0).collect())
    }

    #[instrument(skip(self, invoice, items, actor), fields(items = items.len(), invoice_id), err)]
    async fn insert_invoice(
        &self,
        invoice: NewInvoice,
        items: Vec<NewInvoiceItem>,
        actor: &Actor,
    ) -> StoreResult<InvoiceRecord> {
        let mut tx = self.begin().await?;
        let invoice = insert_invoice_row(&mut tx, invoice, RecordMeta::created(actor)).await?;
        let items = insert_new_items(&mut tx, invoice.id, items, actor).await?;
        commit(tx).await?;

        Span::current().record("invoice_id", invoice.id.get());
        Ok(InvoiceRecord {
            invoice,
            items,
            payments: Vec::new(),
        })
    }

    async fn load_invoice(&self, id: InvoiceId) -> StoreResult<InvoiceRecord> {
        let mut conn = self.acquire().await?;
        fetch_record(&mut conn, id).await
    }

    async fn list_invoices(&self, query: &InvoiceQuery) -> StoreResult<Vec<InvoiceRecord>> {
        let mut conn = self.acquire().await?;
        let sql = format!(
            r#"
            SELECT {INVOICE_COLUMNS}
            FROM invoices
            WHERE ($1 = 'all'
                   OR ($1 = 'main' AND main_invoice_id IS NULL)
                   OR ($1 = 'sub' AND main_invoice_id IS NOT NULL))
              AND ($2::bigint IS NULL OR main_invoice_id = $2)
              AND ($3::bigint IS NULL OR customer_id = $3)
              AND ($4::bigint IS NULL OR warehouse_id = $4)
              AND ($5::text IS NULL OR notes ILIKE $5 OR composite_id ILIKE $5)
            ORDER BY id
            "#
        );
        let invoices: Vec<Invoice> = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(scope_code(query.scope))
            .bind(query.main_invoice.map(InvoiceId::get))
            .bind(query.customer_id.map(CustomerId::get))
            .bind(query.warehouse_id.map(WarehouseId::get))
            .bind(query.search_term().map(|term| like_pattern(&term)))
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("list_invoices", e))?
            .into_iter()
            .map(|row| row.0)
            .collect();

        let ids: Vec<i64> = invoices.iter().map(|i| i.id.get()).collect();

        let item_sql =
            format!("SELECT {ITEM_COLUMNS} FROM invoice_items WHERE invoice_id = ANY($1) ORDER BY id");
        let mut items: HashMap<InvoiceId, Vec<InvoiceItem>> = HashMap::new();
        for row in sqlx::query_as::<_, ItemRow>(&item_sql)
            .bind(&ids)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("list_invoice_items", e))?
        {
            items.entry(row.0.invoice_id).or_default().push(row.0);
        }

        let payment_sql =
            format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE invoice_id = ANY($1) ORDER BY id");
        let mut payments: HashMap<InvoiceId, Vec<Payment>> = HashMap::new();
        for row in sqlx::query_as::<_, PaymentRow>(&payment_sql)
            .bind(&ids)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("list_invoice_payments", e))?
        {
            payments.entry(row.0.invoice_id).or_default().push(row.0);
        }

        Ok(invoices
            .into_iter()
            .map(|invoice| InvoiceRecord {
                items: items.remove(&invoice.id).unwrap_or_default(),
                payments: payments.remove(&invoice.id).unwrap_or_default(),
                invoice,
            })
            .collect())
    }

    #[instrument(skip(self, patch, actor), fields(invoice_id = %id), err)]
    async fn update_invoice(
        &self,
        id: InvoiceId,
        patch: InvoicePatch,
        actor: &Actor,
    ) -> StoreResult<InvoiceRecord> {
        let mut tx = self.begin().await?;
        let mut invoice = fetch_invoice(&mut tx, id, true).await?;
        patch.apply(&mut invoice, actor);

        sqlx::query(
            r#"
            UPDATE invoices
            SET customer_id = $2, warehouse_id = $3, invoice_type_id = $4,
                payment_method_id = $5, is_returnable = $6, discount_percent = $7,
                tax_percent = $8, notes = $9, updated_by = $10, updated_at = $11
            WHERE id = $1
            "#,
        )
        .bind(invoice.id.get())
        .bind(invoice.customer_id.map(CustomerId::get))
        .bind(invoice.warehouse_id.map(WarehouseId::get))
        .bind(invoice.invoice_type.map(ListItemId::get))
        .bind(invoice.payment_method.map(ListItemId::get))
        .bind(invoice.is_returnable)
        .bind(invoice.discount_percent)
        .bind(invoice.tax_percent)
        .bind(&invoice.notes)
        .bind(invoice.meta.updated_by.map(UserId::get))
        .bind(invoice.meta.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_invoice", e))?;

        let record = fetch_record(&mut tx, id).await?;
        commit(tx).await?;
        Ok(record)
    }

    #[instrument(skip(self), fields(invoice_id = %id), err)]
    async fn delete_invoice(&self, id: InvoiceId) -> StoreResult<()> {
        let mut tx = self.begin().await?;
        fetch_invoice(&mut tx, id, true).await?;
        // Items, payments and returns cascade; children are detached by ON DELETE SET NULL.
        sqlx::query("DELETE FROM invoices WHERE id = $1")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_invoice", e))?;
        commit(tx).await
    }

    async fn insert_items(
        &self,
        invoice_id: InvoiceId,
        items: Vec<NewInvoiceItem>,
        actor: &Actor,
    ) -> StoreResult<Vec<InvoiceItem>> {
        let mut tx = self.begin().await?;
        fetch_invoice(&mut tx, invoice_id, true).await?;
        let items = insert_new_items(&mut tx, invoice_id, items, actor).await?;
        commit(tx).await?;
        Ok(items)
    }

    #[instrument(skip(self, actor), fields(invoice_id = %invoice_id, changed), err)]
    async fn recalculate_items(
        &self,
        invoice_id: InvoiceId,
        actor: &Actor,
    ) -> StoreResult<Vec<InvoiceItemId>> {
        let mut tx = self.begin().await?;
        fetch_invoice(&mut tx, invoice_id, true).await?;
        let mut items = fetch_items(&mut tx, invoice_id).await?;
        let changed = recalculate_items(&mut items, actor);
        let dirty: Vec<InvoiceItem> = items
            .into_iter()
            .filter(|item| changed.contains(&item.id))
            .collect();
        save_item_ledger(&mut tx, &dirty).await?;
        commit(tx).await?;

        Span::current().record("changed", changed.len());
        Ok(changed)
    }

    #[instrument(skip(self, actor), fields(invoice_id = %invoice_id), err)]
    async fn distribute_ledger_payments(
        &self,
        invoice_id: InvoiceId,
        actor: &Actor,
    ) -> StoreResult<Distribution> {
        let mut tx = self.begin().await?;
        fetch_invoice(&mut tx, invoice_id, true).await?;
        let ledger_paid: Decimal = fetch_payments(&mut tx, invoice_id)
            .await?
            .iter()
            .map(|p| p.amount)
            .sum();
        let mut items = fetch_items(&mut tx, invoice_id).await?;
        let distribution = distribute(&mut items, ledger_paid, actor);
        save_item_ledger(&mut tx, &items).await?;
        commit(tx).await?;
        Ok(distribution)
    }

    #[instrument(skip(self, allocations, actor), fields(invoice_id = %invoice_id, rows = allocations.len()), err)]
    async fn allocate_item_payments(
        &self,
        invoice_id: InvoiceId,
        allocations: Vec<ItemAllocation>,
        actor: &Actor,
    ) -> StoreResult<Vec<InvoiceItem>> {
        let mut tx = self.begin().await?;
        fetch_invoice(&mut tx, invoice_id, true).await?;
        let mut items = fetch_items(&mut tx, invoice_id).await?;
        apply_allocations(&mut items, &allocations, actor)?;
        save_item_ledger(&mut tx, &items).await?;
        commit(tx).await?;
        Ok(items)
    }

    #[instrument(skip(self, actor), fields(parent_id = %parent, child_id), err)]
    async fn generate_child_invoice(
        &self,
        parent: InvoiceId,
        paid_items_only: bool,
        actor: &Actor,
    ) -> StoreResult<InvoiceRecord> {
        let mut tx = self.begin().await?;
        let parent = fetch_invoice(&mut tx, parent, true).await?;
        let items = fetch_items(&mut tx, parent.id).await?;
        let plan = plan_child_invoice(&parent, &items, paid_items_only, actor);

        let child = insert_invoice_row(&mut tx, plan.invoice, plan.meta.clone()).await?;
        let mut copied = Vec::with_capacity(plan.items.len());
        for snapshot in plan.items {
            let id = InvoiceItemId::new(next_id(&mut tx, "invoice_items").await?);
            let item = snapshot.into_item(id, child.id, plan.meta.clone());
            insert_item_row(&mut tx, &item).await?;
            copied.push(item);
        }
        commit(tx).await?;

        Span::current().record("child_id", child.id.get());
        Ok(InvoiceRecord {
            invoice: child,
            items: copied,
            payments: Vec::new(),
        })
    }

    #[instrument(skip(self, payment, actor), fields(invoice_id = %payment.invoice_id, amount = %payment.amount), err)]
    async fn record_payment(&self, payment: NewPayment, actor: &Actor) -> StoreResult<Payment> {
        let mut tx = self.begin().await?;
        let payment = append_payment(&mut tx, payment, actor).await?;
        commit(tx).await?;
        Ok(payment)
    }

    #[instrument(skip(self, rows, actor), fields(rows = rows.len()), err)]
    async fn upsert_payments(
        &self,
        rows: Vec<PaymentUpsert>,
        actor: &Actor,
    ) -> StoreResult<Vec<Payment>> {
        let mut tx = self.begin().await?;
        let mut saved = Vec::with_capacity(rows.len());
        for (index, row) in rows.into_iter().enumerate() {
            let payment = upsert_payment_row(&mut tx, row, actor)
                .await
                .map_err(|e| e.at_row(index))?;
            saved.push(payment);
        }
        commit(tx).await?;
        Ok(saved)
    }

    async fn list_payments(&self, invoice_id: Option<InvoiceId>) -> StoreResult<Vec<Payment>> {
        let mut conn = self.acquire().await?;
        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments \
             WHERE ($1::bigint IS NULL OR invoice_id = $1) ORDER BY id"
        );
        let rows = sqlx::query_as::<_, PaymentRow>(&sql)
            .bind(invoice_id.map(InvoiceId::get))
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("list_payments", e))?;
        Ok(rows.into_iter().map(|row| row.0).collect())
    }

    #[instrument(skip(self), fields(payment_id = %id), err)]
    async fn delete_payment(&self, id: PaymentId) -> StoreResult<()> {
        let mut conn = self.acquire().await?;
        let result = sqlx::query("DELETE FROM payments WHERE id = $1")
            .bind(id.get())
            .execute(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("delete_payment", e))?;
        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("payment", id).into());
        }
        Ok(())
    }

    #[instrument(skip(self, ret, actor), fields(item_id = %ret.invoice_item, quantity = ret.returned_quantity), err)]
    async fn record_return(&self, ret: NewReturn, actor: &Actor) -> StoreResult<ItemReturn> {
        let mut tx = self.begin().await?;
        let sql = format!("SELECT {ITEM_COLUMNS} FROM invoice_items WHERE id = $1");
        let item = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(ret.invoice_item.get())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("fetch_item", e))?
            .map(|row| row.0)
            .ok_or_else(|| {
                StoreError::from(DomainError::not_found("invoice item", ret.invoice_item))
            })?;
        // Locking the invoice serializes returns on its lines.
        let invoice = fetch_invoice(&mut tx, item.invoice_id, true).await?;

        let returned: i64 = sqlx::query(
            "SELECT COALESCE(SUM(returned_quantity), 0)::bigint AS returned \
             FROM item_returns WHERE invoice_item_id = $1",
        )
        .bind(item.id.get())
        .fetch_one(&mut *tx)
        .await
        .and_then(|row| row.try_get("returned"))
        .map_err(|e| map_sqlx_error("sum_returns", e))?;
        ret.check_against(&invoice, &item, returned)?;

        let id = ReturnId::new(next_id(&mut tx, "item_returns").await?);
        let ret = ret.into_return(id, item.invoice_id, actor);
        sqlx::query(
            r#"
            INSERT INTO item_returns (
                id, invoice_item_id, invoice_id, returned_quantity, return_date,
                created_by, updated_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(ret.id.get())
        .bind(ret.invoice_item.get())
        .bind(ret.invoice_id.get())
        .bind(ret.returned_quantity)
        .bind(ret.return_date)
        .bind(ret.meta.created_by.map(UserId::get))
        .bind(ret.meta.updated_by.map(UserId::get))
        .bind(ret.meta.created_at)
        .bind(ret.meta.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_return", e))?;

        commit(tx).await?;
        Ok(ret)
    }

    async fn list_returns(&self, invoice_id: InvoiceId) -> StoreResult<Vec<ItemReturn>> {
        let mut conn = self.acquire().await?;
        fetch_invoice(&mut conn, invoice_id, false).await?;
        let sql =
            format!("SELECT {RETURN_COLUMNS} FROM item_returns WHERE invoice_id = $1 ORDER BY id");
        let rows = sqlx::query_as::<_, ReturnRow>(&sql)
            .bind(invoice_id.get())
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("list_returns", e))?;
        Ok(rows.into_iter().map(|row| row.0).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("7_1"), "%7\\_1%");
        assert_eq!(like_pattern("50%"), "%50\\%%");
        assert_eq!(like_pattern("riyadh"), "%riyadh%");
    }

    #[test]
    fn scope_codes_match_query_literals() {
        assert_eq!(scope_code(InvoiceScope::All), "all");
        assert_eq!(scope_code(InvoiceScope::Main), "main");
        assert_eq!(scope_code(InvoiceScope::Sub), "sub");
    }

    #[test]
    fn non_database_errors_are_backend_errors() {
        let err = map_sqlx_error("load", sqlx::Error::PoolClosed);
        assert!(matches!(err, StoreError::Backend(ref m) if m.contains("load")));
    }
}
