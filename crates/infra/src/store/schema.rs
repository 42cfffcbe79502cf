//! Relational schema for the ledger store.
//!
//! Applied idempotently at startup by [`super::PostgresLedgerStore::ensure_schema`].

pub(super) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS list_items (
    id              BIGSERIAL PRIMARY KEY,
    list_type       TEXT    NOT NULL,
    value           TEXT    NOT NULL,
    display_name_en TEXT    NOT NULL,
    display_name_ar TEXT    NOT NULL DEFAULT '',
    is_active       BOOLEAN NOT NULL DEFAULT TRUE,
    UNIQUE (list_type, value)
);

CREATE TABLE IF NOT EXISTS parties (
    id         BIGSERIAL PRIMARY KEY,
    party_type TEXT NOT NULL,
    name       TEXT NOT NULL,
    details    TEXT NOT NULL DEFAULT '',
    UNIQUE (party_type, id)
);

CREATE TABLE IF NOT EXISTS contracts (
    id                 BIGSERIAL PRIMARY KEY,
    project_id         BIGINT NOT NULL,
    contract_type_id   BIGINT NULL REFERENCES list_items (id) ON DELETE SET NULL,
    party_type         TEXT   NOT NULL,
    party_id           BIGINT NOT NULL,
    commission_percent NUMERIC(5, 2) NULL,
    fixed_amount       NUMERIC(12, 2) NULL CHECK (fixed_amount >= 0),
    free_copies        INTEGER NULL,
    duration_months    INTEGER NULL,
    payment_schedule   TEXT NOT NULL DEFAULT '',
    created_by         BIGINT NULL,
    updated_by         BIGINT NULL,
    created_at         TIMESTAMPTZ NOT NULL,
    updated_at         TIMESTAMPTZ NOT NULL,
    FOREIGN KEY (party_type, party_id) REFERENCES parties (party_type, id) ON DELETE RESTRICT
);

CREATE TABLE IF NOT EXISTS customers (
    id               BIGSERIAL PRIMARY KEY,
    customer_type_id BIGINT NULL REFERENCES list_items (id) ON DELETE SET NULL,
    institution_name TEXT NOT NULL,
    contact_person   TEXT NULL,
    phone            TEXT NULL,
    email            TEXT NULL,
    created_by       BIGINT NULL,
    updated_by       BIGINT NULL,
    created_at       TIMESTAMPTZ NOT NULL,
    updated_at       TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS products (
    id                BIGSERIAL PRIMARY KEY,
    project_id        BIGINT NULL,
    isbn              TEXT NOT NULL,
    title             TEXT NOT NULL,
    price             NUMERIC(12, 2) NOT NULL CHECK (price >= 0),
    print_cost        NUMERIC(12, 2) NOT NULL CHECK (print_cost >= 0),
    status            TEXT NOT NULL,
    genre_id          BIGINT NULL REFERENCES list_items (id) ON DELETE SET NULL,
    published_at      DATE NULL,
    is_direct_product BOOLEAN NOT NULL DEFAULT FALSE,
    created_by        BIGINT NULL,
    updated_by        BIGINT NULL,
    created_at        TIMESTAMPTZ NOT NULL,
    updated_at        TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS warehouses (
    id                BIGSERIAL PRIMARY KEY,
    name_en           TEXT NOT NULL,
    name_ar           TEXT NOT NULL DEFAULT '',
    warehouse_type_id BIGINT NULL REFERENCES list_items (id) ON DELETE SET NULL,
    location          TEXT NOT NULL DEFAULT '',
    created_by        BIGINT NULL,
    updated_by        BIGINT NULL,
    created_at        TIMESTAMPTZ NOT NULL,
    updated_at        TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS inventory (
    id           BIGSERIAL PRIMARY KEY,
    product_id   BIGINT NOT NULL REFERENCES products (id) ON DELETE RESTRICT,
    warehouse_id BIGINT NOT NULL REFERENCES warehouses (id) ON DELETE RESTRICT,
    quantity     INTEGER NOT NULL CHECK (quantity >= 0),
    created_by   BIGINT NULL,
    updated_by   BIGINT NULL,
    created_at   TIMESTAMPTZ NOT NULL,
    updated_at   TIMESTAMPTZ NOT NULL,
    UNIQUE (product_id, warehouse_id)
);

CREATE TABLE IF NOT EXISTS invoices (
    id                BIGSERIAL PRIMARY KEY,
    main_invoice_id   BIGINT NULL REFERENCES invoices (id) ON DELETE SET NULL,
    composite_id      TEXT NULL UNIQUE,
    customer_id       BIGINT NULL REFERENCES customers (id) ON DELETE SET NULL,
    warehouse_id      BIGINT NULL REFERENCES warehouses (id) ON DELETE SET NULL,
    invoice_type_id   BIGINT NULL REFERENCES list_items (id) ON DELETE SET NULL,
    payment_method_id BIGINT NULL REFERENCES list_items (id) ON DELETE SET NULL,
    is_returnable     BOOLEAN NOT NULL DEFAULT TRUE,
    discount_percent  NUMERIC(5, 2) NOT NULL DEFAULT 0,
    tax_percent       NUMERIC(5, 2) NOT NULL DEFAULT 0,
    notes             TEXT NOT NULL DEFAULT '',
    created_by        BIGINT NULL,
    updated_by        BIGINT NULL,
    created_at        TIMESTAMPTZ NOT NULL,
    updated_at        TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS invoices_main_invoice_idx ON invoices (main_invoice_id);

CREATE TABLE IF NOT EXISTS invoice_items (
    id               BIGSERIAL PRIMARY KEY,
    invoice_id       BIGINT NOT NULL REFERENCES invoices (id) ON DELETE CASCADE,
    product_id       BIGINT NULL REFERENCES products (id) ON DELETE SET NULL,
    quantity         INTEGER NOT NULL,
    unit_price       NUMERIC(12, 2) NOT NULL,
    discount_percent NUMERIC(5, 2) NOT NULL DEFAULT 0,
    total_price      NUMERIC(12, 2) NOT NULL,
    paid_amount      NUMERIC(12, 2) NOT NULL DEFAULT 0,
    remaining_amount NUMERIC(12, 2) NOT NULL DEFAULT 0,
    is_paid          BOOLEAN NOT NULL DEFAULT FALSE,
    created_by       BIGINT NULL,
    updated_by       BIGINT NULL,
    created_at       TIMESTAMPTZ NOT NULL,
    updated_at       TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS invoice_items_invoice_idx ON invoice_items (invoice_id);

CREATE TABLE IF NOT EXISTS payments (
    id               BIGSERIAL PRIMARY KEY,
    invoice_id       BIGINT NOT NULL REFERENCES invoices (id) ON DELETE CASCADE,
    amount           NUMERIC(12, 2) NOT NULL CHECK (amount > 0),
    payment_date     DATE NOT NULL,
    reference_number TEXT NULL,
    reference_type   TEXT NULL,
    notes            TEXT NOT NULL DEFAULT '',
    original_total   NUMERIC(12, 2) NOT NULL,
    paid             NUMERIC(12, 2) NOT NULL,
    remaining        NUMERIC(12, 2) NOT NULL,
    ledger_note      TEXT NOT NULL,
    created_by       BIGINT NULL,
    updated_by       BIGINT NULL,
    created_at       TIMESTAMPTZ NOT NULL,
    updated_at       TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS payments_invoice_idx ON payments (invoice_id);

CREATE TABLE IF NOT EXISTS item_returns (
    id                BIGSERIAL PRIMARY KEY,
    invoice_item_id   BIGINT  NOT NULL REFERENCES invoice_items (id) ON DELETE CASCADE,
    invoice_id        BIGINT  NOT NULL REFERENCES invoices (id) ON DELETE CASCADE,
    returned_quantity INTEGER NOT NULL CHECK (returned_quantity > 0),
    return_date       DATE    NOT NULL,
    created_by        BIGINT NULL,
    updated_by        BIGINT NULL,
    created_at        TIMESTAMPTZ NOT NULL,
    updated_at        TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS item_returns_item_idx ON item_returns (invoice_item_id);
"#;
