use serde::{Deserialize, Deserializer, Serialize};

use imprint_core::money::ensure_percent;
use imprint_core::{
    Actor, CustomerId, Decimal, DomainResult, Entity, InvoiceId, ListItemId, RecordMeta,
    WarehouseId,
};

/// Display identifier of an invoice: `"{id}"` for a root invoice and
/// `"{parent_id}_{id}"` for a child.
///
/// Derived once, when the row has its own id, and never rewritten afterwards
/// (not even when the parent is deleted and `main_invoice` is cleared).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompositeId(String);

impl CompositeId {
    pub fn for_invoice(id: InvoiceId, parent: Option<InvoiceId>) -> Self {
        match parent {
            Some(parent) => Self(format!("{parent}_{id}")),
            None => Self(id.to_string()),
        }
    }

    /// Rehydrate a value previously produced by [`CompositeId::for_invoice`].
    pub fn from_stored(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for CompositeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Invoice header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    /// Parent ("main") invoice. Non-owning; cleared when the parent is deleted.
    pub main_invoice: Option<InvoiceId>,
    pub composite_id: CompositeId,
    pub customer_id: Option<CustomerId>,
    pub warehouse_id: Option<WarehouseId>,
    pub invoice_type: Option<ListItemId>,
    pub payment_method: Option<ListItemId>,
    pub is_returnable: bool,
    /// Global discount applied to the subtotal, in percent.
    pub discount_percent: Decimal,
    /// Tax applied to the discounted subtotal, in percent.
    pub tax_percent: Decimal,
    pub notes: String,
    pub meta: RecordMeta,
}

impl Invoice {
    /// Materialize a new invoice once the store has assigned `id`.
    pub fn from_new(id: InvoiceId, new: NewInvoice, meta: RecordMeta) -> Self {
        Self {
            id,
            composite_id: CompositeId::for_invoice(id, new.main_invoice),
            main_invoice: new.main_invoice,
            customer_id: new.customer_id,
            warehouse_id: new.warehouse_id,
            invoice_type: new.invoice_type,
            payment_method: new.payment_method,
            is_returnable: new.is_returnable,
            discount_percent: new.discount_percent,
            tax_percent: new.tax_percent,
            notes: new.notes,
            meta,
        }
    }

    pub fn is_main(&self) -> bool {
        self.main_invoice.is_none()
    }

    /// Called by stores when the parent row disappears.
    pub fn detach_from_parent(&mut self) {
        self.main_invoice = None;
    }
}

impl Entity for Invoice {
    type Id = InvoiceId;
    const NAME: &'static str = "invoice";

    fn id(&self) -> InvoiceId {
        self.id
    }

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }
}

fn default_true() -> bool {
    true
}

/// Input for a new invoice header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInvoice {
    #[serde(default)]
    pub main_invoice: Option<InvoiceId>,
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    #[serde(default)]
    pub warehouse_id: Option<WarehouseId>,
    #[serde(default)]
    pub invoice_type: Option<ListItemId>,
    #[serde(default)]
    pub payment_method: Option<ListItemId>,
    #[serde(default = "default_true")]
    pub is_returnable: bool,
    #[serde(default)]
    pub discount_percent: Decimal,
    #[serde(default)]
    pub tax_percent: Decimal,
    #[serde(default)]
    pub notes: String,
}

impl Default for NewInvoice {
    fn default() -> Self {
        Self {
            main_invoice: None,
            customer_id: None,
            warehouse_id: None,
            invoice_type: None,
            payment_method: None,
            is_returnable: true,
            discount_percent: Decimal::ZERO,
            tax_percent: Decimal::ZERO,
            notes: String::new(),
        }
    }
}

impl NewInvoice {
    pub fn validate(&self) -> DomainResult<()> {
        ensure_percent("discount_percent", self.discount_percent)?;
        ensure_percent("tax_percent", self.tax_percent)?;
        Ok(())
    }
}

/// Partial update of an invoice header.
///
/// Identity fields (`id`, `composite_id`, `main_invoice`) are not patchable.
/// The reference fields distinguish "absent" (unchanged) from an explicit
/// `null`, which clears the reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoicePatch {
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<Option<CustomerId>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub warehouse_id: Option<Option<WarehouseId>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub invoice_type: Option<Option<ListItemId>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<Option<ListItemId>>,
    #[serde(default)]
    pub is_returnable: Option<bool>,
    #[serde(default)]
    pub discount_percent: Option<Decimal>,
    #[serde(default)]
    pub tax_percent: Option<Decimal>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A present field, `null` included, becomes `Some`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl InvoicePatch {
    pub fn validate(&self) -> DomainResult<()> {
        if let Some(d) = self.discount_percent {
            ensure_percent("discount_percent", d)?;
        }
        if let Some(t) = self.tax_percent {
            ensure_percent("tax_percent", t)?;
        }
        Ok(())
    }

    pub fn apply(self, invoice: &mut Invoice, actor: &Actor) {
        if let Some(v) = self.customer_id {
            invoice.customer_id = v;
        }
        if let Some(v) = self.warehouse_id {
            invoice.warehouse_id = v;
        }
        if let Some(v) = self.invoice_type {
            invoice.invoice_type = v;
        }
        if let Some(v) = self.payment_method {
            invoice.payment_method = v;
        }
        if let Some(v) = self.is_returnable {
            invoice.is_returnable = v;
        }
        if let Some(v) = self.discount_percent {
            invoice.discount_percent = v;
        }
        if let Some(v) = self.tax_percent {
            invoice.tax_percent = v;
        }
        if let Some(v) = self.notes {
            invoice.notes = v;
        }
        invoice.meta.touch(actor);
    }
}
