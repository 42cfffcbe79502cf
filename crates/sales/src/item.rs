use serde::{Deserialize, Serialize};

use imprint_core::money::{
    ensure_money_range, ensure_money_scale, ensure_non_negative, ensure_percent, non_negative,
    percent_of, quantize,
};
use imprint_core::{
    Actor, Decimal, DomainError, DomainResult, Entity, InvoiceId, InvoiceItemId, ProductId,
    RecordMeta,
};

/// Invoice line item.
///
/// `paid_amount` is the item-level allocation of payments. `remaining_amount`
/// and `is_paid` are derived from it and recomputed on every save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub id: InvoiceItemId,
    pub invoice_id: InvoiceId,
    pub product_id: Option<ProductId>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub discount_percent: Decimal,
    pub total_price: Decimal,
    pub paid_amount: Decimal,
    pub remaining_amount: Decimal,
    pub is_paid: bool,
    pub meta: RecordMeta,
}

/// Upper bound on a line quantity.
pub const MAX_QUANTITY: i32 = 1_000_000;

/// `quantity * unit_price` less the line discount, quantized.
pub fn line_total(quantity: i32, unit_price: Decimal, discount_percent: Decimal) -> Decimal {
    let gross = Decimal::from(quantity) * unit_price;
    quantize(gross - percent_of(gross, discount_percent))
}

impl InvoiceItem {
    /// Recompute the derived ledger fields from `total_price` and `paid_amount`.
    ///
    /// Returns whether anything changed. Running it twice is a no-op the second time.
    pub fn recalculate(&mut self) -> bool {
        let paid = quantize(non_negative(self.paid_amount));
        let remaining = quantize(non_negative(self.total_price - paid));
        let is_paid = paid >= self.total_price;

        let changed =
            paid != self.paid_amount || remaining != self.remaining_amount || is_paid != self.is_paid;
        self.paid_amount = paid;
        self.remaining_amount = remaining;
        self.is_paid = is_paid;
        changed
    }

    /// Set the item-level paid amount explicitly (manual allocation).
    pub fn set_paid_amount(&mut self, amount: Decimal, actor: &Actor) -> DomainResult<()> {
        ensure_non_negative("paid_amount", amount)?;
        ensure_money_scale("paid_amount", amount)?;
        ensure_money_range("paid_amount", amount)?;
        self.paid_amount = quantize(amount);
        self.recalculate();
        self.meta.touch(actor);
        Ok(())
    }

    /// Verbatim copy of the settlement-relevant fields, used when splitting an
    /// invoice into a child.
    pub fn snapshot(&self) -> ItemSnapshot {
        ItemSnapshot {
            product_id: self.product_id,
            quantity: self.quantity,
            unit_price: self.unit_price,
            discount_percent: self.discount_percent,
            total_price: self.total_price,
            paid_amount: self.paid_amount,
            remaining_amount: self.remaining_amount,
            is_paid: self.is_paid,
        }
    }
}

impl Entity for InvoiceItem {
    type Id = InvoiceItemId;
    const NAME: &'static str = "invoice item";

    fn id(&self) -> InvoiceItemId {
        self.id
    }

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }
}

/// Input for a new line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInvoiceItem {
    #[serde(default)]
    pub product_id: Option<ProductId>,
    pub quantity: i32,
    pub unit_price: Decimal,
    #[serde(default)]
    pub discount_percent: Decimal,
    /// Explicit line total. Computed from quantity, price and discount when absent.
    #[serde(default)]
    pub total_price: Option<Decimal>,
    #[serde(default)]
    pub paid_amount: Decimal,
}

impl NewInvoiceItem {
    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity <= 0 {
            return Err(DomainError::field("quantity", "quantity must be positive"));
        }
        if self.quantity > MAX_QUANTITY {
            return Err(DomainError::field(
                "quantity",
                format!("quantity must not exceed {MAX_QUANTITY}"),
            ));
        }
        ensure_non_negative("unit_price", self.unit_price)?;
        ensure_money_scale("unit_price", self.unit_price)?;
        ensure_money_range("unit_price", self.unit_price)?;
        ensure_percent("discount_percent", self.discount_percent)?;
        if let Some(total) = self.total_price {
            ensure_non_negative("total_price", total)?;
            ensure_money_scale("total_price", total)?;
            ensure_money_range("total_price", total)?;
        }
        ensure_non_negative("paid_amount", self.paid_amount)?;
        ensure_money_scale("paid_amount", self.paid_amount)?;
        ensure_money_range("paid_amount", self.paid_amount)?;
        if self.total_price.is_none() {
            let total = line_total(self.quantity, self.unit_price, self.discount_percent);
            ensure_money_range("total_price", total)?;
        }
        Ok(())
    }

    pub fn into_item(self, id: InvoiceItemId, invoice_id: InvoiceId, actor: &Actor) -> InvoiceItem {
        let total_price = match self.total_price {
            Some(total) => quantize(total),
            None => line_total(self.quantity, self.unit_price, self.discount_percent),
        };
        let mut item = InvoiceItem {
            id,
            invoice_id,
            product_id: self.product_id,
            quantity: self.quantity,
            unit_price: self.unit_price,
            discount_percent: self.discount_percent,
            total_price,
            paid_amount: self.paid_amount,
            remaining_amount: Decimal::ZERO,
            is_paid: false,
            meta: RecordMeta::created(actor),
        };
        item.recalculate();
        item
    }
}

/// Frozen copy of an item's money fields (no live link to the source item).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub product_id: Option<ProductId>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub discount_percent: Decimal,
    pub total_price: Decimal,
    pub paid_amount: Decimal,
    pub remaining_amount: Decimal,
    pub is_paid: bool,
}

impl ItemSnapshot {
    /// Materialize the copy under a new invoice. Values are taken as-is.
    pub fn into_item(self, id: InvoiceItemId, invoice_id: InvoiceId, meta: RecordMeta) -> InvoiceItem {
        InvoiceItem {
            id,
            invoice_id,
            product_id: self.product_id,
            quantity: self.quantity,
            unit_price: self.unit_price,
            discount_percent: self.discount_percent,
            total_price: self.total_price,
            paid_amount: self.paid_amount,
            remaining_amount: self.remaining_amount,
            is_paid: self.is_paid,
            meta,
        }
    }
}
