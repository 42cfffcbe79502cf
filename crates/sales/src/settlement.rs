//! Settlement calculator: every money figure of an invoice, derived from its
//! items and payments.
//!
//! Two independent notions of "paid" exist and are kept apart:
//!
//! - the **item view** ([`Settlement`]): the sum of item-level `paid_amount`
//!   allocations, measured against the grand total;
//! - the **ledger view** ([`LedgerView`]): the sum of recorded payment amounts,
//!   measured against the gross subtotal.
//!
//! Nothing here reconciles them; callers read whichever they need.

use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use imprint_core::money::{HUNDRED, non_negative, percent_of, quantize};
use imprint_core::Decimal;

use crate::invoice::Invoice;
use crate::item::InvoiceItem;
use crate::payment::Payment;

/// Tolerance used by [`Settlement::is_fully_paid`].
///
/// Percentage discounts and tax produce sub-cent noise; an invoice whose item
/// allocations fall short of the grand total by less than this still counts as
/// settled.
pub const FULLY_PAID_TOLERANCE: Decimal = dec!(0.001);

/// Sum of item line totals.
pub fn subtotal(items: &[InvoiceItem]) -> Decimal {
    quantize(items.iter().map(|i| i.total_price).sum())
}

/// `paid / total * 100`, or `100` for a zero total (free invoices are settled).
pub fn status_percent(paid: Decimal, total: Decimal) -> Decimal {
    if total.is_zero() {
        return quantize(HUNDRED);
    }
    quantize(paid / total * HUNDRED)
}

/// Item-view settlement figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub subtotal_amount: Decimal,
    pub global_discount_amount: Decimal,
    pub discounted_subtotal: Decimal,
    pub tax_amount: Decimal,
    /// Grand total, the authoritative amount owed.
    pub total_amount: Decimal,
    /// Sum of item-level paid amounts.
    pub total_paid_amount: Decimal,
    pub total_remaining_amount: Decimal,
    /// Percentage of the grand total covered by item allocations.
    pub payment_status: Decimal,
    pub is_fully_paid: bool,
    pub has_partial_payments: bool,
}

impl Settlement {
    pub fn compute(invoice: &Invoice, items: &[InvoiceItem]) -> Self {
        Self::from_parts(
            invoice.discount_percent,
            invoice.tax_percent,
            items.iter().map(|i| (i.total_price, i.paid_amount)),
        )
    }

    /// Core arithmetic over `(total_price, paid_amount)` pairs.
    ///
    /// Intermediate figures are reported quantized but the grand total is
    /// computed from the exact values and quantized once.
    pub fn from_parts(
        discount_percent: Decimal,
        tax_percent: Decimal,
        lines: impl IntoIterator<Item = (Decimal, Decimal)>,
    ) -> Self {
        let (subtotal, paid) = lines
            .into_iter()
            .fold((Decimal::ZERO, Decimal::ZERO), |(s, p), (total, paid)| {
                (s + total, p + paid)
            });

        let discount = percent_of(subtotal, discount_percent);
        let discounted = subtotal - discount;
        let tax = percent_of(discounted, tax_percent);
        let total_amount = quantize(discounted + tax);

        let total_paid_amount = quantize(paid);
        let total_remaining_amount = quantize(non_negative(total_amount - total_paid_amount));
        let is_fully_paid = total_paid_amount + FULLY_PAID_TOLERANCE >= total_amount;

        Self {
            subtotal_amount: quantize(subtotal),
            global_discount_amount: quantize(discount),
            discounted_subtotal: quantize(discounted),
            tax_amount: quantize(tax),
            total_amount,
            total_paid_amount,
            total_remaining_amount,
            payment_status: status_percent(total_paid_amount, total_amount),
            is_fully_paid,
            has_partial_payments: total_paid_amount > Decimal::ZERO && !is_fully_paid,
        }
    }
}

/// Ledger-view figures computed from recorded payments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerView {
    /// Gross subtotal the ledger measures payments against.
    pub ledger_total: Decimal,
    pub ledger_paid_total: Decimal,
    pub ledger_remaining_amount: Decimal,
    pub ledger_payment_status: Decimal,
    pub payment_count: usize,
}

impl LedgerView {
    pub fn compute(items: &[InvoiceItem], payments: &[Payment]) -> Self {
        let ledger_total = subtotal(items);
        let ledger_paid_total = quantize(payments.iter().map(|p| p.amount).sum());
        Self {
            ledger_total,
            ledger_paid_total,
            ledger_remaining_amount: quantize(non_negative(ledger_total - ledger_paid_total)),
            ledger_payment_status: status_percent(ledger_paid_total, ledger_total),
            payment_count: payments.len(),
        }
    }
}
