//! Read model: an invoice with its items, payments and derived figures.

use serde::{Deserialize, Serialize};

use imprint_core::{Decimal, InvoiceId, InvoiceItemId};

use crate::invoice::Invoice;
use crate::item::InvoiceItem;
use crate::payment::Payment;
use crate::settlement::{LedgerView, Settlement};

/// Stored rows for one invoice, as loaded from a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub invoice: Invoice,
    pub items: Vec<InvoiceItem>,
    pub payments: Vec<Payment>,
}

impl InvoiceRecord {
    pub fn settlement(&self) -> Settlement {
        Settlement::compute(&self.invoice, &self.items)
    }

    pub fn ledger(&self) -> LedgerView {
        LedgerView::compute(&self.items, &self.payments)
    }
}

/// An invoice as shown to clients: header, items and both paid views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceView {
    #[serde(flatten)]
    pub invoice: Invoice,
    #[serde(flatten)]
    pub settlement: Settlement,
    #[serde(flatten)]
    pub ledger: LedgerView,
    pub items: Vec<InvoiceItem>,
}

impl From<InvoiceRecord> for InvoiceView {
    fn from(record: InvoiceRecord) -> Self {
        let settlement = record.settlement();
        let ledger = record.ledger();
        Self {
            invoice: record.invoice,
            settlement,
            ledger,
            items: record.items,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPaymentStatus {
    pub item_id: InvoiceItemId,
    pub total_price: Decimal,
    pub paid_amount: Decimal,
    pub remaining_amount: Decimal,
    pub is_paid: bool,
}

/// Side-by-side comparison of item allocations and the payment ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatusReport {
    pub invoice_id: InvoiceId,
    pub settlement: Settlement,
    pub ledger: LedgerView,
    pub items_paid_total: Decimal,
    pub ledger_paid_total: Decimal,
    /// Whether item allocations add up to what the ledger recorded.
    pub views_agree: bool,
    pub items: Vec<ItemPaymentStatus>,
}

impl From<&InvoiceRecord> for PaymentStatusReport {
    fn from(record: &InvoiceRecord) -> Self {
        let settlement = record.settlement();
        let ledger = record.ledger();
        let items = record
            .items
            .iter()
            .map(|item| ItemPaymentStatus {
                item_id: item.id,
                total_price: item.total_price,
                paid_amount: item.paid_amount,
                remaining_amount: item.remaining_amount,
                is_paid: item.is_paid,
            })
            .collect();
        Self {
            invoice_id: record.invoice.id,
            items_paid_total: settlement.total_paid_amount,
            ledger_paid_total: ledger.ledger_paid_total,
            views_agree: settlement.total_paid_amount == ledger.ledger_paid_total,
            settlement,
            ledger,
            items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use imprint_core::{Actor, PaymentId, RecordMeta, UserId};
    use rust_decimal_macros::dec;

    use crate::invoice::NewInvoice;
    use crate::item::NewInvoiceItem;
    use crate::payment::{LedgerSnapshot, NewPayment};

    fn record() -> InvoiceRecord {
        let actor = Actor::now(UserId::new(1));
        let invoice = Invoice::from_new(
            InvoiceId::new(1),
            NewInvoice::default(),
            RecordMeta::created(&actor),
        );
        let item = NewInvoiceItem {
            product_id: None,
            quantity: 1,
            unit_price: dec!(100),
            discount_percent: Decimal::ZERO,
            total_price: Some(dec!(100)),
            paid_amount: Decimal::ZERO,
        }
        .into_item(InvoiceItemId::new(1), InvoiceId::new(1), &actor);
        let payment = NewPayment {
            invoice_id: InvoiceId::new(1),
            amount: dec!(30),
            payment_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            reference_number: None,
            reference_type: None,
            notes: String::new(),
        }
        .record(
            PaymentId::new(1),
            LedgerSnapshot::compute(dec!(100), [dec!(30)]),
            &actor,
        );
        InvoiceRecord { invoice, items: vec![item], payments: vec![payment] }
    }

    #[test]
    fn report_exposes_both_paid_views() {
        let report = PaymentStatusReport::from(&record());
        assert_eq!(report.items_paid_total, Decimal::ZERO);
        assert_eq!(report.ledger_paid_total, dec!(30.00));
        assert!(!report.views_agree);
        assert_eq!(report.items.len(), 1);
        assert_eq!(report.items[0].remaining_amount, dec!(100.00));
    }

    #[test]
    fn view_serializes_flat_with_items() {
        let view = InvoiceView::from(record());
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["composite_id"], "1");
        assert_eq!(json["total_amount"], "100.00");
        assert_eq!(json["ledger_paid_total"], "30.00");
        assert_eq!(json["payment_count"], 1);
        assert_eq!(json["items"].as_array().unwrap().len(), 1);
    }
}
