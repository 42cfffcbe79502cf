//! Invoice filters.
//!
//! [`InvoiceQuery`] covers stored columns and is pushed down to the store.
//! [`PaymentStatusCategory`] works on derived settlement figures and is
//! applied in memory after the rows are loaded.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use imprint_core::{CustomerId, Decimal, DomainError, InvoiceId, WarehouseId};

use crate::invoice::Invoice;
use crate::settlement::Settlement;

/// Main (no parent) vs sub (has parent) invoices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceScope {
    #[default]
    All,
    Main,
    Sub,
}

/// Store-level invoice filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceQuery {
    #[serde(default)]
    pub scope: InvoiceScope,
    #[serde(default)]
    pub main_invoice: Option<InvoiceId>,
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    #[serde(default)]
    pub warehouse_id: Option<WarehouseId>,
    /// Case-insensitive substring match over notes and composite id.
    #[serde(default)]
    pub search: Option<String>,
}

impl InvoiceQuery {
    pub fn children_of(parent: InvoiceId) -> Self {
        Self {
            scope: InvoiceScope::Sub,
            main_invoice: Some(parent),
            ..Self::default()
        }
    }

    pub fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    pub fn matches(&self, invoice: &Invoice) -> bool {
        let scope_ok = match self.scope {
            InvoiceScope::All => true,
            InvoiceScope::Main => invoice.main_invoice.is_none(),
            InvoiceScope::Sub => invoice.main_invoice.is_some(),
        };
        if !scope_ok {
            return false;
        }
        if self.main_invoice.is_some() && invoice.main_invoice != self.main_invoice {
            return false;
        }
        if self.customer_id.is_some() && invoice.customer_id != self.customer_id {
            return false;
        }
        if self.warehouse_id.is_some() && invoice.warehouse_id != self.warehouse_id {
            return false;
        }
        match self.search_term() {
            Some(term) => {
                invoice.notes.to_lowercase().contains(&term)
                    || invoice.composite_id.as_str().to_lowercase().contains(&term)
            }
            None => true,
        }
    }
}

/// Payment-status buckets over the item view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatusCategory {
    FullyPaid,
    /// Strictly between 0% and 100% allocated.
    PartiallyPaid,
    /// Nothing allocated and something owed.
    Unpaid,
    /// Something allocated and not settled within tolerance.
    HasPartialPayments,
}

impl PaymentStatusCategory {
    pub fn matches(self, settlement: &Settlement) -> bool {
        match self {
            PaymentStatusCategory::FullyPaid => settlement.is_fully_paid,
            PaymentStatusCategory::PartiallyPaid => {
                !settlement.is_fully_paid
                    && settlement.payment_status > Decimal::ZERO
                    && settlement.payment_status < Decimal::ONE_HUNDRED
            }
            PaymentStatusCategory::Unpaid => {
                !settlement.is_fully_paid && settlement.total_paid_amount.is_zero()
            }
            PaymentStatusCategory::HasPartialPayments => settlement.has_partial_payments,
        }
    }
}

impl FromStr for PaymentStatusCategory {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fully_paid" => Ok(Self::FullyPaid),
            "partially_paid" => Ok(Self::PartiallyPaid),
            "unpaid" => Ok(Self::Unpaid),
            "has_partial_payments" => Ok(Self::HasPartialPayments),
            other => Err(DomainError::field(
                "payment_status",
                format!(
                    "unknown payment status '{other}' (expected fully_paid, partially_paid, unpaid or has_partial_payments)"
                ),
            )),
        }
    }
}

/// Full invoice filter: stored columns plus an optional derived bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvoiceFilter {
    pub query: InvoiceQuery,
    pub payment_status: Option<PaymentStatusCategory>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use imprint_core::{Actor, RecordMeta, UserId};
    use rust_decimal_macros::dec;

    use crate::invoice::NewInvoice;

    fn invoice(id: i64, parent: Option<i64>, notes: &str) -> Invoice {
        let new = NewInvoice {
            main_invoice: parent.map(InvoiceId::new),
            customer_id: Some(CustomerId::new(1)),
            notes: notes.into(),
            ..NewInvoice::default()
        };
        Invoice::from_new(
            InvoiceId::new(id),
            new,
            RecordMeta::created(&Actor::now(UserId::new(1))),
        )
    }

    #[test]
    fn scope_splits_main_and_sub() {
        let main = invoice(1, None, "");
        let sub = invoice(2, Some(1), "");

        let q = InvoiceQuery { scope: InvoiceScope::Main, ..Default::default() };
        assert!(q.matches(&main) && !q.matches(&sub));

        let q = InvoiceQuery { scope: InvoiceScope::Sub, ..Default::default() };
        assert!(!q.matches(&main) && q.matches(&sub));

        assert!(InvoiceQuery::children_of(InvoiceId::new(1)).matches(&sub));
        assert!(!InvoiceQuery::children_of(InvoiceId::new(5)).matches(&sub));
    }

    #[test]
    fn search_covers_notes_and_composite_id() {
        let sub = invoice(12, Some(7), "Book fair in Riyadh");
        let q = |s: &str| InvoiceQuery { search: Some(s.into()), ..Default::default() };
        assert!(q("riyadh").matches(&sub));
        assert!(q("7_12").matches(&sub));
        assert!(!q("cairo").matches(&sub));
        assert!(q("   ").matches(&sub));
    }

    #[test]
    fn categories_follow_settlement_flags() {
        let unpaid = Settlement::from_parts(Decimal::ZERO, Decimal::ZERO, [(dec!(10), dec!(0))]);
        let partial = Settlement::from_parts(Decimal::ZERO, Decimal::ZERO, [(dec!(10), dec!(4))]);
        let full = Settlement::from_parts(Decimal::ZERO, Decimal::ZERO, [(dec!(10), dec!(10))]);
        let free = Settlement::from_parts(Decimal::ZERO, Decimal::ZERO, []);

        assert!(PaymentStatusCategory::Unpaid.matches(&unpaid));
        assert!(!PaymentStatusCategory::Unpaid.matches(&free));
        assert!(PaymentStatusCategory::PartiallyPaid.matches(&partial));
        assert!(PaymentStatusCategory::HasPartialPayments.matches(&partial));
        assert!(PaymentStatusCategory::FullyPaid.matches(&full));
        assert!(PaymentStatusCategory::FullyPaid.matches(&free));
        assert!(!PaymentStatusCategory::HasPartialPayments.matches(&full));
    }

    #[test]
    fn parses_categories() {
        assert_eq!(
            "has_partial_payments".parse::<PaymentStatusCategory>().unwrap(),
            PaymentStatusCategory::HasPartialPayments
        );
        assert!("overdue".parse::<PaymentStatusCategory>().is_err());
    }
}
