use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use imprint_core::money::{
    ensure_money_range, ensure_money_scale, ensure_positive, non_negative, quantize,
};
use imprint_core::{
    Actor, Decimal, DomainError, DomainResult, Entity, InvoiceId, PaymentId, RecordMeta,
};

/// Invoice-level totals as of the moment a payment was recorded.
///
/// `original_total` is the invoice subtotal (gross, before global discount and
/// tax): the ledger denominates the amount owed in gross terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub original_total: Decimal,
    pub paid: Decimal,
    pub remaining: Decimal,
}

impl LedgerSnapshot {
    /// `amounts` must include every payment on the invoice, the new one too.
    pub fn compute(original_total: Decimal, amounts: impl IntoIterator<Item = Decimal>) -> Self {
        let original_total = quantize(original_total);
        let paid = quantize(amounts.into_iter().sum());
        Self {
            original_total,
            paid,
            remaining: quantize(non_negative(original_total - paid)),
        }
    }
}

/// A settlement event in the payment ledger.
///
/// Amount and date are fixed at creation; the snapshot is computed once and is
/// not refreshed when later payments arrive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub invoice_id: InvoiceId,
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    pub reference_number: Option<String>,
    pub reference_type: Option<String>,
    pub notes: String,
    #[serde(flatten)]
    pub snapshot: LedgerSnapshot,
    /// Generated summary of the payment against the ledger at recording time.
    pub ledger_note: String,
    pub meta: RecordMeta,
}

impl Entity for Payment {
    type Id = PaymentId;
    const NAME: &'static str = "payment";

    fn id(&self) -> PaymentId {
        self.id
    }

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }
}

/// Input for recording a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPayment {
    pub invoice_id: InvoiceId,
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub reference_type: Option<String>,
    #[serde(default)]
    pub notes: String,
}

impl NewPayment {
    pub fn validate(&self) -> DomainResult<()> {
        ensure_positive("amount", self.amount)?;
        ensure_money_scale("amount", self.amount)?;
        ensure_money_range("amount", self.amount)?;
        Ok(())
    }

    /// Build the ledger row. `snapshot` must already account for this payment.
    pub fn record(self, id: PaymentId, snapshot: LedgerSnapshot, actor: &Actor) -> Payment {
        let amount = quantize(self.amount);
        let ledger_note = ledger_note(
            amount,
            self.payment_date,
            &snapshot,
            self.reference_number.as_deref(),
        );
        Payment {
            id,
            invoice_id: self.invoice_id,
            amount,
            payment_date: self.payment_date,
            reference_number: self.reference_number,
            reference_type: self.reference_type,
            notes: self.notes,
            snapshot,
            ledger_note,
            meta: RecordMeta::created(actor),
        }
    }
}

/// Human-readable ledger line, e.g.
/// `Payment of 30.00 on 2024-05-01 (ref TX-9): paid 30.00 of 100.00, remaining 70.00`.
pub fn ledger_note(
    amount: Decimal,
    date: NaiveDate,
    snapshot: &LedgerSnapshot,
    reference: Option<&str>,
) -> String {
    let reference = match reference {
        Some(r) if !r.trim().is_empty() => format!(" (ref {})", r.trim()),
        _ => String::new(),
    };
    format!(
        "Payment of {amount} on {date}{reference}: paid {} of {}, remaining {}",
        snapshot.paid, snapshot.original_total, snapshot.remaining
    )
}

/// Row of a bulk payment upsert: `id` present updates an existing payment,
/// absent records a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentUpsert {
    #[serde(default)]
    pub id: Option<PaymentId>,
    #[serde(flatten)]
    pub payment: NewPayment,
}

impl Payment {
    /// Apply an update from a bulk upsert row.
    ///
    /// Only reference and note fields are mutable; invoice, amount and date are
    /// part of the ledger and must match the stored row.
    pub fn apply_update(&mut self, update: NewPayment, actor: &Actor) -> DomainResult<()> {
        if update.invoice_id != self.invoice_id {
            return Err(DomainError::field(
                "invoice_id",
                "a payment cannot be moved to another invoice",
            ));
        }
        if quantize(update.amount) != self.amount {
            return Err(DomainError::field(
                "amount",
                "amount of a recorded payment is immutable",
            ));
        }
        if update.payment_date != self.payment_date {
            return Err(DomainError::field(
                "payment_date",
                "date of a recorded payment is immutable",
            ));
        }
        self.reference_number = update.reference_number;
        self.reference_type = update.reference_type;
        self.notes = update.notes;
        self.meta.touch(actor);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imprint_core::UserId;
    use rust_decimal_macros::dec;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn new_payment(amount: Decimal) -> NewPayment {
        NewPayment {
            invoice_id: InvoiceId::new(1),
            amount,
            payment_date: date(),
            reference_number: Some("TX-9".into()),
            reference_type: Some("transfer".into()),
            notes: String::new(),
        }
    }

    #[test]
    fn first_payment_snapshot() {
        let snap = LedgerSnapshot::compute(dec!(100.00), [dec!(30.00)]);
        assert_eq!(snap.paid, dec!(30.00));
        assert_eq!(snap.remaining, dec!(70.00));
        assert_eq!(snap.original_total, dec!(100.00));
    }

    #[test]
    fn overpayment_never_goes_negative() {
        let snap = LedgerSnapshot::compute(dec!(100.00), [dec!(80), dec!(40)]);
        assert_eq!(snap.paid, dec!(120.00));
        assert_eq!(snap.remaining, Decimal::ZERO);
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        for amount in [Decimal::ZERO, dec!(-5)] {
            let err = new_payment(amount).validate().unwrap_err();
            assert!(matches!(err, DomainError::Validation { field: Some(ref f), .. } if f == "amount"));
        }
        assert!(new_payment(dec!(0.001)).validate().is_err());
    }

    #[test]
    fn amounts_beyond_the_column_are_rejected() {
        let huge: Decimal = "50000000000000000000000000000".parse().unwrap();
        let err = new_payment(huge).validate().unwrap_err();
        assert!(matches!(err, DomainError::Validation { field: Some(ref f), .. } if f == "amount"));
        assert!(new_payment(dec!(9999999999.99)).validate().is_ok());
    }

    #[test]
    fn record_generates_ledger_note() {
        let snap = LedgerSnapshot::compute(dec!(100), [dec!(30)]);
        let payment = new_payment(dec!(30)).record(
            PaymentId::new(1),
            snap,
            &Actor::now(UserId::new(2)),
        );
        assert_eq!(
            payment.ledger_note,
            "Payment of 30.00 on 2024-05-01 (ref TX-9): paid 30.00 of 100.00, remaining 70.00"
        );
        assert_eq!(payment.meta.created_by, Some(UserId::new(2)));
    }

    #[test]
    fn update_only_touches_reference_fields() {
        let actor = Actor::now(UserId::new(1));
        let mut payment = new_payment(dec!(30)).record(
            PaymentId::new(1),
            LedgerSnapshot::compute(dec!(100), [dec!(30)]),
            &actor,
        );

        let mut update = new_payment(dec!(30.00));
        update.notes = "confirmed by bank".into();
        payment.apply_update(update, &actor).unwrap();
        assert_eq!(payment.notes, "confirmed by bank");

        let err = payment.apply_update(new_payment(dec!(31)), &actor).unwrap_err();
        assert!(matches!(err, DomainError::Validation { field: Some(ref f), .. } if f == "amount"));
    }
}
