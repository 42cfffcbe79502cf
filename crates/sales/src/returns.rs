//! Goods coming back against an invoice line.
//!
//! A return only records the quantity and the date. Refunds, if any, go
//! through the payment ledger like every other money movement.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use imprint_core::{
    Actor, DomainError, DomainResult, Entity, InvoiceId, InvoiceItemId, RecordMeta, ReturnId,
};

use crate::invoice::Invoice;
use crate::item::InvoiceItem;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemReturn {
    pub id: ReturnId,
    pub invoice_item: InvoiceItemId,
    /// Invoice of `invoice_item`, kept for listing.
    pub invoice_id: InvoiceId,
    pub returned_quantity: i32,
    pub return_date: NaiveDate,
    pub meta: RecordMeta,
}

impl Entity for ItemReturn {
    type Id = ReturnId;
    const NAME: &'static str = "return";

    fn id(&self) -> ReturnId {
        self.id
    }

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReturn {
    pub invoice_item: InvoiceItemId,
    pub returned_quantity: i32,
    pub return_date: NaiveDate,
}

impl NewReturn {
    pub fn validate(&self) -> DomainResult<()> {
        if self.returned_quantity <= 0 {
            return Err(DomainError::field(
                "returned_quantity",
                "returned_quantity must be positive",
            ));
        }
        Ok(())
    }

    /// Check the return against its line. `already_returned` is the quantity
    /// of earlier returns on the same line.
    pub fn check_against(
        &self,
        invoice: &Invoice,
        item: &InvoiceItem,
        already_returned: i64,
    ) -> DomainResult<()> {
        if !invoice.is_returnable {
            return Err(DomainError::invariant(format!(
                "invoice {} does not accept returns",
                invoice.composite_id
            )));
        }
        let total = already_returned + i64::from(self.returned_quantity);
        if total > i64::from(item.quantity) {
            return Err(DomainError::field(
                "returned_quantity",
                format!(
                    "returning {} would bring item {} to {total} returned of {} sold",
                    self.returned_quantity, item.id, item.quantity
                ),
            ));
        }
        Ok(())
    }

    pub fn into_return(self, id: ReturnId, invoice_id: InvoiceId, actor: &Actor) -> ItemReturn {
        ItemReturn {
            id,
            invoice_item: self.invoice_item,
            invoice_id,
            returned_quantity: self.returned_quantity,
            return_date: self.return_date,
            meta: RecordMeta::created(actor),
        }
    }
}

/// Sum of returned quantities for `item` among `returns`.
pub fn returned_quantity<'a>(
    returns: impl IntoIterator<Item = &'a ItemReturn>,
    item: InvoiceItemId,
) -> i64 {
    returns
        .into_iter()
        .filter(|r| r.invoice_item == item)
        .map(|r| i64::from(r.returned_quantity))
        .sum()
}
