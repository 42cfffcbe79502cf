//! Child invoice generation.
//!
//! A child ("sub") invoice is a follow-on bill split off a parent ("main")
//! invoice. Planning is pure; the store materializes the plan inside one
//! transaction and assigns the composite id once the child row has an id.

use imprint_core::{Actor, RecordMeta};

use crate::invoice::{Invoice, NewInvoice};
use crate::item::{InvoiceItem, ItemSnapshot};

/// Everything needed to persist a child invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildInvoicePlan {
    pub invoice: NewInvoice,
    /// Ownership carried over from the parent; timestamps are the actor's.
    pub meta: RecordMeta,
    pub items: Vec<ItemSnapshot>,
}

/// Note stamped on a generated child.
pub fn child_note(parent: &Invoice) -> String {
    format!("Generated from invoice #{}", parent.composite_id)
}

/// Plan a child of `parent`.
///
/// With `paid_items_only` only items with `is_paid` are copied, otherwise all
/// items are. Copies are verbatim snapshots of the items at planning time.
pub fn plan_child_invoice(
    parent: &Invoice,
    items: &[InvoiceItem],
    paid_items_only: bool,
    actor: &Actor,
) -> ChildInvoicePlan {
    let invoice = NewInvoice {
        main_invoice: Some(parent.id),
        customer_id: parent.customer_id,
        warehouse_id: parent.warehouse_id,
        invoice_type: parent.invoice_type,
        payment_method: parent.payment_method,
        is_returnable: parent.is_returnable,
        discount_percent: parent.discount_percent,
        tax_percent: parent.tax_percent,
        notes: child_note(parent),
    };

    let mut selected: Vec<&InvoiceItem> = items
        .iter()
        .filter(|item| item.invoice_id == parent.id)
        .filter(|item| !paid_items_only || item.is_paid)
        .collect();
    selected.sort_by_key(|item| item.id);

    ChildInvoicePlan {
        invoice,
        meta: RecordMeta::inherited(&parent.meta, actor),
        items: selected.into_iter().map(InvoiceItem::snapshot).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use imprint_core::{CustomerId, Decimal, InvoiceId, InvoiceItemId, ListItemId, UserId, WarehouseId};
    use rust_decimal_macros::dec;

    use crate::item::NewInvoiceItem;

    fn owner() -> Actor {
        Actor::new(UserId::new(10), Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    fn clerk() -> Actor {
        Actor::new(UserId::new(20), Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap())
    }

    fn parent() -> Invoice {
        let new = NewInvoice {
            customer_id: Some(CustomerId::new(4)),
            warehouse_id: Some(WarehouseId::new(2)),
            invoice_type: Some(ListItemId::new(1)),
            payment_method: Some(ListItemId::new(2)),
            is_returnable: false,
            discount_percent: dec!(5),
            tax_percent: dec!(15),
            notes: "spring order".into(),
            ..NewInvoice::default()
        };
        Invoice::from_new(InvoiceId::new(8), new, RecordMeta::created(&owner()))
    }

    fn item(id: i64, total: Decimal, paid: Decimal) -> InvoiceItem {
        NewInvoiceItem {
            product_id: None,
            quantity: 2,
            unit_price: total / dec!(2),
            discount_percent: Decimal::ZERO,
            total_price: Some(total),
            paid_amount: paid,
        }
        .into_item(InvoiceItemId::new(id), InvoiceId::new(8), &owner())
    }

    #[test]
    fn paid_only_copies_paid_items_verbatim() {
        let a = item(1, dec!(30.00), dec!(30.00));
        let b = item(2, dec!(20.00), dec!(5.00));
        let plan = plan_child_invoice(&parent(), &[b.clone(), a.clone()], true, &clerk());

        assert_eq!(plan.items, vec![a.snapshot()]);
        assert_eq!(plan.invoice.main_invoice, Some(InvoiceId::new(8)));
        assert_eq!(plan.invoice.notes, "Generated from invoice #8");
    }

    #[test]
    fn all_items_mode_copies_everything_in_id_order() {
        let a = item(1, dec!(30.00), dec!(30.00));
        let b = item(2, dec!(20.00), dec!(5.00));
        let plan = plan_child_invoice(&parent(), &[b.clone(), a.clone()], false, &clerk());
        assert_eq!(plan.items, vec![a.snapshot(), b.snapshot()]);
    }

    #[test]
    fn header_and_ownership_are_inherited() {
        let p = parent();
        let plan = plan_child_invoice(&p, &[], true, &clerk());

        assert_eq!(plan.invoice.customer_id, p.customer_id);
        assert_eq!(plan.invoice.warehouse_id, p.warehouse_id);
        assert_eq!(plan.invoice.invoice_type, p.invoice_type);
        assert_eq!(plan.invoice.payment_method, p.payment_method);
        assert!(!plan.invoice.is_returnable);
        assert_eq!(plan.invoice.discount_percent, dec!(5));
        assert_eq!(plan.meta.created_by, Some(UserId::new(10)));
        assert_eq!(plan.meta.updated_by, Some(UserId::new(10)));
        assert_eq!(plan.meta.created_at, clerk().at());
        assert!(plan.items.is_empty());
    }
}
