//! Item-level payment allocation.
//!
//! Recording a payment only touches the ledger. Moving money onto items is a
//! separate, explicitly invoked step: recalculation, FIFO redistribution of
//! the ledger total, or manual per-item allocation.

use serde::{Deserialize, Serialize};

use imprint_core::money::quantize;
use imprint_core::{Actor, Decimal, DomainError, InvoiceItemId};

use crate::item::InvoiceItem;

/// A failing row in a batch, with its position in the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    pub index: usize,
    pub error: DomainError,
}

impl core::fmt::Display for RowError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "row {}: {}", self.index, self.error)
    }
}

impl std::error::Error for RowError {}

/// Repair derived item fields. Returns the ids of items that changed.
pub fn recalculate_items(items: &mut [InvoiceItem], actor: &Actor) -> Vec<InvoiceItemId> {
    let mut changed = Vec::new();
    for item in items.iter_mut() {
        if item.recalculate() {
            item.meta.touch(actor);
            changed.push(item.id);
        }
    }
    changed
}

/// Outcome of a FIFO redistribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    pub allocated: Decimal,
    /// Part of the ledger total exceeding the sum of item totals.
    pub unallocated: Decimal,
}

/// Spread `ledger_paid` over the items in ascending id order, each item
/// absorbing up to its `total_price`. Previous allocations are replaced.
pub fn distribute(items: &mut [InvoiceItem], ledger_paid: Decimal, actor: &Actor) -> Distribution {
    items.sort_by_key(|item| item.id);

    let mut budget = quantize(ledger_paid.max(Decimal::ZERO));
    let mut allocated = Decimal::ZERO;
    for item in items.iter_mut() {
        let share = budget.min(item.total_price).max(Decimal::ZERO);
        budget -= share;
        allocated += share;
        if item.paid_amount != share {
            item.paid_amount = share;
            item.meta.touch(actor);
        }
        item.recalculate();
    }

    Distribution {
        allocated: quantize(allocated),
        unallocated: quantize(budget),
    }
}

/// Explicit item-level paid amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAllocation {
    pub item_id: InvoiceItemId,
    pub paid_amount: Decimal,
}

/// Apply allocations in order. The first failing row aborts with its index;
/// callers discard `items` in that case.
pub fn apply_allocations(
    items: &mut [InvoiceItem],
    allocations: &[ItemAllocation],
    actor: &Actor,
) -> Result<(), RowError> {
    for (index, allocation) in allocations.iter().enumerate() {
        let item = items
            .iter_mut()
            .find(|item| item.id == allocation.item_id)
            .ok_or_else(|| RowError {
                index,
                error: DomainError::not_found("invoice item", allocation.item_id),
            })?;
        item.set_paid_amount(allocation.paid_amount, actor)
            .map_err(|error| RowError { index, error })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use imprint_core::{InvoiceId, UserId};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    use crate::item::NewInvoiceItem;

    fn actor() -> Actor {
        Actor::now(UserId::new(1))
    }

    fn item(id: i64, total: Decimal, paid: Decimal) -> InvoiceItem {
        NewInvoiceItem {
            product_id: None,
            quantity: 1,
            unit_price: total,
            discount_percent: Decimal::ZERO,
            total_price: Some(total),
            paid_amount: paid,
        }
        .into_item(InvoiceItemId::new(id), InvoiceId::new(1), &actor())
    }

    #[test]
    fn recalculation_repairs_drifted_items_once() {
        let mut items = vec![item(1, dec!(10), dec!(10)), item(2, dec!(10), dec!(0))];
        // Simulate a row written without recomputation.
        items[1].paid_amount = dec!(10);

        let first = recalculate_items(&mut items, &actor());
        assert_eq!(first, vec![InvoiceItemId::new(2)]);
        assert!(items[1].is_paid);

        let snapshot = items.clone();
        let second = recalculate_items(&mut items, &actor());
        assert!(second.is_empty());
        assert_eq!(items, snapshot);
    }

    #[test]
    fn distribute_fills_items_in_id_order() {
        let mut items = vec![item(2, dec!(50), dec!(0)), item(1, dec!(30), dec!(0))];
        let result = distribute(&mut items, dec!(45), &actor());

        assert_eq!(items[0].id, InvoiceItemId::new(1));
        assert_eq!(items[0].paid_amount, dec!(30));
        assert!(items[0].is_paid);
        assert_eq!(items[1].paid_amount, dec!(15));
        assert_eq!(items[1].remaining_amount, dec!(35));
        assert_eq!(result.allocated, dec!(45));
        assert_eq!(result.unallocated, Decimal::ZERO);
    }

    #[test]
    fn distribute_reports_overpayment() {
        let mut items = vec![item(1, dec!(30), dec!(0))];
        let result = distribute(&mut items, dec!(40), &actor());
        assert_eq!(result.allocated, dec!(30));
        assert_eq!(result.unallocated, dec!(10));
    }

    #[test]
    fn allocation_reports_failing_index() {
        let mut items = vec![item(1, dec!(30), dec!(0)), item(2, dec!(20), dec!(0))];
        let allocations = [
            ItemAllocation { item_id: InvoiceItemId::new(1), paid_amount: dec!(30) },
            ItemAllocation { item_id: InvoiceItemId::new(9), paid_amount: dec!(5) },
        ];
        let err = apply_allocations(&mut items, &allocations, &actor()).unwrap_err();
        assert_eq!(err.index, 1);
        assert!(err.error.is_not_found());

        let negative = [ItemAllocation { item_id: InvoiceItemId::new(2), paid_amount: dec!(-1) }];
        let err = apply_allocations(&mut items, &negative, &actor()).unwrap_err();
        assert_eq!(err.index, 0);
    }

    proptest! {
        #[test]
        fn distribute_never_exceeds_item_totals(
            totals in prop::collection::vec(0i64..100_000, 1..6),
            ledger in 0i64..1_000_000,
        ) {
            let mut items: Vec<InvoiceItem> = totals
                .iter()
                .enumerate()
                .map(|(i, t)| item(i as i64 + 1, Decimal::new(*t, 2), Decimal::ZERO))
                .collect();
            let result = distribute(&mut items, Decimal::new(ledger, 2), &actor());

            let paid: Decimal = items.iter().map(|i| i.paid_amount).sum();
            prop_assert_eq!(paid, result.allocated);
            prop_assert_eq!(result.allocated + result.unallocated, Decimal::new(ledger, 2));
            for i in &items {
                prop_assert!(i.paid_amount <= i.total_price);
                prop_assert!(i.remaining_amount >= Decimal::ZERO);
            }
        }
    }
}
