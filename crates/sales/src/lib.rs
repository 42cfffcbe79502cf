//! Invoice settlement domain.
//!
//! Customers, invoices, line items, payments and returns, plus the pure rules
//! over them: the settlement calculator, child invoice planning and item-level
//! allocation.
//! No IO, no HTTP, no storage.

pub mod allocation;
pub mod child;
pub mod customer;
pub mod filter;
pub mod invoice;
pub mod item;
pub mod payment;
pub mod returns;
pub mod settlement;
pub mod view;

pub use allocation::{
    apply_allocations, distribute, recalculate_items, Distribution, ItemAllocation, RowError,
};
pub use child::{child_note, plan_child_invoice, ChildInvoicePlan};
pub use customer::{Customer, NewCustomer};
pub use filter::{InvoiceFilter, InvoiceQuery, InvoiceScope, PaymentStatusCategory};
pub use invoice::{CompositeId, Invoice, InvoicePatch, NewInvoice};
pub use item::{line_total, InvoiceItem, ItemSnapshot, NewInvoiceItem, MAX_QUANTITY};
pub use payment::{ledger_note, LedgerSnapshot, NewPayment, Payment, PaymentUpsert};
pub use returns::{returned_quantity, ItemReturn, NewReturn};
pub use settlement::{status_percent, subtotal, LedgerView, Settlement, FULLY_PAID_TOLERANCE};
pub use view::{InvoiceRecord, InvoiceView, ItemPaymentStatus, PaymentStatusReport};
