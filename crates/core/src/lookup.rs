//! Generic code/value lookup table.
//!
//! Reference data such as invoice types, payment methods, genres and statuses
//! lives in a single table of [`ListItem`]s grouped by [`ListKind`].

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::ListItemId;

/// The lists the backend knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    InvoiceType,
    PaymentMethod,
    CustomerType,
    WarehouseType,
    Genre,
    Status,
    ContractType,
}

impl ListKind {
    pub fn code(self) -> &'static str {
        match self {
            ListKind::InvoiceType => "invoice_type",
            ListKind::PaymentMethod => "payment_method",
            ListKind::CustomerType => "customer_type",
            ListKind::WarehouseType => "warehouse_type",
            ListKind::Genre => "genre",
            ListKind::Status => "status",
            ListKind::ContractType => "contract_type",
        }
    }

    pub fn from_code(code: &str) -> DomainResult<Self> {
        match code {
            "invoice_type" => Ok(ListKind::InvoiceType),
            "payment_method" => Ok(ListKind::PaymentMethod),
            "customer_type" => Ok(ListKind::CustomerType),
            "warehouse_type" => Ok(ListKind::WarehouseType),
            "genre" => Ok(ListKind::Genre),
            "status" => Ok(ListKind::Status),
            "contract_type" => Ok(ListKind::ContractType),
            other => Err(DomainError::field("list_type", format!("unknown list type: {other}"))),
        }
    }
}

/// A lookup entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListItem {
    pub id: ListItemId,
    pub kind: ListKind,
    pub value: String,
    pub display_name_en: String,
    pub display_name_ar: String,
    pub is_active: bool,
}

/// Input for a new lookup entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewListItem {
    pub kind: ListKind,
    pub value: String,
    pub display_name_en: String,
    pub display_name_ar: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl NewListItem {
    pub fn validate(&self) -> DomainResult<()> {
        if self.value.trim().is_empty() {
            return Err(DomainError::field("value", "value must not be empty"));
        }
        Ok(())
    }

    pub fn into_item(self, id: ListItemId) -> ListItem {
        ListItem {
            id,
            kind: self.kind,
            value: self.value,
            display_name_en: self.display_name_en,
            display_name_ar: self.display_name_ar,
            is_active: self.is_active,
        }
    }
}

impl ListItem {
    /// Check that this entry may be referenced from a `field` that expects `kind`.
    pub fn ensure_usable_as(&self, field: &str, kind: ListKind) -> DomainResult<()> {
        if self.kind != kind {
            return Err(DomainError::field(
                field,
                format!(
                    "list item {} belongs to {}, expected {}",
                    self.id,
                    self.kind.code(),
                    kind.code()
                ),
            ));
        }
        if !self.is_active {
            return Err(DomainError::field(
                field,
                format!("list item {} is inactive", self.id),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(kind: ListKind, active: bool) -> ListItem {
        NewListItem {
            kind,
            value: "cash".into(),
            display_name_en: "Cash".into(),
            display_name_ar: "نقدي".into(),
            is_active: active,
        }
        .into_item(ListItemId::new(3))
    }

    #[test]
    fn codes_round_trip() {
        for kind in [
            ListKind::InvoiceType,
            ListKind::PaymentMethod,
            ListKind::CustomerType,
            ListKind::WarehouseType,
            ListKind::Genre,
            ListKind::Status,
            ListKind::ContractType,
        ] {
            assert_eq!(ListKind::from_code(kind.code()).unwrap(), kind);
        }
        assert!(ListKind::from_code("colour").is_err());
    }

    #[test]
    fn wrong_list_or_inactive_is_rejected() {
        let pm = item(ListKind::PaymentMethod, true);
        assert!(pm.ensure_usable_as("payment_method", ListKind::PaymentMethod).is_ok());
        assert!(pm.ensure_usable_as("invoice_type", ListKind::InvoiceType).is_err());

        let inactive = item(ListKind::PaymentMethod, false);
        let err = inactive
            .ensure_usable_as("payment_method", ListKind::PaymentMethod)
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { field: Some(f), .. } if f == "payment_method"));
    }
}
