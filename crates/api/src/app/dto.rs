use core::str::FromStr;

use serde::Deserialize;

use imprint_core::{DomainError, DomainResult, InvoiceId, WarehouseId};
use imprint_sales::{
    InvoiceFilter, InvoiceQuery, InvoiceScope, ItemAllocation, NewInvoice, NewInvoiceItem,
    PaymentStatusCategory,
};

// -------------------------
// Request DTOs
// -------------------------

/// Invoice header fields at the top level plus the initial items.
#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    #[serde(flatten)]
    pub invoice: NewInvoice,
    #[serde(default)]
    pub items: Vec<NewInvoiceItem>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateChildRequest {
    #[serde(default = "default_paid_items_only")]
    pub paid_items_only: bool,
}

fn default_paid_items_only() -> bool {
    true
}

impl Default for GenerateChildRequest {
    fn default() -> Self {
        Self {
            paid_items_only: default_paid_items_only(),
        }
    }
}

impl GenerateChildRequest {
    /// An empty body means the defaults; anything else must be valid JSON,
    /// whatever the `Content-Type` says.
    pub fn from_body(body: &[u8]) -> DomainResult<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| DomainError::validation(format!("invalid request body: {e}")))
    }
}

#[derive(Debug, Deserialize)]
pub struct AllocationsRequest {
    pub allocations: Vec<ItemAllocation>,
}

// -------------------------
// Query strings
// -------------------------

/// `GET /invoices` query. Values stay strings so that bad input becomes a
/// field-level validation error instead of an extractor rejection.
#[derive(Debug, Default, Deserialize)]
pub struct InvoiceListParams {
    pub scope: Option<String>,
    pub main_invoice: Option<String>,
    pub customer_id: Option<String>,
    pub warehouse_id: Option<String>,
    pub search: Option<String>,
    pub payment_status: Option<String>,
}

fn parse_opt<T>(field: &str, raw: Option<&str>) -> DomainResult<Option<T>>
where
    T: FromStr<Err = DomainError>,
{
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s
            .parse::<T>()
            .map(Some)
            .map_err(|e| DomainError::field(field, e.to_string())),
    }
}

fn parse_scope(raw: Option<&str>) -> DomainResult<InvoiceScope> {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        None | Some("") | Some("all") => Ok(InvoiceScope::All),
        Some("main") => Ok(InvoiceScope::Main),
        Some("sub") => Ok(InvoiceScope::Sub),
        Some(other) => Err(DomainError::field(
            "scope",
            format!("unknown scope '{other}' (expected main or sub)"),
        )),
    }
}

impl InvoiceListParams {
    pub fn into_filter(self) -> DomainResult<InvoiceFilter> {
        let query = InvoiceQuery {
            scope: parse_scope(self.scope.as_deref())?,
            main_invoice: parse_opt("main_invoice", self.main_invoice.as_deref())?,
            customer_id: parse_opt("customer_id", self.customer_id.as_deref())?,
            warehouse_id: parse_opt("warehouse_id", self.warehouse_id.as_deref())?,
            search: self.search,
        };
        let payment_status = match self.payment_status.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<PaymentStatusCategory>()?),
        };
        Ok(InvoiceFilter {
            query,
            payment_status,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PaymentListParams {
    pub invoice_id: Option<String>,
}

impl PaymentListParams {
    pub fn invoice_id(&self) -> DomainResult<Option<InvoiceId>> {
        parse_opt("invoice_id", self.invoice_id.as_deref())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct InventoryListParams {
    pub warehouse_id: Option<String>,
}

impl InventoryListParams {
    pub fn warehouse_id(&self) -> DomainResult<Option<WarehouseId>> {
        parse_opt("warehouse_id", self.warehouse_id.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_params_build_filter() {
        let params = InvoiceListParams {
            scope: Some("Sub".into()),
            main_invoice: Some("4".into()),
            payment_status: Some("partially_paid".into()),
            ..InvoiceListParams::default()
        };
        let filter = params.into_filter().unwrap();
        assert_eq!(filter.query.scope, InvoiceScope::Sub);
        assert_eq!(filter.query.main_invoice, Some(InvoiceId::new(4)));
        assert_eq!(filter.payment_status, Some(PaymentStatusCategory::PartiallyPaid));
    }

    #[test]
    fn bad_numbers_name_their_field() {
        let params = InvoiceListParams {
            customer_id: Some("x".into()),
            ..InvoiceListParams::default()
        };
        match params.into_filter().unwrap_err() {
            DomainError::Validation { field, .. } => assert_eq!(field.as_deref(), Some("customer_id")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn child_request_body_parsing() {
        assert!(GenerateChildRequest::from_body(b"").unwrap().paid_items_only);
        assert!(GenerateChildRequest::from_body(b"  \n").unwrap().paid_items_only);
        assert!(GenerateChildRequest::from_body(b"{}").unwrap().paid_items_only);
        assert!(!GenerateChildRequest::from_body(br#"{"paid_items_only": false}"#)
            .unwrap()
            .paid_items_only);

        for bad in [&b"{not json"[..], br#"{"paid_items_only": "no"}"#] {
            let err = GenerateChildRequest::from_body(bad).unwrap_err();
            assert!(matches!(err, DomainError::Validation { .. }));
        }
    }

    #[test]
    fn create_request_flattens_header() {
        let body = serde_json::json!({
            "discount_percent": "10",
            "tax_percent": "5",
            "items": [{"quantity": 2, "unit_price": "50.00"}]
        });
        let req: CreateInvoiceRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.items.len(), 1);
        assert!(req.invoice.is_returnable);
    }
}
