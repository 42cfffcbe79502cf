use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use imprint_core::InvoiceId;
use imprint_sales::{InvoicePatch, NewInvoiceItem};

use crate::app::routes::common::parse_id;
use crate::app::{dto, errors, Service};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_invoice).get(list_invoices))
        .route(
            "/:id",
            get(get_invoice).patch(update_invoice).delete(delete_invoice),
        )
        .route("/:id/children", get(list_children))
        .route("/:id/items", get(list_items).post(add_items))
        .route("/:id/payment-status", get(payment_status))
        .route("/:id/generate-child", post(generate_child))
        .route("/:id/recalculate", post(recalculate))
        .route("/:id/distribute-payments", post(distribute_payments))
        .route("/:id/allocations", post(allocate))
        .route("/:id/returns", get(list_returns))
}

fn invoice_id(raw: &str) -> Result<InvoiceId, axum::response::Response> {
    parse_id(raw, "invoice")
}

pub async fn create_invoice(
    Extension(service): Extension<Arc<Service>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::CreateInvoiceRequest>,
) -> axum::response::Response {
    match service
        .create_invoice(body.invoice, body.items, &actor.actor())
        .await
    {
        Ok(view) => (StatusCode::CREATED, Json(view)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn list_invoices(
    Extension(service): Extension<Arc<Service>>,
    Query(params): Query<dto::InvoiceListParams>,
) -> axum::response::Response {
    let filter = match params.into_filter() {
        Ok(f) => f,
        Err(e) => return errors::domain_error_to_response(e),
    };
    match service.list_invoices(&filter).await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_invoice(
    Extension(service): Extension<Arc<Service>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match service.get_invoice(id).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn update_invoice(
    Extension(service): Extension<Arc<Service>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(patch): Json<InvoicePatch>,
) -> axum::response::Response {
    let id = match invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match service.update_invoice(id, patch, &actor.actor()).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn delete_invoice(
    Extension(service): Extension<Arc<Service>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match service.delete_invoice(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn list_children(
    Extension(service): Extension<Arc<Service>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match service.list_children(id).await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn list_items(
    Extension(service): Extension<Arc<Service>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match service.list_items(id).await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// Body is a JSON array of items.
pub async fn add_items(
    Extension(service): Extension<Arc<Service>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(items): Json<Vec<NewInvoiceItem>>,
) -> axum::response::Response {
    let id = match invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match service.add_items(id, items, &actor.actor()).await {
        Ok(items) => (StatusCode::CREATED, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn payment_status(
    Extension(service): Extension<Arc<Service>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match service.payment_status(id).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// The body is optional; `paid_items_only` defaults to true.
pub async fn generate_child(
    Extension(service): Extension<Arc<Service>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    body: Bytes,
) -> axum::response::Response {
    let id = match invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let body = match dto::GenerateChildRequest::from_body(&body) {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    match service
        .generate_child_invoice(id, body.paid_items_only, &actor.actor())
        .await
    {
        Ok(view) => (StatusCode::CREATED, Json(view)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn recalculate(
    Extension(service): Extension<Arc<Service>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match service.recalculate_items(id, &actor.actor()).await {
        Ok(changed) => (
            StatusCode::OK,
            Json(serde_json::json!({ "updated_items": changed })),
        )
            .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn distribute_payments(
    Extension(service): Extension<Arc<Service>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match service.distribute_payments(id, &actor.actor()).await {
        Ok(distribution) => (StatusCode::OK, Json(distribution)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn allocate(
    Extension(service): Extension<Arc<Service>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AllocationsRequest>,
) -> axum::response::Response {
    let id = match invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match service
        .allocate_item_payments(id, body.allocations, &actor.actor())
        .await
    {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn list_returns(
    Extension(service): Extension<Arc<Service>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match service.list_returns(id).await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
