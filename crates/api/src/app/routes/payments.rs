use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, post},
    Json, Router,
};

use imprint_core::PaymentId;
use imprint_sales::{NewPayment, PaymentUpsert};

use crate::app::routes::common::parse_id;
use crate::app::{dto, errors, Service};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(record_payment).get(list_payments))
        .route("/bulk", post(upsert_payments))
        .route("/:id", delete(delete_payment))
}

pub async fn record_payment(
    Extension(service): Extension<Arc<Service>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<NewPayment>,
) -> axum::response::Response {
    match service.record_payment(body, &actor.actor()).await {
        Ok(payment) => (StatusCode::CREATED, Json(payment)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn list_payments(
    Extension(service): Extension<Arc<Service>>,
    Query(params): Query<dto::PaymentListParams>,
) -> axum::response::Response {
    let invoice_id = match params.invoice_id() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    match service.list_payments(invoice_id).await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// Body is a JSON array of payments; rows with an `id` update that payment.
pub async fn upsert_payments(
    Extension(service): Extension<Arc<Service>>,
    Extension(actor): Extension<ActorContext>,
    Json(rows): Json<Vec<PaymentUpsert>>,
) -> axum::response::Response {
    match service.upsert_payments(rows, &actor.actor()).await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn delete_payment(
    Extension(service): Extension<Arc<Service>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: PaymentId = match parse_id(&id, "payment") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match service.delete_payment(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
