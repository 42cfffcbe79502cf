use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};

use imprint_core::WarehouseId;
use imprint_inventory::{InventoryUpsertRow, NewWarehouse};

use crate::app::routes::common::parse_id;
use crate::app::{dto, errors, Service};
use crate::context::ActorContext;

pub fn warehouses_router() -> Router {
    Router::new()
        .route("/", post(create_warehouse))
        .route("/:id", delete(delete_warehouse))
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_inventory))
        .route("/bulk", post(bulk_upsert_inventory))
}

pub async fn create_warehouse(
    Extension(service): Extension<Arc<Service>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<NewWarehouse>,
) -> axum::response::Response {
    match service.create_warehouse(body, &actor.actor()).await {
        Ok(warehouse) => (StatusCode::CREATED, Json(warehouse)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn delete_warehouse(
    Extension(service): Extension<Arc<Service>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: WarehouseId = match parse_id(&id, "warehouse") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match service.delete_warehouse(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn list_inventory(
    Extension(service): Extension<Arc<Service>>,
    Query(params): Query<dto::InventoryListParams>,
) -> axum::response::Response {
    let warehouse = match params.warehouse_id() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };
    match service.list_inventory(warehouse).await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// Body is a JSON array of `{product_id, warehouse_id, quantity}` rows.
pub async fn bulk_upsert_inventory(
    Extension(service): Extension<Arc<Service>>,
    Extension(actor): Extension<ActorContext>,
    Json(rows): Json<Vec<InventoryUpsertRow>>,
) -> axum::response::Response {
    match service.bulk_upsert_inventory(rows, &actor.actor()).await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
