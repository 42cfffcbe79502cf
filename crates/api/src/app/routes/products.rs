use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, post},
    Json, Router,
};

use imprint_catalog::NewProduct;
use imprint_core::ProductId;

use crate::app::routes::common::parse_id;
use crate::app::{errors, Service};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_product))
        .route("/:id", delete(delete_product))
}

pub async fn create_product(
    Extension(service): Extension<Arc<Service>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<NewProduct>,
) -> axum::response::Response {
    match service.create_product(body, &actor.actor()).await {
        Ok(product) => (StatusCode::CREATED, Json(product)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn delete_product(
    Extension(service): Extension<Arc<Service>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ProductId = match parse_id(&id, "product") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match service.delete_product(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
