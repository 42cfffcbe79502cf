use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use imprint_core::NewListItem;

use crate::app::{errors, Service};

pub fn router() -> Router {
    Router::new().route("/", post(create_list_item))
}

pub async fn create_list_item(
    Extension(service): Extension<Arc<Service>>,
    Json(body): Json<NewListItem>,
) -> axum::response::Response {
    match service.create_list_item(body).await {
        Ok(item) => (StatusCode::CREATED, Json(item)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
