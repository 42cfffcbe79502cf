use std::sync::Arc;

use axum::{
    extract::Extension, http::StatusCode, response::IntoResponse, routing::post, Json, Router,
};

use imprint_sales::NewReturn;

use crate::app::{errors, Service};
use crate::context::ActorContext;

/// Listing lives under `/invoices/:id/returns`.
pub fn router() -> Router {
    Router::new().route("/", post(record_return))
}

pub async fn record_return(
    Extension(service): Extension<Arc<Service>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<NewReturn>,
) -> axum::response::Response {
    match service.record_return(body, &actor.actor()).await {
        Ok(ret) => (StatusCode::CREATED, Json(ret)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
