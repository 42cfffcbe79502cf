use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use imprint_core::CustomerId;
use imprint_sales::NewCustomer;

use crate::app::routes::common::parse_id;
use crate::app::{errors, Service};
use crate::context::ActorContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_customer))
        .route("/:id", get(get_customer))
}

pub async fn create_customer(
    Extension(service): Extension<Arc<Service>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<NewCustomer>,
) -> axum::response::Response {
    match service.create_customer(body, &actor.actor()).await {
        Ok(customer) => (StatusCode::CREATED, Json(customer)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_customer(
    Extension(service): Extension<Arc<Service>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: CustomerId = match parse_id(&id, "customer") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match service.get_customer(id).await {
        Ok(customer) => (StatusCode::OK, Json(customer)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
