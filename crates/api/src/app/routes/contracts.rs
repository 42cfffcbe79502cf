use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use imprint_catalog::{NewContract, NewParty};
use imprint_core::ContractId;

use crate::app::routes::common::parse_id;
use crate::app::{errors, Service};
use crate::context::ActorContext;

pub fn parties_router() -> Router {
    Router::new().route("/", post(create_party))
}

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_contract))
        .route("/:id", get(get_contract))
}

pub async fn create_party(
    Extension(service): Extension<Arc<Service>>,
    Json(body): Json<NewParty>,
) -> axum::response::Response {
    match service.create_party(body).await {
        Ok(party) => (StatusCode::CREATED, Json(party)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// `party` is `{"type": ..., "id": ...}`; an unknown type is a 400 on
/// `party.type`, an id missing under that type a 404.
pub async fn create_contract(
    Extension(service): Extension<Arc<Service>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<NewContract>,
) -> axum::response::Response {
    match service.create_contract(body, &actor.actor()).await {
        Ok(contract) => (StatusCode::CREATED, Json(contract)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_contract(
    Extension(service): Extension<Arc<Service>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ContractId = match parse_id(&id, "contract") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match service.get_contract(id).await {
        Ok(contract) => (StatusCode::OK, Json(contract)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
