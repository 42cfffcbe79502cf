use axum::{routing::get, Router};

pub mod common;
pub mod contracts;
pub mod customers;
pub mod inventory;
pub mod invoices;
pub mod lookups;
pub mod payments;
pub mod products;
pub mod returns;
pub mod system;

/// Router for all endpoints that need an acting user.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/customers", customers::router())
        .nest("/invoices", invoices::router())
        .nest("/payments", payments::router())
        .nest("/returns", returns::router())
        .nest("/warehouses", inventory::warehouses_router())
        .nest("/inventory", inventory::router())
        .nest("/products", products::router())
        .nest("/parties", contracts::parties_router())
        .nest("/contracts", contracts::router())
        .nest("/lookups", lookups::router())
}
