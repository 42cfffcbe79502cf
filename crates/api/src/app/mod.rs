//! HTTP API application wiring (Axum router + store wiring).
//!
//! - `routes/`: HTTP routes + handlers (one file per domain area)
//! - `dto.rs`: request DTOs and query-string parsing
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use anyhow::Context;
use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use imprint_infra::{InMemoryLedgerStore, LedgerStore, PostgresLedgerStore, SettlementService};

use crate::config::AppConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;

/// The service every handler talks to.
pub type Service = SettlementService<Arc<dyn LedgerStore>>;

/// Postgres when a database URL is configured, in-memory otherwise.
pub async fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn LedgerStore>> {
    match &config.database_url {
        Some(url) => {
            let store = PostgresLedgerStore::connect(url)
                .await
                .context("failed to connect to Postgres")?;
            store
                .ensure_schema()
                .await
                .context("failed to apply schema")?;
            tracing::info!("using Postgres ledger store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("no database_url configured; using in-memory ledger store");
            Ok(Arc::new(InMemoryLedgerStore::new()))
        }
    }
}

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(store: Arc<dyn LedgerStore>) -> Router {
    let service: Arc<Service> = Arc::new(SettlementService::new(store));

    // Everything except the health check needs an acting user.
    let protected = routes::router()
        .layer(Extension(service))
        .layer(axum::middleware::from_fn(middleware::actor_middleware));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}
