use anyhow::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = imprint_api::config::load().context("failed to load configuration")?;
    imprint_observability::init(&config.log);

    let store = imprint_api::app::build_store(&config).await?;
    let app = imprint_api::app::build_app(store);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
