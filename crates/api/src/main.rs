use anyhow::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    worklane_observability::init();

    let config = worklane_api::ApiConfig::from_env()?;
    let app = worklane_api::app::build_app(&config)
        .await
        .context("failed to build application")?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, backend = ?config.storage.backend, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}
