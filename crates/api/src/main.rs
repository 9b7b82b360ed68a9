use std::sync::Arc;

use anyhow::Context;

use sentinel_api::app::{self, services::AppServices};
use sentinel_infra::SentinelConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; real deployments use the process environment.
    let _ = dotenvy::dotenv();
    sentinel_observability::init("sentinel-api");

    let config = SentinelConfig::from_env().context("invalid configuration")?;
    let services = Arc::new(AppServices::start(&config)?);
    let app = app::build_app(services.clone());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, broker = services.broker_mode().as_str(), "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server error")?;

    services.shutdown();
    tracing::info!("shutdown complete");
    Ok(())
}
