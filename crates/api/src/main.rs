use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;

use carlot_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    carlot_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let services = carlot_api::app::services::build_services(&config).await?;
    let app = carlot_api::app::build_app(Arc::new(services));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
