use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use figcap::config::AppConfig;
use figcap::model::CaptionModel;
use figcap::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let _ = dotenvy::dotenv();

    let config = AppConfig::from_env();
    config.ensure_directories()?;

    let model = CaptionModel::load(&config);
    let bind_addr = config.bind_addr.clone();
    let app = build_router(AppState { config, model });

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("🚀 Server running on http://{bind_addr}");
    info!("🖼️ Open in your browser to start captioning!");

    axum::serve(listener, app).await?;
    Ok(())
}
