//! docchat server entry point

use docchat::config::DocChatConfig;
use docchat::server::{self, AppState};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docchat=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path =
        std::env::var("DOCCHAT_CONFIG").unwrap_or_else(|_| "docchat.toml".to_string());
    let mut config = DocChatConfig::load_or_default(&config_path)?;
    config.apply_env()?;
    config.validate()?;

    let host = config.server.host.clone();
    let port = config.server.port;

    let state = AppState::from_config(config)?;

    // background worker drains the embedding queue
    tokio::spawn(server::worker::run(state.clone()));

    let app = server::router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("docchat listening on http://{addr}");
    tracing::info!("  GET  /health");
    tracing::info!("  POST /api/documents");
    tracing::info!("  GET  /api/documents");
    tracing::info!("  GET  /api/documents/:filename");
    tracing::info!("  POST /api/query");

    axum::serve(listener, app).await?;
    Ok(())
}
