use financial_chat_assistant::{api::start_server, build_session_store, config::AppConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;

    info!("🚀 Financial Chat Assistant - API Server");
    info!("📍 Port: {}", config.port);
    info!("📊 Data provider: {}", config.financial_api_base_url);

    let store = Arc::new(build_session_store(&config));

    info!("✅ Session store initialized ({:?} context)", config.context_source);
    info!("📡 Starting API server...");

    start_server(store, config.port).await?;

    Ok(())
}
