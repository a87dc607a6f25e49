use financial_chat_assistant::{build_session_store, config::AppConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

const CLI_CHAT_ID: &str = "cli";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let message = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if message.trim().is_empty() {
        eprintln!("Usage: chat <message>");
        std::process::exit(2);
    }

    let config = AppConfig::from_env()?;
    let store = build_session_store(&config);

    info!(chat_id = CLI_CHAT_ID, "Sending message");

    let session = store.get_or_create(CLI_CHAT_ID).await?;
    let response = session.process_input(&message, None).await;

    println!("{}", response);
    Ok(())
}
