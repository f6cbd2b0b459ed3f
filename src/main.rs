use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use companion_core::assistant::openai::OpenAiAssistant;
use companion_core::config::Config;
use companion_core::service::http::{self, AppState};

#[derive(Parser)]
#[command(
    name = "companion-server",
    about = "AI Companion backend API",
    version = companion_core::VERSION,
)]
struct Cli {
    /// Bind address
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Bind port
    #[arg(long, default_value_t = 8001)]
    port: u16,
}

/// Log whether the configured assistant is reachable. Startup diagnostics
/// only; a failure here does not prevent serving.
async fn verify_assistant(config: &Config) {
    if !config.assistant_configured() {
        warn!("OpenAI assistant not configured; /chat will return a configuration error");
        return;
    }
    let client = OpenAiAssistant::new(config.openai_api_key.clone());
    match client.get_assistant(&config.openai_assistant_id).await {
        Ok(assistant) => {
            info!(
                assistant_id = %assistant.id,
                name = %assistant.name,
                model = %assistant.model,
                "connected to OpenAI assistant"
            );
        }
        Err(e) => warn!("could not verify OpenAI assistant: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "companion=info,companion_core=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    if !config.database_configured() {
        warn!("Supabase not configured; authenticated endpoints will fail");
    }
    if !config.webhook_configured() {
        warn!("Stripe webhook secret not configured; /stripe-webhook will fail");
    }
    verify_assistant(&config).await;

    let state = Arc::new(AppState::from_config(config));
    let addr = format!("{}:{}", cli.host, cli.port);
    http::serve(&addr, state).await
}
