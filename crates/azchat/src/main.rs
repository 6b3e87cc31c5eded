//! azchat: web chat front-end for hosted LLM APIs
//!
//! Usage:
//!   azchat           - Start the HTTP server
//!   azchat --cli     - Start interactive CLI mode
//!   azchat --help    - Show help

mod cli;

use std::sync::Arc;
use std::time::Duration;

use azchat_api::AppState;
use azchat_core::llm::SamplingParams;
use azchat_core::{
    ChatBackend, ChatMode, Config, ConversationManager, InMemorySessionStore, LlmClient,
    SessionStore, SqliteSessionStore,
};
use tracing_subscriber::EnvFilter;

/// How often expired sessions are swept from the store
const PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Run mode
enum RunMode {
    /// HTTP server
    Server,
    /// Interactive CLI mode
    Cli,
    /// Show help
    Help,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let mode = parse_args();

    match mode {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("azchat {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Load .env file
    dotenvy::dotenv().ok();

    let config = Config::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting azchat...");
    tracing::info!(
        "Provider: {:?}, mode: {:?}",
        config.llm.provider,
        config.chat.mode
    );

    let conversations = Arc::new(build_conversations(&config)?);

    match mode {
        RunMode::Cli => {
            tracing::info!("Running in CLI mode");
            cli::run_cli(conversations).await
        }
        RunMode::Server => run_server(config, conversations).await,
        _ => Ok(()),
    }
}

/// Parse command line arguments
fn parse_args() -> RunMode {
    let args: Vec<String> = std::env::args().collect();

    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "--cli" | "-c" => return RunMode::Cli,
            "--help" | "-h" => return RunMode::Help,
            "--version" | "-v" => return RunMode::Version,
            _ => {}
        }
    }

    RunMode::Server
}

/// Print help message
fn print_help() {
    println!("azchat - web chat front-end for Azure OpenAI / OpenAI");
    println!();
    println!("Usage:");
    println!("  azchat               Start the HTTP server");
    println!("  azchat --cli         Start interactive CLI mode");
    println!("  azchat --help        Show this help message");
    println!("  azchat --version     Show version");
    println!();
    println!("Environment Variables:");
    println!("  AZURE_OPENAI_API_KEY          API key (required)");
    println!("  AZURE_OPENAI_ENDPOINT         Azure endpoint (required for azure)");
    println!("  AZURE_OPENAI_API_VERSION      API version (default: 2024-05-01-preview)");
    println!("  AZURE_OPENAI_DEPLOYMENT_NAME  Deployment or model (completions mode)");
    println!("  AZURE_OPENAI_ASSISTANT_ID     Assistant id (assistant mode)");
    println!("  LLM_PROVIDER                  azure or openai (default: azure)");
    println!("  LLM_BASE_URL                  Custom API base URL");
    println!("  CHAT_MODE                     completions or assistant (default: completions)");
    println!("  SYSTEM_PROMPT                 System instruction (completions mode)");
    println!("  SESSION_SECRET                Cookie signing secret (default: random)");
    println!("  SESSION_LIFETIME_HOURS        Session lifetime (default: 168)");
    println!("  SESSION_DB_PATH               SQLite session store (default: in memory)");
    println!("  RUN_POLL_INTERVAL_MS          Run poll interval (default: 1000)");
    println!("  RUN_POLL_BACKOFF              Poll interval multiplier (default: 1.0)");
    println!("  RUN_TIMEOUT_SECS              Run timeout (default: 60)");
    println!("  HOST / PORT                   Bind address (default: 127.0.0.1:5000)");
}

/// Wire the configured remote API and session store into a conversation manager
fn build_conversations(config: &Config) -> anyhow::Result<ConversationManager> {
    let client = Arc::new(
        LlmClient::new(&config.llm)
            .map_err(|e| anyhow::anyhow!("Failed to create LLM client: {}", e))?,
    );

    let backend = match config.chat.mode {
        ChatMode::Completions => ChatBackend::Completions {
            backend: client,
            system_prompt: config.chat.system_prompt.clone(),
            sampling: SamplingParams::default(),
        },
        ChatMode::Assistant => ChatBackend::Assistant {
            backend: client,
            assistant_id: config
                .llm
                .assistant_id
                .clone()
                .ok_or_else(|| anyhow::anyhow!("AZURE_OPENAI_ASSISTANT_ID is not set"))?,
            policy: config.poll_policy(),
        },
    };

    let store: Arc<dyn SessionStore> = match &config.session.db_path {
        Some(path) => {
            tracing::info!("Sessions stored in {}", path);
            Arc::new(
                SqliteSessionStore::new(path)
                    .map_err(|e| anyhow::anyhow!("Failed to open session store: {}", e))?,
            )
        }
        None => Arc::new(InMemorySessionStore::new()),
    };

    Ok(ConversationManager::new(
        store,
        backend,
        config.session_lifetime(),
    ))
}

/// Run server mode
async fn run_server(config: Config, conversations: Arc<ConversationManager>) -> anyhow::Result<()> {
    // Sweep expired sessions in the background
    let purger = {
        let conversations = Arc::clone(&conversations);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PURGE_INTERVAL);
            loop {
                ticker.tick().await;
                if let Err(e) = conversations.purge_expired().await {
                    tracing::error!("Session purge failed: {}", e);
                }
            }
        })
    };

    let state = AppState::new(config, conversations);

    tracing::info!("Press Ctrl+C to exit");

    let result = azchat_api::start_server(state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutting down...");
    })
    .await;

    purger.abort();
    result
}
