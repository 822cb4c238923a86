//! ao-gateway: Agent Orchestration Gateway Main Binary
//!
//! Main entry point for the orchestration gateway.
//!
//! Usage:
//!   ao-gateway                   - Start server mode (HTTP API)
//!   ao-gateway --config <path>   - Start with an explicit config file
//!   ao-gateway --help            - Show help

use ao_core::{AgentRegistry, CapabilityRouter, Config, SqliteAgentStore, SqliteTaskStore, TaskQueue};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Run mode
enum RunMode {
    /// Server mode (HTTP API)
    Server,
    /// Show help
    Help,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let (mode, config_path) = parse_args();

    match mode {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("ao-gateway {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        RunMode::Server => {}
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("info".parse()?)
        )
        .init();

    // Load .env file
    dotenvy::dotenv().ok();

    // Load configuration
    let config = match config_path {
        Some(path) => Config::from_toml_file(&path)
            .map_err(|e| anyhow::anyhow!("Config error: {}", e))?,
        None => Config::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?,
    };

    tracing::info!("Starting ao-gateway...");
    tracing::info!("Database: {}", config.storage.db_path);

    run_server(config).await
}

/// Parse command line arguments
fn parse_args() -> (RunMode, Option<String>) {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => return (RunMode::Help, None),
            "--version" | "-v" => return (RunMode::Version, None),
            "--config" => config_path = iter.next().cloned(),
            _ => {}
        }
    }

    (RunMode::Server, config_path)
}

/// Print help message
fn print_help() {
    println!("ao-gateway - Agent Orchestration Gateway");
    println!();
    println!("Usage:");
    println!("  ao-gateway                   Start server mode (HTTP API)");
    println!("  ao-gateway --config <path>   Start with an explicit config file");
    println!("  ao-gateway --help            Show this help message");
    println!("  ao-gateway --version         Show version");
    println!();
    println!("Environment Variables:");
    println!("  API_KEY                      HTTP API bearer token (optional)");
    println!("  API_PORT                     HTTP API port (default: 3000)");
    println!("  API_ALLOWED_ORIGINS          Comma-separated CORS origins");
    println!("  DB_PATH                      SQLite database path (default: data/ao-gateway.db)");
    println!("  QUEUE_MAX_RETRIES            Retry attempts per task (default: 3)");
    println!("  QUEUE_RETRY_BACKOFF_BASE_MS  Retry backoff base (default: 1000)");
    println!("  QUEUE_RETRY_BACKOFF_CAP_MS   Retry backoff ceiling (default: 60000)");
    println!("  QUEUE_POLL_LIMIT             Default poll batch size (default: 10)");
    println!("  ORCH_MAX_CONCURRENCY         Parallel sub-agent limit (default: 8)");
    println!("  ORCH_DEFAULT_TIMEOUT_SECS    Sub-task timeout (default: 120)");
    println!("  ORCH_FEEDBACK_ENABLED        Inject upstream outputs (default: true)");
}

/// Run server mode (HTTP API)
async fn run_server(config: Config) -> anyhow::Result<()> {
    // Make sure the database directory exists
    if let Some(parent) = std::path::Path::new(&config.storage.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Open stores and wire the core components
    let task_store = Arc::new(
        SqliteTaskStore::new(&config.storage.db_path)
            .map_err(|e| anyhow::anyhow!("Failed to open task store: {}", e))?,
    );
    let agent_store = Arc::new(
        SqliteAgentStore::new(&config.storage.db_path)
            .map_err(|e| anyhow::anyhow!("Failed to open agent store: {}", e))?,
    );

    let registry = Arc::new(AgentRegistry::new(agent_store));
    let router = Arc::new(CapabilityRouter::new(registry.clone()));
    let queue = Arc::new(TaskQueue::new(
        task_store,
        registry.clone(),
        config.queue.clone(),
    ));

    // Track running services for graceful shutdown
    let mut service_handles = Vec::new();

    // Start HTTP API server
    let api_port = config.api.port;
    let api_config = config.clone();

    let handle = tokio::spawn(async move {
        if let Err(e) = ao_api::start_server(api_port, api_config, queue, registry, router).await {
            tracing::error!("HTTP API error: {}", e);
        }
    });
    service_handles.push(handle);
    tracing::info!("HTTP API server started on port {}", api_port);

    tracing::info!("ao-gateway initialized successfully");
    tracing::info!("Press Ctrl+C to exit");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");

    // Abort all services
    for handle in service_handles {
        handle.abort();
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
