use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hypothesis_session_engine::{
    cli::{execute_command, Commands},
    config::{Config, LogFormat, StoreBackend},
    engine::SessionEngine,
    session::SessionStore,
    storage::{KeyValueStore, MemoryStore, SqliteStore},
};

/// Inspect hypothesis-testing sessions in the configured store.
#[derive(Parser, Debug)]
#[command(name = "hypothesis-session-engine", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        namespace = %config.session.namespace,
        "Hypothesis session engine starting..."
    );

    // Initialize storage
    let backend: Arc<dyn KeyValueStore> = match config.store.backend {
        StoreBackend::Sqlite => match SqliteStore::new(&config.database).await {
            Ok(s) => {
                info!(path = %config.database.path.display(), "Database initialized");
                Arc::new(s)
            }
            Err(e) => {
                error!(error = %e, "Failed to initialize database");
                return Err(e.into());
            }
        },
        StoreBackend::Memory => {
            info!("Using in-memory store; nothing will persist");
            Arc::new(MemoryStore::new())
        }
    };

    let store = SessionStore::from_config(backend, &config.session, &config.request);
    let engine = SessionEngine::new(store);

    let result = execute_command(cli.command, &engine).await;
    if result.exit_code == 0 {
        println!("{}", result.message);
    } else {
        eprintln!("{}", result.message);
    }
    std::process::exit(result.exit_code);
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
