//! zoral binary.
//!
//! # Environment Variables
//!
//! - `ZORAL_CONFIG` - optional YAML config file
//! - `ZORAL_MODEL` - backend model id (default: "zoral")
//! - `OLLAMA_URL` - Ollama base URL (default: http://localhost:11434)
//! - `ZORAL_DB` - SQLite path (default: platform data dir)
//! - `PORT` - HTTP port for `serve` (default: 5000)
//! - `RUST_LOG` - Tracing filter (default: "info,zoral=debug")
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin zoral                # HTTP server
//! cargo run --bin zoral -- cli alice   # interactive chat as "alice"
//! cargo run --bin zoral -- inspect     # show database schema
//! ```

use std::sync::Arc;

use anyhow::Context;
use zoral::chat::PersonaEngine;
use zoral::cli::{self, CliCommand};
use zoral::llms::providers::ollama::OllamaClient;
use zoral::memory::{SqliteStore, StateHandle};
use zoral::server::{app_router, AppState};
use zoral::utilities::config::ZoralConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,zoral=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = cli::parse_command(&args).map_err(anyhow::Error::msg)?;

    if command == CliCommand::Version {
        println!("zoral {}", zoral::VERSION);
        return Ok(());
    }

    let config = ZoralConfig::load()?;
    let db_path = config.resolved_db_path();
    let store = Arc::new(
        SqliteStore::open(&db_path)
            .with_context(|| format!("failed to open database {}", db_path.display()))?,
    );
    tracing::info!(db = %db_path.display(), "database ready");

    match command {
        CliCommand::Inspect => {
            cli::print_schema(&store, &mut std::io::stdout())?;
        }
        CliCommand::Memories { limit } => {
            cli::print_memories(store.as_ref(), limit, &mut std::io::stdout())?;
        }
        CliCommand::Chat { actor } => {
            let engine = build_engine(&config, store)?;
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            cli::run_repl(&engine, &actor, stdin, &mut std::io::stdout()).await?;
        }
        CliCommand::Serve => {
            let engine = build_engine(&config, store)?;
            let app = app_router(AppState::new(engine));

            tracing::info!("zoral server starting on {}", config.bind_addr);
            tracing::info!("Endpoints:");
            tracing::info!("  GET  /health  - liveness probe");
            tracing::info!("  POST /chat    - one persona turn");

            let listener = tokio::net::TcpListener::bind(&config.bind_addr)
                .await
                .with_context(|| format!("failed to bind {}", config.bind_addr))?;
            axum::serve(listener, app).await.context("server failed")?;
        }
        CliCommand::Version => {}
    }
    Ok(())
}

fn build_engine(config: &ZoralConfig, store: Arc<SqliteStore>) -> anyhow::Result<PersonaEngine> {
    let client = OllamaClient::new(config.ollama_config())?;
    tracing::info!(model = %config.model, url = %config.ollama_url, "backend configured");
    Ok(PersonaEngine::new(
        StateHandle::from_backend(store),
        Arc::new(client),
        config.engine_settings(),
    ))
}
