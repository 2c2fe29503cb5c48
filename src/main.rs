//! Model Arena - unified CLI.

#![warn(missing_docs)]

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use model_arena::{ArenaConfig, ArenaState, GameRepository, InferenceProvider, OllamaClient, router};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            host,
            port,
            ollama_url,
            db_path,
        } => run_server(config, host, port, ollama_url, db_path).await,
        Command::Models { config, ollama_url } => run_models(config, ollama_url).await,
    }
}

fn initialize_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

/// Run the arena HTTP/WebSocket server.
async fn run_server(
    config_path: std::path::PathBuf,
    host: Option<String>,
    port: Option<u16>,
    ollama_url: Option<String>,
    db_path: Option<String>,
) -> Result<()> {
    initialize_tracing();

    let mut config = ArenaConfig::load(&config_path)?;
    if let Some(host) = host {
        config = config.with_host(host);
    }
    if let Some(port) = port {
        config = config.with_port(port);
    }
    if let Some(url) = ollama_url {
        config = config.with_ollama_url(url);
    }
    if let Some(db_path) = db_path {
        config = config.with_db_path(db_path);
    }

    info!(
        host = %config.host(),
        port = config.port(),
        ollama_url = %config.ollama_url(),
        db_path = %config.db_path(),
        "Starting model arena server"
    );

    let repository = GameRepository::new(config.db_path().clone());
    repository.initialize()?;

    let provider = Arc::new(OllamaClient::new(config.ollama_url().clone()));
    let bind_addr = format!("{}:{}", config.host(), config.port());

    let state = ArenaState::new(config, provider, repository);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Server ready at http://{}/", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// List the models available on the inference provider.
async fn run_models(config_path: std::path::PathBuf, ollama_url: Option<String>) -> Result<()> {
    initialize_tracing();

    let mut config = ArenaConfig::load(&config_path)?;
    if let Some(url) = ollama_url {
        config = config.with_ollama_url(url);
    }

    let client = OllamaClient::new(config.ollama_url().clone());
    let models = client.list_models().await?;

    if models.is_empty() {
        println!("No models available at {}", config.ollama_url());
        return Ok(());
    }

    for model in models {
        match model.size {
            Some(size) => println!("{}\t{} bytes", model.name, size),
            None => println!("{}", model.name),
        }
    }

    Ok(())
}
