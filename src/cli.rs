//! Command-line interface for model_arena.

use clap::{Parser, Subcommand};

/// Model Arena - LLM-vs-LLM tic-tac-toe with live observer streaming
#[derive(Parser, Debug)]
#[command(name = "model_arena")]
#[command(about = "Pit two local models against each other at tic-tac-toe", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the arena HTTP/WebSocket server
    Serve {
        /// Path to the TOML configuration file
        #[arg(short, long, default_value = "arena.toml")]
        config: std::path::PathBuf,

        /// Override the bind host
        #[arg(long)]
        host: Option<String>,

        /// Override the bind port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the Ollama server URL
        #[arg(long)]
        ollama_url: Option<String>,

        /// Override the SQLite database path
        #[arg(long)]
        db_path: Option<String>,
    },

    /// List the models available on the inference provider
    Models {
        /// Path to the TOML configuration file
        #[arg(short, long, default_value = "arena.toml")]
        config: std::path::PathBuf,

        /// Override the Ollama server URL
        #[arg(long)]
        ollama_url: Option<String>,
    },
}
