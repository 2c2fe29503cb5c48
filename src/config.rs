//! Arena configuration from TOML file and environment.

use derive_getters::Getters;
use derive_more::{Display, Error};
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, instrument};

/// Server and collaborator configuration.
///
/// Every field has a default, so an empty file or no file at all yields
/// a working local setup. Environment variables override file values.
#[derive(Debug, Clone, Getters, Setters, Serialize, Deserialize)]
#[setters(prefix = "with_")]
pub struct ArenaConfig {
    /// Host the HTTP server binds to.
    #[serde(default = "default_host")]
    host: String,

    /// Port the HTTP server binds to.
    #[serde(default = "default_port")]
    port: u16,

    /// Base URL of the Ollama inference server.
    #[serde(default = "default_ollama_url")]
    ollama_url: String,

    /// Path to the SQLite games database.
    #[serde(default = "default_db_path")]
    db_path: String,

    /// Inter-turn pacing delay in milliseconds.
    #[serde(default = "default_pacing_ms")]
    pacing_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_db_path() -> String {
    "arena.db".to_string()
}

fn default_pacing_ms() -> u64 {
    500
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ollama_url: default_ollama_url(),
            db_path: default_db_path(),
            pacing_ms: default_pacing_ms(),
        }
    }
}

impl ArenaConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;

        info!(port = config.port, "Config loaded from file");
        Ok(config)
    }

    /// Loads configuration: file when present, defaults otherwise, then
    /// environment overrides.
    ///
    /// Recognized variables: `ARENA_HOST`, `ARENA_PORT`, `OLLAMA_URL`,
    /// `ARENA_DB_PATH`, `ARENA_PACING_MS`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on an unreadable file or a malformed
    /// override value.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = if path.as_ref().exists() {
            Self::from_file(path)?
        } else {
            debug!("No config file, using defaults");
            Self::default()
        };

        if let Ok(host) = std::env::var("ARENA_HOST") {
            config.host = host;
        }
        if let Ok(port) = std::env::var("ARENA_PORT") {
            config.port = port
                .parse()
                .map_err(|e| ConfigError::new(format!("Invalid ARENA_PORT: {}", e)))?;
        }
        if let Ok(url) = std::env::var("OLLAMA_URL") {
            config.ollama_url = url;
        }
        if let Ok(db_path) = std::env::var("ARENA_DB_PATH") {
            config.db_path = db_path;
        }
        if let Ok(pacing) = std::env::var("ARENA_PACING_MS") {
            config.pacing_ms = pacing
                .parse()
                .map_err(|e| ConfigError::new(format!("Invalid ARENA_PACING_MS: {}", e)))?;
        }

        Ok(config)
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}
