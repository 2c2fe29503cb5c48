//! Model Arena library - LLM-vs-LLM tic-tac-toe orchestration.
//!
//! Two language models are pitted against each other in a turn-based
//! game; each turn the active model's free-form response is parsed into
//! a validated move, with retries and a flagged random fallback, and
//! every state transition is streamed to live observers.
//!
//! # Architecture
//!
//! - **Rules engine**: pure tic-tac-toe legality and terminal detection
//! - **Extraction**: free text -> legal move, with the retry/fallback policy
//! - **Orchestrator**: drives one session per task from start to finish
//! - **Broadcast**: best-effort, order-preserving fan-out to observers
//! - **Server**: thin axum routes and the observer WebSocket
//! - **Db**: SQLite persistence of finished games
//!
//! # Example
//!
//! ```no_run
//! use model_arena::{ArenaConfig, ArenaState, GameRepository, OllamaClient, router};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ArenaConfig::default();
//! let repository = GameRepository::new(config.db_path().clone());
//! repository.initialize()?;
//!
//! let provider = Arc::new(OllamaClient::new(config.ollama_url().clone()));
//! let state = ArenaState::new(config, provider, repository);
//! let app = router(state);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod arena;
mod broadcast;
mod config;
mod db;
mod games;
mod llm;
mod server;

// Crate-level exports - sessions and orchestration
pub use arena::{
    ArenaError, GameSession, MoveRecord, Orchestrator, SessionId, SessionManager, SessionStatus,
};

// Crate-level exports - observer fan-out
pub use broadcast::{Broadcaster, GameEvent, GameStartInfo, ObserverId};

// Crate-level exports - configuration
pub use config::{ArenaConfig, ConfigError};

// Crate-level exports - persistence
pub use db::{DbError, GameRepository, MovesPayload, RankingEntry, StoredGame, compute_rankings};

// Crate-level exports - rules engine
pub use games::tictactoe::{Board, Mark, Outcome, RulesError};

// Crate-level exports - inference and extraction
pub use llm::{
    ExtractedMove, Generation, InferenceProvider, Interaction, LlmError, ModelInfo, MoveExtractor,
    OllamaClient, Parsed, SamplingOptions,
};

// Crate-level exports - route layer
pub use server::{ArenaState, StartGameRequest, router};
