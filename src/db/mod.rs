//! Database persistence layer for finished games.

mod error;
mod models;
mod repository;
mod schema;

pub use error::DbError;
pub use models::{MovesPayload, NewGame, RankingEntry, StoredGame, compute_rankings};
pub use repository::GameRepository;
