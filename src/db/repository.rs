//! Database repository for finished game results.

use chrono::Utc;
use diesel::prelude::*;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::{debug, info, instrument};

use crate::arena::GameSession;
use crate::db::models::MovesPayload;
use crate::db::{DbError, NewGame, RankingEntry, StoredGame, compute_rankings, schema};

/// Migrations compiled into the binary so a fresh database file is
/// usable without external tooling.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Repository over the SQLite games database.
#[derive(Debug, Clone)]
pub struct GameRepository {
    db_path: String,
}

impl GameRepository {
    /// Creates a repository for the database at the given path.
    ///
    /// Use `":memory:"` for an in-memory database (useful for tests).
    #[instrument(skip(db_path), fields(db_path = %db_path))]
    pub fn new(db_path: impl Into<String> + std::fmt::Display) -> Self {
        let db_path = db_path.into();
        info!(path = %db_path, "Creating GameRepository");
        Self { db_path }
    }

    /// Runs pending migrations against the database.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the database cannot be opened or a
    /// migration fails.
    #[instrument(skip(self))]
    pub fn initialize(&self) -> Result<(), DbError> {
        let mut conn = self.connection()?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| DbError::new(format!("Migration failed: {}", e)))?;
        info!(path = %self.db_path, "Database ready");
        Ok(())
    }

    /// Establishes a database connection.
    fn connection(&self) -> Result<SqliteConnection, DbError> {
        debug!(path = %self.db_path, "Establishing connection");
        SqliteConnection::establish(&self.db_path)
            .map_err(|e| DbError::new(format!("Failed to connect to '{}': {}", self.db_path, e)))
    }

    /// Persists a finalized session.
    ///
    /// The full move history, final board, and terminal reason are
    /// stored as one JSON blob alongside the aggregate columns.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] on encoding or database failure.
    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub fn store_result(&self, session: &GameSession) -> Result<StoredGame, DbError> {
        debug!("Recording game result");
        let mut conn = self.connection()?;

        let payload = MovesPayload {
            moves: session.moves.clone(),
            final_board: session.board.clone(),
            reason: session.reason.clone().unwrap_or_default(),
        };

        let new_game = NewGame::new(
            session.model1.clone(),
            session.model2.clone(),
            session.game_type.clone(),
            session.winner.clone().unwrap_or_default(),
            serde_json::to_string(&payload)?,
            session.total_time_ms() as i64,
            Utc::now().naive_utc(),
        );

        let stored = diesel::insert_into(schema::games::table)
            .values(&new_game)
            .returning(StoredGame::as_returning())
            .get_result(&mut conn)?;

        info!(
            game_id = stored.id(),
            winner = %stored.winner(),
            "Game result recorded"
        );
        Ok(stored)
    }

    /// Lists the most recently finished games, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn recent_games(&self, limit: i64) -> Result<Vec<StoredGame>, DbError> {
        debug!(limit, "Loading recent games");
        let mut conn = self.connection()?;

        let games = schema::games::table
            .order(schema::games::created_at.desc())
            .limit(limit)
            .load::<StoredGame>(&mut conn)?;

        info!(count = games.len(), "Recent games loaded");
        Ok(games)
    }

    /// Gets a stored game by ID. Returns `None` when not found.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn get_game(&self, id: i32) -> Result<Option<StoredGame>, DbError> {
        debug!(game_id = id, "Looking up game");
        let mut conn = self.connection()?;

        let game = schema::games::table
            .find(id)
            .first::<StoredGame>(&mut conn)
            .optional()?;

        if game.is_none() {
            debug!(game_id = id, "Game not found");
        }

        Ok(game)
    }

    /// Aggregates per-participant standings over all stored games.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a database error occurs.
    #[instrument(skip(self))]
    pub fn rankings(&self) -> Result<Vec<RankingEntry>, DbError> {
        debug!("Computing rankings");
        let mut conn = self.connection()?;

        let games = schema::games::table.load::<StoredGame>(&mut conn)?;
        let rankings = compute_rankings(&games);

        info!(participants = rankings.len(), "Rankings computed");
        Ok(rankings)
    }
}
