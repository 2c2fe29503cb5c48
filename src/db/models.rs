//! Database models and ranking aggregation.

use crate::arena::MoveRecord;
use crate::games::tictactoe::Board;
use chrono::NaiveDateTime;
use derive_getters::Getters;
use derive_new::new;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::db::schema;

/// Finished game database model.
#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Getters, Serialize)]
#[diesel(table_name = schema::games)]
pub struct StoredGame {
    id: i32,
    model1: String,
    model2: String,
    game_type: String,
    winner: String,
    /// JSON-encoded [`MovesPayload`].
    moves: String,
    total_time_ms: i64,
    created_at: NaiveDateTime,
}

impl StoredGame {
    /// Decodes the stored moves blob.
    ///
    /// # Errors
    ///
    /// Returns [`crate::db::DbError`] when the stored JSON does not
    /// parse.
    pub fn parse_moves(&self) -> Result<MovesPayload, crate::db::DbError> {
        Ok(serde_json::from_str(&self.moves)?)
    }
}

/// Insertable model for recording a finished game.
#[derive(Debug, Clone, Insertable, new)]
#[diesel(table_name = schema::games)]
pub struct NewGame {
    model1: String,
    model2: String,
    game_type: String,
    winner: String,
    moves: String,
    total_time_ms: i64,
    created_at: NaiveDateTime,
}

/// Shape of the JSON blob stored in the `moves` column.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovesPayload {
    /// Applied moves in play order.
    pub moves: Vec<MoveRecord>,
    /// Board at session end.
    pub final_board: Board,
    /// Human-readable terminal reason.
    pub reason: String,
}

/// Aggregated standing of one participant across stored games.
#[derive(Debug, Clone, Serialize)]
pub struct RankingEntry {
    /// Participant (model name).
    pub model: String,
    /// Games won.
    pub wins: u32,
    /// Games lost.
    pub losses: u32,
    /// Games drawn.
    pub draws: u32,
}

impl RankingEntry {
    fn new(model: String) -> Self {
        Self {
            model,
            wins: 0,
            losses: 0,
            draws: 0,
        }
    }

    /// Fraction of played games won, 0.0 when no games were played.
    pub fn win_rate(&self) -> f64 {
        let total = self.wins + self.losses + self.draws;
        if total == 0 {
            0.0
        } else {
            f64::from(self.wins) / f64::from(total)
        }
    }
}

/// Reduces stored games into per-participant standings, best win rate
/// first.
pub fn compute_rankings(games: &[StoredGame]) -> Vec<RankingEntry> {
    let mut by_model: HashMap<&str, RankingEntry> = HashMap::new();

    for game in games {
        for model in [game.model1().as_str(), game.model2().as_str()] {
            by_model
                .entry(model)
                .or_insert_with(|| RankingEntry::new(model.to_string()));
        }

        if game.winner().as_str() == "draw" {
            for model in [game.model1().as_str(), game.model2().as_str()] {
                if let Some(entry) = by_model.get_mut(model) {
                    entry.draws += 1;
                }
            }
        } else {
            let (winner, loser) = if game.winner() == game.model1() {
                (game.model1().as_str(), game.model2().as_str())
            } else {
                (game.model2().as_str(), game.model1().as_str())
            };
            if let Some(entry) = by_model.get_mut(winner) {
                entry.wins += 1;
            }
            if let Some(entry) = by_model.get_mut(loser) {
                entry.losses += 1;
            }
        }
    }

    let mut rankings: Vec<_> = by_model.into_values().collect();
    rankings.sort_by(|a, b| {
        b.win_rate()
            .partial_cmp(&a.win_rate())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    rankings
}
