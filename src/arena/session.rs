//! Game session state and the session registry.

use crate::games::tictactoe::{Board, Mark};
use crate::llm::Interaction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};

/// Unique identifier for a game session.
pub type SessionId = String;

/// Lifecycle status of a session.
///
/// Transitions are `pending -> active -> completed | error`; terminal
/// states are never left.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SessionStatus {
    /// Registered, no move requested yet.
    Pending,
    /// Game loop is running.
    Active,
    /// Finished with a winner or draw.
    Completed,
    /// Aborted by a process-level failure.
    Error,
}

/// One applied move with the interaction that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRecord {
    /// Participant (model name) that played the move.
    pub model: String,
    /// Cell index on the board.
    pub position: usize,
    /// Extraction record; absent only on synthetically constructed
    /// history (tests, replays).
    pub interaction: Option<Interaction>,
    /// True when the move was a forced random fallback.
    pub is_random: bool,
}

/// One match between two participants.
///
/// `model1` plays X, `model2` plays O. The session is owned by the
/// orchestrator task driving it and becomes read-only once persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSession {
    /// Session ID.
    pub id: SessionId,
    /// First participant, plays X and moves first.
    pub model1: String,
    /// Second participant, plays O.
    pub model2: String,
    /// Game type label, recorded as passthrough data.
    pub game_type: String,
    /// Participant whose move is requested next.
    pub current_turn: String,
    /// Current board state.
    pub board: Board,
    /// Applied moves in play order.
    pub moves: Vec<MoveRecord>,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Winning participant, or `"draw"`; set at finalization.
    pub winner: Option<String>,
    /// Human-readable terminal reason; set at finalization.
    pub reason: Option<String>,
}

impl GameSession {
    /// Creates a new pending session.
    #[instrument(skip(id, model1, model2, game_type), fields(session_id = %id))]
    pub fn new(id: SessionId, model1: String, model2: String, game_type: String) -> Self {
        info!(model1 = %model1, model2 = %model2, "Creating game session");
        Self {
            id,
            current_turn: model1.clone(),
            model1,
            model2,
            game_type,
            board: Board::new(),
            moves: Vec::new(),
            status: SessionStatus::Pending,
            winner: None,
            reason: None,
        }
    }

    /// Mark of the participant whose turn it is.
    pub fn current_mark(&self) -> Mark {
        if self.current_turn == self.model1 {
            Mark::X
        } else {
            Mark::O
        }
    }

    /// Participant playing the given mark.
    pub fn participant(&self, mark: Mark) -> &str {
        match mark {
            Mark::X => &self.model1,
            Mark::O => &self.model2,
        }
    }

    /// The participant that is not `model`.
    pub fn opponent_of(&self, model: &str) -> &str {
        if model == self.model1 {
            &self.model2
        } else {
            &self.model1
        }
    }

    /// Hands the turn to the other participant.
    pub fn switch_turn(&mut self) {
        self.current_turn = self.opponent_of(&self.current_turn).to_string();
    }

    /// Move positions in play order, as fed to the extraction prompts.
    pub fn positions(&self) -> Vec<usize> {
        self.moves.iter().map(|m| m.position).collect()
    }

    /// Total elapsed time, the sum of all recorded interaction
    /// latencies.
    pub fn total_time_ms(&self) -> u64 {
        self.moves
            .iter()
            .filter_map(|m| m.interaction.as_ref())
            .map(|i| i.timing_ms)
            .sum()
    }
}

/// Registry of all sessions, live and finished.
///
/// The only state shared across session tasks besides the broadcaster;
/// every operation takes the single lock, so snapshots observed by the
/// route layer are always consistent.
#[derive(Debug, Clone, Default)]
pub struct SessionManager {
    sessions: Arc<Mutex<HashMap<SessionId, GameSession>>>,
}

impl SessionManager {
    /// Creates an empty session manager.
    #[instrument]
    pub fn new() -> Self {
        info!("Creating session manager");
        Self::default()
    }

    /// Registers a new session.
    ///
    /// # Errors
    ///
    /// Fails when a session with the same ID already exists.
    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub fn create_session(&self, session: GameSession) -> Result<SessionId, String> {
        let mut sessions = self.sessions.lock().expect("session registry poisoned");

        if sessions.contains_key(&session.id) {
            warn!(session_id = %session.id, "Session already exists");
            return Err("Session already exists".to_string());
        }

        let id = session.id.clone();
        sessions.insert(id.clone(), session);

        info!(session_id = %id, "Session registered");
        Ok(id)
    }

    /// Gets a snapshot of a session by ID.
    #[instrument(skip(self))]
    pub fn get_session(&self, id: &str) -> Option<GameSession> {
        let sessions = self.sessions.lock().expect("session registry poisoned");
        let session = sessions.get(id).cloned();

        if session.is_none() {
            debug!(session_id = id, "Session not found");
        }

        session
    }

    /// Stores the latest state of a session.
    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub fn update_session(&self, session: GameSession) {
        let mut sessions = self.sessions.lock().expect("session registry poisoned");
        sessions.insert(session.id.clone(), session);
        debug!("Session updated");
    }

    /// Lists all registered session IDs.
    #[instrument(skip(self))]
    pub fn list_sessions(&self) -> Vec<SessionId> {
        let sessions = self.sessions.lock().expect("session registry poisoned");
        sessions.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> GameSession {
        GameSession::new(
            "s1".to_string(),
            "llama3".to_string(),
            "mistral".to_string(),
            "tictactoe".to_string(),
        )
    }

    #[test]
    fn model1_plays_x_and_moves_first() {
        let s = session();
        assert_eq!(s.current_turn, "llama3");
        assert_eq!(s.current_mark(), Mark::X);
        assert_eq!(s.participant(Mark::O), "mistral");
    }

    #[test]
    fn switch_turn_alternates() {
        let mut s = session();
        s.switch_turn();
        assert_eq!(s.current_turn, "mistral");
        assert_eq!(s.current_mark(), Mark::O);
        s.switch_turn();
        assert_eq!(s.current_turn, "llama3");
    }

    #[test]
    fn duplicate_session_id_rejected() {
        let manager = SessionManager::new();
        manager.create_session(session()).unwrap();
        assert!(manager.create_session(session()).is_err());
    }

    #[test]
    fn total_time_sums_interaction_latencies() {
        let mut s = session();
        for timing_ms in [120, 80] {
            s.moves.push(MoveRecord {
                model: "llama3".to_string(),
                position: 0,
                interaction: Some(crate::llm::Interaction {
                    model: "llama3".to_string(),
                    prompt: String::new(),
                    response: String::new(),
                    attempts: 1,
                    prompt_tokens: 0,
                    response_tokens: 0,
                    timing_ms,
                }),
                is_random: false,
            });
        }
        s.moves.push(MoveRecord {
            model: "mistral".to_string(),
            position: 1,
            interaction: None,
            is_random: false,
        });
        assert_eq!(s.total_time_ms(), 200);
    }
}
