//! Per-session turn loop: extract, apply, broadcast, repeat.

use crate::arena::session::{GameSession, MoveRecord, SessionManager, SessionStatus};
use crate::broadcast::{Broadcaster, GameEvent, GameStartInfo};
use crate::db::GameRepository;
use crate::llm::MoveExtractor;
use derive_more::{Display, Error};
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Outcome of a single turn, used to decide whether the loop continues.
enum Turn {
    Applied,
    /// The turn holder failed fatally; winner and reason are already
    /// recorded on the session.
    Forfeited,
}

/// Drives one game session from start to a terminal state.
///
/// Each session runs on its own task; within a session everything is
/// strictly sequential, so the only suspension points are the inference
/// call and the inter-turn pacing delay.
#[derive(Clone)]
pub struct Orchestrator {
    sessions: SessionManager,
    broadcaster: Broadcaster,
    extractor: MoveExtractor,
    repository: GameRepository,
    pacing: Duration,
}

impl Orchestrator {
    /// Creates an orchestrator over the shared arena collaborators.
    #[instrument(skip_all)]
    pub fn new(
        sessions: SessionManager,
        broadcaster: Broadcaster,
        extractor: MoveExtractor,
        repository: GameRepository,
        pacing: Duration,
    ) -> Self {
        info!(pacing_ms = pacing.as_millis() as u64, "Creating orchestrator");
        Self {
            sessions,
            broadcaster,
            extractor,
            repository,
            pacing,
        }
    }

    /// Runs a registered session to completion.
    ///
    /// Never panics the hosting task: process-level failures mark the
    /// session `error` and emit an `error` frame so observers are not
    /// left hanging.
    #[instrument(skip(self))]
    pub async fn run(&self, session_id: &str) {
        if let Err(e) = self.drive(session_id).await {
            error!(error = %e, session_id, "Session aborted");
            if let Some(mut session) = self.sessions.get_session(session_id) {
                session.status = SessionStatus::Error;
                session.reason = Some(e.message.clone());
                self.sessions.update_session(session);
            }
            self.broadcaster.publish(
                session_id,
                &GameEvent::Error {
                    message: e.message,
                },
            );
        }
    }

    async fn drive(&self, session_id: &str) -> Result<(), ArenaError> {
        let mut session = self
            .sessions
            .get_session(session_id)
            .ok_or_else(|| ArenaError::new(format!("session {} not found", session_id)))?;

        session.status = SessionStatus::Active;
        self.sessions.update_session(session.clone());

        self.broadcaster.publish(
            &session.id,
            &GameEvent::GameStart {
                game: GameStartInfo {
                    current_turn: session.current_turn.clone(),
                    model1: session.model1.clone(),
                    model2: session.model2.clone(),
                },
            },
        );
        self.publish_thinking(&session);

        while !session.board.evaluate().is_over {
            match self.take_turn(&mut session).await {
                Turn::Applied => {
                    session.switch_turn();
                    self.sessions.update_session(session.clone());

                    if session.board.evaluate().is_over {
                        break;
                    }
                    // Let observers render the applied move before the
                    // next thinking signal.
                    tokio::time::sleep(self.pacing).await;
                    self.publish_thinking(&session);
                }
                Turn::Forfeited => break,
            }
        }

        self.finalize(session);
        Ok(())
    }

    /// Extracts and applies one move for the current turn holder.
    async fn take_turn(&self, session: &mut GameSession) -> Turn {
        let model = session.current_turn.clone();
        let mark = session.current_mark();

        let extracted = match self
            .extractor
            .extract_move(&model, mark, &session.board, &session.positions())
            .await
        {
            Ok(extracted) => extracted,
            Err(e) => {
                warn!(error = %e, model = %model, "Extraction failed, forfeiting turn");
                return self.forfeit(session, &model, &e.to_string());
            }
        };

        if let Err(e) = session.board.apply_move(extracted.cell, mark) {
            // The protocol only returns validated cells; rejection here
            // means the board moved underneath us.
            warn!(error = %e, cell = extracted.cell, "Validated move rejected");
            return self.forfeit(session, &model, &e.to_string());
        }

        session.moves.push(MoveRecord {
            model: model.clone(),
            position: extracted.cell,
            interaction: Some(extracted.interaction.clone()),
            is_random: extracted.is_random,
        });

        info!(
            model = %model,
            cell = extracted.cell,
            is_random = extracted.is_random,
            move_count = session.moves.len(),
            "Move applied"
        );

        self.broadcaster.publish(
            &session.id,
            &GameEvent::Move {
                player: model,
                board: session.board.clone(),
                position: extracted.cell,
                interaction: extracted.interaction,
                is_random: extracted.is_random,
                model1: session.model1.clone(),
                model2: session.model2.clone(),
            },
        );

        Turn::Applied
    }

    /// Records a fatal move error as a loss for the offending
    /// participant.
    fn forfeit(&self, session: &mut GameSession, offender: &str, cause: &str) -> Turn {
        let winner = session.opponent_of(offender).to_string();
        session.winner = Some(winner);
        session.reason = Some(format!("{} made an invalid move: {}", offender, cause));
        Turn::Forfeited
    }

    fn publish_thinking(&self, session: &GameSession) {
        self.broadcaster.publish(
            &session.id,
            &GameEvent::Thinking {
                player: session.current_turn.clone(),
                board: session.board.clone(),
                model1: session.model1.clone(),
                model2: session.model2.clone(),
            },
        );
    }

    /// Finalizes the session exactly once: outcome, persistence,
    /// `gameEnd` frame.
    #[instrument(skip(self, session), fields(session_id = %session.id))]
    fn finalize(&self, mut session: GameSession) {
        if session.winner.is_none() {
            let outcome = session.board.evaluate();
            if let Some(mark) = outcome.winner {
                let winner = session.participant(mark).to_string();
                session.reason = Some(format!("{} won the game", winner));
                session.winner = Some(winner);
            } else {
                session.winner = Some("draw".to_string());
                session.reason = Some("Game ended in a draw".to_string());
            }
        }

        session.status = SessionStatus::Completed;
        self.sessions.update_session(session.clone());

        let winner = session.winner.clone().unwrap_or_default();
        let reason = session.reason.clone().unwrap_or_default();

        info!(
            winner = %winner,
            moves = session.moves.len(),
            total_time_ms = session.total_time_ms(),
            "Session finished"
        );

        // Best-effort: the in-memory terminal state stays authoritative
        // even when the write fails.
        if let Err(e) = self.repository.store_result(&session) {
            warn!(error = %e, session_id = %session.id, "Failed to persist game result");
        }

        self.broadcaster.publish(
            &session.id,
            &GameEvent::GameEnd {
                winner,
                reason,
                board: session.board.clone(),
                model1: session.model1.clone(),
                model2: session.model2.clone(),
            },
        );
    }
}

/// Orchestration error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Arena error: {} at {}:{}", message, file, line)]
pub struct ArenaError {
    /// Error message.
    pub message: String,
    /// Line number where the error occurred.
    pub line: u32,
    /// Source file where the error occurred.
    pub file: &'static str,
}

impl ArenaError {
    /// Creates a new orchestration error with caller location tracking.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}
