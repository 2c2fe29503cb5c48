//! Best-effort fan-out of session events to live observers.

use crate::arena::SessionId;
use crate::games::tictactoe::Board;
use crate::llm::Interaction;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

/// Identity of a connected observer, independent of the sessions it
/// watches.
pub type ObserverId = u64;

/// Participants shown on a game-start frame.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStartInfo {
    /// Participant to move first.
    pub current_turn: String,
    /// First participant (X).
    pub model1: String,
    /// Second participant (O).
    pub model2: String,
}

/// Event frames delivered to observers.
///
/// The wire encoding is load-bearing: existing observer clients key on
/// the `type` tag and these exact field names.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GameEvent {
    /// A session left `pending` and its loop is starting.
    #[serde(rename_all = "camelCase")]
    GameStart {
        /// Participants and first mover.
        game: GameStartInfo,
    },
    /// A participant's move has been requested.
    #[serde(rename_all = "camelCase")]
    Thinking {
        /// Participant whose move is being extracted.
        player: String,
        /// Board at the start of the turn.
        board: Board,
        /// First participant (X).
        model1: String,
        /// Second participant (O).
        model2: String,
    },
    /// A move was applied to the board.
    #[serde(rename_all = "camelCase")]
    Move {
        /// Participant that moved.
        player: String,
        /// Board after the move.
        board: Board,
        /// Cell index played.
        #[serde(rename = "move")]
        position: usize,
        /// Extraction record behind the move.
        interaction: Interaction,
        /// True when the move was the random fallback.
        is_random: bool,
        /// First participant (X).
        model1: String,
        /// Second participant (O).
        model2: String,
    },
    /// The session reached a terminal state.
    #[serde(rename_all = "camelCase")]
    GameEnd {
        /// Winning participant or `"draw"`.
        winner: String,
        /// Human-readable terminal reason.
        reason: String,
        /// Final board.
        board: Board,
        /// First participant (X).
        model1: String,
        /// Second participant (O).
        model2: String,
    },
    /// The session aborted with a process-level failure.
    #[serde(rename_all = "camelCase")]
    Error {
        /// Failure description.
        message: String,
    },
}

struct Subscriber {
    observer: ObserverId,
    tx: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
struct Registry {
    next_observer: ObserverId,
    senders: HashMap<ObserverId, mpsc::UnboundedSender<String>>,
    subscriptions: HashMap<SessionId, Vec<Subscriber>>,
}

/// Observer registry with best-effort, order-preserving delivery.
///
/// All mutation goes through one lock, so a `publish` never races a
/// subscribe or disconnect. Events for a session reach every observer
/// in emission order because the orchestrator publishes synchronously
/// from its sequential loop.
#[derive(Clone, Default)]
pub struct Broadcaster {
    registry: Arc<Mutex<Registry>>,
}

impl Broadcaster {
    /// Creates an empty broadcaster.
    #[instrument]
    pub fn new() -> Self {
        info!("Creating broadcaster");
        Self::default()
    }

    /// Registers a new observer connection.
    ///
    /// Returns the observer's identity and the receiving end of its
    /// frame channel. The observer sees no events until it subscribes
    /// to a session.
    #[instrument(skip(self))]
    pub fn connect(&self) -> (ObserverId, mpsc::UnboundedReceiver<String>) {
        let mut registry = self.registry.lock().expect("observer registry poisoned");
        registry.next_observer += 1;
        let observer = registry.next_observer;

        let (tx, rx) = mpsc::unbounded_channel();
        registry.senders.insert(observer, tx);

        debug!(observer, "Observer connected");
        (observer, rx)
    }

    /// Subscribes an observer to a session's event stream. Idempotent.
    #[instrument(skip(self))]
    pub fn subscribe(&self, observer: ObserverId, session_id: &str) {
        let mut registry = self.registry.lock().expect("observer registry poisoned");

        let Some(tx) = registry.senders.get(&observer).cloned() else {
            warn!(observer, "Subscribe from unknown observer");
            return;
        };

        let subscribers = registry
            .subscriptions
            .entry(session_id.to_string())
            .or_default();
        if subscribers.iter().any(|s| s.observer == observer) {
            debug!(observer, session_id, "Already subscribed");
            return;
        }

        subscribers.push(Subscriber { observer, tx });
        info!(observer, session_id, "Observer subscribed");
    }

    /// Removes an observer from every session it watches.
    ///
    /// Keyed by observer identity: a disconnect is detected
    /// independently of which sessions the observer watched.
    #[instrument(skip(self))]
    pub fn unsubscribe(&self, observer: ObserverId) {
        let mut registry = self.registry.lock().expect("observer registry poisoned");

        registry.senders.remove(&observer);
        for subscribers in registry.subscriptions.values_mut() {
            subscribers.retain(|s| s.observer != observer);
        }
        registry.subscriptions.retain(|_, subs| !subs.is_empty());

        info!(observer, "Observer disconnected");
    }

    /// Delivers an event to every open observer of the session.
    ///
    /// Best-effort: closed observers are pruned silently and a session
    /// with no observers is a no-op, never an error.
    #[instrument(skip(self, event), fields(session_id))]
    pub fn publish(&self, session_id: &str, event: &GameEvent) {
        let frame = match serde_json::to_string(event) {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = ?e, "Failed to encode event frame");
                return;
            }
        };

        let mut registry = self.registry.lock().expect("observer registry poisoned");
        let Some(subscribers) = registry.subscriptions.get_mut(session_id) else {
            debug!(session_id, "No observers for session");
            return;
        };

        subscribers.retain(|s| match s.tx.send(frame.clone()) {
            Ok(()) => true,
            Err(_) => {
                debug!(observer = s.observer, "Dropping closed observer");
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(message: &str) -> GameEvent {
        GameEvent::Error {
            message: message.to_string(),
        }
    }

    #[test]
    fn publish_without_observers_is_a_noop() {
        let broadcaster = Broadcaster::new();
        broadcaster.publish("s1", &event("nobody listening"));
    }

    #[test]
    fn subscribe_is_idempotent() {
        let broadcaster = Broadcaster::new();
        let (observer, mut rx) = broadcaster.connect();
        broadcaster.subscribe(observer, "s1");
        broadcaster.subscribe(observer, "s1");

        broadcaster.publish("s1", &event("once"));
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unsubscribe_removes_from_all_sessions() {
        let broadcaster = Broadcaster::new();
        let (observer, mut rx) = broadcaster.connect();
        broadcaster.subscribe(observer, "s1");
        broadcaster.subscribe(observer, "s2");
        broadcaster.unsubscribe(observer);

        broadcaster.publish("s1", &event("gone"));
        broadcaster.publish("s2", &event("gone"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn move_frame_uses_wire_field_names() {
        let frame = serde_json::to_value(GameEvent::Move {
            player: "llama3".to_string(),
            board: Board::new(),
            position: 4,
            interaction: Interaction {
                model: "llama3".to_string(),
                prompt: "p".to_string(),
                response: "4".to_string(),
                attempts: 1,
                prompt_tokens: 10,
                response_tokens: 1,
                timing_ms: 5,
            },
            is_random: false,
            model1: "llama3".to_string(),
            model2: "mistral".to_string(),
        })
        .unwrap();

        assert_eq!(frame["type"], "move");
        assert_eq!(frame["move"], 4);
        assert_eq!(frame["isRandom"], false);
        assert_eq!(frame["interaction"]["promptTokens"], 10);
        assert_eq!(frame["interaction"]["timingMs"], 5);
        assert_eq!(frame["board"][4], serde_json::Value::Null);
    }
}
