//! Thin HTTP route layer and the observer WebSocket endpoint.
//!
//! Handlers map requests onto the arena collaborators held by
//! [`ArenaState`]; all game logic lives in the orchestrator and below.

use crate::arena::{GameSession, Orchestrator, SessionManager};
use crate::broadcast::Broadcaster;
use crate::config::ArenaConfig;
use crate::db::GameRepository;
use crate::llm::{InferenceProvider, ModelInfo, MoveExtractor};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, instrument, warn};

/// Shared arena context, passed explicitly to every handler.
///
/// Owns the two concurrently-mutated registries (sessions, observers)
/// plus the external collaborators; there is no ambient global state.
#[derive(Clone)]
pub struct ArenaState {
    /// Loaded configuration.
    pub config: ArenaConfig,
    /// Session registry.
    pub sessions: SessionManager,
    /// Observer registry.
    pub broadcaster: Broadcaster,
    /// Inference provider.
    pub provider: Arc<dyn InferenceProvider>,
    /// Games database.
    pub repository: GameRepository,
}

impl ArenaState {
    /// Creates the arena context around an inference provider and an
    /// initialized repository.
    #[instrument(skip_all)]
    pub fn new(
        config: ArenaConfig,
        provider: Arc<dyn InferenceProvider>,
        repository: GameRepository,
    ) -> Self {
        info!("Creating arena state");
        Self {
            config,
            sessions: SessionManager::new(),
            broadcaster: Broadcaster::new(),
            provider,
            repository,
        }
    }

    /// Builds an orchestrator over this context's collaborators.
    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            self.sessions.clone(),
            self.broadcaster.clone(),
            MoveExtractor::new(self.provider.clone()),
            self.repository.clone(),
            Duration::from_millis(*self.config.pacing_ms()),
        )
    }
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl std::fmt::Display) -> ApiError {
    (status, Json(json!({ "error": message.to_string() })))
}

/// Builds the arena router.
pub fn router(state: ArenaState) -> Router {
    Router::new()
        .route("/api/models", get(list_models))
        .route("/api/game/start", post(start_game))
        .route("/api/game/{id}", get(get_active_game))
        .route("/api/games", get(list_games))
        .route("/api/games/{id}", get(get_stored_game))
        .route("/api/rankings", get(get_rankings))
        .route("/ws", get(ws_upgrade))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Request body for starting a match.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartGameRequest {
    /// First participant, plays X.
    pub model1: String,
    /// Second participant, plays O.
    pub model2: String,
    /// Game type label.
    #[serde(default = "default_game_type")]
    pub game_type: String,
}

fn default_game_type() -> String {
    "tictactoe".to_string()
}

#[instrument(skip(state))]
async fn list_models(State(state): State<ArenaState>) -> Result<Json<Vec<ModelInfo>>, ApiError> {
    let models = state
        .provider
        .list_models()
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;
    Ok(Json(models))
}

#[instrument(skip(state, req), fields(model1 = %req.model1, model2 = %req.model2))]
async fn start_game(
    State(state): State<ArenaState>,
    Json(req): Json<StartGameRequest>,
) -> Result<Json<Value>, ApiError> {
    for model in [&req.model1, &req.model2] {
        let known = state
            .provider
            .has_model(model)
            .await
            .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;
        if !known {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                format!("Model {} not found", model),
            ));
        }
    }

    let id = uuid::Uuid::new_v4().to_string();
    let session = GameSession::new(id.clone(), req.model1, req.model2, req.game_type);
    state
        .sessions
        .create_session(session)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;

    info!(session_id = %id, "Match registered, spawning orchestrator");
    let orchestrator = state.orchestrator();
    let session_id = id.clone();
    tokio::spawn(async move {
        // Give the caller a beat to open its watch socket before the
        // first frames go out.
        tokio::time::sleep(Duration::from_millis(100)).await;
        orchestrator.run(&session_id).await;
    });

    Ok(Json(json!({ "gameId": id })))
}

#[instrument(skip(state))]
async fn get_active_game(
    State(state): State<ArenaState>,
    Path(id): Path<String>,
) -> Result<Json<GameSession>, ApiError> {
    state
        .sessions
        .get_session(&id)
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Game not found"))
}

/// Row shape for the finished-games listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GameSummary {
    id: i32,
    model1: String,
    model2: String,
    winner: String,
    total_time_ms: i64,
    created_at: chrono::NaiveDateTime,
    total_moves: usize,
    random_moves_count: usize,
}

#[instrument(skip(state))]
async fn list_games(State(state): State<ArenaState>) -> Result<Json<Vec<GameSummary>>, ApiError> {
    let games = state
        .repository
        .recent_games(10)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;

    let summaries = games
        .iter()
        .map(|game| {
            let moves = game.parse_moves().map(|p| p.moves).unwrap_or_default();
            GameSummary {
                id: *game.id(),
                model1: game.model1().clone(),
                model2: game.model2().clone(),
                winner: game.winner().clone(),
                total_time_ms: *game.total_time_ms(),
                created_at: *game.created_at(),
                total_moves: moves.len(),
                random_moves_count: moves.iter().filter(|m| m.is_random).count(),
            }
        })
        .collect();

    Ok(Json(summaries))
}

#[instrument(skip(state))]
async fn get_stored_game(
    State(state): State<ArenaState>,
    Path(id): Path<i32>,
) -> Result<Json<Value>, ApiError> {
    let game = state
        .repository
        .get_game(id)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Game not found"))?;

    let payload = game
        .parse_moves()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;

    let total_moves = payload.moves.len();
    let move_count = total_moves.max(1) as f64;
    let (prompt_tokens, response_tokens) = payload
        .moves
        .iter()
        .filter_map(|m| m.interaction.as_ref())
        .fold((0u64, 0u64), |(p, r), i| {
            (p + i.prompt_tokens, r + i.response_tokens)
        });

    Ok(Json(json!({
        "id": game.id(),
        "model1": game.model1(),
        "model2": game.model2(),
        "gameType": game.game_type(),
        "winner": game.winner(),
        "totalTimeMs": game.total_time_ms(),
        "createdAt": game.created_at(),
        "moves": payload,
        "stats": {
            "totalMoves": total_moves,
            "avgMoveTimeMs": *game.total_time_ms() as f64 / move_count,
            "avgPromptTokens": prompt_tokens as f64 / move_count,
            "avgResponseTokens": response_tokens as f64 / move_count,
        },
    })))
}

#[instrument(skip(state))]
async fn get_rankings(State(state): State<ArenaState>) -> Result<Json<Value>, ApiError> {
    let rankings = state
        .repository
        .rankings()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e))?;
    Ok(Json(json!(rankings)))
}

/// Inbound observer subscription message.
#[derive(Debug, Deserialize)]
struct WatchRequest {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "sessionId")]
    session_id: String,
}

#[instrument(skip(ws, state))]
async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<ArenaState>) -> Response {
    ws.on_upgrade(move |socket| handle_observer(socket, state))
}

/// Pumps broadcast frames to one observer socket and handles its watch
/// requests until either side closes.
async fn handle_observer(mut socket: WebSocket, state: ArenaState) {
    let (observer, mut rx) = state.broadcaster.connect();
    debug!(observer, "Observer socket open");

    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Some(text) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<WatchRequest>(text.as_str()) {
                        Ok(req) if req.kind == "watch" => {
                            state.broadcaster.subscribe(observer, &req.session_id);
                        }
                        Ok(req) => debug!(kind = %req.kind, "Ignoring observer message"),
                        Err(e) => warn!(error = %e, "Malformed observer message"),
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, observer, "Observer socket error");
                    break;
                }
            },
        }
    }

    state.broadcaster.unsubscribe(observer);
    debug!(observer, "Observer socket closed");
}
