//! End-to-end tests for the turn orchestrator.

mod common;

use common::{ScriptedProvider, Step};
use model_arena::{
    Broadcaster, GameRepository, GameSession, Mark, MoveExtractor, Orchestrator, SessionManager,
    SessionStatus,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

struct Arena {
    _db: NamedTempFile,
    sessions: SessionManager,
    broadcaster: Broadcaster,
    repository: GameRepository,
    orchestrator: Orchestrator,
}

fn arena(steps: Vec<Step>) -> Arena {
    let db_file = NamedTempFile::new().expect("temp db file");
    let db_path = db_file.path().to_str().expect("utf-8 path").to_string();
    let repository = GameRepository::new(db_path);
    repository.initialize().expect("migrations apply");

    let sessions = SessionManager::new();
    let broadcaster = Broadcaster::new();
    let provider = Arc::new(ScriptedProvider::new(steps));
    let orchestrator = Orchestrator::new(
        sessions.clone(),
        broadcaster.clone(),
        MoveExtractor::new(provider),
        repository.clone(),
        Duration::from_millis(0),
    );

    Arena {
        _db: db_file,
        sessions,
        broadcaster,
        repository,
        orchestrator,
    }
}

fn register_session(arena: &Arena) -> String {
    let session = GameSession::new(
        "game-1".to_string(),
        "llama3".to_string(),
        "mistral".to_string(),
        "tictactoe".to_string(),
    );
    arena
        .sessions
        .create_session(session)
        .expect("session registers")
}

fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<String>) -> Vec<serde_json::Value> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(serde_json::from_str(&frame).expect("frame is JSON"));
    }
    frames
}

#[tokio::test]
async fn diagonal_win_for_first_mover() {
    // X: 0, 4, 8 / O: 1, 5 - X wins on the 0-4-8 diagonal.
    let arena = arena(vec![
        Step::Respond("<think>corner</think>\n0"),
        Step::Respond("<think>next to it</think>\n1"),
        Step::Respond("<think>center</think>\n4"),
        Step::Respond("<think>blocking nothing</think>\n5"),
        Step::Respond("<think>completing the diagonal</think>\n8"),
    ]);
    let id = register_session(&arena);

    let (observer, mut rx) = arena.broadcaster.connect();
    arena.broadcaster.subscribe(observer, &id);

    arena.orchestrator.run(&id).await;

    let session = arena.sessions.get_session(&id).expect("session exists");
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.winner.as_deref(), Some("llama3"));
    assert_eq!(session.reason.as_deref(), Some("llama3 won the game"));
    assert_eq!(session.moves.len(), 5);
    assert_eq!(session.board.evaluate().winner, Some(Mark::X));

    let frames = drain(&mut rx);
    assert_eq!(frames.first().map(|f| f["type"].clone()), Some("gameStart".into()));
    assert_eq!(frames.last().map(|f| f["type"].clone()), Some("gameEnd".into()));

    let moves: Vec<u64> = frames
        .iter()
        .filter(|f| f["type"] == "move")
        .map(|f| f["move"].as_u64().expect("move is a number"))
        .collect();
    assert_eq!(moves, vec![0, 1, 4, 5, 8]);

    let last = frames.last().expect("at least one frame");
    assert_eq!(last["winner"], "llama3");
    assert_eq!(last["reason"], "llama3 won the game");
}

#[tokio::test]
async fn full_board_without_line_is_recorded_as_draw() {
    // X: 0, 8, 7, 2, 3 / O: 4, 1, 6, 5 - no completed line.
    let arena = arena(vec![
        Step::Respond("0"),
        Step::Respond("4"),
        Step::Respond("8"),
        Step::Respond("1"),
        Step::Respond("7"),
        Step::Respond("6"),
        Step::Respond("2"),
        Step::Respond("5"),
        Step::Respond("3"),
    ]);
    let id = register_session(&arena);

    arena.orchestrator.run(&id).await;

    let session = arena.sessions.get_session(&id).expect("session exists");
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.winner.as_deref(), Some("draw"));
    assert_eq!(session.reason.as_deref(), Some("Game ended in a draw"));
    assert_eq!(session.moves.len(), 9);
    assert!(session.board.evaluate().is_draw);
}

#[tokio::test]
async fn transport_error_loses_the_game_for_the_offender() {
    // O's first extraction dies on the wire.
    let arena = arena(vec![
        Step::Respond("<think>corner</think>\n0"),
        Step::Fail("connection refused"),
    ]);
    let id = register_session(&arena);

    let (observer, mut rx) = arena.broadcaster.connect();
    arena.broadcaster.subscribe(observer, &id);

    arena.orchestrator.run(&id).await;

    let session = arena.sessions.get_session(&id).expect("session exists");
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.winner.as_deref(), Some("llama3"));
    let reason = session.reason.expect("reason recorded");
    assert!(reason.contains("mistral"), "reason names the offender: {reason}");
    assert!(reason.contains("connection refused"));

    let frames = drain(&mut rx);
    let last = frames.last().expect("frames were emitted");
    assert_eq!(last["type"], "gameEnd");
    assert_eq!(last["winner"], "llama3");
}

#[tokio::test]
async fn random_fallback_keeps_the_game_alive() {
    // X never produces a digit on its first turn; the fallback must
    // land somewhere legal and the game continues to a terminal state.
    let arena = arena(vec![
        Step::Respond("no answer"),
        Step::Respond("no answer"),
        Step::Respond("no answer"),
        Step::Fail("connection refused"),
    ]);
    let id = register_session(&arena);

    arena.orchestrator.run(&id).await;

    let session = arena.sessions.get_session(&id).expect("session exists");
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.moves.len(), 1);
    assert!(session.moves[0].is_random);
    assert_eq!(session.winner.as_deref(), Some("llama3"));
}

#[tokio::test]
async fn finished_game_is_persisted_with_history() {
    let arena = arena(vec![
        Step::Respond("0"),
        Step::Respond("1"),
        Step::Respond("4"),
        Step::Respond("5"),
        Step::Respond("8"),
    ]);
    let id = register_session(&arena);

    arena.orchestrator.run(&id).await;

    let stored = arena.repository.recent_games(10).expect("query succeeds");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].winner(), "llama3");

    let payload = stored[0].parse_moves().expect("moves blob parses");
    assert_eq!(payload.moves.len(), 5);
    assert_eq!(payload.reason, "llama3 won the game");
    assert!(payload.moves.iter().all(|m| m.interaction.is_some()));

    let rankings = arena.repository.rankings().expect("rankings compute");
    let winner = rankings
        .iter()
        .find(|r| r.model == "llama3")
        .expect("winner ranked");
    assert_eq!(winner.wins, 1);
    let loser = rankings
        .iter()
        .find(|r| r.model == "mistral")
        .expect("loser ranked");
    assert_eq!(loser.losses, 1);
}

#[tokio::test]
async fn unknown_session_emits_error_frame() {
    let arena = arena(vec![]);

    let (observer, mut rx) = arena.broadcaster.connect();
    arena.broadcaster.subscribe(observer, "missing");

    arena.orchestrator.run("missing").await;

    let frames = drain(&mut rx);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["type"], "error");
    assert!(frames[0]["message"].as_str().expect("message is text").contains("missing"));
}
