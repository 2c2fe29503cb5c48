//! Tests for the move-extraction protocol.

mod common;

use common::{ScriptedProvider, Step};
use model_arena::{Board, Mark, MoveExtractor};
use std::sync::Arc;

fn extractor(steps: Vec<Step>) -> (Arc<ScriptedProvider>, MoveExtractor) {
    let provider = Arc::new(ScriptedProvider::new(steps));
    (provider.clone(), MoveExtractor::new(provider))
}

#[tokio::test]
async fn valid_move_on_first_attempt() {
    let (provider, extractor) = extractor(vec![Step::Respond("<think>center looks strong</think>\n4")]);

    let extracted = extractor
        .extract_move("llama3", Mark::X, &Board::new(), &[])
        .await
        .expect("extraction succeeds");

    assert_eq!(extracted.cell, 4);
    assert!(!extracted.is_random);
    assert_eq!(extracted.interaction.attempts, 1);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn retries_until_second_attempt_is_valid() {
    let (provider, extractor) = extractor(vec![
        Step::Respond("no digit to be found here"),
        Step::Respond("<think>blocking the row</think>\n7"),
    ]);

    let extracted = extractor
        .extract_move("llama3", Mark::O, &Board::new(), &[])
        .await
        .expect("extraction succeeds");

    assert_eq!(extracted.cell, 7);
    assert!(!extracted.is_random);
    assert_eq!(extracted.interaction.attempts, 2);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn illegal_moves_count_as_failed_attempts() {
    let mut board = Board::new();
    board.apply_move(4, Mark::X).unwrap();

    let (provider, extractor) = extractor(vec![
        Step::Respond("<think>taking the center</think>\n4"),
        Step::Respond("fine, then I will play 0"),
    ]);

    let extracted = extractor
        .extract_move("mistral", Mark::O, &board, &[4])
        .await
        .expect("extraction succeeds");

    assert_eq!(extracted.cell, 0);
    assert_eq!(extracted.interaction.attempts, 2);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn falls_back_to_random_after_three_failed_attempts() {
    let (provider, extractor) = extractor(vec![
        Step::Respond("I refuse to answer"),
        Step::Respond("still refusing"),
        Step::Respond("absolutely not"),
    ]);

    let board = Board::new();
    let extracted = extractor
        .extract_move("llama3", Mark::X, &board, &[])
        .await
        .expect("fallback always yields a move");

    assert!(extracted.is_random);
    assert!(board.valid_moves().contains(&extracted.cell));
    assert_eq!(extracted.interaction.attempts, 3);
    assert_eq!(
        extracted.interaction.response,
        "failed to get a valid move after multiple attempts"
    );
    assert_eq!(extracted.interaction.timing_ms, 0);
    assert_eq!(extracted.interaction.prompt_tokens, 0);
    assert_eq!(extracted.interaction.response_tokens, 0);
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn fallback_draws_only_from_remaining_cells() {
    // Only cell 3 left open, and no line is complete.
    let mut board = Board::new();
    let history = [0, 4, 8, 1, 7, 6, 2, 5];
    for (i, &cell) in history.iter().enumerate() {
        let mark = if i % 2 == 0 { Mark::X } else { Mark::O };
        board.apply_move(cell, mark).unwrap();
    }

    let (_, extractor) = extractor(vec![
        Step::Respond("nope"),
        Step::Respond("nope"),
        Step::Respond("nope"),
    ]);

    let extracted = extractor
        .extract_move("llama3", Mark::X, &board, &history)
        .await
        .expect("fallback always yields a move");

    assert!(extracted.is_random);
    assert_eq!(extracted.cell, 3);
}

#[tokio::test]
async fn transport_error_is_not_retried() {
    let (provider, extractor) = extractor(vec![Step::Fail("connection refused")]);

    let result = extractor
        .extract_move("llama3", Mark::X, &Board::new(), &[])
        .await;

    let err = result.expect_err("transport error propagates");
    assert!(err.to_string().contains("connection refused"));
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn missing_model_fails_fast() {
    let (provider, extractor) = extractor(vec![]);

    let result = extractor.extract_move("", Mark::X, &Board::new(), &[]).await;

    assert!(result.is_err());
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn full_board_fails_fast() {
    let mut board = Board::new();
    // X: 0, 8, 7, 2, 3 / O: 4, 1, 6, 5 - full board, no winner.
    for (cell, mark) in [
        (0, Mark::X),
        (4, Mark::O),
        (8, Mark::X),
        (1, Mark::O),
        (7, Mark::X),
        (6, Mark::O),
        (2, Mark::X),
        (5, Mark::O),
        (3, Mark::X),
    ] {
        board.apply_move(cell, mark).unwrap();
    }

    let (provider, extractor) = extractor(vec![]);
    let result = extractor
        .extract_move("llama3", Mark::X, &board, &[])
        .await;

    assert!(result.is_err());
    assert_eq!(provider.calls(), 0);
}
