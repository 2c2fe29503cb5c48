//! Move-extraction protocol: free-form model output to a validated move.
//!
//! One extraction call makes up to [`MAX_ATTEMPTS`] inference requests.
//! Malformed or illegal answers retry with a corrective prompt; once the
//! cap is exhausted a uniformly random legal move is substituted and
//! flagged, so the orchestrator always obtains a legal move. Transport
//! failures are never retried here - they surface to the orchestrator.

use crate::games::tictactoe::{Board, Mark};
use crate::llm::client::{InferenceProvider, LlmError, SamplingOptions};
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Attempt cap before the random fallback fires.
pub const MAX_ATTEMPTS: u32 = 3;

/// Response text recorded on the synthetic fallback interaction.
const FALLBACK_RESPONSE: &str = "failed to get a valid move after multiple attempts";

static FORMAT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<think>.*?</think>\s*(\d+)\s*$").expect("valid format regex")
});
static DIGITS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("valid digits regex"));

/// Record of one extraction attempt cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    /// Participant (model name) the cycle ran for.
    pub model: String,
    /// Full prompt text of the first attempt.
    pub prompt: String,
    /// Raw response text of the final attempt.
    pub response: String,
    /// Inference attempts consumed, always at least 1.
    pub attempts: u32,
    /// Prompt token count, approximated by text length when the
    /// provider omits it.
    pub prompt_tokens: u64,
    /// Response token count, approximated by text length when the
    /// provider omits it.
    pub response_tokens: u64,
    /// Wall-clock latency of the final inference call.
    pub timing_ms: u64,
}

/// A legal move obtained from a model, or its flagged fallback.
#[derive(Debug, Clone)]
pub struct ExtractedMove {
    /// Chosen cell index, always legal for the board it was extracted
    /// against.
    pub cell: usize,
    /// The interaction that produced the move.
    pub interaction: Interaction,
    /// True when the move is the forced random fallback.
    pub is_random: bool,
}

/// Tagged result of parsing one raw response.
///
/// Retrying is a plain transition over this tag rather than error
/// handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parsed {
    /// A digit was found and names a currently legal cell.
    Valid(usize),
    /// No digit sequence anywhere in the response.
    ParseFailure,
    /// A digit was found but does not name a legal cell.
    Illegal(usize),
}

/// Parses a raw model response into a move candidate.
///
/// First tries the required shape - a `<think>` section followed by
/// trailing digits - then falls back to the last digit run found
/// anywhere in the response.
pub fn parse_response(response: &str, valid_moves: &[usize]) -> Parsed {
    let digits = match FORMAT_RE.captures(response) {
        Some(caps) => caps.get(1).map(|m| m.as_str().to_string()),
        None => DIGITS_RE
            .find_iter(response)
            .last()
            .map(|m| m.as_str().to_string()),
    };

    let Some(digits) = digits else {
        return Parsed::ParseFailure;
    };

    match digits.parse::<usize>() {
        Ok(cell) if valid_moves.contains(&cell) => Parsed::Valid(cell),
        Ok(cell) => Parsed::Illegal(cell),
        // Digit run too long for usize; nothing usable in it.
        Err(_) => Parsed::ParseFailure,
    }
}

/// Runs the attempt loop against an inference provider.
#[derive(Clone)]
pub struct MoveExtractor {
    provider: Arc<dyn InferenceProvider>,
    options: SamplingOptions,
}

impl MoveExtractor {
    /// Creates an extractor with deterministic-leaning sampling.
    pub fn new(provider: Arc<dyn InferenceProvider>) -> Self {
        Self {
            provider,
            options: SamplingOptions::default(),
        }
    }

    /// Obtains one legal cell index from `model`, or a flagged fallback.
    ///
    /// `history` is the session's move positions in play order (even
    /// indices were played by X).
    ///
    /// # Errors
    ///
    /// Fails fast without retrying when no model is designated or the
    /// board has no valid moves, and propagates transport errors from
    /// the provider immediately.
    #[instrument(skip(self, board, history), fields(model = %model, mark = %mark))]
    pub async fn extract_move(
        &self,
        model: &str,
        mark: Mark,
        board: &Board,
        history: &[usize],
    ) -> Result<ExtractedMove, LlmError> {
        if model.is_empty() {
            return Err(LlmError::new("no active model"));
        }
        let valid_moves = board.valid_moves();
        if valid_moves.is_empty() {
            return Err(LlmError::new("no valid moves available"));
        }

        let prompt = build_prompt(mark, board, history, &valid_moves);

        for attempt in 1..=MAX_ATTEMPTS {
            let attempt_prompt = if attempt == 1 {
                prompt.clone()
            } else {
                build_retry_prompt(attempt, mark, board, &valid_moves)
            };

            let started = Instant::now();
            let generation = self
                .provider
                .generate(model, &attempt_prompt, self.options)
                .await?;
            let timing_ms = started.elapsed().as_millis() as u64;

            let response = generation.response.trim().to_string();
            debug!(attempt, response_length = response.len(), "Response received");

            match parse_response(&response, &valid_moves) {
                Parsed::Valid(cell) => {
                    info!(cell, attempt, "Extracted valid move");
                    return Ok(ExtractedMove {
                        cell,
                        interaction: Interaction {
                            model: model.to_string(),
                            prompt_tokens: generation
                                .prompt_tokens
                                .unwrap_or(attempt_prompt.len() as u64),
                            response_tokens: generation
                                .response_tokens
                                .unwrap_or(response.len() as u64),
                            prompt,
                            response,
                            attempts: attempt,
                            timing_ms,
                        },
                        is_random: false,
                    });
                }
                Parsed::ParseFailure => {
                    warn!(attempt, response = %response, "No digit in response");
                }
                Parsed::Illegal(cell) => {
                    warn!(attempt, cell, valid = ?valid_moves, "Illegal move in response");
                }
            }
        }

        warn!(
            model,
            attempts = MAX_ATTEMPTS,
            "Attempt cap exhausted, selecting random move"
        );
        let cell = valid_moves[rand::thread_rng().gen_range(0..valid_moves.len())];
        Ok(ExtractedMove {
            cell,
            interaction: Interaction {
                model: model.to_string(),
                prompt,
                response: FALLBACK_RESPONSE.to_string(),
                attempts: MAX_ATTEMPTS,
                prompt_tokens: 0,
                response_tokens: 0,
                timing_ms: 0,
            },
            is_random: true,
        })
    }
}

/// Builds the full first-attempt prompt.
fn build_prompt(mark: Mark, board: &Board, history: &[usize], valid_moves: &[usize]) -> String {
    let valid_list = join_moves(valid_moves);
    let move_lines = if history.is_empty() {
        "No moves yet".to_string()
    } else {
        history
            .iter()
            .enumerate()
            .map(|(i, position)| {
                let mover = if i % 2 == 0 { Mark::X } else { Mark::O };
                let who = if mover == mark { "YOU" } else { "OPPONENT" };
                format!("Move #{}: {} played position {}", i + 1, who, position)
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    let (yours, theirs) = partition_history(mark, history);

    format!(
        "You are playing tic-tac-toe as player {mark}. Your opponent is {opponent}.\n\
         \n\
         Current board (empty cells are labeled with their position number):\n\
         {board}\n\
         \n\
         Move history:\n\
         {move_lines}\n\
         \n\
         Your previous moves: {yours}\n\
         Opponent's moves: {theirs}\n\
         \n\
         Positions are numbered 0-8, left to right, top to bottom:\n\
         0 | 1 | 2\n\
         ---------\n\
         3 | 4 | 5\n\
         ---------\n\
         6 | 7 | 8\n\
         \n\
         Lines: rows [0,1,2] [3,4,5] [6,7,8], columns [0,3,6] [1,4,7] [2,5,8], \
         diagonals [0,4,8] [2,4,6]. Three of your marks on one line wins.\n\
         \n\
         You MUST choose one of the valid moves: {valid_list}\n\
         \n\
         RESPONSE FORMAT:\n\
         <think>\n\
         Your analysis of threats, winning moves, and strategy.\n\
         </think>\n\
         [a single digit from: {valid_list}]\n\
         \n\
         Your response must end with exactly one digit.",
        mark = mark,
        opponent = mark.opponent(),
        board = board.render(),
    )
}

/// Builds the short corrective prompt for attempts after the first.
fn build_retry_prompt(attempt: u32, mark: Mark, board: &Board, valid_moves: &[usize]) -> String {
    let valid_list = join_moves(valid_moves);
    format!(
        "RETRY ATTEMPT {attempt}: your previous response was invalid.\n\
         \n\
         You are playing tic-tac-toe as player {mark}. Current board:\n\
         {board}\n\
         \n\
         You can ONLY choose from these positions: {valid_list}\n\
         Any other number will be rejected.\n\
         \n\
         Explain your choice inside <think> tags, then end your response \
         with exactly one digit from: {valid_list}",
        board = board.render(),
    )
}

fn partition_history(mark: Mark, history: &[usize]) -> (String, String) {
    let by = |wanted: Mark| {
        let positions = history
            .iter()
            .enumerate()
            .filter_map(|(i, position)| {
                let mover = if i % 2 == 0 { Mark::X } else { Mark::O };
                (mover == wanted).then_some(position.to_string())
            })
            .collect::<Vec<_>>();
        if positions.is_empty() {
            "None".to_string()
        } else {
            positions.join(", ")
        }
    };
    (by(mark), by(mark.opponent()))
}

fn join_moves(moves: &[usize]) -> String {
    moves
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
