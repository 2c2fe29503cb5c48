//! Inference provider client and the move-extraction protocol.

mod client;
mod extract;

pub use client::{
    Generation, InferenceProvider, LlmError, ModelInfo, OllamaClient, SamplingOptions,
};
pub use extract::{ExtractedMove, Interaction, MoveExtractor, Parsed};
