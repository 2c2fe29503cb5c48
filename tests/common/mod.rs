//! Shared test support: a scripted inference provider.

use async_trait::async_trait;
use model_arena::{Generation, InferenceProvider, LlmError, ModelInfo, SamplingOptions};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

/// One scripted provider step.
pub enum Step {
    /// Return this response text.
    Respond(&'static str),
    /// Fail with a transport error carrying this message.
    Fail(&'static str),
}

/// Inference provider that replays a fixed script, one step per
/// `generate` call.
pub struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicU32,
}

impl ScriptedProvider {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            calls: AtomicU32::new(0),
        }
    }

    /// Number of `generate` calls made so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceProvider for ScriptedProvider {
    async fn list_models(&self) -> Result<Vec<ModelInfo>, LlmError> {
        Ok(vec![])
    }

    async fn generate(
        &self,
        _model: &str,
        _prompt: &str,
        _options: SamplingOptions,
    ) -> Result<Generation, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.steps.lock().expect("script lock").pop_front() {
            Some(Step::Respond(text)) => Ok(Generation {
                response: text.to_string(),
                prompt_tokens: Some(10),
                response_tokens: Some(5),
            }),
            Some(Step::Fail(message)) => Err(LlmError::new(message)),
            None => Err(LlmError::new("script exhausted")),
        }
    }
}
