//! Inference provider abstraction and the Ollama HTTP client.

use async_trait::async_trait;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

/// Sampling options passed through to the provider.
///
/// Move extraction leans deterministic, so the defaults keep randomness
/// low.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SamplingOptions {
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus sampling cutoff.
    pub top_p: f32,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            top_p: 0.9,
        }
    }
}

/// A model available on the inference provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    /// Model name, as passed to [`InferenceProvider::generate`].
    pub name: String,
    /// Model size in bytes, when reported.
    pub size: Option<u64>,
    /// Last-modified timestamp, when reported.
    pub modified_at: Option<String>,
}

/// One completed generation.
#[derive(Debug, Clone)]
pub struct Generation {
    /// Raw response text.
    pub response: String,
    /// Prompt token count, when the provider reports it.
    pub prompt_tokens: Option<u64>,
    /// Response token count, when the provider reports it.
    pub response_tokens: Option<u64>,
}

/// Stateless remote inference dependency.
///
/// The arena never performs inference itself; this seam is the only
/// path to a model. Implementations must surface transport failures as
/// [`LlmError`] so the orchestrator can convert them into a loss for
/// the offending participant.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Lists the models the provider can serve.
    async fn list_models(&self) -> Result<Vec<ModelInfo>, LlmError>;

    /// Generates a completion for `prompt` with the named model.
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: SamplingOptions,
    ) -> Result<Generation, LlmError>;

    /// Checks whether the provider serves the named model.
    async fn has_model(&self, name: &str) -> Result<bool, LlmError> {
        Ok(self.list_models().await?.iter().any(|m| m.name == name))
    }
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
    size: Option<u64>,
    modified_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
}

/// Client for a local Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    http: reqwest::Client,
}

impl OllamaClient {
    /// Creates a client for the Ollama server at `base_url`.
    #[instrument(skip(base_url), fields(base_url = %base_url))]
    pub fn new(base_url: impl Into<String> + std::fmt::Display) -> Self {
        let base_url = base_url.into();
        info!("Creating Ollama client");
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl InferenceProvider for OllamaClient {
    #[instrument(skip(self))]
    async fn list_models(&self) -> Result<Vec<ModelInfo>, LlmError> {
        debug!("Fetching model list");
        let url = format!("{}/api/tags", self.base_url);

        let response = self.http.get(&url).send().await.map_err(|e| {
            error!(error = ?e, "Model list request failed");
            LlmError::new(format!("failed to fetch available models: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            error!(status = %status, "Provider returned error status");
            return Err(LlmError::new(format!(
                "provider error {} while listing models",
                status
            )));
        }

        let tags: TagsResponse = response.json().await.map_err(|e| {
            error!(error = ?e, "Failed to parse model list");
            LlmError::new(format!("failed to parse model list: {}", e))
        })?;

        let models = tags
            .models
            .into_iter()
            .map(|m| ModelInfo {
                name: m.name,
                size: m.size,
                modified_at: m.modified_at,
            })
            .collect::<Vec<_>>();

        info!(count = models.len(), "Model list fetched");
        Ok(models)
    }

    #[instrument(skip(self, prompt), fields(model = %model, prompt_length = prompt.len()))]
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: SamplingOptions,
    ) -> Result<Generation, LlmError> {
        debug!("Sending generate request");
        let url = format!("{}/api/generate", self.base_url);

        let request_body = serde_json::json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "options": options,
        });

        let response = self
            .http
            .post(&url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(error = ?e, "Generate request failed");
                LlmError::new(format!("generate request failed: {}", e))
            })?;

        let status = response.status();
        let response_text = response.text().await.map_err(|e| {
            error!(error = ?e, "Failed to read generate response");
            LlmError::new(format!("failed to read response: {}", e))
        })?;

        if !status.is_success() {
            error!(status = %status, response = %response_text, "Provider error");
            return Err(LlmError::new(format!(
                "provider error {}: {}",
                status, response_text
            )));
        }

        let parsed: GenerateResponse = serde_json::from_str(&response_text).map_err(|e| {
            error!(error = ?e, response = %response_text, "Failed to parse generate response");
            LlmError::new(format!("failed to parse response: {}", e))
        })?;

        info!(
            response_length = parsed.response.len(),
            "Generation received"
        );
        Ok(Generation {
            response: parsed.response,
            prompt_tokens: parsed.prompt_eval_count,
            response_tokens: parsed.eval_count,
        })
    }
}

/// Inference error with location tracking.
///
/// Covers both transport failures and configuration errors; neither is
/// retried by the extraction protocol.
#[derive(Debug, Clone, Display, Error)]
#[display("LLM error: {} at {}:{}", message, file, line)]
pub struct LlmError {
    /// Error message.
    pub message: String,
    /// Line number where the error occurred.
    pub line: u32,
    /// Source file where the error occurred.
    pub file: &'static str,
}

impl LlmError {
    /// Creates a new inference error with caller location tracking.
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
