use serde::{Deserialize, Serialize};

use crate::config::llm_provider::LlmProvider;

/// Context window assumed when neither the config nor the model name tells us better.
pub const DEFAULT_CONTEXT_WINDOW: usize = 4096;

/// Tokens reserved for the completion when `max_tokens` is unset.
pub const DEFAULT_NUM_OUTPUTS: usize = 256;

/// Configuration for an LLM model invocation (completion or embedding).
///
/// # Fields
///
/// - `provider`: Which LLM provider/backend to use (Ollama, OpenAI).
/// - `model`: The model identifier (e.g., `"gpt-3.5-turbo"`, `"llama3"`).
/// - `endpoint`: Base URL of the inference server (no path suffix).
/// - `api_key`: Optional API key for providers that require authentication.
/// - `max_tokens`: Maximum number of tokens to generate.
/// - `context_window`: Total tokens the model accepts (prompt + output).
/// - `temperature`: Controls randomness (0.0 = deterministic).
/// - `top_p`: Nucleus sampling cutoff.
/// - `timeout_secs`: Optional request timeout in seconds.
///
/// # Examples
///
/// ```
/// use service_context::config::llm_model_config::LlmModelConfig;
/// use service_context::config::llm_provider::LlmProvider;
///
/// let cfg = LlmModelConfig {
///     provider: LlmProvider::Ollama,
///     model: "llama3".to_string(),
///     endpoint: "http://localhost:11434".to_string(),
///     api_key: None,
///     max_tokens: Some(512),
///     context_window: Some(8192),
///     temperature: Some(0.2),
///     top_p: None,
///     timeout_secs: Some(60),
/// };
/// assert_eq!(cfg.context_window_or_default(), 8192);
/// assert_eq!(cfg.num_output_or_default(), 512);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmModelConfig {
    /// The LLM provider/backend.
    pub provider: LlmProvider,

    /// Model identifier string.
    pub model: String,

    /// Inference endpoint (base URL).
    pub endpoint: String,

    /// Optional API key for authentication (e.g., OpenAI).
    pub api_key: Option<String>,

    /// Maximum number of tokens to generate.
    pub max_tokens: Option<u32>,

    /// Total context window in tokens.
    pub context_window: Option<u32>,

    /// Sampling temperature.
    pub temperature: Option<f32>,

    /// Nucleus sampling parameter.
    pub top_p: Option<f32>,

    /// Optional request timeout (in seconds).
    pub timeout_secs: Option<u64>,
}

impl LlmModelConfig {
    /// Context window, falling back to a per-model table and then [`DEFAULT_CONTEXT_WINDOW`].
    pub fn context_window_or_default(&self) -> usize {
        self.context_window
            .map(|w| w as usize)
            .or_else(|| known_context_window(&self.model))
            .unwrap_or(DEFAULT_CONTEXT_WINDOW)
    }

    /// Output budget (`max_tokens`) or [`DEFAULT_NUM_OUTPUTS`].
    pub fn num_output_or_default(&self) -> usize {
        self.max_tokens
            .map(|t| t as usize)
            .unwrap_or(DEFAULT_NUM_OUTPUTS)
    }
}

/// Context windows of a few well-known OpenAI models.
fn known_context_window(model: &str) -> Option<usize> {
    let m = model.trim();
    if m.starts_with("gpt-4-32k") {
        Some(32_768)
    } else if m.starts_with("gpt-4") {
        Some(8_192)
    } else if m.starts_with("gpt-3.5-turbo-16k") {
        Some(16_384)
    } else if m.starts_with("gpt-3.5-turbo") {
        Some(4_096)
    } else if m == "text-davinci-003" || m == "text-davinci-002" {
        Some(4_097)
    } else {
        None
    }
}
