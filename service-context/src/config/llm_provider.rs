use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error_handler::ConfigError;

/// Represents the provider (backend) used for large language model (LLM) inference
/// and embeddings.
///
/// # Examples
///
/// ```
/// use service_context::config::llm_provider::LlmProvider;
///
/// let provider: LlmProvider = "ollama".parse().unwrap();
/// assert_eq!(provider, LlmProvider::Ollama);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Local Ollama runtime for on-device inference.
    Ollama,
    /// OpenAI REST API (chat completions + embeddings).
    OpenAI,
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    /// Case-insensitive; `chatgpt` is accepted as an alias of `openai`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(LlmProvider::Ollama),
            "openai" | "chatgpt" => Ok(LlmProvider::OpenAI),
            other => Err(ConfigError::UnsupportedProvider(other.to_string())),
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmProvider::Ollama => f.write_str("ollama"),
            LlmProvider::OpenAI => f.write_str("openai"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases_case_insensitively() {
        assert_eq!("OpenAI".parse::<LlmProvider>().unwrap(), LlmProvider::OpenAI);
        assert_eq!("chatgpt".parse::<LlmProvider>().unwrap(), LlmProvider::OpenAI);
        assert_eq!(" Ollama ".parse::<LlmProvider>().unwrap(), LlmProvider::Ollama);
        assert!(matches!(
            "anthropic".parse::<LlmProvider>(),
            Err(ConfigError::UnsupportedProvider(p)) if p == "anthropic"
        ));
    }
}
