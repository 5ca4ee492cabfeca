//! Default model configs and env-driven service settings.
//!
//! The hard-coded defaults are what [`crate::llm_predictor::LlmPredictor::default`]
//! and [`crate::embeddings::RemoteEmbedding::default`] use when a service
//! context is built without explicit collaborators. [`ServiceSettings`] reads
//! the same knobs from the environment for binaries.
//!
//! # Environment variables
//!
//! - `LLM_KIND`           = provider kind (`openai` | `ollama`, default `openai`)
//! - `LLM_MODEL`          = completion model (required for `ollama`)
//! - `LLM_ENDPOINT`       = base URL (provider default if unset)
//! - `OPENAI_API_KEY`     = API key for OpenAI
//! - `LLM_MAX_TOKENS`     = optional output budget (u32)
//! - `LLM_CONTEXT_WINDOW` = optional context window (u32)
//! - `EMBEDDING_MODEL`    = embedding model (required for `ollama`)
//! - `CHUNK_SIZE_LIMIT`   = optional chunk-size limit in tokens

use std::sync::Arc;

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    embeddings::RemoteEmbedding,
    error_handler::{ConfigError, Result, parse_opt_u32, parse_opt_usize, validate_http_endpoint},
    llm_predictor::RemoteLlm,
    service_context::ServiceContextOptions,
};

pub const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com";
pub const DEFAULT_OLLAMA_ENDPOINT: &str = "http://localhost:11434";
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";

/// Completion config used by the default predictor.
///
/// Reads `OPENAI_API_KEY` if present; a missing key only surfaces on the
/// first request.
///
/// # Defaults
/// - `temperature = Some(0.0)`
/// - `max_tokens = Some(256)`
/// - `timeout_secs = Some(60)`
pub fn config_openai_completion() -> LlmModelConfig {
    LlmModelConfig {
        provider: LlmProvider::OpenAI,
        model: DEFAULT_COMPLETION_MODEL.to_string(),
        endpoint: DEFAULT_OPENAI_ENDPOINT.to_string(),
        api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty()),
        max_tokens: Some(256),
        context_window: None,
        temperature: Some(0.0),
        top_p: None,
        timeout_secs: Some(60),
    }
}

/// Embedding config used by the default embedding model.
pub fn config_openai_embedding() -> LlmModelConfig {
    LlmModelConfig {
        provider: LlmProvider::OpenAI,
        model: DEFAULT_EMBEDDING_MODEL.to_string(),
        endpoint: DEFAULT_OPENAI_ENDPOINT.to_string(),
        api_key: std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty()),
        max_tokens: None,
        context_window: None,
        temperature: None,
        top_p: None,
        timeout_secs: Some(30),
    }
}

/// Settings needed to seed a service context from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSettings {
    /// Completion model config.
    pub llm: LlmModelConfig,
    /// Embedding model config.
    pub embedding: LlmModelConfig,
    /// Chunk-size limit in tokens (`None` = collaborator defaults).
    pub chunk_size_limit: Option<usize>,
}

impl ServiceSettings {
    /// Reads settings from the process environment.
    ///
    /// # Errors
    /// See [`ServiceSettings::from_lookup`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through an arbitrary key lookup.
    ///
    /// # Errors
    /// - [`ConfigError::UnsupportedProvider`] for an unknown `LLM_KIND`
    /// - [`ConfigError::MissingVar`] when `ollama` is selected without models
    /// - [`ConfigError::InvalidFormat`] for a non-HTTP `LLM_ENDPOINT`
    /// - [`ConfigError::InvalidNumber`] for malformed numeric values
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let provider = match non_empty("LLM_KIND") {
            Some(kind) => kind.parse::<LlmProvider>()?,
            None => LlmProvider::OpenAI,
        };

        let endpoint = non_empty("LLM_ENDPOINT").unwrap_or_else(|| match provider {
            LlmProvider::OpenAI => DEFAULT_OPENAI_ENDPOINT.to_string(),
            LlmProvider::Ollama => DEFAULT_OLLAMA_ENDPOINT.to_string(),
        });
        validate_http_endpoint("LLM_ENDPOINT", &endpoint)?;

        let (model, embedding_model) = match provider {
            LlmProvider::OpenAI => (
                non_empty("LLM_MODEL").unwrap_or_else(|| DEFAULT_COMPLETION_MODEL.to_string()),
                non_empty("EMBEDDING_MODEL").unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            ),
            LlmProvider::Ollama => (
                non_empty("LLM_MODEL").ok_or(ConfigError::MissingVar("LLM_MODEL"))?,
                non_empty("EMBEDDING_MODEL").ok_or(ConfigError::MissingVar("EMBEDDING_MODEL"))?,
            ),
        };

        let api_key = match provider {
            LlmProvider::OpenAI => non_empty("OPENAI_API_KEY"),
            LlmProvider::Ollama => None,
        };

        let max_tokens = parse_opt_u32("LLM_MAX_TOKENS", get("LLM_MAX_TOKENS"))?;
        let context_window = parse_opt_u32("LLM_CONTEXT_WINDOW", get("LLM_CONTEXT_WINDOW"))?;
        let chunk_size_limit =
            parse_opt_usize("CHUNK_SIZE_LIMIT", get("CHUNK_SIZE_LIMIT"))?.filter(|n| *n > 0);

        let llm = LlmModelConfig {
            provider,
            model,
            endpoint: endpoint.clone(),
            api_key: api_key.clone(),
            max_tokens: max_tokens.or(Some(256)),
            context_window,
            temperature: Some(0.0),
            top_p: None,
            timeout_secs: Some(60),
        };

        let embedding = LlmModelConfig {
            provider,
            model: embedding_model,
            endpoint,
            api_key,
            max_tokens: None,
            context_window: None,
            temperature: None,
            top_p: None,
            timeout_secs: Some(30),
        };

        Ok(Self {
            llm,
            embedding,
            chunk_size_limit,
        })
    }

    /// Turns the settings into construction overrides: a raw LLM handle, an
    /// embedding model and the chunk-size limit.
    pub fn into_options(self) -> ServiceContextOptions {
        ServiceContextOptions::new()
            .with_llm(Arc::new(RemoteLlm::new(self.llm)))
            .with_embed_model(Arc::new(RemoteEmbedding::new(self.embedding)))
            .with_chunk_size_limit(self.chunk_size_limit)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::error_handler::ServiceContextError;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn empty_env_yields_openai_defaults() {
        let s = ServiceSettings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(s.llm.provider, LlmProvider::OpenAI);
        assert_eq!(s.llm.model, DEFAULT_COMPLETION_MODEL);
        assert_eq!(s.embedding.model, DEFAULT_EMBEDDING_MODEL);
        assert_eq!(s.llm.endpoint, DEFAULT_OPENAI_ENDPOINT);
        assert_eq!(s.chunk_size_limit, None);
    }

    #[test]
    fn ollama_requires_models() {
        let err = ServiceSettings::from_lookup(lookup(&[("LLM_KIND", "ollama")])).unwrap_err();
        assert!(matches!(
            err,
            ServiceContextError::Config(ConfigError::MissingVar("LLM_MODEL"))
        ));

        let s = ServiceSettings::from_lookup(lookup(&[
            ("LLM_KIND", "ollama"),
            ("LLM_MODEL", "llama3"),
            ("EMBEDDING_MODEL", "bge-m3"),
            ("CHUNK_SIZE_LIMIT", "512"),
            ("LLM_CONTEXT_WINDOW", "8192"),
        ]))
        .unwrap();
        assert_eq!(s.llm.endpoint, DEFAULT_OLLAMA_ENDPOINT);
        assert_eq!(s.llm.api_key, None);
        assert_eq!(s.llm.context_window, Some(8192));
        assert_eq!(s.embedding.model, "bge-m3");
        assert_eq!(s.chunk_size_limit, Some(512));
    }

    #[test]
    fn zero_chunk_size_limit_means_unset() {
        let s = ServiceSettings::from_lookup(lookup(&[("CHUNK_SIZE_LIMIT", "0")])).unwrap();
        assert_eq!(s.chunk_size_limit, None);
    }

    #[test]
    fn rejects_bad_endpoint_and_numbers() {
        assert!(ServiceSettings::from_lookup(lookup(&[("LLM_ENDPOINT", "api.openai.com")])).is_err());
        assert!(ServiceSettings::from_lookup(lookup(&[("LLM_MAX_TOKENS", "lots")])).is_err());
    }
}
