//! Lightweight Ollama service for text generation and embeddings.
//!
//! This module implements a thin client for the local Ollama API:
//! - `POST {endpoint}/api/generate`   — synchronous text generation (`stream=false`)
//! - `POST {endpoint}/api/embeddings` — embeddings retrieval
//!
//! It uses the universal configuration [`LlmModelConfig`] and ensures
//! that the selected provider is [`LlmProvider::Ollama`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{ProviderError, ProviderErrorKind, Result},
    services::{normalized_base, post_json},
};

/// Thin client for Ollama.
///
/// Reuses an HTTP client with a configurable timeout. Provides:
/// - [`OllamaService::generate`]   — synchronous text generation
/// - [`OllamaService::embeddings`] — embeddings retrieval
#[derive(Debug)]
pub struct OllamaService {
    client: reqwest::Client,
    cfg: LlmModelConfig,
    url_generate: String,
    url_embeddings: String,
}

impl OllamaService {
    /// Creates a new [`OllamaService`] from the given config.
    ///
    /// # Errors
    /// - `InvalidProvider` if `cfg.provider` is not `Ollama`
    /// - `InvalidEndpoint` if `cfg.endpoint` is invalid
    /// - [`crate::error_handler::ServiceContextError::HttpTransport`] if the HTTP client cannot be built
    pub fn new(cfg: LlmModelConfig) -> Result<Self> {
        if cfg.provider != LlmProvider::Ollama {
            return Err(
                ProviderError::new(LlmProvider::Ollama, ProviderErrorKind::InvalidProvider).into(),
            );
        }

        let base = normalized_base(LlmProvider::Ollama, &cfg.endpoint)?;

        let timeout = cfg
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(60));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()?;

        Ok(Self {
            client,
            url_generate: format!("{base}/api/generate"),
            url_embeddings: format!("{base}/api/embeddings"),
            cfg,
        })
    }

    /// Performs a **non-streaming** generation request via `/api/generate`.
    ///
    /// Mapped options: `num_predict` ← `max_tokens`, `num_ctx` ← `context_window`,
    /// plus `temperature` and `top_p`.
    #[instrument(skip_all, fields(model = %self.cfg.model))]
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let body = GenerateRequest::from_cfg(&self.cfg, prompt);
        let out: GenerateResponse = post_json(
            &self.client,
            LlmProvider::Ollama,
            &self.url_generate,
            &body,
            "`{ response: string }` (stream=false)",
        )
        .await?;
        Ok(out.response)
    }

    /// Retrieves embeddings via `/api/embeddings`.
    #[instrument(skip_all, fields(model = %self.cfg.model))]
    pub async fn embeddings(&self, input: &str) -> Result<Vec<f32>> {
        let body = EmbeddingsRequest {
            model: &self.cfg.model,
            prompt: input,
        };
        let out: EmbeddingsResponse = post_json(
            &self.client,
            LlmProvider::Ollama,
            &self.url_embeddings,
            &body,
            "`{ embedding: number[] }`",
        )
        .await?;
        Ok(out.embedding)
    }
}

/* ==========================
HTTP payloads & options
========================== */

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

impl<'a> GenerateRequest<'a> {
    fn from_cfg(cfg: &'a LlmModelConfig, prompt: &'a str) -> Self {
        Self {
            model: &cfg.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: cfg.temperature,
                top_p: cfg.top_p,
                num_predict: cfg.max_tokens,
                num_ctx: cfg.context_window,
            },
        }
    }
}

/// Subset of Ollama `options`.
#[derive(Debug, Default, Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_ctx: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handler::ServiceContextError;

    fn cfg(provider: LlmProvider) -> LlmModelConfig {
        LlmModelConfig {
            provider,
            model: "llama3".into(),
            endpoint: "http://localhost:11434/".into(),
            api_key: None,
            max_tokens: Some(128),
            context_window: Some(8192),
            temperature: Some(0.1),
            top_p: None,
            timeout_secs: None,
        }
    }

    #[test]
    fn builds_urls_from_base() {
        let svc = OllamaService::new(cfg(LlmProvider::Ollama)).unwrap();
        assert_eq!(svc.url_generate, "http://localhost:11434/api/generate");
        assert_eq!(svc.url_embeddings, "http://localhost:11434/api/embeddings");
    }

    #[test]
    fn rejects_foreign_provider() {
        let err = OllamaService::new(cfg(LlmProvider::OpenAI)).unwrap_err();
        assert!(matches!(
            err,
            ServiceContextError::Provider(ProviderError {
                kind: ProviderErrorKind::InvalidProvider,
                ..
            })
        ));
    }

    #[test]
    fn generate_request_maps_options() {
        let c = cfg(LlmProvider::Ollama);
        let body = serde_json::to_value(GenerateRequest::from_cfg(&c, "hi")).unwrap();
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], 128);
        assert_eq!(body["options"]["num_ctx"], 8192);
        assert!(body["options"].get("top_p").is_none());
    }
}
