//! Thin HTTP clients for the supported providers.
//!
//! [`ProviderClient`] picks the right client for an [`LlmModelConfig`] so the
//! remote LLM and remote embedding collaborators do not have to match on the
//! provider themselves.

pub mod ollama_service;
pub mod open_ai_service;

use std::time::Instant;

use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, error};

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{HttpError, ProviderError, ProviderErrorKind, Result, make_snippet},
};

use ollama_service::OllamaService;
use open_ai_service::OpenAiService;

/// A ready-to-use client for one provider.
#[derive(Debug)]
pub enum ProviderClient {
    Ollama(OllamaService),
    OpenAI(OpenAiService),
}

impl ProviderClient {
    /// Builds the client matching `cfg.provider`.
    ///
    /// # Errors
    /// Propagates validation errors of the underlying client constructor.
    pub fn from_config(cfg: LlmModelConfig) -> Result<Self> {
        match cfg.provider {
            LlmProvider::Ollama => Ok(Self::Ollama(OllamaService::new(cfg)?)),
            LlmProvider::OpenAI => Ok(Self::OpenAI(OpenAiService::new(cfg)?)),
        }
    }

    /// Single non-streaming completion.
    pub async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        match self {
            Self::Ollama(cli) => cli.generate(prompt).await,
            Self::OpenAI(cli) => cli.generate(prompt, system).await,
        }
    }

    /// Single embeddings vector.
    pub async fn embeddings(&self, input: &str) -> Result<Vec<f32>> {
        match self {
            Self::Ollama(cli) => cli.embeddings(input).await,
            Self::OpenAI(cli) => cli.embeddings(input).await,
        }
    }
}

/// Checks the scheme of `endpoint` and returns it without a trailing slash.
pub(crate) fn normalized_base(provider: LlmProvider, endpoint: &str) -> Result<String> {
    let trimmed = endpoint.trim();
    if !crate::error_handler::is_http_endpoint(trimmed) {
        return Err(ProviderError::new(
            provider,
            ProviderErrorKind::InvalidEndpoint(endpoint.to_string()),
        )
        .into());
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

/// POSTs `body` as JSON and decodes the JSON reply.
///
/// Non-2xx responses become [`ProviderErrorKind::HttpStatus`], undecodable
/// bodies become [`ProviderErrorKind::Decode`] with `expected` as a hint.
pub(crate) async fn post_json<B, R>(
    client: &reqwest::Client,
    provider: LlmProvider,
    url: &str,
    body: &B,
    expected: &'static str,
) -> Result<R>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let started = Instant::now();
    debug!(%provider, "POST {}", url);

    let resp = client.post(url).json(body).send().await?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        let snippet = make_snippet(&text);

        error!(
            %status,
            %url,
            %snippet,
            %provider,
            latency_ms = started.elapsed().as_millis(),
            "provider returned non-success status"
        );

        return Err(ProviderError::new(
            provider,
            ProviderErrorKind::HttpStatus(HttpError {
                status,
                url: url.to_string(),
                snippet,
            }),
        )
        .into());
    }

    match resp.json::<R>().await {
        Ok(v) => {
            debug!(
                %provider,
                %url,
                latency_ms = started.elapsed().as_millis(),
                "provider call completed"
            );
            Ok(v)
        }
        Err(e) => {
            error!(
                error = %e,
                %provider,
                %url,
                latency_ms = started.elapsed().as_millis(),
                "failed to decode provider response"
            );
            Err(ProviderError::new(
                provider,
                ProviderErrorKind::Decode(format!("serde error: {e}; expected {expected}")),
            )
            .into())
        }
    }
}
