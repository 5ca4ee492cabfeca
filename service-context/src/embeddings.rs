//! Embedding models.
//!
//! [`Embedder`] is the capability a service context holds; [`RemoteEmbedding`]
//! is the HTTP-backed implementation used by default. Every embedding call is
//! bracketed by [`CbEventType::Embedding`] events on the installed
//! [`CallbackManager`].

use std::{
    fmt,
    sync::{
        Arc, RwLock,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::instrument;

use crate::{
    callbacks::{CallbackManager, CbEventType},
    config::{default_config::config_openai_embedding, llm_model_config::LlmModelConfig},
    error_handler::Result,
    services::ProviderClient,
    text_splitter::estimate_tokens,
};

/// How two embeddings are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMode {
    #[default]
    Cosine,
    DotProduct,
    /// Negated Euclidean distance, so larger still means closer.
    Euclidean,
}

/// Similarity of two embeddings.
///
/// Returns `0.0` for empty or mismatched vectors, and for cosine similarity
/// when either vector has zero norm.
pub fn similarity(a: &[f32], b: &[f32], mode: SimilarityMode) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    match mode {
        SimilarityMode::DotProduct => a.iter().zip(b).map(|(x, y)| x * y).sum(),
        SimilarityMode::Euclidean => {
            -a.iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt()
        }
        SimilarityMode::Cosine => {
            let mut dot = 0.0f32;
            let mut norm_a = 0.0f32;
            let mut norm_b = 0.0f32;
            for (x, y) in a.iter().zip(b) {
                dot += x * y;
                norm_a += x * x;
                norm_b += y * y;
            }
            let denom = norm_a.sqrt() * norm_b.sqrt();
            if denom < f32::EPSILON { 0.0 } else { dot / denom }
        }
    }
}

/// Embedding-model capability held by a service context.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    fn callback_manager(&self) -> Arc<CallbackManager>;

    /// Replaces the callback manager in place; every holder of this model sees it.
    fn set_callback_manager(&self, callback_manager: Arc<CallbackManager>);

    async fn get_text_embedding(&self, text: &str) -> Result<Vec<f32>>;

    async fn get_query_embedding(&self, query: &str) -> Result<Vec<f32>>;

    /// Embeds `texts` one after another.
    async fn get_text_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.get_text_embedding(text).await?);
        }
        Ok(out)
    }

    /// Estimated tokens embedded so far.
    fn total_tokens_used(&self) -> usize;
}

/// Embedding model served by Ollama or OpenAI.
pub struct RemoteEmbedding {
    cfg: LlmModelConfig,
    client: OnceCell<ProviderClient>,
    callback_manager: RwLock<Arc<CallbackManager>>,
    total_tokens_used: AtomicUsize,
}

impl RemoteEmbedding {
    pub fn new(cfg: LlmModelConfig) -> Self {
        Self {
            cfg,
            client: OnceCell::new(),
            callback_manager: RwLock::new(Arc::default()),
            total_tokens_used: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &LlmModelConfig {
        &self.cfg
    }

    async fn client(&self) -> Result<&ProviderClient> {
        self.client
            .get_or_try_init(|| async { ProviderClient::from_config(self.cfg.clone()) })
            .await
    }

    async fn embed(&self, input: &str) -> Result<Vec<f32>> {
        let callback_manager = self.callback_manager();
        let event_id = callback_manager.on_event_start(CbEventType::Embedding, None);

        let result = match self.client().await {
            Ok(cli) => cli.embeddings(input).await,
            Err(e) => Err(e),
        };

        let payload = match &result {
            Ok(vector) => {
                self.total_tokens_used
                    .fetch_add(estimate_tokens(input), Ordering::Relaxed);
                json!({ "chunks": [input], "dims": vector.len() })
            }
            Err(e) => json!({ "error": e.to_string() }),
        };
        callback_manager.on_event_end(CbEventType::Embedding, Some(payload), &event_id);
        result
    }
}

impl Default for RemoteEmbedding {
    fn default() -> Self {
        Self::new(config_openai_embedding())
    }
}

impl fmt::Debug for RemoteEmbedding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteEmbedding")
            .field("provider", &self.cfg.provider)
            .field("model", &self.cfg.model)
            .finish()
    }
}

#[async_trait]
impl Embedder for RemoteEmbedding {
    fn model_name(&self) -> &str {
        &self.cfg.model
    }

    fn callback_manager(&self) -> Arc<CallbackManager> {
        let guard = self.callback_manager.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    fn set_callback_manager(&self, callback_manager: Arc<CallbackManager>) {
        *self.callback_manager.write().unwrap_or_else(|e| e.into_inner()) = callback_manager;
    }

    #[instrument(skip_all, fields(model = %self.cfg.model))]
    async fn get_text_embedding(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text).await
    }

    #[instrument(skip_all, fields(model = %self.cfg.model))]
    async fn get_query_embedding(&self, query: &str) -> Result<Vec<f32>> {
        self.embed(query).await
    }

    fn total_tokens_used(&self) -> usize {
        self.total_tokens_used.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        callbacks::{CallbackHandler, DebugEventHandler},
        config::{default_config::DEFAULT_EMBEDDING_MODEL, llm_provider::LlmProvider},
    };

    fn unreachable_ollama() -> LlmModelConfig {
        LlmModelConfig {
            provider: LlmProvider::Ollama,
            model: "nomic-embed-text".into(),
            endpoint: "http://127.0.0.1:9".into(),
            api_key: None,
            max_tokens: None,
            context_window: None,
            temperature: None,
            top_p: None,
            timeout_secs: Some(2),
        }
    }

    #[test]
    fn cosine_bounds() {
        let v = [1.0, 2.0, 3.0];
        assert!((similarity(&v, &v, SimilarityMode::Cosine) - 1.0).abs() < 1e-6);
        assert!(similarity(&[1.0, 0.0], &[0.0, 1.0], SimilarityMode::Cosine).abs() < 1e-6);
        assert!((similarity(&[1.0, 0.0], &[-1.0, 0.0], SimilarityMode::Cosine) + 1.0).abs() < 1e-6);
        assert_eq!(similarity(&[], &[], SimilarityMode::Cosine), 0.0);
        assert_eq!(similarity(&[1.0], &[1.0, 2.0], SimilarityMode::DotProduct), 0.0);
    }

    #[test]
    fn dot_and_euclidean() {
        assert_eq!(similarity(&[1.0, 2.0], &[3.0, 4.0], SimilarityMode::DotProduct), 11.0);
        assert_eq!(similarity(&[0.0, 0.0], &[3.0, 4.0], SimilarityMode::Euclidean), -5.0);
    }

    #[test]
    fn default_model_and_manager_swap() {
        let e = RemoteEmbedding::default();
        assert_eq!(e.model_name(), DEFAULT_EMBEDDING_MODEL);
        let manager = Arc::new(CallbackManager::default());
        e.set_callback_manager(manager.clone());
        assert!(Arc::ptr_eq(&e.callback_manager(), &manager));
        assert_eq!(e.total_tokens_used(), 0);
    }

    #[tokio::test]
    async fn failed_embedding_is_still_bracketed_by_events() {
        let handler = Arc::new(DebugEventHandler::new());
        let manager = Arc::new(CallbackManager::new(vec![handler.clone() as Arc<dyn CallbackHandler>]));
        let e = RemoteEmbedding::new(unreachable_ollama());
        assert_eq!(e.config().endpoint, "http://127.0.0.1:9");
        e.set_callback_manager(manager);

        assert!(e.get_text_embedding("some text").await.is_err());

        let pairs = handler.event_pairs(Some(CbEventType::Embedding));
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].len(), 2);
        let end = pairs[0][1].payload.as_ref().unwrap();
        assert!(end.get("error").is_some());
        assert_eq!(e.total_tokens_used(), 0);
    }
}
