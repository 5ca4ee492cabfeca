//! Language models and the predictor wrapping them.
//!
//! - [`LanguageModel`] is the raw model handle: metadata plus a single
//!   completion call.
//! - [`Predictor`] is what a service context holds. It adds callback events
//!   and token accounting around the model, and lets the context install a
//!   shared [`CallbackManager`].
//!
//! [`RemoteLlm`] is the HTTP-backed model (Ollama/OpenAI). It does no I/O at
//! construction; the client is built on the first call.

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
use tracing::{debug, instrument};

use crate::{
    callbacks::{CallbackManager, CbEventType},
    config::{default_config::config_openai_completion, llm_model_config::LlmModelConfig},
    error_handler::Result,
    services::ProviderClient,
    text_splitter::estimate_tokens,
};

/// Static facts about a model that prompt sizing depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmMetadata {
    pub model_name: String,
    /// Total tokens the model accepts (prompt + completion).
    pub context_window: usize,
    /// Tokens reserved for the completion.
    pub num_output: usize,
}

/// Raw language-model handle.
#[async_trait]
pub trait LanguageModel: Send + Sync + fmt::Debug {
    fn metadata(&self) -> LlmMetadata;

    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Language model served by Ollama or OpenAI.
#[derive(Debug)]
pub struct RemoteLlm {
    cfg: LlmModelConfig,
    client: OnceCell<ProviderClient>,
}

impl RemoteLlm {
    pub fn new(cfg: LlmModelConfig) -> Self {
        Self {
            cfg,
            client: OnceCell::new(),
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
}

impl Default for RemoteLlm {
    fn default() -> Self {
        Self::new(config_openai_completion())
    }
}

#[async_trait]
impl LanguageModel for RemoteLlm {
    fn metadata(&self) -> LlmMetadata {
        LlmMetadata {
            model_name: self.cfg.model.clone(),
            context_window: self.cfg.context_window_or_default(),
            num_output: self.cfg.num_output_or_default(),
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.client().await?.generate(prompt, None).await
    }
}

/// Predictor capability held by a service context.
#[async_trait]
pub trait Predictor: Send + Sync {
    fn metadata(&self) -> LlmMetadata;

    fn callback_manager(&self) -> Arc<CallbackManager>;

    /// Replaces the callback manager in place; every holder of this predictor sees it.
    fn set_callback_manager(&self, callback_manager: Arc<CallbackManager>);

    async fn predict(&self, prompt: &str) -> Result<String>;

    /// Estimated tokens (prompt + completion) across all calls.
    fn total_tokens_used(&self) -> usize;

    /// Estimated tokens of the most recent call.
    fn last_token_usage(&self) -> usize;
}

/// Default [`Predictor`]: wraps a [`LanguageModel`].
pub struct LlmPredictor {
    llm: Arc<dyn LanguageModel>,
    callback_manager: RwLock<Arc<CallbackManager>>,
    total_tokens_used: AtomicUsize,
    last_token_usage: AtomicUsize,
}

impl LlmPredictor {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            llm,
            callback_manager: RwLock::new(Arc::default()),
            total_tokens_used: AtomicUsize::new(0),
            last_token_usage: AtomicUsize::new(0),
        }
    }

    pub fn llm(&self) -> &Arc<dyn LanguageModel> {
        &self.llm
    }
}

impl Default for LlmPredictor {
    fn default() -> Self {
        Self::new(Arc::new(RemoteLlm::default()))
    }
}

impl fmt::Debug for LlmPredictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmPredictor")
            .field("llm", &self.llm)
            .field("total_tokens_used", &self.total_tokens_used())
            .finish()
    }
}

#[async_trait]
impl Predictor for LlmPredictor {
    fn metadata(&self) -> LlmMetadata {
        self.llm.metadata()
    }

    fn callback_manager(&self) -> Arc<CallbackManager> {
        let guard = self.callback_manager.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    fn set_callback_manager(&self, callback_manager: Arc<CallbackManager>) {
        *self.callback_manager.write().unwrap_or_else(|e| e.into_inner()) = callback_manager;
    }

    /// Emits [`CbEventType::Llm`] start/end events around the completion.
    /// The end event is sent even when the model call fails.
    #[instrument(skip_all, fields(model = %self.llm.metadata().model_name))]
    async fn predict(&self, prompt: &str) -> Result<String> {
        let callback_manager = self.callback_manager();
        let event_id =
            callback_manager.on_event_start(CbEventType::Llm, Some(json!({ "formatted_prompt": prompt })));

        let result = self.llm.complete(prompt).await;

        let end_payload = match &result {
            Ok(response) => {
                let prompt_tokens = estimate_tokens(prompt);
                let completion_tokens = estimate_tokens(response);
                let used = prompt_tokens + completion_tokens;
                self.last_token_usage.store(used, Ordering::Relaxed);
                self.total_tokens_used.fetch_add(used, Ordering::Relaxed);
                debug!(prompt_tokens, completion_tokens, "prediction completed");
                json!({
                    "response": response,
                    "formatted_prompt_tokens_count": prompt_tokens,
                    "prediction_tokens_count": completion_tokens,
                })
            }
            Err(e) => json!({ "error": e.to_string() }),
        };
        callback_manager.on_event_end(CbEventType::Llm, Some(end_payload), &event_id);

        result
    }

    fn total_tokens_used(&self) -> usize {
        self.total_tokens_used.load(Ordering::Relaxed)
    }

    fn last_token_usage(&self) -> usize {
        self.last_token_usage.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        callbacks::{CallbackHandler, DebugEventHandler},
        config::{
            default_config::DEFAULT_COMPLETION_MODEL, llm_model_config::DEFAULT_NUM_OUTPUTS,
            llm_provider::LlmProvider,
        },
        error_handler::{ProviderError, ProviderErrorKind, ServiceContextError},
    };

    #[derive(Debug)]
    struct FailingLlm;

    #[async_trait]
    impl LanguageModel for FailingLlm {
        fn metadata(&self) -> LlmMetadata {
            LlmMetadata {
                model_name: "failing".into(),
                context_window: 1024,
                num_output: 64,
            }
        }

        async fn complete(&self, _prompt: &str) -> Result<String> {
            Err(ProviderError::new(LlmProvider::OpenAI, ProviderErrorKind::EmptyChoices).into())
        }
    }

    #[test]
    fn default_predictor_uses_default_completion_model() {
        let p = LlmPredictor::default();
        let meta = p.metadata();
        assert_eq!(meta.model_name, DEFAULT_COMPLETION_MODEL);
        assert_eq!(meta.model_name, p.llm().metadata().model_name);
        assert_eq!(meta.num_output, DEFAULT_NUM_OUTPUTS);
        assert_eq!(meta.context_window, 4_096);
    }

    #[test]
    fn callback_manager_swap_is_visible_through_shared_handle() {
        let p = Arc::new(LlmPredictor::default());
        let other = Arc::clone(&p);
        let manager = Arc::new(CallbackManager::default());
        p.set_callback_manager(manager.clone());
        assert!(Arc::ptr_eq(&other.callback_manager(), &manager));
    }

    #[test]
    fn remote_llm_exposes_its_config() {
        let llm = RemoteLlm::default();
        assert_eq!(llm.config().model, DEFAULT_COMPLETION_MODEL);
        assert_eq!(llm.metadata().num_output, DEFAULT_NUM_OUTPUTS);
    }

    #[tokio::test]
    async fn failed_prediction_still_ends_the_llm_event() {
        let handler = Arc::new(DebugEventHandler::new());
        let manager = Arc::new(CallbackManager::new(vec![handler.clone() as Arc<dyn CallbackHandler>]));
        let p = LlmPredictor::new(Arc::new(FailingLlm));
        p.set_callback_manager(manager);

        let err = p.predict("question").await.unwrap_err();
        assert!(matches!(err, ServiceContextError::Provider(_)));

        let pairs = handler.event_pairs(Some(CbEventType::Llm));
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].len(), 2);
        let end = pairs[0][1].payload.as_ref().unwrap();
        assert!(end.get("error").is_some());
        assert_eq!(p.total_tokens_used(), 0);
        assert_eq!(p.last_token_usage(), 0);
    }
}
