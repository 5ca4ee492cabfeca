//! The service context: one bundle of collaborators for index and query code.
//!
//! A [`ServiceContext`] holds shared handles to
//! - a [`Predictor`] (LLM calls),
//! - a [`PromptHelper`] (prompt budgets),
//! - an [`Embedder`] (embedding model),
//! - a [`NodeParser`] (document chunking),
//! - a [`ServiceLogger`],
//! - a [`CallbackManager`] shared with the predictor, embedding model and
//!   default node parser,
//!
//! plus an optional chunk-size limit.
//!
//! Contexts are built from [`ServiceContextOptions`]: anything left unset is
//! filled in from defaults ([`ServiceContext::from_defaults`]) or from an
//! existing context ([`ServiceContext::from_service_context`]). When a global
//! default has been installed in a [`ServiceContextRegistry`], building "from
//! defaults" through that registry inherits from it instead.
//!
//! # Example
//!
//! ```rust
//! use service_context::service_context::{ServiceContext, ServiceContextOptions, ServiceContextRegistry};
//!
//! let registry = ServiceContextRegistry::new();
//! let base = registry
//!     .from_defaults(ServiceContextOptions::new().with_chunk_size_limit(Some(512)))
//!     .unwrap();
//! registry.set_global(Some(base.clone()));
//!
//! // Inherits everything from the installed default.
//! let derived = registry.from_defaults(ServiceContextOptions::new()).unwrap();
//! assert!(derived.shares_collaborators_with(&base));
//! ```

use std::{
    fmt,
    sync::{Arc, RwLock},
};

use tracing::{debug, info};

use crate::{
    callbacks::CallbackManager,
    embeddings::{Embedder, RemoteEmbedding},
    error_handler::{Result, ServiceContextError},
    llm_predictor::{LanguageModel, LlmPredictor, Predictor},
    logger::ServiceLogger,
    node_parser::{NodeParser, default_node_parser},
    prompt_helper::PromptHelper,
};

/// Collaborators shared by index and query code.
#[derive(Clone)]
pub struct ServiceContext {
    pub llm_predictor: Arc<dyn Predictor>,
    pub prompt_helper: Arc<PromptHelper>,
    pub embed_model: Arc<dyn Embedder>,
    pub node_parser: Arc<dyn NodeParser>,
    pub logger: Arc<ServiceLogger>,
    pub callback_manager: Arc<CallbackManager>,
    /// `None` means every collaborator uses its own default chunk size.
    pub chunk_size_limit: Option<usize>,
}

/// Optional overrides for building a [`ServiceContext`].
///
/// `llm` and `llm_predictor` are mutually exclusive.
#[derive(Clone, Default)]
pub struct ServiceContextOptions {
    pub llm_predictor: Option<Arc<dyn Predictor>>,
    /// Raw model handle; wrapped in an [`LlmPredictor`] when set.
    pub llm: Option<Arc<dyn LanguageModel>>,
    pub prompt_helper: Option<Arc<PromptHelper>>,
    pub embed_model: Option<Arc<dyn Embedder>>,
    pub node_parser: Option<Arc<dyn NodeParser>>,
    pub logger: Option<Arc<ServiceLogger>>,
    pub callback_manager: Option<Arc<CallbackManager>>,
    pub chunk_size_limit: Option<usize>,
}

impl ServiceContextOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_llm_predictor(mut self, llm_predictor: Arc<dyn Predictor>) -> Self {
        self.llm_predictor = Some(llm_predictor);
        self
    }

    pub fn with_llm(mut self, llm: Arc<dyn LanguageModel>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_prompt_helper(mut self, prompt_helper: Arc<PromptHelper>) -> Self {
        self.prompt_helper = Some(prompt_helper);
        self
    }

    pub fn with_embed_model(mut self, embed_model: Arc<dyn Embedder>) -> Self {
        self.embed_model = Some(embed_model);
        self
    }

    pub fn with_node_parser(mut self, node_parser: Arc<dyn NodeParser>) -> Self {
        self.node_parser = Some(node_parser);
        self
    }

    pub fn with_logger(mut self, logger: Arc<ServiceLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_callback_manager(mut self, callback_manager: Arc<CallbackManager>) -> Self {
        self.callback_manager = Some(callback_manager);
        self
    }

    /// `Some(0)` is treated as unset.
    pub fn with_chunk_size_limit(mut self, chunk_size_limit: Option<usize>) -> Self {
        self.chunk_size_limit = chunk_size_limit;
        self
    }

    fn chunk_size_limit(&self) -> Option<usize> {
        self.chunk_size_limit.filter(|n| *n > 0)
    }

    /// Applies the `llm` / `llm_predictor` exclusivity rule.
    ///
    /// Returns the explicit predictor, a predictor wrapping `llm`, or `None`.
    fn take_predictor(&mut self) -> Result<Option<Arc<dyn Predictor>>> {
        match (self.llm.take(), self.llm_predictor.take()) {
            (Some(_), Some(_)) => Err(ServiceContextError::llm_and_predictor()),
            (Some(llm), None) => Ok(Some(Arc::new(LlmPredictor::new(llm)))),
            (None, predictor) => Ok(predictor),
        }
    }
}

impl ServiceContext {
    /// Builds a context, filling unset fields with defaults.
    ///
    /// If a process-wide default was installed with
    /// [`set_global_service_context`], the context is derived from it instead
    /// (see [`ServiceContext::from_service_context`]).
    ///
    /// # Errors
    /// [`ServiceContextError::ConflictingArguments`] if both `llm` and
    /// `llm_predictor` are set.
    pub fn from_defaults(options: ServiceContextOptions) -> Result<Self> {
        GLOBAL_REGISTRY.from_defaults(options)
    }

    /// Builds a context from hard-coded defaults only, ignoring any global default.
    ///
    /// The resolved callback manager is installed in place on the predictor
    /// and the embedding model, including caller-supplied ones.
    pub fn from_hardcoded_defaults(mut options: ServiceContextOptions) -> Result<Self> {
        let chunk_size_limit = options.chunk_size_limit();
        let callback_manager = options.callback_manager.take().unwrap_or_default();

        let llm_predictor: Arc<dyn Predictor> = options
            .take_predictor()?
            .unwrap_or_else(|| Arc::new(LlmPredictor::default()));
        llm_predictor.set_callback_manager(Arc::clone(&callback_manager));

        let embed_model: Arc<dyn Embedder> = options
            .embed_model
            .take()
            .unwrap_or_else(|| Arc::new(RemoteEmbedding::default()));
        embed_model.set_callback_manager(Arc::clone(&callback_manager));

        let prompt_helper = options.prompt_helper.take().unwrap_or_else(|| {
            Arc::new(PromptHelper::from_llm_predictor(
                llm_predictor.as_ref(),
                chunk_size_limit,
            ))
        });

        let node_parser: Arc<dyn NodeParser> = options.node_parser.take().unwrap_or_else(|| {
            Arc::new(default_node_parser(
                chunk_size_limit,
                Some(Arc::clone(&callback_manager)),
            ))
        });

        let logger = options.logger.take().unwrap_or_default();

        debug!(?chunk_size_limit, "service context built from defaults");

        Ok(Self {
            llm_predictor,
            prompt_helper,
            embed_model,
            node_parser,
            logger,
            callback_manager,
            chunk_size_limit,
        })
    }

    /// Builds a context using `base` for every unset field.
    ///
    /// An explicit chunk-size limit always rebuilds the prompt helper and the
    /// node parser from the resolved predictor and callback manager, even if
    /// the options also carry instances of them. Without one, the base's
    /// limit is kept.
    ///
    /// # Errors
    /// [`ServiceContextError::ConflictingArguments`] if both `llm` and
    /// `llm_predictor` are set.
    pub fn from_service_context(base: &ServiceContext, mut options: ServiceContextOptions) -> Result<Self> {
        let explicit_limit = options.chunk_size_limit();
        let callback_manager = options
            .callback_manager
            .take()
            .unwrap_or_else(|| Arc::clone(&base.callback_manager));

        let llm_predictor = options
            .take_predictor()?
            .unwrap_or_else(|| Arc::clone(&base.llm_predictor));
        llm_predictor.set_callback_manager(Arc::clone(&callback_manager));

        let embed_model = options
            .embed_model
            .take()
            .unwrap_or_else(|| Arc::clone(&base.embed_model));
        embed_model.set_callback_manager(Arc::clone(&callback_manager));

        let (prompt_helper, node_parser) = match explicit_limit {
            Some(limit) => {
                let prompt_helper =
                    Arc::new(PromptHelper::from_llm_predictor(llm_predictor.as_ref(), Some(limit)));
                let node_parser: Arc<dyn NodeParser> = Arc::new(default_node_parser(
                    Some(limit),
                    Some(Arc::clone(&callback_manager)),
                ));
                (prompt_helper, node_parser)
            }
            None => (
                options
                    .prompt_helper
                    .take()
                    .unwrap_or_else(|| Arc::clone(&base.prompt_helper)),
                options
                    .node_parser
                    .take()
                    .unwrap_or_else(|| Arc::clone(&base.node_parser)),
            ),
        };

        let logger = options
            .logger
            .take()
            .unwrap_or_else(|| Arc::clone(&base.logger));

        let chunk_size_limit = explicit_limit.or(base.chunk_size_limit);
        debug!(
            ?chunk_size_limit,
            rebuilt_sizing = explicit_limit.is_some(),
            "service context derived from existing context"
        );

        Ok(Self {
            llm_predictor,
            prompt_helper,
            embed_model,
            node_parser,
            logger,
            callback_manager,
            chunk_size_limit,
        })
    }

    /// Whether both contexts point at the same collaborator instances and
    /// carry the same chunk-size limit.
    pub fn shares_collaborators_with(&self, other: &ServiceContext) -> bool {
        Arc::ptr_eq(&self.llm_predictor, &other.llm_predictor)
            && Arc::ptr_eq(&self.prompt_helper, &other.prompt_helper)
            && Arc::ptr_eq(&self.embed_model, &other.embed_model)
            && Arc::ptr_eq(&self.node_parser, &other.node_parser)
            && Arc::ptr_eq(&self.logger, &other.logger)
            && Arc::ptr_eq(&self.callback_manager, &other.callback_manager)
            && self.chunk_size_limit == other.chunk_size_limit
    }
}

impl fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContext")
            .field("llm", &self.llm_predictor.metadata().model_name)
            .field("embed_model", &self.embed_model.model_name())
            .field("prompt_helper", &self.prompt_helper)
            .field("callback_manager", &self.callback_manager)
            .field("chunk_size_limit", &self.chunk_size_limit)
            .finish_non_exhaustive()
    }
}

/// Holder of an optional default [`ServiceContext`].
///
/// The process-wide instance backs [`set_global_service_context`] and
/// [`ServiceContext::from_defaults`]; create a separate registry to keep the
/// default scoped to one component.
#[derive(Default)]
pub struct ServiceContextRegistry {
    global: RwLock<Option<ServiceContext>>,
}

impl ServiceContextRegistry {
    pub const fn new() -> Self {
        Self {
            global: RwLock::new(None),
        }
    }

    /// Replaces (or clears, with `None`) the default context. Last write wins.
    pub fn set_global(&self, service_context: Option<ServiceContext>) {
        info!(installed = service_context.is_some(), "global service context updated");
        *self.global.write().unwrap_or_else(|e| e.into_inner()) = service_context;
    }

    pub fn global(&self) -> Option<ServiceContext> {
        self.global.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Builds a context, deriving from the installed default if there is one
    /// and from hard-coded defaults otherwise.
    pub fn from_defaults(&self, options: ServiceContextOptions) -> Result<ServiceContext> {
        match self.global() {
            Some(base) => ServiceContext::from_service_context(&base, options),
            None => ServiceContext::from_hardcoded_defaults(options),
        }
    }
}

impl fmt::Debug for ServiceContextRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContextRegistry")
            .field("global", &self.global())
            .finish()
    }
}

static GLOBAL_REGISTRY: ServiceContextRegistry = ServiceContextRegistry::new();

/// Replaces the process-wide default service context (`None` clears it).
pub fn set_global_service_context(service_context: Option<ServiceContext>) {
    GLOBAL_REGISTRY.set_global(service_context);
}

/// The process-wide default service context, if one is installed.
pub fn global_service_context() -> Option<ServiceContext> {
    GLOBAL_REGISTRY.global()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_chunk_size_limit_is_unset() {
        let opts = ServiceContextOptions::new().with_chunk_size_limit(Some(0));
        assert_eq!(opts.chunk_size_limit(), None);
        let ctx = ServiceContext::from_hardcoded_defaults(opts).unwrap();
        assert_eq!(ctx.chunk_size_limit, None);
    }

    #[test]
    fn take_predictor_rejects_both() {
        let mut opts = ServiceContextOptions::new()
            .with_llm(Arc::new(crate::llm_predictor::RemoteLlm::default()))
            .with_llm_predictor(Arc::new(LlmPredictor::default()));
        assert!(matches!(
            opts.take_predictor(),
            Err(ServiceContextError::ConflictingArguments { .. })
        ));
    }

    #[test]
    fn registry_starts_empty_and_clears() {
        let registry = ServiceContextRegistry::new();
        assert!(registry.global().is_none());
        let ctx = registry.from_defaults(ServiceContextOptions::new()).unwrap();
        registry.set_global(Some(ctx));
        assert!(registry.global().is_some());
        registry.set_global(None);
        assert!(registry.global().is_none());
    }
}
