//! Service context for retrieval/indexing pipelines.
//!
//! - [`service_context`]: the context bundle, construction from defaults or
//!   from an existing context, and the global default registry.
//! - Collaborators: [`llm_predictor`], [`embeddings`], [`prompt_helper`],
//!   [`node_parser`] / [`text_splitter`], [`logger`], [`callbacks`].
//! - Plumbing: [`services`] (Ollama/OpenAI HTTP clients), [`config`],
//!   [`error_handler`], [`telemetry`].

pub mod callbacks;
pub mod config;
pub mod embeddings;
pub mod error_handler;
pub mod llm_predictor;
pub mod logger;
pub mod node_parser;
pub mod prompt_helper;
pub mod schema;
pub mod service_context;
pub mod services;
pub mod telemetry;
pub mod text_splitter;

pub use error_handler::{Result, ServiceContextError};
pub use service_context::{
    ServiceContext, ServiceContextOptions, ServiceContextRegistry, global_service_context,
    set_global_service_context,
};
