//! Unified error handling for `service-context`.
//!
//! This module exposes a single top-level error type [`ServiceContextError`] for
//! the whole library, and groups domain-specific errors in nested types (e.g.,
//! [`ConfigError`], [`ProviderError`]). Small helpers for reading/validating
//! environment variables are provided and return the unified [`Result<T>`] alias.
//!
//! All messages include the suffix `[Service Context]` to simplify attribution in logs.

use reqwest::StatusCode;
use thiserror::Error;

use crate::config::llm_provider::LlmProvider;

/* ------------------------------------------------------------------------- */
/* Public result alias                                                       */
/* ------------------------------------------------------------------------- */

/// Unified result alias for the entire crate.
pub type Result<T> = std::result::Result<T, ServiceContextError>;

/* ------------------------------------------------------------------------- */
/* Top-level error                                                           */
/* ------------------------------------------------------------------------- */

/// Top-level error for the `service-context` crate.
///
/// Context construction can only fail with [`ServiceContextError::ConflictingArguments`].
/// The remaining variants come from collaborators (providers, prompt sizing,
/// splitter setup, env configuration).
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ServiceContextError {
    /// Both a raw language model and a pre-built predictor were supplied.
    #[error("[Service Context] cannot specify both {first} and {second}")]
    ConflictingArguments {
        /// First argument name (e.g., `llm`).
        first: &'static str,
        /// Second argument name (e.g., `llm_predictor`).
        second: &'static str,
    },

    /// Configuration/validation errors (startup/readiness).
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Provider-level failures (bad config, HTTP status, decoding).
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Underlying HTTP transport error (e.g., `reqwest::Error`).
    #[error("[Service Context] transport error: {0}")]
    HttpTransport(#[from] reqwest::Error),

    /// The prompt alone leaves no room for context chunks.
    #[error(
        "[Service Context] prompt needs {prompt_tokens} tokens, only {available} available after reserving output"
    )]
    PromptTooLong {
        /// Estimated tokens used by the prompt template.
        prompt_tokens: usize,
        /// Tokens left once `num_output` is reserved.
        available: usize,
    },

    /// Text splitter parameters are inconsistent.
    #[error("[Service Context] invalid splitter: chunk_size={chunk_size}, chunk_overlap={chunk_overlap}")]
    InvalidSplitter {
        /// Requested chunk size in tokens.
        chunk_size: usize,
        /// Requested overlap in tokens.
        chunk_overlap: usize,
    },
}

impl ServiceContextError {
    /// Shorthand for the `llm` / `llm_predictor` exclusivity violation.
    pub(crate) fn llm_and_predictor() -> Self {
        Self::ConflictingArguments {
            first: "llm",
            second: "llm_predictor",
        }
    }
}

/* ------------------------------------------------------------------------- */
/* Config errors                                                             */
/* ------------------------------------------------------------------------- */

/// Error enum for environment/config-driven setup.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is missing or empty.
    #[error("[Service Context] missing required environment variable: {0}")]
    MissingVar(&'static str),

    /// A number failed to parse (like limits, windows, timeouts).
    #[error("[Service Context] invalid number in {var}: {reason}")]
    InvalidNumber {
        /// Variable name (e.g., `LLM_MAX_TOKENS`).
        var: &'static str,
        /// Human-readable reason (e.g., `expected u32`).
        reason: &'static str,
    },

    /// Unsupported provider in `LLM_KIND`.
    #[error("[Service Context] unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// Value had the wrong format (e.g., invalid URL).
    #[error("[Service Context] invalid format in {var}: {reason}")]
    InvalidFormat {
        /// Variable name (e.g., `LLM_ENDPOINT`).
        var: &'static str,
        /// Explanation (e.g., `must start with http:// or https://`).
        reason: &'static str,
    },
}

/* ------------------------------------------------------------------------- */
/* Provider errors                                                           */
/* ------------------------------------------------------------------------- */

/// Failure reported by one of the HTTP providers.
#[derive(Debug, Error)]
#[error("[Service Context] {provider:?} provider error: {kind}")]
pub struct ProviderError {
    /// Which backend produced the error.
    pub provider: LlmProvider,
    /// What went wrong.
    pub kind: ProviderErrorKind,
}

impl ProviderError {
    pub fn new(provider: LlmProvider, kind: ProviderErrorKind) -> Self {
        Self { provider, kind }
    }
}

/// Provider-agnostic failure categories.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ProviderErrorKind {
    /// The config names a different provider than the client expects.
    #[error("invalid provider for this client")]
    InvalidProvider,

    /// The provider requires an API key and none was configured.
    #[error("missing API key")]
    MissingApiKey,

    /// The endpoint is empty or does not start with http/https.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Upstream returned a non-successful HTTP status.
    #[error(transparent)]
    HttpStatus(HttpError),

    /// Response payload could not be decoded as expected.
    #[error("decode error: {0}")]
    Decode(String),

    /// Chat completion returned no usable choice.
    #[error("response contained no choices")]
    EmptyChoices,
}

/// Non-2xx HTTP response details.
#[derive(Debug, Error)]
#[error("HTTP {status} from {url}: {snippet}")]
pub struct HttpError {
    /// Numeric HTTP status code.
    pub status: StatusCode,
    /// Request URL.
    pub url: String,
    /// Short snippet of the response body (trimmed).
    pub snippet: String,
}

/// Trims a response body to a log-friendly snippet.
pub fn make_snippet(text: &str) -> String {
    text.chars().take(240).collect::<String>()
}

/* ------------------------------------------------------------------------- */
/* Env helpers (return unified `Result<T>`)                                  */
/* ------------------------------------------------------------------------- */

/// Parses an optional `u32` from a raw value (`Ok(None)` if unset/empty).
///
/// # Errors
/// Returns [`ServiceContextError::Config`] with [`ConfigError::InvalidNumber`]
/// if the value is set but not a valid `u32`.
pub fn parse_opt_u32(name: &'static str, raw: Option<String>) -> Result<Option<u32>> {
    match raw {
        Some(v) if !v.trim().is_empty() => v.trim().parse::<u32>().map(Some).map_err(|_| {
            ServiceContextError::from(ConfigError::InvalidNumber {
                var: name,
                reason: "expected u32",
            })
        }),
        _ => Ok(None),
    }
}

/// Parses an optional `usize` from a raw value (`Ok(None)` if unset/empty).
///
/// # Errors
/// Returns [`ServiceContextError::Config`] with [`ConfigError::InvalidNumber`]
/// if the value is set but not a valid `usize`.
pub fn parse_opt_usize(name: &'static str, raw: Option<String>) -> Result<Option<usize>> {
    match raw {
        Some(v) if !v.trim().is_empty() => v.trim().parse::<usize>().map(Some).map_err(|_| {
            ServiceContextError::from(ConfigError::InvalidNumber {
                var: name,
                reason: "expected non-negative integer",
            })
        }),
        _ => Ok(None),
    }
}

/* ------------------------------------------------------------------------- */
/* Validation helpers (return unified `Result<T>`)                           */
/* ------------------------------------------------------------------------- */

/// Validates that an HTTP endpoint starts with `http://` or `https://`.
///
/// # Errors
/// Returns [`ServiceContextError::Config`] with [`ConfigError::InvalidFormat`]
/// when the string does not start with a valid HTTP scheme.
pub fn validate_http_endpoint(var: &'static str, value: &str) -> Result<()> {
    if is_http_endpoint(value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidFormat {
            var,
            reason: "must start with http:// or https://",
        }
        .into())
    }
}

pub(crate) fn is_http_endpoint(value: &str) -> bool {
    let v = value.trim();
    v.starts_with("http://") || v.starts_with("https://")
}
