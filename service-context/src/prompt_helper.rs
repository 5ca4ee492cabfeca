//! Prompt sizing.
//!
//! [`PromptHelper`] works out how many tokens of context fit next to a
//! prompt template, given the model's context window and the tokens
//! reserved for its answer, and produces splitters sized to that budget.
//!
//! # Example
//!
//! ```rust
//! use service_context::prompt_helper::PromptHelper;
//!
//! let helper = PromptHelper::new(4096, 256, 200, None);
//! // 4096 - 256 - 1 (prompt) = 3839, split over 2 chunks, minus padding 1
//! assert_eq!(helper.get_chunk_size_given_prompt("abc", 2, 1).unwrap(), 1918);
//! ```

use tracing::debug;

use crate::{
    error_handler::{Result, ServiceContextError},
    llm_predictor::Predictor,
    text_splitter::{TokenTextSplitter, estimate_tokens},
};

/// Upper bound for the overlap between context chunks.
pub const MAX_CHUNK_OVERLAP: usize = 200;

/// Computes context budgets for prompts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptHelper {
    /// Model context window in tokens.
    pub max_input_size: usize,
    /// Tokens reserved for the completion.
    pub num_output: usize,
    pub max_chunk_overlap: usize,
    /// Hard cap on chunk size, regardless of available budget.
    pub chunk_size_limit: Option<usize>,
    /// Separator used when joining chunks for compaction.
    pub separator: String,
}

impl PromptHelper {
    pub fn new(
        max_input_size: usize,
        num_output: usize,
        max_chunk_overlap: usize,
        chunk_size_limit: Option<usize>,
    ) -> Self {
        Self {
            max_input_size,
            num_output,
            max_chunk_overlap,
            chunk_size_limit,
            separator: " ".to_string(),
        }
    }

    /// Derives the budget from the predictor's model metadata.
    ///
    /// The overlap is [`MAX_CHUNK_OVERLAP`] or a tenth of the context window,
    /// whichever is smaller.
    pub fn from_llm_predictor(predictor: &dyn Predictor, chunk_size_limit: Option<usize>) -> Self {
        let meta = predictor.metadata();
        let max_chunk_overlap = MAX_CHUNK_OVERLAP.min(meta.context_window / 10);
        debug!(
            model = %meta.model_name,
            context_window = meta.context_window,
            num_output = meta.num_output,
            ?chunk_size_limit,
            "prompt helper from predictor"
        );
        Self::new(
            meta.context_window,
            meta.num_output,
            max_chunk_overlap,
            chunk_size_limit,
        )
    }

    /// Tokens available to each of `num_chunks` chunks next to `prompt_text`.
    ///
    /// `(max_input_size - num_output - prompt_tokens) / num_chunks - padding`,
    /// capped by `chunk_size_limit`.
    ///
    /// # Errors
    /// [`ServiceContextError::PromptTooLong`] when nothing is left for context.
    pub fn get_chunk_size_given_prompt(
        &self,
        prompt_text: &str,
        num_chunks: usize,
        padding: usize,
    ) -> Result<usize> {
        let prompt_tokens = estimate_tokens(prompt_text);
        let available = self.max_input_size.saturating_sub(self.num_output);
        let remaining = available.saturating_sub(prompt_tokens);

        let per_chunk = (remaining / num_chunks.max(1)).saturating_sub(padding);
        if per_chunk == 0 {
            return Err(ServiceContextError::PromptTooLong {
                prompt_tokens,
                available,
            });
        }

        Ok(match self.chunk_size_limit {
            Some(limit) => per_chunk.min(limit),
            None => per_chunk,
        })
    }

    /// Splitter whose chunks fit the budget of [`Self::get_chunk_size_given_prompt`].
    pub fn get_text_splitter_given_prompt(
        &self,
        prompt_text: &str,
        num_chunks: usize,
        padding: usize,
    ) -> Result<TokenTextSplitter> {
        let chunk_size = self.get_chunk_size_given_prompt(prompt_text, num_chunks, padding)?;
        // Overlap can never consume the whole chunk.
        let chunk_overlap = self.max_chunk_overlap.min(chunk_size / 2);
        Ok(TokenTextSplitter::new(chunk_size, chunk_overlap, None)?.with_separator(self.separator.clone()))
    }

    /// Merges `text_chunks` and re-splits them to fill as few prompt-sized
    /// chunks as possible.
    pub fn compact_text_chunks(&self, prompt_text: &str, text_chunks: &[String]) -> Result<Vec<String>> {
        let combined = text_chunks
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        let splitter = self.get_text_splitter_given_prompt(prompt_text, 1, 1)?;
        Ok(splitter.split_text(&combined))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_size_is_capped_by_limit() {
        let helper = PromptHelper::new(4096, 256, 200, Some(512));
        assert_eq!(helper.get_chunk_size_given_prompt("", 1, 1).unwrap(), 512);
        let uncapped = PromptHelper::new(4096, 256, 200, None);
        assert_eq!(uncapped.get_chunk_size_given_prompt("", 1, 1).unwrap(), 3839);
    }

    #[test]
    fn oversized_prompt_is_an_error() {
        let helper = PromptHelper::new(100, 60, 10, None);
        let prompt = "x".repeat(400);
        let err = helper.get_chunk_size_given_prompt(&prompt, 1, 1).unwrap_err();
        assert!(matches!(
            err,
            ServiceContextError::PromptTooLong {
                prompt_tokens: 100,
                available: 40
            }
        ));
    }

    #[test]
    fn splitter_overlap_never_exceeds_half_chunk() {
        let helper = PromptHelper::new(64, 16, 200, None);
        let splitter = helper.get_text_splitter_given_prompt("", 1, 0).unwrap();
        assert_eq!(splitter.chunk_size(), 48);
        assert_eq!(splitter.chunk_overlap(), 24);
    }

    #[test]
    fn compaction_reduces_chunk_count() {
        let helper = PromptHelper::new(4096, 256, 200, None);
        let chunks: Vec<String> = (0..10).map(|i| format!("fact number {i}")).collect();
        let compacted = helper.compact_text_chunks("question: ?", &chunks).unwrap();
        assert_eq!(compacted.len(), 1);
        assert!(compacted[0].contains("fact number 0"));
        assert!(compacted[0].contains("fact number 9"));
    }
}
