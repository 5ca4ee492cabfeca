//! Token-budgeted text splitter.
//!
//! Splits text on a separator (a space by default) and packs the resulting
//! words into chunks whose estimated token count stays within `chunk_size`.
//! Consecutive chunks share up to `chunk_overlap` tokens of trailing words.
//!
//! Token counts are estimated at 4 characters per token; every splitter and
//! the prompt helper use the same estimate, so budgets computed by one are
//! honored by the other.
//!
//! # Example
//!
//! ```rust
//! use service_context::text_splitter::TokenTextSplitter;
//!
//! let splitter = TokenTextSplitter::with_chunk_size(Some(4), None);
//! let chunks = splitter.split_text("one two three four five six seven");
//! assert!(chunks.len() > 1);
//! ```

use std::{collections::VecDeque, sync::Arc};

use serde_json::json;
use tracing::debug;

use crate::{
    callbacks::{CallbackManager, CbEventType},
    error_handler::{Result, ServiceContextError},
};

/// Approximate characters-per-token ratio.
pub const CHARS_PER_TOKEN: usize = 4;

pub const DEFAULT_CHUNK_SIZE: usize = 1024;
pub const DEFAULT_CHUNK_OVERLAP: usize = 20;

/// Estimated token count of `text` (4 chars ≈ 1 token, rounded up).
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// A chunk plus how many characters at its start repeat the previous chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSplit {
    pub text_chunk: String,
    pub num_char_overlap: usize,
}

/// Splits text into token-budgeted, overlapping chunks.
#[derive(Debug, Clone)]
pub struct TokenTextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separator: String,
    backup_separators: Vec<String>,
    callback_manager: Arc<CallbackManager>,
}

impl TokenTextSplitter {
    /// Creates a splitter with explicit sizes.
    ///
    /// # Errors
    /// [`ServiceContextError::InvalidSplitter`] if `chunk_size` is zero or the
    /// overlap is larger than the chunk size.
    pub fn new(
        chunk_size: usize,
        chunk_overlap: usize,
        callback_manager: Option<Arc<CallbackManager>>,
    ) -> Result<Self> {
        if chunk_size == 0 || chunk_overlap > chunk_size {
            return Err(ServiceContextError::InvalidSplitter {
                chunk_size,
                chunk_overlap,
            });
        }
        Ok(Self::build(chunk_size, chunk_overlap, callback_manager))
    }

    /// Creates a splitter with `chunk_size` (or [`DEFAULT_CHUNK_SIZE`]) and the
    /// default overlap, clamped so it never exceeds half the chunk.
    pub fn with_chunk_size(
        chunk_size: Option<usize>,
        callback_manager: Option<Arc<CallbackManager>>,
    ) -> Self {
        let chunk_size = chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE).max(1);
        let chunk_overlap = DEFAULT_CHUNK_OVERLAP.min(chunk_size / 2);
        Self::build(chunk_size, chunk_overlap, callback_manager)
    }

    fn build(
        chunk_size: usize,
        chunk_overlap: usize,
        callback_manager: Option<Arc<CallbackManager>>,
    ) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            separator: " ".to_string(),
            backup_separators: vec!["\n".to_string()],
            callback_manager: callback_manager.unwrap_or_default(),
        }
    }

    /// Replaces the primary separator (default `" "`).
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn callback_manager(&self) -> &Arc<CallbackManager> {
        &self.callback_manager
    }

    /// Splits `text` into chunks. Empty input yields no chunks.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_text_with_overlaps(text)
            .into_iter()
            .map(|s| s.text_chunk)
            .collect()
    }

    /// Splits `text`, reporting the overlap carried into each chunk.
    ///
    /// Emits a [`CbEventType::Chunking`] event around the work.
    pub fn split_text_with_overlaps(&self, text: &str) -> Vec<TextSplit> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let event_id = self
            .callback_manager
            .on_event_start(CbEventType::Chunking, Some(json!({ "chunks": [text] })));

        let splits = self.pack(&self.pieces(text));

        debug!(
            chunk_size = self.chunk_size,
            chunk_overlap = self.chunk_overlap,
            chunks = splits.len(),
            "split text"
        );

        let chunks: Vec<&str> = splits.iter().map(|s| s.text_chunk.as_str()).collect();
        self.callback_manager.on_event_end(
            CbEventType::Chunking,
            Some(json!({ "chunks": chunks })),
            &event_id,
        );
        splits
    }

    fn max_chars(&self) -> usize {
        self.chunk_size * CHARS_PER_TOKEN
    }

    /// Breaks the text into non-empty pieces that each fit in one chunk.
    fn pieces<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let max_chars = self.max_chars();
        let mut out = Vec::new();
        for word in text.split(self.separator.as_str()).filter(|w| !w.is_empty()) {
            if word.chars().count() <= max_chars {
                out.push(word);
                continue;
            }
            let mut parts = vec![word];
            for backup in &self.backup_separators {
                parts = parts
                    .into_iter()
                    .flat_map(|p| p.split(backup.as_str()))
                    .filter(|p| !p.is_empty())
                    .collect();
            }
            for part in parts {
                hard_split(part, max_chars, &mut out);
            }
        }
        out
    }

    /// Greedily packs pieces into chunks, carrying trailing words as overlap.
    fn pack(&self, pieces: &[&str]) -> Vec<TextSplit> {
        let max_chars = self.max_chars();
        let overlap_chars = self.chunk_overlap * CHARS_PER_TOKEN;
        let sep_len = self.separator.chars().count();

        let mut splits = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut current_len = 0usize;
        let mut carried = 0usize;

        for &piece in pieces {
            let piece_len = piece.chars().count();
            let grown = if current.is_empty() {
                piece_len
            } else {
                current_len + sep_len + piece_len
            };

            if grown > max_chars && !current.is_empty() {
                splits.push(TextSplit {
                    text_chunk: join(&current, &self.separator),
                    num_char_overlap: carried,
                });

                let (tail, tail_len) = overlap_tail(&current, overlap_chars, sep_len);
                current = tail;
                current_len = tail_len;

                // Drop carried words until the incoming piece fits.
                while !current.is_empty() && current_len + sep_len + piece_len > max_chars {
                    if let Some(w) = current.pop_front() {
                        let w_len = w.chars().count();
                        current_len = if current.is_empty() {
                            0
                        } else {
                            current_len - w_len - sep_len
                        };
                    }
                }
                carried = current_len;
            }

            current_len = if current.is_empty() {
                piece_len
            } else {
                current_len + sep_len + piece_len
            };
            current.push_back(piece);
        }

        if !current.is_empty() {
            splits.push(TextSplit {
                text_chunk: join(&current, &self.separator),
                num_char_overlap: carried,
            });
        }
        splits
    }
}

impl Default for TokenTextSplitter {
    fn default() -> Self {
        Self::with_chunk_size(None, None)
    }
}

/// Trailing words of `words` whose joined length stays within `limit` chars.
fn overlap_tail<'a>(words: &VecDeque<&'a str>, limit: usize, sep_len: usize) -> (VecDeque<&'a str>, usize) {
    let mut tail = VecDeque::new();
    let mut len = 0usize;
    for &w in words.iter().rev() {
        let add = w.chars().count() + if tail.is_empty() { 0 } else { sep_len };
        if len + add > limit {
            break;
        }
        tail.push_front(w);
        len += add;
    }
    (tail, len)
}

fn join(words: &VecDeque<&str>, separator: &str) -> String {
    words.iter().copied().collect::<Vec<_>>().join(separator)
}

/// Cuts `s` into pieces of at most `max_chars` characters on char boundaries.
fn hard_split<'a>(s: &'a str, max_chars: usize, out: &mut Vec<&'a str>) {
    let mut rest = s;
    while !rest.is_empty() {
        let cut = rest
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        out.push(&rest[..cut]);
        rest = &rest[cut..];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::{CallbackHandler, DebugEventHandler};

    #[test]
    fn estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn new_rejects_inconsistent_sizes() {
        assert!(TokenTextSplitter::new(0, 0, None).is_err());
        assert!(TokenTextSplitter::new(10, 11, None).is_err());
        assert!(TokenTextSplitter::new(10, 10, None).is_ok());
    }

    #[test]
    fn with_chunk_size_clamps_overlap() {
        let s = TokenTextSplitter::with_chunk_size(Some(10), None);
        assert_eq!(s.chunk_size(), 10);
        assert_eq!(s.chunk_overlap(), 5);
        let d = TokenTextSplitter::default();
        assert_eq!(d.chunk_size(), DEFAULT_CHUNK_SIZE);
        assert_eq!(d.chunk_overlap(), DEFAULT_CHUNK_OVERLAP);
    }

    #[test]
    fn short_text_is_one_chunk() {
        let s = TokenTextSplitter::default();
        assert_eq!(s.split_text("hello brave new world"), vec!["hello brave new world"]);
        assert!(s.split_text("   ").is_empty());
    }

    #[test]
    fn chunks_respect_budget_and_cover_all_words() {
        let text = (0..200).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let s = TokenTextSplitter::new(8, 2, None).unwrap();
        let splits = s.split_text_with_overlaps(&text);
        assert!(splits.len() > 1);
        for split in &splits {
            assert!(estimate_tokens(&split.text_chunk) <= 8, "{}", split.text_chunk);
        }
        assert_eq!(splits[0].num_char_overlap, 0);
        assert!(splits[1].num_char_overlap > 0);

        let last = splits.last().unwrap();
        assert!(last.text_chunk.ends_with("w199"));
        for i in 0..200 {
            let w = format!("w{i}");
            assert!(
                splits.iter().any(|s| s.text_chunk.split(' ').any(|x| x == w)),
                "missing {w}"
            );
        }
    }

    #[test]
    fn oversized_words_are_hard_split() {
        let s = TokenTextSplitter::new(2, 0, None).unwrap();
        let chunks = s.split_text("abcdefghijklmnopqrst");
        assert_eq!(chunks, vec!["abcdefgh", "ijklmnop", "qrst"]);
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let s = TokenTextSplitter::new(1, 0, None).unwrap();
        let chunks = s.split_text("┌──────┐ │ hi │");
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.chars().count() <= CHARS_PER_TOKEN);
        }
    }

    #[test]
    fn emits_chunking_events() {
        let handler = Arc::new(DebugEventHandler::new());
        let manager = Arc::new(CallbackManager::new(vec![
            handler.clone() as Arc<dyn CallbackHandler>
        ]));
        let s = TokenTextSplitter::with_chunk_size(Some(16), Some(manager));
        s.split_text("some words to split");
        let pairs = handler.event_pairs(Some(CbEventType::Chunking));
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].len(), 2);
    }
}
