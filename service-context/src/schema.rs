//! Documents fed to a node parser and the nodes it produces.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub text: String,
    /// Free-form metadata copied onto derived nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_info: Option<Map<String, Value>>,
}

impl Document {
    /// Creates a document with a random id.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            doc_id: Uuid::new_v4().to_string(),
            text: text.into(),
            extra_info: None,
        }
    }

    pub fn with_doc_id(mut self, doc_id: impl Into<String>) -> Self {
        self.doc_id = doc_id.into();
        self
    }

    pub fn with_extra_info(mut self, extra_info: Map<String, Value>) -> Self {
        self.extra_info = Some(extra_info);
        self
    }

    /// Lowercase hex SHA-256 of the text, used to detect changed documents.
    pub fn doc_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.text.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// A chunk of a document, the unit that gets embedded and indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub node_id: String,
    pub text: String,
    /// Id of the document this node came from.
    pub ref_doc_id: String,
    /// Position of the node among its document's nodes.
    pub index: usize,
    /// Byte offset of the chunk in the source text, when it could be located.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_char_idx: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_char_idx: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_info: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_hash_tracks_text_only() {
        let a = Document::new("same text").with_doc_id("a");
        let b = Document::new("same text").with_doc_id("b");
        assert_eq!(a.doc_hash(), b.doc_hash());
        assert_eq!(a.doc_hash().len(), 64);
        assert_ne!(a.doc_hash(), Document::new("other").doc_hash());
    }

    #[test]
    fn new_documents_get_distinct_ids() {
        assert_ne!(Document::new("x").doc_id, Document::new("x").doc_id);
    }
}
