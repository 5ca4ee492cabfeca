//! Turning documents into nodes.

use std::sync::Arc;

use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::{
    callbacks::{CallbackManager, CbEventType},
    schema::{Document, Node},
    text_splitter::TokenTextSplitter,
};

/// Splits documents into nodes.
pub trait NodeParser: Send + Sync {
    fn get_nodes_from_documents(&self, documents: &[Document]) -> Vec<Node>;

    fn callback_manager(&self) -> Arc<CallbackManager>;
}

/// Node parser backed by a [`TokenTextSplitter`].
#[derive(Debug, Clone)]
pub struct SimpleNodeParser {
    text_splitter: TokenTextSplitter,
    include_extra_info: bool,
    callback_manager: Arc<CallbackManager>,
}

impl SimpleNodeParser {
    pub fn new(
        text_splitter: TokenTextSplitter,
        include_extra_info: bool,
        callback_manager: Option<Arc<CallbackManager>>,
    ) -> Self {
        Self {
            text_splitter,
            include_extra_info,
            callback_manager: callback_manager.unwrap_or_default(),
        }
    }

    pub fn text_splitter(&self) -> &TokenTextSplitter {
        &self.text_splitter
    }

    fn nodes_from_document(&self, document: &Document) -> Vec<Node> {
        let mut cursor = 0usize;
        self.text_splitter
            .split_text(&document.text)
            .into_iter()
            .enumerate()
            .map(|(index, chunk)| {
                let start = document.text.get(cursor..).and_then(|rest| rest.find(&chunk));
                let (start_char_idx, end_char_idx) = match start {
                    Some(offset) => {
                        let s = cursor + offset;
                        // Overlapping chunks start after the previous start, never before.
                        cursor = s + document.text[s..].chars().next().map_or(1, char::len_utf8);
                        (Some(s), Some(s + chunk.len()))
                    }
                    None => (None, None),
                };
                Node {
                    node_id: Uuid::new_v4().to_string(),
                    text: chunk,
                    ref_doc_id: document.doc_id.clone(),
                    index,
                    start_char_idx,
                    end_char_idx,
                    extra_info: if self.include_extra_info {
                        document.extra_info.clone()
                    } else {
                        None
                    },
                    embedding: None,
                }
            })
            .collect()
    }
}

impl NodeParser for SimpleNodeParser {
    /// Emits a [`CbEventType::NodeParsing`] event around the whole batch.
    fn get_nodes_from_documents(&self, documents: &[Document]) -> Vec<Node> {
        let event_id = self.callback_manager.on_event_start(
            CbEventType::NodeParsing,
            Some(json!({ "documents": documents.iter().map(|d| &d.doc_id).collect::<Vec<_>>() })),
        );

        let nodes: Vec<Node> = documents
            .iter()
            .flat_map(|d| self.nodes_from_document(d))
            .collect();

        debug!(documents = documents.len(), nodes = nodes.len(), "parsed nodes");

        self.callback_manager.on_event_end(
            CbEventType::NodeParsing,
            Some(json!({ "nodes": nodes.len() })),
            &event_id,
        );
        nodes
    }

    fn callback_manager(&self) -> Arc<CallbackManager> {
        Arc::clone(&self.callback_manager)
    }
}

/// Default node parser: a [`SimpleNodeParser`] over a [`TokenTextSplitter`]
/// sized by `chunk_size_limit` (splitter default when `None`), sharing
/// `callback_manager` with its splitter.
pub fn default_node_parser(
    chunk_size_limit: Option<usize>,
    callback_manager: Option<Arc<CallbackManager>>,
) -> SimpleNodeParser {
    let callback_manager = callback_manager.unwrap_or_default();
    let splitter =
        TokenTextSplitter::with_chunk_size(chunk_size_limit, Some(Arc::clone(&callback_manager)));
    SimpleNodeParser::new(splitter, true, Some(callback_manager))
}
