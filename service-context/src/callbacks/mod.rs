//! Event callbacks shared by every collaborator of a service context.
//!
//! A [`CallbackManager`] broadcasts start/end events to its registered
//! [`CallbackHandler`]s. The service context hands one manager to the
//! predictor, the embedding model and the node parser so a single set of
//! handlers observes the whole pipeline.

mod debug_handler;

pub use debug_handler::DebugEventHandler;

use std::{
    fmt,
    sync::{Arc, RwLock},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;
use uuid::Uuid;

/// Kinds of events emitted by collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CbEventType {
    Chunking,
    NodeParsing,
    Embedding,
    Llm,
    Query,
    Retrieve,
    Synthesize,
    Tree,
}

impl fmt::Display for CbEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CbEventType::Chunking => "chunking",
            CbEventType::NodeParsing => "node_parsing",
            CbEventType::Embedding => "embedding",
            CbEventType::Llm => "llm",
            CbEventType::Query => "query",
            CbEventType::Retrieve => "retrieve",
            CbEventType::Synthesize => "synthesize",
            CbEventType::Tree => "tree",
        };
        f.write_str(s)
    }
}

/// A recorded start or end event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CbEvent {
    pub event_type: CbEventType,
    pub payload: Option<Value>,
    pub time: DateTime<Utc>,
    pub id: String,
}

impl CbEvent {
    pub fn new(event_type: CbEventType, payload: Option<Value>, id: impl Into<String>) -> Self {
        Self {
            event_type,
            payload,
            time: Utc::now(),
            id: id.into(),
        }
    }
}

/// Receiver of callback events.
///
/// Handlers may opt out of specific event types on either edge.
pub trait CallbackHandler: Send + Sync {
    /// Event types whose start edge this handler skips.
    fn event_starts_to_ignore(&self) -> &[CbEventType] {
        &[]
    }

    /// Event types whose end edge this handler skips.
    fn event_ends_to_ignore(&self) -> &[CbEventType] {
        &[]
    }

    fn on_event_start(&self, event_type: CbEventType, payload: Option<&Value>, event_id: &str);

    fn on_event_end(&self, event_type: CbEventType, payload: Option<&Value>, event_id: &str);
}

/// Broadcasts events to a mutable set of handlers.
///
/// Handlers can be added or removed through a shared reference, so every
/// collaborator holding the same `Arc<CallbackManager>` sees the change.
#[derive(Default)]
pub struct CallbackManager {
    handlers: RwLock<Vec<Arc<dyn CallbackHandler>>>,
}

impl CallbackManager {
    pub fn new(handlers: Vec<Arc<dyn CallbackHandler>>) -> Self {
        Self {
            handlers: RwLock::new(handlers),
        }
    }

    /// Notifies handlers that an event started and returns its id.
    pub fn on_event_start(&self, event_type: CbEventType, payload: Option<Value>) -> String {
        let event_id = Uuid::new_v4().to_string();
        trace!(%event_type, %event_id, "callback event start");
        for handler in self.snapshot() {
            if !handler.event_starts_to_ignore().contains(&event_type) {
                handler.on_event_start(event_type, payload.as_ref(), &event_id);
            }
        }
        event_id
    }

    /// Notifies handlers that the event `event_id` ended.
    pub fn on_event_end(&self, event_type: CbEventType, payload: Option<Value>, event_id: &str) {
        trace!(%event_type, %event_id, "callback event end");
        for handler in self.snapshot() {
            if !handler.event_ends_to_ignore().contains(&event_type) {
                handler.on_event_end(event_type, payload.as_ref(), event_id);
            }
        }
    }

    pub fn add_handler(&self, handler: Arc<dyn CallbackHandler>) {
        self.write_handlers().push(handler);
    }

    /// Removes `handler` by pointer identity. Returns whether it was registered.
    pub fn remove_handler(&self, handler: &Arc<dyn CallbackHandler>) -> bool {
        let mut handlers = self.write_handlers();
        let before = handlers.len();
        handlers.retain(|h| !Arc::ptr_eq(h, handler));
        handlers.len() != before
    }

    pub fn set_handlers(&self, handlers: Vec<Arc<dyn CallbackHandler>>) {
        *self.write_handlers() = handlers;
    }

    pub fn handler_count(&self) -> usize {
        self.read_handlers().len()
    }

    // Handlers run outside the lock so they may register further handlers.
    fn snapshot(&self) -> Vec<Arc<dyn CallbackHandler>> {
        self.read_handlers().clone()
    }

    fn read_handlers(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<dyn CallbackHandler>>> {
        self.handlers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_handlers(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Arc<dyn CallbackHandler>>> {
        self.handlers.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for CallbackManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackManager")
            .field("handlers", &self.handler_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(String, CbEventType, String)>>,
        ignore_start: Vec<CbEventType>,
    }

    impl CallbackHandler for Recorder {
        fn event_starts_to_ignore(&self) -> &[CbEventType] {
            &self.ignore_start
        }

        fn on_event_start(&self, event_type: CbEventType, _payload: Option<&Value>, id: &str) {
            self.seen
                .lock()
                .unwrap()
                .push(("start".into(), event_type, id.into()));
        }

        fn on_event_end(&self, event_type: CbEventType, _payload: Option<&Value>, id: &str) {
            self.seen
                .lock()
                .unwrap()
                .push(("end".into(), event_type, id.into()));
        }
    }

    #[test]
    fn start_and_end_share_event_id() {
        let rec = Arc::new(Recorder::default());
        let manager = CallbackManager::new(vec![rec.clone() as Arc<dyn CallbackHandler>]);

        let id = manager.on_event_start(CbEventType::Llm, Some(json!({"prompt": "hi"})));
        manager.on_event_end(CbEventType::Llm, None, &id);

        let seen = rec.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].2, id);
        assert_eq!(seen[1].0, "end");
        assert_eq!(seen[1].2, id);
    }

    #[test]
    fn ignored_start_edges_are_skipped() {
        let rec = Arc::new(Recorder {
            ignore_start: vec![CbEventType::Chunking],
            ..Default::default()
        });
        let manager = CallbackManager::new(vec![rec.clone() as Arc<dyn CallbackHandler>]);

        let id = manager.on_event_start(CbEventType::Chunking, None);
        manager.on_event_end(CbEventType::Chunking, None, &id);

        let seen = rec.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "end");
    }

    #[test]
    fn add_and_remove_handlers_by_identity() {
        let manager = CallbackManager::default();
        assert_eq!(manager.handler_count(), 0);

        let a: Arc<dyn CallbackHandler> = Arc::new(Recorder::default());
        let b: Arc<dyn CallbackHandler> = Arc::new(Recorder::default());
        manager.add_handler(a.clone());
        manager.add_handler(b.clone());
        assert_eq!(manager.handler_count(), 2);

        assert!(manager.remove_handler(&a));
        assert!(!manager.remove_handler(&a));
        assert_eq!(manager.handler_count(), 1);

        manager.set_handlers(Vec::new());
        assert_eq!(manager.handler_count(), 0);
    }
}
