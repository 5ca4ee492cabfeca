use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use serde_json::Value;
use tracing::debug;

use super::{CallbackHandler, CbEvent, CbEventType};

/// Records every event it sees and mirrors it to `tracing` at debug level.
///
/// Useful while wiring a pipeline: register it on the context's callback
/// manager, run the work, then inspect [`DebugEventHandler::event_pairs`].
#[derive(Debug, Default)]
pub struct DebugEventHandler {
    events: Mutex<Vec<CbEvent>>,
}

impl DebugEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded events in arrival order, optionally restricted to one type.
    pub fn events(&self, event_type: Option<CbEventType>) -> Vec<CbEvent> {
        self.lock()
            .iter()
            .filter(|e| event_type.is_none_or(|t| e.event_type == t))
            .cloned()
            .collect()
    }

    /// Groups recorded events by id, so each entry is a start/end pair.
    ///
    /// Pairs are ordered by the time of their first event. An event still in
    /// flight yields a single-element group.
    pub fn event_pairs(&self, event_type: Option<CbEventType>) -> Vec<Vec<CbEvent>> {
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<CbEvent>> = HashMap::new();
        for event in self.events(event_type) {
            if !groups.contains_key(&event.id) {
                order.push(event.id.clone());
            }
            groups.entry(event.id.clone()).or_default().push(event);
        }
        order
            .into_iter()
            .filter_map(|id| groups.remove(&id))
            .collect()
    }

    /// Drops all recorded events.
    pub fn flush_event_logs(&self) {
        self.lock().clear();
    }

    fn record(&self, event: CbEvent) {
        self.lock().push(event);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<CbEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CallbackHandler for DebugEventHandler {
    fn on_event_start(&self, event_type: CbEventType, payload: Option<&Value>, event_id: &str) {
        debug!(%event_type, %event_id, "event start");
        self.record(CbEvent::new(event_type, payload.cloned(), event_id));
    }

    fn on_event_end(&self, event_type: CbEventType, payload: Option<&Value>, event_id: &str) {
        debug!(%event_type, %event_id, "event end");
        self.record(CbEvent::new(event_type, payload.cloned(), event_id));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::callbacks::CallbackManager;

    #[test]
    fn pairs_group_start_and_end() {
        let handler = Arc::new(DebugEventHandler::new());
        let manager = CallbackManager::new(vec![handler.clone() as Arc<dyn CallbackHandler>]);

        let llm = manager.on_event_start(CbEventType::Llm, Some(json!({"prompt": "q"})));
        let emb = manager.on_event_start(CbEventType::Embedding, None);
        manager.on_event_end(CbEventType::Embedding, None, &emb);
        manager.on_event_end(CbEventType::Llm, Some(json!({"response": "a"})), &llm);

        let pairs = handler.event_pairs(None);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0][0].id, llm);
        assert_eq!(pairs[0].len(), 2);
        assert_eq!(pairs[0][1].payload, Some(json!({"response": "a"})));

        assert_eq!(handler.events(Some(CbEventType::Embedding)).len(), 2);

        handler.flush_event_logs();
        assert!(handler.events(None).is_empty());
    }
}
