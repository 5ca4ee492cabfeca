//! In-memory structured log kept alongside a service context.
//!
//! Index and query code append JSON-object entries (e.g. the formatted
//! prompt and the response of each step) so callers can inspect what
//! happened after the fact. Metadata set on the logger is merged into every
//! entry added while it is set. Entries are mirrored to `tracing` at debug
//! level.

use std::sync::{Mutex, MutexGuard};

use serde_json::{Map, Value};
use tracing::debug;

/// One log entry.
pub type LogEntry = Map<String, Value>;

#[derive(Debug, Default)]
struct LoggerState {
    logs: Vec<LogEntry>,
    metadata: Map<String, Value>,
}

/// Thread-safe list of structured log entries.
#[derive(Debug, Default)]
pub struct ServiceLogger {
    state: Mutex<LoggerState>,
}

impl ServiceLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `log` with the current metadata merged in. Keys already in
    /// `log` win over metadata keys.
    pub fn add_log(&self, log: LogEntry) {
        let mut state = self.lock();
        let mut entry = state.metadata.clone();
        entry.extend(log);
        let rendered = Value::Object(entry.clone());
        debug!(entry = %rendered, "service log entry");
        state.logs.push(entry);
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.lock().logs.clone()
    }

    /// Drops all entries; metadata is kept.
    pub fn reset(&self) {
        self.lock().logs.clear();
    }

    /// Merges `metadata` into the current metadata.
    pub fn set_metadata(&self, metadata: Map<String, Value>) {
        self.lock().metadata.extend(metadata);
    }

    pub fn unset_metadata<I, K>(&self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut state = self.lock();
        for key in keys {
            state.metadata.remove(key.as_ref());
        }
    }

    pub fn metadata(&self) -> Map<String, Value> {
        self.lock().metadata.clone()
    }

    fn lock(&self) -> MutexGuard<'_, LoggerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn metadata_is_merged_into_entries() {
        let logger = ServiceLogger::new();
        logger.set_metadata(obj(json!({"query": "q1", "step": 0})));
        logger.add_log(obj(json!({"step": 1, "response": "a"})));
        logger.unset_metadata(["query"]);
        logger.add_log(obj(json!({"response": "b"})));

        let logs = logger.logs();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0]["query"], "q1");
        assert_eq!(logs[0]["step"], 1);
        assert!(logs[1].get("query").is_none());
        assert_eq!(logs[1]["step"], 0);
    }

    #[test]
    fn reset_keeps_metadata() {
        let logger = ServiceLogger::new();
        logger.set_metadata(obj(json!({"k": "v"})));
        logger.add_log(Map::new());
        logger.reset();
        assert!(logger.logs().is_empty());
        assert_eq!(logger.metadata()["k"], "v");
    }

    #[test]
    fn entries_render_under_a_debug_subscriber() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::sink)
            .finish();
        let logger = ServiceLogger::new();
        tracing::subscriber::with_default(subscriber, || {
            logger.add_log(obj(json!({"response": "rendered"})));
        });
        assert_eq!(logger.logs()[0]["response"], "rendered");
    }
}
