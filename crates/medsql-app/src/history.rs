// Recently asked questions.

use std::sync::Arc;

use medsql_core::store::StateStore;
use tracing::warn;

/// Maximum number of questions kept in memory.
pub const HISTORY_CAPACITY: usize = 20;

/// Questions in the order they were first asked, oldest first.
///
/// When backed by a [`StateStore`], the list is hydrated from it on creation
/// and answered questions are written through to it. Store failures are
/// logged and otherwise ignored.
#[derive(Default)]
pub struct QueryHistory {
    entries: Vec<String>,
    store: Option<Arc<StateStore>>,
}

impl QueryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(store: Arc<StateStore>) -> Self {
        let mut entries = match store.recent_questions(HISTORY_CAPACITY) {
            Ok(questions) => questions,
            Err(e) => {
                warn!("Failed to load query history: {e:#}");
                Vec::new()
            }
        };
        // The store returns newest first.
        entries.reverse();
        QueryHistory {
            entries,
            store: Some(store),
        }
    }

    /// Add `question` unless it is already present. Returns true when added.
    pub fn record(&mut self, question: &str) -> bool {
        if self.entries.iter().any(|q| q == question) {
            return false;
        }
        self.entries.push(question.to_string());
        if self.entries.len() > HISTORY_CAPACITY {
            self.entries.remove(0);
        }
        true
    }

    /// Write an answered question to the backing store, if any.
    pub fn persist(&self, question: &str, elapsed_ms: u64, sql: Option<&str>) {
        if let Some(store) = &self.store {
            if let Err(e) = store.record_query(question, Some(elapsed_ms), sql) {
                warn!("Failed to persist query history: {e:#}");
            }
        }
    }

    /// Up to `n` questions, newest first.
    pub fn recent(&self, n: usize) -> Vec<String> {
        self.entries.iter().rev().take(n).cloned().collect()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        if let Some(store) = &self.store {
            if let Err(e) = store.clear_history() {
                warn!("Failed to clear stored history: {e:#}");
            }
        }
    }
}
