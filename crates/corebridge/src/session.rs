//! Local bookkeeping of the sessions a client has opened.
//!
//! The core is the authority on which sessions exist; this book only
//! remembers what this client started and hasn't ended yet, so the
//! application can ask about it and the client can warn about sessions
//! left open when it shuts down.
//!
//! ```text
//! initiate_session() ──→ record() ──→ touch() per call ──→ end_session() ──→ forget()
//!                                                       └─→ close() ──→ drain() (warns)
//! ```

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// What the client remembers about one session it opened.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: String,
    /// When the core accepted the session.
    pub opened_at: Instant,
    /// Service calls made on the session so far.
    pub calls: u64,
}

impl SessionRecord {
    fn new(session_id: String) -> Self {
        Self {
            session_id,
            opened_at: Instant::now(),
            calls: 0,
        }
    }

    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }
}

/// Sessions opened by one client, keyed by session id.
///
/// Plain `HashMap`; the client wraps it in a mutex and never holds the
/// lock across an `.await`.
#[derive(Debug, Default)]
pub(crate) struct SessionBook {
    sessions: HashMap<String, SessionRecord>,
}

impl SessionBook {
    /// Records a session the core accepted. Re-initiating a known
    /// session keeps the original record.
    pub(crate) fn record(&mut self, session_id: &str) {
        if self.sessions.contains_key(session_id) {
            tracing::debug!(%session_id, "session initiated again");
            return;
        }
        self.sessions
            .insert(session_id.to_string(), SessionRecord::new(session_id.to_string()));
        tracing::info!(%session_id, "session initiated");
    }

    /// Counts a call on `session_id`. Returns `false` if the session
    /// isn't one this client opened.
    pub(crate) fn touch(&mut self, session_id: &str) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(record) => {
                record.calls += 1;
                true
            }
            None => false,
        }
    }

    pub(crate) fn forget(&mut self, session_id: &str) -> Option<SessionRecord> {
        let removed = self.sessions.remove(session_id);
        if let Some(record) = &removed {
            tracing::info!(%session_id, calls = record.calls, "session ended");
        }
        removed
    }

    pub(crate) fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub(crate) fn get(&self, session_id: &str) -> Option<SessionRecord> {
        self.sessions.get(session_id).cloned()
    }

    /// Session ids, sorted.
    pub(crate) fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Removes and returns every record, oldest first.
    pub(crate) fn drain(&mut self) -> Vec<SessionRecord> {
        let mut records: Vec<SessionRecord> = self.sessions.drain().map(|(_, r)| r).collect();
        records.sort_by_key(|r| r.opened_at);
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_then_forget_removes_session() {
        let mut book = SessionBook::default();
        book.record("s-1");
        assert!(book.contains("s-1"));

        let record = book.forget("s-1").unwrap();
        assert_eq!(record.session_id, "s-1");
        assert!(!book.contains("s-1"));
        assert!(book.forget("s-1").is_none());
    }

    #[test]
    fn test_touch_counts_calls_on_known_sessions_only() {
        let mut book = SessionBook::default();
        book.record("s-1");
        assert!(book.touch("s-1"));
        assert!(book.touch("s-1"));
        assert!(!book.touch("other"));
        assert_eq!(book.get("s-1").unwrap().calls, 2);
    }

    #[test]
    fn test_record_twice_keeps_call_count() {
        let mut book = SessionBook::default();
        book.record("s-1");
        book.touch("s-1");
        book.record("s-1");
        assert_eq!(book.get("s-1").unwrap().calls, 1);
    }

    #[test]
    fn test_ids_are_sorted_and_drain_empties() {
        let mut book = SessionBook::default();
        book.record("b");
        book.record("a");
        assert_eq!(book.ids(), ["a", "b"]);

        let drained = book.drain();
        assert_eq!(drained.len(), 2);
        assert!(book.ids().is_empty());
    }
}
