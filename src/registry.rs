//! The process-wide table of active sessions.
//!
//! Keyed by session id (provisional until the call's stream identifier
//! arrives), insertion-ordered for deterministic listing, and
//! lock-protected: every mutation goes through a method here. Entries
//! are removed synchronously when a session reaches `Closed`.

use crate::ws::machine::SessionState;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Mutex;

/// Diagnostic snapshot of one session, as served by `/sessions`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

pub struct Registry {
    sessions: Mutex<IndexMap<String, SessionSummary>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(IndexMap::new()),
        }
    }

    /// Adds a newly-accepted session under its provisional id.
    pub fn insert(&self, summary: SessionSummary) {
        self.sessions
            .lock()
            .unwrap()
            .insert(summary.id.clone(), summary);
    }

    /// Re-keys a session once its stream identifier is known.
    pub fn rename(&self, old_id: &str, new_id: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(mut summary) = sessions.shift_remove(old_id) {
            summary.id = new_id.to_string();
            sessions.insert(new_id.to_string(), summary);
        }
    }

    /// Mirrors the owning session's latest state into the table.
    pub fn update(&self, id: &str, state: SessionState, last_activity_at: DateTime<Utc>) {
        if let Some(summary) = self.sessions.lock().unwrap().get_mut(id) {
            summary.state = state;
            summary.last_activity_at = last_activity_at;
        }
    }

    /// Drops a session that reached `Closed`. Idempotent.
    pub fn remove(&self, id: &str) {
        self.sessions.lock().unwrap().shift_remove(id);
    }

    /// Snapshot of every active session, in insertion order.
    pub fn list(&self) -> Vec<SessionSummary> {
        self.sessions.lock().unwrap().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
