//! In-memory conversation history, keyed by session ID.
//!
//! Each session holds at most `limit` exchanges; appending past the limit
//! evicts the oldest. Sessions live for the lifetime of the process and are
//! only ever emptied, never removed.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Exchanges kept per session unless configured otherwise.
pub const DEFAULT_HISTORY_LIMIT: usize = 5;

/// One user message and the assistant reply it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub user: String,
    pub assistant: String,
}

impl Exchange {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
        }
    }
}

type History = Arc<Mutex<VecDeque<Exchange>>>;

/// Session store shared by all request handlers.
///
/// The outer map lock is only held to look up or insert a session; each
/// session's history has its own lock, so turns on different sessions never
/// contend and turns on the same session are serialized per operation.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, History>>,
    limit: usize,
}

impl SessionStore {
    /// Create a store keeping at most `limit` exchanges per session (minimum 1).
    pub fn new(limit: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            limit: limit.max(1),
        }
    }

    /// Maximum exchanges kept per session.
    pub fn limit(&self) -> usize {
        self.limit
    }

    fn find(&self, session_id: &str) -> Option<History> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
    }

    fn find_or_insert(&self, session_id: &str) -> History {
        if let Some(history) = self.find(session_id) {
            return history;
        }

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(session_id = %session_id, "Created session");
                Arc::new(Mutex::new(VecDeque::new()))
            })
            .clone()
    }

    /// Return a snapshot of the session's history, creating an empty session if absent.
    pub fn get_or_create(&self, session_id: &str) -> Vec<Exchange> {
        let history = self.find_or_insert(session_id);
        let history = history.lock().unwrap_or_else(PoisonError::into_inner);
        history.iter().cloned().collect()
    }

    /// Return a snapshot of the session's history without creating it.
    pub fn history(&self, session_id: &str) -> Option<Vec<Exchange>> {
        let history = self.find(session_id)?;
        let history = history.lock().unwrap_or_else(PoisonError::into_inner);
        Some(history.iter().cloned().collect())
    }

    /// Append an exchange, evicting the oldest ones beyond the limit.
    pub fn append(&self, session_id: &str, exchange: Exchange) {
        let history = self.find_or_insert(session_id);
        let mut history = history.lock().unwrap_or_else(PoisonError::into_inner);
        history.push_back(exchange);
        while history.len() > self.limit {
            history.pop_front();
        }
    }

    /// Empty a session's history. Unknown sessions are left untouched.
    pub fn clear(&self, session_id: &str) {
        if let Some(history) = self.find(session_id) {
            history
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }
    }

    /// Whether a session with this ID exists.
    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(session_id)
    }

    /// Number of sessions (including emptied ones).
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}
