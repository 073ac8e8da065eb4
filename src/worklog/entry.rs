//! Worklog entries.

use std::fmt;

use chrono::{DateTime, Utc};

use super::{State, Triggers};
use crate::attrs::Attributes;
use crate::ident::Ident;

/// A single observation of a task attempt.
///
/// `(task_id, task_seq)` is the primary key: `task_seq` strictly increases
/// across successive entries for a task, and `state_seq` increments exactly
/// when the state differs from the previous entry's.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub task_id: Ident,
    pub task_seq: i64,
    pub state: State,
    pub state_seq: i64,
    pub utd: String,
    pub data: Vec<u8>,
    pub attrs: Attributes,
    /// Opaque JSON error body recorded on failure.
    pub error: Option<serde_json::Value>,
    pub triggers: Triggers,
    /// Advisory: this failure is safe to retry.
    pub retry: bool,
    pub created: DateTime<Utc>,
    pub expires: Option<DateTime<Utc>>,
}

impl Entry {
    pub fn new(task_id: Ident, utd: impl Into<String>, state: State, created: DateTime<Utc>) -> Self {
        Self {
            task_id,
            task_seq: 0,
            state,
            state_seq: 0,
            utd: utd.into(),
            data: Vec::new(),
            attrs: Attributes::new(),
            error: None,
            triggers: Triggers::new(),
            retry: false,
            created,
            expires: None,
        }
    }

    /// An entry is valid at `when` if it is resolved, or carries no
    /// expiration, or its expiration is still in the future.
    pub fn valid(&self, when: DateTime<Utc>) -> bool {
        if self.resolved() {
            true
        } else if let Some(expires) = self.expires {
            expires > when
        } else {
            true
        }
    }

    pub fn resolved(&self) -> bool {
        self.state.resolved()
    }

    /// The successor entry in `state` carrying `data`, inheriting attrs.
    pub fn next(&self, state: State, data: Vec<u8>) -> Entry {
        self.next_with_attrs(state, data, None)
    }

    /// The successor entry: `task_seq + 1`, `state_seq + 1` exactly when the
    /// state changes, retry inherited, triggers not inherited. `None` attrs
    /// inherit the current attrs; `Some` replaces them.
    pub fn next_with_attrs(&self, state: State, data: Vec<u8>, attrs: Option<Attributes>) -> Entry {
        let state_seq = if state != self.state {
            self.state_seq + 1
        } else {
            self.state_seq
        };
        Entry {
            task_id: self.task_id,
            task_seq: self.task_seq + 1,
            state,
            state_seq,
            utd: self.utd.clone(),
            data,
            attrs: attrs.unwrap_or_else(|| self.attrs.clone()),
            error: None,
            triggers: Triggers::new(),
            retry: self.retry,
            created: Utc::now(),
            expires: None,
        }
    }

    pub fn task_seq(mut self, n: i64) -> Self {
        self.task_seq = n;
        self
    }

    pub fn state_seq(mut self, n: i64) -> Self {
        self.state_seq = n;
        self
    }

    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    pub fn attrs(mut self, attrs: Attributes) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn triggers(mut self, triggers: Triggers) -> Self {
        self.triggers = triggers;
        self
    }

    pub fn retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }

    pub fn error(mut self, error: serde_json::Value) -> Self {
        self.error = Some(error);
        self
    }

    pub fn expires(mut self, at: DateTime<Utc>) -> Self {
        self.expires = Some(at);
        self
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.task_id, self.task_seq)
    }
}
