//! The worklog: a durable record of task attempts.
//!
//! Every attempt at a managed task is observed as an [`Entry`]; the latest
//! entry for a task decides whether it may run again. Storage backends
//! implement [`Worklog`]; the crate ships an in-memory backend for tests
//! and a SQLite backend for durable single-node deployments.

mod entry;
mod memory;
mod sqlite;
mod state;
mod trigger;

pub use entry::Entry;
pub use memory::MemoryWorklog;
pub use sqlite::SqliteWorklog;
pub use state::State;
pub use trigger::Triggers;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::ident::Ident;

/// Filter for [`Worklog::iter_latest_entry_for_every_task`].
///
/// `expired` and `resolved` are logically mutually exclusive, as are
/// `states` and either of them; callers set at most one family.
#[derive(Debug, Clone, Default)]
pub struct Criteria {
    /// Only unresolved entries whose lease has lapsed.
    pub expired: bool,
    /// Only entries in a terminal state.
    pub resolved: bool,
    /// Excludes entries that have been updated after this time.
    pub idle_since: Option<DateTime<Utc>>,
    /// Excludes entries that have not been updated since this time.
    pub active_since: Option<DateTime<Utc>>,
    /// Only entries in these states.
    pub states: Vec<State>,
}

impl Criteria {
    fn admits(&self, entry: &Entry, now: DateTime<Utc>) -> bool {
        if !self.states.is_empty() {
            if !self.states.contains(&entry.state) {
                return false;
            }
        } else {
            if self.expired && (entry.resolved() || entry.valid(now)) {
                return false;
            }
            if self.resolved && !entry.resolved() {
                return false;
            }
        }
        if let Some(idle) = self.idle_since {
            if entry.created > idle {
                return false;
            }
        }
        if let Some(active) = self.active_since {
            if entry.created < active {
                return false;
            }
        }
        true
    }
}

/// Iterator over worklog entries produced by a scan.
pub type EntryIter = Box<dyn Iterator<Item = Result<Entry>> + Send>;

/// Durable storage for task attempts.
///
/// Implementations distinguish [`crate::Error::NotFound`] (no such task or
/// entry) from [`crate::Error::Conflict`] (an entry with the same
/// `(task_id, task_seq)` already exists); the executor's admission logic
/// relies on that distinction.
#[async_trait]
pub trait Worklog: Send + Sync {
    /// Create the first entry for a task. Fails with `Conflict` if the task
    /// already has entries.
    async fn create_entry(&self, entry: &Entry) -> Result<()>;

    /// Append an entry, respecting `(task_id, task_seq)` uniqueness.
    async fn store_entry(&self, entry: &Entry) -> Result<()>;

    /// Atomically update an entry's expiration, returning the updated entry.
    async fn renew_entry(&self, entry: &Entry, expires: DateTime<Utc>) -> Result<Entry>;

    async fn fetch_entry(&self, task_id: Ident, task_seq: i64) -> Result<Entry>;

    async fn fetch_latest_entry_for_task(&self, task_id: Ident) -> Result<Entry>;

    /// Scan the latest entry of every task created at or after `since`,
    /// filtered by `criteria`.
    async fn iter_latest_entry_for_every_task(
        &self,
        criteria: Criteria,
        since: DateTime<Utc>,
    ) -> Result<EntryIter>;

    /// Remove every entry for a task. Deleting an absent task is not an
    /// error.
    async fn delete_task(&self, task_id: Ident) -> Result<()>;
}
