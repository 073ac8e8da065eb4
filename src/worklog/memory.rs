//! In-memory worklog backend.
//!
//! Keeps every entry in a map keyed by task. Intended for tests and local
//! experimentation; nothing survives the process.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Criteria, Entry, EntryIter, Worklog};
use crate::error::{Error, Result};
use crate::ident::Ident;

#[derive(Default)]
pub struct MemoryWorklog {
    tasks: Mutex<HashMap<Ident, Vec<Entry>>>,
}

impl MemoryWorklog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entry recorded for a task, in task-sequence order.
    pub fn entries_for_task(&self, task_id: Ident) -> Vec<Entry> {
        self.tasks
            .lock()
            .map(|tasks| tasks.get(&task_id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Ident, Vec<Entry>>>> {
        self.tasks
            .lock()
            .map_err(|_| Error::Storage("worklog lock poisoned".to_string()))
    }
}

#[async_trait]
impl Worklog for MemoryWorklog {
    async fn create_entry(&self, entry: &Entry) -> Result<()> {
        let mut tasks = self.lock()?;
        let entries = tasks.entry(entry.task_id).or_default();
        if !entries.is_empty() {
            return Err(Error::Conflict(format!(
                "task already has entries: {}",
                entry.task_id
            )));
        }
        entries.push(entry.clone());
        Ok(())
    }

    async fn store_entry(&self, entry: &Entry) -> Result<()> {
        let mut tasks = self.lock()?;
        let entries = tasks.entry(entry.task_id).or_default();
        if entries.iter().any(|e| e.task_seq == entry.task_seq) {
            return Err(Error::Conflict(entry.to_string()));
        }
        entries.push(entry.clone());
        entries.sort_by_key(|e| e.task_seq);
        Ok(())
    }

    async fn renew_entry(&self, entry: &Entry, expires: DateTime<Utc>) -> Result<Entry> {
        let mut tasks = self.lock()?;
        let found = tasks
            .get_mut(&entry.task_id)
            .and_then(|entries| entries.iter_mut().find(|e| e.task_seq == entry.task_seq))
            .ok_or_else(|| Error::NotFound(entry.to_string()))?;
        found.expires = Some(expires);
        Ok(found.clone())
    }

    async fn fetch_entry(&self, task_id: Ident, task_seq: i64) -> Result<Entry> {
        let tasks = self.lock()?;
        tasks
            .get(&task_id)
            .and_then(|entries| entries.iter().find(|e| e.task_seq == task_seq))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("{task_id}:{task_seq}")))
    }

    async fn fetch_latest_entry_for_task(&self, task_id: Ident) -> Result<Entry> {
        let tasks = self.lock()?;
        tasks
            .get(&task_id)
            .and_then(|entries| entries.last())
            .cloned()
            .ok_or_else(|| Error::NotFound(task_id.to_string()))
    }

    async fn iter_latest_entry_for_every_task(
        &self,
        criteria: Criteria,
        since: DateTime<Utc>,
    ) -> Result<EntryIter> {
        let now = Utc::now();
        let tasks = self.lock()?;
        let mut latest: Vec<Entry> = tasks
            .values()
            .filter_map(|entries| entries.last())
            .filter(|e| e.created >= since && criteria.admits(e, now))
            .cloned()
            .collect();
        latest.sort_by_key(|e| e.task_id);
        Ok(Box::new(latest.into_iter().map(Ok)))
    }

    async fn delete_task(&self, task_id: Ident) -> Result<()> {
        let mut tasks = self.lock()?;
        tasks.remove(&task_id);
        Ok(())
    }
}
