//! SQLite worklog backend.
//!
//! Single source of truth for attempt history on a node. WAL mode for
//! concurrent read access; the `(task_id, task_seq)` primary key enforces
//! sequence uniqueness at the storage layer, surfacing as `Conflict`.

use std::str::FromStr;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{Criteria, Entry, EntryIter, State, Triggers, Worklog};
use crate::attrs::Attributes;
use crate::error::{Error, Result};
use crate::ident::Ident;

pub struct SqliteWorklog {
    conn: Mutex<Connection>,
}

impl SqliteWorklog {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS worklog_entries (
                task_id     TEXT NOT NULL,
                task_seq    INTEGER NOT NULL,
                state       TEXT NOT NULL,
                state_seq   INTEGER NOT NULL,
                utd         TEXT NOT NULL,
                data        BLOB,
                attrs       TEXT,
                error       TEXT,
                triggers    TEXT,
                retry       INTEGER NOT NULL DEFAULT 0,
                created     TEXT NOT NULL,
                expires     TEXT,
                PRIMARY KEY (task_id, task_seq)
            );

            CREATE INDEX IF NOT EXISTS idx_worklog_state ON worklog_entries(state);
            CREATE INDEX IF NOT EXISTS idx_worklog_created ON worklog_entries(created);
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Storage("connection lock poisoned".to_string()))
    }
}

const COLUMNS: &str =
    "task_id, task_seq, state, state_seq, utd, data, attrs, error, triggers, retry, created, expires";

/// Raw row image; converted to an [`Entry`] outside the rusqlite closure so
/// conversion failures surface as crate errors.
struct Row {
    task_id: String,
    task_seq: i64,
    state: String,
    state_seq: i64,
    utd: String,
    data: Option<Vec<u8>>,
    attrs: Option<String>,
    error: Option<String>,
    triggers: Option<String>,
    retry: bool,
    created: String,
    expires: Option<String>,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    Ok(Row {
        task_id: row.get(0)?,
        task_seq: row.get(1)?,
        state: row.get(2)?,
        state_seq: row.get(3)?,
        utd: row.get(4)?,
        data: row.get(5)?,
        attrs: row.get(6)?,
        error: row.get(7)?,
        triggers: row.get(8)?,
        retry: row.get(9)?,
        created: row.get(10)?,
        expires: row.get(11)?,
    })
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|err| Error::Storage(format!("bad timestamp {s:?}: {err}")))
}

impl TryFrom<Row> for Entry {
    type Error = Error;

    fn try_from(row: Row) -> Result<Entry> {
        Ok(Entry {
            task_id: row.task_id.parse::<Ident>()?,
            task_seq: row.task_seq,
            state: State::from_str(&row.state)?,
            state_seq: row.state_seq,
            utd: row.utd,
            data: row.data.unwrap_or_default(),
            attrs: match row.attrs {
                Some(s) => serde_json::from_str::<Attributes>(&s)?,
                None => Attributes::new(),
            },
            error: match row.error {
                Some(s) => Some(serde_json::from_str(&s)?),
                None => None,
            },
            triggers: match row.triggers {
                Some(s) => serde_json::from_str::<Triggers>(&s)?,
                None => Triggers::new(),
            },
            retry: row.retry,
            created: parse_time(&row.created)?,
            expires: row.expires.as_deref().map(parse_time).transpose()?,
        })
    }
}

fn insert(conn: &Connection, entry: &Entry) -> Result<()> {
    let attrs = if entry.attrs.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&entry.attrs)?)
    };
    let error = entry.error.as_ref().map(serde_json::to_string).transpose()?;
    let triggers = if entry.triggers.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&entry.triggers)?)
    };

    let res = conn.execute(
        "INSERT INTO worklog_entries (task_id, task_seq, state, state_seq, utd, data, attrs, error, triggers, retry, created, expires)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            entry.task_id.to_string(),
            entry.task_seq,
            entry.state.as_str(),
            entry.state_seq,
            entry.utd,
            entry.data,
            attrs,
            error,
            triggers,
            entry.retry,
            entry.created.to_rfc3339(),
            entry.expires.map(|t| t.to_rfc3339()),
        ],
    );
    match res {
        Ok(_) => Ok(()),
        Err(err) if is_constraint_violation(&err) => Err(Error::Conflict(entry.to_string())),
        Err(err) => Err(err.into()),
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[async_trait]
impl Worklog for SqliteWorklog {
    async fn create_entry(&self, entry: &Entry) -> Result<()> {
        let conn = self.lock()?;
        let existing: i64 = conn.query_row(
            "SELECT COUNT(*) FROM worklog_entries WHERE task_id = ?1",
            params![entry.task_id.to_string()],
            |row| row.get(0),
        )?;
        if existing > 0 {
            return Err(Error::Conflict(format!(
                "task already has entries: {}",
                entry.task_id
            )));
        }
        insert(&conn, entry)
    }

    async fn store_entry(&self, entry: &Entry) -> Result<()> {
        let conn = self.lock()?;
        insert(&conn, entry)
    }

    async fn renew_entry(&self, entry: &Entry, expires: DateTime<Utc>) -> Result<Entry> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE worklog_entries SET expires = ?1 WHERE task_id = ?2 AND task_seq = ?3",
            params![
                expires.to_rfc3339(),
                entry.task_id.to_string(),
                entry.task_seq
            ],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(entry.to_string()));
        }
        let row = conn.query_row(
            &format!(
                "SELECT {COLUMNS} FROM worklog_entries WHERE task_id = ?1 AND task_seq = ?2"
            ),
            params![entry.task_id.to_string(), entry.task_seq],
            read_row,
        )?;
        row.try_into()
    }

    async fn fetch_entry(&self, task_id: Ident, task_seq: i64) -> Result<Entry> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM worklog_entries WHERE task_id = ?1 AND task_seq = ?2"
                ),
                params![task_id.to_string(), task_seq],
                read_row,
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("{task_id}:{task_seq}")))?;
        row.try_into()
    }

    async fn fetch_latest_entry_for_task(&self, task_id: Ident) -> Result<Entry> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM worklog_entries WHERE task_id = ?1
                     ORDER BY task_seq DESC LIMIT 1"
                ),
                params![task_id.to_string()],
                read_row,
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(task_id.to_string()))?;
        row.try_into()
    }

    async fn iter_latest_entry_for_every_task(
        &self,
        criteria: Criteria,
        since: DateTime<Utc>,
    ) -> Result<EntryIter> {
        let now = Utc::now();
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM worklog_entries AS e
             WHERE task_seq = (SELECT MAX(task_seq) FROM worklog_entries WHERE task_id = e.task_id)
               AND created >= ?1
             ORDER BY task_id"
        ))?;
        let rows = stmt.query_map(params![since.to_rfc3339()], read_row)?;

        let mut entries = Vec::new();
        for row in rows {
            let entry: Entry = row.map_err(Error::from)?.try_into()?;
            if criteria.admits(&entry, now) {
                entries.push(entry);
            }
        }
        Ok(Box::new(entries.into_iter().map(Ok)))
    }

    async fn delete_task(&self, task_id: Ident) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM worklog_entries WHERE task_id = ?1",
            params![task_id.to_string()],
        )?;
        Ok(())
    }
}
