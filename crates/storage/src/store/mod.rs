#![forbid(unsafe_code)]

mod error;
mod event_log;
mod export;
mod projection;
mod projectors;
mod prune;
mod requests;
mod schedule;
mod task_ops;
mod validate;

pub use error::StoreError;
pub use requests::*;

use rusqlite::{Connection, OptionalExtension, Transaction, params};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const SINGLE_DB_FILE: &str = "taskledger.db";
const EVENTS_DB_FILE: &str = "events.db";
const PROJECTIONS_DB_FILE: &str = "projections.db";
const PRUNE_JOURNAL_FILE: &str = "prune_journal.json";

const SCHEMA_VERSION: i64 = 1;

const GUARD_LOCKED: &str = "locked";
const GUARD_OPEN: &str = "open";

/// Embedded event-sourced task store.
///
/// One writer per database file; every mutating operation runs inside a
/// single write transaction that appends events and applies every
/// projection before committing.
#[derive(Debug)]
pub struct TaskStore {
    conn: Connection,
    storage_dir: PathBuf,
    split: bool,
}

impl TaskStore {
    /// Open (or create) a store with events and projections in one file.
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_inner(storage_dir.as_ref(), false)
    }

    /// Open (or create) a store with the event log and the projections in
    /// two separate database files. Pruning then uses the recovery journal
    /// instead of a single cross-file transaction.
    pub fn open_split(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_inner(storage_dir.as_ref(), true)
    }

    fn open_inner(storage_dir: &Path, split: bool) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let db_path = storage_dir.join(if split { EVENTS_DB_FILE } else { SINGLE_DB_FILE });
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;\n\
             PRAGMA synchronous=NORMAL;\n\
             PRAGMA foreign_keys=ON;",
        )?;

        if split {
            let proj_path = storage_dir.join(PROJECTIONS_DB_FILE);
            conn.execute(
                "ATTACH DATABASE ?1 AS proj",
                params![proj_path.to_string_lossy()],
            )?;
        }

        install_schema(&conn, split)?;

        let mut store = Self {
            conn,
            storage_dir,
            split,
        };

        // An interrupted cross-file prune must self-heal before anything
        // else touches the projections.
        store.recover_pending_prune()?;

        let stored = store.meta_get("schema_version")?;
        match stored.as_deref().and_then(|v| v.parse::<i64>().ok()) {
            Some(v) if v == SCHEMA_VERSION => {}
            Some(v) => {
                info!(stored = v, current = SCHEMA_VERSION, "schema version changed, rebuilding projections");
                store.rebuild_all()?;
                store.meta_set("schema_version", &SCHEMA_VERSION.to_string())?;
            }
            None => {
                store.meta_set("schema_version", &SCHEMA_VERSION.to_string())?;
            }
        }

        debug!(dir = %store.storage_dir.display(), split, "task store opened");
        Ok(store)
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub(crate) fn prune_journal_path(&self) -> PathBuf {
        self.storage_dir.join(PRUNE_JOURNAL_FILE)
    }

    fn meta_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key=?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?)
    }

    fn meta_set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO meta(key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

fn install_schema(conn: &Connection, split: bool) -> Result<(), StoreError> {
    // Event log, meta, and the append-only guard live with the events; a
    // trigger cannot reach across attached databases.
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS events (
          seq INTEGER PRIMARY KEY AUTOINCREMENT,
          event_id TEXT NOT NULL UNIQUE,
          task_id TEXT NOT NULL,
          type TEXT NOT NULL,
          payload_json TEXT NOT NULL,
          author TEXT,
          agent_id TEXT,
          session_id TEXT,
          correlation_id TEXT,
          causation_id TEXT,
          ts_ms INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_events_task_seq ON events(task_id, seq);
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO meta(key, value) VALUES ('events_guard', ?1)",
        params![GUARD_LOCKED],
    )?;

    conn.execute_batch(&format!(
        r#"
        CREATE TRIGGER IF NOT EXISTS events_append_only_update
        BEFORE UPDATE ON events
        WHEN COALESCE((SELECT value FROM meta WHERE key='events_guard'), '{locked}') <> '{open}'
        BEGIN
          SELECT RAISE(ABORT, 'events log is append-only');
        END;

        CREATE TRIGGER IF NOT EXISTS events_append_only_delete
        BEFORE DELETE ON events
        WHEN COALESCE((SELECT value FROM meta WHERE key='events_guard'), '{locked}') <> '{open}'
        BEGIN
          SELECT RAISE(ABORT, 'events log is append-only');
        END;
        "#,
        locked = GUARD_LOCKED,
        open = GUARD_OPEN,
    ))?;

    // Projection tables. In split mode they are created only inside the
    // attached `proj` schema, so unqualified names in every query resolve
    // there; the same statements serve both modes.
    let p = if split { "proj." } else { "" };
    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {p}tasks (
          id TEXT PRIMARY KEY,
          title TEXT NOT NULL,
          project TEXT NOT NULL,
          status TEXT NOT NULL,
          parent_id TEXT,
          description TEXT,
          links_json TEXT NOT NULL DEFAULT '[]',
          priority INTEGER NOT NULL DEFAULT 0,
          due_ms INTEGER,
          metadata_json TEXT NOT NULL DEFAULT '{{}}',
          claimed_at_ms INTEGER,
          assignee TEXT,
          lease_until_ms INTEGER,
          progress INTEGER,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          terminal_at_ms INTEGER,
          last_event_seq INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS {p}idx_tasks_project_status
          ON tasks(project, status);
        CREATE INDEX IF NOT EXISTS {p}idx_tasks_parent
          ON tasks(parent_id);

        CREATE TABLE IF NOT EXISTS {p}task_deps (
          task_id TEXT NOT NULL,
          depends_on_id TEXT NOT NULL,
          PRIMARY KEY (task_id, depends_on_id)
        );

        CREATE INDEX IF NOT EXISTS {p}idx_task_deps_target
          ON task_deps(depends_on_id);

        CREATE TABLE IF NOT EXISTS {p}task_tags (
          task_id TEXT NOT NULL,
          tag TEXT NOT NULL,
          PRIMARY KEY (task_id, tag)
        );

        CREATE TABLE IF NOT EXISTS {p}comments (
          task_id TEXT NOT NULL,
          seq INTEGER NOT NULL,
          author TEXT,
          text TEXT NOT NULL,
          ts_ms INTEGER NOT NULL,
          PRIMARY KEY (task_id, seq)
        );

        CREATE TABLE IF NOT EXISTS {p}checkpoints (
          task_id TEXT NOT NULL,
          seq INTEGER NOT NULL,
          data_json TEXT NOT NULL,
          progress INTEGER,
          ts_ms INTEGER NOT NULL,
          PRIMARY KEY (task_id, seq)
        );

        CREATE TABLE IF NOT EXISTS {p}search_index (
          task_id TEXT NOT NULL,
          kind TEXT NOT NULL,
          ref_seq INTEGER NOT NULL,
          content TEXT NOT NULL,
          PRIMARY KEY (task_id, kind, ref_seq)
        );

        CREATE TABLE IF NOT EXISTS {p}projects (
          name TEXT PRIMARY KEY,
          first_seen_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS {p}projection_cursors (
          projector TEXT PRIMARY KEY,
          last_seq INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );
        "#,
    ))?;

    Ok(())
}

pub(crate) fn set_events_guard_tx(tx: &Transaction<'_>, open: bool) -> Result<(), StoreError> {
    tx.execute(
        "UPDATE meta SET value=?1 WHERE key='events_guard'",
        params![if open { GUARD_OPEN } else { GUARD_LOCKED }],
    )?;
    Ok(())
}

pub(crate) fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration,
        Err(_) => return 0,
    };

    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
