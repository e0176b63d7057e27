#![forbid(unsafe_code)]

//! Irreversible bulk deletion of terminal tasks, their events, and every
//! projected row.
//!
//! Single-file mode deletes events and projection rows in one transaction.
//! Split mode cannot make a crash-atomic commit across two database files,
//! so it persists a recovery journal naming the doomed task ids before the
//! event deletion commits; `TaskStore::open*` replays a leftover journal
//! before anything else runs.

use super::task_ops::family;
use super::{PruneReport, StoreError, TaskStore, now_ms, set_events_guard_tx};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use serde::{Deserialize, Serialize};
use tl_core::model::TaskStatus;
use tracing::{info, warn};

#[derive(Serialize, Deserialize)]
struct PruneJournal {
    tasks: Vec<String>,
}

impl TaskStore {
    /// Ids that `prune_eligible` would delete right now, without deleting.
    pub fn preview_prunable(
        &self,
        project: Option<&str>,
        older_than_ms: i64,
        as_of_ms: Option<i64>,
    ) -> Result<Vec<String>, StoreError> {
        eligible_ids(&self.conn, project, older_than_ms, as_of_ms)
    }

    /// Delete every eligible task: its events and all of its projected
    /// rows. The parent/subtask family is the unit of eligibility: every
    /// member must be terminal, past the age threshold, and free of
    /// non-terminal dependents, and the whole family is deleted together.
    pub fn prune_eligible(
        &mut self,
        project: Option<&str>,
        older_than_ms: i64,
        as_of_ms: Option<i64>,
    ) -> Result<PruneReport, StoreError> {
        if self.split {
            self.prune_journaled(project, older_than_ms, as_of_ms)
        } else {
            self.prune_single_tx(project, older_than_ms, as_of_ms)
        }
    }

    fn prune_single_tx(
        &mut self,
        project: Option<&str>,
        older_than_ms: i64,
        as_of_ms: Option<i64>,
    ) -> Result<PruneReport, StoreError> {
        let tx = self.conn.transaction()?;
        let ids = eligible_ids(&tx, project, older_than_ms, as_of_ms)?;
        if ids.is_empty() {
            return Ok(PruneReport::default());
        }

        let events_deleted = delete_events_tx(&tx, &ids)?;
        for id in &ids {
            delete_projection_rows_tx(&tx, id)?;
        }
        tx.commit()?;

        info!(tasks = ids.len(), events_deleted, "pruned terminal tasks");
        Ok(PruneReport {
            tasks: ids,
            events_deleted,
        })
    }

    fn prune_journaled(
        &mut self,
        project: Option<&str>,
        older_than_ms: i64,
        as_of_ms: Option<i64>,
    ) -> Result<PruneReport, StoreError> {
        let ids = {
            let tx = self.conn.transaction()?;
            eligible_ids(&tx, project, older_than_ms, as_of_ms)?
        };
        if ids.is_empty() {
            return Ok(PruneReport::default());
        }

        // The journal hits disk before the event deletion commits, so a
        // crash at any later point leaves enough to finish the job on the
        // next open.
        let journal = PruneJournal { tasks: ids.clone() };
        let journal_path = self.prune_journal_path();
        std::fs::write(&journal_path, serde_json::to_vec(&journal)?)?;

        let events_deleted = {
            let tx = self.conn.transaction()?;
            let n = delete_events_tx(&tx, &ids)?;
            tx.commit()?;
            n
        };

        // Events are already gone; if the projection cleanup fails here the
        // journal stays on disk and the next open finishes the job.
        let cleanup = (|| -> Result<(), StoreError> {
            let tx = self.conn.transaction()?;
            for id in &ids {
                delete_projection_rows_tx(&tx, id)?;
            }
            tx.commit()?;
            Ok(())
        })();
        if let Err(err) = cleanup {
            return Err(StoreError::PruneIncomplete(format!(
                "projection cleanup deferred to next open: {err}"
            )));
        }

        std::fs::remove_file(&journal_path)?;
        info!(tasks = ids.len(), events_deleted, "pruned terminal tasks (journaled)");
        Ok(PruneReport {
            tasks: ids,
            events_deleted,
        })
    }

    /// Finish an interrupted journaled prune. Deleting both the events and
    /// the projection rows again is idempotent, so this covers a crash on
    /// either side of the event-deletion commit.
    pub(crate) fn recover_pending_prune(&mut self) -> Result<(), StoreError> {
        let journal_path = self.prune_journal_path();
        if !journal_path.exists() {
            return Ok(());
        }
        let raw = std::fs::read(&journal_path)?;
        let journal: PruneJournal = match serde_json::from_slice(&raw) {
            Ok(journal) => journal,
            Err(err) => {
                warn!(error = %err, "unreadable prune journal, discarding");
                std::fs::remove_file(&journal_path)?;
                return Ok(());
            }
        };

        let tx = self.conn.transaction()?;
        delete_events_tx(&tx, &journal.tasks)?;
        for id in &journal.tasks {
            delete_projection_rows_tx(&tx, id)?;
        }
        tx.commit()?;
        std::fs::remove_file(&journal_path)?;
        info!(tasks = journal.tasks.len(), "recovered interrupted prune");
        Ok(())
    }
}

/// A parent/subtask family is the unit of pruning: every member must be
/// terminal, past the age threshold, and free of non-terminal dependents
/// before any of them is deleted, and then they are all deleted together.
/// Judging members individually could delete a parent ahead of a child
/// that went terminal more recently, leaving the child behind a parent id
/// that no longer resolves.
fn eligible_ids(
    conn: &Connection,
    project: Option<&str>,
    older_than_ms: i64,
    as_of_ms: Option<i64>,
) -> Result<Vec<String>, StoreError> {
    let cutoff = as_of_ms.unwrap_or_else(now_ms) - older_than_ms;

    // Seed candidates cheaply in SQL; the per-family walk below is the
    // authoritative check.
    let mut sql = "SELECT id FROM tasks \
         WHERE status IN ('done','archived') \
           AND terminal_at_ms IS NOT NULL AND terminal_at_ms <= ?1"
        .to_string();
    let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(cutoff)];
    if let Some(project) = project {
        sql.push_str(" AND project=?2");
        args.push(Box::new(project.to_string()));
    }
    sql.push_str(" ORDER BY id ASC");

    let candidates: Vec<String> = {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>()?
    };

    let mut seen_roots = std::collections::BTreeSet::new();
    let mut out = Vec::new();
    for id in candidates {
        let root = family_root(conn, &id)?;
        if !seen_roots.insert(root.clone()) {
            continue;
        }
        if let Some(members) = prunable_family(conn, &root, cutoff)? {
            out.extend(members);
        }
    }
    out.sort();
    out.dedup();
    Ok(out)
}

/// Topmost surviving ancestor. An ancestor id whose row is already gone
/// ends the climb, so rows orphaned by data from older stores do not pin
/// their family forever.
fn family_root(conn: &Connection, task_id: &str) -> Result<String, StoreError> {
    let mut root = task_id.to_string();
    loop {
        let parent: Option<Option<String>> = conn
            .query_row(
                "SELECT parent_id FROM tasks WHERE id=?1",
                params![root],
                |row| row.get(0),
            )
            .optional()?;
        let Some(parent_id) = parent.flatten() else {
            break;
        };
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM tasks WHERE id=?1",
                params![parent_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            break;
        }
        root = parent_id;
    }
    Ok(root)
}

/// The whole family, or `None` when any member disqualifies it. Members
/// whose rows are already gone are skipped rather than counted against
/// the family.
fn prunable_family(
    conn: &Connection,
    root: &str,
    cutoff: i64,
) -> Result<Option<Vec<String>>, StoreError> {
    let mut members = Vec::new();
    for member in family(conn, root)? {
        let row: Option<(String, Option<i64>)> = conn
            .query_row(
                "SELECT status, terminal_at_ms FROM tasks WHERE id=?1",
                params![member],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((status, terminal_at_ms)) = row else {
            continue;
        };
        let terminal = matches!(
            TaskStatus::parse(&status),
            Some(s) if s.is_terminal()
        );
        if !terminal || !terminal_at_ms.is_some_and(|ts| ts <= cutoff) {
            return Ok(None);
        }
        let live_dependent: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM task_deps d JOIN tasks dependent ON dependent.id = d.task_id \
                 WHERE d.depends_on_id = ?1 \
                   AND dependent.status NOT IN ('done','archived') \
                 LIMIT 1",
                params![member],
                |row| row.get(0),
            )
            .optional()?;
        if live_dependent.is_some() {
            return Ok(None);
        }
        members.push(member);
    }
    Ok(Some(members))
}

/// Event deletion runs with the append-only guard opened for exactly the
/// duration of this call; the guard is restored in the same transaction.
fn delete_events_tx(tx: &Transaction<'_>, ids: &[String]) -> Result<usize, StoreError> {
    set_events_guard_tx(tx, true)?;
    let mut deleted = 0;
    for id in ids {
        deleted += tx.execute("DELETE FROM events WHERE task_id=?1", params![id])?;
    }
    set_events_guard_tx(tx, false)?;
    Ok(deleted)
}

fn delete_projection_rows_tx(tx: &Transaction<'_>, task_id: &str) -> Result<(), StoreError> {
    tx.execute("DELETE FROM tasks WHERE id=?1", params![task_id])?;
    tx.execute(
        "DELETE FROM task_deps WHERE task_id=?1 OR depends_on_id=?1",
        params![task_id],
    )?;
    tx.execute("DELETE FROM task_tags WHERE task_id=?1", params![task_id])?;
    tx.execute("DELETE FROM comments WHERE task_id=?1", params![task_id])?;
    tx.execute("DELETE FROM checkpoints WHERE task_id=?1", params![task_id])?;
    tx.execute(
        "DELETE FROM search_index WHERE task_id=?1",
        params![task_id],
    )?;
    Ok(())
}
