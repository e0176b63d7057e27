#![forbid(unsafe_code)]

//! Dependency-aware scheduling over the snapshot tables.
//!
//! Eligibility for `claim_next` and `available_tasks`: ready status and
//! every dependency done. A missing dependency target counts as not done,
//! and so does an archived one; done is the only satisfying state.

use super::task_ops::{TASK_COLUMNS, claim_tx, fill_relations, require_task_tx, row_to_task};
use super::{
    AvailableFilters, ClaimFilters, ClaimOptions, ProjectStats, SearchHit, StoreError, TaskRecord,
    TaskStore,
};
use rusqlite::{Connection, OptionalExtension, params};
use tl_core::model::TaskStatus;
use tracing::debug;

/// In-progress tasks claimed without a lease count as stuck once the claim
/// is older than this.
const STALE_CLAIM_MS: i64 = 24 * 60 * 60 * 1000;

const DEPS_ALL_DONE: &str = "NOT EXISTS (\
     SELECT 1 FROM task_deps d LEFT JOIN tasks dep ON dep.id = d.depends_on_id \
     WHERE d.task_id = tasks.id AND (dep.id IS NULL OR dep.status <> 'done'))";

impl TaskStore {
    /// Select and claim the best eligible task in one transaction. Ordering
    /// is priority descending, then creation time ascending, then id
    /// ascending as the deterministic tie-break. Returns `None` when
    /// nothing is eligible.
    pub fn claim_next(&mut self, filters: &ClaimFilters) -> Result<Option<TaskRecord>, StoreError> {
        let tx = self.conn.transaction()?;

        let mut sql = format!(
            "SELECT id FROM tasks WHERE status='ready' AND {DEPS_ALL_DONE}"
        );
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(project) = &filters.project {
            sql.push_str(" AND project=?");
            args.push(Box::new(project.clone()));
        }
        sql.push_str(" ORDER BY priority DESC, created_at_ms ASC, id ASC");

        let candidates: Vec<String> = {
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), |row| {
                row.get::<_, String>(0)
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let winner = candidates
            .into_iter()
            .map(|id| has_all_tags(&tx, &id, &filters.tags).map(|ok| (id, ok)))
            .collect::<Result<Vec<_>, StoreError>>()?
            .into_iter()
            .find_map(|(id, ok)| ok.then_some(id));

        let Some(task_id) = winner else {
            return Ok(None);
        };

        let claim = ClaimOptions {
            assignee: filters.assignee.clone(),
            lease_ms: filters.lease_ms,
            context: filters.context.clone(),
        };
        claim_tx(&tx, &task_id, TaskStatus::Ready, &claim, false)?;
        let task = require_task_tx(&tx, &task_id)?;
        tx.commit()?;
        debug!(task_id = %task.id, assignee = ?task.assignee, "claimed next task");
        Ok(Some(task))
    }

    /// Read-only twin of `claim_next` eligibility, in the same order.
    pub fn available_tasks(
        &self,
        filters: &AvailableFilters,
    ) -> Result<Vec<TaskRecord>, StoreError> {
        let mut sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE status='ready' AND {DEPS_ALL_DONE}"
        );
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(project) = &filters.project {
            sql.push_str(" AND project=?");
            args.push(Box::new(project.clone()));
        }
        if filters.leaf_only {
            sql.push_str(" AND NOT EXISTS (SELECT 1 FROM tasks c WHERE c.parent_id = tasks.id)");
        }
        sql.push_str(" ORDER BY priority DESC, created_at_ms ASC, id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), row_to_task)?;
        let mut out = Vec::new();
        for row in rows {
            let mut task = row?;
            if !has_all_tags(&self.conn, &task.id, &filters.tags)? {
                continue;
            }
            fill_relations(&self.conn, &mut task)?;
            out.push(task);
        }
        Ok(out)
    }

    /// Ready tasks held back by at least one unsatisfied dependency.
    pub fn blocked_tasks(&self, project: Option<&str>) -> Result<Vec<TaskRecord>, StoreError> {
        let mut sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE status='ready' AND NOT {DEPS_ALL_DONE}"
        );
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(project) = project {
            sql.push_str(" AND project=?");
            args.push(Box::new(project.to_string()));
        }
        sql.push_str(" ORDER BY created_at_ms ASC, id ASC");
        self.collect_tasks(&sql, &args)
    }

    /// In-progress tasks whose lease expired before `as_of_ms`, plus
    /// lease-less claims older than a day.
    pub fn stuck_tasks(&self, as_of_ms: i64) -> Result<Vec<TaskRecord>, StoreError> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE status='in_progress' AND (\
               (lease_until_ms IS NOT NULL AND lease_until_ms < ?1) OR \
               (lease_until_ms IS NULL AND claimed_at_ms IS NOT NULL AND claimed_at_ms < ?2)) \
             ORDER BY created_at_ms ASC, id ASC"
        );
        let args: Vec<Box<dyn rusqlite::types::ToSql>> =
            vec![Box::new(as_of_ms), Box::new(as_of_ms - STALE_CLAIM_MS)];
        self.collect_tasks(&sql, &args)
    }

    pub fn stats(&self, project: Option<&str>) -> Result<ProjectStats, StoreError> {
        let mut sql = "SELECT status, COUNT(*) FROM tasks".to_string();
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(project) = project {
            let known: bool = self
                .conn
                .query_row(
                    "SELECT 1 FROM projects WHERE name=?1",
                    params![project],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if !known {
                return Err(StoreError::UnknownProject(project.to_string()));
            }
            sql.push_str(" WHERE project=?");
            args.push(Box::new(project.to_string()));
        }
        sql.push_str(" GROUP BY status");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
        })?;

        let mut stats = ProjectStats::default();
        for row in rows {
            let (status, count) = row?;
            stats.total += count;
            match TaskStatus::parse(&status) {
                Some(TaskStatus::Backlog) => stats.backlog = count,
                Some(TaskStatus::Ready) => stats.ready = count,
                Some(TaskStatus::InProgress) => stats.in_progress = count,
                Some(TaskStatus::Blocked) => stats.blocked = count,
                Some(TaskStatus::Done) => stats.done = count,
                Some(TaskStatus::Archived) => stats.archived = count,
                None => {}
            }
        }
        Ok(stats)
    }

    /// Exact id match first, then a unique prefix. More than one prefix
    /// match reports every candidate with its title.
    pub fn resolve_task_id(&self, input: &str) -> Result<String, StoreError> {
        if input.is_empty() {
            return Err(StoreError::InvalidInput("empty task id"));
        }
        let exact: Option<String> = self
            .conn
            .query_row(
                "SELECT id FROM tasks WHERE id=?1",
                params![input],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = exact {
            return Ok(id);
        }

        let pattern = format!("{}%", like_escape(input));
        let mut stmt = self.conn.prepare(
            "SELECT id, title FROM tasks WHERE id LIKE ?1 ESCAPE '\\' ORDER BY id ASC LIMIT 16",
        )?;
        let rows = stmt.query_map(params![pattern], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut matches = rows.collect::<Result<Vec<_>, _>>()?;

        match matches.len() {
            0 => Err(StoreError::NotFound {
                task_id: input.to_string(),
            }),
            1 => {
                let (id, _) = matches.remove(0);
                Ok(id)
            }
            _ => Err(StoreError::AmbiguousPrefix {
                prefix: input.to_string(),
                matches,
            }),
        }
    }

    /// Substring search over indexed titles, descriptions, and comments.
    pub fn search_tasks(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, StoreError> {
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let pattern = format!("%{}%", like_escape(query));
        let mut stmt = self.conn.prepare(
            "SELECT task_id, kind, content FROM search_index \
             WHERE content LIKE ?1 ESCAPE '\\' \
             ORDER BY task_id ASC, kind ASC, ref_seq ASC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![pattern, limit as i64], |row| {
            Ok(SearchHit {
                task_id: row.get(0)?,
                kind: row.get(1)?,
                snippet: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn collect_tasks(
        &self,
        sql: &str,
        args: &[Box<dyn rusqlite::types::ToSql>],
    ) -> Result<Vec<TaskRecord>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), row_to_task)?;
        let mut out = Vec::new();
        for row in rows {
            let mut task = row?;
            fill_relations(&self.conn, &mut task)?;
            out.push(task);
        }
        Ok(out)
    }
}

fn has_all_tags(conn: &Connection, task_id: &str, tags: &[String]) -> Result<bool, StoreError> {
    for tag in tags {
        let present: bool = conn
            .query_row(
                "SELECT 1 FROM task_tags WHERE task_id=?1 AND tag=?2",
                params![task_id, tag],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !present {
            return Ok(false);
        }
    }
    Ok(true)
}

fn like_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
