#![forbid(unsafe_code)]

//! Task lifecycle commands. Every mutating operation runs inside one write
//! transaction: read current state, check preconditions, append event(s),
//! apply every projection, commit.

use super::event_log::append_event_tx;
use super::projection::apply_event_tx;
use super::validate::would_create_cycle_tx;
use super::{
    Checkpoint, ClaimOptions, Comment, CreateTaskRequest, StealOptions, StoreError, TaskRecord,
    TaskStore, now_ms,
};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use tl_core::model::{EventContext, EventType, TaskStatus};
use tracing::debug;
use uuid::Uuid;

pub(crate) const TASK_COLUMNS: &str = "id, title, project, status, parent_id, description, \
     links_json, priority, due_ms, metadata_json, claimed_at_ms, assignee, lease_until_ms, \
     progress, created_at_ms, updated_at_ms, terminal_at_ms, last_event_seq";

impl TaskStore {
    pub fn create_task(&mut self, req: CreateTaskRequest) -> Result<TaskRecord, StoreError> {
        let tx = self.conn.transaction()?;

        if let Some(parent_id) = &req.parent_id {
            if !task_exists_tx(&tx, parent_id)? {
                return Err(StoreError::NotFound {
                    task_id: parent_id.clone(),
                });
            }
        }

        let task_id = Uuid::now_v7().to_string();
        let mut payload = Map::new();
        payload.insert("title".into(), json!(req.title));
        payload.insert("project".into(), json!(req.project));
        if let Some(parent_id) = &req.parent_id {
            payload.insert("parent_id".into(), json!(parent_id));
        }
        if let Some(description) = &req.description {
            payload.insert("description".into(), json!(description));
        }
        if !req.tags.is_empty() {
            payload.insert("tags".into(), json!(req.tags));
        }
        if !req.links.is_empty() {
            payload.insert("links".into(), json!(req.links));
        }
        if req.priority != 0 {
            payload.insert("priority".into(), json!(req.priority));
        }
        if let Some(due_ms) = req.due_ms {
            payload.insert("due_ms".into(), json!(due_ms));
        }
        if !req.metadata.is_empty() {
            payload.insert("metadata".into(), json!(req.metadata));
        }
        if !req.depends_on.is_empty() {
            payload.insert("depends_on".into(), json!(req.depends_on));
        }

        let env = append_event_tx(
            &tx,
            &task_id,
            EventType::TaskCreated,
            Value::Object(payload),
            &req.context,
        )?;
        apply_event_tx(&tx, &env)?;

        let task = require_task_tx(&tx, &task_id)?;
        tx.commit()?;
        debug!(task_id = %task.id, project = %task.project, "task created");
        Ok(task)
    }

    pub fn get_task(&self, task_id: &str) -> Result<TaskRecord, StoreError> {
        load_task(&self.conn, task_id)?.ok_or_else(|| StoreError::NotFound {
            task_id: task_id.to_string(),
        })
    }

    pub fn list_tasks(
        &self,
        project: Option<&str>,
        status: Option<TaskStatus>,
    ) -> Result<Vec<TaskRecord>, StoreError> {
        let mut sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE 1=1");
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(project) = project {
            sql.push_str(" AND project=?");
            args.push(Box::new(project.to_string()));
        }
        if let Some(status) = status {
            sql.push_str(" AND status=?");
            args.push(Box::new(status.as_str()));
        }
        sql.push_str(" ORDER BY created_at_ms ASC, id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), row_to_task)?;
        let mut out = Vec::new();
        for row in rows {
            let mut task = row?;
            fill_relations(&self.conn, &mut task)?;
            out.push(task);
        }
        Ok(out)
    }

    /// Permissive status machine: any transition is legal except out of
    /// archived; a self-transition is a no-op that emits no event.
    pub fn set_status(
        &mut self,
        task_id: &str,
        to: TaskStatus,
        ctx: &EventContext,
    ) -> Result<TaskRecord, StoreError> {
        let tx = self.conn.transaction()?;
        let task = require_task_tx(&tx, task_id)?;
        if task.status == to {
            return Ok(task);
        }
        if !task.status.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                from: task.status,
                to,
            });
        }
        status_changed_tx(&tx, task_id, task.status, to, Map::new(), ctx)?;
        let task = require_task_tx(&tx, task_id)?;
        tx.commit()?;
        Ok(task)
    }

    /// Claiming requires ready status but not completed dependencies;
    /// dependency gating belongs to `claim_next`, not to a direct claim.
    pub fn claim(&mut self, task_id: &str, opts: &ClaimOptions) -> Result<TaskRecord, StoreError> {
        let tx = self.conn.transaction()?;
        let task = require_task_tx(&tx, task_id)?;
        if task.status != TaskStatus::Ready {
            return Err(StoreError::NotClaimable {
                task_id: task_id.to_string(),
                status: task.status,
            });
        }
        claim_tx(&tx, task_id, task.status, opts, false)?;
        let task = require_task_tx(&tx, task_id)?;
        tx.commit()?;
        Ok(task)
    }

    pub fn complete(&mut self, task_id: &str, ctx: &EventContext) -> Result<TaskRecord, StoreError> {
        let tx = self.conn.transaction()?;
        let task = require_in_status_tx(&tx, task_id, TaskStatus::InProgress)?;
        status_changed_tx(&tx, task_id, task.status, TaskStatus::Done, Map::new(), ctx)?;
        let task = require_task_tx(&tx, task_id)?;
        tx.commit()?;
        Ok(task)
    }

    /// Puts an in-progress task back on the queue. The assignee is kept as
    /// the last-known owner; claim time and lease are cleared.
    pub fn release(&mut self, task_id: &str, ctx: &EventContext) -> Result<TaskRecord, StoreError> {
        let tx = self.conn.transaction()?;
        let task = require_in_status_tx(&tx, task_id, TaskStatus::InProgress)?;
        let mut extra = Map::new();
        extra.insert("released".into(), json!(true));
        status_changed_tx(&tx, task_id, task.status, TaskStatus::Ready, extra, ctx)?;
        let task = require_task_tx(&tx, task_id)?;
        tx.commit()?;
        Ok(task)
    }

    pub fn reopen(
        &mut self,
        task_id: &str,
        to: Option<TaskStatus>,
        ctx: &EventContext,
    ) -> Result<TaskRecord, StoreError> {
        let tx = self.conn.transaction()?;
        let task = require_in_status_tx(&tx, task_id, TaskStatus::Done)?;
        let target = to.unwrap_or(TaskStatus::Ready);
        if target == task.status {
            return Ok(task);
        }
        status_changed_tx(&tx, task_id, task.status, target, Map::new(), ctx)?;
        let task = require_task_tx(&tx, task_id)?;
        tx.commit()?;
        Ok(task)
    }

    /// Blocking an already-blocked task only appends the comment, so callers
    /// can keep annotating why the task stays stuck.
    pub fn block(
        &mut self,
        task_id: &str,
        comment: Option<&str>,
        ctx: &EventContext,
    ) -> Result<TaskRecord, StoreError> {
        let tx = self.conn.transaction()?;
        let task = require_task_tx(&tx, task_id)?;
        match task.status {
            TaskStatus::InProgress => {
                status_changed_tx(&tx, task_id, task.status, TaskStatus::Blocked, Map::new(), ctx)?;
            }
            TaskStatus::Blocked => {}
            actual => {
                return Err(StoreError::NotInStatus {
                    task_id: task_id.to_string(),
                    expected: TaskStatus::InProgress,
                    actual,
                });
            }
        }
        if let Some(text) = comment {
            let env = append_event_tx(
                &tx,
                task_id,
                EventType::CommentAdded,
                json!({ "text": text }),
                ctx,
            )?;
            apply_event_tx(&tx, &env)?;
        }
        let task = require_task_tx(&tx, task_id)?;
        tx.commit()?;
        Ok(task)
    }

    pub fn unblock(&mut self, task_id: &str, ctx: &EventContext) -> Result<TaskRecord, StoreError> {
        let tx = self.conn.transaction()?;
        let task = require_in_status_tx(&tx, task_id, TaskStatus::Blocked)?;
        status_changed_tx(&tx, task_id, task.status, TaskStatus::InProgress, Map::new(), ctx)?;
        let task = require_task_tx(&tx, task_id)?;
        tx.commit()?;
        Ok(task)
    }

    pub fn archive(
        &mut self,
        task_id: &str,
        reason: Option<&str>,
        ctx: &EventContext,
    ) -> Result<TaskRecord, StoreError> {
        let tx = self.conn.transaction()?;
        archive_one_tx(&tx, task_id, reason, ctx)?;
        let task = require_task_tx(&tx, task_id)?;
        tx.commit()?;
        Ok(task)
    }

    /// Reassign an in-progress task. `force` always wins; `if_expired` wins
    /// only when the current lease expiry is strictly in the past. With
    /// neither flag the call is rejected outright.
    pub fn steal(&mut self, task_id: &str, opts: &StealOptions) -> Result<TaskRecord, StoreError> {
        if !opts.force && !opts.if_expired {
            return Err(StoreError::InvalidInput(
                "steal requires force or if_expired",
            ));
        }
        let tx = self.conn.transaction()?;
        let task = require_in_status_tx(&tx, task_id, TaskStatus::InProgress)?;
        if !opts.force {
            let expired = matches!(task.lease_until_ms, Some(until) if until < now_ms());
            if !expired {
                return Err(StoreError::LeaseActive {
                    task_id: task_id.to_string(),
                    holder: task.assignee,
                    lease_until_ms: task.lease_until_ms,
                });
            }
        }
        let claim = ClaimOptions {
            assignee: opts.assignee.clone(),
            lease_ms: opts.lease_ms,
            context: opts.context.clone(),
        };
        claim_tx(&tx, task_id, task.status, &claim, true)?;
        let task = require_task_tx(&tx, task_id)?;
        tx.commit()?;
        Ok(task)
    }

    pub fn set_progress(
        &mut self,
        task_id: &str,
        progress: i64,
        ctx: &EventContext,
    ) -> Result<TaskRecord, StoreError> {
        let tx = self.conn.transaction()?;
        require_task_tx(&tx, task_id)?;
        let env = append_event_tx(
            &tx,
            task_id,
            EventType::CheckpointRecorded,
            json!({ "progress": progress }),
            ctx,
        )?;
        apply_event_tx(&tx, &env)?;
        let task = require_task_tx(&tx, task_id)?;
        tx.commit()?;
        Ok(task)
    }

    pub fn add_comment(
        &mut self,
        task_id: &str,
        text: &str,
        ctx: &EventContext,
    ) -> Result<Comment, StoreError> {
        let tx = self.conn.transaction()?;
        require_task_tx(&tx, task_id)?;
        let env = append_event_tx(
            &tx,
            task_id,
            EventType::CommentAdded,
            json!({ "text": text }),
            ctx,
        )?;
        apply_event_tx(&tx, &env)?;
        tx.commit()?;
        Ok(Comment {
            task_id: task_id.to_string(),
            seq: env.seq,
            author: ctx.author.clone(),
            text: text.to_string(),
            ts_ms: env.ts_ms,
        })
    }

    pub fn add_checkpoint(
        &mut self,
        task_id: &str,
        data: Value,
        progress: Option<i64>,
        ctx: &EventContext,
    ) -> Result<Checkpoint, StoreError> {
        let tx = self.conn.transaction()?;
        require_task_tx(&tx, task_id)?;
        let mut payload = Map::new();
        payload.insert("data".into(), data.clone());
        if let Some(progress) = progress {
            payload.insert("progress".into(), json!(progress));
        }
        let env = append_event_tx(
            &tx,
            task_id,
            EventType::CheckpointRecorded,
            Value::Object(payload),
            ctx,
        )?;
        apply_event_tx(&tx, &env)?;
        tx.commit()?;
        Ok(Checkpoint {
            task_id: task_id.to_string(),
            seq: env.seq,
            data,
            progress,
            ts_ms: env.ts_ms,
        })
    }

    /// Mutates one whitelisted named field. The whitelist is enforced again
    /// at payload validation, so a field name smuggling extra columns never
    /// reaches the log.
    pub fn update_task(
        &mut self,
        task_id: &str,
        field: &str,
        value: Value,
        ctx: &EventContext,
    ) -> Result<TaskRecord, StoreError> {
        let tx = self.conn.transaction()?;
        require_task_tx(&tx, task_id)?;
        let env = append_event_tx(
            &tx,
            task_id,
            EventType::TaskUpdated,
            json!({ "field": field, "value": value }),
            ctx,
        )?;
        apply_event_tx(&tx, &env)?;
        let task = require_task_tx(&tx, task_id)?;
        tx.commit()?;
        Ok(task)
    }

    pub fn move_task(
        &mut self,
        task_id: &str,
        project: &str,
        ctx: &EventContext,
    ) -> Result<TaskRecord, StoreError> {
        let tx = self.conn.transaction()?;
        let task = require_task_tx(&tx, task_id)?;
        if task.project != project {
            move_one_tx(&tx, task_id, project, ctx)?;
        }
        let task = require_task_tx(&tx, task_id)?;
        tx.commit()?;
        Ok(task)
    }

    /// Moves a task and its whole subtask tree, root first.
    pub fn move_with_subtasks(
        &mut self,
        task_id: &str,
        project: &str,
        ctx: &EventContext,
    ) -> Result<Vec<String>, StoreError> {
        let tx = self.conn.transaction()?;
        require_task_tx(&tx, task_id)?;
        let family = family(&tx, task_id)?;
        let mut moved = Vec::new();
        for id in &family {
            let task = require_task_tx(&tx, id)?;
            if task.project != project {
                move_one_tx(&tx, id, project, ctx)?;
                moved.push(id.clone());
            }
        }
        tx.commit()?;
        Ok(moved)
    }

    /// Archives a task and its subtask tree; already-archived descendants
    /// are skipped rather than treated as an error.
    pub fn archive_with_subtasks(
        &mut self,
        task_id: &str,
        reason: Option<&str>,
        ctx: &EventContext,
    ) -> Result<Vec<String>, StoreError> {
        let tx = self.conn.transaction()?;
        let root = require_task_tx(&tx, task_id)?;
        if root.status == TaskStatus::Archived {
            return Err(StoreError::AlreadyArchived(task_id.to_string()));
        }
        let family = family(&tx, task_id)?;
        let mut archived = Vec::new();
        for id in &family {
            let task = require_task_tx(&tx, id)?;
            if task.status == TaskStatus::Archived {
                continue;
            }
            archive_one_tx(&tx, id, reason, ctx)?;
            archived.push(id.clone());
        }
        tx.commit()?;
        Ok(archived)
    }

    /// Adds a dependency edge after checking that it would not close a
    /// cycle. The target may not exist yet; orphan edges simply gate
    /// scheduling until the target appears and completes.
    pub fn add_dependency(
        &mut self,
        task_id: &str,
        depends_on_id: &str,
        ctx: &EventContext,
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        require_task_tx(&tx, task_id)?;
        if let Some(path) = would_create_cycle_tx(&tx, task_id, depends_on_id)? {
            return Err(StoreError::DependencyCycle { path });
        }
        let exists: bool = tx
            .query_row(
                "SELECT 1 FROM task_deps WHERE task_id=?1 AND depends_on_id=?2",
                params![task_id, depends_on_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if exists {
            return Ok(());
        }
        let env = append_event_tx(
            &tx,
            task_id,
            EventType::DependencyAdded,
            json!({ "depends_on_id": depends_on_id }),
            ctx,
        )?;
        apply_event_tx(&tx, &env)?;
        tx.commit()?;
        Ok(())
    }

    pub fn remove_dependency(
        &mut self,
        task_id: &str,
        depends_on_id: &str,
        ctx: &EventContext,
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        require_task_tx(&tx, task_id)?;
        let exists: bool = tx
            .query_row(
                "SELECT 1 FROM task_deps WHERE task_id=?1 AND depends_on_id=?2",
                params![task_id, depends_on_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            return Ok(());
        }
        let env = append_event_tx(
            &tx,
            task_id,
            EventType::DependencyRemoved,
            json!({ "depends_on_id": depends_on_id }),
            ctx,
        )?;
        apply_event_tx(&tx, &env)?;
        tx.commit()?;
        Ok(())
    }

    pub fn comments(&self, task_id: &str) -> Result<Vec<Comment>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT task_id, seq, author, text, ts_ms FROM comments \
             WHERE task_id=?1 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![task_id], |row| {
            Ok(Comment {
                task_id: row.get(0)?,
                seq: row.get(1)?,
                author: row.get(2)?,
                text: row.get(3)?,
                ts_ms: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn checkpoints(&self, task_id: &str) -> Result<Vec<Checkpoint>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT task_id, seq, data_json, progress, ts_ms FROM checkpoints \
             WHERE task_id=?1 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![task_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<i64>>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (task_id, seq, data_json, progress, ts_ms) = row?;
            out.push(Checkpoint {
                task_id,
                seq,
                data: serde_json::from_str(&data_json)?,
                progress,
                ts_ms,
            });
        }
        Ok(out)
    }
}

fn status_changed_tx(
    tx: &Transaction<'_>,
    task_id: &str,
    from: TaskStatus,
    to: TaskStatus,
    mut extra: Map<String, Value>,
    ctx: &EventContext,
) -> Result<(), StoreError> {
    extra.insert("from".into(), json!(from.as_str()));
    extra.insert("to".into(), json!(to.as_str()));
    let env = append_event_tx(
        tx,
        task_id,
        EventType::StatusChanged,
        Value::Object(extra),
        ctx,
    )?;
    apply_event_tx(tx, &env)
}

pub(crate) fn claim_tx(
    tx: &Transaction<'_>,
    task_id: &str,
    from: TaskStatus,
    opts: &ClaimOptions,
    stolen: bool,
) -> Result<(), StoreError> {
    let mut extra = Map::new();
    extra.insert("claimed".into(), json!(true));
    if stolen {
        extra.insert("stolen".into(), json!(true));
    }
    if let Some(assignee) = &opts.assignee {
        extra.insert("assignee".into(), json!(assignee));
    }
    if let Some(lease_ms) = opts.lease_ms {
        extra.insert("lease_until_ms".into(), json!(now_ms() + lease_ms));
    }
    status_changed_tx(
        tx,
        task_id,
        from,
        TaskStatus::InProgress,
        extra,
        &opts.context,
    )
}

fn archive_one_tx(
    tx: &Transaction<'_>,
    task_id: &str,
    reason: Option<&str>,
    ctx: &EventContext,
) -> Result<(), StoreError> {
    let task = require_task_tx(tx, task_id)?;
    if task.status == TaskStatus::Archived {
        return Err(StoreError::AlreadyArchived(task_id.to_string()));
    }
    let mut payload = Map::new();
    if let Some(reason) = reason {
        payload.insert("reason".into(), json!(reason));
    }
    let env = append_event_tx(
        tx,
        task_id,
        EventType::TaskArchived,
        Value::Object(payload),
        ctx,
    )?;
    apply_event_tx(tx, &env)
}

fn move_one_tx(
    tx: &Transaction<'_>,
    task_id: &str,
    project: &str,
    ctx: &EventContext,
) -> Result<(), StoreError> {
    let env = append_event_tx(
        tx,
        task_id,
        EventType::TaskMoved,
        json!({ "project": project }),
        ctx,
    )?;
    apply_event_tx(tx, &env)
}

/// A task id plus every transitive subtask, breadth first, root first.
pub(crate) fn family(conn: &Connection, root: &str) -> Result<Vec<String>, StoreError> {
    let mut out = vec![root.to_string()];
    let mut cursor = 0;
    while cursor < out.len() {
        let parent = out[cursor].clone();
        cursor += 1;
        let mut stmt = conn
            .prepare("SELECT id FROM tasks WHERE parent_id=?1 ORDER BY created_at_ms ASC, id ASC")?;
        let children = stmt.query_map(params![parent], |row| row.get::<_, String>(0))?;
        for child in children {
            out.push(child?);
        }
    }
    Ok(out)
}

fn task_exists_tx(tx: &Transaction<'_>, task_id: &str) -> Result<bool, StoreError> {
    Ok(tx
        .query_row("SELECT 1 FROM tasks WHERE id=?1", params![task_id], |_| {
            Ok(())
        })
        .optional()?
        .is_some())
}

fn require_in_status_tx(
    tx: &Transaction<'_>,
    task_id: &str,
    expected: TaskStatus,
) -> Result<TaskRecord, StoreError> {
    let task = require_task_tx(tx, task_id)?;
    if task.status != expected {
        return Err(StoreError::NotInStatus {
            task_id: task_id.to_string(),
            expected,
            actual: task.status,
        });
    }
    Ok(task)
}

pub(crate) fn require_task_tx(
    tx: &Transaction<'_>,
    task_id: &str,
) -> Result<TaskRecord, StoreError> {
    load_task(tx, task_id)?.ok_or_else(|| StoreError::NotFound {
        task_id: task_id.to_string(),
    })
}

pub(crate) fn load_task(
    conn: &Connection,
    task_id: &str,
) -> Result<Option<TaskRecord>, StoreError> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id=?1");
    let task = conn
        .query_row(&sql, params![task_id], row_to_task)
        .optional()?;
    match task {
        Some(mut task) => {
            fill_relations(conn, &mut task)?;
            Ok(Some(task))
        }
        None => Ok(None),
    }
}

pub(crate) fn fill_relations(conn: &Connection, task: &mut TaskRecord) -> Result<(), StoreError> {
    let mut stmt = conn.prepare("SELECT tag FROM task_tags WHERE task_id=?1 ORDER BY tag ASC")?;
    let tags = stmt.query_map(params![task.id], |row| row.get::<_, String>(0))?;
    task.tags = tags.collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT depends_on_id FROM task_deps WHERE task_id=?1 ORDER BY depends_on_id ASC",
    )?;
    let deps = stmt.query_map(params![task.id], |row| row.get::<_, String>(0))?;
    task.depends_on = deps.collect::<Result<Vec<_>, _>>()?;
    Ok(())
}

pub(crate) fn row_to_task(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
    let status_raw: String = row.get(3)?;
    let status = TaskStatus::parse(&status_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("unknown task status {status_raw:?}").into(),
        )
    })?;
    let links_json: String = row.get(6)?;
    let links: Vec<String> = serde_json::from_str(&links_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;
    let metadata_json: String = row.get(9)?;
    let metadata: BTreeMap<String, Value> = serde_json::from_str(&metadata_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e)))?;

    Ok(TaskRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        project: row.get(2)?,
        status,
        parent_id: row.get(4)?,
        description: row.get(5)?,
        tags: Vec::new(),
        links,
        priority: row.get(7)?,
        due_ms: row.get(8)?,
        metadata,
        depends_on: Vec::new(),
        claimed_at_ms: row.get(10)?,
        assignee: row.get(11)?,
        lease_until_ms: row.get(12)?,
        progress: row.get(13)?,
        created_at_ms: row.get(14)?,
        updated_at_ms: row.get(15)?,
        terminal_at_ms: row.get(16)?,
        last_event_seq: row.get(17)?,
    })
}
