#![forbid(unsafe_code)]

//! Current-task snapshot projector. Owns the `tasks` table.

use super::{payload_bool, payload_i64, payload_str};
use crate::store::{EventEnvelope, StoreError};
use rusqlite::{OptionalExtension, Transaction, params};
use serde_json::Value;
use tl_core::model::{EventType, SNAPSHOT_UPDATE_FIELDS, TaskStatus};

pub(crate) fn apply(tx: &Transaction<'_>, env: &EventEnvelope) -> Result<(), StoreError> {
    match env.event_type {
        EventType::TaskCreated => apply_created(tx, env),
        EventType::StatusChanged => apply_status_changed(tx, env),
        EventType::TaskMoved => {
            let Some(project) = payload_str(&env.payload, "project") else {
                return Ok(());
            };
            tx.execute(
                "UPDATE tasks SET project=?2, updated_at_ms=?3, last_event_seq=?4 WHERE id=?1",
                params![env.task_id, project, env.ts_ms, env.seq],
            )?;
            Ok(())
        }
        EventType::TaskUpdated => apply_updated(tx, env),
        EventType::TaskArchived => {
            tx.execute(
                "UPDATE tasks SET status='archived', lease_until_ms=NULL, \
                   terminal_at_ms=COALESCE(terminal_at_ms, ?2), \
                   updated_at_ms=?2, last_event_seq=?3 \
                 WHERE id=?1",
                params![env.task_id, env.ts_ms, env.seq],
            )?;
            Ok(())
        }
        EventType::CheckpointRecorded => {
            match payload_i64(&env.payload, "progress") {
                Some(progress) => tx.execute(
                    "UPDATE tasks SET progress=?2, updated_at_ms=?3, last_event_seq=?4 WHERE id=?1",
                    params![env.task_id, progress, env.ts_ms, env.seq],
                )?,
                None => tx.execute(
                    "UPDATE tasks SET updated_at_ms=?2, last_event_seq=?3 WHERE id=?1",
                    params![env.task_id, env.ts_ms, env.seq],
                )?,
            };
            Ok(())
        }
        EventType::CommentAdded
        | EventType::DependencyAdded
        | EventType::DependencyRemoved => {
            tx.execute(
                "UPDATE tasks SET updated_at_ms=?2, last_event_seq=?3 WHERE id=?1",
                params![env.task_id, env.ts_ms, env.seq],
            )?;
            Ok(())
        }
    }
}

fn apply_created(tx: &Transaction<'_>, env: &EventEnvelope) -> Result<(), StoreError> {
    let payload = &env.payload;
    let Some(title) = payload_str(payload, "title") else {
        return Ok(());
    };
    let Some(project) = payload_str(payload, "project") else {
        return Ok(());
    };
    let status = payload_str(payload, "status")
        .and_then(TaskStatus::parse)
        .unwrap_or(TaskStatus::Backlog);
    let links_json = payload
        .get("links")
        .filter(|v| v.is_array())
        .map(|v| v.to_string())
        .unwrap_or_else(|| "[]".to_string());
    let metadata_json = payload
        .get("metadata")
        .filter(|v| v.is_object())
        .map(|v| v.to_string())
        .unwrap_or_else(|| "{}".to_string());

    tx.execute(
        "INSERT OR REPLACE INTO tasks(id, title, project, status, parent_id, description, \
           links_json, priority, due_ms, metadata_json, claimed_at_ms, assignee, \
           lease_until_ms, progress, created_at_ms, updated_at_ms, terminal_at_ms, last_event_seq) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, NULL, NULL, NULL, NULL, ?11, ?11, NULL, ?12)",
        params![
            env.task_id,
            title,
            project,
            status.as_str(),
            payload_str(payload, "parent_id"),
            payload_str(payload, "description"),
            links_json,
            payload_i64(payload, "priority").unwrap_or(0),
            payload_i64(payload, "due_ms"),
            metadata_json,
            env.ts_ms,
            env.seq,
        ],
    )?;
    Ok(())
}

fn apply_status_changed(tx: &Transaction<'_>, env: &EventEnvelope) -> Result<(), StoreError> {
    let Some(to) = payload_str(&env.payload, "to").and_then(TaskStatus::parse) else {
        return Ok(());
    };

    let current = tx
        .query_row(
            "SELECT assignee, progress, claimed_at_ms FROM tasks WHERE id=?1",
            params![env.task_id],
            |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, Option<i64>>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                ))
            },
        )
        .optional()?;
    let Some((current_assignee, current_progress, current_claimed_at)) = current else {
        return Ok(());
    };

    let claimed = payload_bool(&env.payload, "claimed");
    let released = payload_bool(&env.payload, "released");

    // Assignee resolution: explicit payload assignee, then event author,
    // then leave the last-known owner in place.
    let mut assignee = current_assignee;
    let mut claimed_at = current_claimed_at;
    let mut lease_until: Option<i64> = payload_i64(&env.payload, "lease_until_ms");

    if claimed {
        assignee = payload_str(&env.payload, "assignee")
            .map(str::to_string)
            .or_else(|| env.author.clone())
            .or(assignee);
        claimed_at = payload_i64(&env.payload, "claimed_at_ms").or(Some(env.ts_ms));
    } else if released {
        claimed_at = None;
        lease_until = None;
    } else if to != TaskStatus::InProgress {
        lease_until = None;
    } else {
        // Plain set_status into in_progress keeps whatever lease exists.
        lease_until = tx
            .query_row(
                "SELECT lease_until_ms FROM tasks WHERE id=?1",
                params![env.task_id],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()?
            .flatten();
    }

    // Entering blocked drops the lease but keeps owner and claim time.
    if to == TaskStatus::Blocked {
        lease_until = None;
    }

    let progress = if to == TaskStatus::Done {
        Some(100)
    } else {
        current_progress
    };
    let terminal = to.is_terminal();

    tx.execute(
        "UPDATE tasks SET status=?2, assignee=?3, claimed_at_ms=?4, lease_until_ms=?5, \
           progress=?6, \
           terminal_at_ms=CASE WHEN ?7 THEN COALESCE(terminal_at_ms, ?8) ELSE terminal_at_ms END, \
           updated_at_ms=?8, last_event_seq=?9 \
         WHERE id=?1",
        params![
            env.task_id,
            to.as_str(),
            assignee,
            claimed_at,
            lease_until,
            progress,
            terminal,
            env.ts_ms,
            env.seq,
        ],
    )?;
    Ok(())
}

fn apply_updated(tx: &Transaction<'_>, env: &EventEnvelope) -> Result<(), StoreError> {
    let Some(field) = payload_str(&env.payload, "field") else {
        return Ok(());
    };
    if !SNAPSHOT_UPDATE_FIELDS.contains(&field) {
        return Ok(());
    }
    let value = env.payload.get("value").cloned().unwrap_or(Value::Null);

    match field {
        "title" => match value.as_str() {
            Some(title) if !title.is_empty() => tx.execute(
                "UPDATE tasks SET title=?2, updated_at_ms=?3, last_event_seq=?4 WHERE id=?1",
                params![env.task_id, title, env.ts_ms, env.seq],
            )?,
            _ => return Ok(()),
        },
        "description" => match &value {
            Value::Null => tx.execute(
                "UPDATE tasks SET description=NULL, updated_at_ms=?2, last_event_seq=?3 WHERE id=?1",
                params![env.task_id, env.ts_ms, env.seq],
            )?,
            Value::String(s) => tx.execute(
                "UPDATE tasks SET description=?2, updated_at_ms=?3, last_event_seq=?4 WHERE id=?1",
                params![env.task_id, s, env.ts_ms, env.seq],
            )?,
            _ => return Ok(()),
        },
        "priority" => match value.as_i64() {
            Some(priority) => tx.execute(
                "UPDATE tasks SET priority=?2, updated_at_ms=?3, last_event_seq=?4 WHERE id=?1",
                params![env.task_id, priority, env.ts_ms, env.seq],
            )?,
            None => return Ok(()),
        },
        "due_ms" => tx.execute(
            "UPDATE tasks SET due_ms=?2, updated_at_ms=?3, last_event_seq=?4 WHERE id=?1",
            params![env.task_id, value.as_i64(), env.ts_ms, env.seq],
        )?,
        "links" => match &value {
            Value::Array(_) => tx.execute(
                "UPDATE tasks SET links_json=?2, updated_at_ms=?3, last_event_seq=?4 WHERE id=?1",
                params![env.task_id, value.to_string(), env.ts_ms, env.seq],
            )?,
            _ => return Ok(()),
        },
        "metadata" => match &value {
            Value::Object(_) => tx.execute(
                "UPDATE tasks SET metadata_json=?2, updated_at_ms=?3, last_event_seq=?4 WHERE id=?1",
                params![env.task_id, value.to_string(), env.ts_ms, env.seq],
            )?,
            _ => return Ok(()),
        },
        _ => return Ok(()),
    };
    Ok(())
}
