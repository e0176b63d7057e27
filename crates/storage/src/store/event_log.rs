#![forbid(unsafe_code)]

use super::{EventEnvelope, StoreError, TaskStore, now_ms};
use rusqlite::{Row, Transaction, params};
use serde_json::Value;
use tl_core::ids::ProjectName;
use tl_core::model::{EventContext, EventType, TaskStatus, is_update_field_allowed, limits};
use uuid::Uuid;

/// Append one validated event inside the caller's transaction and return the
/// persisted envelope with its assigned sequence number.
pub(crate) fn append_event_tx(
    tx: &Transaction<'_>,
    task_id: &str,
    event_type: EventType,
    payload: Value,
    ctx: &EventContext,
) -> Result<EventEnvelope, StoreError> {
    validate_payload(event_type, &payload)?;

    let ts_ms = now_ms();
    let event_id = Uuid::now_v7().to_string();
    insert_event_tx(
        tx,
        &event_id,
        task_id,
        event_type,
        &payload,
        ctx,
        ts_ms,
    )
}

/// Raw insert used by both `append_event_tx` and import (which carries its
/// own event_id and timestamp).
pub(crate) fn insert_event_tx(
    tx: &Transaction<'_>,
    event_id: &str,
    task_id: &str,
    event_type: EventType,
    payload: &Value,
    ctx: &EventContext,
    ts_ms: i64,
) -> Result<EventEnvelope, StoreError> {
    let payload_json = serde_json::to_string(payload)?;
    tx.execute(
        "INSERT INTO events(event_id, task_id, type, payload_json, author, agent_id, session_id, correlation_id, causation_id, ts_ms) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            event_id,
            task_id,
            event_type.as_str(),
            payload_json,
            ctx.author,
            ctx.agent_id,
            ctx.session_id,
            ctx.correlation_id,
            ctx.causation_id,
            ts_ms,
        ],
    )?;
    let seq = tx.last_insert_rowid();

    Ok(EventEnvelope {
        seq,
        event_id: event_id.to_string(),
        task_id: task_id.to_string(),
        event_type,
        payload: payload.clone(),
        author: ctx.author.clone(),
        agent_id: ctx.agent_id.clone(),
        session_id: ctx.session_id.clone(),
        correlation_id: ctx.correlation_id.clone(),
        causation_id: ctx.causation_id.clone(),
        ts_ms,
    })
}

pub(crate) fn row_to_envelope(row: &Row<'_>) -> rusqlite::Result<EventEnvelope> {
    let type_str = row.get::<_, String>(3)?;
    let payload_json = row.get::<_, String>(4)?;
    Ok(EventEnvelope {
        seq: row.get(0)?,
        event_id: row.get(1)?,
        task_id: row.get(2)?,
        event_type: EventType::parse(&type_str).unwrap_or(EventType::TaskUpdated),
        payload: serde_json::from_str(&payload_json).unwrap_or(Value::Null),
        author: row.get(5)?,
        agent_id: row.get(6)?,
        session_id: row.get(7)?,
        correlation_id: row.get(8)?,
        causation_id: row.get(9)?,
        ts_ms: row.get(10)?,
    })
}

const EVENT_COLUMNS: &str = "seq, event_id, task_id, type, payload_json, author, agent_id, \
                             session_id, correlation_id, causation_id, ts_ms";

impl TaskStore {
    /// All events for one task, sequence ascending.
    pub fn events_by_task(&self, task_id: &str) -> Result<Vec<EventEnvelope>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE task_id=?1 ORDER BY seq ASC"
        ))?;
        let rows = stmt.query_map(params![task_id], row_to_envelope)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Events with `seq > since`, sequence ascending, at most `limit`.
    pub fn events_since(&self, since: i64, limit: usize) -> Result<Vec<EventEnvelope>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE seq > ?1 ORDER BY seq ASC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![since, limit as i64], row_to_envelope)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Highest assigned sequence number, 0 when the log is empty.
    pub fn max_event_seq(&self) -> Result<i64, StoreError> {
        Ok(self.conn.query_row(
            "SELECT COALESCE(MAX(seq), 0) FROM events",
            [],
            |row| row.get::<_, i64>(0),
        )?)
    }
}

fn reject(message: impl Into<String>) -> StoreError {
    StoreError::Validation(message.into())
}

/// Validate an event payload against its type's schema. Nothing is written
/// when this fails, so no partial or invalid event can reach the log.
pub(crate) fn validate_payload(event_type: EventType, payload: &Value) -> Result<(), StoreError> {
    let obj = payload
        .as_object()
        .ok_or_else(|| reject("payload must be a JSON object"))?;

    match event_type {
        EventType::TaskCreated => {
            check_known_fields(
                obj,
                &[
                    "title",
                    "project",
                    "parent_id",
                    "description",
                    "tags",
                    "links",
                    "priority",
                    "due_ms",
                    "metadata",
                    "depends_on",
                    "status",
                ],
            )?;
            check_string(obj, "title", true, 1, limits::MAX_TITLE_LEN)?;
            let project = obj
                .get("project")
                .and_then(Value::as_str)
                .ok_or_else(|| reject("project is required"))?;
            ProjectName::try_new(project).map_err(|_| reject("invalid project name"))?;
            check_opt_string(obj, "parent_id", 1, 256)?;
            check_opt_string(obj, "description", 0, limits::MAX_DESCRIPTION_LEN)?;
            check_string_array(obj, "tags", limits::MAX_TAGS, limits::MAX_TAG_LEN)?;
            check_string_array(obj, "links", limits::MAX_LINKS, limits::MAX_LINK_LEN)?;
            check_int_range(obj, "priority", limits::MIN_PRIORITY, limits::MAX_PRIORITY)?;
            check_int_range(obj, "due_ms", 0, i64::MAX)?;
            check_metadata(obj.get("metadata"))?;
            check_string_array(obj, "depends_on", limits::MAX_DEPENDS_ON, 256)?;
            if let Some(status) = obj.get("status") {
                let status = status
                    .as_str()
                    .ok_or_else(|| reject("status must be a string"))?;
                TaskStatus::parse(status).ok_or_else(|| reject("unknown status"))?;
            }
        }
        EventType::StatusChanged => {
            check_known_fields(
                obj,
                &[
                    "from",
                    "to",
                    "claimed",
                    "released",
                    "stolen",
                    "assignee",
                    "claimed_at_ms",
                    "lease_until_ms",
                ],
            )?;
            for key in ["from", "to"] {
                let status = obj
                    .get(key)
                    .and_then(Value::as_str)
                    .ok_or_else(|| reject(format!("{key} status is required")))?;
                TaskStatus::parse(status).ok_or_else(|| reject("unknown status"))?;
            }
            check_opt_string(obj, "assignee", 1, 256)?;
            check_int_range(obj, "claimed_at_ms", 0, i64::MAX)?;
            check_int_range(obj, "lease_until_ms", 0, i64::MAX)?;
        }
        EventType::TaskMoved => {
            check_known_fields(obj, &["project"])?;
            let project = obj
                .get("project")
                .and_then(Value::as_str)
                .ok_or_else(|| reject("project is required"))?;
            ProjectName::try_new(project).map_err(|_| reject("invalid project name"))?;
        }
        EventType::TaskUpdated => {
            check_known_fields(obj, &["field", "value"])?;
            let field = obj
                .get("field")
                .and_then(Value::as_str)
                .ok_or_else(|| reject("field is required"))?;
            if !is_update_field_allowed(field) {
                return Err(reject(format!("field {field:?} is not updatable")));
            }
            let value = obj.get("value").unwrap_or(&Value::Null);
            validate_update_value(field, value)?;
        }
        EventType::TaskArchived => {
            check_known_fields(obj, &["reason"])?;
            check_opt_string(obj, "reason", 0, limits::MAX_COMMENT_LEN)?;
        }
        EventType::CommentAdded => {
            check_known_fields(obj, &["text"])?;
            check_string(obj, "text", true, 1, limits::MAX_COMMENT_LEN)?;
        }
        EventType::CheckpointRecorded => {
            check_known_fields(obj, &["data", "progress"])?;
            let data = obj.get("data").unwrap_or(&Value::Null);
            let bytes = serde_json::to_string(data).map(|s| s.len()).unwrap_or(0);
            if bytes > limits::MAX_CHECKPOINT_BYTES {
                return Err(reject("checkpoint data too large"));
            }
            check_int_range(obj, "progress", limits::MIN_PROGRESS, limits::MAX_PROGRESS)?;
        }
        EventType::DependencyAdded | EventType::DependencyRemoved => {
            check_known_fields(obj, &["depends_on_id"])?;
            check_string(obj, "depends_on_id", true, 1, 256)?;
        }
    }

    Ok(())
}

fn validate_update_value(field: &str, value: &Value) -> Result<(), StoreError> {
    match field {
        "title" => match value.as_str() {
            Some(s) if !s.is_empty() && s.len() <= limits::MAX_TITLE_LEN => Ok(()),
            _ => Err(reject("title must be a non-empty string")),
        },
        "description" => match value {
            Value::Null => Ok(()),
            Value::String(s) if s.len() <= limits::MAX_DESCRIPTION_LEN => Ok(()),
            _ => Err(reject("description must be a string or null")),
        },
        "priority" => match value.as_i64() {
            Some(p) if (limits::MIN_PRIORITY..=limits::MAX_PRIORITY).contains(&p) => Ok(()),
            _ => Err(reject("priority out of range")),
        },
        "due_ms" => match value {
            Value::Null => Ok(()),
            v if v.as_i64().is_some_and(|n| n >= 0) => Ok(()),
            _ => Err(reject("due_ms must be a non-negative integer or null")),
        },
        "links" => check_string_array_value(value, limits::MAX_LINKS, limits::MAX_LINK_LEN),
        "tags" => check_string_array_value(value, limits::MAX_TAGS, limits::MAX_TAG_LEN),
        "metadata" => check_metadata(Some(value)),
        _ => Err(reject(format!("field {field:?} is not updatable"))),
    }
}

fn check_known_fields(
    obj: &serde_json::Map<String, Value>,
    allowed: &[&str],
) -> Result<(), StoreError> {
    for key in obj.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(reject(format!("unknown field {key:?}")));
        }
    }
    Ok(())
}

fn check_string(
    obj: &serde_json::Map<String, Value>,
    key: &str,
    required: bool,
    min_len: usize,
    max_len: usize,
) -> Result<(), StoreError> {
    match obj.get(key) {
        Some(Value::String(s)) if s.len() >= min_len && s.len() <= max_len => Ok(()),
        Some(_) => Err(reject(format!("{key} must be a string of 1..={max_len} bytes"))),
        None if required => Err(reject(format!("{key} is required"))),
        None => Ok(()),
    }
}

fn check_opt_string(
    obj: &serde_json::Map<String, Value>,
    key: &str,
    min_len: usize,
    max_len: usize,
) -> Result<(), StoreError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(()),
        Some(Value::String(s)) if s.len() >= min_len && s.len() <= max_len => Ok(()),
        Some(_) => Err(reject(format!("{key} must be a string of at most {max_len} bytes"))),
    }
}

fn check_string_array(
    obj: &serde_json::Map<String, Value>,
    key: &str,
    max_items: usize,
    max_len: usize,
) -> Result<(), StoreError> {
    match obj.get(key) {
        None => Ok(()),
        Some(value) => check_string_array_value(value, max_items, max_len),
    }
}

fn check_string_array_value(
    value: &Value,
    max_items: usize,
    max_len: usize,
) -> Result<(), StoreError> {
    let items = value
        .as_array()
        .ok_or_else(|| reject("expected an array of strings"))?;
    if items.len() > max_items {
        return Err(reject(format!("array exceeds {max_items} items")));
    }
    for item in items {
        match item.as_str() {
            Some(s) if !s.is_empty() && s.len() <= max_len => {}
            _ => return Err(reject("array items must be non-empty bounded strings")),
        }
    }
    Ok(())
}

fn check_int_range(
    obj: &serde_json::Map<String, Value>,
    key: &str,
    min: i64,
    max: i64,
) -> Result<(), StoreError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(()),
        Some(value) => match value.as_i64() {
            Some(n) if n >= min && n <= max => Ok(()),
            _ => Err(reject(format!("{key} must be an integer in {min}..={max}"))),
        },
    }
}

fn check_metadata(value: Option<&Value>) -> Result<(), StoreError> {
    let Some(value) = value else { return Ok(()) };
    let obj = value
        .as_object()
        .ok_or_else(|| reject("metadata must be an object"))?;
    if obj.len() > limits::MAX_METADATA_KEYS {
        return Err(reject("metadata has too many keys"));
    }
    for (key, entry) in obj {
        if key.is_empty() || key.len() > limits::MAX_TAG_LEN {
            return Err(reject("metadata key out of bounds"));
        }
        let bytes = serde_json::to_string(entry).map(|s| s.len()).unwrap_or(0);
        if bytes > limits::MAX_METADATA_VALUE_LEN {
            return Err(reject(format!("metadata value for {key:?} too large")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_unknown_fields() {
        let err = validate_payload(
            EventType::CommentAdded,
            &json!({"text": "hi", "status": "done"}),
        )
        .expect_err("unknown field must be rejected");
        assert_eq!(err.code(), "VALIDATION");
    }

    #[test]
    fn rejects_non_whitelisted_update_field() {
        let err = validate_payload(
            EventType::TaskUpdated,
            &json!({"field": "status", "value": "done"}),
        )
        .expect_err("status is not an updatable field");
        assert_eq!(err.code(), "VALIDATION");
    }

    #[test]
    fn rejects_out_of_range_priority() {
        let err = validate_payload(
            EventType::TaskCreated,
            &json!({"title": "t", "project": "p", "priority": 99}),
        )
        .expect_err("priority must be bounded");
        assert_eq!(err.code(), "VALIDATION");
    }

    #[test]
    fn accepts_minimal_create() {
        validate_payload(EventType::TaskCreated, &json!({"title": "t", "project": "p"}))
            .expect("minimal create payload is valid");
    }

    #[test]
    fn rejects_oversized_comment() {
        let err = validate_payload(
            EventType::CommentAdded,
            &json!({"text": "x".repeat(limits::MAX_COMMENT_LEN + 1)}),
        )
        .expect_err("oversized comment must be rejected");
        assert_eq!(err.code(), "VALIDATION");
    }
}
