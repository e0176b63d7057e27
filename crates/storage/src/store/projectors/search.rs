#![forbid(unsafe_code)]

//! Text search projector. Owns the `search_index` table.
//!
//! Rows are keyed (task_id, kind, ref_seq). Title and description live at
//! ref_seq 0 and are replaced in place on update; each comment gets its own
//! row keyed by the event seq that produced it.

use super::payload_str;
use crate::store::{EventEnvelope, StoreError};
use rusqlite::{Transaction, params};
use serde_json::Value;
use tl_core::model::EventType;

pub(crate) fn apply(tx: &Transaction<'_>, env: &EventEnvelope) -> Result<(), StoreError> {
    match env.event_type {
        EventType::TaskCreated => {
            if let Some(title) = payload_str(&env.payload, "title") {
                upsert(tx, &env.task_id, "title", 0, title)?;
            }
            if let Some(description) = payload_str(&env.payload, "description") {
                upsert(tx, &env.task_id, "description", 0, description)?;
            }
            Ok(())
        }
        EventType::TaskUpdated => {
            let value = env.payload.get("value");
            match payload_str(&env.payload, "field") {
                Some("title") => {
                    if let Some(title) = value.and_then(Value::as_str) {
                        upsert(tx, &env.task_id, "title", 0, title)?;
                    }
                }
                Some("description") => match value {
                    Some(Value::String(s)) => upsert(tx, &env.task_id, "description", 0, s)?,
                    Some(Value::Null) | None => {
                        tx.execute(
                            "DELETE FROM search_index \
                             WHERE task_id=?1 AND kind='description' AND ref_seq=0",
                            params![env.task_id],
                        )?;
                    }
                    _ => {}
                },
                _ => {}
            }
            Ok(())
        }
        EventType::CommentAdded => {
            let Some(text) = payload_str(&env.payload, "text") else {
                return Ok(());
            };
            upsert(tx, &env.task_id, "comment", env.seq, text)
        }
        _ => Ok(()),
    }
}

fn upsert(
    tx: &Transaction<'_>,
    task_id: &str,
    kind: &str,
    ref_seq: i64,
    content: &str,
) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO search_index(task_id, kind, ref_seq, content) VALUES (?1, ?2, ?3, ?4) \
         ON CONFLICT(task_id, kind, ref_seq) DO UPDATE SET content=excluded.content",
        params![task_id, kind, ref_seq, content],
    )?;
    Ok(())
}
