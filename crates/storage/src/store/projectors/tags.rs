#![forbid(unsafe_code)]

//! Tag projector. Owns the `task_tags` table.

use super::{payload_str, payload_str_array};
use crate::store::{EventEnvelope, StoreError};
use rusqlite::{Transaction, params};
use serde_json::Value;
use tl_core::model::{EventType, TAGS_UPDATE_FIELD};

pub(crate) fn apply(tx: &Transaction<'_>, env: &EventEnvelope) -> Result<(), StoreError> {
    match env.event_type {
        EventType::TaskCreated => {
            insert_tags(tx, &env.task_id, &payload_str_array(&env.payload, "tags"))
        }
        EventType::TaskUpdated => {
            if payload_str(&env.payload, "field") != Some(TAGS_UPDATE_FIELD) {
                return Ok(());
            }
            let Some(Value::Array(_)) = env.payload.get("value") else {
                return Ok(());
            };
            let tags = payload_str_array(&env.payload, "value");
            tx.execute("DELETE FROM task_tags WHERE task_id=?1", params![env.task_id])?;
            insert_tags(tx, &env.task_id, &tags)
        }
        _ => Ok(()),
    }
}

fn insert_tags(tx: &Transaction<'_>, task_id: &str, tags: &[String]) -> Result<(), StoreError> {
    for tag in tags {
        tx.execute(
            "INSERT OR IGNORE INTO task_tags(task_id, tag) VALUES (?1, ?2)",
            params![task_id, tag],
        )?;
    }
    Ok(())
}
