#![forbid(unsafe_code)]

//! Comment and checkpoint projector. Owns the `comments` and `checkpoints` tables.

use super::{payload_i64, payload_str};
use crate::store::{EventEnvelope, StoreError};
use rusqlite::{Transaction, params};
use tl_core::model::EventType;

pub(crate) fn apply(tx: &Transaction<'_>, env: &EventEnvelope) -> Result<(), StoreError> {
    match env.event_type {
        EventType::CommentAdded => {
            let Some(text) = payload_str(&env.payload, "text") else {
                return Ok(());
            };
            tx.execute(
                "INSERT OR IGNORE INTO comments(task_id, seq, author, text, ts_ms) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![env.task_id, env.seq, env.author, text, env.ts_ms],
            )?;
            Ok(())
        }
        EventType::CheckpointRecorded => {
            let data = env
                .payload
                .get("data")
                .map(|v| v.to_string())
                .unwrap_or_else(|| "null".to_string());
            tx.execute(
                "INSERT OR IGNORE INTO checkpoints(task_id, seq, data_json, progress, ts_ms) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    env.task_id,
                    env.seq,
                    data,
                    payload_i64(&env.payload, "progress"),
                    env.ts_ms
                ],
            )?;
            Ok(())
        }
        _ => Ok(()),
    }
}
