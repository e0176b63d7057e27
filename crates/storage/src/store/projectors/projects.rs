#![forbid(unsafe_code)]

//! Project registry projector. Owns the `projects` table.

use super::payload_str;
use crate::store::{EventEnvelope, StoreError};
use rusqlite::{Transaction, params};
use tl_core::model::EventType;

pub(crate) fn apply(tx: &Transaction<'_>, env: &EventEnvelope) -> Result<(), StoreError> {
    match env.event_type {
        EventType::TaskCreated | EventType::TaskMoved => {
            let Some(project) = payload_str(&env.payload, "project") else {
                return Ok(());
            };
            tx.execute(
                "INSERT OR IGNORE INTO projects(name, first_seen_ms) VALUES (?1, ?2)",
                params![project, env.ts_ms],
            )?;
            Ok(())
        }
        _ => Ok(()),
    }
}
