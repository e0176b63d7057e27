#![forbid(unsafe_code)]

//! Dependency edge projector. Owns the `task_deps` table.

use super::{payload_str, payload_str_array};
use crate::store::{EventEnvelope, StoreError};
use rusqlite::{Transaction, params};
use tl_core::model::EventType;

pub(crate) fn apply(tx: &Transaction<'_>, env: &EventEnvelope) -> Result<(), StoreError> {
    match env.event_type {
        EventType::TaskCreated => {
            for dep in payload_str_array(&env.payload, "depends_on") {
                tx.execute(
                    "INSERT OR IGNORE INTO task_deps(task_id, depends_on_id) VALUES (?1, ?2)",
                    params![env.task_id, dep],
                )?;
            }
            Ok(())
        }
        EventType::DependencyAdded => {
            let Some(dep) = payload_str(&env.payload, "depends_on_id") else {
                return Ok(());
            };
            tx.execute(
                "INSERT OR IGNORE INTO task_deps(task_id, depends_on_id) VALUES (?1, ?2)",
                params![env.task_id, dep],
            )?;
            Ok(())
        }
        EventType::DependencyRemoved => {
            let Some(dep) = payload_str(&env.payload, "depends_on_id") else {
                return Ok(());
            };
            tx.execute(
                "DELETE FROM task_deps WHERE task_id=?1 AND depends_on_id=?2",
                params![env.task_id, dep],
            )?;
            Ok(())
        }
        _ => Ok(()),
    }
}
