#![forbid(unsafe_code)]

//! Bulk event export/import in a line-delimited JSON format.

use super::event_log::{insert_event_tx, row_to_envelope};
use super::projection::apply_event_tx;
use super::{EventEnvelope, ImportReport, StoreError, TaskStore};
use rusqlite::{OptionalExtension, params};
use std::io::{BufRead, Write};
use tl_core::model::EventContext;
use tracing::info;

impl TaskStore {
    /// Write every event, one JSON object per line, in sequence order.
    pub fn export_events(&self, out: &mut impl Write) -> Result<usize, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, event_id, task_id, type, payload_json, author, agent_id, \
             session_id, correlation_id, causation_id, ts_ms \
             FROM events ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map([], row_to_envelope)?;
        let mut count = 0;
        for row in rows {
            let envelope = row?;
            let line = serde_json::to_string(&envelope)?;
            out.write_all(line.as_bytes())?;
            out.write_all(b"\n")?;
            count += 1;
        }
        Ok(count)
    }

    /// Read the line format back. Events whose `event_id` already exists
    /// are skipped; unparseable lines are counted, not fatal. Every
    /// imported event gets a fresh local sequence number and is replayed
    /// through all projections inside the import transaction.
    pub fn import_events(&mut self, input: impl BufRead) -> Result<ImportReport, StoreError> {
        let mut report = ImportReport::default();
        let tx = self.conn.transaction()?;

        for line in input.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let envelope: EventEnvelope = match serde_json::from_str(line) {
                Ok(envelope) => envelope,
                Err(_) => {
                    report.malformed += 1;
                    continue;
                }
            };

            let exists: bool = tx
                .query_row(
                    "SELECT 1 FROM events WHERE event_id=?1",
                    params![envelope.event_id],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if exists {
                report.skipped += 1;
                continue;
            }

            let ctx = EventContext {
                author: envelope.author.clone(),
                agent_id: envelope.agent_id.clone(),
                session_id: envelope.session_id.clone(),
                correlation_id: envelope.correlation_id.clone(),
                causation_id: envelope.causation_id.clone(),
            };
            let stored = insert_event_tx(
                &tx,
                &envelope.event_id,
                &envelope.task_id,
                envelope.event_type,
                &envelope.payload,
                &ctx,
                envelope.ts_ms,
            )?;
            apply_event_tx(&tx, &stored)?;
            report.imported += 1;
        }

        tx.commit()?;
        info!(
            imported = report.imported,
            skipped = report.skipped,
            malformed = report.malformed,
            "event import finished"
        );
        Ok(report)
    }
}
