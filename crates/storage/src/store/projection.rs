#![forbid(unsafe_code)]

use super::{EventEnvelope, StoreError, TaskStore, now_ms, projectors};
use rusqlite::{OptionalExtension, Transaction, params};
use tracing::{debug, info};

const REPLAY_BATCH: usize = 500;

/// Closed set of projectors. Each owns exactly one derived-table family and
/// never reads another projector's tables; dispatch is an exhaustive match,
/// not open-ended registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Projector {
    Tasks,
    Deps,
    Tags,
    Notes,
    Search,
    Projects,
}

impl Projector {
    pub(crate) const ALL: [Projector; 6] = [
        Projector::Tasks,
        Projector::Deps,
        Projector::Tags,
        Projector::Notes,
        Projector::Search,
        Projector::Projects,
    ];

    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Tasks => "tasks",
            Self::Deps => "deps",
            Self::Tags => "tags",
            Self::Notes => "notes",
            Self::Search => "search",
            Self::Projects => "projects",
        }
    }

    /// Apply one event to this projector's tables. A structurally invalid
    /// event is skipped without error so one bad historical row cannot
    /// stall replay.
    pub(crate) fn apply(
        self,
        tx: &Transaction<'_>,
        envelope: &EventEnvelope,
    ) -> Result<(), StoreError> {
        match self {
            Self::Tasks => projectors::tasks::apply(tx, envelope),
            Self::Deps => projectors::deps::apply(tx, envelope),
            Self::Tags => projectors::tags::apply(tx, envelope),
            Self::Notes => projectors::notes::apply(tx, envelope),
            Self::Search => projectors::search::apply(tx, envelope),
            Self::Projects => projectors::projects::apply(tx, envelope),
        }
    }

    /// Delete every derived row this projector owns.
    pub(crate) fn reset(self, tx: &Transaction<'_>) -> Result<(), StoreError> {
        match self {
            Self::Tasks => tx.execute("DELETE FROM tasks", [])?,
            Self::Deps => tx.execute("DELETE FROM task_deps", [])?,
            Self::Tags => tx.execute("DELETE FROM task_tags", [])?,
            Self::Notes => {
                tx.execute("DELETE FROM comments", [])?;
                tx.execute("DELETE FROM checkpoints", [])?
            }
            Self::Search => tx.execute("DELETE FROM search_index", [])?,
            Self::Projects => tx.execute("DELETE FROM projects", [])?,
        };
        Ok(())
    }
}

/// Apply one freshly appended event to every projector and advance every
/// cursor to its sequence number. Runs inside the append's transaction.
pub(crate) fn apply_event_tx(
    tx: &Transaction<'_>,
    envelope: &EventEnvelope,
) -> Result<(), StoreError> {
    for projector in Projector::ALL {
        projector.apply(tx, envelope)?;
    }
    advance_cursors_tx(tx, envelope.seq)?;
    Ok(())
}

fn advance_cursors_tx(tx: &Transaction<'_>, seq: i64) -> Result<(), StoreError> {
    let ts = now_ms();
    for projector in Projector::ALL {
        tx.execute(
            "INSERT INTO projection_cursors(projector, last_seq, updated_at_ms) \
             VALUES (?1, ?2, ?3) \
             ON CONFLICT(projector) DO UPDATE SET \
               last_seq=excluded.last_seq, updated_at_ms=excluded.updated_at_ms",
            params![projector.name(), seq, ts],
        )?;
    }
    Ok(())
}

impl TaskStore {
    /// Clear every projection and replay the whole event log from sequence
    /// one. Safe on empty, partially corrupted, or fully populated derived
    /// tables; running it twice yields identical tables.
    pub fn rebuild_all(&mut self) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;

        for projector in Projector::ALL {
            projector.reset(&tx)?;
        }
        advance_cursors_tx(&tx, 0)?;

        let mut last_seq = 0i64;
        let mut replayed = 0usize;
        loop {
            let batch = {
                let mut stmt = tx.prepare(
                    "SELECT seq, event_id, task_id, type, payload_json, author, agent_id, \
                            session_id, correlation_id, causation_id, ts_ms \
                     FROM events WHERE seq > ?1 ORDER BY seq ASC LIMIT ?2",
                )?;
                let rows = stmt.query_map(
                    params![last_seq, REPLAY_BATCH as i64],
                    super::event_log::row_to_envelope,
                )?;
                rows.collect::<Result<Vec<_>, _>>()?
            };
            if batch.is_empty() {
                break;
            }
            for envelope in &batch {
                for projector in Projector::ALL {
                    projector.apply(&tx, envelope)?;
                }
                last_seq = envelope.seq;
            }
            replayed += batch.len();
            advance_cursors_tx(&tx, last_seq)?;
        }

        tx.commit()?;
        info!(replayed, last_seq, "projections rebuilt from event log");
        Ok(())
    }

    /// Registered projector names, in application order.
    pub fn projector_names(&self) -> Vec<&'static str> {
        Projector::ALL.iter().map(|p| p.name()).collect()
    }

    /// Replay cursor for one projector, if it has ever applied an event.
    pub fn projection_cursor(&self, projector: &str) -> Result<Option<i64>, StoreError> {
        debug!(projector, "projection_cursor");
        Ok(self
            .conn
            .query_row(
                "SELECT last_seq FROM projection_cursors WHERE projector=?1",
                params![projector],
                |row| row.get::<_, i64>(0),
            )
            .optional()?)
    }
}
