#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tl_core::model::{EventContext, EventType, TaskStatus};

/// One immutable, sequenced record from the event log.
///
/// `seq` is local to the owning database; `event_id` is globally unique and
/// sortable (UUIDv7) and is what import deduplicates on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub seq: i64,
    pub event_id: String,
    pub task_id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<String>,
    pub ts_ms: i64,
}

/// Projected task aggregate as read back from the snapshot tables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub title: String,
    pub project: String,
    pub status: TaskStatus,
    pub parent_id: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub links: Vec<String>,
    pub priority: i64,
    pub due_ms: Option<i64>,
    pub metadata: BTreeMap<String, Value>,
    pub depends_on: Vec<String>,
    pub claimed_at_ms: Option<i64>,
    pub assignee: Option<String>,
    pub lease_until_ms: Option<i64>,
    pub progress: Option<i64>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    pub terminal_at_ms: Option<i64>,
    pub last_event_seq: i64,
}

#[derive(Clone, Debug, Default)]
pub struct CreateTaskRequest {
    pub title: String,
    pub project: String,
    pub parent_id: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub links: Vec<String>,
    pub priority: i64,
    pub due_ms: Option<i64>,
    pub metadata: BTreeMap<String, Value>,
    pub depends_on: Vec<String>,
    pub context: EventContext,
}

#[derive(Clone, Debug, Default)]
pub struct ClaimOptions {
    pub assignee: Option<String>,
    pub lease_ms: Option<i64>,
    pub context: EventContext,
}

#[derive(Clone, Debug, Default)]
pub struct StealOptions {
    pub assignee: Option<String>,
    /// Take the task regardless of any active lease.
    pub force: bool,
    /// Take the task only when its lease expiry is strictly in the past.
    pub if_expired: bool,
    pub lease_ms: Option<i64>,
    pub context: EventContext,
}

#[derive(Clone, Debug, Default)]
pub struct ClaimFilters {
    pub project: Option<String>,
    /// Candidate must carry every one of these tags.
    pub tags: Vec<String>,
    pub assignee: Option<String>,
    pub lease_ms: Option<i64>,
    pub context: EventContext,
}

#[derive(Clone, Debug, Default)]
pub struct AvailableFilters {
    pub project: Option<String>,
    pub tags: Vec<String>,
    /// Exclude tasks that have subtasks.
    pub leaf_only: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Comment {
    pub task_id: String,
    pub seq: i64,
    pub author: Option<String>,
    pub text: String,
    pub ts_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Checkpoint {
    pub task_id: String,
    pub seq: i64,
    pub data: Value,
    pub progress: Option<i64>,
    pub ts_ms: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ProjectStats {
    pub total: u64,
    pub backlog: u64,
    pub ready: u64,
    pub in_progress: u64,
    pub blocked: u64,
    pub done: u64,
    pub archived: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ValidateResult {
    /// Each cycle as the ordered list of task ids along it.
    pub cycles: Vec<Vec<String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PruneReport {
    pub tasks: Vec<String>,
    pub events_deleted: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
    pub malformed: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SearchHit {
    pub task_id: String,
    pub kind: String,
    pub snippet: String,
}
