#![forbid(unsafe_code)]

use tl_core::model::TaskStatus;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite: {0}")]
    Sql(rusqlite::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("validation: {0}")]
    Validation(String),
    #[error("task not found: {task_id}")]
    NotFound { task_id: String },
    #[error("unknown project: {0}")]
    UnknownProject(String),
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },
    #[error("task {task_id} is not claimable (status={status})")]
    NotClaimable { task_id: String, status: TaskStatus },
    #[error("task {task_id} is {actual}, expected {expected}")]
    NotInStatus {
        task_id: String,
        expected: TaskStatus,
        actual: TaskStatus,
    },
    #[error("task {0} is already archived")]
    AlreadyArchived(String),
    #[error("task {task_id} lease held by {holder:?} until {lease_until_ms:?}")]
    LeaseActive {
        task_id: String,
        holder: Option<String>,
        lease_until_ms: Option<i64>,
    },
    #[error("dependency cycle: {}", path.join(" -> "))]
    DependencyCycle { path: Vec<String> },
    #[error("ambiguous prefix {prefix:?}: {} matches", matches.len())]
    AmbiguousPrefix {
        prefix: String,
        /// (task id, title) for every candidate.
        matches: Vec<(String, String)>,
    },
    #[error("events log is append-only")]
    AppendOnlyViolation,
    #[error("prune incomplete: {0}")]
    PruneIncomplete(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        // The append-only trigger on the event log surfaces as a generic
        // SQLite abort; give it its own variant.
        if let rusqlite::Error::SqliteFailure(_, Some(message)) = &err {
            if message.contains("append-only") {
                return Self::AppendOnlyViolation;
            }
        }
        Self::Sql(err)
    }
}

impl StoreError {
    /// Stable machine-readable tag per error class.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "IO",
            Self::Sql(_) => "SQL",
            Self::Json(_) => "JSON",
            Self::InvalidInput(_) | Self::Validation(_) => "VALIDATION",
            Self::NotFound { .. } | Self::UnknownProject(_) => "NOT_FOUND",
            Self::InvalidTransition { .. }
            | Self::NotClaimable { .. }
            | Self::NotInStatus { .. }
            | Self::AlreadyArchived(_)
            | Self::LeaseActive { .. } => "STATE_CONFLICT",
            Self::DependencyCycle { .. } => "DEPENDENCY_CYCLE",
            Self::AmbiguousPrefix { .. } => "AMBIGUOUS_PREFIX",
            Self::AppendOnlyViolation => "APPEND_ONLY",
            Self::PruneIncomplete(_) => "PRUNE_INCOMPLETE",
        }
    }
}
