#![forbid(unsafe_code)]

mod store;

pub use store::{
    AvailableFilters, Checkpoint, ClaimFilters, ClaimOptions, Comment, CreateTaskRequest,
    EventEnvelope, ImportReport, ProjectStats, PruneReport, SearchHit, StealOptions, StoreError,
    TaskRecord, TaskStore, ValidateResult,
};
