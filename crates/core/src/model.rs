#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Task lifecycle status. `Archived` is the only state with no legal exit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Backlog,
    Ready,
    InProgress,
    Blocked,
    Done,
    Archived,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Backlog => "backlog",
            Self::Ready => "ready",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Done => "done",
            Self::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "backlog" => Some(Self::Backlog),
            "ready" => Some(Self::Ready),
            "in_progress" => Some(Self::InProgress),
            "blocked" => Some(Self::Blocked),
            "done" => Some(Self::Done),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }

    /// Terminal for pruning purposes: the task will not be worked on again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Archived)
    }

    /// Every transition is permitted except leaving `archived`.
    /// Self-transitions are legal no-ops decided by the caller.
    pub fn can_transition_to(self, to: TaskStatus) -> bool {
        self != Self::Archived || to == Self::Archived
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of event types appended to the log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TaskCreated,
    StatusChanged,
    TaskMoved,
    TaskUpdated,
    TaskArchived,
    CommentAdded,
    CheckpointRecorded,
    DependencyAdded,
    DependencyRemoved,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaskCreated => "task_created",
            Self::StatusChanged => "status_changed",
            Self::TaskMoved => "task_moved",
            Self::TaskUpdated => "task_updated",
            Self::TaskArchived => "task_archived",
            Self::CommentAdded => "comment_added",
            Self::CheckpointRecorded => "checkpoint_recorded",
            Self::DependencyAdded => "dependency_added",
            Self::DependencyRemoved => "dependency_removed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "task_created" => Some(Self::TaskCreated),
            "status_changed" => Some(Self::StatusChanged),
            "task_moved" => Some(Self::TaskMoved),
            "task_updated" => Some(Self::TaskUpdated),
            "task_archived" => Some(Self::TaskArchived),
            "comment_added" => Some(Self::CommentAdded),
            "checkpoint_recorded" => Some(Self::CheckpointRecorded),
            "dependency_added" => Some(Self::DependencyAdded),
            "dependency_removed" => Some(Self::DependencyRemoved),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who/what issued a command. All fields optional; attached verbatim to the
/// emitted event envelope.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventContext {
    pub author: Option<String>,
    pub agent_id: Option<String>,
    pub session_id: Option<String>,
    pub correlation_id: Option<String>,
    pub causation_id: Option<String>,
}

/// Payload bounds enforced before any event row is written.
pub mod limits {
    pub const MAX_TITLE_LEN: usize = 500;
    pub const MAX_DESCRIPTION_LEN: usize = 10_000;
    pub const MAX_COMMENT_LEN: usize = 10_000;
    pub const MAX_TAGS: usize = 32;
    pub const MAX_TAG_LEN: usize = 100;
    pub const MAX_LINKS: usize = 32;
    pub const MAX_LINK_LEN: usize = 2_000;
    pub const MAX_METADATA_KEYS: usize = 64;
    pub const MAX_METADATA_VALUE_LEN: usize = 1_000;
    pub const MAX_CHECKPOINT_BYTES: usize = 10_000;
    pub const MAX_DEPENDS_ON: usize = 64;
    pub const MIN_PRIORITY: i64 = 0;
    pub const MAX_PRIORITY: i64 = 10;
    pub const MIN_PROGRESS: i64 = 0;
    pub const MAX_PROGRESS: i64 = 100;
}

/// Single-column fields a `task_updated` event may name. Anything else is
/// rejected at append time and skipped by projectors on replay; `tags` is
/// handled by the tags projection, never by the snapshot.
pub const SNAPSHOT_UPDATE_FIELDS: &[&str] = &[
    "title",
    "description",
    "priority",
    "due_ms",
    "links",
    "metadata",
];

pub const TAGS_UPDATE_FIELD: &str = "tags";

pub fn is_update_field_allowed(field: &str) -> bool {
    field == TAGS_UPDATE_FIELD || SNAPSHOT_UPDATE_FIELDS.contains(&field)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        for status in [
            TaskStatus::Backlog,
            TaskStatus::Ready,
            TaskStatus::InProgress,
            TaskStatus::Blocked,
            TaskStatus::Done,
            TaskStatus::Archived,
        ] {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::parse("paused"), None);
    }

    #[test]
    fn archived_is_the_only_dead_end() {
        let all = [
            TaskStatus::Backlog,
            TaskStatus::Ready,
            TaskStatus::InProgress,
            TaskStatus::Blocked,
            TaskStatus::Done,
            TaskStatus::Archived,
        ];
        for from in all {
            for to in all {
                let allowed = from.can_transition_to(to);
                if from == TaskStatus::Archived {
                    assert_eq!(allowed, to == TaskStatus::Archived, "{from} -> {to}");
                } else {
                    assert!(allowed, "{from} -> {to} must be permitted");
                }
            }
        }
    }

    #[test]
    fn event_type_round_trips() {
        for ty in [
            EventType::TaskCreated,
            EventType::StatusChanged,
            EventType::TaskMoved,
            EventType::TaskUpdated,
            EventType::TaskArchived,
            EventType::CommentAdded,
            EventType::CheckpointRecorded,
            EventType::DependencyAdded,
            EventType::DependencyRemoved,
        ] {
            assert_eq!(EventType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(EventType::parse("task_deleted"), None);
    }

    #[test]
    fn update_field_whitelist() {
        assert!(is_update_field_allowed("title"));
        assert!(is_update_field_allowed("tags"));
        assert!(!is_update_field_allowed("status"));
        assert!(!is_update_field_allowed("title, status"));
        assert!(!is_update_field_allowed("assignee"));
    }
}
