//! # Compliance Tasks and Notes
//!
//! Lightweight checklist items attached to a compliance record, plus
//! free-text notes on each task. Tasks carry a [`TaskCategory`] so gap
//! analysis can count open compliance-testing work without matching on
//! titles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ValidationError;
use crate::identity::{NoteId, RecordId, TaskId};

const TITLE_MAX: usize = 200;
const PERSON_MAX: usize = 100;

/// Workflow state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Not started (default).
    #[default]
    Todo,
    /// Being worked on.
    InProgress,
    /// Finished.
    Done,
}

impl TaskStatus {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "TODO",
            Self::InProgress => "IN_PROGRESS",
            Self::Done => "DONE",
        }
    }

    /// Whether the task still needs work.
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Done)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TODO" => Ok(Self::Todo),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "DONE" => Ok(Self::Done),
            _ => Err(ValidationError::UnknownValue {
                kind: "task status",
                value: s.to_string(),
            }),
        }
    }
}

/// What kind of work a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskCategory {
    /// Lab testing toward the certificate. Counted by gap analysis.
    ComplianceTesting,
    /// Paperwork and submissions.
    Documentation,
    /// Product label artwork.
    Labeling,
    /// Renewal of an expiring certificate.
    Renewal,
    /// Anything else (default).
    #[default]
    Other,
}

impl TaskCategory {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ComplianceTesting => "COMPLIANCE_TESTING",
            Self::Documentation => "DOCUMENTATION",
            Self::Labeling => "LABELING",
            Self::Renewal => "RENEWAL",
            Self::Other => "OTHER",
        }
    }
}

impl std::fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COMPLIANCE_TESTING" => Ok(Self::ComplianceTesting),
            "DOCUMENTATION" => Ok(Self::Documentation),
            "LABELING" => Ok(Self::Labeling),
            "RENEWAL" => Ok(Self::Renewal),
            "OTHER" => Ok(Self::Other),
            _ => Err(ValidationError::UnknownValue {
                kind: "task category",
                value: s.to_string(),
            }),
        }
    }
}

/// A checklist item owned by a compliance record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ComplianceTask {
    /// Identifier.
    pub id: TaskId,
    /// Owning record.
    pub record_id: RecordId,
    /// Short title.
    pub title: String,
    /// Longer description.
    pub description: Option<String>,
    /// Kind of work.
    pub category: TaskCategory,
    /// Workflow state.
    pub status: TaskStatus,
    /// Person responsible.
    pub assignee: Option<String>,
    /// Who created the task.
    pub created_by: Option<String>,
    /// Who last changed the task.
    pub updated_by: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a [`ComplianceTask`].
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewTask {
    /// Short title.
    pub title: String,
    /// Longer description.
    #[serde(default)]
    pub description: Option<String>,
    /// Defaults to OTHER.
    #[serde(default)]
    pub category: TaskCategory,
    /// Defaults to TODO.
    #[serde(default)]
    pub status: TaskStatus,
    /// Person responsible.
    #[serde(default)]
    pub assignee: Option<String>,
    /// Creator.
    #[serde(default)]
    pub created_by: Option<String>,
}

impl NewTask {
    /// Validate field constraints.
    pub fn validate(&self) -> Result<(), ValidationError> {
        crate::check_text("title", &self.title, TITLE_MAX)?;
        if let Some(assignee) = &self.assignee {
            crate::check_text("assignee", assignee, PERSON_MAX)?;
        }
        Ok(())
    }
}

/// Partial update of a [`ComplianceTask`].
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct TaskPatch {
    /// New title.
    #[serde(default)]
    pub title: Option<String>,
    /// New description.
    #[serde(default)]
    pub description: Option<String>,
    /// New category.
    #[serde(default)]
    pub category: Option<TaskCategory>,
    /// New status.
    #[serde(default)]
    pub status: Option<TaskStatus>,
    /// New assignee.
    #[serde(default)]
    pub assignee: Option<String>,
    /// Who made the change.
    #[serde(default)]
    pub updated_by: Option<String>,
}

impl TaskPatch {
    /// Validate field constraints.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(title) = &self.title {
            crate::check_text("title", title, TITLE_MAX)?;
        }
        if let Some(assignee) = &self.assignee {
            crate::check_text("assignee", assignee, PERSON_MAX)?;
        }
        Ok(())
    }
}

/// A free-text note on a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TaskNote {
    /// Identifier.
    pub id: NoteId,
    /// Owning task.
    pub task_id: TaskId,
    /// Note body.
    pub note: String,
    /// Author.
    pub author: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Input for adding a [`TaskNote`].
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewTaskNote {
    /// Note body.
    pub note: String,
    /// Author.
    #[serde(default)]
    pub author: Option<String>,
}

impl NewTaskNote {
    /// Validate field constraints.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.note.trim().is_empty() {
            return Err(ValidationError::EmptyField("note"));
        }
        Ok(())
    }
}

/// Aggregate task counts for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub struct TaskCounts {
    /// All tasks.
    pub total: usize,
    /// DONE tasks.
    pub done: usize,
    /// IN_PROGRESS tasks.
    pub in_progress: usize,
    /// Remaining (TODO) tasks.
    pub pending: usize,
}

impl TaskCounts {
    /// Tally statuses.
    pub fn tally<'a>(statuses: impl IntoIterator<Item = &'a TaskStatus>) -> Self {
        let mut counts = Self::default();
        for status in statuses {
            counts.total += 1;
            match status {
                TaskStatus::Done => counts.done += 1,
                TaskStatus::InProgress => counts.in_progress += 1,
                TaskStatus::Todo => counts.pending += 1,
            }
        }
        counts
    }

    /// Completed share, rounded down to a whole percent; 0 with no tasks.
    pub fn progress_percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        // done <= total, so the quotient is at most 100.
        u8::try_from(self.done * 100 / self.total).unwrap_or(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn counts_are_tallied_per_status() {
        let statuses = [
            TaskStatus::Done,
            TaskStatus::Todo,
            TaskStatus::InProgress,
            TaskStatus::Done,
        ];
        let counts = TaskCounts::tally(&statuses);
        assert_eq!(
            counts,
            TaskCounts {
                total: 4,
                done: 2,
                in_progress: 1,
                pending: 1
            }
        );
        assert_eq!(counts.progress_percent(), 50);
    }

    #[test]
    fn progress_rounds_down() {
        let counts = TaskCounts::tally(&[TaskStatus::Done, TaskStatus::Todo, TaskStatus::Todo]);
        assert_eq!(counts.progress_percent(), 33);
    }

    #[test]
    fn progress_is_zero_without_tasks() {
        assert_eq!(TaskCounts::default().progress_percent(), 0);
    }

    #[test]
    fn new_task_defaults() {
        let task: NewTask = serde_json::from_str(r#"{"title": "Book lab slot"}"#).unwrap();
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.category, TaskCategory::Other);
    }

    #[test]
    fn category_round_trips_through_str() {
        for category in [
            TaskCategory::ComplianceTesting,
            TaskCategory::Documentation,
            TaskCategory::Labeling,
            TaskCategory::Renewal,
            TaskCategory::Other,
        ] {
            assert_eq!(category.as_str().parse::<TaskCategory>(), Ok(category));
        }
    }

    #[test]
    fn blank_note_rejected() {
        let note = NewTaskNote {
            note: "  ".into(),
            author: None,
        };
        assert!(note.validate().is_err());
    }

    proptest! {
        #[test]
        fn counts_partition_total(done in 0usize..20, wip in 0usize..20, todo in 0usize..20) {
            let mut statuses = vec![TaskStatus::Done; done];
            statuses.extend(vec![TaskStatus::InProgress; wip]);
            statuses.extend(vec![TaskStatus::Todo; todo]);
            let counts = TaskCounts::tally(&statuses);
            prop_assert_eq!(counts.done + counts.in_progress + counts.pending, counts.total);
            prop_assert!(counts.progress_percent() <= 100);
        }
    }
}
