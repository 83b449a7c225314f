//! Task and note persistence.

use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use tamsys_core::{ComplianceTask, NoteId, RecordId, TaskId, TaskNote};

use super::{enum_text, parse_enum};

/// Insert a task.
pub async fn insert_task<'e>(exec: impl PgExecutor<'e>, task: &ComplianceTask) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO compliance_tasks
            (id, record_id, title, description, category, status, assignee,
             created_by, updated_by, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(task.id.as_uuid())
    .bind(task.record_id.as_uuid())
    .bind(&task.title)
    .bind(&task.description)
    .bind(enum_text(&task.category)?)
    .bind(enum_text(&task.status)?)
    .bind(&task.assignee)
    .bind(&task.created_by)
    .bind(&task.updated_by)
    .bind(task.created_at)
    .bind(task.updated_at)
    .execute(exec)
    .await?;
    Ok(())
}

/// Overwrite a task's mutable columns.
pub async fn update_task(pool: &PgPool, task: &ComplianceTask) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE compliance_tasks
         SET title = $1, description = $2, category = $3, status = $4, assignee = $5,
             updated_by = $6, updated_at = $7
         WHERE id = $8",
    )
    .bind(&task.title)
    .bind(&task.description)
    .bind(enum_text(&task.category)?)
    .bind(enum_text(&task.status)?)
    .bind(&task.assignee)
    .bind(&task.updated_by)
    .bind(task.updated_at)
    .bind(task.id.as_uuid())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Load all tasks.
pub async fn load_tasks(pool: &PgPool) -> Result<Vec<ComplianceTask>, sqlx::Error> {
    let rows = sqlx::query_as::<_, TaskRow>(
        "SELECT id, record_id, title, description, category, status, assignee,
                created_by, updated_by, created_at, updated_at
         FROM compliance_tasks ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(TaskRow::into_record).collect()
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    record_id: Uuid,
    title: String,
    description: Option<String>,
    category: String,
    status: String,
    assignee: Option<String>,
    created_by: Option<String>,
    updated_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TaskRow {
    fn into_record(self) -> Result<ComplianceTask, sqlx::Error> {
        Ok(ComplianceTask {
            id: TaskId::from_uuid(self.id),
            record_id: RecordId::from_uuid(self.record_id),
            title: self.title,
            description: self.description,
            category: parse_enum("category", self.category)?,
            status: parse_enum("status", self.status)?,
            assignee: self.assignee,
            created_by: self.created_by,
            updated_by: self.updated_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// ── Notes ───────────────────────────────────────────────────────────

/// Insert a note.
pub async fn insert_note<'e>(exec: impl PgExecutor<'e>, note: &TaskNote) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO task_notes (id, task_id, note, author, created_at) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(note.id.as_uuid())
    .bind(note.task_id.as_uuid())
    .bind(&note.note)
    .bind(&note.author)
    .bind(note.created_at)
    .execute(exec)
    .await?;
    Ok(())
}

/// Load all notes.
pub async fn load_notes(pool: &PgPool) -> Result<Vec<TaskNote>, sqlx::Error> {
    let rows = sqlx::query_as::<_, NoteRow>(
        "SELECT id, task_id, note, author, created_at FROM task_notes ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(NoteRow::into_record).collect())
}

#[derive(sqlx::FromRow)]
struct NoteRow {
    id: Uuid,
    task_id: Uuid,
    note: String,
    author: Option<String>,
    created_at: DateTime<Utc>,
}

impl NoteRow {
    fn into_record(self) -> TaskNote {
        TaskNote {
            id: NoteId::from_uuid(self.id),
            task_id: TaskId::from_uuid(self.task_id),
            note: self.note,
            author: self.author,
            created_at: self.created_at,
        }
    }
}
