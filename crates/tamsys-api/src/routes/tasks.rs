//! # Task API
//!
//! Checklist tasks on compliance records and free-text notes on tasks.
//! Every route checks that the owning record belongs to the calling tenant.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;

use tamsys_core::{ComplianceTask, NewTask, NewTaskNote, RecordId, TaskId, TaskNote, TaskPatch};

use crate::db;
use crate::error::AppError;
use crate::extractors::{extract_query, extract_validated_json, TenantScope};
use crate::state::AppState;

/// Build the tasks router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/compliance/records/{id}/tasks",
            get(list_tasks).post(create_task),
        )
        .route("/v1/compliance/tasks/{id}", get(get_task).put(update_task))
        .route(
            "/v1/compliance/tasks/{id}/notes",
            get(list_notes).post(add_note),
        )
}

/// GET /v1/compliance/records/{id}/tasks
#[utoipa::path(
    get,
    path = "/v1/compliance/records/{id}/tasks",
    params(("id" = String, Path, format = Uuid, description = "Record ID"), TenantScope),
    responses(
        (status = 200, description = "Tasks, oldest first", body = Vec<ComplianceTask>),
        (status = 404, description = "Record not found", body = crate::error::ErrorBody),
    ),
    tag = "tasks"
)]
pub async fn list_tasks(
    State(state): State<AppState>,
    Path(record_id): Path<RecordId>,
    scope: Result<Query<TenantScope>, QueryRejection>,
) -> Result<Json<Vec<ComplianceTask>>, AppError> {
    let TenantScope { tenant_id } = extract_query(scope)?;
    let tasks: Vec<ComplianceTask> = state
        .registry
        .read()
        .tasks(tenant_id, record_id)?
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(tasks))
}

/// POST /v1/compliance/records/{id}/tasks
#[utoipa::path(
    post,
    path = "/v1/compliance/records/{id}/tasks",
    params(("id" = String, Path, format = Uuid, description = "Record ID"), TenantScope),
    request_body = NewTask,
    responses(
        (status = 201, description = "Task created", body = ComplianceTask),
        (status = 404, description = "Record not found", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "tasks"
)]
pub async fn create_task(
    State(state): State<AppState>,
    Path(record_id): Path<RecordId>,
    scope: Result<Query<TenantScope>, QueryRejection>,
    body: Result<Json<NewTask>, JsonRejection>,
) -> Result<(StatusCode, Json<ComplianceTask>), AppError> {
    let TenantScope { tenant_id } = extract_query(scope)?;
    let input = extract_validated_json(body)?;
    let task = state
        .registry
        .write()
        .create_task(tenant_id, record_id, input, Utc::now())?;

    if let Some(pool) = &state.db_pool {
        db::tasks::insert_task(pool, &task)
            .await
            .map_err(|e| AppError::from_db("task", e))?;
    }
    Ok((StatusCode::CREATED, Json(task)))
}

/// GET /v1/compliance/tasks/{id}
#[utoipa::path(
    get,
    path = "/v1/compliance/tasks/{id}",
    params(("id" = String, Path, format = Uuid, description = "Task ID"), TenantScope),
    responses(
        (status = 200, description = "Task found", body = ComplianceTask),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "tasks"
)]
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
    scope: Result<Query<TenantScope>, QueryRejection>,
) -> Result<Json<ComplianceTask>, AppError> {
    let TenantScope { tenant_id } = extract_query(scope)?;
    let task = state.registry.read().task(tenant_id, id).cloned()?;
    Ok(Json(task))
}

/// PUT /v1/compliance/tasks/{id}
#[utoipa::path(
    put,
    path = "/v1/compliance/tasks/{id}",
    params(("id" = String, Path, format = Uuid, description = "Task ID"), TenantScope),
    request_body = TaskPatch,
    responses(
        (status = 200, description = "Task updated", body = ComplianceTask),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "tasks"
)]
pub async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
    scope: Result<Query<TenantScope>, QueryRejection>,
    body: Result<Json<TaskPatch>, JsonRejection>,
) -> Result<Json<ComplianceTask>, AppError> {
    let TenantScope { tenant_id } = extract_query(scope)?;
    let patch = extract_validated_json(body)?;
    let task = state
        .registry
        .write()
        .update_task(tenant_id, id, patch, Utc::now())?;

    if let Some(pool) = &state.db_pool {
        db::tasks::update_task(pool, &task)
            .await
            .map_err(|e| AppError::from_db("task", e))?;
    }
    Ok(Json(task))
}

/// GET /v1/compliance/tasks/{id}/notes
#[utoipa::path(
    get,
    path = "/v1/compliance/tasks/{id}/notes",
    params(("id" = String, Path, format = Uuid, description = "Task ID"), TenantScope),
    responses(
        (status = 200, description = "Notes, newest first", body = Vec<TaskNote>),
        (status = 404, description = "Task not found", body = crate::error::ErrorBody),
    ),
    tag = "tasks"
)]
pub async fn list_notes(
    State(state): State<AppState>,
    Path(task_id): Path<TaskId>,
    scope: Result<Query<TenantScope>, QueryRejection>,
) -> Result<Json<Vec<TaskNote>>, AppError> {
    let TenantScope { tenant_id } = extract_query(scope)?;
    let notes: Vec<TaskNote> = state
        .registry
        .read()
        .notes(tenant_id, task_id)?
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(notes))
}

/// POST /v1/compliance/tasks/{id}/notes
#[utoipa::path(
    post,
    path = "/v1/compliance/tasks/{id}/notes",
    params(("id" = String, Path, format = Uuid, description = "Task ID"), TenantScope),
    request_body = NewTaskNote,
    responses(
        (status = 201, description = "Note added", body = TaskNote),
        (status = 404, description = "Task not found", body = crate::error::ErrorBody),
        (status = 422, description = "Empty note", body = crate::error::ErrorBody),
    ),
    tag = "tasks"
)]
pub async fn add_note(
    State(state): State<AppState>,
    Path(task_id): Path<TaskId>,
    scope: Result<Query<TenantScope>, QueryRejection>,
    body: Result<Json<NewTaskNote>, JsonRejection>,
) -> Result<(StatusCode, Json<TaskNote>), AppError> {
    let TenantScope { tenant_id } = extract_query(scope)?;
    let input = extract_validated_json(body)?;
    let note = state
        .registry
        .write()
        .add_note(tenant_id, task_id, input, Utc::now())?;

    if let Some(pool) = &state.db_pool {
        db::tasks::insert_note(pool, &note)
            .await
            .map_err(|e| AppError::from_db("note", e))?;
    }
    Ok((StatusCode::CREATED, Json(note)))
}
