//! # Compliance API
//!
//! Gap analysis, compliance record CRUD, and record documents.
//!
//! Documents are uploaded as the raw request body with the attachment kind
//! and filename in the query string and the MIME type in `Content-Type`.
//! Replacing a document deletes the previous object; deleting a record
//! deletes all of its objects. Object-store failures during cleanup are
//! logged and never fail the request.

use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use tamsys_compliance::object_store::store_attachment;
use tamsys_compliance::{analyze, GapAnalysis, NewRecord, RecordFilter, RecordView};
use tamsys_core::{CountryId, DeviceId, RecordId, TenantId};
use tamsys_state::{Attachment, AttachmentKind, ComplianceRecord, ComplianceStatus, RecordUpdate};

use crate::db;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_query, TenantScope};
use crate::state::AppState;

/// Gap analysis request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct GapAnalysisRequest {
    /// Calling tenant.
    pub tenant_id: TenantId,
    /// Device to analyze.
    pub device_id: DeviceId,
    /// Target market.
    pub country_id: CountryId,
}

/// Record list query: tenant scope, filters, pagination.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RecordQuery {
    /// Calling tenant.
    #[param(value_type = String, format = Uuid)]
    pub tenant_id: TenantId,
    /// Only records for this device.
    #[param(value_type = Option<String>, format = Uuid)]
    pub device_id: Option<DeviceId>,
    /// Only records in this market.
    #[param(value_type = Option<i64>)]
    pub country_id: Option<CountryId>,
    /// Only records in this status.
    #[param(value_type = Option<String>)]
    pub status: Option<ComplianceStatus>,
    /// Items to skip.
    #[serde(default)]
    pub skip: Option<usize>,
    /// Page size (default 100, max 1000).
    #[serde(default)]
    pub limit: Option<usize>,
}

impl RecordQuery {
    fn filter(&self) -> RecordFilter {
        let defaults = RecordFilter::default();
        RecordFilter {
            device_id: self.device_id,
            country_id: self.country_id,
            status: self.status,
            skip: self.skip.unwrap_or(defaults.skip),
            limit: self.limit.unwrap_or(defaults.limit),
        }
    }
}

/// Document upload parameters.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UploadQuery {
    /// Calling tenant.
    #[param(value_type = String, format = Uuid)]
    pub tenant_id: TenantId,
    /// `certificate`, `test_report` or `label_picture`.
    #[param(value_type = String)]
    pub kind: AttachmentKind,
    /// Original filename.
    pub filename: String,
}

/// Document download parameters.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DocumentQuery {
    /// Calling tenant.
    #[param(value_type = String, format = Uuid)]
    pub tenant_id: TenantId,
    /// `certificate`, `test_report` or `label_picture`.
    #[param(value_type = String)]
    pub kind: AttachmentKind,
}

/// A stored document and a time-limited download URL.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DocumentResponse {
    /// Slot the document occupies.
    pub kind: AttachmentKind,
    /// Stored descriptor.
    pub attachment: Attachment,
    /// Presigned download URL.
    pub url: String,
    /// Seconds until the URL expires.
    pub expires_in: u64,
}

/// Build the compliance router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/compliance/gap-analysis", post(gap_analysis))
        .route(
            "/v1/compliance/records",
            get(list_records).post(create_record),
        )
        .route(
            "/v1/compliance/records/{id}",
            get(get_record).put(update_record).delete(delete_record),
        )
        .route(
            "/v1/compliance/records/{id}/document",
            get(document_url).post(upload_document),
        )
}

/// POST /v1/compliance/gap-analysis
///
/// Required certifications for a device in one market, each marked as a
/// gap or with the status of the record that covers it.
#[utoipa::path(
    post,
    path = "/v1/compliance/gap-analysis",
    request_body = GapAnalysisRequest,
    responses(
        (status = 200, description = "Gap analysis", body = GapAnalysis),
        (status = 404, description = "Unknown device or country", body = crate::error::ErrorBody),
    ),
    tag = "compliance"
)]
pub async fn gap_analysis(
    State(state): State<AppState>,
    body: Result<Json<GapAnalysisRequest>, JsonRejection>,
) -> Result<Json<GapAnalysis>, AppError> {
    let req = extract_json(body)?;
    let analysis = analyze(&state.registry.read(), req.tenant_id, req.device_id, req.country_id)?;
    tracing::debug!(
        device_id = %req.device_id,
        country_id = %req.country_id,
        total_required = analysis.total_required,
        gaps_found = analysis.gaps_found,
        "gap analysis"
    );
    Ok(Json(analysis))
}

/// POST /v1/compliance/records
#[utoipa::path(
    post,
    path = "/v1/compliance/records",
    params(TenantScope),
    request_body = NewRecord,
    responses(
        (status = 201, description = "Record created", body = ComplianceRecord),
        (status = 404, description = "Unknown device, country or certification", body = crate::error::ErrorBody),
        (status = 409, description = "Record already exists for this requirement", body = crate::error::ErrorBody),
        (status = 422, description = "ACTIVE without expiry date", body = crate::error::ErrorBody),
    ),
    tag = "compliance"
)]
pub async fn create_record(
    State(state): State<AppState>,
    scope: Result<Query<TenantScope>, QueryRejection>,
    body: Result<Json<NewRecord>, JsonRejection>,
) -> Result<(StatusCode, Json<ComplianceRecord>), AppError> {
    let TenantScope { tenant_id } = extract_query(scope)?;
    let input = extract_json(body)?;
    let record = state
        .registry
        .write()
        .create_record(tenant_id, input, Utc::now())?;

    if let Some(pool) = &state.db_pool {
        if let Err(err) = db::records::insert(pool, &record).await {
            if let Err(e) = state.registry.write().delete_record(tenant_id, record.id) {
                tracing::warn!(record_id = %record.id, error = %e, "failed to roll back record");
            }
            return Err(AppError::from_db("compliance record", err));
        }
    }

    tracing::info!(
        %tenant_id,
        record_id = %record.id,
        status = %record.status,
        "compliance record created"
    );
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /v1/compliance/records
#[utoipa::path(
    get,
    path = "/v1/compliance/records",
    params(RecordQuery),
    responses((status = 200, description = "Matching records, oldest first", body = Vec<RecordView>)),
    tag = "compliance"
)]
pub async fn list_records(
    State(state): State<AppState>,
    query: Result<Query<RecordQuery>, QueryRejection>,
) -> Result<Json<Vec<RecordView>>, AppError> {
    let query = extract_query(query)?;
    let views = state.registry.read().records(query.tenant_id, &query.filter());
    Ok(Json(views))
}

/// GET /v1/compliance/records/{id}
#[utoipa::path(
    get,
    path = "/v1/compliance/records/{id}",
    params(("id" = String, Path, format = Uuid, description = "Record ID"), TenantScope),
    responses(
        (status = 200, description = "Record with names and task progress", body = RecordView),
        (status = 404, description = "Not found or owned by another tenant", body = crate::error::ErrorBody),
    ),
    tag = "compliance"
)]
pub async fn get_record(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
    scope: Result<Query<TenantScope>, QueryRejection>,
) -> Result<Json<RecordView>, AppError> {
    let TenantScope { tenant_id } = extract_query(scope)?;
    let view = state.registry.read().record_view(tenant_id, id)?;
    Ok(Json(view))
}

/// PUT /v1/compliance/records/{id}
///
/// Users may set PENDING or ACTIVE; ACTIVE needs an expiry date, given here
/// or already on the record.
#[utoipa::path(
    put,
    path = "/v1/compliance/records/{id}",
    params(("id" = String, Path, format = Uuid, description = "Record ID"), TenantScope),
    request_body = RecordUpdate,
    responses(
        (status = 200, description = "Record updated", body = ComplianceRecord),
        (status = 404, description = "Not found or owned by another tenant", body = crate::error::ErrorBody),
        (status = 422, description = "Rejected status transition", body = crate::error::ErrorBody),
    ),
    tag = "compliance"
)]
pub async fn update_record(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
    scope: Result<Query<TenantScope>, QueryRejection>,
    body: Result<Json<RecordUpdate>, JsonRejection>,
) -> Result<Json<ComplianceRecord>, AppError> {
    let TenantScope { tenant_id } = extract_query(scope)?;
    let update = extract_json(body)?;
    let (previous, record) = {
        let mut registry = state.registry.write();
        let previous = registry.record(tenant_id, id)?.clone();
        let record = registry.update_record(tenant_id, id, &update, Utc::now())?;
        (previous, record)
    };

    if let Some(pool) = &state.db_pool {
        if let Err(err) = db::records::update(pool, &record).await {
            rollback_record(&state, &record, previous);
            return Err(AppError::from_db("compliance record", err));
        }
    }

    tracing::info!(record_id = %id, status = %record.status, "compliance record updated");
    Ok(Json(record))
}

/// DELETE /v1/compliance/records/{id}
///
/// Deletes the record with its tasks and notes, then its documents.
#[utoipa::path(
    delete,
    path = "/v1/compliance/records/{id}",
    params(("id" = String, Path, format = Uuid, description = "Record ID"), TenantScope),
    responses(
        (status = 204, description = "Record deleted"),
        (status = 404, description = "Not found or owned by another tenant", body = crate::error::ErrorBody),
    ),
    tag = "compliance"
)]
pub async fn delete_record(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
    scope: Result<Query<TenantScope>, QueryRejection>,
) -> Result<StatusCode, AppError> {
    let TenantScope { tenant_id } = extract_query(scope)?;
    let report = state.registry.write().delete_record(tenant_id, id)?;

    if let Some(pool) = &state.db_pool {
        db::records::delete(pool, id)
            .await
            .map_err(|e| AppError::from_db("compliance record", e))?;
    }
    super::cleanup_documents(&state, &report);

    tracing::info!(record_id = %id, tasks_removed = report.tasks_removed, "compliance record deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/compliance/records/{id}/document
#[utoipa::path(
    post,
    path = "/v1/compliance/records/{id}/document",
    params(("id" = String, Path, format = Uuid, description = "Record ID"), UploadQuery),
    request_body(content = Vec<u8>, content_type = "application/octet-stream", description = "Document bytes"),
    responses(
        (status = 201, description = "Document stored", body = DocumentResponse),
        (status = 404, description = "Not found or owned by another tenant", body = crate::error::ErrorBody),
        (status = 422, description = "Empty document or bad filename", body = crate::error::ErrorBody),
    ),
    tag = "compliance"
)]
pub async fn upload_document(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
    query: Result<Query<UploadQuery>, QueryRejection>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<DocumentResponse>), AppError> {
    let UploadQuery {
        tenant_id,
        kind,
        filename,
    } = extract_query(query)?;
    if body.is_empty() {
        return Err(AppError::Validation("document body must not be empty".to_string()));
    }
    if filename.trim().is_empty() {
        return Err(AppError::Validation("filename must not be empty".to_string()));
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let device_id = state.registry.read().record(tenant_id, id)?.device_id;
    let now = Utc::now();
    let attachment = store_attachment(
        state.object_store.as_ref(),
        kind,
        tenant_id,
        device_id,
        filename.trim(),
        &content_type,
        body.to_vec(),
        now,
    )?;

    let stored = {
        let mut registry = state.registry.write();
        registry.record(tenant_id, id).cloned().and_then(|before| {
            let previous = registry.set_attachment(tenant_id, id, kind, attachment.clone(), now)?;
            let record = registry.record(tenant_id, id)?.clone();
            Ok((before, previous, record))
        })
    };
    let (before, previous, record) = match stored {
        Ok(stored) => stored,
        Err(err) => {
            discard_object(&state, &attachment.path);
            return Err(err.into());
        }
    };

    if let Some(pool) = &state.db_pool {
        if let Err(err) = db::records::update(pool, &record).await {
            rollback_record(&state, &record, before);
            discard_object(&state, &attachment.path);
            return Err(AppError::from_db("compliance record", err));
        }
    }

    if let Some(previous) = previous.filter(|p| p.path != attachment.path) {
        if let Err(err) = state.object_store.delete(&previous.path) {
            tracing::warn!(path = %previous.path, error = %err, "failed to delete replaced document");
        }
    }

    let ttl = state.config.presign_ttl;
    let url = state.object_store.presigned_url(&attachment.path, ttl, now)?;
    tracing::info!(record_id = %id, %kind, path = %attachment.path, "document stored");
    Ok((
        StatusCode::CREATED,
        Json(DocumentResponse {
            kind,
            attachment,
            url,
            expires_in: ttl.as_secs(),
        }),
    ))
}

/// Undo an in-memory record change whose write-through failed.
fn rollback_record(state: &AppState, record: &ComplianceRecord, previous: ComplianceRecord) {
    if !state.registry.write().restore_record(record, previous) {
        tracing::warn!(record_id = %record.id, "record changed again, not rolled back");
    }
}

/// Delete an object no record points at.
fn discard_object(state: &AppState, path: &str) {
    if let Err(err) = state.object_store.delete(path) {
        tracing::warn!(%path, error = %err, "failed to delete orphaned document");
    }
}

/// GET /v1/compliance/records/{id}/document
#[utoipa::path(
    get,
    path = "/v1/compliance/records/{id}/document",
    params(("id" = String, Path, format = Uuid, description = "Record ID"), DocumentQuery),
    responses(
        (status = 200, description = "Presigned download URL", body = DocumentResponse),
        (status = 404, description = "No such record or no document in that slot", body = crate::error::ErrorBody),
    ),
    tag = "compliance"
)]
pub async fn document_url(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
    query: Result<Query<DocumentQuery>, QueryRejection>,
) -> Result<Json<DocumentResponse>, AppError> {
    let DocumentQuery { tenant_id, kind } = extract_query(query)?;
    let attachment = state
        .registry
        .read()
        .record(tenant_id, id)?
        .attachment(kind)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("no {kind} document on record {id}")))?;

    let ttl = state.config.presign_ttl;
    let url = state
        .object_store
        .presigned_url(&attachment.path, ttl, Utc::now())?;
    Ok(Json(DocumentResponse {
        kind,
        attachment,
        url,
        expires_in: ttl.as_secs(),
    }))
}

