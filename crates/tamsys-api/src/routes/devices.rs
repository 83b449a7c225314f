//! # Device API
//!
//! Tenant-owned products and their technology profiles. Creating or
//! updating a device with target markets runs bulk gap initialization: a
//! PENDING compliance record is opened for every missing certification in
//! every target market, including ones from rules added since the last run. Initialization on write is
//! best-effort; failures are logged and never fail the device operation.
//! `POST /v1/devices/{id}/initialize` runs it explicitly and reports errors.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use tamsys_compliance::{initialize_gaps, BulkInitReport, CascadeReport, Page};
use tamsys_core::{Device, DeviceId, DevicePatch, NewDevice, Technology, TenantId};

use super::cleanup_documents;
use crate::db;
use crate::error::AppError;
use crate::extractors::{extract_query, extract_validated_json, TenantScope};
use crate::state::AppState;

/// A device plus the result of the gap initialization its write triggered.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeviceResponse {
    /// The device.
    #[serde(flatten)]
    pub device: Device,
    /// Present when initialization ran and succeeded.
    pub initialization: Option<BulkInitReport>,
}

/// Tenant scope plus pagination.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DeviceListQuery {
    /// Calling tenant.
    #[param(value_type = String, format = Uuid)]
    pub tenant_id: TenantId,
    /// Items to skip.
    #[serde(default)]
    pub skip: usize,
    /// Page size (default 100, max 1000).
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

/// Build the devices router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/devices", get(list_devices).post(create_device))
        .route(
            "/v1/devices/{id}",
            get(get_device).put(update_device).delete(delete_device),
        )
        .route("/v1/devices/{id}/technologies", get(device_technologies))
        .route("/v1/devices/{id}/initialize", post(initialize_device))
}

/// Run bulk initialization for a device and persist the records it opened.
///
/// If persisting fails the opened records are removed from memory again so
/// the registry never holds rows the database lacks.
async fn initialize(
    state: &AppState,
    tenant_id: TenantId,
    device_id: DeviceId,
) -> Result<BulkInitReport, AppError> {
    let outcome = {
        let mut registry = state.registry.write();
        let markets = registry.device(tenant_id, device_id)?.target_countries.clone();
        initialize_gaps(&mut registry, tenant_id, device_id, &markets, Utc::now())?
    };

    if let Some(pool) = &state.db_pool {
        if let Err(err) = db::records::insert_many(pool, &outcome.created).await {
            let mut registry = state.registry.write();
            for record in &outcome.created {
                if let Err(e) = registry.delete_record(tenant_id, record.id) {
                    tracing::warn!(record_id = %record.id, error = %e, "failed to roll back record");
                }
            }
            return Err(AppError::from_db("initialized records", err));
        }
    }

    let report = outcome.report;
    tracing::info!(
        %device_id,
        countries_processed = report.countries_processed,
        records_created = report.records_created,
        records_skipped_existing = report.records_skipped_existing,
        "bulk gap initialization complete"
    );
    Ok(report)
}

/// Initialization triggered by a device write: logged, never escalated.
async fn initialize_best_effort(
    state: &AppState,
    device: &Device,
) -> Option<BulkInitReport> {
    if device.target_countries.is_empty() {
        return None;
    }
    match initialize(state, device.tenant_id, device.id).await {
        Ok(report) => Some(report),
        Err(err) => {
            tracing::warn!(device_id = %device.id, error = %err, "bulk gap initialization failed");
            None
        }
    }
}

/// POST /v1/devices
#[utoipa::path(
    post,
    path = "/v1/devices",
    params(TenantScope),
    request_body = NewDevice,
    responses(
        (status = 201, description = "Device created and initialized", body = DeviceResponse),
        (status = 404, description = "Unknown tenant or technology", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "devices"
)]
pub async fn create_device(
    State(state): State<AppState>,
    scope: Result<Query<TenantScope>, QueryRejection>,
    body: Result<Json<NewDevice>, JsonRejection>,
) -> Result<(StatusCode, Json<DeviceResponse>), AppError> {
    let TenantScope { tenant_id } = extract_query(scope)?;
    let input = extract_validated_json(body)?;
    let device = state
        .registry
        .write()
        .create_device(tenant_id, input, Utc::now())?;

    if let Some(pool) = &state.db_pool {
        if let Err(err) = db::devices::insert(pool, &device).await {
            if let Err(e) = state.registry.write().delete_device(tenant_id, device.id) {
                tracing::warn!(device_id = %device.id, error = %e, "failed to roll back device");
            }
            return Err(AppError::from_db("device", err));
        }
    }
    tracing::info!(%tenant_id, device_id = %device.id, model = %device.model_name, "device created");

    let initialization = initialize_best_effort(&state, &device).await;
    Ok((
        StatusCode::CREATED,
        Json(DeviceResponse {
            device,
            initialization,
        }),
    ))
}

/// GET /v1/devices
#[utoipa::path(
    get,
    path = "/v1/devices",
    params(DeviceListQuery),
    responses((status = 200, description = "The tenant's devices", body = Vec<Device>)),
    tag = "devices"
)]
pub async fn list_devices(
    State(state): State<AppState>,
    query: Result<Query<DeviceListQuery>, QueryRejection>,
) -> Result<Json<Vec<Device>>, AppError> {
    let query = extract_query(query)?;
    let page = Page {
        skip: query.skip,
        limit: query.limit,
    };
    let devices: Vec<Device> = state
        .registry
        .read()
        .devices(query.tenant_id, page)
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(devices))
}

/// GET /v1/devices/{id}
#[utoipa::path(
    get,
    path = "/v1/devices/{id}",
    params(("id" = String, Path, format = Uuid, description = "Device ID"), TenantScope),
    responses(
        (status = 200, description = "Device found", body = Device),
        (status = 404, description = "Not found or owned by another tenant", body = crate::error::ErrorBody),
    ),
    tag = "devices"
)]
pub async fn get_device(
    State(state): State<AppState>,
    Path(id): Path<DeviceId>,
    scope: Result<Query<TenantScope>, QueryRejection>,
) -> Result<Json<Device>, AppError> {
    let TenantScope { tenant_id } = extract_query(scope)?;
    let device = state.registry.read().device(tenant_id, id).cloned()?;
    Ok(Json(device))
}

/// GET /v1/devices/{id}/technologies
#[utoipa::path(
    get,
    path = "/v1/devices/{id}/technologies",
    params(("id" = String, Path, format = Uuid, description = "Device ID"), TenantScope),
    responses(
        (status = 200, description = "The device's technologies", body = Vec<Technology>),
        (status = 404, description = "Not found or owned by another tenant", body = crate::error::ErrorBody),
    ),
    tag = "devices"
)]
pub async fn device_technologies(
    State(state): State<AppState>,
    Path(id): Path<DeviceId>,
    scope: Result<Query<TenantScope>, QueryRejection>,
) -> Result<Json<Vec<Technology>>, AppError> {
    let TenantScope { tenant_id } = extract_query(scope)?;
    let technologies: Vec<Technology> = state
        .registry
        .read()
        .device_technologies(tenant_id, id)?
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(technologies))
}

/// PUT /v1/devices/{id}
///
/// Every update of a device with target markets re-runs initialization.
/// Records already open are never removed.
#[utoipa::path(
    put,
    path = "/v1/devices/{id}",
    params(("id" = String, Path, format = Uuid, description = "Device ID"), TenantScope),
    request_body = DevicePatch,
    responses(
        (status = 200, description = "Device updated", body = DeviceResponse),
        (status = 404, description = "Not found or owned by another tenant", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "devices"
)]
pub async fn update_device(
    State(state): State<AppState>,
    Path(id): Path<DeviceId>,
    scope: Result<Query<TenantScope>, QueryRejection>,
    body: Result<Json<DevicePatch>, JsonRejection>,
) -> Result<Json<DeviceResponse>, AppError> {
    let TenantScope { tenant_id } = extract_query(scope)?;
    let patch = extract_validated_json(body)?;
    let (previous, device) = {
        let mut registry = state.registry.write();
        let previous = registry.device(tenant_id, id)?.clone();
        let device = registry.update_device(tenant_id, id, patch, Utc::now())?;
        (previous, device)
    };

    if let Some(pool) = &state.db_pool {
        if let Err(err) = db::devices::update(pool, &device).await {
            if !state.registry.write().restore_device(&device, previous) {
                tracing::warn!(device_id = %id, "device changed again, not rolled back");
            }
            return Err(AppError::from_db("device", err));
        }
    }

    let initialization = initialize_best_effort(&state, &device).await;
    Ok(Json(DeviceResponse {
        device,
        initialization,
    }))
}

/// POST /v1/devices/{id}/initialize
#[utoipa::path(
    post,
    path = "/v1/devices/{id}/initialize",
    params(("id" = String, Path, format = Uuid, description = "Device ID"), TenantScope),
    responses(
        (status = 200, description = "Initialization report", body = BulkInitReport),
        (status = 404, description = "Not found or owned by another tenant", body = crate::error::ErrorBody),
    ),
    tag = "devices"
)]
pub async fn initialize_device(
    State(state): State<AppState>,
    Path(id): Path<DeviceId>,
    scope: Result<Query<TenantScope>, QueryRejection>,
) -> Result<Json<BulkInitReport>, AppError> {
    let TenantScope { tenant_id } = extract_query(scope)?;
    let report = initialize(&state, tenant_id, id).await?;
    Ok(Json(report))
}

/// DELETE /v1/devices/{id}
#[utoipa::path(
    delete,
    path = "/v1/devices/{id}",
    params(("id" = String, Path, format = Uuid, description = "Device ID"), TenantScope),
    responses(
        (status = 200, description = "Device deleted; body summarizes the cascade"),
        (status = 404, description = "Not found or owned by another tenant", body = crate::error::ErrorBody),
    ),
    tag = "devices"
)]
pub async fn delete_device(
    State(state): State<AppState>,
    Path(id): Path<DeviceId>,
    scope: Result<Query<TenantScope>, QueryRejection>,
) -> Result<Json<CascadeReport>, AppError> {
    let TenantScope { tenant_id } = extract_query(scope)?;
    let report = state.registry.write().delete_device(tenant_id, id)?;

    if let Some(pool) = &state.db_pool {
        db::devices::delete(pool, id)
            .await
            .map_err(|e| AppError::from_db("device", e))?;
    }
    cleanup_documents(&state, &report);

    tracing::info!(
        %tenant_id,
        device_id = %id,
        records_removed = report.records_removed.len(),
        "device deleted"
    );
    Ok(Json(report))
}
