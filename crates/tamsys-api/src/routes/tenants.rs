//! # Tenant API
//!
//! Tenants and their expiry notification thresholds. Deleting a tenant
//! removes its devices, records, tasks and documents.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;

use tamsys_compliance::CascadeReport;
use tamsys_core::{
    NewNotificationRule, NewTenant, NotificationRule, NotificationRuleId, NotificationRulePatch,
    Tenant, TenantId, TenantPatch,
};

use super::cleanup_documents;
use crate::db;
use crate::error::AppError;
use crate::extractors::extract_validated_json;
use crate::state::AppState;

/// Build the tenants router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/tenants", get(list_tenants).post(create_tenant))
        .route(
            "/v1/tenants/{id}",
            get(get_tenant).put(update_tenant).delete(delete_tenant),
        )
        .route("/v1/tenants/{id}/deactivate", post(deactivate_tenant))
        .route(
            "/v1/tenants/{id}/notification-rules",
            get(list_notification_rules).post(create_notification_rule),
        )
        .route(
            "/v1/tenants/{id}/notification-rules/{rule_id}",
            get(get_notification_rule)
                .put(update_notification_rule)
                .delete(delete_notification_rule),
        )
}

/// POST /v1/tenants
#[utoipa::path(
    post,
    path = "/v1/tenants",
    request_body = NewTenant,
    responses(
        (status = 201, description = "Tenant created", body = Tenant),
        (status = 409, description = "Name already exists", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "tenants"
)]
pub async fn create_tenant(
    State(state): State<AppState>,
    body: Result<Json<NewTenant>, JsonRejection>,
) -> Result<(StatusCode, Json<Tenant>), AppError> {
    let input = extract_validated_json(body)?;
    let tenant = state.registry.write().create_tenant(input, Utc::now())?;

    if let Some(pool) = &state.db_pool {
        db::tenants::insert_tenant(pool, &tenant)
            .await
            .map_err(|e| AppError::from_db("tenant", e))?;
    }

    tracing::info!(id = %tenant.id, name = %tenant.name, "tenant created");
    Ok((StatusCode::CREATED, Json(tenant)))
}

/// GET /v1/tenants
#[utoipa::path(
    get,
    path = "/v1/tenants",
    responses((status = 200, description = "All tenants", body = Vec<Tenant>)),
    tag = "tenants"
)]
pub async fn list_tenants(State(state): State<AppState>) -> Json<Vec<Tenant>> {
    let tenants: Vec<Tenant> = state.registry.read().tenants().into_iter().cloned().collect();
    Json(tenants)
}

/// GET /v1/tenants/{id}
#[utoipa::path(
    get,
    path = "/v1/tenants/{id}",
    params(("id" = String, Path, format = Uuid, description = "Tenant ID")),
    responses(
        (status = 200, description = "Tenant found", body = Tenant),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "tenants"
)]
pub async fn get_tenant(
    State(state): State<AppState>,
    Path(id): Path<TenantId>,
) -> Result<Json<Tenant>, AppError> {
    let tenant = state.registry.read().tenant(id).cloned()?;
    Ok(Json(tenant))
}

/// PUT /v1/tenants/{id}
#[utoipa::path(
    put,
    path = "/v1/tenants/{id}",
    params(("id" = String, Path, format = Uuid, description = "Tenant ID")),
    request_body = TenantPatch,
    responses(
        (status = 200, description = "Tenant updated", body = Tenant),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Name already exists", body = crate::error::ErrorBody),
    ),
    tag = "tenants"
)]
pub async fn update_tenant(
    State(state): State<AppState>,
    Path(id): Path<TenantId>,
    body: Result<Json<TenantPatch>, JsonRejection>,
) -> Result<Json<Tenant>, AppError> {
    let patch = extract_validated_json(body)?;
    let tenant = state.registry.write().update_tenant(id, patch, Utc::now())?;
    persist_tenant(&state, &tenant).await?;
    Ok(Json(tenant))
}

/// POST /v1/tenants/{id}/deactivate
///
/// Soft delete: the tenant and its data remain, `is_active` becomes false.
#[utoipa::path(
    post,
    path = "/v1/tenants/{id}/deactivate",
    params(("id" = String, Path, format = Uuid, description = "Tenant ID")),
    responses(
        (status = 200, description = "Tenant deactivated", body = Tenant),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "tenants"
)]
pub async fn deactivate_tenant(
    State(state): State<AppState>,
    Path(id): Path<TenantId>,
) -> Result<Json<Tenant>, AppError> {
    let tenant = state.registry.write().deactivate_tenant(id, Utc::now())?;
    persist_tenant(&state, &tenant).await?;
    tracing::info!(%id, "tenant deactivated");
    Ok(Json(tenant))
}

async fn persist_tenant(state: &AppState, tenant: &Tenant) -> Result<(), AppError> {
    if let Some(pool) = &state.db_pool {
        db::tenants::update_tenant(pool, tenant)
            .await
            .map_err(|e| AppError::from_db("tenant", e))?;
    }
    Ok(())
}

/// DELETE /v1/tenants/{id}
#[utoipa::path(
    delete,
    path = "/v1/tenants/{id}",
    params(("id" = String, Path, format = Uuid, description = "Tenant ID")),
    responses(
        (status = 200, description = "Tenant deleted; body summarizes the cascade"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "tenants"
)]
pub async fn delete_tenant(
    State(state): State<AppState>,
    Path(id): Path<TenantId>,
) -> Result<Json<CascadeReport>, AppError> {
    let report = state.registry.write().delete_tenant(id)?;

    if let Some(pool) = &state.db_pool {
        db::tenants::delete_tenant(pool, id)
            .await
            .map_err(|e| AppError::from_db("tenant", e))?;
    }
    cleanup_documents(&state, &report);

    tracing::info!(
        %id,
        devices_removed = report.devices_removed,
        records_removed = report.records_removed.len(),
        "tenant deleted"
    );
    Ok(Json(report))
}

// ── Notification rules ──────────────────────────────────────────────

/// POST /v1/tenants/{id}/notification-rules
#[utoipa::path(
    post,
    path = "/v1/tenants/{id}/notification-rules",
    params(("id" = String, Path, format = Uuid, description = "Tenant ID")),
    request_body = NewNotificationRule,
    responses(
        (status = 201, description = "Notification rule created", body = NotificationRule),
        (status = 404, description = "Tenant not found", body = crate::error::ErrorBody),
        (status = 422, description = "Threshold outside 1..=365", body = crate::error::ErrorBody),
    ),
    tag = "tenants"
)]
pub async fn create_notification_rule(
    State(state): State<AppState>,
    Path(tenant_id): Path<TenantId>,
    body: Result<Json<NewNotificationRule>, JsonRejection>,
) -> Result<(StatusCode, Json<NotificationRule>), AppError> {
    let input = extract_validated_json(body)?;
    let rule = state
        .registry
        .write()
        .create_notification_rule(tenant_id, input, Utc::now())?;

    if let Some(pool) = &state.db_pool {
        db::tenants::insert_notification_rule(pool, &rule)
            .await
            .map_err(|e| AppError::from_db("notification rule", e))?;
    }

    tracing::info!(
        %tenant_id,
        days_before_expiry = rule.days_before_expiry,
        severity = rule.severity_level.as_str(),
        "notification rule created"
    );
    Ok((StatusCode::CREATED, Json(rule)))
}

/// GET /v1/tenants/{id}/notification-rules
#[utoipa::path(
    get,
    path = "/v1/tenants/{id}/notification-rules",
    params(("id" = String, Path, format = Uuid, description = "Tenant ID")),
    responses(
        (status = 200, description = "The tenant's thresholds", body = Vec<NotificationRule>),
        (status = 404, description = "Tenant not found", body = crate::error::ErrorBody),
    ),
    tag = "tenants"
)]
pub async fn list_notification_rules(
    State(state): State<AppState>,
    Path(tenant_id): Path<TenantId>,
) -> Result<Json<Vec<NotificationRule>>, AppError> {
    let registry = state.registry.read();
    registry.tenant(tenant_id)?;
    let rules: Vec<NotificationRule> = registry
        .notification_rules(tenant_id)
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(rules))
}

/// GET /v1/tenants/{id}/notification-rules/{rule_id}
#[utoipa::path(
    get,
    path = "/v1/tenants/{id}/notification-rules/{rule_id}",
    params(
        ("id" = String, Path, format = Uuid, description = "Tenant ID"),
        ("rule_id" = String, Path, format = Uuid, description = "Notification rule ID"),
    ),
    responses(
        (status = 200, description = "Notification rule found", body = NotificationRule),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "tenants"
)]
pub async fn get_notification_rule(
    State(state): State<AppState>,
    Path((tenant_id, rule_id)): Path<(TenantId, NotificationRuleId)>,
) -> Result<Json<NotificationRule>, AppError> {
    let rule = state
        .registry
        .read()
        .notification_rule(tenant_id, rule_id)
        .cloned()?;
    Ok(Json(rule))
}

/// PUT /v1/tenants/{id}/notification-rules/{rule_id}
#[utoipa::path(
    put,
    path = "/v1/tenants/{id}/notification-rules/{rule_id}",
    params(
        ("id" = String, Path, format = Uuid, description = "Tenant ID"),
        ("rule_id" = String, Path, format = Uuid, description = "Notification rule ID"),
    ),
    request_body = NotificationRulePatch,
    responses(
        (status = 200, description = "Notification rule updated", body = NotificationRule),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 422, description = "Threshold outside 1..=365", body = crate::error::ErrorBody),
    ),
    tag = "tenants"
)]
pub async fn update_notification_rule(
    State(state): State<AppState>,
    Path((tenant_id, rule_id)): Path<(TenantId, NotificationRuleId)>,
    body: Result<Json<NotificationRulePatch>, JsonRejection>,
) -> Result<Json<NotificationRule>, AppError> {
    let patch = extract_validated_json(body)?;
    let rule = state
        .registry
        .write()
        .update_notification_rule(tenant_id, rule_id, patch)?;

    if let Some(pool) = &state.db_pool {
        db::tenants::update_notification_rule(pool, &rule)
            .await
            .map_err(|e| AppError::from_db("notification rule", e))?;
    }
    Ok(Json(rule))
}

/// DELETE /v1/tenants/{id}/notification-rules/{rule_id}
#[utoipa::path(
    delete,
    path = "/v1/tenants/{id}/notification-rules/{rule_id}",
    params(
        ("id" = String, Path, format = Uuid, description = "Tenant ID"),
        ("rule_id" = String, Path, format = Uuid, description = "Notification rule ID"),
    ),
    responses(
        (status = 204, description = "Notification rule deleted"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "tenants"
)]
pub async fn delete_notification_rule(
    State(state): State<AppState>,
    Path((tenant_id, rule_id)): Path<(TenantId, NotificationRuleId)>,
) -> Result<StatusCode, AppError> {
    state
        .registry
        .write()
        .delete_notification_rule(tenant_id, rule_id)?;

    if let Some(pool) = &state.db_pool {
        db::tenants::delete_notification_rule(pool, rule_id)
            .await
            .map_err(|e| AppError::from_db("notification rule", e))?;
    }
    Ok(StatusCode::NO_CONTENT)
}
