//! # Rule Matrix API
//!
//! One rule per (technology, country, certification) triple. Only
//! mandatory rules take part in gap analysis.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use utoipa::IntoParams;

use tamsys_core::{CountryId, NewRule, RegulatoryRule, RuleId, RulePatch, TamsysError, TechnologyId};

use crate::db;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_query};
use crate::state::AppState;

/// Optional rule list filters.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RuleQuery {
    /// Only rules triggered by this technology.
    #[param(value_type = Option<i64>)]
    pub technology_id: Option<TechnologyId>,
    /// Only rules imposed by this country.
    #[param(value_type = Option<i64>)]
    pub country_id: Option<CountryId>,
}

impl RuleQuery {
    fn matches(&self, rule: &RegulatoryRule) -> bool {
        self.technology_id.map_or(true, |t| rule.technology_id == t)
            && self.country_id.map_or(true, |c| rule.country_id == c)
    }
}

/// Build the rules router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/rules", get(list_rules).post(create_rule))
        .route(
            "/v1/rules/{id}",
            get(get_rule).put(update_rule).delete(delete_rule),
        )
}

/// POST /v1/rules
#[utoipa::path(
    post,
    path = "/v1/rules",
    request_body = NewRule,
    responses(
        (status = 201, description = "Rule created", body = RegulatoryRule),
        (status = 404, description = "Unknown technology, country or certification", body = crate::error::ErrorBody),
        (status = 409, description = "Triple already exists", body = crate::error::ErrorBody),
    ),
    tag = "rules"
)]
pub async fn create_rule(
    State(state): State<AppState>,
    body: Result<Json<NewRule>, JsonRejection>,
) -> Result<(StatusCode, Json<RegulatoryRule>), AppError> {
    let input = extract_json(body)?;
    let rule = state.registry.write().create_rule(input, Utc::now())?;

    if let Some(pool) = &state.db_pool {
        db::catalog::insert_rule(pool, &rule)
            .await
            .map_err(|e| AppError::from_db("rule", e))?;
    }

    tracing::info!(
        id = %rule.id,
        technology_id = %rule.technology_id,
        country_id = %rule.country_id,
        certification_id = %rule.certification_id,
        "rule created"
    );
    Ok((StatusCode::CREATED, Json(rule)))
}

/// GET /v1/rules
#[utoipa::path(
    get,
    path = "/v1/rules",
    params(RuleQuery),
    responses((status = 200, description = "Matching rules", body = Vec<RegulatoryRule>)),
    tag = "rules"
)]
pub async fn list_rules(
    State(state): State<AppState>,
    query: Result<Query<RuleQuery>, QueryRejection>,
) -> Result<Json<Vec<RegulatoryRule>>, AppError> {
    let query = extract_query(query)?;
    let rules: Vec<RegulatoryRule> = state
        .registry
        .read()
        .rules()
        .filter(|rule| query.matches(rule))
        .cloned()
        .collect();
    Ok(Json(rules))
}

/// GET /v1/rules/{id}
#[utoipa::path(
    get,
    path = "/v1/rules/{id}",
    params(("id" = i64, Path, description = "Rule ID")),
    responses(
        (status = 200, description = "Rule found", body = RegulatoryRule),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "rules"
)]
pub async fn get_rule(
    State(state): State<AppState>,
    Path(id): Path<RuleId>,
) -> Result<Json<RegulatoryRule>, AppError> {
    let rule = state.registry.read().rule(id).cloned();
    rule.map(Json)
        .ok_or_else(|| TamsysError::not_found("rule", id).into())
}

/// PUT /v1/rules/{id}
#[utoipa::path(
    put,
    path = "/v1/rules/{id}",
    params(("id" = i64, Path, description = "Rule ID")),
    request_body = RulePatch,
    responses(
        (status = 200, description = "Rule updated", body = RegulatoryRule),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "rules"
)]
pub async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<RuleId>,
    body: Result<Json<RulePatch>, JsonRejection>,
) -> Result<Json<RegulatoryRule>, AppError> {
    let patch = extract_json(body)?;
    let rule = state.registry.write().update_rule(id, patch)?;

    if let Some(pool) = &state.db_pool {
        db::catalog::update_rule(pool, &rule)
            .await
            .map_err(|e| AppError::from_db("rule", e))?;
    }
    Ok(Json(rule))
}

/// DELETE /v1/rules/{id}
#[utoipa::path(
    delete,
    path = "/v1/rules/{id}",
    params(("id" = i64, Path, description = "Rule ID")),
    responses(
        (status = 204, description = "Rule deleted"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "rules"
)]
pub async fn delete_rule(
    State(state): State<AppState>,
    Path(id): Path<RuleId>,
) -> Result<StatusCode, AppError> {
    state.registry.write().delete_rule(id)?;

    if let Some(pool) = &state.db_pool {
        db::catalog::delete_rule(pool, id)
            .await
            .map_err(|e| AppError::from_db("rule", e))?;
    }
    Ok(StatusCode::NO_CONTENT)
}
