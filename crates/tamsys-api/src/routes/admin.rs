//! # Admin API
//!
//! Runs the daily expiry check on demand.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use utoipa::IntoParams;

use tamsys_compliance::ExpiryReport;

use crate::error::AppError;
use crate::extractors::extract_query;
use crate::scheduler::run_expiry;
use crate::state::AppState;

/// Optional run date.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ExpiryCheckQuery {
    /// Calendar day to evaluate; defaults to today (UTC).
    #[param(value_type = Option<String>, format = Date)]
    pub today: Option<NaiveDate>,
}

/// Build the admin router.
pub fn router() -> Router<AppState> {
    Router::new().route("/v1/admin/expiry-check", post(expiry_check))
}

/// POST /v1/admin/expiry-check
#[utoipa::path(
    post,
    path = "/v1/admin/expiry-check",
    params(ExpiryCheckQuery),
    responses(
        (status = 200, description = "Run report", body = ExpiryReport),
        (status = 500, description = "Run failed and was rolled back", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
pub async fn expiry_check(
    State(state): State<AppState>,
    query: Result<Query<ExpiryCheckQuery>, QueryRejection>,
) -> Result<Json<ExpiryReport>, AppError> {
    let query = extract_query(query)?;
    let now = Utc::now();
    let today = query.today.unwrap_or_else(|| now.date_naive());
    let report = run_expiry(&state, today, now).await?;
    Ok(Json(report))
}
