//! # Catalog API
//!
//! Global reference data shared by every tenant: technologies, countries
//! and certifications. Names and ISO codes are unique; duplicates are 409.
//! Deleting an entry cascades to the rules and records that reference it.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;

use tamsys_compliance::CascadeReport;
use tamsys_core::{
    Certification, CertificationId, CertificationPatch, Country, CountryId, CountryPatch,
    NewCertification, NewCountry, NewTechnology, TamsysError, Technology, TechnologyId,
    TechnologyPatch,
};

use super::cleanup_documents;
use crate::db;
use crate::error::AppError;
use crate::extractors::extract_validated_json;
use crate::state::AppState;

/// Build the catalog router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/technologies", get(list_technologies).post(create_technology))
        .route(
            "/v1/technologies/{id}",
            get(get_technology)
                .put(update_technology)
                .delete(delete_technology),
        )
        .route("/v1/countries", get(list_countries).post(create_country))
        .route(
            "/v1/countries/{id}",
            get(get_country).put(update_country).delete(delete_country),
        )
        .route(
            "/v1/certifications",
            get(list_certifications).post(create_certification),
        )
        .route(
            "/v1/certifications/{id}",
            get(get_certification)
                .put(update_certification)
                .delete(delete_certification),
        )
}

// ── Technologies ────────────────────────────────────────────────────

/// POST /v1/technologies
#[utoipa::path(
    post,
    path = "/v1/technologies",
    request_body = NewTechnology,
    responses(
        (status = 201, description = "Technology created", body = Technology),
        (status = 409, description = "Name already exists", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
pub async fn create_technology(
    State(state): State<AppState>,
    body: Result<Json<NewTechnology>, JsonRejection>,
) -> Result<(StatusCode, Json<Technology>), AppError> {
    let input = extract_validated_json(body)?;
    let technology = state.registry.write().create_technology(input, Utc::now())?;

    if let Some(pool) = &state.db_pool {
        db::catalog::insert_technology(pool, &technology)
            .await
            .map_err(|e| AppError::from_db("technology", e))?;
    }

    tracing::info!(id = %technology.id, name = %technology.name, "technology created");
    Ok((StatusCode::CREATED, Json(technology)))
}

/// GET /v1/technologies
#[utoipa::path(
    get,
    path = "/v1/technologies",
    responses((status = 200, description = "All technologies", body = Vec<Technology>)),
    tag = "catalog"
)]
pub async fn list_technologies(State(state): State<AppState>) -> Json<Vec<Technology>> {
    let technologies: Vec<Technology> = state.registry.read().technologies().cloned().collect();
    Json(technologies)
}

/// GET /v1/technologies/{id}
#[utoipa::path(
    get,
    path = "/v1/technologies/{id}",
    params(("id" = i64, Path, description = "Technology ID")),
    responses(
        (status = 200, description = "Technology found", body = Technology),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
pub async fn get_technology(
    State(state): State<AppState>,
    Path(id): Path<TechnologyId>,
) -> Result<Json<Technology>, AppError> {
    let technology = state.registry.read().technology(id).cloned();
    technology
        .map(Json)
        .ok_or_else(|| TamsysError::not_found("technology", id).into())
}

/// PUT /v1/technologies/{id}
#[utoipa::path(
    put,
    path = "/v1/technologies/{id}",
    params(("id" = i64, Path, description = "Technology ID")),
    request_body = TechnologyPatch,
    responses(
        (status = 200, description = "Technology updated", body = Technology),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Name already exists", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
pub async fn update_technology(
    State(state): State<AppState>,
    Path(id): Path<TechnologyId>,
    body: Result<Json<TechnologyPatch>, JsonRejection>,
) -> Result<Json<Technology>, AppError> {
    let patch = extract_validated_json(body)?;
    let technology = state.registry.write().update_technology(id, patch)?;

    if let Some(pool) = &state.db_pool {
        db::catalog::update_technology(pool, &technology)
            .await
            .map_err(|e| AppError::from_db("technology", e))?;
    }
    Ok(Json(technology))
}

/// DELETE /v1/technologies/{id}
///
/// Removes the rules for the technology and unlinks it from devices.
#[utoipa::path(
    delete,
    path = "/v1/technologies/{id}",
    params(("id" = i64, Path, description = "Technology ID")),
    responses(
        (status = 200, description = "Technology deleted; body summarizes the cascade"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
pub async fn delete_technology(
    State(state): State<AppState>,
    Path(id): Path<TechnologyId>,
) -> Result<Json<CascadeReport>, AppError> {
    let report = state.registry.write().delete_technology(id)?;

    if let Some(pool) = &state.db_pool {
        db::catalog::delete_technology(pool, id)
            .await
            .map_err(|e| AppError::from_db("technology", e))?;
    }

    tracing::info!(%id, rules_removed = report.rules_removed, "technology deleted");
    Ok(Json(report))
}

// ── Countries ───────────────────────────────────────────────────────

/// POST /v1/countries
#[utoipa::path(
    post,
    path = "/v1/countries",
    request_body = NewCountry,
    responses(
        (status = 201, description = "Country created", body = Country),
        (status = 409, description = "ISO code already exists", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
pub async fn create_country(
    State(state): State<AppState>,
    body: Result<Json<NewCountry>, JsonRejection>,
) -> Result<(StatusCode, Json<Country>), AppError> {
    let input = extract_validated_json(body)?;
    let country = state.registry.write().create_country(input, Utc::now())?;

    if let Some(pool) = &state.db_pool {
        db::catalog::insert_country(pool, &country)
            .await
            .map_err(|e| AppError::from_db("country", e))?;
    }

    tracing::info!(id = %country.id, iso_code = country.iso_code.as_str(), "country created");
    Ok((StatusCode::CREATED, Json(country)))
}

/// GET /v1/countries
#[utoipa::path(
    get,
    path = "/v1/countries",
    responses((status = 200, description = "All countries", body = Vec<Country>)),
    tag = "catalog"
)]
pub async fn list_countries(State(state): State<AppState>) -> Json<Vec<Country>> {
    let countries: Vec<Country> = state.registry.read().countries().cloned().collect();
    Json(countries)
}

/// GET /v1/countries/{id}
#[utoipa::path(
    get,
    path = "/v1/countries/{id}",
    params(("id" = i64, Path, description = "Country ID")),
    responses(
        (status = 200, description = "Country found", body = Country),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
pub async fn get_country(
    State(state): State<AppState>,
    Path(id): Path<CountryId>,
) -> Result<Json<Country>, AppError> {
    let country = state.registry.read().country(id).cloned();
    country
        .map(Json)
        .ok_or_else(|| TamsysError::not_found("country", id).into())
}

/// PUT /v1/countries/{id}
#[utoipa::path(
    put,
    path = "/v1/countries/{id}",
    params(("id" = i64, Path, description = "Country ID")),
    request_body = CountryPatch,
    responses(
        (status = 200, description = "Country updated", body = Country),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "ISO code already exists", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
pub async fn update_country(
    State(state): State<AppState>,
    Path(id): Path<CountryId>,
    body: Result<Json<CountryPatch>, JsonRejection>,
) -> Result<Json<Country>, AppError> {
    let patch = extract_validated_json(body)?;
    let country = state.registry.write().update_country(id, patch)?;

    if let Some(pool) = &state.db_pool {
        db::catalog::update_country(pool, &country)
            .await
            .map_err(|e| AppError::from_db("country", e))?;
    }
    Ok(Json(country))
}

/// DELETE /v1/countries/{id}
///
/// Removes the country's rules and every compliance record in that market,
/// including their documents.
#[utoipa::path(
    delete,
    path = "/v1/countries/{id}",
    params(("id" = i64, Path, description = "Country ID")),
    responses(
        (status = 200, description = "Country deleted; body summarizes the cascade"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
pub async fn delete_country(
    State(state): State<AppState>,
    Path(id): Path<CountryId>,
) -> Result<Json<CascadeReport>, AppError> {
    let report = state.registry.write().delete_country(id)?;

    if let Some(pool) = &state.db_pool {
        db::catalog::delete_country(pool, id)
            .await
            .map_err(|e| AppError::from_db("country", e))?;
    }
    cleanup_documents(&state, &report);

    tracing::info!(
        %id,
        rules_removed = report.rules_removed,
        records_removed = report.records_removed.len(),
        "country deleted"
    );
    Ok(Json(report))
}

// ── Certifications ──────────────────────────────────────────────────

/// POST /v1/certifications
#[utoipa::path(
    post,
    path = "/v1/certifications",
    request_body = NewCertification,
    responses(
        (status = 201, description = "Certification created", body = Certification),
        (status = 409, description = "Name already exists", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
pub async fn create_certification(
    State(state): State<AppState>,
    body: Result<Json<NewCertification>, JsonRejection>,
) -> Result<(StatusCode, Json<Certification>), AppError> {
    let input = extract_validated_json(body)?;
    let certification = state
        .registry
        .write()
        .create_certification(input, Utc::now())?;

    if let Some(pool) = &state.db_pool {
        db::catalog::insert_certification(pool, &certification)
            .await
            .map_err(|e| AppError::from_db("certification", e))?;
    }

    tracing::info!(id = %certification.id, name = %certification.name, "certification created");
    Ok((StatusCode::CREATED, Json(certification)))
}

/// GET /v1/certifications
#[utoipa::path(
    get,
    path = "/v1/certifications",
    responses((status = 200, description = "All certifications", body = Vec<Certification>)),
    tag = "catalog"
)]
pub async fn list_certifications(State(state): State<AppState>) -> Json<Vec<Certification>> {
    let certifications: Vec<Certification> = state.registry.read().certifications().cloned().collect();
    Json(certifications)
}

/// GET /v1/certifications/{id}
#[utoipa::path(
    get,
    path = "/v1/certifications/{id}",
    params(("id" = i64, Path, description = "Certification ID")),
    responses(
        (status = 200, description = "Certification found", body = Certification),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
pub async fn get_certification(
    State(state): State<AppState>,
    Path(id): Path<CertificationId>,
) -> Result<Json<Certification>, AppError> {
    let certification = state.registry.read().certification(id).cloned();
    certification
        .map(Json)
        .ok_or_else(|| TamsysError::not_found("certification", id).into())
}

/// PUT /v1/certifications/{id}
#[utoipa::path(
    put,
    path = "/v1/certifications/{id}",
    params(("id" = i64, Path, description = "Certification ID")),
    request_body = CertificationPatch,
    responses(
        (status = 200, description = "Certification updated", body = Certification),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Name already exists", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
pub async fn update_certification(
    State(state): State<AppState>,
    Path(id): Path<CertificationId>,
    body: Result<Json<CertificationPatch>, JsonRejection>,
) -> Result<Json<Certification>, AppError> {
    let patch = extract_validated_json(body)?;
    let certification = state.registry.write().update_certification(id, patch)?;

    if let Some(pool) = &state.db_pool {
        db::catalog::update_certification(pool, &certification)
            .await
            .map_err(|e| AppError::from_db("certification", e))?;
    }
    Ok(Json(certification))
}

/// DELETE /v1/certifications/{id}
#[utoipa::path(
    delete,
    path = "/v1/certifications/{id}",
    params(("id" = i64, Path, description = "Certification ID")),
    responses(
        (status = 200, description = "Certification deleted; body summarizes the cascade"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "catalog"
)]
pub async fn delete_certification(
    State(state): State<AppState>,
    Path(id): Path<CertificationId>,
) -> Result<Json<CascadeReport>, AppError> {
    let report = state.registry.write().delete_certification(id)?;

    if let Some(pool) = &state.db_pool {
        db::catalog::delete_certification(pool, id)
            .await
            .map_err(|e| AppError::from_db("certification", e))?;
    }
    cleanup_documents(&state, &report);

    tracing::info!(
        %id,
        rules_removed = report.rules_removed,
        records_removed = report.records_removed.len(),
        "certification deleted"
    );
    Ok(Json(report))
}
