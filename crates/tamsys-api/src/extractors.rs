//! # Custom Extractors & Validation
//!
//! Provides the [`Validate`] trait for request DTOs and helpers to extract
//! and validate JSON bodies and query strings in handlers, mapping
//! rejections to [`AppError::BadRequest`].

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::Query;
use axum::Json;
use serde::Deserialize;
use utoipa::IntoParams;

use tamsys_core::{
    CertificationPatch, CountryPatch, DevicePatch, NewCertification, NewCountry, NewDevice,
    NewNotificationRule, NewTask, NewTaskNote, NewTechnology, NewTenant, NotificationRulePatch,
    TaskPatch, TechnologyPatch, TenantId, TenantPatch, ValidationError,
};

use crate::error::AppError;

/// Request types that check business rules beyond what serde enforces.
pub trait Validate {
    /// Validate business rules.
    fn validate(&self) -> Result<(), ValidationError>;
}

macro_rules! validate_via_inherent {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Validate for $ty {
                fn validate(&self) -> Result<(), ValidationError> {
                    <$ty>::validate(self)
                }
            }
        )*
    };
}

validate_via_inherent!(
    NewTechnology,
    TechnologyPatch,
    NewCountry,
    CountryPatch,
    NewCertification,
    CertificationPatch,
    NewTenant,
    TenantPatch,
    NewNotificationRule,
    NotificationRulePatch,
    NewDevice,
    DevicePatch,
    NewTask,
    TaskPatch,
    NewTaskNote,
);

/// The `tenant_id` query parameter carried by tenant-scoped routes.
#[derive(Debug, Clone, Copy, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TenantScope {
    /// Calling tenant.
    #[param(value_type = String, format = Uuid)]
    pub tenant_id: TenantId,
}

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract a JSON body and validate it using the [`Validate`] trait.
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let value = extract_json(result)?;
    value.validate()?;
    Ok(value)
}

/// Extract a query string, mapping parse errors to [`AppError::BadRequest`].
pub fn extract_query<T>(result: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    result
        .map(|Query(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}
