#![deny(missing_docs)]

//! # tamsys-core — Foundational Types for TAMSys
//!
//! This crate defines the types every other crate in the workspace depends
//! on. It has no internal crate dependencies.
//!
//! ## Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** Catalog entries use integer
//!    surrogate keys ([`TechnologyId`], [`CountryId`], [`CertificationId`],
//!    [`RuleId`]); tenant-owned data uses UUIDs ([`TenantId`], [`DeviceId`],
//!    [`RecordId`], [`TaskId`]). You cannot pass a [`CountryId`] where a
//!    [`CertificationId`] is expected.
//!
//! 2. **Validation at construction.** Request-shaped inputs (`New*` types)
//!    expose `validate()` returning a [`ValidationError`]; ISO codes are
//!    normalized once through [`IsoCode::parse`].
//!
//! 3. **One error taxonomy.** [`TamsysError`] distinguishes NotFound,
//!    Conflict and Validation so every layer can map them without string
//!    matching.

pub mod catalog;
pub mod device;
pub mod error;
pub mod identity;
pub mod task;
pub mod tenant;

pub use catalog::{
    Certification, CertificationPatch, Country, CountryPatch, IsoCode, NewCertification,
    NewCountry, NewRule, NewTechnology, RegulatoryRule, RuleKey, RulePatch, Technology,
    TechnologyPatch,
};
pub use device::{Device, DevicePatch, NewDevice, TargetMarkets, ALL_COUNTRIES};
pub use error::{TamsysError, ValidationError};
pub use identity::{
    CertificationId, CountryId, DeviceId, NoteId, NotificationRuleId, RecordId, RuleId, TaskId,
    TechnologyId, TenantId,
};
pub use task::{
    ComplianceTask, NewTask, NewTaskNote, TaskCategory, TaskCounts, TaskNote, TaskPatch,
    TaskStatus,
};
pub use tenant::{
    NewNotificationRule, NewTenant, NotificationRule, NotificationRulePatch, Severity, Tenant,
    TenantPatch,
};

/// Reject empty (after trimming) or over-long free-text fields.
pub(crate) fn check_text(
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField(field));
    }
    let len = trimmed.chars().count();
    if len > max {
        return Err(ValidationError::TooLong {
            field,
            max,
            actual: len,
        });
    }
    Ok(())
}
