//! # Tenants and Notification Rules
//!
//! A tenant is an isolated customer organization. Each tenant configures
//! its own expiry thresholds ([`NotificationRule`]), which drive the
//! approach-warning pass of the daily expiry job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ValidationError;
use crate::identity::{NotificationRuleId, TenantId};

const TENANT_NAME_MAX: usize = 200;
const EMAIL_MAX: usize = 255;

/// Smallest permitted notification threshold, in days.
pub const MIN_THRESHOLD_DAYS: i64 = 1;
/// Largest permitted notification threshold, in days.
pub const MAX_THRESHOLD_DAYS: i64 = 365;

/// An isolated customer organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Tenant {
    /// Identifier.
    pub id: TenantId,
    /// Organization name.
    pub name: String,
    /// Address notifications would be delivered to.
    pub contact_email: Option<String>,
    /// Deactivated tenants keep their data.
    pub is_active: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a [`Tenant`].
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewTenant {
    /// Organization name.
    pub name: String,
    /// Contact address.
    #[serde(default)]
    pub contact_email: Option<String>,
}

impl NewTenant {
    /// Validate field constraints.
    pub fn validate(&self) -> Result<(), ValidationError> {
        crate::check_text("name", &self.name, TENANT_NAME_MAX)?;
        if let Some(email) = &self.contact_email {
            crate::check_text("contact_email", email, EMAIL_MAX)?;
        }
        Ok(())
    }
}

/// Partial update of a [`Tenant`].
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct TenantPatch {
    /// New name.
    #[serde(default)]
    pub name: Option<String>,
    /// New contact address.
    #[serde(default)]
    pub contact_email: Option<String>,
    /// Activation flag.
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl TenantPatch {
    /// Validate field constraints.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(name) = &self.name {
            crate::check_text("name", name, TENANT_NAME_MAX)?;
        }
        if let Some(email) = &self.contact_email {
            crate::check_text("contact_email", email, EMAIL_MAX)?;
        }
        Ok(())
    }
}

/// Alert severity attached to a notification rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Highest urgency (default).
    #[default]
    High,
    /// Medium urgency.
    Medium,
    /// Lowest urgency.
    Low,
}

impl Severity {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HIGH" => Ok(Self::High),
            "MEDIUM" => Ok(Self::Medium),
            "LOW" => Ok(Self::Low),
            _ => Err(ValidationError::UnknownValue {
                kind: "severity_level",
                value: s.to_string(),
            }),
        }
    }
}

/// A tenant's "warn N days before expiry" threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NotificationRule {
    /// Identifier.
    pub id: NotificationRuleId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Threshold N; records expiring exactly today + N are warned about.
    pub days_before_expiry: u16,
    /// Alert severity.
    pub severity_level: Severity,
    /// Inactive rules are ignored by the expiry job.
    pub is_active: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Check a threshold against the permitted range.
pub fn check_threshold(days: i64) -> Result<u16, ValidationError> {
    if !(MIN_THRESHOLD_DAYS..=MAX_THRESHOLD_DAYS).contains(&days) {
        return Err(ValidationError::ThresholdOutOfRange(days));
    }
    u16::try_from(days).map_err(|_| ValidationError::ThresholdOutOfRange(days))
}

fn default_true() -> bool {
    true
}

/// Input for creating a [`NotificationRule`].
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewNotificationRule {
    /// Threshold in days (1..=365).
    pub days_before_expiry: i64,
    /// Defaults to HIGH.
    #[serde(default)]
    pub severity_level: Severity,
    /// Defaults to `true`.
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl NewNotificationRule {
    /// Validate the threshold range.
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_threshold(self.days_before_expiry).map(|_| ())
    }
}

/// Partial update of a [`NotificationRule`].
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct NotificationRulePatch {
    /// New threshold.
    #[serde(default)]
    pub days_before_expiry: Option<i64>,
    /// New severity.
    #[serde(default)]
    pub severity_level: Option<Severity>,
    /// New activation flag.
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl NotificationRulePatch {
    /// Validate the threshold range.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.days_before_expiry {
            Some(days) => check_threshold(days).map(|_| ()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn threshold_bounds_are_inclusive() {
        assert_eq!(check_threshold(1), Ok(1));
        assert_eq!(check_threshold(365), Ok(365));
        assert!(check_threshold(0).is_err());
        assert!(check_threshold(366).is_err());
        assert!(check_threshold(-5).is_err());
    }

    #[test]
    fn new_rule_defaults() {
        let rule: NewNotificationRule =
            serde_json::from_str(r#"{"days_before_expiry": 90}"#).unwrap();
        assert_eq!(rule.severity_level, Severity::High);
        assert!(rule.is_active);
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn severity_parses_case_insensitively() {
        assert_eq!("medium".parse::<Severity>(), Ok(Severity::Medium));
        assert!("urgent".parse::<Severity>().is_err());
    }

    #[test]
    fn severity_serializes_screaming() {
        assert_eq!(serde_json::to_string(&Severity::Low).unwrap(), "\"LOW\"");
    }

    proptest! {
        #[test]
        fn threshold_accepts_exactly_the_range(days in -1000i64..1000) {
            let accepted = check_threshold(days).is_ok();
            prop_assert_eq!(accepted, (1..=365).contains(&days));
        }
    }
}
