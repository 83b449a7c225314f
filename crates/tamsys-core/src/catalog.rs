//! # Master Catalog and Rule Matrix Types
//!
//! Global reference data shared by every tenant: technologies, countries,
//! certifications, and the regulatory rules connecting them.
//!
//! A [`RegulatoryRule`] is one edge of the matrix
//! `(Technology × Country) → Certification`. The triple is unique; a
//! technology that needs two certificates in one country has two rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::device::ALL_COUNTRIES;
use crate::error::ValidationError;
use crate::identity::{CertificationId, CountryId, RuleId, TechnologyId};

const NAME_MAX: usize = 100;
const AUTHORITY_MAX: usize = 200;

// ── ISO code ────────────────────────────────────────────────────────────

/// A normalized three-letter country code (upper case).
///
/// `"ALL"` is rejected because it is the target-market sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IsoCode(String);

impl IsoCode {
    /// Parse and normalize an ISO code.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let code = raw.trim().to_ascii_uppercase();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::InvalidIsoCode(raw.to_string()));
        }
        if code == ALL_COUNTRIES {
            return Err(ValidationError::InvalidIsoCode(raw.to_string()));
        }
        Ok(Self(code))
    }

    /// The code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for IsoCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<IsoCode> for String {
    fn from(code: IsoCode) -> Self {
        code.0
    }
}

impl std::fmt::Display for IsoCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Technology ──────────────────────────────────────────────────────────

/// A technology a device can embed (e.g. "Wi-Fi 6E", "Bluetooth LE").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Technology {
    /// Surrogate key.
    pub id: TechnologyId,
    /// Unique display name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Input for creating a [`Technology`].
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewTechnology {
    /// Unique display name.
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
}

impl NewTechnology {
    /// Validate field constraints.
    pub fn validate(&self) -> Result<(), ValidationError> {
        crate::check_text("name", &self.name, NAME_MAX)
    }
}

/// Partial update of a [`Technology`].
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct TechnologyPatch {
    /// New name.
    #[serde(default)]
    pub name: Option<String>,
    /// New description.
    #[serde(default)]
    pub description: Option<String>,
}

impl TechnologyPatch {
    /// Validate field constraints.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.name {
            Some(name) => crate::check_text("name", name, NAME_MAX),
            None => Ok(()),
        }
    }
}

// ── Country ─────────────────────────────────────────────────────────────

/// A market a device can be sold into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Country {
    /// Surrogate key.
    pub id: CountryId,
    /// Display name.
    pub name: String,
    /// Unique ISO 3166-1 alpha-3 code.
    #[schema(value_type = String)]
    pub iso_code: IsoCode,
    /// Structured market profile (voltage, plug type, labeling notes).
    #[schema(value_type = Object)]
    pub details: serde_json::Value,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Input for creating a [`Country`].
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewCountry {
    /// Display name.
    pub name: String,
    /// ISO code; normalized to upper case.
    pub iso_code: String,
    /// Structured market profile.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub details: Option<serde_json::Value>,
}

impl NewCountry {
    /// Validate field constraints.
    pub fn validate(&self) -> Result<(), ValidationError> {
        crate::check_text("name", &self.name, NAME_MAX)?;
        IsoCode::parse(&self.iso_code).map(|_| ())
    }
}

/// Partial update of a [`Country`].
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CountryPatch {
    /// New name.
    #[serde(default)]
    pub name: Option<String>,
    /// New ISO code.
    #[serde(default)]
    pub iso_code: Option<String>,
    /// Replacement market profile.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub details: Option<serde_json::Value>,
}

impl CountryPatch {
    /// Validate field constraints.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(name) = &self.name {
            crate::check_text("name", name, NAME_MAX)?;
        }
        if let Some(code) = &self.iso_code {
            IsoCode::parse(code)?;
        }
        Ok(())
    }
}

// ── Certification ───────────────────────────────────────────────────────

/// A certificate issued by a regulatory authority (e.g. "WPC", "FCC ID").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Certification {
    /// Surrogate key.
    pub id: CertificationId,
    /// Unique display name.
    pub name: String,
    /// Issuing authority.
    pub authority_name: Option<String>,
    /// Free-text description.
    pub description: Option<String>,
    /// Logo/mark that must appear on the product label.
    pub branding_image_url: Option<String>,
    /// Human-readable labeling rules.
    pub labeling_requirements: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Input for creating a [`Certification`].
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewCertification {
    /// Unique display name.
    pub name: String,
    /// Issuing authority.
    #[serde(default)]
    pub authority_name: Option<String>,
    /// Free-text description.
    #[serde(default)]
    pub description: Option<String>,
    /// Label mark image.
    #[serde(default)]
    pub branding_image_url: Option<String>,
    /// Labeling rules.
    #[serde(default)]
    pub labeling_requirements: Option<String>,
}

impl NewCertification {
    /// Validate field constraints.
    pub fn validate(&self) -> Result<(), ValidationError> {
        crate::check_text("name", &self.name, NAME_MAX)?;
        if let Some(authority) = &self.authority_name {
            crate::check_text("authority_name", authority, AUTHORITY_MAX)?;
        }
        Ok(())
    }
}

/// Partial update of a [`Certification`].
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CertificationPatch {
    /// New name.
    #[serde(default)]
    pub name: Option<String>,
    /// New authority.
    #[serde(default)]
    pub authority_name: Option<String>,
    /// New description.
    #[serde(default)]
    pub description: Option<String>,
    /// New label mark image.
    #[serde(default)]
    pub branding_image_url: Option<String>,
    /// New labeling rules.
    #[serde(default)]
    pub labeling_requirements: Option<String>,
}

impl CertificationPatch {
    /// Validate field constraints.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(name) = &self.name {
            crate::check_text("name", name, NAME_MAX)?;
        }
        if let Some(authority) = &self.authority_name {
            crate::check_text("authority_name", authority, AUTHORITY_MAX)?;
        }
        Ok(())
    }
}

// ── Regulatory rule ─────────────────────────────────────────────────────

/// The uniqueness key of a [`RegulatoryRule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleKey {
    /// Technology that triggers the requirement.
    pub technology_id: TechnologyId,
    /// Country imposing the requirement.
    pub country_id: CountryId,
    /// Certificate required.
    pub certification_id: CertificationId,
}

/// One edge of the rule matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RegulatoryRule {
    /// Surrogate key.
    pub id: RuleId,
    /// Technology that triggers the requirement.
    pub technology_id: TechnologyId,
    /// Country imposing the requirement.
    pub country_id: CountryId,
    /// Certificate required.
    pub certification_id: CertificationId,
    /// Legally required (`true`) or merely recommended. Gap analysis only
    /// considers mandatory rules.
    pub is_mandatory: bool,
    /// Free-text notes.
    pub notes: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl RegulatoryRule {
    /// The triple this rule occupies in the matrix.
    pub fn key(&self) -> RuleKey {
        RuleKey {
            technology_id: self.technology_id,
            country_id: self.country_id,
            certification_id: self.certification_id,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Input for creating a [`RegulatoryRule`].
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewRule {
    /// Technology that triggers the requirement.
    pub technology_id: TechnologyId,
    /// Country imposing the requirement.
    pub country_id: CountryId,
    /// Certificate required.
    pub certification_id: CertificationId,
    /// Defaults to `true`.
    #[serde(default = "default_true")]
    pub is_mandatory: bool,
    /// Free-text notes.
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewRule {
    /// The triple the new rule would occupy.
    pub fn key(&self) -> RuleKey {
        RuleKey {
            technology_id: self.technology_id,
            country_id: self.country_id,
            certification_id: self.certification_id,
        }
    }
}

/// Partial update of a [`RegulatoryRule`]. The triple itself is immutable.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RulePatch {
    /// New mandatory flag.
    #[serde(default)]
    pub is_mandatory: Option<bool>,
    /// New notes.
    #[serde(default)]
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn iso_code_normalizes_case_and_whitespace() {
        let code = IsoCode::parse(" ind ").unwrap();
        assert_eq!(code.as_str(), "IND");
    }

    #[test]
    fn iso_code_rejects_wrong_length_and_digits() {
        assert!(IsoCode::parse("IN").is_err());
        assert!(IsoCode::parse("INDI").is_err());
        assert!(IsoCode::parse("1ND").is_err());
    }

    #[test]
    fn iso_code_rejects_all_sentinel() {
        assert_eq!(
            IsoCode::parse("all"),
            Err(ValidationError::InvalidIsoCode("all".into()))
        );
    }

    #[test]
    fn iso_code_deserialization_validates() {
        assert!(serde_json::from_str::<IsoCode>("\"usa\"").is_ok());
        assert!(serde_json::from_str::<IsoCode>("\"us\"").is_err());
    }

    #[test]
    fn new_rule_defaults_to_mandatory() {
        let rule: NewRule = serde_json::from_str(
            r#"{"technology_id": 1, "country_id": 2, "certification_id": 3}"#,
        )
        .unwrap();
        assert!(rule.is_mandatory);
        assert_eq!(rule.key().certification_id, CertificationId::new(3));
    }

    #[test]
    fn new_technology_requires_name() {
        let tech = NewTechnology {
            name: "   ".into(),
            description: None,
        };
        assert_eq!(tech.validate(), Err(ValidationError::EmptyField("name")));
    }

    #[test]
    fn certification_name_length_is_bounded() {
        let cert = NewCertification {
            name: "x".repeat(101),
            authority_name: None,
            description: None,
            branding_image_url: None,
            labeling_requirements: None,
        };
        assert!(matches!(
            cert.validate(),
            Err(ValidationError::TooLong { field: "name", .. })
        ));
    }

    proptest! {
        #[test]
        fn any_three_letters_except_all_parse(code in "[a-zA-Z]{3}") {
            let parsed = IsoCode::parse(&code);
            if code.eq_ignore_ascii_case("ALL") {
                prop_assert!(parsed.is_err());
            } else {
                let parsed = parsed.unwrap();
                prop_assert_eq!(parsed.as_str(), code.to_ascii_uppercase());
            }
        }
    }
}
