//! # Device Technology Profile
//!
//! A tenant's product: the set of technologies it embeds and the markets it
//! targets. The pair (technology set, country) is the query key of gap
//! analysis.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ValidationError;
use crate::identity::{DeviceId, TechnologyId, TenantId};

/// Target-market sentinel meaning "every cataloged country".
pub const ALL_COUNTRIES: &str = "ALL";

const MODEL_NAME_MAX: usize = 100;
const SKU_MAX: usize = 50;

/// The markets a device is intended for.
///
/// Serialized as a list of ISO codes; a list containing `"ALL"` (any case)
/// becomes [`TargetMarkets::All`]. Codes are upper-cased but otherwise kept
/// verbatim: unknown codes are tolerated here and skipped during bulk
/// initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub enum TargetMarkets {
    /// Every cataloged country.
    All,
    /// The listed ISO codes.
    Countries(Vec<String>),
}

impl TargetMarkets {
    /// Whether there is nothing to initialize.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Countries(codes) if codes.is_empty())
    }
}

impl Default for TargetMarkets {
    fn default() -> Self {
        Self::All
    }
}

impl From<Vec<String>> for TargetMarkets {
    fn from(raw: Vec<String>) -> Self {
        if raw
            .iter()
            .any(|code| code.trim().eq_ignore_ascii_case(ALL_COUNTRIES))
        {
            return Self::All;
        }
        let mut codes: Vec<String> = Vec::with_capacity(raw.len());
        for code in raw {
            let code = code.trim().to_ascii_uppercase();
            if !code.is_empty() && !codes.contains(&code) {
                codes.push(code);
            }
        }
        Self::Countries(codes)
    }
}

impl From<TargetMarkets> for Vec<String> {
    fn from(markets: TargetMarkets) -> Self {
        match markets {
            TargetMarkets::All => vec![ALL_COUNTRIES.to_string()],
            TargetMarkets::Countries(codes) => codes,
        }
    }
}

/// A tenant-owned product and its technology profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Device {
    /// Identifier.
    pub id: DeviceId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Marketing/model name.
    pub model_name: String,
    /// Stock keeping unit.
    pub sku: Option<String>,
    /// Free-text description.
    pub description: Option<String>,
    /// Markets the device targets.
    #[schema(value_type = Vec<String>)]
    pub target_countries: TargetMarkets,
    /// Declared technologies.
    pub technology_ids: BTreeSet<TechnologyId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a [`Device`].
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewDevice {
    /// Marketing/model name.
    pub model_name: String,
    /// Stock keeping unit.
    #[serde(default)]
    pub sku: Option<String>,
    /// Free-text description.
    #[serde(default)]
    pub description: Option<String>,
    /// Defaults to `["ALL"]`.
    #[serde(default)]
    #[schema(value_type = Vec<String>)]
    pub target_countries: TargetMarkets,
    /// Declared technologies.
    #[serde(default)]
    pub technology_ids: BTreeSet<TechnologyId>,
}

impl NewDevice {
    /// Validate field constraints.
    pub fn validate(&self) -> Result<(), ValidationError> {
        crate::check_text("model_name", &self.model_name, MODEL_NAME_MAX)?;
        if let Some(sku) = &self.sku {
            crate::check_text("sku", sku, SKU_MAX)?;
        }
        Ok(())
    }
}

/// Partial update of a [`Device`].
///
/// `technology_ids`, when present, replaces the whole set.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct DevicePatch {
    /// New model name.
    #[serde(default)]
    pub model_name: Option<String>,
    /// New SKU.
    #[serde(default)]
    pub sku: Option<String>,
    /// New description.
    #[serde(default)]
    pub description: Option<String>,
    /// Replacement target markets.
    #[serde(default)]
    #[schema(value_type = Option<Vec<String>>)]
    pub target_countries: Option<TargetMarkets>,
    /// Replacement technology set.
    #[serde(default)]
    pub technology_ids: Option<BTreeSet<TechnologyId>>,
}

impl DevicePatch {
    /// Validate field constraints.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(name) = &self.model_name {
            crate::check_text("model_name", name, MODEL_NAME_MAX)?;
        }
        if let Some(sku) = &self.sku {
            crate::check_text("sku", sku, SKU_MAX)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_sentinel_wins_over_explicit_codes() {
        let markets = TargetMarkets::from(vec!["IND".to_string(), "all".to_string()]);
        assert_eq!(markets, TargetMarkets::All);
    }

    #[test]
    fn explicit_codes_are_normalized_and_deduplicated() {
        let markets = TargetMarkets::from(vec![
            "ind".to_string(),
            " IND ".to_string(),
            "usa".to_string(),
        ]);
        assert_eq!(
            markets,
            TargetMarkets::Countries(vec!["IND".to_string(), "USA".to_string()])
        );
    }

    #[test]
    fn target_markets_default_to_all() {
        let device: NewDevice = serde_json::from_str(r#"{"model_name": "Tractor X9"}"#).unwrap();
        assert_eq!(device.target_countries, TargetMarkets::All);
        assert!(device.technology_ids.is_empty());
    }

    #[test]
    fn target_markets_serialize_as_list() {
        let json = serde_json::to_value(TargetMarkets::All).unwrap();
        assert_eq!(json, serde_json::json!(["ALL"]));
        let json = serde_json::to_value(TargetMarkets::Countries(vec!["DEU".into()])).unwrap();
        assert_eq!(json, serde_json::json!(["DEU"]));
    }

    #[test]
    fn empty_target_list_is_empty() {
        assert!(TargetMarkets::from(Vec::<String>::new()).is_empty());
        assert!(!TargetMarkets::All.is_empty());
    }

    #[test]
    fn sku_length_is_bounded() {
        let device = NewDevice {
            model_name: "Watch".into(),
            sku: Some("S".repeat(51)),
            description: None,
            target_countries: TargetMarkets::All,
            technology_ids: BTreeSet::new(),
        };
        assert!(device.validate().is_err());
    }
}
