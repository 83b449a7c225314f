//! # Gap Analysis Engine
//!
//! Reconciles what a device *needs* in a market (mandatory rules for its
//! technologies) against what the tenant *holds* (compliance records for
//! that device and market).
//!
//! Counts are per certification, not per rule: a certification required by
//! two of the device's technologies is one requirement and at most one gap,
//! while the result list keeps one line per matching rule so callers can
//! show which technology triggered it.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;

use tamsys_core::{
    CertificationId, CountryId, DeviceId, RecordId, RuleId, TamsysError, TechnologyId, TenantId,
};
use tamsys_state::{ComplianceRecord, ComplianceStatus};

use crate::registry::Registry;

/// Status of one requirement in a gap analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequirementStatus {
    /// No record exists for the required certification.
    Missing,
    /// Record exists, certificate not yet obtained.
    Pending,
    /// Certificate held.
    Active,
    /// Certificate near expiry.
    Expiring,
    /// Certificate expired.
    Expired,
}

impl From<ComplianceStatus> for RequirementStatus {
    fn from(status: ComplianceStatus) -> Self {
        match status {
            ComplianceStatus::Pending => Self::Pending,
            ComplianceStatus::Active => Self::Active,
            ComplianceStatus::Expiring => Self::Expiring,
            ComplianceStatus::Expired => Self::Expired,
        }
    }
}

/// One (technology, rule) line of a gap analysis.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct GapItem {
    /// Required certification.
    pub certification_id: CertificationId,
    /// Its name.
    pub certification_name: String,
    /// Technology that triggered the requirement.
    pub technology_id: TechnologyId,
    /// Its name.
    pub technology_name: String,
    /// The matching rule.
    pub rule_id: RuleId,
    /// True when no record exists.
    pub has_gap: bool,
    /// MISSING or the record's status.
    pub status: RequirementStatus,
    /// Expiry of the existing record.
    pub expiry_date: Option<NaiveDate>,
    /// The existing record.
    pub record_id: Option<RecordId>,
    /// Certification mark artwork.
    pub branding_image_url: Option<String>,
    /// Label text requirements.
    pub labeling_requirements: Option<String>,
    /// Open compliance-testing tasks on the existing record.
    pub open_tasks_count: usize,
}

/// Result of [`analyze`].
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct GapAnalysis {
    /// Device analyzed.
    pub device_id: DeviceId,
    /// Market analyzed.
    pub country_id: CountryId,
    /// Distinct certifications required.
    pub total_required: usize,
    /// Distinct required certifications with no record.
    pub gaps_found: usize,
    /// One item per matching rule.
    pub results: Vec<GapItem>,
}

impl GapAnalysis {
    /// Certifications with no record, deduplicated.
    pub fn missing_certifications(&self) -> BTreeSet<CertificationId> {
        self.results
            .iter()
            .filter(|item| item.has_gap)
            .map(|item| item.certification_id)
            .collect()
    }
}

/// Compare required against held certifications for one device in one
/// market.
///
/// # Errors
///
/// `NotFound` if the device does not exist or belongs to another tenant, or
/// if the country does not exist.
pub fn analyze(
    registry: &Registry,
    tenant_id: TenantId,
    device_id: DeviceId,
    country_id: CountryId,
) -> Result<GapAnalysis, TamsysError> {
    let device = registry.device(tenant_id, device_id)?;
    if registry.country(country_id).is_none() {
        return Err(TamsysError::not_found("country", country_id));
    }
    metrics::counter!("tamsys_gap_analyses_total").increment(1);

    let held: HashMap<CertificationId, &ComplianceRecord> = registry
        .records_for(tenant_id, device_id, country_id)
        .map(|record| (record.certification_id, record))
        .collect();

    let mut required = BTreeSet::new();
    let mut missing = BTreeSet::new();
    let mut results = Vec::new();
    for rule in registry.rules_for(&device.technology_ids, country_id) {
        let certification = registry.certification(rule.certification_id);
        let technology_name = registry
            .technology(rule.technology_id)
            .map(|t| t.name.clone())
            .unwrap_or_default();
        required.insert(rule.certification_id);

        let item = match held.get(&rule.certification_id) {
            Some(record) => GapItem {
                certification_id: rule.certification_id,
                certification_name: certification.map(|c| c.name.clone()).unwrap_or_default(),
                technology_id: rule.technology_id,
                technology_name,
                rule_id: rule.id,
                has_gap: false,
                status: record.status.into(),
                expiry_date: record.expiry_date,
                record_id: Some(record.id),
                branding_image_url: certification.and_then(|c| c.branding_image_url.clone()),
                labeling_requirements: certification.and_then(|c| c.labeling_requirements.clone()),
                open_tasks_count: registry.open_testing_tasks(record.id),
            },
            None => {
                missing.insert(rule.certification_id);
                GapItem {
                    certification_id: rule.certification_id,
                    certification_name: certification.map(|c| c.name.clone()).unwrap_or_default(),
                    technology_id: rule.technology_id,
                    technology_name,
                    rule_id: rule.id,
                    has_gap: true,
                    status: RequirementStatus::Missing,
                    expiry_date: None,
                    record_id: None,
                    branding_image_url: certification.and_then(|c| c.branding_image_url.clone()),
                    labeling_requirements: certification
                        .and_then(|c| c.labeling_requirements.clone()),
                    open_tasks_count: 0,
                }
            }
        };
        results.push(item);
    }

    tracing::debug!(
        %tenant_id,
        %device_id,
        %country_id,
        total_required = required.len(),
        gaps_found = missing.len(),
        "gap analysis complete"
    );
    Ok(GapAnalysis {
        device_id,
        country_id,
        total_required: required.len(),
        gaps_found: missing.len(),
        results,
    })
}
