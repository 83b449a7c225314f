//! # Dataset Seeding
//!
//! Loads catalog, rule matrix, tenants, devices and records from a YAML
//! document. Rules may name a `group` of countries (for example every EU
//! member state); the group is expanded into one explicit rule per member
//! here, at load time. The rule matrix itself has no notion of groups.
//!
//! Everything is inserted through the [`Registry`], so every uniqueness
//! and reference check applies. Catalog entries, tenants and devices that
//! already exist by name are reused, and duplicate rule triples or record
//! keys are skipped, which makes applying the same dataset twice a no-op.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tamsys_core::{
    CertificationId, CountryId, IsoCode, NewCertification, NewCountry, NewDevice,
    NewNotificationRule, NewRule, NewTechnology, NewTenant, TamsysError, TargetMarkets,
    TechnologyId, TenantId,
};
use tamsys_state::RecordDraft;

use crate::registry::{NewRecord, Registry};

/// Dataset loading failures.
#[derive(Error, Debug)]
pub enum SeedError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The document is not valid dataset YAML.
    #[error("invalid dataset: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A name or code that the dataset and registry do not define.
    #[error("unknown {kind} {name:?}")]
    UnknownReference {
        /// Entity kind.
        kind: &'static str,
        /// The unresolved name.
        name: String,
    },

    /// A rule that lists no countries and no group.
    #[error("rule {technology:?} -> {certification:?} names no countries")]
    RuleWithoutCountries {
        /// Technology name.
        technology: String,
        /// Certification name.
        certification: String,
    },

    /// The registry rejected an entry.
    #[error(transparent)]
    Registry(#[from] TamsysError),
}

/// A rule line as written in the dataset.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    /// Technology name.
    pub technology: String,
    /// Explicit ISO codes.
    #[serde(default)]
    pub countries: Vec<String>,
    /// Name of a `country_groups` entry.
    #[serde(default)]
    pub group: Option<String>,
    /// Certification name.
    pub certification: String,
    /// Defaults to `true`.
    #[serde(default = "default_true")]
    pub mandatory: bool,
    /// Free-text notes.
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_true() -> bool {
    true
}

/// A tenant with its notification thresholds.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TenantSpec {
    /// Organization name; the key other sections refer to.
    pub name: String,
    /// Contact address.
    #[serde(default)]
    pub contact_email: Option<String>,
    /// Expiry thresholds.
    #[serde(default)]
    pub notification_rules: Vec<NewNotificationRule>,
}

/// A device, referring to its tenant and technologies by name.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceSpec {
    /// Owning tenant's name.
    pub tenant: String,
    /// Model name; the key records refer to.
    pub model_name: String,
    /// SKU.
    #[serde(default)]
    pub sku: Option<String>,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Technology names.
    #[serde(default)]
    pub technologies: Vec<String>,
    /// ISO codes or `ALL`; defaults to `ALL`.
    #[serde(default)]
    pub target_countries: TargetMarkets,
}

/// A record, referring to everything by name or code.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordSpec {
    /// Tenant name.
    pub tenant: String,
    /// Device model name.
    pub device: String,
    /// Country ISO code.
    pub country: String,
    /// Certification name.
    pub certification: String,
    /// Field values.
    #[serde(flatten)]
    pub draft: RecordDraft,
}

/// A parsed dataset document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Dataset {
    /// Technologies.
    #[serde(default)]
    pub technologies: Vec<NewTechnology>,
    /// Countries.
    #[serde(default)]
    pub countries: Vec<NewCountry>,
    /// Certifications.
    #[serde(default)]
    pub certifications: Vec<NewCertification>,
    /// Named country lists usable in rules.
    #[serde(default)]
    pub country_groups: BTreeMap<String, Vec<String>>,
    /// Rule lines before group expansion.
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
    /// Tenants.
    #[serde(default)]
    pub tenants: Vec<TenantSpec>,
    /// Devices.
    #[serde(default)]
    pub devices: Vec<DeviceSpec>,
    /// Records.
    #[serde(default)]
    pub records: Vec<RecordSpec>,
}

/// One rule after group expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpandedRule {
    /// Technology name.
    pub technology: String,
    /// ISO code.
    pub country: String,
    /// Certification name.
    pub certification: String,
    /// Mandatory flag.
    pub mandatory: bool,
    /// Notes.
    pub notes: Option<String>,
}

/// What applying a dataset did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    /// Technologies inserted.
    pub technologies_created: usize,
    /// Countries inserted.
    pub countries_created: usize,
    /// Certifications inserted.
    pub certifications_created: usize,
    /// Catalog entries that already existed by name or code.
    pub catalog_reused: usize,
    /// Rules inserted after expansion.
    pub rules_created: usize,
    /// Expanded rules whose triple already existed.
    pub rules_skipped: usize,
    /// Tenants inserted.
    pub tenants_created: usize,
    /// Notification rules inserted.
    pub notification_rules_created: usize,
    /// Devices inserted.
    pub devices_created: usize,
    /// Records inserted.
    pub records_created: usize,
    /// Records whose key already existed.
    pub records_skipped: usize,
}

impl Dataset {
    /// Parse a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, SeedError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse a YAML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SeedError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    /// Rule lines with every group replaced by its members, in document
    /// order. Country codes are normalized to upper case.
    pub fn expand_rules(&self) -> Result<Vec<ExpandedRule>, SeedError> {
        let mut expanded = Vec::new();
        for spec in &self.rules {
            let mut codes: Vec<&String> = spec.countries.iter().collect();
            if let Some(group) = &spec.group {
                let members =
                    self.country_groups
                        .get(group)
                        .ok_or_else(|| SeedError::UnknownReference {
                            kind: "country group",
                            name: group.clone(),
                        })?;
                codes.extend(members);
            }
            if codes.is_empty() {
                return Err(SeedError::RuleWithoutCountries {
                    technology: spec.technology.clone(),
                    certification: spec.certification.clone(),
                });
            }
            for code in codes {
                expanded.push(ExpandedRule {
                    technology: spec.technology.trim().to_string(),
                    country: code.trim().to_ascii_uppercase(),
                    certification: spec.certification.trim().to_string(),
                    mandatory: spec.mandatory,
                    notes: spec.notes.clone(),
                });
            }
        }
        Ok(expanded)
    }
}

/// Parse `yaml` and load it into a fresh registry.
pub fn load_dataset(yaml: &str, now: DateTime<Utc>) -> Result<(Registry, SeedReport), SeedError> {
    let dataset = Dataset::from_yaml(yaml)?;
    let mut registry = Registry::new();
    let report = apply_dataset(&mut registry, &dataset, now)?;
    Ok((registry, report))
}

/// Insert a dataset into an existing registry.
///
/// Stops at the first unresolved reference or rejected entry; entries
/// inserted before the failure stay in the registry.
pub fn apply_dataset(
    registry: &mut Registry,
    dataset: &Dataset,
    now: DateTime<Utc>,
) -> Result<SeedReport, SeedError> {
    let mut report = SeedReport::default();

    for input in &dataset.technologies {
        if registry.technology_by_name(input.name.trim()).is_some() {
            report.catalog_reused += 1;
        } else {
            registry.create_technology(input.clone(), now)?;
            report.technologies_created += 1;
        }
    }
    for input in &dataset.countries {
        let iso = IsoCode::parse(&input.iso_code).map_err(TamsysError::from)?;
        if registry.country_by_iso(&iso).is_some() {
            report.catalog_reused += 1;
        } else {
            registry.create_country(input.clone(), now)?;
            report.countries_created += 1;
        }
    }
    for input in &dataset.certifications {
        if registry.certification_by_name(input.name.trim()).is_some() {
            report.catalog_reused += 1;
        } else {
            registry.create_certification(input.clone(), now)?;
            report.certifications_created += 1;
        }
    }

    for rule in dataset.expand_rules()? {
        let input = NewRule {
            technology_id: technology_id(registry, &rule.technology)?,
            country_id: country_id(registry, &rule.country)?,
            certification_id: certification_id(registry, &rule.certification)?,
            is_mandatory: rule.mandatory,
            notes: rule.notes.clone(),
        };
        match registry.create_rule(input, now) {
            Ok(_) => report.rules_created += 1,
            Err(err) if err.is_conflict() => {
                tracing::warn!(
                    technology = %rule.technology,
                    country = %rule.country,
                    certification = %rule.certification,
                    "duplicate rule skipped"
                );
                report.rules_skipped += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }

    for spec in &dataset.tenants {
        let tenant_id = match registry.tenant_by_name(&spec.name) {
            Some(tenant) => tenant.id,
            None => {
                let tenant = registry.create_tenant(
                    NewTenant {
                        name: spec.name.clone(),
                        contact_email: spec.contact_email.clone(),
                    },
                    now,
                )?;
                report.tenants_created += 1;
                tenant.id
            }
        };
        let existing: Vec<u16> = registry
            .notification_rules(tenant_id)
            .iter()
            .map(|r| r.days_before_expiry)
            .collect();
        for rule in &spec.notification_rules {
            if existing.iter().any(|d| i64::from(*d) == rule.days_before_expiry) {
                continue;
            }
            registry.create_notification_rule(tenant_id, rule.clone(), now)?;
            report.notification_rules_created += 1;
        }
    }

    for spec in &dataset.devices {
        let tenant_id = tenant_id(registry, &spec.tenant)?;
        if registry.device_by_model(tenant_id, &spec.model_name).is_some() {
            continue;
        }
        let technology_ids = spec
            .technologies
            .iter()
            .map(|name| technology_id(registry, name))
            .collect::<Result<_, _>>()?;
        registry.create_device(
            tenant_id,
            NewDevice {
                model_name: spec.model_name.clone(),
                sku: spec.sku.clone(),
                description: spec.description.clone(),
                target_countries: spec.target_countries.clone(),
                technology_ids,
            },
            now,
        )?;
        report.devices_created += 1;
    }

    for spec in &dataset.records {
        let tenant_id = tenant_id(registry, &spec.tenant)?;
        let device_id = registry
            .device_by_model(tenant_id, &spec.device)
            .map(|d| d.id)
            .ok_or_else(|| SeedError::UnknownReference {
                kind: "device",
                name: spec.device.clone(),
            })?;
        let input = NewRecord {
            device_id,
            country_id: country_id(registry, &spec.country)?,
            certification_id: certification_id(registry, &spec.certification)?,
            draft: spec.draft.clone(),
        };
        match registry.create_record(tenant_id, input, now) {
            Ok(_) => report.records_created += 1,
            Err(err) if err.is_conflict() => report.records_skipped += 1,
            Err(err) => return Err(err.into()),
        }
    }

    tracing::info!(
        rules_created = report.rules_created,
        rules_skipped = report.rules_skipped,
        devices_created = report.devices_created,
        records_created = report.records_created,
        "dataset applied"
    );
    Ok(report)
}

fn technology_id(registry: &Registry, name: &str) -> Result<TechnologyId, SeedError> {
    registry
        .technology_by_name(name.trim())
        .map(|t| t.id)
        .ok_or_else(|| SeedError::UnknownReference {
            kind: "technology",
            name: name.to_string(),
        })
}

fn country_id(registry: &Registry, code: &str) -> Result<CountryId, SeedError> {
    IsoCode::parse(code)
        .ok()
        .and_then(|iso| registry.country_by_iso(&iso))
        .map(|c| c.id)
        .ok_or_else(|| SeedError::UnknownReference {
            kind: "country",
            name: code.to_string(),
        })
}

fn certification_id(registry: &Registry, name: &str) -> Result<CertificationId, SeedError> {
    registry
        .certification_by_name(name.trim())
        .map(|c| c.id)
        .ok_or_else(|| SeedError::UnknownReference {
            kind: "certification",
            name: name.to_string(),
        })
}

fn tenant_id(registry: &Registry, name: &str) -> Result<TenantId, SeedError> {
    registry
        .tenant_by_name(name)
        .map(|t| t.id)
        .ok_or_else(|| SeedError::UnknownReference {
            kind: "tenant",
            name: name.to_string(),
        })
}
