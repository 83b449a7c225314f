//! # tamsys-cli — CLI Tool for TAMSys
//!
//! Provides the `tamsys` command-line interface. Every subcommand reads a
//! YAML dataset (the same format `SEED_FILE` uses for the API service),
//! loads it into a fresh in-memory registry, and works on that. Nothing is
//! written back to the file or to a database.
//!
//! ## Subcommands
//!
//! - `tamsys seed` — Validate a dataset and print counts and expanded rules.
//! - `tamsys gap` — Gap analysis for one device in one market.
//! - `tamsys init` — Bulk gap initialization for one device.
//! - `tamsys expiry` — Dry-run of the daily expiry job.
//!
//! ```bash
//! tamsys seed data/catalog.yaml --json
//! tamsys gap data/catalog.yaml --device "Router X1" --country IND
//! tamsys expiry data/catalog.yaml --today 2025-06-01
//! ```

pub mod expiry;
pub mod gap;
pub mod init;
pub mod seed;

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use tamsys_compliance::{apply_dataset, Dataset, Registry, SeedReport};
use tamsys_core::{CountryId, DeviceId, IsoCode, TenantId};

/// A dataset file loaded into a registry.
pub struct Loaded {
    /// The parsed document.
    pub dataset: Dataset,
    /// Registry holding everything the document defines.
    pub registry: Registry,
    /// What loading inserted.
    pub report: SeedReport,
}

/// Read `path` and apply it to an empty registry.
pub fn load(path: &Path, now: DateTime<Utc>) -> Result<Loaded> {
    let dataset = Dataset::from_path(path)
        .with_context(|| format!("failed to read dataset {}", path.display()))?;
    let mut registry = Registry::new();
    let report = apply_dataset(&mut registry, &dataset, now)
        .with_context(|| format!("failed to load dataset {}", path.display()))?;
    tracing::debug!(path = %path.display(), counts = ?registry.counts(), "dataset loaded");
    Ok(Loaded {
        dataset,
        registry,
        report,
    })
}

/// Resolve `--tenant`, or the dataset's only tenant when omitted.
pub fn resolve_tenant(registry: &Registry, name: Option<&str>) -> Result<TenantId> {
    if let Some(name) = name {
        return registry
            .tenant_by_name(name)
            .map(|t| t.id)
            .with_context(|| format!("unknown tenant {name:?}"));
    }
    match registry.tenants().as_slice() {
        [only] => Ok(only.id),
        [] => bail!("dataset defines no tenants"),
        many => bail!("dataset defines {} tenants; pass --tenant", many.len()),
    }
}

/// Resolve a device by model name within a tenant.
pub fn resolve_device(registry: &Registry, tenant_id: TenantId, model: &str) -> Result<DeviceId> {
    registry
        .device_by_model(tenant_id, model)
        .map(|d| d.id)
        .with_context(|| format!("unknown device {model:?}"))
}

/// Resolve a country by ISO code.
pub fn resolve_country(registry: &Registry, code: &str) -> Result<CountryId> {
    let iso = IsoCode::parse(code)?;
    registry
        .country_by_iso(&iso)
        .map(|c| c.id)
        .with_context(|| format!("unknown country {code:?}"))
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
pub(crate) mod testdata {
    use std::io::Write;

    use chrono::{DateTime, TimeZone, Utc};
    use tempfile::NamedTempFile;

    /// One rule (WiFi in India and Japan requires a certificate per
    /// market), one tenant with a 9-day threshold, one device.
    pub const DATASET: &str = r#"
technologies:
  - name: WiFi
countries:
  - name: India
    iso_code: IND
  - name: Japan
    iso_code: JPN
certifications:
  - name: WPC
  - name: MIC
country_groups:
  apac: [IND]
rules:
  - technology: WiFi
    group: apac
    certification: WPC
  - technology: WiFi
    countries: [jpn]
    certification: MIC
tenants:
  - name: Acme
    notification_rules:
      - days_before_expiry: 9
devices:
  - tenant: Acme
    model_name: Router X1
    technologies: [WiFi]
    target_countries: [IND, JPN]
records:
  - tenant: Acme
    device: Router X1
    country: IND
    certification: WPC
    status: ACTIVE
    expiry_date: 2025-06-10
"#;

    pub fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
    }

    pub fn write(yaml: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }
}

#[cfg(test)]
mod tests {
    use super::testdata::*;
    use super::*;

    #[test]
    fn load_reports_inserted_entities() {
        let file = write(DATASET);
        let loaded = load(file.path(), now()).unwrap();
        assert_eq!(loaded.report.rules_created, 2);
        assert_eq!(loaded.report.devices_created, 1);
        assert_eq!(loaded.report.records_created, 1);
    }

    #[test]
    fn load_missing_file_names_path() {
        let err = load(Path::new("/nonexistent/data.yaml"), now())
            .err()
            .unwrap();
        assert!(format!("{err:#}").contains("/nonexistent/data.yaml"));
    }

    #[test]
    fn tenant_defaults_to_only_tenant() {
        let file = write(DATASET);
        let loaded = load(file.path(), now()).unwrap();
        let id = resolve_tenant(&loaded.registry, None).unwrap();
        assert_eq!(resolve_tenant(&loaded.registry, Some("Acme")).unwrap(), id);
        assert!(resolve_tenant(&loaded.registry, Some("Globex")).is_err());
    }

    #[test]
    fn tenant_required_when_ambiguous() {
        let file = write("tenants:\n  - name: Acme\n  - name: Globex\n");
        let loaded = load(file.path(), now()).unwrap();
        let err = resolve_tenant(&loaded.registry, None).unwrap_err();
        assert!(err.to_string().contains("--tenant"));
    }

    #[test]
    fn country_lookup_normalizes_code() {
        let file = write(DATASET);
        let loaded = load(file.path(), now()).unwrap();
        assert!(resolve_country(&loaded.registry, "ind").is_ok());
        assert!(resolve_country(&loaded.registry, "DEU").is_err());
        assert!(resolve_country(&loaded.registry, "ALL").is_err());
    }
}
