//! # Bulk Gap Initialization
//!
//! Runs gap analysis for a device across its target markets and opens a
//! PENDING record for every gap. Re-running is harmless: gaps already
//! covered by a record are no longer gaps, and a gap line whose key was
//! opened earlier in the same run (two technologies requiring the same
//! certification) is counted as skipped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use tamsys_core::{CountryId, DeviceId, IsoCode, TamsysError, TargetMarkets, TenantId};
use tamsys_state::{ComplianceRecord, RecordKey};

use crate::gap::analyze;
use crate::registry::Registry;

/// Counts from one initialization run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct BulkInitReport {
    /// Device initialized.
    pub device_id: DeviceId,
    /// Markets analyzed.
    pub countries_processed: usize,
    /// PENDING records opened.
    pub records_created: usize,
    /// Gap lines whose record key already existed.
    pub records_skipped_existing: usize,
    /// Target codes with no cataloged country.
    pub unknown_country_codes: Vec<String>,
}

/// The report plus the records it created, for write-through persistence.
#[derive(Debug, Clone)]
pub struct BulkInitOutcome {
    /// Counts.
    pub report: BulkInitReport,
    /// Records opened by this run.
    pub created: Vec<ComplianceRecord>,
}

/// Open PENDING records for every gap of `device_id` across `markets`.
///
/// `TargetMarkets::All` covers every cataloged country. Unknown ISO codes
/// are logged and skipped. Only an unknown (or foreign) device fails the
/// run; per-country problems are logged and the run continues.
pub fn initialize_gaps(
    registry: &mut Registry,
    tenant_id: TenantId,
    device_id: DeviceId,
    markets: &TargetMarkets,
    now: DateTime<Utc>,
) -> Result<BulkInitOutcome, TamsysError> {
    registry.device(tenant_id, device_id)?;

    let mut outcome = BulkInitOutcome {
        report: BulkInitReport {
            device_id,
            countries_processed: 0,
            records_created: 0,
            records_skipped_existing: 0,
            unknown_country_codes: Vec::new(),
        },
        created: Vec::new(),
    };
    let countries = resolve_markets(registry, markets, &mut outcome.report);

    for country_id in countries {
        let analysis = match analyze(registry, tenant_id, device_id, country_id) {
            Ok(analysis) => analysis,
            Err(err) => {
                tracing::warn!(
                    %device_id,
                    %country_id,
                    error = %err,
                    "gap analysis failed, skipping country"
                );
                continue;
            }
        };
        outcome.report.countries_processed += 1;

        for item in analysis.results.iter().filter(|item| item.has_gap) {
            let key = RecordKey {
                tenant_id,
                device_id,
                country_id,
                certification_id: item.certification_id,
            };
            let record = ComplianceRecord::pending(key, now);
            match registry.insert_record(record.clone()) {
                Ok(()) => {
                    outcome.report.records_created += 1;
                    outcome.created.push(record);
                }
                Err(err) if err.is_conflict() => {
                    outcome.report.records_skipped_existing += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        %device_id,
                        %country_id,
                        certification_id = %item.certification_id,
                        error = %err,
                        "could not open record"
                    );
                }
            }
        }
    }

    metrics::counter!("tamsys_bulk_records_created_total")
        .increment(outcome.report.records_created as u64);
    tracing::info!(
        %tenant_id,
        %device_id,
        countries_processed = outcome.report.countries_processed,
        records_created = outcome.report.records_created,
        records_skipped_existing = outcome.report.records_skipped_existing,
        "bulk gap initialization complete"
    );
    Ok(outcome)
}

fn resolve_markets(
    registry: &Registry,
    markets: &TargetMarkets,
    report: &mut BulkInitReport,
) -> Vec<CountryId> {
    match markets {
        TargetMarkets::All => registry.countries().map(|c| c.id).collect(),
        TargetMarkets::Countries(codes) => {
            let mut ids = Vec::with_capacity(codes.len());
            for code in codes {
                let country = IsoCode::parse(code)
                    .ok()
                    .and_then(|iso| registry.country_by_iso(&iso));
                match country {
                    Some(country) => ids.push(country.id),
                    None => {
                        tracing::warn!(iso_code = %code, "unknown target country, skipping");
                        report.unknown_country_codes.push(code.clone());
                    }
                }
            }
            ids
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::fixtures::*;
    use crate::registry::RecordFilter;
    use tamsys_core::CertificationId;
    use tamsys_state::ComplianceStatus;

    struct Markets {
        registry: Registry,
        acme: TenantId,
        watch: DeviceId,
        wpc: CertificationId,
        ind: CountryId,
    }

    /// Five markets; rules exist only for India and Brazil.
    fn markets() -> Markets {
        let mut registry = Registry::new();
        let wifi = technology(&mut registry, "Wi-Fi 6E");
        let ind = country(&mut registry, "India", "IND");
        let bra = country(&mut registry, "Brazil", "BRA");
        country(&mut registry, "Germany", "DEU");
        country(&mut registry, "Japan", "JPN");
        country(&mut registry, "Mexico", "MEX");
        let wpc = certification(&mut registry, "WPC");
        let anatel = certification(&mut registry, "ANATEL");
        rule(&mut registry, wifi, ind, wpc, true);
        rule(&mut registry, wifi, bra, anatel, true);
        let acme = tenant(&mut registry, "Acme");
        let watch = device(&mut registry, acme, "Watch", &[wifi], TargetMarkets::All);
        Markets {
            registry,
            acme,
            watch,
            wpc,
            ind,
        }
    }

    #[test]
    fn all_markets_open_one_record_per_gap() {
        let mut m = markets();
        let outcome =
            initialize_gaps(&mut m.registry, m.acme, m.watch, &TargetMarkets::All, now()).unwrap();
        assert_eq!(outcome.report.countries_processed, 5);
        assert_eq!(outcome.report.records_created, 2);
        assert_eq!(outcome.report.records_skipped_existing, 0);
        assert_eq!(outcome.created.len(), 2);

        let records = m.registry.records(m.acme, &RecordFilter::default());
        assert_eq!(records.len(), 2);
        assert!(records
            .iter()
            .all(|v| v.record.status == ComplianceStatus::Pending));
    }

    #[test]
    fn second_run_creates_nothing() {
        let mut m = markets();
        initialize_gaps(&mut m.registry, m.acme, m.watch, &TargetMarkets::All, now()).unwrap();
        let before: Vec<_> = m
            .registry
            .records(m.acme, &RecordFilter::default())
            .into_iter()
            .map(|v| v.record.id)
            .collect();

        let outcome =
            initialize_gaps(&mut m.registry, m.acme, m.watch, &TargetMarkets::All, now()).unwrap();
        assert_eq!(outcome.report.records_created, 0);
        assert_eq!(outcome.report.records_skipped_existing, 0);
        let after: Vec<_> = m
            .registry
            .records(m.acme, &RecordFilter::default())
            .into_iter()
            .map(|v| v.record.id)
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn listed_codes_with_unknowns() {
        let mut m = markets();
        let targets = TargetMarkets::from(vec!["ind".to_string(), "XYZ".to_string()]);
        let outcome = initialize_gaps(&mut m.registry, m.acme, m.watch, &targets, now()).unwrap();
        assert_eq!(outcome.report.countries_processed, 1);
        assert_eq!(outcome.report.records_created, 1);
        assert_eq!(outcome.report.unknown_country_codes, vec!["XYZ".to_string()]);
        assert_eq!(outcome.created[0].certification_id, m.wpc);
        assert_eq!(outcome.created[0].country_id, m.ind);
    }

    #[test]
    fn shared_certification_is_opened_once() {
        let mut m = markets();
        let bt = technology(&mut m.registry, "Bluetooth");
        rule(&mut m.registry, bt, m.ind, m.wpc, true);
        let wifi = m.registry.technology_by_name("Wi-Fi 6E").unwrap().id;
        let band = device(&mut m.registry, m.acme, "Band", &[bt, wifi], TargetMarkets::All);
        let targets = TargetMarkets::from(vec!["IND".to_string()]);
        let outcome = initialize_gaps(&mut m.registry, m.acme, band, &targets, now()).unwrap();
        assert_eq!(outcome.report.records_created, 1);
        assert_eq!(outcome.report.records_skipped_existing, 1);
    }

    #[test]
    fn foreign_device_fails() {
        let mut m = markets();
        let globex = tenant(&mut m.registry, "Globex");
        assert!(initialize_gaps(&mut m.registry, globex, m.watch, &TargetMarkets::All, now()).is_err());
    }
}
