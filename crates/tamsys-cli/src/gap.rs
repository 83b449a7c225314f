//! # Gap CLI — Which certifications a device still lacks in one market.
//!
//! Exits with status 2 when at least one mandatory certification has no
//! record, so the command can gate a CI job.

use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::Args;

use tamsys_compliance::analyze;

use crate::{load, print_json, resolve_country, resolve_device, resolve_tenant};

/// Gap subcommand arguments.
#[derive(Args, Debug)]
pub struct GapArgs {
    /// Dataset YAML file.
    pub file: PathBuf,

    /// Device model name.
    #[arg(long)]
    pub device: String,

    /// Country ISO code.
    #[arg(long)]
    pub country: String,

    /// Tenant name; optional when the dataset has a single tenant.
    #[arg(long)]
    pub tenant: Option<String>,

    /// Print the analysis as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Execute the gap subcommand.
pub fn run_gap(args: &GapArgs) -> Result<u8> {
    let loaded = load(&args.file, Utc::now())?;
    let registry = &loaded.registry;
    let tenant_id = resolve_tenant(registry, args.tenant.as_deref())?;
    let device_id = resolve_device(registry, tenant_id, &args.device)?;
    let country_id = resolve_country(registry, &args.country)?;

    let analysis = analyze(registry, tenant_id, device_id, country_id)?;
    let code = if analysis.gaps_found > 0 { 2 } else { 0 };

    if args.json {
        print_json(&analysis)?;
        return Ok(code);
    }

    println!(
        "{} in {}: {} required, {} missing",
        args.device,
        args.country.to_ascii_uppercase(),
        analysis.total_required,
        analysis.gaps_found
    );
    for item in &analysis.results {
        let expiry = item
            .expiry_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<24} {:<16} {:<9} expires {expiry}",
            item.certification_name,
            item.technology_name,
            format!("{:?}", item.status).to_uppercase(),
        );
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdata::*;

    fn args(file: &tempfile::NamedTempFile, country: &str) -> GapArgs {
        GapArgs {
            file: file.path().to_path_buf(),
            device: "Router X1".into(),
            country: country.into(),
            tenant: None,
            json: true,
        }
    }

    #[test]
    fn covered_market_exits_zero() {
        let file = write(DATASET);
        assert_eq!(run_gap(&args(&file, "IND")).unwrap(), 0);
    }

    #[test]
    fn missing_certificate_exits_two() {
        let file = write(DATASET);
        assert_eq!(run_gap(&args(&file, "jpn")).unwrap(), 2);
    }

    #[test]
    fn unknown_device_is_error() {
        let file = write(DATASET);
        let mut args = args(&file, "IND");
        args.device = "Toaster".into();
        assert!(run_gap(&args).is_err());
    }
}
