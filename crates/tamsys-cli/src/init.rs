//! # Init CLI — Bulk gap initialization for one device.
//!
//! Opens a PENDING record for every gap across the device's target markets
//! and prints the counts. Runs against the loaded dataset only.

use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::Args;

use tamsys_compliance::initialize_gaps;

use crate::{load, print_json, resolve_device, resolve_tenant};

/// Init subcommand arguments.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Dataset YAML file.
    pub file: PathBuf,

    /// Device model name.
    #[arg(long)]
    pub device: String,

    /// Tenant name; optional when the dataset has a single tenant.
    #[arg(long)]
    pub tenant: Option<String>,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Execute the init subcommand.
pub fn run_init(args: &InitArgs) -> Result<u8> {
    let now = Utc::now();
    let mut loaded = load(&args.file, now)?;
    let registry = &mut loaded.registry;
    let tenant_id = resolve_tenant(registry, args.tenant.as_deref())?;
    let device_id = resolve_device(registry, tenant_id, &args.device)?;
    let markets = registry.device(tenant_id, device_id)?.target_countries.clone();

    let outcome = initialize_gaps(registry, tenant_id, device_id, &markets, now)?;
    let report = outcome.report;

    if args.json {
        print_json(&report)?;
        return Ok(0);
    }

    println!("Initialized {}:", args.device);
    println!("  countries processed:  {}", report.countries_processed);
    println!("  records created:      {}", report.records_created);
    println!("  already tracked:      {}", report.records_skipped_existing);
    if !report.unknown_country_codes.is_empty() {
        println!("  unknown markets:      {}", report.unknown_country_codes.join(", "));
    }
    Ok(0)
}
