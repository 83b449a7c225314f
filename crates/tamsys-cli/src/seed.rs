//! # Seed CLI — Validate a dataset and show its expanded rule matrix.
//!
//! Loads the dataset into an empty registry (so every uniqueness and
//! reference check runs) and prints what was inserted together with the
//! rule lines after country-group expansion.

use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::Args;
use serde_json::json;

use crate::{load, print_json};

/// Seed subcommand arguments.
#[derive(Args, Debug)]
pub struct SeedArgs {
    /// Dataset YAML file.
    pub file: PathBuf,

    /// Print the report and expanded rules as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Execute the seed subcommand.
pub fn run_seed(args: &SeedArgs) -> Result<u8> {
    let loaded = load(&args.file, Utc::now())?;
    let rules = loaded.dataset.expand_rules()?;

    if args.json {
        print_json(&json!({
            "report": loaded.report,
            "rules": rules,
        }))?;
        return Ok(0);
    }

    let report = &loaded.report;
    println!("Dataset {} is valid.", args.file.display());
    println!();
    println!("  technologies:        {}", report.technologies_created);
    println!("  countries:           {}", report.countries_created);
    println!("  certifications:      {}", report.certifications_created);
    println!("  rules:               {} ({} duplicate)", report.rules_created, report.rules_skipped);
    println!("  tenants:             {}", report.tenants_created);
    println!("  notification rules:  {}", report.notification_rules_created);
    println!("  devices:             {}", report.devices_created);
    println!("  records:             {} ({} duplicate)", report.records_created, report.records_skipped);
    println!();
    println!("Expanded rules:");
    for rule in &rules {
        let kind = if rule.mandatory { "mandatory" } else { "optional" };
        println!(
            "  {:<20} {:<4} {:<24} {kind}",
            rule.technology, rule.country, rule.certification
        );
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdata::*;

    #[test]
    fn valid_dataset_exits_zero() {
        let file = write(DATASET);
        let args = SeedArgs {
            file: file.path().to_path_buf(),
            json: false,
        };
        assert_eq!(run_seed(&args).unwrap(), 0);
    }

    #[test]
    fn unknown_group_fails() {
        let file = write(
            "technologies: [{name: WiFi}]\n\
             certifications: [{name: CE}]\n\
             rules:\n  - {technology: WiFi, group: eu, certification: CE}\n",
        );
        let args = SeedArgs {
            file: file.path().to_path_buf(),
            json: true,
        };
        let err = run_seed(&args).unwrap_err();
        assert!(format!("{err:#}").contains("country group"));
    }

    #[test]
    fn unknown_field_fails() {
        let file = write("technologies: [{name: WiFi}]\nwidgets: []\n");
        let args = SeedArgs {
            file: file.path().to_path_buf(),
            json: false,
        };
        assert!(run_seed(&args).is_err());
    }
}
