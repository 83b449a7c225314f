//! # tamsys CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tamsys_cli::expiry::{run_expiry, ExpiryArgs};
use tamsys_cli::gap::{run_gap, GapArgs};
use tamsys_cli::init::{run_init, InitArgs};
use tamsys_cli::seed::{run_seed, SeedArgs};

/// TAMSys CLI
///
/// Works on a YAML dataset of catalog, rule matrix, tenants, devices and
/// records: validates it, runs gap analysis and bulk initialization, and
/// dry-runs the daily expiry job.
#[derive(Parser, Debug)]
#[command(name = "tamsys", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a dataset and print counts and expanded rules.
    Seed(SeedArgs),

    /// Gap analysis for one device in one market.
    Gap(GapArgs),

    /// Dry-run the daily expiry job and print the report.
    Expiry(ExpiryArgs),

    /// Run bulk gap initialization for a device and print the report.
    Init(InitArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity level.
    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Seed(args) => run_seed(&args),
        Commands::Gap(args) => run_gap(&args),
        Commands::Expiry(args) => run_expiry(&args),
        Commands::Init(args) => run_init(&args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn cli_parse_seed_json() {
        let cli = Cli::try_parse_from(["tamsys", "seed", "data.yaml", "--json"]).unwrap();
        if let Commands::Seed(args) = cli.command {
            assert_eq!(args.file, PathBuf::from("data.yaml"));
            assert!(args.json);
        } else {
            panic!("expected seed");
        }
    }

    #[test]
    fn cli_parse_gap_requires_device_and_country() {
        assert!(Cli::try_parse_from(["tamsys", "gap", "data.yaml", "--device", "X1"]).is_err());
        let cli = Cli::try_parse_from([
            "tamsys", "gap", "data.yaml", "--device", "X1", "--country", "IND", "--tenant", "Acme",
        ])
        .unwrap();
        if let Commands::Gap(args) = cli.command {
            assert_eq!(args.device, "X1");
            assert_eq!(args.country, "IND");
            assert_eq!(args.tenant.as_deref(), Some("Acme"));
        } else {
            panic!("expected gap");
        }
    }

    #[test]
    fn cli_parse_expiry_date() {
        let cli = Cli::try_parse_from(["tamsys", "expiry", "data.yaml", "--today", "2025-06-01"])
            .unwrap();
        if let Commands::Expiry(args) = cli.command {
            assert_eq!(args.today, chrono::NaiveDate::from_ymd_opt(2025, 6, 1));
        } else {
            panic!("expected expiry");
        }
        assert!(Cli::try_parse_from(["tamsys", "expiry", "data.yaml", "--today", "June"]).is_err());
    }

    #[test]
    fn cli_parse_verbosity_is_global() {
        let cli = Cli::try_parse_from(["tamsys", "init", "data.yaml", "--device", "X1", "-vv"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Init(_)));
    }
}
