//! # Expiry CLI — Dry-run the daily expiry job against a dataset.
//!
//! Runs the same planning and transitions as the scheduler, with alerts
//! going to the log. Use `-v` to see each alert.

use std::path::PathBuf;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::Args;

use tamsys_compliance::{run_expiry_check, LogNotifier};

use crate::{load, print_json};

/// Expiry subcommand arguments.
#[derive(Args, Debug)]
pub struct ExpiryArgs {
    /// Dataset YAML file.
    pub file: PathBuf,

    /// Run date (YYYY-MM-DD); defaults to today in UTC.
    #[arg(long)]
    pub today: Option<NaiveDate>,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Execute the expiry subcommand.
pub fn run_expiry(args: &ExpiryArgs) -> Result<u8> {
    let now = match args.today {
        Some(day) => day.and_time(chrono::NaiveTime::MIN).and_utc(),
        None => Utc::now(),
    };
    let today = now.date_naive();
    let mut loaded = load(&args.file, now)?;

    let report = run_expiry_check(&mut loaded.registry, today, now, &LogNotifier);

    if args.json {
        print_json(&report)?;
        return Ok(0);
    }

    println!("Expiry check for {}:", report.run_date);
    println!("  rules evaluated:          {}", report.rules_evaluated);
    println!("  notifications sent:       {}", report.notifications_sent);
    println!("  suppressed (cooldown):    {}", report.notifications_suppressed);
    println!("  records now expiring:     {}", report.records_now_expiring);
    println!("  records expired:          {}", report.records_expired);
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdata::*;

    fn report_for(day: &str) -> tamsys_compliance::ExpiryReport {
        let file = write(DATASET);
        let today: NaiveDate = day.parse().unwrap();
        let now = today.and_time(chrono::NaiveTime::MIN).and_utc();
        let mut loaded = load(file.path(), now).unwrap();
        run_expiry_check(&mut loaded.registry, today, now, &LogNotifier)
    }

    #[test]
    fn threshold_day_sends_notice() {
        let report = report_for("2025-06-01");
        assert_eq!(report.notifications_sent, 1);
        assert_eq!(report.records_now_expiring, 1);
        assert_eq!(report.records_expired, 0);
    }

    #[test]
    fn day_after_expiry_expires_record() {
        let report = report_for("2025-06-11");
        assert_eq!(report.records_expired, 1);
        assert_eq!(report.notifications_sent, 0);
    }

    #[test]
    fn run_with_fixed_date_exits_zero() {
        let file = write(DATASET);
        let args = ExpiryArgs {
            file: file.path().to_path_buf(),
            today: Some(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()),
            json: true,
        };
        assert_eq!(run_expiry(&args).unwrap(), 0);
    }
}
