//! # Daily Expiry Scheduler
//!
//! A background task that runs the expiry check once a day at
//! `SCHEDULER_HOUR_UTC`. The same [`run_expiry`] backs the
//! `POST /v1/admin/expiry-check` route.
//!
//! A run is planned and applied under one registry write guard, so no user
//! update can interleave. The touched rows are then written in one
//! transaction, each guarded by the status and expiry date the run started
//! from. A row a user renewed in the meantime is left alone in the database
//! and its change is undone in memory. A failed write undoes the whole run
//! in memory; the next day's run starts afresh. Alerts go out only for
//! changes that reached the database.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use tokio::task::JoinHandle;

use tamsys_compliance::{plan_expiry, ExpiryReport};

use crate::error::AppError;
use crate::state::AppState;

/// Run one expiry check for `today`.
///
/// Concurrent runs are serialized; a second caller waits for the first to
/// finish and then evaluates the updated records.
pub async fn run_expiry(
    state: &AppState,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<ExpiryReport, AppError> {
    let _running = state.expiry_guard.lock().await;
    tracing::info!(%today, "starting expiry check");

    let mut applied = {
        let mut registry = state.registry.write();
        let plan = plan_expiry(&registry, today, now);
        registry.apply_expiry_plan(&plan)
    };

    if let Some(pool) = &state.db_pool {
        if !applied.changes.is_empty() {
            match crate::db::records::update_many(pool, &applied.changes).await {
                Ok(stale) if !stale.is_empty() => {
                    let dropped = applied.split_off(&stale);
                    let reverted = state.registry.write().revert_changes(&dropped);
                    tracing::info!(
                        skipped = dropped.len(),
                        reverted,
                        "records changed during expiry run were left alone"
                    );
                }
                Ok(_) => {}
                Err(err) => {
                    let reverted = state.registry.write().revert_expiry(&applied);
                    tracing::warn!(reverted, "expiry run rolled back in memory");
                    return Err(AppError::from_db("expiry run", err));
                }
            }
        }
    }

    applied.notify(state.notifier.as_ref());

    let report = applied.report();
    tracing::info!(
        rules_evaluated = report.rules_evaluated,
        notifications_sent = report.notifications_sent,
        notifications_suppressed = report.notifications_suppressed,
        records_now_expiring = report.records_now_expiring,
        records_expired = report.records_expired,
        "expiry check complete"
    );
    Ok(report)
}

/// The next instant at `hour`:00 UTC strictly after `now`.
pub fn next_run_after(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let at = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        return today;
    }
    now.date_naive()
        .checked_add_days(Days::new(1))
        .map(|d| d.and_time(at).and_utc())
        .unwrap_or(today)
}

/// Spawn the daily loop. Returns `None` when the scheduler is disabled.
pub fn spawn(state: AppState) -> Option<JoinHandle<()>> {
    if !state.config.enable_scheduler {
        tracing::info!("expiry scheduler disabled");
        return None;
    }
    let hour = state.config.scheduler_hour_utc;
    tracing::info!(hour_utc = hour, "expiry scheduler started");

    Some(tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let next = next_run_after(now, hour);
            let wait = (next - now).to_std().unwrap_or_default();
            tracing::debug!(next_run = %next, "expiry scheduler sleeping");
            tokio::time::sleep(wait).await;

            let now = Utc::now();
            if let Err(err) = run_expiry(&state, now.date_naive(), now).await {
                tracing::error!(error = %err, "scheduled expiry check failed");
            }
        }
    }))
}
