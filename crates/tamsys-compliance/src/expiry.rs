//! # Daily Expiry Job
//!
//! Ages compliance records forward in time. A run has two passes:
//!
//! 1. **Approach warning.** For every active notification rule, records of
//!    that tenant in ACTIVE or EXPIRING whose expiry date is exactly
//!    `today + days_before_expiry` are warned, unless warned within the
//!    last seven days. A warning stamps `last_notified_at` and moves ACTIVE
//!    to EXPIRING. A suppressed warning changes nothing.
//! 2. **Hard expiry.** Every non-EXPIRED record whose expiry date is before
//!    `today` becomes EXPIRED.
//!
//! A run is computed as an [`ExpiryPlan`] against a read-only registry,
//! then applied in one step. Applying re-checks every change against the
//! record as it is at that moment, so a renewal that lands between planning
//! and applying is never overwritten. The [`AppliedExpiry`] keeps each
//! record's before and after state; persistence layers write the after
//! state and revert the registry from the before state if the write fails.
//! Alerts go out only for changes that were applied.
//!
//! Matching is on the exact threshold date. A day the job does not run is
//! a day whose thresholds are never matched; the hard-expiry pass still
//! catches up on the next run.

use std::collections::HashSet;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use tamsys_core::{
    CertificationId, CountryId, DeviceId, NotificationRuleId, RecordId, Severity, TenantId,
};
use tamsys_state::{ComplianceRecord, ComplianceStatus};

use crate::notifier::{ExpiryEvent, Notifier};
use crate::registry::Registry;

/// A warning to send for one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ExpiryNotice {
    /// Record approaching expiry.
    pub record_id: RecordId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Device.
    pub device_id: DeviceId,
    /// Market.
    pub country_id: CountryId,
    /// Certificate.
    pub certification_id: CertificationId,
    /// Certificate expiry.
    pub expiry_date: NaiveDate,
    /// Threshold that matched.
    pub days_before_expiry: u16,
    /// Severity of the matching rule.
    pub severity: Severity,
    /// The matching rule.
    pub notification_rule_id: NotificationRuleId,
}

/// A record moved to EXPIRED.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ExpiredRecord {
    /// Record.
    pub record_id: RecordId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Device.
    pub device_id: DeviceId,
    /// The date that passed.
    pub expiry_date: NaiveDate,
    /// Status before expiry.
    pub previous_status: ComplianceStatus,
}

/// One state change of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedChange {
    /// Send a warning and stamp `last_notified_at`.
    Warn {
        /// What to send.
        notice: ExpiryNotice,
        /// Status before the warning.
        from: ComplianceStatus,
        /// Status after the warning.
        to: ComplianceStatus,
    },
    /// Move to EXPIRED.
    Expire(ExpiredRecord),
}

impl PlannedChange {
    /// The record this change touches.
    pub fn record_id(&self) -> RecordId {
        match self {
            Self::Warn { notice, .. } => notice.record_id,
            Self::Expire(expired) => expired.record_id,
        }
    }

    /// Status the record ends up in.
    pub fn new_status(&self) -> ComplianceStatus {
        match self {
            Self::Warn { to, .. } => *to,
            Self::Expire(_) => ComplianceStatus::Expired,
        }
    }

    /// Whether `record` still qualifies for this change.
    ///
    /// A warning needs the same expiry date, the same status, and an elapsed
    /// cooldown; an expiration needs the record to still be overdue.
    fn still_applies(&self, record: &ComplianceRecord, plan: &ExpiryPlan) -> bool {
        match self {
            Self::Warn { notice, from, .. } => {
                record.status == *from
                    && record.expires_on(notice.expiry_date)
                    && record.is_due_for_notification(plan.now)
            }
            Self::Expire(_) => record.is_overdue(plan.today),
        }
    }

    fn event(&self) -> ExpiryEvent {
        match self {
            Self::Warn { notice, .. } => ExpiryEvent::Warning(notice.clone()),
            Self::Expire(expired) => ExpiryEvent::Expired(expired.clone()),
        }
    }
}

/// Summary of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ExpiryReport {
    /// Calendar day the run evaluated.
    pub run_date: NaiveDate,
    /// Active notification rules evaluated.
    pub rules_evaluated: usize,
    /// Warnings sent.
    pub notifications_sent: usize,
    /// Threshold matches skipped by the cooldown.
    pub notifications_suppressed: usize,
    /// Records moved from ACTIVE to EXPIRING.
    pub records_now_expiring: usize,
    /// Records moved to EXPIRED.
    pub records_expired: usize,
}

/// Every change one run will make, computed without mutating anything.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpiryPlan {
    /// Calendar day evaluated.
    pub today: NaiveDate,
    /// Timestamp stamped on warned and expired records.
    pub now: DateTime<Utc>,
    /// Changes in application order: warnings first, then expirations.
    pub changes: Vec<PlannedChange>,
    rules_evaluated: usize,
    suppressed: usize,
}

impl ExpiryPlan {
    /// Whether the run changes nothing.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Summarize the plan.
    pub fn report(&self) -> ExpiryReport {
        let mut report = ExpiryReport {
            run_date: self.today,
            rules_evaluated: self.rules_evaluated,
            notifications_sent: 0,
            notifications_suppressed: self.suppressed,
            records_now_expiring: 0,
            records_expired: 0,
        };
        for change in &self.changes {
            match change {
                PlannedChange::Warn { from, to, .. } => {
                    report.notifications_sent += 1;
                    if from != to {
                        report.records_now_expiring += 1;
                    }
                }
                PlannedChange::Expire(_) => report.records_expired += 1,
            }
        }
        report
    }

    /// Hand every alert of an applied plan to `notifier`.
    pub fn notify(&self, notifier: &dyn Notifier) {
        for change in &self.changes {
            notifier.deliver(&change.event());
        }
    }
}

/// Compute the changes a run on `today` would make.
pub fn plan_expiry(registry: &Registry, today: NaiveDate, now: DateTime<Utc>) -> ExpiryPlan {
    let rules = registry.active_notification_rules();
    let mut changes = Vec::new();
    let mut warned: HashSet<RecordId> = HashSet::new();
    let mut suppressed = 0;

    for rule in &rules {
        let Some(threshold) = today.checked_add_days(Days::new(u64::from(rule.days_before_expiry)))
        else {
            continue;
        };
        let mut matching: Vec<&ComplianceRecord> = registry
            .all_records()
            .filter(|r| r.tenant_id == rule.tenant_id && r.expires_on(threshold))
            .collect();
        matching.sort_by_key(|r| r.id);
        tracing::debug!(
            tenant_id = %rule.tenant_id,
            days_before_expiry = rule.days_before_expiry,
            %threshold,
            matches = matching.len(),
            "evaluating notification rule"
        );

        for record in matching {
            // A record warned earlier in this run counts as notified now.
            if warned.contains(&record.id) || !record.is_due_for_notification(now) {
                tracing::info!(record_id = %record.id, "skipping notification, recently notified");
                suppressed += 1;
                continue;
            }
            warned.insert(record.id);
            let Some(expiry_date) = record.expiry_date else {
                continue;
            };
            changes.push(PlannedChange::Warn {
                notice: ExpiryNotice {
                    record_id: record.id,
                    tenant_id: record.tenant_id,
                    device_id: record.device_id,
                    country_id: record.country_id,
                    certification_id: record.certification_id,
                    expiry_date,
                    days_before_expiry: rule.days_before_expiry,
                    severity: rule.severity_level,
                    notification_rule_id: rule.id,
                },
                from: record.status,
                to: record.status_after_warning(),
            });
        }
    }

    let mut overdue: Vec<&ComplianceRecord> = registry
        .all_records()
        .filter(|r| r.is_overdue(today))
        .collect();
    overdue.sort_by_key(|r| r.id);
    for record in overdue {
        let Some(expiry_date) = record.expiry_date else {
            continue;
        };
        changes.push(PlannedChange::Expire(ExpiredRecord {
            record_id: record.id,
            tenant_id: record.tenant_id,
            device_id: record.device_id,
            expiry_date,
            previous_status: record.status,
        }));
    }

    ExpiryPlan {
        today,
        now,
        changes,
        rules_evaluated: rules.len(),
        suppressed,
    }
}

/// One record touched by an applied run.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordChange {
    /// The record before the run.
    pub before: ComplianceRecord,
    /// The record after the run.
    pub after: ComplianceRecord,
}

/// The part of a plan that was actually applied.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedExpiry {
    /// The plan restricted to applied changes.
    pub plan: ExpiryPlan,
    /// Before and after state of every touched record, in plan order.
    pub changes: Vec<RecordChange>,
}

impl AppliedExpiry {
    /// Remove the changes for `record_ids` and return them, e.g. rows a
    /// concurrent writer got to first.
    pub fn split_off(&mut self, record_ids: &HashSet<RecordId>) -> Vec<RecordChange> {
        self.plan
            .changes
            .retain(|c| !record_ids.contains(&c.record_id()));
        let (dropped, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.changes)
            .into_iter()
            .partition(|c| record_ids.contains(&c.after.id));
        self.changes = kept;
        dropped
    }

    /// The records to persist.
    pub fn updated(&self) -> Vec<ComplianceRecord> {
        self.changes.iter().map(|c| c.after.clone()).collect()
    }

    /// Summarize the applied changes.
    pub fn report(&self) -> ExpiryReport {
        self.plan.report()
    }

    /// Hand every alert of the applied changes to `notifier`.
    pub fn notify(&self, notifier: &dyn Notifier) {
        self.plan.notify(notifier);
    }
}

impl Registry {
    /// Apply a plan computed against this registry.
    ///
    /// Each change is re-checked against the current record. Changes whose
    /// record has vanished or no longer qualifies (renewed or re-dated in
    /// the meantime) are skipped.
    pub fn apply_expiry_plan(&mut self, plan: &ExpiryPlan) -> AppliedExpiry {
        let mut applied = Vec::with_capacity(plan.changes.len());
        let mut changes = Vec::with_capacity(plan.changes.len());
        for change in &plan.changes {
            let Some(record) = self.record_mut(change.record_id()) else {
                tracing::warn!(record_id = %change.record_id(), "planned record vanished");
                continue;
            };
            if !change.still_applies(record, plan) {
                tracing::info!(record_id = %record.id, "record changed since planning, skipping");
                continue;
            }
            let before = record.clone();
            match change {
                PlannedChange::Warn { .. } => {
                    record.record_warning(plan.now);
                    metrics::counter!("tamsys_expiry_notifications_total").increment(1);
                }
                PlannedChange::Expire(_) => {
                    record.mark_expired(plan.now);
                    metrics::counter!("tamsys_records_expired_total").increment(1);
                }
            }
            changes.push(RecordChange {
                before,
                after: record.clone(),
            });
            applied.push(change.clone());
        }
        AppliedExpiry {
            plan: ExpiryPlan {
                changes: applied,
                ..plan.clone()
            },
            changes,
        }
    }

    /// Undo an applied run after its write failed.
    ///
    /// Records modified again since the run are left alone. Returns how many
    /// records were reverted.
    pub fn revert_expiry(&mut self, applied: &AppliedExpiry) -> usize {
        self.revert_changes(&applied.changes)
    }

    /// Undo individual record changes, newest first.
    pub fn revert_changes(&mut self, changes: &[RecordChange]) -> usize {
        changes
            .iter()
            .rev()
            .filter(|c| self.restore_record(&c.after, c.before.clone()))
            .count()
    }
}

/// Plan, apply, and notify in one step, for callers without a database.
pub fn run_expiry_check(
    registry: &mut Registry,
    today: NaiveDate,
    now: DateTime<Utc>,
    notifier: &dyn Notifier,
) -> ExpiryReport {
    tracing::info!(%today, "starting expiry check");
    let plan = plan_expiry(registry, today, now);
    let applied = registry.apply_expiry_plan(&plan);
    applied.notify(notifier);
    let report = applied.report();
    tracing::info!(
        notifications_sent = report.notifications_sent,
        notifications_suppressed = report.notifications_suppressed,
        records_expired = report.records_expired,
        "expiry check complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::notifier::recording::RecordingNotifier;
    use crate::registry::fixtures::*;
    use crate::registry::NewRecord;
    use tamsys_core::{NewNotificationRule, TargetMarkets};
    use tamsys_state::{RecordDraft, RecordUpdate};

    struct Job {
        registry: Registry,
        acme: TenantId,
        record: RecordId,
    }

    fn today() -> NaiveDate {
        now().date_naive()
    }

    fn job(expiry: NaiveDate, thresholds: &[i64]) -> Job {
        let mut registry = Registry::new();
        let wifi = technology(&mut registry, "Wi-Fi 6E");
        let ind = country(&mut registry, "India", "IND");
        let wpc = certification(&mut registry, "WPC");
        let acme = tenant(&mut registry, "Acme");
        let watch = device(&mut registry, acme, "Watch", &[wifi], TargetMarkets::All);
        for days in thresholds {
            registry
                .create_notification_rule(
                    acme,
                    NewNotificationRule {
                        days_before_expiry: *days,
                        severity_level: Severity::High,
                        is_active: true,
                    },
                    now(),
                )
                .unwrap();
        }
        let record = registry
            .create_record(
                acme,
                NewRecord {
                    device_id: watch,
                    country_id: ind,
                    certification_id: wpc,
                    draft: RecordDraft {
                        status: ComplianceStatus::Active,
                        expiry_date: Some(expiry),
                        ..Default::default()
                    },
                },
                now(),
            )
            .unwrap()
            .id;
        Job {
            registry,
            acme,
            record,
        }
    }

    fn status(job: &Job) -> ComplianceStatus {
        job.registry.record(job.acme, job.record).unwrap().status
    }

    #[test]
    fn past_expiry_becomes_expired() {
        let mut job = job(today() - Duration::days(1), &[]);
        let notifier = RecordingNotifier::default();
        let report = run_expiry_check(&mut job.registry, today(), now(), &notifier);
        assert_eq!(report.records_expired, 1);
        assert_eq!(status(&job), ComplianceStatus::Expired);
        assert!(matches!(
            notifier.events.lock()[0],
            ExpiryEvent::Expired(ExpiredRecord {
                previous_status: ComplianceStatus::Active,
                ..
            })
        ));

        let again = run_expiry_check(&mut job.registry, today(), now(), &notifier);
        assert_eq!(again.records_expired, 0);
    }

    #[test]
    fn expiry_today_is_not_overdue() {
        let mut job = job(today(), &[]);
        run_expiry_check(&mut job.registry, today(), now(), &RecordingNotifier::default());
        assert_eq!(status(&job), ComplianceStatus::Active);
    }

    #[test]
    fn threshold_match_warns_once() {
        let mut job = job(today() + Duration::days(90), &[90]);
        let notifier = RecordingNotifier::default();

        let first = run_expiry_check(&mut job.registry, today(), now(), &notifier);
        assert_eq!(first.notifications_sent, 1);
        assert_eq!(first.records_now_expiring, 1);
        let record = job.registry.record(job.acme, job.record).unwrap();
        assert_eq!(record.status, ComplianceStatus::Expiring);
        assert_eq!(record.last_notified_at, Some(now()));

        let later = now() + Duration::hours(3);
        let second = run_expiry_check(&mut job.registry, today(), later, &notifier);
        assert_eq!(second.notifications_sent, 0);
        assert_eq!(second.notifications_suppressed, 1);
        assert_eq!(notifier.events.lock().len(), 1);
        let record = job.registry.record(job.acme, job.record).unwrap();
        assert_eq!(record.last_notified_at, Some(now()));
    }

    #[test]
    fn duplicate_thresholds_warn_once_per_run() {
        let mut job = job(today() + Duration::days(30), &[30, 30]);
        let plan = plan_expiry(&job.registry, today(), now());
        let report = plan.report();
        assert_eq!(report.rules_evaluated, 2);
        assert_eq!(report.notifications_sent, 1);
        assert_eq!(report.notifications_suppressed, 1);
        job.registry.apply_expiry_plan(&plan);
        assert_eq!(status(&job), ComplianceStatus::Expiring);
    }

    #[test]
    fn suppressed_warning_does_not_advance_status() {
        let mut job = job(today() + Duration::days(60), &[60]);
        // Notified three days ago under an earlier, since-renewed expiry.
        job.registry
            .record_mut(job.record)
            .unwrap()
            .last_notified_at = Some(now() - Duration::days(3));
        let report = run_expiry_check(
            &mut job.registry,
            today(),
            now(),
            &RecordingNotifier::default(),
        );
        assert_eq!(report.notifications_suppressed, 1);
        assert_eq!(status(&job), ComplianceStatus::Active);
    }

    #[test]
    fn expiring_record_is_rewarned_at_next_threshold() {
        let mut job = job(today() + Duration::days(90), &[90, 30]);
        run_expiry_check(&mut job.registry, today(), now(), &RecordingNotifier::default());
        assert_eq!(status(&job), ComplianceStatus::Expiring);

        let day60 = today() + Duration::days(60);
        let at = now() + Duration::days(60);
        let report = run_expiry_check(&mut job.registry, day60, at, &RecordingNotifier::default());
        assert_eq!(report.notifications_sent, 1);
        assert_eq!(report.records_now_expiring, 0);
        let record = job.registry.record(job.acme, job.record).unwrap();
        assert_eq!(record.last_notified_at, Some(at));
    }

    #[test]
    fn off_threshold_days_do_nothing() {
        let mut job = job(today() + Duration::days(89), &[90]);
        let plan = plan_expiry(&job.registry, today(), now());
        assert!(plan.is_empty());
        job.registry.apply_expiry_plan(&plan);
        assert_eq!(status(&job), ComplianceStatus::Active);
    }

    #[test]
    fn rules_apply_only_to_their_tenant() {
        let mut job = job(today() + Duration::days(90), &[]);
        let globex = tenant(&mut job.registry, "Globex");
        job.registry
            .create_notification_rule(
                globex,
                NewNotificationRule {
                    days_before_expiry: 90,
                    severity_level: Severity::Low,
                    is_active: true,
                },
                now(),
            )
            .unwrap();
        let report = run_expiry_check(
            &mut job.registry,
            today(),
            now(),
            &RecordingNotifier::default(),
        );
        assert_eq!(report.notifications_sent, 0);
        assert_eq!(status(&job), ComplianceStatus::Active);
    }

    #[test]
    fn pending_record_with_past_date_expires() {
        let mut job = job(today() + Duration::days(400), &[]);
        job.registry
            .update_record(
                job.acme,
                job.record,
                &RecordUpdate {
                    status: Some(ComplianceStatus::Pending),
                    expiry_date: Some(today() - Duration::days(10)),
                    ..Default::default()
                },
                now(),
            )
            .unwrap();
        run_expiry_check(&mut job.registry, today(), now(), &RecordingNotifier::default());
        assert_eq!(status(&job), ComplianceStatus::Expired);
    }

    #[test]
    fn apply_returns_before_and_after() {
        let mut job = job(today() - Duration::days(5), &[]);
        let plan = plan_expiry(&job.registry, today(), now());
        let applied = job.registry.apply_expiry_plan(&plan);
        assert_eq!(applied.changes.len(), 1);
        assert_eq!(applied.changes[0].before.status, ComplianceStatus::Active);
        assert_eq!(applied.updated()[0].status, ComplianceStatus::Expired);
        assert_eq!(plan.changes[0].new_status(), ComplianceStatus::Expired);
    }

    #[test]
    fn renewal_after_planning_is_not_expired() {
        let mut job = job(today() - Duration::days(1), &[]);
        let plan = plan_expiry(&job.registry, today(), now());
        assert_eq!(plan.report().records_expired, 1);

        let renewed_until = today() + Duration::days(365);
        job.registry
            .update_record(
                job.acme,
                job.record,
                &RecordUpdate {
                    status: Some(ComplianceStatus::Active),
                    expiry_date: Some(renewed_until),
                    ..Default::default()
                },
                now(),
            )
            .unwrap();

        let applied = job.registry.apply_expiry_plan(&plan);
        assert!(applied.changes.is_empty());
        assert_eq!(applied.report().records_expired, 0);
        let record = job.registry.record(job.acme, job.record).unwrap();
        assert_eq!(record.status, ComplianceStatus::Active);
        assert_eq!(record.expiry_date, Some(renewed_until));
    }

    #[test]
    fn redated_record_is_not_warned() {
        let mut job = job(today() + Duration::days(30), &[30]);
        let plan = plan_expiry(&job.registry, today(), now());
        assert_eq!(plan.report().notifications_sent, 1);

        job.registry
            .update_record(
                job.acme,
                job.record,
                &RecordUpdate {
                    expiry_date: Some(today() + Duration::days(400)),
                    ..Default::default()
                },
                now(),
            )
            .unwrap();

        let notifier = RecordingNotifier::default();
        let applied = job.registry.apply_expiry_plan(&plan);
        applied.notify(&notifier);
        assert_eq!(applied.report().notifications_sent, 0);
        assert!(notifier.events.lock().is_empty());
        assert_eq!(status(&job), ComplianceStatus::Active);
    }

    #[test]
    fn revert_restores_untouched_records() {
        let mut job = job(today() - Duration::days(5), &[]);
        let plan = plan_expiry(&job.registry, today(), now());
        let applied = job.registry.apply_expiry_plan(&plan);
        assert_eq!(status(&job), ComplianceStatus::Expired);

        assert_eq!(job.registry.revert_expiry(&applied), 1);
        assert_eq!(status(&job), ComplianceStatus::Active);
    }

    #[test]
    fn split_off_removes_changes_from_report() {
        let mut job = job(today() - Duration::days(5), &[]);
        let plan = plan_expiry(&job.registry, today(), now());
        let mut applied = job.registry.apply_expiry_plan(&plan);

        let dropped = applied.split_off(&HashSet::from([job.record]));
        assert_eq!(dropped.len(), 1);
        assert!(applied.changes.is_empty());
        assert_eq!(applied.report().records_expired, 0);
        assert_eq!(job.registry.revert_changes(&dropped), 1);
        assert_eq!(status(&job), ComplianceStatus::Active);
    }

    #[test]
    fn revert_keeps_later_user_changes() {
        let mut job = job(today() - Duration::days(5), &[]);
        let plan = plan_expiry(&job.registry, today(), now());
        let applied = job.registry.apply_expiry_plan(&plan);

        let renewed_until = today() + Duration::days(365);
        job.registry
            .update_record(
                job.acme,
                job.record,
                &RecordUpdate {
                    status: Some(ComplianceStatus::Active),
                    expiry_date: Some(renewed_until),
                    ..Default::default()
                },
                now() + Duration::minutes(1),
            )
            .unwrap();

        assert_eq!(job.registry.revert_expiry(&applied), 0);
        let record = job.registry.record(job.acme, job.record).unwrap();
        assert_eq!(record.expiry_date, Some(renewed_until));
    }
}
