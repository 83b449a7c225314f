//! # Compliance Record State Machine
//!
//! One record tracks one requirement instance: a (tenant, device, country,
//! certification) key. The record enforces two invariants itself:
//!
//! - status ACTIVE always has an `expiry_date`; an update that would break
//!   this is rejected and leaves the record untouched;
//! - EXPIRING and EXPIRED are only ever assigned by the expiry job.
//!
//! Uniqueness of the key is enforced by the registry that stores records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use tamsys_core::{
    CertificationId, CountryId, DeviceId, RecordId, TamsysError, TenantId, ValidationError,
};

use crate::attachment::{Attachment, AttachmentKind};

/// Minimum days between two expiry warnings for the same record.
pub const NOTIFICATION_COOLDOWN_DAYS: i64 = 7;

// ─── Status ──────────────────────────────────────────────────────────

/// Lifecycle status of a compliance record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    /// Requirement known, certificate not yet obtained.
    #[default]
    Pending,
    /// Certificate held and valid.
    Active,
    /// Within a notification threshold of expiry.
    Expiring,
    /// Past its expiry date.
    Expired,
}

impl ComplianceStatus {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Expiring => "EXPIRING",
            Self::Expired => "EXPIRED",
        }
    }

    /// Whether only the expiry job may assign this status.
    pub fn is_scheduler_owned(&self) -> bool {
        matches!(self, Self::Expiring | Self::Expired)
    }

    /// Whether the approach-warning pass considers records in this status.
    pub fn is_watched(&self) -> bool {
        matches!(self, Self::Active | Self::Expiring)
    }

    /// Whether automatic transitions have finished with this record.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Expired)
    }
}

impl std::fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ComplianceStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "ACTIVE" => Ok(Self::Active),
            "EXPIRING" => Ok(Self::Expiring),
            "EXPIRED" => Ok(Self::Expired),
            _ => Err(ValidationError::UnknownValue {
                kind: "status",
                value: s.to_string(),
            }),
        }
    }
}

/// Progress of the product label for this certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LabelingStatus {
    /// Label not yet applied.
    #[default]
    Pending,
    /// Label applied.
    Done,
}

impl LabelingStatus {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Done => "DONE",
        }
    }
}

impl std::str::FromStr for LabelingStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "DONE" => Ok(Self::Done),
            _ => Err(ValidationError::UnknownValue {
                kind: "labeling_status",
                value: s.to_string(),
            }),
        }
    }
}

/// Whether a warning may be sent given the time of the previous one.
///
/// Counts whole elapsed days, so a warning sent at 09:00 unblocks at 09:00
/// seven days later.
pub fn cooldown_elapsed(last_notified_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last_notified_at {
        None => true,
        Some(last) => (now - last).num_days() >= NOTIFICATION_COOLDOWN_DAYS,
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Lifecycle violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// ACTIVE without an expiry date.
    #[error("status ACTIVE requires an expiry_date")]
    ActiveRequiresExpiry,

    /// Caller tried to assign EXPIRING or EXPIRED.
    #[error("status {0} is assigned by the expiry job and cannot be set directly")]
    SchedulerOwnedStatus(ComplianceStatus),
}

impl From<RecordError> for ValidationError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::ActiveRequiresExpiry => ValidationError::ActiveRequiresExpiry,
            RecordError::SchedulerOwnedStatus(status) => {
                ValidationError::SchedulerOwnedStatus(status.to_string())
            }
        }
    }
}

impl From<RecordError> for TamsysError {
    fn from(err: RecordError) -> Self {
        TamsysError::Validation(err.into())
    }
}

// ─── Inputs ──────────────────────────────────────────────────────────

/// The uniqueness key of a compliance record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Device the requirement applies to.
    pub device_id: DeviceId,
    /// Market imposing the requirement.
    pub country_id: CountryId,
    /// Certificate required.
    pub certification_id: CertificationId,
}

/// Initial field values for a new record.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RecordDraft {
    /// Defaults to PENDING.
    #[serde(default)]
    pub status: ComplianceStatus,
    /// Certificate expiry.
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    /// Issued certificate number.
    #[serde(default)]
    pub certificate_number: Option<String>,
    /// Defaults to PENDING.
    #[serde(default)]
    pub labeling_status: LabelingStatus,
}

/// Partial update of a record. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RecordUpdate {
    /// New status (PENDING or ACTIVE).
    #[serde(default)]
    pub status: Option<ComplianceStatus>,
    /// New expiry date.
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    /// New certificate number.
    #[serde(default)]
    pub certificate_number: Option<String>,
    /// New labeling status.
    #[serde(default)]
    pub labeling_status: Option<LabelingStatus>,
}

// ─── Record ──────────────────────────────────────────────────────────

/// Certification status of one device in one market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ComplianceRecord {
    /// Identifier.
    pub id: RecordId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Device.
    pub device_id: DeviceId,
    /// Market.
    pub country_id: CountryId,
    /// Certificate.
    pub certification_id: CertificationId,
    /// Lifecycle status.
    pub status: ComplianceStatus,
    /// Certificate expiry; always set while ACTIVE.
    pub expiry_date: Option<NaiveDate>,
    /// Issued certificate number.
    pub certificate_number: Option<String>,
    /// Label progress.
    pub labeling_status: LabelingStatus,
    /// When `labeling_status` last changed.
    pub labeling_updated_at: Option<DateTime<Utc>>,
    /// Certificate document.
    pub certificate: Option<Attachment>,
    /// Test report document.
    pub test_report: Option<Attachment>,
    /// Label photo.
    pub label_picture: Option<Attachment>,
    /// Last expiry warning sent.
    pub last_notified_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl ComplianceRecord {
    /// Create a record from a draft.
    pub fn new(
        id: RecordId,
        key: RecordKey,
        draft: RecordDraft,
        now: DateTime<Utc>,
    ) -> Result<Self, RecordError> {
        if draft.status.is_scheduler_owned() {
            return Err(RecordError::SchedulerOwnedStatus(draft.status));
        }
        if draft.status == ComplianceStatus::Active && draft.expiry_date.is_none() {
            return Err(RecordError::ActiveRequiresExpiry);
        }
        Ok(Self {
            id,
            tenant_id: key.tenant_id,
            device_id: key.device_id,
            country_id: key.country_id,
            certification_id: key.certification_id,
            status: draft.status,
            expiry_date: draft.expiry_date,
            certificate_number: draft.certificate_number,
            labeling_status: draft.labeling_status,
            labeling_updated_at: None,
            certificate: None,
            test_report: None,
            label_picture: None,
            last_notified_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// A fresh PENDING record, as produced for a detected gap.
    pub fn pending(key: RecordKey, now: DateTime<Utc>) -> Self {
        Self {
            id: RecordId::new(),
            tenant_id: key.tenant_id,
            device_id: key.device_id,
            country_id: key.country_id,
            certification_id: key.certification_id,
            status: ComplianceStatus::Pending,
            expiry_date: None,
            certificate_number: None,
            labeling_status: LabelingStatus::Pending,
            labeling_updated_at: None,
            certificate: None,
            test_report: None,
            label_picture: None,
            last_notified_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The uniqueness key.
    pub fn key(&self) -> RecordKey {
        RecordKey {
            tenant_id: self.tenant_id,
            device_id: self.device_id,
            country_id: self.country_id,
            certification_id: self.certification_id,
        }
    }

    /// Apply a user update.
    ///
    /// Validation happens before any field is written, so on error the
    /// record is exactly as it was.
    pub fn apply_update(
        &mut self,
        update: &RecordUpdate,
        now: DateTime<Utc>,
    ) -> Result<(), RecordError> {
        if let Some(status) = update.status {
            if status.is_scheduler_owned() && status != self.status {
                return Err(RecordError::SchedulerOwnedStatus(status));
            }
        }
        let status = update.status.unwrap_or(self.status);
        let expiry_date = update.expiry_date.or(self.expiry_date);
        if status == ComplianceStatus::Active && expiry_date.is_none() {
            return Err(RecordError::ActiveRequiresExpiry);
        }

        if let Some(labeling) = update.labeling_status {
            if labeling != self.labeling_status {
                self.labeling_status = labeling;
                self.labeling_updated_at = Some(now);
            }
        }
        if let Some(number) = &update.certificate_number {
            self.certificate_number = Some(number.clone());
        }
        self.status = status;
        self.expiry_date = expiry_date;
        self.updated_at = now;
        Ok(())
    }

    /// Whether the record satisfies its own invariants.
    pub fn is_consistent(&self) -> bool {
        self.status != ComplianceStatus::Active || self.expiry_date.is_some()
    }

    // ── Expiry job transitions ──────────────────────────────────────

    /// Whether the notification cooldown has elapsed.
    pub fn is_due_for_notification(&self, now: DateTime<Utc>) -> bool {
        cooldown_elapsed(self.last_notified_at, now)
    }

    /// Whether the record expires exactly on `date` and is watched.
    pub fn expires_on(&self, date: NaiveDate) -> bool {
        self.status.is_watched() && self.expiry_date == Some(date)
    }

    /// Whether the hard-expiry pass should expire this record.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.status.is_terminal() && self.expiry_date.is_some_and(|expiry| expiry < today)
    }

    /// Status after a warning is sent: ACTIVE advances to EXPIRING, every
    /// other status is kept.
    pub fn status_after_warning(&self) -> ComplianceStatus {
        match self.status {
            ComplianceStatus::Active => ComplianceStatus::Expiring,
            other => other,
        }
    }

    /// Record that a warning was sent.
    pub fn record_warning(&mut self, now: DateTime<Utc>) {
        self.status = self.status_after_warning();
        self.last_notified_at = Some(now);
        self.updated_at = now;
    }

    /// Move to EXPIRED.
    pub fn mark_expired(&mut self, now: DateTime<Utc>) {
        self.status = ComplianceStatus::Expired;
        self.updated_at = now;
    }

    // ── Attachments ─────────────────────────────────────────────────

    /// The attachment in a slot.
    pub fn attachment(&self, kind: AttachmentKind) -> Option<&Attachment> {
        match kind {
            AttachmentKind::Certificate => self.certificate.as_ref(),
            AttachmentKind::TestReport => self.test_report.as_ref(),
            AttachmentKind::LabelPicture => self.label_picture.as_ref(),
        }
    }

    /// Replace the attachment in a slot, returning the previous one.
    pub fn set_attachment(
        &mut self,
        kind: AttachmentKind,
        attachment: Attachment,
        now: DateTime<Utc>,
    ) -> Option<Attachment> {
        let slot = match kind {
            AttachmentKind::Certificate => &mut self.certificate,
            AttachmentKind::TestReport => &mut self.test_report,
            AttachmentKind::LabelPicture => &mut self.label_picture,
        };
        self.updated_at = now;
        slot.replace(attachment)
    }

    /// Object-store paths of every attached document.
    pub fn attachment_paths(&self) -> Vec<String> {
        AttachmentKind::ALL
            .iter()
            .filter_map(|kind| self.attachment(*kind))
            .map(|a| a.path.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
    }

    fn key() -> RecordKey {
        RecordKey {
            tenant_id: TenantId::new(),
            device_id: DeviceId::new(),
            country_id: CountryId::new(1),
            certification_id: CertificationId::new(1),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn pending_record_has_no_expiry() {
        let record = ComplianceRecord::pending(key(), now());
        assert_eq!(record.status, ComplianceStatus::Pending);
        assert!(record.expiry_date.is_none());
        assert!(record.is_consistent());
    }

    #[test]
    fn activate_without_expiry_is_rejected_and_record_unchanged() {
        let mut record = ComplianceRecord::pending(key(), now());
        let before = record.clone();
        let update = RecordUpdate {
            status: Some(ComplianceStatus::Active),
            certificate_number: Some("WPC-1".into()),
            labeling_status: Some(LabelingStatus::Done),
            ..Default::default()
        };
        let err = record.apply_update(&update, now()).unwrap_err();
        assert_eq!(err, RecordError::ActiveRequiresExpiry);
        assert_eq!(record, before);
    }

    #[test]
    fn activate_with_expiry_succeeds() {
        let mut record = ComplianceRecord::pending(key(), now());
        let update = RecordUpdate {
            status: Some(ComplianceStatus::Active),
            expiry_date: Some(date(2025, 12, 31)),
            certificate_number: Some("WPC-1".into()),
            ..Default::default()
        };
        record.apply_update(&update, now()).unwrap();
        assert_eq!(record.status, ComplianceStatus::Active);
        assert_eq!(record.expiry_date, Some(date(2025, 12, 31)));
        assert_eq!(record.certificate_number.as_deref(), Some("WPC-1"));
        assert!(record.is_consistent());
    }

    #[test]
    fn activate_uses_existing_expiry() {
        let mut record = ComplianceRecord::pending(key(), now());
        record.expiry_date = Some(date(2026, 1, 1));
        let update = RecordUpdate {
            status: Some(ComplianceStatus::Active),
            ..Default::default()
        };
        assert!(record.apply_update(&update, now()).is_ok());
    }

    #[test]
    fn scheduler_statuses_cannot_be_set_by_users() {
        let mut record = ComplianceRecord::pending(key(), now());
        let update = RecordUpdate {
            status: Some(ComplianceStatus::Expired),
            ..Default::default()
        };
        assert_eq!(
            record.apply_update(&update, now()),
            Err(RecordError::SchedulerOwnedStatus(ComplianceStatus::Expired))
        );
    }

    #[test]
    fn restating_current_scheduler_status_is_allowed() {
        let mut record = ComplianceRecord::pending(key(), now());
        record.status = ComplianceStatus::Expiring;
        record.expiry_date = Some(date(2025, 7, 1));
        let update = RecordUpdate {
            status: Some(ComplianceStatus::Expiring),
            certificate_number: Some("X".into()),
            ..Default::default()
        };
        assert!(record.apply_update(&update, now()).is_ok());
    }

    #[test]
    fn renewal_moves_expired_back_to_active() {
        let mut record = ComplianceRecord::pending(key(), now());
        record.status = ComplianceStatus::Expired;
        record.expiry_date = Some(date(2024, 1, 1));
        let update = RecordUpdate {
            status: Some(ComplianceStatus::Active),
            expiry_date: Some(date(2027, 1, 1)),
            ..Default::default()
        };
        record.apply_update(&update, now()).unwrap();
        assert_eq!(record.status, ComplianceStatus::Active);
    }

    #[test]
    fn labeling_change_stamps_timestamp() {
        let mut record = ComplianceRecord::pending(key(), now());
        let later = now() + Duration::hours(2);
        let update = RecordUpdate {
            labeling_status: Some(LabelingStatus::Done),
            ..Default::default()
        };
        record.apply_update(&update, later).unwrap();
        assert_eq!(record.labeling_updated_at, Some(later));
    }

    #[test]
    fn unchanged_labeling_keeps_timestamp() {
        let mut record = ComplianceRecord::pending(key(), now());
        let update = RecordUpdate {
            labeling_status: Some(LabelingStatus::Pending),
            ..Default::default()
        };
        record.apply_update(&update, now()).unwrap();
        assert!(record.labeling_updated_at.is_none());
    }

    #[test]
    fn draft_cannot_start_active_without_expiry() {
        let draft = RecordDraft {
            status: ComplianceStatus::Active,
            ..Default::default()
        };
        assert_eq!(
            ComplianceRecord::new(RecordId::new(), key(), draft, now()).unwrap_err(),
            RecordError::ActiveRequiresExpiry
        );
    }

    #[test]
    fn cooldown_is_seven_whole_days() {
        let mut record = ComplianceRecord::pending(key(), now());
        assert!(record.is_due_for_notification(now()));
        record.last_notified_at = Some(now());
        assert!(!record.is_due_for_notification(now() + Duration::days(6)));
        assert!(!record.is_due_for_notification(now() + Duration::days(7) - Duration::seconds(1)));
        assert!(record.is_due_for_notification(now() + Duration::days(7)));
    }

    #[test]
    fn warning_advances_only_active() {
        let mut record = ComplianceRecord::pending(key(), now());
        record.status = ComplianceStatus::Active;
        record.expiry_date = Some(date(2025, 8, 30));
        record.record_warning(now());
        assert_eq!(record.status, ComplianceStatus::Expiring);
        assert_eq!(record.last_notified_at, Some(now()));
        record.record_warning(now());
        assert_eq!(record.status, ComplianceStatus::Expiring);
    }

    #[test]
    fn overdue_excludes_expired_and_undated() {
        let today = date(2025, 6, 1);
        let mut record = ComplianceRecord::pending(key(), now());
        assert!(!record.is_overdue(today));
        record.expiry_date = Some(date(2025, 5, 31));
        assert!(record.is_overdue(today));
        record.expiry_date = Some(today);
        assert!(!record.is_overdue(today));
        record.expiry_date = Some(date(2025, 5, 31));
        record.mark_expired(now());
        assert!(!record.is_overdue(today));
    }

    #[test]
    fn expires_on_requires_watched_status() {
        let target = date(2025, 8, 30);
        let mut record = ComplianceRecord::pending(key(), now());
        record.expiry_date = Some(target);
        assert!(!record.expires_on(target));
        record.status = ComplianceStatus::Active;
        assert!(record.expires_on(target));
        record.status = ComplianceStatus::Expiring;
        assert!(record.expires_on(target));
    }

    #[test]
    fn set_attachment_returns_previous() {
        let mut record = ComplianceRecord::pending(key(), now());
        let first = Attachment {
            path: "certificates/a".into(),
            filename: "a.pdf".into(),
            content_type: "application/pdf".into(),
        };
        let second = Attachment {
            path: "certificates/b".into(),
            ..first.clone()
        };
        assert!(record
            .set_attachment(AttachmentKind::Certificate, first.clone(), now())
            .is_none());
        assert_eq!(
            record.set_attachment(AttachmentKind::Certificate, second, now()),
            Some(first)
        );
        assert_eq!(record.attachment_paths(), vec!["certificates/b".to_string()]);
    }

    #[test]
    fn status_serializes_screaming() {
        assert_eq!(
            serde_json::to_string(&ComplianceStatus::Expiring).unwrap(),
            "\"EXPIRING\""
        );
    }

    #[test]
    fn record_error_maps_to_validation() {
        let err: TamsysError = RecordError::ActiveRequiresExpiry.into();
        assert_eq!(
            err,
            TamsysError::Validation(ValidationError::ActiveRequiresExpiry)
        );
    }
}
