//! # tamsys-state — Compliance Record Lifecycle
//!
//! The state machine behind every compliance record:
//!
//! ```text
//!            user update (requires expiry_date)
//! PENDING ──────────────────────────────────▶ ACTIVE
//!                                               │ expiry job: expiry == today + N
//!                                               ▼
//!                                            EXPIRING
//!                                               │ expiry job: expiry < today
//!                                               ▼
//!                                            EXPIRED   (terminal for the job)
//! ```
//!
//! Users move records between PENDING and ACTIVE (including renewal out of
//! EXPIRING/EXPIRED back to ACTIVE). Only the expiry job produces EXPIRING
//! and EXPIRED.

pub mod attachment;
pub mod record;

pub use attachment::{Attachment, AttachmentKind};
pub use record::{
    cooldown_elapsed, ComplianceRecord, ComplianceStatus, LabelingStatus, RecordDraft,
    RecordError, RecordKey, RecordUpdate, NOTIFICATION_COOLDOWN_DAYS,
};
