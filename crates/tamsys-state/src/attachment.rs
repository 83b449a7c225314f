//! Document attachments on a compliance record.
//!
//! A record holds at most one attachment per [`AttachmentKind`]. Objects are
//! stored under `{folder}/{tenant}/{device}/{YYYYmmdd_HHMMSS}_{filename}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use tamsys_core::{DeviceId, TenantId, ValidationError};

/// The three attachment slots of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    /// The issued certificate document.
    Certificate,
    /// Lab test report.
    TestReport,
    /// Photo of the applied product label.
    LabelPicture,
}

impl AttachmentKind {
    /// Every kind, in slot order.
    pub const ALL: [AttachmentKind; 3] = [Self::Certificate, Self::TestReport, Self::LabelPicture];

    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Certificate => "certificate",
            Self::TestReport => "test_report",
            Self::LabelPicture => "label_picture",
        }
    }

    /// Top-level object-store folder for this kind.
    pub fn folder(&self) -> &'static str {
        match self {
            Self::Certificate => "certificates",
            Self::TestReport => "test_reports",
            Self::LabelPicture => "label_pictures",
        }
    }

    /// Object path for a new upload.
    pub fn object_path(
        &self,
        tenant_id: TenantId,
        device_id: DeviceId,
        at: DateTime<Utc>,
        filename: &str,
    ) -> String {
        format!(
            "{}/{}/{}/{}_{}",
            self.folder(),
            tenant_id,
            device_id,
            at.format("%Y%m%d_%H%M%S"),
            sanitize_filename(filename)
        )
    }
}

impl std::fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AttachmentKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "certificate" => Ok(Self::Certificate),
            "test_report" => Ok(Self::TestReport),
            "label_picture" => Ok(Self::LabelPicture),
            _ => Err(ValidationError::UnknownValue {
                kind: "document type",
                value: s.to_string(),
            }),
        }
    }
}

/// Keep only the final path component so uploads cannot escape their
/// folder, and replace URL delimiters.
fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() || base == "." || base == ".." {
        "upload".to_string()
    } else {
        base.replace(['?', '&', '#'], "_")
    }
}

/// Where an uploaded document lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Attachment {
    /// Object-store path.
    pub path: String,
    /// Original filename.
    pub filename: String,
    /// MIME type.
    pub content_type: String,
}
