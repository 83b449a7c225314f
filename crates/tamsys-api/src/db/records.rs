//! Compliance record persistence.
//!
//! Status and labeling status are stored as their wire strings. Attachment
//! descriptors are stored as JSONB, one column per slot.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use tamsys_core::{CertificationId, CountryId, DeviceId, RecordId, TenantId};
use tamsys_compliance::RecordChange;
use tamsys_state::{Attachment, ComplianceRecord};

use super::{enum_text, parse_enum};

const COLUMNS: &str = "id, tenant_id, device_id, country_id, certification_id, status, expiry_date,
    certificate_number, labeling_status, labeling_updated_at, certificate, test_report,
    label_picture, last_notified_at, created_at, updated_at";

/// Insert a record.
pub async fn insert<'e>(exec: impl PgExecutor<'e>, record: &ComplianceRecord) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "INSERT INTO compliance_records ({COLUMNS})
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)"
    ))
    .bind(record.id.as_uuid())
    .bind(record.tenant_id.as_uuid())
    .bind(record.device_id.as_uuid())
    .bind(record.country_id.get())
    .bind(record.certification_id.get())
    .bind(enum_text(&record.status)?)
    .bind(record.expiry_date)
    .bind(&record.certificate_number)
    .bind(enum_text(&record.labeling_status)?)
    .bind(record.labeling_updated_at)
    .bind(record.certificate.clone().map(Json))
    .bind(record.test_report.clone().map(Json))
    .bind(record.label_picture.clone().map(Json))
    .bind(record.last_notified_at)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(exec)
    .await?;
    Ok(())
}

/// Insert several records in one transaction, e.g. the output of a bulk
/// gap initialization.
pub async fn insert_many(pool: &PgPool, records: &[ComplianceRecord]) -> Result<(), sqlx::Error> {
    if records.is_empty() {
        return Ok(());
    }
    let mut tx = pool.begin().await?;
    for record in records {
        insert(&mut *tx, record).await?;
    }
    tx.commit().await
}

/// Overwrite every mutable column of a record.
pub async fn update<'e>(
    exec: impl PgExecutor<'e>,
    record: &ComplianceRecord,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE compliance_records
         SET status = $1, expiry_date = $2, certificate_number = $3, labeling_status = $4,
             labeling_updated_at = $5, certificate = $6, test_report = $7, label_picture = $8,
             last_notified_at = $9, updated_at = $10
         WHERE id = $11",
    )
    .bind(enum_text(&record.status)?)
    .bind(record.expiry_date)
    .bind(&record.certificate_number)
    .bind(enum_text(&record.labeling_status)?)
    .bind(record.labeling_updated_at)
    .bind(record.certificate.clone().map(Json))
    .bind(record.test_report.clone().map(Json))
    .bind(record.label_picture.clone().map(Json))
    .bind(record.last_notified_at)
    .bind(record.updated_at)
    .bind(record.id.as_uuid())
    .execute(exec)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Write the records changed by one expiry run in one transaction.
///
/// Each row is only written if its status and expiry date still match the
/// state the run started from. Returns the ids of rows that had changed in
/// the meantime and were left alone.
pub async fn update_many(
    pool: &PgPool,
    changes: &[RecordChange],
) -> Result<HashSet<RecordId>, sqlx::Error> {
    let mut stale = HashSet::new();
    let mut tx = pool.begin().await?;
    for change in changes {
        if !update_if_unchanged(&mut *tx, &change.before, &change.after).await? {
            stale.insert(change.after.id);
        }
    }
    tx.commit().await?;
    Ok(stale)
}

async fn update_if_unchanged<'e>(
    exec: impl PgExecutor<'e>,
    before: &ComplianceRecord,
    after: &ComplianceRecord,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE compliance_records
         SET status = $1, last_notified_at = $2, updated_at = $3
         WHERE id = $4 AND status = $5 AND expiry_date IS NOT DISTINCT FROM $6",
    )
    .bind(enum_text(&after.status)?)
    .bind(after.last_notified_at)
    .bind(after.updated_at)
    .bind(after.id.as_uuid())
    .bind(enum_text(&before.status)?)
    .bind(before.expiry_date)
    .execute(exec)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete a record; tasks and notes cascade.
pub async fn delete(pool: &PgPool, id: RecordId) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM compliance_records WHERE id = $1")
        .bind(id.as_uuid())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Load all records.
pub async fn load_all(pool: &PgPool) -> Result<Vec<ComplianceRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RecordRow>(&format!(
        "SELECT {COLUMNS} FROM compliance_records ORDER BY created_at"
    ))
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(RecordRow::into_record).collect()
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    id: Uuid,
    tenant_id: Uuid,
    device_id: Uuid,
    country_id: i64,
    certification_id: i64,
    status: String,
    expiry_date: Option<NaiveDate>,
    certificate_number: Option<String>,
    labeling_status: String,
    labeling_updated_at: Option<DateTime<Utc>>,
    certificate: Option<Json<Attachment>>,
    test_report: Option<Json<Attachment>>,
    label_picture: Option<Json<Attachment>>,
    last_notified_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RecordRow {
    fn into_record(self) -> Result<ComplianceRecord, sqlx::Error> {
        Ok(ComplianceRecord {
            id: RecordId::from_uuid(self.id),
            tenant_id: TenantId::from_uuid(self.tenant_id),
            device_id: DeviceId::from_uuid(self.device_id),
            country_id: CountryId::new(self.country_id),
            certification_id: CertificationId::new(self.certification_id),
            status: parse_enum("status", self.status)?,
            expiry_date: self.expiry_date,
            certificate_number: self.certificate_number,
            labeling_status: parse_enum("labeling_status", self.labeling_status)?,
            labeling_updated_at: self.labeling_updated_at,
            certificate: self.certificate.map(|Json(a)| a),
            test_report: self.test_report.map(|Json(a)| a),
            label_picture: self.label_picture.map(|Json(a)| a),
            last_notified_at: self.last_notified_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
