//! Tenant and notification-rule persistence.

use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use tamsys_core::{NotificationRule, NotificationRuleId, Tenant, TenantId};

use super::{enum_text, parse_enum};

/// Insert a tenant.
pub async fn insert_tenant<'e>(exec: impl PgExecutor<'e>, tenant: &Tenant) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO tenants (id, name, contact_email, is_active, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(tenant.id.as_uuid())
    .bind(&tenant.name)
    .bind(&tenant.contact_email)
    .bind(tenant.is_active)
    .bind(tenant.created_at)
    .bind(tenant.updated_at)
    .execute(exec)
    .await?;
    Ok(())
}

/// Overwrite a tenant's mutable columns.
pub async fn update_tenant(pool: &PgPool, tenant: &Tenant) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE tenants SET name = $1, contact_email = $2, is_active = $3, updated_at = $4
         WHERE id = $5",
    )
    .bind(&tenant.name)
    .bind(&tenant.contact_email)
    .bind(tenant.is_active)
    .bind(tenant.updated_at)
    .bind(tenant.id.as_uuid())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete a tenant with everything it owns.
pub async fn delete_tenant(pool: &PgPool, id: TenantId) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM tenants WHERE id = $1")
        .bind(id.as_uuid())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Load all tenants.
pub async fn load_tenants(pool: &PgPool) -> Result<Vec<Tenant>, sqlx::Error> {
    let rows = sqlx::query_as::<_, TenantRow>(
        "SELECT id, name, contact_email, is_active, created_at, updated_at
         FROM tenants ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(TenantRow::into_record).collect())
}

#[derive(sqlx::FromRow)]
struct TenantRow {
    id: Uuid,
    name: String,
    contact_email: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TenantRow {
    fn into_record(self) -> Tenant {
        Tenant {
            id: TenantId::from_uuid(self.id),
            name: self.name,
            contact_email: self.contact_email,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

// ── Notification rules ──────────────────────────────────────────────

/// Insert a notification rule.
pub async fn insert_notification_rule<'e>(
    exec: impl PgExecutor<'e>,
    rule: &NotificationRule,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO notification_rules
            (id, tenant_id, days_before_expiry, severity_level, is_active, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(rule.id.as_uuid())
    .bind(rule.tenant_id.as_uuid())
    .bind(i32::from(rule.days_before_expiry))
    .bind(enum_text(&rule.severity_level)?)
    .bind(rule.is_active)
    .bind(rule.created_at)
    .execute(exec)
    .await?;
    Ok(())
}

/// Overwrite a notification rule's mutable columns.
pub async fn update_notification_rule(
    pool: &PgPool,
    rule: &NotificationRule,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE notification_rules
         SET days_before_expiry = $1, severity_level = $2, is_active = $3
         WHERE id = $4",
    )
    .bind(i32::from(rule.days_before_expiry))
    .bind(enum_text(&rule.severity_level)?)
    .bind(rule.is_active)
    .bind(rule.id.as_uuid())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete a notification rule.
pub async fn delete_notification_rule(
    pool: &PgPool,
    id: NotificationRuleId,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM notification_rules WHERE id = $1")
        .bind(id.as_uuid())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Load all notification rules.
pub async fn load_notification_rules(pool: &PgPool) -> Result<Vec<NotificationRule>, sqlx::Error> {
    let rows = sqlx::query_as::<_, NotificationRuleRow>(
        "SELECT id, tenant_id, days_before_expiry, severity_level, is_active, created_at
         FROM notification_rules ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(NotificationRuleRow::into_record).collect()
}

#[derive(sqlx::FromRow)]
struct NotificationRuleRow {
    id: Uuid,
    tenant_id: Uuid,
    days_before_expiry: i32,
    severity_level: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl NotificationRuleRow {
    fn into_record(self) -> Result<NotificationRule, sqlx::Error> {
        let days_before_expiry = u16::try_from(self.days_before_expiry).map_err(|_| {
            sqlx::Error::Decode(
                format!("invalid days_before_expiry: {}", self.days_before_expiry).into(),
            )
        })?;
        Ok(NotificationRule {
            id: NotificationRuleId::from_uuid(self.id),
            tenant_id: TenantId::from_uuid(self.tenant_id),
            days_before_expiry,
            severity_level: parse_enum("severity_level", self.severity_level)?,
            is_active: self.is_active,
            created_at: self.created_at,
        })
    }
}
