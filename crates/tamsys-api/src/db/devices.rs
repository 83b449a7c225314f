//! Device persistence. A device row plus one `device_technologies` row per
//! linked technology, always written together in a transaction.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use tamsys_core::{Device, DeviceId, TargetMarkets, TechnologyId, TenantId};

/// Insert a device with its technology links.
pub async fn insert(pool: &PgPool, device: &Device) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    insert_in(&mut tx, device).await?;
    tx.commit().await
}

/// Insert a device inside an open transaction.
pub(crate) async fn insert_in(
    tx: &mut Transaction<'_, Postgres>,
    device: &Device,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO devices
            (id, tenant_id, model_name, sku, description, target_countries, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(device.id.as_uuid())
    .bind(device.tenant_id.as_uuid())
    .bind(&device.model_name)
    .bind(&device.sku)
    .bind(&device.description)
    .bind(target_json(&device.target_countries)?)
    .bind(device.created_at)
    .bind(device.updated_at)
    .execute(&mut **tx)
    .await?;
    link_technologies(tx, device).await
}

/// Overwrite a device and replace its technology links.
pub async fn update(pool: &PgPool, device: &Device) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        "UPDATE devices
         SET model_name = $1, sku = $2, description = $3, target_countries = $4, updated_at = $5
         WHERE id = $6",
    )
    .bind(&device.model_name)
    .bind(&device.sku)
    .bind(&device.description)
    .bind(target_json(&device.target_countries)?)
    .bind(device.updated_at)
    .bind(device.id.as_uuid())
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM device_technologies WHERE device_id = $1")
        .bind(device.id.as_uuid())
        .execute(&mut *tx)
        .await?;
    link_technologies(&mut tx, device).await?;
    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}

/// Delete a device; records, tasks and notes cascade.
pub async fn delete(pool: &PgPool, id: DeviceId) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM devices WHERE id = $1")
        .bind(id.as_uuid())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Load all devices with their technology sets.
pub async fn load_all(pool: &PgPool) -> Result<Vec<Device>, sqlx::Error> {
    let rows = sqlx::query_as::<_, DeviceRow>(
        "SELECT id, tenant_id, model_name, sku, description, target_countries, created_at, updated_at
         FROM devices ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;
    let links: Vec<(Uuid, i64)> =
        sqlx::query_as("SELECT device_id, technology_id FROM device_technologies")
            .fetch_all(pool)
            .await?;

    let mut technologies: HashMap<Uuid, BTreeSet<TechnologyId>> = HashMap::new();
    for (device_id, technology_id) in links {
        technologies
            .entry(device_id)
            .or_default()
            .insert(TechnologyId::new(technology_id));
    }
    rows.into_iter()
        .map(|row| {
            let set = technologies.remove(&row.id).unwrap_or_default();
            row.into_record(set)
        })
        .collect()
}

async fn link_technologies(
    tx: &mut Transaction<'_, Postgres>,
    device: &Device,
) -> Result<(), sqlx::Error> {
    for technology_id in &device.technology_ids {
        sqlx::query("INSERT INTO device_technologies (device_id, technology_id) VALUES ($1, $2)")
            .bind(device.id.as_uuid())
            .bind(technology_id.get())
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

fn target_json(markets: &TargetMarkets) -> Result<serde_json::Value, sqlx::Error> {
    serde_json::to_value(markets)
        .map_err(|e| sqlx::Error::Protocol(format!("failed to serialize target_countries: {e}")))
}

#[derive(sqlx::FromRow)]
struct DeviceRow {
    id: Uuid,
    tenant_id: Uuid,
    model_name: String,
    sku: Option<String>,
    description: Option<String>,
    target_countries: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DeviceRow {
    fn into_record(self, technology_ids: BTreeSet<TechnologyId>) -> Result<Device, sqlx::Error> {
        let target_countries = serde_json::from_value(self.target_countries)
            .map_err(|e| sqlx::Error::Decode(format!("invalid target_countries: {e}").into()))?;
        Ok(Device {
            id: DeviceId::from_uuid(self.id),
            tenant_id: TenantId::from_uuid(self.tenant_id),
            model_name: self.model_name,
            sku: self.sku,
            description: self.description,
            target_countries,
            technology_ids,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
