//! # Database Persistence Layer
//!
//! Postgres persistence for the registry via SQLx.
//!
//! ## Architecture
//!
//! The database layer is **optional**. When `DATABASE_URL` is set, every
//! mutation is written through to PostgreSQL after it succeeds in memory,
//! and the registry is rebuilt from the tables on startup. When absent,
//! the API runs in-memory only (development and tests).
//!
//! Uniqueness constraints exist both in the registry and in SQL; the
//! registry rejects duplicates first, SQL is the backstop.
//!
//! Cascading deletes are expressed as `ON DELETE CASCADE` foreign keys, so
//! removing a parent row is a single statement.

pub mod catalog;
pub mod devices;
pub mod records;
pub mod tasks;
pub mod tenants;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::{PgPool, PgPoolOptions};

use tamsys_compliance::Snapshot;

/// Initialize the database connection pool and run migrations.
///
/// Returns `None` if no URL is configured (in-memory-only mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool(url: Option<&str>) -> Result<Option<PgPool>, sqlx::Error> {
    let Some(url) = url else {
        tracing::warn!(
            "DATABASE_URL not set, running in-memory only mode. \
             State will not survive restarts."
        );
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}

/// Read every table.
pub async fn load_snapshot(pool: &PgPool) -> Result<Snapshot, sqlx::Error> {
    Ok(Snapshot {
        technologies: catalog::load_technologies(pool).await?,
        countries: catalog::load_countries(pool).await?,
        certifications: catalog::load_certifications(pool).await?,
        rules: catalog::load_rules(pool).await?,
        tenants: tenants::load_tenants(pool).await?,
        notification_rules: tenants::load_notification_rules(pool).await?,
        devices: devices::load_all(pool).await?,
        records: records::load_all(pool).await?,
        tasks: tasks::load_tasks(pool).await?,
        notes: tasks::load_notes(pool).await?,
    })
}

/// Write a whole snapshot in one transaction, parents before children.
/// Used after seeding an empty database.
pub async fn save_snapshot(pool: &PgPool, snapshot: &Snapshot) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for technology in &snapshot.technologies {
        catalog::insert_technology(&mut *tx, technology).await?;
    }
    for country in &snapshot.countries {
        catalog::insert_country(&mut *tx, country).await?;
    }
    for certification in &snapshot.certifications {
        catalog::insert_certification(&mut *tx, certification).await?;
    }
    for rule in &snapshot.rules {
        catalog::insert_rule(&mut *tx, rule).await?;
    }
    for tenant in &snapshot.tenants {
        tenants::insert_tenant(&mut *tx, tenant).await?;
    }
    for rule in &snapshot.notification_rules {
        tenants::insert_notification_rule(&mut *tx, rule).await?;
    }
    for device in &snapshot.devices {
        devices::insert_in(&mut tx, device).await?;
    }
    for record in &snapshot.records {
        records::insert(&mut *tx, record).await?;
    }
    for task in &snapshot.tasks {
        tasks::insert_task(&mut *tx, task).await?;
    }
    for note in &snapshot.notes {
        tasks::insert_note(&mut *tx, note).await?;
    }
    tx.commit().await
}

/// Serialize a unit enum to its wire string for a TEXT column.
pub(crate) fn enum_text<T: Serialize + std::fmt::Debug>(value: &T) -> Result<String, sqlx::Error> {
    serde_json::to_value(value)
        .map_err(|e| sqlx::Error::Protocol(format!("failed to serialize {value:?}: {e}")))?
        .as_str()
        .map(String::from)
        .ok_or_else(|| sqlx::Error::Protocol(format!("{value:?} is not a string enum")))
}

/// Parse a TEXT column back into a unit enum.
pub(crate) fn parse_enum<T: DeserializeOwned>(column: &str, text: String) -> Result<T, sqlx::Error> {
    serde_json::from_value(serde_json::Value::String(text))
        .map_err(|e| sqlx::Error::Decode(format!("invalid {column}: {e}").into()))
}

/// A pool whose every acquire fails quickly, for exercising write-through
/// failure paths.
#[cfg(test)]
pub(crate) fn unreachable_pool() -> PgPool {
    PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_millis(200))
        .connect_lazy("postgres://tamsys@127.0.0.1:1/tamsys")
        .expect("static URL parses")
}
