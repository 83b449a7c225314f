//! Catalog and rule-matrix persistence.
//!
//! Surrogate keys are assigned by the registry and written as-is; the
//! tables have no sequences.

use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};

use tamsys_core::{
    Certification, CertificationId, Country, CountryId, IsoCode, RegulatoryRule, RuleId,
    Technology, TechnologyId,
};

// ── Technologies ────────────────────────────────────────────────────

/// Insert a technology.
pub async fn insert_technology<'e>(
    exec: impl PgExecutor<'e>,
    technology: &Technology,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO technologies (id, name, description, created_at) VALUES ($1, $2, $3, $4)",
    )
    .bind(technology.id.get())
    .bind(&technology.name)
    .bind(&technology.description)
    .bind(technology.created_at)
    .execute(exec)
    .await?;
    Ok(())
}

/// Overwrite a technology's mutable columns.
pub async fn update_technology(pool: &PgPool, technology: &Technology) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE technologies SET name = $1, description = $2 WHERE id = $3")
        .bind(&technology.name)
        .bind(&technology.description)
        .bind(technology.id.get())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete a technology; rules and device links cascade.
pub async fn delete_technology(pool: &PgPool, id: TechnologyId) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM technologies WHERE id = $1")
        .bind(id.get())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Load all technologies.
pub async fn load_technologies(pool: &PgPool) -> Result<Vec<Technology>, sqlx::Error> {
    let rows = sqlx::query_as::<_, TechnologyRow>(
        "SELECT id, name, description, created_at FROM technologies ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(TechnologyRow::into_record).collect())
}

#[derive(sqlx::FromRow)]
struct TechnologyRow {
    id: i64,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

impl TechnologyRow {
    fn into_record(self) -> Technology {
        Technology {
            id: TechnologyId::new(self.id),
            name: self.name,
            description: self.description,
            created_at: self.created_at,
        }
    }
}

// ── Countries ───────────────────────────────────────────────────────

/// Insert a country.
pub async fn insert_country<'e>(
    exec: impl PgExecutor<'e>,
    country: &Country,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO countries (id, name, iso_code, details, created_at) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(country.id.get())
    .bind(&country.name)
    .bind(country.iso_code.as_str())
    .bind(&country.details)
    .bind(country.created_at)
    .execute(exec)
    .await?;
    Ok(())
}

/// Overwrite a country's mutable columns.
pub async fn update_country(pool: &PgPool, country: &Country) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("UPDATE countries SET name = $1, iso_code = $2, details = $3 WHERE id = $4")
            .bind(&country.name)
            .bind(country.iso_code.as_str())
            .bind(&country.details)
            .bind(country.id.get())
            .execute(pool)
            .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete a country; rules and compliance records cascade.
pub async fn delete_country(pool: &PgPool, id: CountryId) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM countries WHERE id = $1")
        .bind(id.get())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Load all countries.
pub async fn load_countries(pool: &PgPool) -> Result<Vec<Country>, sqlx::Error> {
    let rows = sqlx::query_as::<_, CountryRow>(
        "SELECT id, name, iso_code, details, created_at FROM countries ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(CountryRow::into_record).collect()
}

#[derive(sqlx::FromRow)]
struct CountryRow {
    id: i64,
    name: String,
    iso_code: String,
    details: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl CountryRow {
    fn into_record(self) -> Result<Country, sqlx::Error> {
        let iso_code = IsoCode::parse(&self.iso_code)
            .map_err(|e| sqlx::Error::Decode(format!("country {}: {e}", self.id).into()))?;
        Ok(Country {
            id: CountryId::new(self.id),
            name: self.name,
            iso_code,
            details: self.details,
            created_at: self.created_at,
        })
    }
}

// ── Certifications ──────────────────────────────────────────────────

/// Insert a certification.
pub async fn insert_certification<'e>(
    exec: impl PgExecutor<'e>,
    certification: &Certification,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO certifications
            (id, name, authority_name, description, branding_image_url, labeling_requirements, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(certification.id.get())
    .bind(&certification.name)
    .bind(&certification.authority_name)
    .bind(&certification.description)
    .bind(&certification.branding_image_url)
    .bind(&certification.labeling_requirements)
    .bind(certification.created_at)
    .execute(exec)
    .await?;
    Ok(())
}

/// Overwrite a certification's mutable columns.
pub async fn update_certification(
    pool: &PgPool,
    certification: &Certification,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE certifications
         SET name = $1, authority_name = $2, description = $3,
             branding_image_url = $4, labeling_requirements = $5
         WHERE id = $6",
    )
    .bind(&certification.name)
    .bind(&certification.authority_name)
    .bind(&certification.description)
    .bind(&certification.branding_image_url)
    .bind(&certification.labeling_requirements)
    .bind(certification.id.get())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete a certification; rules and compliance records cascade.
pub async fn delete_certification(pool: &PgPool, id: CertificationId) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM certifications WHERE id = $1")
        .bind(id.get())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Load all certifications.
pub async fn load_certifications(pool: &PgPool) -> Result<Vec<Certification>, sqlx::Error> {
    let rows = sqlx::query_as::<_, CertificationRow>(
        "SELECT id, name, authority_name, description, branding_image_url,
                labeling_requirements, created_at
         FROM certifications ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(CertificationRow::into_record).collect())
}

#[derive(sqlx::FromRow)]
struct CertificationRow {
    id: i64,
    name: String,
    authority_name: Option<String>,
    description: Option<String>,
    branding_image_url: Option<String>,
    labeling_requirements: Option<String>,
    created_at: DateTime<Utc>,
}

impl CertificationRow {
    fn into_record(self) -> Certification {
        Certification {
            id: CertificationId::new(self.id),
            name: self.name,
            authority_name: self.authority_name,
            description: self.description,
            branding_image_url: self.branding_image_url,
            labeling_requirements: self.labeling_requirements,
            created_at: self.created_at,
        }
    }
}

// ── Rule matrix ─────────────────────────────────────────────────────

/// Insert a rule.
pub async fn insert_rule<'e>(
    exec: impl PgExecutor<'e>,
    rule: &RegulatoryRule,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO regulatory_rules
            (id, technology_id, country_id, certification_id, is_mandatory, notes, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(rule.id.get())
    .bind(rule.technology_id.get())
    .bind(rule.country_id.get())
    .bind(rule.certification_id.get())
    .bind(rule.is_mandatory)
    .bind(&rule.notes)
    .bind(rule.created_at)
    .execute(exec)
    .await?;
    Ok(())
}

/// Overwrite a rule's flag and notes. The triple is immutable.
pub async fn update_rule(pool: &PgPool, rule: &RegulatoryRule) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("UPDATE regulatory_rules SET is_mandatory = $1, notes = $2 WHERE id = $3")
            .bind(rule.is_mandatory)
            .bind(&rule.notes)
            .bind(rule.id.get())
            .execute(pool)
            .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete a rule.
pub async fn delete_rule(pool: &PgPool, id: RuleId) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM regulatory_rules WHERE id = $1")
        .bind(id.get())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Load the rule matrix.
pub async fn load_rules(pool: &PgPool) -> Result<Vec<RegulatoryRule>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RuleRow>(
        "SELECT id, technology_id, country_id, certification_id, is_mandatory, notes, created_at
         FROM regulatory_rules ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(RuleRow::into_record).collect())
}

#[derive(sqlx::FromRow)]
struct RuleRow {
    id: i64,
    technology_id: i64,
    country_id: i64,
    certification_id: i64,
    is_mandatory: bool,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl RuleRow {
    fn into_record(self) -> RegulatoryRule {
        RegulatoryRule {
            id: RuleId::new(self.id),
            technology_id: TechnologyId::new(self.technology_id),
            country_id: CountryId::new(self.country_id),
            certification_id: CertificationId::new(self.certification_id),
            is_mandatory: self.is_mandatory,
            notes: self.notes,
            created_at: self.created_at,
        }
    }
}
