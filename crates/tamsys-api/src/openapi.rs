//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI 3.1 spec,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

/// Assembled OpenAPI spec for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "TAMSys API",
        version = "0.1.0",
        description = "Regulatory gap analysis for multi-technology hardware: catalog and rule matrix, devices, compliance records, documents, tasks, and certificate expiry tracking.",
        license(name = "AGPL-3.0-or-later")
    ),
    paths(
        // Catalog
        crate::routes::catalog::create_technology,
        crate::routes::catalog::list_technologies,
        crate::routes::catalog::get_technology,
        crate::routes::catalog::update_technology,
        crate::routes::catalog::delete_technology,
        crate::routes::catalog::create_country,
        crate::routes::catalog::list_countries,
        crate::routes::catalog::get_country,
        crate::routes::catalog::update_country,
        crate::routes::catalog::delete_country,
        crate::routes::catalog::create_certification,
        crate::routes::catalog::list_certifications,
        crate::routes::catalog::get_certification,
        crate::routes::catalog::update_certification,
        crate::routes::catalog::delete_certification,
        // Rules
        crate::routes::rules::create_rule,
        crate::routes::rules::list_rules,
        crate::routes::rules::get_rule,
        crate::routes::rules::update_rule,
        crate::routes::rules::delete_rule,
        // Tenants
        crate::routes::tenants::create_tenant,
        crate::routes::tenants::list_tenants,
        crate::routes::tenants::get_tenant,
        crate::routes::tenants::update_tenant,
        crate::routes::tenants::deactivate_tenant,
        crate::routes::tenants::delete_tenant,
        crate::routes::tenants::create_notification_rule,
        crate::routes::tenants::list_notification_rules,
        crate::routes::tenants::get_notification_rule,
        crate::routes::tenants::update_notification_rule,
        crate::routes::tenants::delete_notification_rule,
        // Devices
        crate::routes::devices::create_device,
        crate::routes::devices::list_devices,
        crate::routes::devices::get_device,
        crate::routes::devices::device_technologies,
        crate::routes::devices::update_device,
        crate::routes::devices::initialize_device,
        crate::routes::devices::delete_device,
        // Compliance
        crate::routes::compliance::gap_analysis,
        crate::routes::compliance::create_record,
        crate::routes::compliance::list_records,
        crate::routes::compliance::get_record,
        crate::routes::compliance::update_record,
        crate::routes::compliance::delete_record,
        crate::routes::compliance::upload_document,
        crate::routes::compliance::document_url,
        // Tasks
        crate::routes::tasks::list_tasks,
        crate::routes::tasks::create_task,
        crate::routes::tasks::get_task,
        crate::routes::tasks::update_task,
        crate::routes::tasks::list_notes,
        crate::routes::tasks::add_note,
        // Admin
        crate::routes::admin::expiry_check,
    ),
    components(schemas(
        // Catalog
        tamsys_core::Technology,
        tamsys_core::NewTechnology,
        tamsys_core::TechnologyPatch,
        tamsys_core::Country,
        tamsys_core::NewCountry,
        tamsys_core::CountryPatch,
        tamsys_core::Certification,
        tamsys_core::NewCertification,
        tamsys_core::CertificationPatch,
        tamsys_core::RegulatoryRule,
        tamsys_core::NewRule,
        tamsys_core::RulePatch,
        // Tenants
        tamsys_core::Tenant,
        tamsys_core::NewTenant,
        tamsys_core::TenantPatch,
        tamsys_core::NotificationRule,
        tamsys_core::NewNotificationRule,
        tamsys_core::NotificationRulePatch,
        tamsys_core::Severity,
        // Devices
        tamsys_core::Device,
        tamsys_core::NewDevice,
        tamsys_core::DevicePatch,
        crate::routes::devices::DeviceResponse,
        tamsys_compliance::BulkInitReport,
        // Records
        tamsys_state::ComplianceRecord,
        tamsys_state::ComplianceStatus,
        tamsys_state::LabelingStatus,
        tamsys_state::RecordDraft,
        tamsys_state::RecordUpdate,
        tamsys_state::Attachment,
        tamsys_state::AttachmentKind,
        tamsys_compliance::NewRecord,
        tamsys_compliance::RecordView,
        crate::routes::compliance::DocumentResponse,
        // Gap analysis
        crate::routes::compliance::GapAnalysisRequest,
        tamsys_compliance::GapAnalysis,
        tamsys_compliance::GapItem,
        tamsys_compliance::RequirementStatus,
        // Tasks
        tamsys_core::ComplianceTask,
        tamsys_core::NewTask,
        tamsys_core::TaskPatch,
        tamsys_core::TaskStatus,
        tamsys_core::TaskCategory,
        tamsys_core::TaskCounts,
        tamsys_core::TaskNote,
        tamsys_core::NewTaskNote,
        // Expiry
        tamsys_compliance::ExpiryReport,
        tamsys_compliance::ExpiryNotice,
        tamsys_compliance::ExpiredRecord,
        // Errors
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "catalog", description = "Technologies, countries and certifications"),
        (name = "rules", description = "Regulatory rule matrix"),
        (name = "tenants", description = "Tenants and expiry notification thresholds"),
        (name = "devices", description = "Devices and bulk gap initialization"),
        (name = "compliance", description = "Gap analysis, compliance records and documents"),
        (name = "tasks", description = "Record tasks and notes"),
        (name = "admin", description = "Operational endpoints"),
    )
)]
pub struct ApiDoc;

/// Router serving the OpenAPI document.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_lists_core_paths() {
        let spec = ApiDoc::openapi();
        for path in [
            "/v1/technologies",
            "/v1/rules/{id}",
            "/v1/devices/{id}/initialize",
            "/v1/compliance/gap-analysis",
            "/v1/compliance/records/{id}/document",
            "/v1/compliance/tasks/{id}/notes",
            "/v1/admin/expiry-check",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn spec_serializes() {
        let json = serde_json::to_string(&ApiDoc::openapi()).unwrap();
        assert!(json.contains("GapAnalysis"));
    }
}
