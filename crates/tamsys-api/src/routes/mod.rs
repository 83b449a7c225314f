//! # API Route Modules
//!
//! - `catalog`: global technologies, countries and certifications.
//! - `rules`: the regulatory rule matrix.
//! - `tenants`: tenants and their expiry notification thresholds.
//! - `devices`: tenant devices, with bulk gap initialization on write.
//! - `compliance`: gap analysis, compliance records and their documents.
//! - `tasks`: record checklists and task notes.
//! - `admin`: on-demand expiry run.
//!
//! Handlers mutate the registry under its write lock, release the lock,
//! then write the change through to Postgres when a pool is configured.

pub mod admin;
pub mod catalog;
pub mod compliance;
pub mod devices;
pub mod rules;
pub mod tasks;
pub mod tenants;

use tamsys_compliance::object_store::delete_attachments;
use tamsys_compliance::CascadeReport;

use crate::state::AppState;

/// Remove the documents of records dropped by a cascading delete.
pub(crate) fn cleanup_documents(state: &AppState, report: &CascadeReport) {
    if report.records_removed.is_empty() {
        return;
    }
    let removed = delete_attachments(state.object_store.as_ref(), &report.records_removed);
    tracing::info!(
        records = report.records_removed.len(),
        documents = removed,
        "removed documents of deleted records"
    );
}
