//! # tamsys-compliance — Regulatory Gap Analysis Engine
//!
//! Answers two questions for a device in a market: which certifications are
//! legally required, and which of those does the manufacturer hold?
//!
//! ## Components
//!
//! | Module | Role |
//! |--------|------|
//! | [`registry`] | All entities in explicit tables keyed by surrogate ids, with uniqueness indices and cascade deletes. |
//! | [`matrix`] | `rules_for(technologies, country)`: mandatory rule lookup. |
//! | [`gap`] | `analyze(tenant, device, country)`: required vs held. |
//! | [`bulk`] | `initialize_gaps`: idempotent PENDING record creation across target markets. |
//! | [`expiry`] | The daily approach-warning and hard-expiry passes. |
//! | [`notifier`] | Delivery seam for expiry alerts (log-only). |
//! | [`object_store`] | Document storage seam and in-memory implementation. |
//! | [`seed`] | YAML datasets with load-time country-group expansion. |
//!
//! Every operation takes `now`/`today` explicitly; nothing in this crate
//! reads the clock.

pub mod bulk;
pub mod expiry;
pub mod gap;
pub mod matrix;
pub mod notifier;
pub mod object_store;
pub mod registry;
pub mod seed;

pub use bulk::{initialize_gaps, BulkInitOutcome, BulkInitReport};
pub use expiry::{
    plan_expiry, run_expiry_check, AppliedExpiry, ExpiredRecord, ExpiryNotice, ExpiryPlan,
    ExpiryReport, PlannedChange, RecordChange,
};
pub use gap::{analyze, GapAnalysis, GapItem, RequirementStatus};
pub use notifier::{ExpiryEvent, LogNotifier, Notifier};
pub use object_store::{InMemoryObjectStore, ObjectStore, ObjectStoreError};
pub use registry::{CascadeReport, NewRecord, Page, RecordFilter, RecordView, Registry, Snapshot};
pub use seed::{apply_dataset, load_dataset, Dataset, ExpandedRule, SeedError, SeedReport};
