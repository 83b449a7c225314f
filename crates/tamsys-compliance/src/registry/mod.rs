//! # Registry
//!
//! Every TAMSys entity lives in an explicit table keyed by its surrogate id.
//! Relationships are plain id fields resolved through index lookups; there
//! is no object graph.
//!
//! The registry owns the uniqueness indices (technology name, country ISO
//! code, certification name, rule triple, record key) and performs cascade
//! deletes. It is not synchronized itself: callers share it behind a lock
//! and hold the write guard for the whole of a multi-step operation such as
//! bulk initialization or an expiry run.

mod catalog;
mod devices;
mod records;
mod tenants;

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use tamsys_core::{
    Certification, CertificationId, ComplianceTask, Country, CountryId, Device, DeviceId, IsoCode,
    NoteId, NotificationRule, NotificationRuleId, RecordId, RegulatoryRule, RuleId, RuleKey,
    TamsysError, TaskId, TaskNote, Technology, TechnologyId, Tenant, TenantId,
};
use tamsys_state::{ComplianceRecord, RecordKey};

pub use records::{NewRecord, RecordFilter, RecordView};

/// Default page size for list operations.
pub const DEFAULT_LIMIT: usize = 100;
/// Largest accepted page size.
pub const MAX_LIMIT: usize = 1000;

/// Offset pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Page {
    /// Items to skip.
    #[serde(default)]
    pub skip: usize,
    /// Items to return; clamped to [`MAX_LIMIT`].
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

impl Default for Page {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Page {
    /// Slice an ordered sequence.
    pub fn apply<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.skip)
            .take(self.limit.min(MAX_LIMIT))
            .collect()
    }
}

/// Everything removed by a cascading delete.
///
/// Removed records are returned whole so the caller can clean up their
/// attached documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CascadeReport {
    /// Rule matrix rows removed.
    pub rules_removed: usize,
    /// Devices that lost a technology link.
    pub devices_unlinked: usize,
    /// Devices removed.
    pub devices_removed: usize,
    /// Notification rules removed.
    pub notification_rules_removed: usize,
    /// Compliance records removed, including their attachments.
    #[serde(skip)]
    pub records_removed: Vec<ComplianceRecord>,
    /// Tasks removed with their records.
    pub tasks_removed: usize,
    /// Notes removed with their tasks.
    pub notes_removed: usize,
}

impl CascadeReport {
    fn absorb(&mut self, other: CascadeReport) {
        self.rules_removed += other.rules_removed;
        self.devices_unlinked += other.devices_unlinked;
        self.devices_removed += other.devices_removed;
        self.notification_rules_removed += other.notification_rules_removed;
        self.records_removed.extend(other.records_removed);
        self.tasks_removed += other.tasks_removed;
        self.notes_removed += other.notes_removed;
    }
}

/// Full registry contents, e.g. as loaded from the database on startup.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Technologies.
    pub technologies: Vec<Technology>,
    /// Countries.
    pub countries: Vec<Country>,
    /// Certifications.
    pub certifications: Vec<Certification>,
    /// Rule matrix.
    pub rules: Vec<RegulatoryRule>,
    /// Tenants.
    pub tenants: Vec<Tenant>,
    /// Notification rules.
    pub notification_rules: Vec<NotificationRule>,
    /// Devices with their technology sets.
    pub devices: Vec<Device>,
    /// Compliance records.
    pub records: Vec<ComplianceRecord>,
    /// Tasks.
    pub tasks: Vec<ComplianceTask>,
    /// Notes.
    pub notes: Vec<TaskNote>,
}

/// Monotonic integer key generator for catalog tables.
#[derive(Debug, Clone)]
struct Sequence {
    next: i64,
}

impl Default for Sequence {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl Sequence {
    fn take(&mut self) -> i64 {
        let id = self.next;
        self.next += 1;
        id
    }

    fn observe(&mut self, id: i64) {
        if id >= self.next {
            self.next = id + 1;
        }
    }
}

/// In-memory tables, indices, and key sequences.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    technologies: BTreeMap<TechnologyId, Technology>,
    countries: BTreeMap<CountryId, Country>,
    certifications: BTreeMap<CertificationId, Certification>,
    rules: BTreeMap<RuleId, RegulatoryRule>,
    tenants: HashMap<TenantId, Tenant>,
    notification_rules: HashMap<NotificationRuleId, NotificationRule>,
    devices: HashMap<DeviceId, Device>,
    records: HashMap<RecordId, ComplianceRecord>,
    tasks: HashMap<TaskId, ComplianceTask>,
    notes: HashMap<NoteId, TaskNote>,

    technology_names: HashMap<String, TechnologyId>,
    country_codes: HashMap<IsoCode, CountryId>,
    certification_names: HashMap<String, CertificationId>,
    rule_keys: HashMap<RuleKey, RuleId>,
    record_keys: HashMap<RecordKey, RecordId>,

    technology_seq: Sequence,
    country_seq: Sequence,
    certification_seq: Sequence,
    rule_seq: Sequence,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from persisted rows.
    ///
    /// Rows go through the same uniqueness checks as live inserts, so a
    /// snapshot that violates an invariant is rejected with `Conflict`.
    pub fn restore(snapshot: Snapshot) -> Result<Self, TamsysError> {
        let mut registry = Self::new();
        for technology in snapshot.technologies {
            registry.insert_technology(technology)?;
        }
        for country in snapshot.countries {
            registry.insert_country(country)?;
        }
        for certification in snapshot.certifications {
            registry.insert_certification(certification)?;
        }
        for rule in snapshot.rules {
            registry.insert_rule(rule)?;
        }
        for tenant in snapshot.tenants {
            registry.tenants.insert(tenant.id, tenant);
        }
        for rule in snapshot.notification_rules {
            registry.notification_rules.insert(rule.id, rule);
        }
        for device in snapshot.devices {
            registry.devices.insert(device.id, device);
        }
        for record in snapshot.records {
            registry.insert_record(record)?;
        }
        for task in snapshot.tasks {
            registry.tasks.insert(task.id, task);
        }
        for note in snapshot.notes {
            registry.notes.insert(note.id, note);
        }
        Ok(registry)
    }

    /// Copy every table out, in id order for the catalog.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            technologies: self.technologies.values().cloned().collect(),
            countries: self.countries.values().cloned().collect(),
            certifications: self.certifications.values().cloned().collect(),
            rules: self.rules.values().cloned().collect(),
            tenants: self.tenants.values().cloned().collect(),
            notification_rules: self.notification_rules.values().cloned().collect(),
            devices: self.devices.values().cloned().collect(),
            records: self.records.values().cloned().collect(),
            tasks: self.tasks.values().cloned().collect(),
            notes: self.notes.values().cloned().collect(),
        }
    }

    /// Whether no tenant data and no catalog data exist.
    pub fn is_empty(&self) -> bool {
        self.technologies.is_empty()
            && self.countries.is_empty()
            && self.certifications.is_empty()
            && self.tenants.is_empty()
    }

    /// Row counts per table, for logging.
    pub fn counts(&self) -> BTreeMap<&'static str, usize> {
        BTreeMap::from([
            ("technologies", self.technologies.len()),
            ("countries", self.countries.len()),
            ("certifications", self.certifications.len()),
            ("rules", self.rules.len()),
            ("tenants", self.tenants.len()),
            ("notification_rules", self.notification_rules.len()),
            ("devices", self.devices.len()),
            ("records", self.records.len()),
            ("tasks", self.tasks.len()),
            ("notes", self.notes.len()),
        ])
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use tamsys_core::TargetMarkets;

    #[test]
    fn page_applies_skip_and_limit() {
        let page = Page { skip: 2, limit: 3 };
        assert_eq!(page.apply(0..10), vec![2, 3, 4]);
    }

    #[test]
    fn page_limit_is_clamped() {
        let page = Page {
            skip: 0,
            limit: 5000,
        };
        assert_eq!(page.apply(0..2000).len(), MAX_LIMIT);
    }

    #[test]
    fn restore_round_trips_and_continues_sequences() {
        let mut registry = Registry::new();
        let wifi = technology(&mut registry, "Wi-Fi 6E");
        let ind = country(&mut registry, "India", "IND");
        let wpc = certification(&mut registry, "WPC");
        rule(&mut registry, wifi, ind, wpc, true);
        let tenant = tenant(&mut registry, "Acme");
        device(&mut registry, tenant, "Tractor X9", &[wifi], TargetMarkets::All);

        let snapshot = registry.snapshot();
        let mut restored = Registry::restore(snapshot).unwrap();
        assert_eq!(restored.counts(), registry.counts());

        let next = technology(&mut restored, "Bluetooth");
        assert!(next > wifi);
    }

    #[test]
    fn restore_rejects_duplicate_names() {
        let mut registry = Registry::new();
        technology(&mut registry, "LTE");
        let mut snapshot = registry.snapshot();
        let mut dup = snapshot.technologies[0].clone();
        dup.id = TechnologyId::new(99);
        snapshot.technologies.push(dup);
        assert!(matches!(
            Registry::restore(snapshot),
            Err(TamsysError::Conflict(_))
        ));
    }
}
