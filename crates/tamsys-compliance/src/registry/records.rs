//! Compliance records, their tasks, and task notes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use tamsys_core::{
    CertificationId, ComplianceTask, CountryId, DeviceId, NewTask, NewTaskNote, NoteId, RecordId,
    TamsysError, TaskCategory, TaskCounts, TaskId, TaskNote, TaskPatch, TenantId,
};
use tamsys_state::{
    Attachment, AttachmentKind, ComplianceRecord, ComplianceStatus, RecordDraft, RecordKey,
    RecordUpdate,
};

use super::{CascadeReport, Page, Registry, DEFAULT_LIMIT};

/// Input for creating a record directly.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewRecord {
    /// Device.
    pub device_id: DeviceId,
    /// Market.
    pub country_id: CountryId,
    /// Certificate.
    pub certification_id: CertificationId,
    /// Initial field values.
    #[serde(flatten)]
    pub draft: RecordDraft,
}

/// Record list filters. Flat so it decodes from a query string.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordFilter {
    /// Only records for this device.
    #[serde(default)]
    pub device_id: Option<DeviceId>,
    /// Only records in this market.
    #[serde(default)]
    pub country_id: Option<CountryId>,
    /// Only records in this status.
    #[serde(default)]
    pub status: Option<ComplianceStatus>,
    /// Items to skip.
    #[serde(default)]
    pub skip: usize,
    /// Page size.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self {
            device_id: None,
            country_id: None,
            status: None,
            skip: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl RecordFilter {
    /// The pagination part of the filter.
    pub fn page(&self) -> Page {
        Page {
            skip: self.skip,
            limit: self.limit,
        }
    }

    fn matches(&self, record: &ComplianceRecord) -> bool {
        self.device_id.map_or(true, |d| record.device_id == d)
            && self.country_id.map_or(true, |c| record.country_id == c)
            && self.status.map_or(true, |s| record.status == s)
    }
}

/// A record with display names and task progress.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RecordView {
    /// The record.
    #[serde(flatten)]
    pub record: ComplianceRecord,
    /// Device model name.
    pub device_name: Option<String>,
    /// Country name.
    pub country_name: Option<String>,
    /// Certification name.
    pub certification_name: Option<String>,
    /// Task tallies.
    pub task_counts: TaskCounts,
    /// Share of DONE tasks, rounded down.
    pub task_progress_percent: u8,
}

impl Registry {
    /// Create a record for a tenant.
    ///
    /// The device must belong to the tenant and the country and
    /// certification must exist. A second record for the same key is a
    /// `Conflict`.
    pub fn create_record(
        &mut self,
        tenant_id: TenantId,
        input: NewRecord,
        now: DateTime<Utc>,
    ) -> Result<ComplianceRecord, TamsysError> {
        self.device(tenant_id, input.device_id)?;
        if self.country(input.country_id).is_none() {
            return Err(TamsysError::not_found("country", input.country_id));
        }
        if self.certification(input.certification_id).is_none() {
            return Err(TamsysError::not_found(
                "certification",
                input.certification_id,
            ));
        }
        let key = RecordKey {
            tenant_id,
            device_id: input.device_id,
            country_id: input.country_id,
            certification_id: input.certification_id,
        };
        let record = ComplianceRecord::new(RecordId::new(), key, input.draft, now)?;
        self.insert_record(record.clone())?;
        Ok(record)
    }

    /// Store a fully built record, enforcing key uniqueness.
    pub(crate) fn insert_record(&mut self, record: ComplianceRecord) -> Result<(), TamsysError> {
        let key = record.key();
        if self.record_keys.contains_key(&key) {
            return Err(TamsysError::Conflict(format!(
                "compliance record for device {} / country {} / certification {} already exists",
                key.device_id, key.country_id, key.certification_id
            )));
        }
        if self.records.contains_key(&record.id) {
            return Err(TamsysError::Conflict(format!(
                "compliance record {} already exists",
                record.id
            )));
        }
        self.record_keys.insert(key, record.id);
        self.records.insert(record.id, record);
        Ok(())
    }

    /// Look up a record owned by `tenant_id`.
    pub fn record(
        &self,
        tenant_id: TenantId,
        id: RecordId,
    ) -> Result<&ComplianceRecord, TamsysError> {
        self.records
            .get(&id)
            .filter(|r| r.tenant_id == tenant_id)
            .ok_or_else(|| TamsysError::not_found("compliance record", id))
    }

    /// A record with names and task progress.
    pub fn record_view(&self, tenant_id: TenantId, id: RecordId) -> Result<RecordView, TamsysError> {
        let record = self.record(tenant_id, id)?;
        Ok(self.view_of(record))
    }

    /// A tenant's records matching `filter`, oldest first.
    pub fn records(&self, tenant_id: TenantId, filter: &RecordFilter) -> Vec<RecordView> {
        let mut records: Vec<&ComplianceRecord> = self
            .records
            .values()
            .filter(|r| r.tenant_id == tenant_id && filter.matches(r))
            .collect();
        records.sort_by_key(|r| (r.created_at, r.id));
        filter
            .page()
            .apply(records)
            .into_iter()
            .map(|r| self.view_of(r))
            .collect()
    }

    /// Records for one device in one market.
    pub fn records_for(
        &self,
        tenant_id: TenantId,
        device_id: DeviceId,
        country_id: CountryId,
    ) -> impl Iterator<Item = &ComplianceRecord> {
        self.records.values().filter(move |r| {
            r.tenant_id == tenant_id && r.device_id == device_id && r.country_id == country_id
        })
    }

    /// Every record across tenants.
    pub fn all_records(&self) -> impl Iterator<Item = &ComplianceRecord> {
        self.records.values()
    }

    pub(crate) fn record_mut(&mut self, id: RecordId) -> Option<&mut ComplianceRecord> {
        self.records.get_mut(&id)
    }

    /// Apply a user update. On error the record is unchanged.
    pub fn update_record(
        &mut self,
        tenant_id: TenantId,
        id: RecordId,
        update: &RecordUpdate,
        now: DateTime<Utc>,
    ) -> Result<ComplianceRecord, TamsysError> {
        let record = self
            .records
            .get_mut(&id)
            .filter(|r| r.tenant_id == tenant_id)
            .ok_or_else(|| TamsysError::not_found("compliance record", id))?;
        record.apply_update(update, now)?;
        Ok(record.clone())
    }

    /// Put `previous` back if the stored record still equals `expected`.
    ///
    /// Used to undo an in-memory change whose write-through failed. A record
    /// that changed again since, or was deleted, is left alone.
    pub fn restore_record(
        &mut self,
        expected: &ComplianceRecord,
        previous: ComplianceRecord,
    ) -> bool {
        match self.records.get_mut(&previous.id) {
            Some(current) if current == expected && current.key() == previous.key() => {
                *current = previous;
                true
            }
            _ => false,
        }
    }

    /// Delete a record with its tasks and notes.
    ///
    /// The removed record is returned in the report so the caller can delete
    /// its documents from the object store.
    pub fn delete_record(
        &mut self,
        tenant_id: TenantId,
        id: RecordId,
    ) -> Result<CascadeReport, TamsysError> {
        self.record(tenant_id, id)?;
        Ok(self.remove_record_cascade(id))
    }

    /// Put a document descriptor in one of the record's slots, returning
    /// the descriptor it replaced.
    pub fn set_attachment(
        &mut self,
        tenant_id: TenantId,
        id: RecordId,
        kind: AttachmentKind,
        attachment: Attachment,
        now: DateTime<Utc>,
    ) -> Result<Option<Attachment>, TamsysError> {
        let record = self
            .records
            .get_mut(&id)
            .filter(|r| r.tenant_id == tenant_id)
            .ok_or_else(|| TamsysError::not_found("compliance record", id))?;
        Ok(record.set_attachment(kind, attachment, now))
    }

    pub(super) fn record_ids_where(
        &self,
        predicate: impl Fn(&ComplianceRecord) -> bool,
    ) -> Vec<RecordId> {
        self.records
            .values()
            .filter(|r| predicate(r))
            .map(|r| r.id)
            .collect()
    }

    pub(super) fn remove_record_cascade(&mut self, id: RecordId) -> CascadeReport {
        let mut report = CascadeReport::default();
        let Some(record) = self.records.remove(&id) else {
            return report;
        };
        self.record_keys.remove(&record.key());

        let task_ids: Vec<TaskId> = self
            .tasks
            .values()
            .filter(|t| t.record_id == id)
            .map(|t| t.id)
            .collect();
        for task_id in &task_ids {
            self.tasks.remove(task_id);
        }
        let before = self.notes.len();
        self.notes.retain(|_, note| !task_ids.contains(&note.task_id));
        report.notes_removed = before - self.notes.len();
        report.tasks_removed = task_ids.len();
        report.records_removed.push(record);
        report
    }

    fn view_of(&self, record: &ComplianceRecord) -> RecordView {
        let task_counts = self.task_counts(record.id);
        RecordView {
            device_name: self.devices.get(&record.device_id).map(|d| d.model_name.clone()),
            country_name: self.country(record.country_id).map(|c| c.name.clone()),
            certification_name: self
                .certification(record.certification_id)
                .map(|c| c.name.clone()),
            task_progress_percent: task_counts.progress_percent(),
            task_counts,
            record: record.clone(),
        }
    }

    // ── Tasks ──────────────────────────────────────────────────────────

    /// Task tallies for a record.
    pub fn task_counts(&self, record_id: RecordId) -> TaskCounts {
        TaskCounts::tally(
            self.tasks
                .values()
                .filter(|t| t.record_id == record_id)
                .map(|t| &t.status),
        )
    }

    /// Open compliance-testing tasks on a record.
    pub fn open_testing_tasks(&self, record_id: RecordId) -> usize {
        self.tasks
            .values()
            .filter(|t| {
                t.record_id == record_id
                    && t.category == TaskCategory::ComplianceTesting
                    && t.status.is_open()
            })
            .count()
    }

    /// Tasks of a record, oldest first.
    pub fn tasks(
        &self,
        tenant_id: TenantId,
        record_id: RecordId,
    ) -> Result<Vec<&ComplianceTask>, TamsysError> {
        self.record(tenant_id, record_id)?;
        let mut tasks: Vec<&ComplianceTask> = self
            .tasks
            .values()
            .filter(|t| t.record_id == record_id)
            .collect();
        tasks.sort_by_key(|t| (t.created_at, t.id));
        Ok(tasks)
    }

    /// Add a task to a record.
    pub fn create_task(
        &mut self,
        tenant_id: TenantId,
        record_id: RecordId,
        input: NewTask,
        now: DateTime<Utc>,
    ) -> Result<ComplianceTask, TamsysError> {
        input.validate()?;
        self.record(tenant_id, record_id)?;
        let task = ComplianceTask {
            id: TaskId::new(),
            record_id,
            title: input.title.trim().to_string(),
            description: input.description,
            category: input.category,
            status: input.status,
            assignee: input.assignee,
            updated_by: input.created_by.clone(),
            created_by: input.created_by,
            created_at: now,
            updated_at: now,
        };
        self.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    /// Look up a task whose record belongs to `tenant_id`.
    pub fn task(&self, tenant_id: TenantId, id: TaskId) -> Result<&ComplianceTask, TamsysError> {
        let task = self
            .tasks
            .get(&id)
            .ok_or_else(|| TamsysError::not_found("task", id))?;
        match self.records.get(&task.record_id) {
            Some(record) if record.tenant_id == tenant_id => Ok(task),
            _ => Err(TamsysError::not_found("task", id)),
        }
    }

    /// Partially update a task.
    pub fn update_task(
        &mut self,
        tenant_id: TenantId,
        id: TaskId,
        patch: TaskPatch,
        now: DateTime<Utc>,
    ) -> Result<ComplianceTask, TamsysError> {
        patch.validate()?;
        self.task(tenant_id, id)?;
        let task = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| TamsysError::not_found("task", id))?;
        if let Some(title) = patch.title {
            task.title = title.trim().to_string();
        }
        if let Some(description) = patch.description {
            task.description = Some(description);
        }
        if let Some(category) = patch.category {
            task.category = category;
        }
        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(assignee) = patch.assignee {
            task.assignee = Some(assignee);
        }
        if patch.updated_by.is_some() {
            task.updated_by = patch.updated_by;
        }
        task.updated_at = now;
        Ok(task.clone())
    }

    /// Add a note to a task.
    pub fn add_note(
        &mut self,
        tenant_id: TenantId,
        task_id: TaskId,
        input: NewTaskNote,
        now: DateTime<Utc>,
    ) -> Result<TaskNote, TamsysError> {
        input.validate()?;
        self.task(tenant_id, task_id)?;
        let note = TaskNote {
            id: NoteId::new(),
            task_id,
            note: input.note,
            author: input.author,
            created_at: now,
        };
        self.notes.insert(note.id, note.clone());
        Ok(note)
    }

    /// Notes on a task, newest first.
    pub fn notes(
        &self,
        tenant_id: TenantId,
        task_id: TaskId,
    ) -> Result<Vec<&TaskNote>, TamsysError> {
        self.task(tenant_id, task_id)?;
        let mut notes: Vec<&TaskNote> = self
            .notes
            .values()
            .filter(|n| n.task_id == task_id)
            .collect();
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(notes)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};

    use super::super::fixtures::*;
    use super::*;
    use tamsys_core::{TargetMarkets, TaskStatus, ValidationError};

    struct World {
        registry: Registry,
        acme: TenantId,
        globex: TenantId,
        watch: DeviceId,
        ind: CountryId,
        wpc: CertificationId,
    }

    fn world() -> World {
        let mut registry = Registry::new();
        let wifi = technology(&mut registry, "Wi-Fi 6E");
        let ind = country(&mut registry, "India", "IND");
        let wpc = certification(&mut registry, "WPC");
        let acme = tenant(&mut registry, "Acme");
        let globex = tenant(&mut registry, "Globex");
        let watch = device(&mut registry, acme, "Watch", &[wifi], TargetMarkets::All);
        World {
            registry,
            acme,
            globex,
            watch,
            ind,
            wpc,
        }
    }

    fn new_record(w: &World) -> NewRecord {
        NewRecord {
            device_id: w.watch,
            country_id: w.ind,
            certification_id: w.wpc,
            draft: RecordDraft::default(),
        }
    }

    fn task(title: &str, category: TaskCategory, status: TaskStatus) -> NewTask {
        NewTask {
            title: title.into(),
            description: None,
            category,
            status,
            assignee: None,
            created_by: Some("qa".into()),
        }
    }

    #[test]
    fn duplicate_key_is_conflict() {
        let mut w = world();
        let input = new_record(&w);
        w.registry.create_record(w.acme, input.clone(), now()).unwrap();
        let err = w.registry.create_record(w.acme, input, now()).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn record_for_foreign_device_is_not_found() {
        let mut w = world();
        let input = new_record(&w);
        assert!(matches!(
            w.registry.create_record(w.globex, input, now()),
            Err(TamsysError::NotFound { kind: "device", .. })
        ));
    }

    #[test]
    fn create_active_requires_expiry() {
        let mut w = world();
        let mut input = new_record(&w);
        input.draft.status = ComplianceStatus::Active;
        assert_eq!(
            w.registry.create_record(w.acme, input, now()).unwrap_err(),
            TamsysError::Validation(ValidationError::ActiveRequiresExpiry)
        );
    }

    #[test]
    fn failed_update_leaves_stored_record_unchanged() {
        let mut w = world();
        let input = new_record(&w);
        let record = w.registry.create_record(w.acme, input, now()).unwrap();
        let update = RecordUpdate {
            status: Some(ComplianceStatus::Active),
            certificate_number: Some("WPC-1".into()),
            ..Default::default()
        };
        assert!(w
            .registry
            .update_record(w.acme, record.id, &update, now())
            .is_err());
        assert_eq!(w.registry.record(w.acme, record.id).unwrap(), &record);

        let update = RecordUpdate {
            status: Some(ComplianceStatus::Active),
            expiry_date: NaiveDate::from_ymd_opt(2026, 6, 1),
            ..Default::default()
        };
        let updated = w
            .registry
            .update_record(w.acme, record.id, &update, now())
            .unwrap();
        assert_eq!(updated.status, ComplianceStatus::Active);
    }

    #[test]
    fn restore_undoes_update_unless_changed_again() {
        let mut w = world();
        let input = new_record(&w);
        let original = w.registry.create_record(w.acme, input, now()).unwrap();
        let activate = RecordUpdate {
            status: Some(ComplianceStatus::Active),
            expiry_date: NaiveDate::from_ymd_opt(2026, 6, 1),
            ..Default::default()
        };
        let updated = w
            .registry
            .update_record(w.acme, original.id, &activate, now())
            .unwrap();

        assert!(w.registry.restore_record(&updated, original.clone()));
        assert_eq!(w.registry.record(w.acme, original.id).unwrap(), &original);

        let updated = w
            .registry
            .update_record(w.acme, original.id, &activate, now())
            .unwrap();
        let later = RecordUpdate {
            certificate_number: Some("WPC-2".into()),
            ..Default::default()
        };
        w.registry
            .update_record(w.acme, original.id, &later, now() + Duration::minutes(1))
            .unwrap();
        assert!(!w.registry.restore_record(&updated, original.clone()));
        assert_eq!(
            w.registry
                .record(w.acme, original.id)
                .unwrap()
                .certificate_number
                .as_deref(),
            Some("WPC-2")
        );
    }

    #[test]
    fn other_tenant_cannot_touch_record() {
        let mut w = world();
        let input = new_record(&w);
        let record = w.registry.create_record(w.acme, input, now()).unwrap();
        assert!(w.registry.record(w.globex, record.id).is_err());
        assert!(w
            .registry
            .update_record(w.globex, record.id, &RecordUpdate::default(), now())
            .is_err());
        assert!(w.registry.delete_record(w.globex, record.id).is_err());
    }

    #[test]
    fn delete_frees_key_and_cascades_tasks() {
        let mut w = world();
        let input = new_record(&w);
        let record = w.registry.create_record(w.acme, input.clone(), now()).unwrap();
        let t = w
            .registry
            .create_task(
                w.acme,
                record.id,
                task("Book lab", TaskCategory::ComplianceTesting, TaskStatus::Todo),
                now(),
            )
            .unwrap();
        w.registry
            .add_note(
                w.acme,
                t.id,
                NewTaskNote {
                    note: "Lab slot on Tuesday".into(),
                    author: None,
                },
                now(),
            )
            .unwrap();

        let report = w.registry.delete_record(w.acme, record.id).unwrap();
        assert_eq!(report.records_removed.len(), 1);
        assert_eq!(report.tasks_removed, 1);
        assert_eq!(report.notes_removed, 1);
        assert!(w.registry.task(w.acme, t.id).is_err());
        assert!(w.registry.create_record(w.acme, input, now()).is_ok());
    }

    #[test]
    fn view_carries_names_and_progress() {
        let mut w = world();
        let input = new_record(&w);
        let record = w.registry.create_record(w.acme, input, now()).unwrap();
        for status in [TaskStatus::Done, TaskStatus::Todo, TaskStatus::InProgress] {
            w.registry
                .create_task(w.acme, record.id, task("Step", TaskCategory::Other, status), now())
                .unwrap();
        }
        let view = w.registry.record_view(w.acme, record.id).unwrap();
        assert_eq!(view.device_name.as_deref(), Some("Watch"));
        assert_eq!(view.country_name.as_deref(), Some("India"));
        assert_eq!(view.certification_name.as_deref(), Some("WPC"));
        assert_eq!(view.task_counts.total, 3);
        assert_eq!(view.task_progress_percent, 33);
    }

    #[test]
    fn open_testing_tasks_counts_category_and_status() {
        let mut w = world();
        let input = new_record(&w);
        let record = w.registry.create_record(w.acme, input, now()).unwrap();
        for (category, status) in [
            (TaskCategory::ComplianceTesting, TaskStatus::Todo),
            (TaskCategory::ComplianceTesting, TaskStatus::InProgress),
            (TaskCategory::ComplianceTesting, TaskStatus::Done),
            (TaskCategory::Documentation, TaskStatus::Todo),
        ] {
            w.registry
                .create_task(w.acme, record.id, task("Step", category, status), now())
                .unwrap();
        }
        assert_eq!(w.registry.open_testing_tasks(record.id), 2);
    }

    #[test]
    fn list_filters_by_status() {
        let mut w = world();
        let input = new_record(&w);
        let record = w.registry.create_record(w.acme, input, now()).unwrap();
        let pending = RecordFilter {
            status: Some(ComplianceStatus::Pending),
            ..Default::default()
        };
        let active = RecordFilter {
            status: Some(ComplianceStatus::Active),
            ..Default::default()
        };
        assert_eq!(w.registry.records(w.acme, &pending)[0].record.id, record.id);
        assert!(w.registry.records(w.acme, &active).is_empty());
        assert!(w.registry.records(w.globex, &pending).is_empty());
    }

    #[test]
    fn notes_are_newest_first() {
        let mut w = world();
        let input = new_record(&w);
        let record = w.registry.create_record(w.acme, input, now()).unwrap();
        let t = w
            .registry
            .create_task(w.acme, record.id, task("Label", TaskCategory::Labeling, TaskStatus::Todo), now())
            .unwrap();
        for (i, body) in ["first", "second"].into_iter().enumerate() {
            w.registry
                .add_note(
                    w.acme,
                    t.id,
                    NewTaskNote {
                        note: body.into(),
                        author: None,
                    },
                    now() + Duration::minutes(i as i64),
                )
                .unwrap();
        }
        let notes = w.registry.notes(w.acme, t.id).unwrap();
        assert_eq!(notes[0].note, "second");
        assert!(w.registry.notes(w.globex, t.id).is_err());
    }

    #[test]
    fn update_task_stamps_editor() {
        let mut w = world();
        let input = new_record(&w);
        let record = w.registry.create_record(w.acme, input, now()).unwrap();
        let t = w
            .registry
            .create_task(w.acme, record.id, task("Label", TaskCategory::Labeling, TaskStatus::Todo), now())
            .unwrap();
        let later = now() + Duration::hours(1);
        let updated = w
            .registry
            .update_task(
                w.acme,
                t.id,
                TaskPatch {
                    status: Some(TaskStatus::Done),
                    updated_by: Some("lead".into()),
                    ..Default::default()
                },
                later,
            )
            .unwrap();
        assert_eq!(updated.status, TaskStatus::Done);
        assert_eq!(updated.updated_by.as_deref(), Some("lead"));
        assert_eq!(updated.updated_at, later);
        assert_eq!(updated.created_by.as_deref(), Some("qa"));
    }
}
