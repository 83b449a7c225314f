//! Tenants and their notification rules.

use chrono::{DateTime, Utc};

use tamsys_core::tenant::check_threshold;
use tamsys_core::{
    NewNotificationRule, NewTenant, NotificationRule, NotificationRuleId, NotificationRulePatch,
    TamsysError, Tenant, TenantId, TenantPatch,
};

use super::{CascadeReport, Registry};

impl Registry {
    /// Register a tenant.
    pub fn create_tenant(
        &mut self,
        input: NewTenant,
        now: DateTime<Utc>,
    ) -> Result<Tenant, TamsysError> {
        input.validate()?;
        let tenant = Tenant {
            id: TenantId::new(),
            name: input.name.trim().to_string(),
            contact_email: input.contact_email,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.tenants.insert(tenant.id, tenant.clone());
        Ok(tenant)
    }

    /// Look up a tenant.
    pub fn tenant(&self, id: TenantId) -> Result<&Tenant, TamsysError> {
        self.tenants
            .get(&id)
            .ok_or_else(|| TamsysError::not_found("tenant", id))
    }

    /// The oldest tenant with this name.
    pub fn tenant_by_name(&self, name: &str) -> Option<&Tenant> {
        let name = name.trim();
        self.tenants
            .values()
            .filter(|t| t.name == name)
            .min_by_key(|t| (t.created_at, t.id))
    }

    /// All tenants, oldest first.
    pub fn tenants(&self) -> Vec<&Tenant> {
        let mut tenants: Vec<&Tenant> = self.tenants.values().collect();
        tenants.sort_by_key(|t| (t.created_at, t.id));
        tenants
    }

    /// Update a tenant.
    pub fn update_tenant(
        &mut self,
        id: TenantId,
        patch: TenantPatch,
        now: DateTime<Utc>,
    ) -> Result<Tenant, TamsysError> {
        patch.validate()?;
        let tenant = self
            .tenants
            .get_mut(&id)
            .ok_or_else(|| TamsysError::not_found("tenant", id))?;
        if let Some(name) = patch.name {
            tenant.name = name.trim().to_string();
        }
        if let Some(email) = patch.contact_email {
            tenant.contact_email = Some(email);
        }
        if let Some(active) = patch.is_active {
            tenant.is_active = active;
        }
        tenant.updated_at = now;
        Ok(tenant.clone())
    }

    /// Mark a tenant inactive. Its data is kept.
    pub fn deactivate_tenant(
        &mut self,
        id: TenantId,
        now: DateTime<Utc>,
    ) -> Result<Tenant, TamsysError> {
        self.update_tenant(
            id,
            TenantPatch {
                is_active: Some(false),
                ..Default::default()
            },
            now,
        )
    }

    /// Delete a tenant with all devices, records, tasks, notes and
    /// notification rules.
    pub fn delete_tenant(&mut self, id: TenantId) -> Result<CascadeReport, TamsysError> {
        self.tenants
            .remove(&id)
            .ok_or_else(|| TamsysError::not_found("tenant", id))?;

        let mut report = CascadeReport::default();
        let before = self.notification_rules.len();
        self.notification_rules.retain(|_, rule| rule.tenant_id != id);
        report.notification_rules_removed = before - self.notification_rules.len();

        let devices: Vec<_> = self
            .devices
            .values()
            .filter(|d| d.tenant_id == id)
            .map(|d| d.id)
            .collect();
        for device_id in devices {
            report.absorb(self.remove_device_cascade(device_id));
        }
        // Records whose device was already gone (none expected, but the key
        // index must not keep stale entries).
        for record_id in self.record_ids_where(|r| r.tenant_id == id) {
            report.absorb(self.remove_record_cascade(record_id));
        }
        tracing::info!(
            tenant_id = %id,
            devices_removed = report.devices_removed,
            records_removed = report.records_removed.len(),
            "tenant deleted"
        );
        Ok(report)
    }

    // ── Notification rules ─────────────────────────────────────────────

    /// Add an expiry threshold for a tenant.
    pub fn create_notification_rule(
        &mut self,
        tenant_id: TenantId,
        input: NewNotificationRule,
        now: DateTime<Utc>,
    ) -> Result<NotificationRule, TamsysError> {
        self.tenant(tenant_id)?;
        let days_before_expiry = check_threshold(input.days_before_expiry)?;
        let rule = NotificationRule {
            id: NotificationRuleId::new(),
            tenant_id,
            days_before_expiry,
            severity_level: input.severity_level,
            is_active: input.is_active,
            created_at: now,
        };
        self.notification_rules.insert(rule.id, rule.clone());
        Ok(rule)
    }

    /// A tenant's rules, ordered by threshold.
    pub fn notification_rules(&self, tenant_id: TenantId) -> Vec<&NotificationRule> {
        let mut rules: Vec<&NotificationRule> = self
            .notification_rules
            .values()
            .filter(|r| r.tenant_id == tenant_id)
            .collect();
        rules.sort_by_key(|r| (r.days_before_expiry, r.created_at, r.id));
        rules
    }

    /// Active rules across all tenants, ordered by tenant then threshold.
    pub fn active_notification_rules(&self) -> Vec<&NotificationRule> {
        let mut rules: Vec<&NotificationRule> = self
            .notification_rules
            .values()
            .filter(|r| r.is_active)
            .collect();
        rules.sort_by_key(|r| (r.tenant_id, r.days_before_expiry, r.created_at, r.id));
        rules
    }

    /// Look up a rule within a tenant.
    pub fn notification_rule(
        &self,
        tenant_id: TenantId,
        id: NotificationRuleId,
    ) -> Result<&NotificationRule, TamsysError> {
        self.notification_rules
            .get(&id)
            .filter(|r| r.tenant_id == tenant_id)
            .ok_or_else(|| TamsysError::not_found("notification rule", id))
    }

    /// Update a rule within a tenant.
    pub fn update_notification_rule(
        &mut self,
        tenant_id: TenantId,
        id: NotificationRuleId,
        patch: NotificationRulePatch,
    ) -> Result<NotificationRule, TamsysError> {
        let days = patch.days_before_expiry.map(check_threshold).transpose()?;
        let rule = self
            .notification_rules
            .get_mut(&id)
            .filter(|r| r.tenant_id == tenant_id)
            .ok_or_else(|| TamsysError::not_found("notification rule", id))?;
        if let Some(days) = days {
            rule.days_before_expiry = days;
        }
        if let Some(severity) = patch.severity_level {
            rule.severity_level = severity;
        }
        if let Some(active) = patch.is_active {
            rule.is_active = active;
        }
        Ok(rule.clone())
    }

    /// Delete a rule within a tenant.
    pub fn delete_notification_rule(
        &mut self,
        tenant_id: TenantId,
        id: NotificationRuleId,
    ) -> Result<NotificationRule, TamsysError> {
        self.notification_rule(tenant_id, id)?;
        self.notification_rules
            .remove(&id)
            .ok_or_else(|| TamsysError::not_found("notification rule", id))
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use tamsys_core::{Severity, TargetMarkets, ValidationError};
    use tamsys_state::RecordDraft;

    use crate::registry::NewRecord;

    #[test]
    fn threshold_out_of_range_is_rejected() {
        let mut registry = Registry::new();
        let tenant = tenant(&mut registry, "Acme");
        let err = registry
            .create_notification_rule(
                tenant,
                NewNotificationRule {
                    days_before_expiry: 0,
                    severity_level: Severity::High,
                    is_active: true,
                },
                now(),
            )
            .unwrap_err();
        assert_eq!(
            err,
            TamsysError::Validation(ValidationError::ThresholdOutOfRange(0))
        );
    }

    #[test]
    fn rules_are_scoped_to_tenant() {
        let mut registry = Registry::new();
        let acme = tenant(&mut registry, "Acme");
        let globex = tenant(&mut registry, "Globex");
        let rule = registry
            .create_notification_rule(
                acme,
                NewNotificationRule {
                    days_before_expiry: 90,
                    severity_level: Severity::Medium,
                    is_active: true,
                },
                now(),
            )
            .unwrap();
        assert!(registry.notification_rule(acme, rule.id).is_ok());
        assert!(registry.notification_rule(globex, rule.id).is_err());
        assert!(registry.delete_notification_rule(globex, rule.id).is_err());
        assert_eq!(registry.notification_rules(acme).len(), 1);
    }

    #[test]
    fn update_rule_validates_threshold() {
        let mut registry = Registry::new();
        let acme = tenant(&mut registry, "Acme");
        let rule = registry
            .create_notification_rule(
                acme,
                NewNotificationRule {
                    days_before_expiry: 30,
                    severity_level: Severity::Low,
                    is_active: true,
                },
                now(),
            )
            .unwrap();
        let err = registry
            .update_notification_rule(
                acme,
                rule.id,
                NotificationRulePatch {
                    days_before_expiry: Some(400),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, TamsysError::Validation(_)));
        let updated = registry
            .update_notification_rule(
                acme,
                rule.id,
                NotificationRulePatch {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(!updated.is_active);
        assert!(registry.active_notification_rules().is_empty());
    }

    #[test]
    fn deactivate_keeps_data() {
        let mut registry = Registry::new();
        let acme = tenant(&mut registry, "Acme");
        let tenant = registry.deactivate_tenant(acme, now()).unwrap();
        assert!(!tenant.is_active);
        assert!(registry.tenant(acme).is_ok());
    }

    #[test]
    fn deleting_tenant_cascades_everything() {
        let mut registry = Registry::new();
        let wifi = technology(&mut registry, "Wi-Fi 6E");
        let ind = country(&mut registry, "India", "IND");
        let wpc = certification(&mut registry, "WPC");
        let acme = tenant(&mut registry, "Acme");
        let globex = tenant(&mut registry, "Globex");
        let acme_device = device(&mut registry, acme, "Watch", &[wifi], TargetMarkets::All);
        let globex_device = device(&mut registry, globex, "Watch", &[wifi], TargetMarkets::All);
        for (tenant, device) in [(acme, acme_device), (globex, globex_device)] {
            registry
                .create_record(
                    tenant,
                    NewRecord {
                        device_id: device,
                        country_id: ind,
                        certification_id: wpc,
                        draft: RecordDraft::default(),
                    },
                    now(),
                )
                .unwrap();
        }
        registry
            .create_notification_rule(
                acme,
                NewNotificationRule {
                    days_before_expiry: 90,
                    severity_level: Severity::High,
                    is_active: true,
                },
                now(),
            )
            .unwrap();

        let report = registry.delete_tenant(acme).unwrap();
        assert_eq!(report.devices_removed, 1);
        assert_eq!(report.records_removed.len(), 1);
        assert_eq!(report.notification_rules_removed, 1);
        assert!(registry.tenant(acme).is_err());
        assert_eq!(registry.counts()["records"], 1);
        assert_eq!(registry.counts()["devices"], 1);
    }
}
