//! Devices and their technology profiles.

use chrono::{DateTime, Utc};

use tamsys_core::{Device, DeviceId, DevicePatch, NewDevice, TamsysError, Technology, TenantId};

use super::{CascadeReport, Page, Registry};

impl Registry {
    /// Register a device under a tenant.
    ///
    /// NotFound if the tenant or any listed technology is unknown.
    pub fn create_device(
        &mut self,
        tenant_id: TenantId,
        input: NewDevice,
        now: DateTime<Utc>,
    ) -> Result<Device, TamsysError> {
        input.validate()?;
        self.tenant(tenant_id)?;
        for technology_id in &input.technology_ids {
            if self.technology(*technology_id).is_none() {
                return Err(TamsysError::not_found("technology", technology_id));
            }
        }
        let device = Device {
            id: DeviceId::new(),
            tenant_id,
            model_name: input.model_name.trim().to_string(),
            sku: input.sku,
            description: input.description,
            target_countries: input.target_countries,
            technology_ids: input.technology_ids,
            created_at: now,
            updated_at: now,
        };
        self.devices.insert(device.id, device.clone());
        Ok(device)
    }

    /// Look up a device owned by `tenant_id`.
    ///
    /// A device belonging to another tenant is reported as NotFound.
    pub fn device(&self, tenant_id: TenantId, id: DeviceId) -> Result<&Device, TamsysError> {
        self.devices
            .get(&id)
            .filter(|d| d.tenant_id == tenant_id)
            .ok_or_else(|| TamsysError::not_found("device", id))
    }

    /// A tenant's device by model name.
    pub fn device_by_model(&self, tenant_id: TenantId, model_name: &str) -> Option<&Device> {
        let model_name = model_name.trim();
        self.devices
            .values()
            .filter(|d| d.tenant_id == tenant_id && d.model_name == model_name)
            .min_by_key(|d| (d.created_at, d.id))
    }

    /// A tenant's devices, oldest first.
    pub fn devices(&self, tenant_id: TenantId, page: Page) -> Vec<&Device> {
        let mut devices: Vec<&Device> = self
            .devices
            .values()
            .filter(|d| d.tenant_id == tenant_id)
            .collect();
        devices.sort_by_key(|d| (d.created_at, d.id));
        page.apply(devices)
    }

    /// The technologies a device declares, in id order.
    pub fn device_technologies(
        &self,
        tenant_id: TenantId,
        id: DeviceId,
    ) -> Result<Vec<&Technology>, TamsysError> {
        let device = self.device(tenant_id, id)?;
        Ok(device
            .technology_ids
            .iter()
            .filter_map(|t| self.technology(*t))
            .collect())
    }

    /// Update a device. A present `technology_ids` replaces the whole set.
    pub fn update_device(
        &mut self,
        tenant_id: TenantId,
        id: DeviceId,
        patch: DevicePatch,
        now: DateTime<Utc>,
    ) -> Result<Device, TamsysError> {
        patch.validate()?;
        self.device(tenant_id, id)?;
        if let Some(technology_ids) = &patch.technology_ids {
            for technology_id in technology_ids {
                if self.technology(*technology_id).is_none() {
                    return Err(TamsysError::not_found("technology", technology_id));
                }
            }
        }
        let device = self
            .devices
            .get_mut(&id)
            .ok_or_else(|| TamsysError::not_found("device", id))?;
        if let Some(name) = patch.model_name {
            device.model_name = name.trim().to_string();
        }
        if let Some(sku) = patch.sku {
            device.sku = Some(sku);
        }
        if let Some(description) = patch.description {
            device.description = Some(description);
        }
        if let Some(markets) = patch.target_countries {
            device.target_countries = markets;
        }
        if let Some(technology_ids) = patch.technology_ids {
            device.technology_ids = technology_ids;
        }
        device.updated_at = now;
        Ok(device.clone())
    }

    /// Put `previous` back if the stored device still equals `expected`.
    pub fn restore_device(&mut self, expected: &Device, previous: Device) -> bool {
        match self.devices.get_mut(&previous.id) {
            Some(current) if current == expected => {
                *current = previous;
                true
            }
            _ => false,
        }
    }

    /// Delete a device with its records, tasks and notes.
    pub fn delete_device(
        &mut self,
        tenant_id: TenantId,
        id: DeviceId,
    ) -> Result<CascadeReport, TamsysError> {
        self.device(tenant_id, id)?;
        Ok(self.remove_device_cascade(id))
    }

    pub(super) fn remove_device_cascade(&mut self, id: DeviceId) -> CascadeReport {
        let mut report = CascadeReport::default();
        if self.devices.remove(&id).is_some() {
            report.devices_removed = 1;
        }
        for record_id in self.record_ids_where(|r| r.device_id == id) {
            report.absorb(self.remove_record_cascade(record_id));
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::super::fixtures::*;
    use super::*;
    use tamsys_core::{TargetMarkets, TechnologyId};

    #[test]
    fn unknown_technology_is_not_found() {
        let mut registry = Registry::new();
        let acme = tenant(&mut registry, "Acme");
        let err = registry
            .create_device(
                acme,
                NewDevice {
                    model_name: "Watch".into(),
                    sku: None,
                    description: None,
                    target_countries: TargetMarkets::All,
                    technology_ids: BTreeSet::from([TechnologyId::new(77)]),
                },
                now(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            TamsysError::NotFound {
                kind: "technology",
                ..
            }
        ));
    }

    #[test]
    fn device_of_other_tenant_is_not_found() {
        let mut registry = Registry::new();
        let acme = tenant(&mut registry, "Acme");
        let globex = tenant(&mut registry, "Globex");
        let watch = device(&mut registry, acme, "Watch", &[], TargetMarkets::All);
        assert!(registry.device(acme, watch).is_ok());
        assert!(matches!(
            registry.device(globex, watch),
            Err(TamsysError::NotFound { kind: "device", .. })
        ));
        assert!(registry.delete_device(globex, watch).is_err());
    }

    #[test]
    fn technology_update_replaces_set() {
        let mut registry = Registry::new();
        let wifi = technology(&mut registry, "Wi-Fi 6E");
        let bt = technology(&mut registry, "Bluetooth");
        let lte = technology(&mut registry, "LTE");
        let acme = tenant(&mut registry, "Acme");
        let watch = device(&mut registry, acme, "Watch", &[wifi, bt], TargetMarkets::All);

        let updated = registry
            .update_device(
                acme,
                watch,
                DevicePatch {
                    technology_ids: Some(BTreeSet::from([lte])),
                    ..Default::default()
                },
                now(),
            )
            .unwrap();
        assert_eq!(updated.technology_ids, BTreeSet::from([lte]));
        let names: Vec<_> = registry
            .device_technologies(acme, watch)
            .unwrap()
            .into_iter()
            .map(|t| t.name.clone())
            .collect();
        assert_eq!(names, vec!["LTE".to_string()]);
    }

    #[test]
    fn update_without_technologies_keeps_set() {
        let mut registry = Registry::new();
        let wifi = technology(&mut registry, "Wi-Fi 6E");
        let acme = tenant(&mut registry, "Acme");
        let watch = device(&mut registry, acme, "Watch", &[wifi], TargetMarkets::All);
        let updated = registry
            .update_device(
                acme,
                watch,
                DevicePatch {
                    model_name: Some("Watch 2".into()),
                    ..Default::default()
                },
                now(),
            )
            .unwrap();
        assert_eq!(updated.model_name, "Watch 2");
        assert_eq!(updated.technology_ids, BTreeSet::from([wifi]));
    }

    #[test]
    fn restore_undoes_update() {
        let mut registry = Registry::new();
        let acme = tenant(&mut registry, "Acme");
        let watch = device(&mut registry, acme, "Watch", &[], TargetMarkets::All);
        let original = registry.device(acme, watch).unwrap().clone();
        let updated = registry
            .update_device(
                acme,
                watch,
                DevicePatch {
                    description: Some("rev B".into()),
                    ..Default::default()
                },
                now(),
            )
            .unwrap();

        assert!(registry.restore_device(&updated, original.clone()));
        assert_eq!(registry.device(acme, watch).unwrap(), &original);
        assert!(!registry.restore_device(&updated, original));
    }

    #[test]
    fn listing_is_paginated_per_tenant() {
        let mut registry = Registry::new();
        let acme = tenant(&mut registry, "Acme");
        let globex = tenant(&mut registry, "Globex");
        for i in 0..5 {
            device(&mut registry, acme, &format!("Model {i}"), &[], TargetMarkets::All);
        }
        device(&mut registry, globex, "Other", &[], TargetMarkets::All);
        assert_eq!(registry.devices(acme, Page::default()).len(), 5);
        assert_eq!(registry.devices(acme, Page { skip: 3, limit: 10 }).len(), 2);
        assert_eq!(registry.devices(globex, Page::default()).len(), 1);
    }
}
