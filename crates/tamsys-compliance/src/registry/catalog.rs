//! Master catalog and rule matrix tables.
//!
//! Deleting a catalog entry is destructive: dependent rules go with it, a
//! technology is unlinked from every device, and countries and
//! certifications take their compliance records along.

use chrono::{DateTime, Utc};

use tamsys_core::{
    Certification, CertificationId, CertificationPatch, Country, CountryId, CountryPatch, IsoCode,
    NewCertification, NewCountry, NewRule, NewTechnology, RegulatoryRule, RuleId, RulePatch,
    TamsysError, Technology, TechnologyId, TechnologyPatch,
};

use super::{CascadeReport, Registry};

impl Registry {
    // ── Technologies ────────────────────────────────────────────────────

    /// Add a technology; Conflict if the name is taken.
    pub fn create_technology(
        &mut self,
        input: NewTechnology,
        now: DateTime<Utc>,
    ) -> Result<Technology, TamsysError> {
        input.validate()?;
        let technology = Technology {
            id: TechnologyId::new(self.technology_seq.next),
            name: input.name.trim().to_string(),
            description: input.description,
            created_at: now,
        };
        self.insert_technology(technology.clone())?;
        Ok(technology)
    }

    pub(super) fn insert_technology(&mut self, technology: Technology) -> Result<(), TamsysError> {
        if self.technology_names.contains_key(&technology.name) {
            return Err(TamsysError::Conflict(format!(
                "technology {:?} already exists",
                technology.name
            )));
        }
        if self.technologies.contains_key(&technology.id) {
            return Err(TamsysError::Conflict(format!(
                "technology id {} already exists",
                technology.id
            )));
        }
        self.technology_seq.observe(technology.id.get());
        self.technology_names
            .insert(technology.name.clone(), technology.id);
        self.technologies.insert(technology.id, technology);
        Ok(())
    }

    /// Look up a technology.
    pub fn technology(&self, id: TechnologyId) -> Option<&Technology> {
        self.technologies.get(&id)
    }

    /// Look up a technology by exact name.
    pub fn technology_by_name(&self, name: &str) -> Option<&Technology> {
        self.technology_names
            .get(name.trim())
            .and_then(|id| self.technologies.get(id))
    }

    /// All technologies in id order.
    pub fn technologies(&self) -> impl Iterator<Item = &Technology> {
        self.technologies.values()
    }

    /// Rename or re-describe a technology.
    pub fn update_technology(
        &mut self,
        id: TechnologyId,
        patch: TechnologyPatch,
    ) -> Result<Technology, TamsysError> {
        patch.validate()?;
        let current = self
            .technologies
            .get(&id)
            .ok_or_else(|| TamsysError::not_found("technology", id))?;
        let new_name = patch.name.as_deref().map(str::trim).map(str::to_string);
        if let Some(name) = &new_name {
            if *name != current.name && self.technology_names.contains_key(name) {
                return Err(TamsysError::Conflict(format!(
                    "technology {name:?} already exists"
                )));
            }
        }
        let old_name = current.name.clone();
        let Some(technology) = self.technologies.get_mut(&id) else {
            return Err(TamsysError::not_found("technology", id));
        };
        if let Some(name) = new_name {
            self.technology_names.remove(&old_name);
            self.technology_names.insert(name.clone(), id);
            technology.name = name;
        }
        if let Some(description) = patch.description {
            technology.description = Some(description);
        }
        Ok(technology.clone())
    }

    /// Delete a technology, its rules, and every device link to it.
    pub fn delete_technology(&mut self, id: TechnologyId) -> Result<CascadeReport, TamsysError> {
        let technology = self
            .technologies
            .remove(&id)
            .ok_or_else(|| TamsysError::not_found("technology", id))?;
        self.technology_names.remove(&technology.name);

        let mut report = CascadeReport {
            rules_removed: self.remove_rules_where(|rule| rule.technology_id == id),
            ..Default::default()
        };
        for device in self.devices.values_mut() {
            if device.technology_ids.remove(&id) {
                report.devices_unlinked += 1;
            }
        }
        tracing::info!(
            technology_id = %id,
            rules_removed = report.rules_removed,
            devices_unlinked = report.devices_unlinked,
            "technology deleted"
        );
        Ok(report)
    }

    // ── Countries ───────────────────────────────────────────────────────

    /// Add a country; Conflict if the ISO code is taken.
    pub fn create_country(
        &mut self,
        input: NewCountry,
        now: DateTime<Utc>,
    ) -> Result<Country, TamsysError> {
        input.validate()?;
        let country = Country {
            id: CountryId::new(self.country_seq.next),
            name: input.name.trim().to_string(),
            iso_code: IsoCode::parse(&input.iso_code)?,
            details: input
                .details
                .unwrap_or_else(|| serde_json::Value::Object(Default::default())),
            created_at: now,
        };
        self.insert_country(country.clone())?;
        Ok(country)
    }

    pub(super) fn insert_country(&mut self, country: Country) -> Result<(), TamsysError> {
        if self.country_codes.contains_key(&country.iso_code) {
            return Err(TamsysError::Conflict(format!(
                "country with ISO code {} already exists",
                country.iso_code
            )));
        }
        if self.countries.contains_key(&country.id) {
            return Err(TamsysError::Conflict(format!(
                "country id {} already exists",
                country.id
            )));
        }
        self.country_seq.observe(country.id.get());
        self.country_codes.insert(country.iso_code.clone(), country.id);
        self.countries.insert(country.id, country);
        Ok(())
    }

    /// Look up a country.
    pub fn country(&self, id: CountryId) -> Option<&Country> {
        self.countries.get(&id)
    }

    /// Look up a country by ISO code.
    pub fn country_by_iso(&self, code: &IsoCode) -> Option<&Country> {
        self.country_codes
            .get(code)
            .and_then(|id| self.countries.get(id))
    }

    /// All countries in id order.
    pub fn countries(&self) -> impl Iterator<Item = &Country> {
        self.countries.values()
    }

    /// Update a country.
    pub fn update_country(
        &mut self,
        id: CountryId,
        patch: CountryPatch,
    ) -> Result<Country, TamsysError> {
        patch.validate()?;
        let current = self
            .countries
            .get(&id)
            .ok_or_else(|| TamsysError::not_found("country", id))?;
        let new_code = patch.iso_code.as_deref().map(IsoCode::parse).transpose()?;
        if let Some(code) = &new_code {
            if *code != current.iso_code && self.country_codes.contains_key(code) {
                return Err(TamsysError::Conflict(format!(
                    "country with ISO code {code} already exists"
                )));
            }
        }
        let old_code = current.iso_code.clone();
        let Some(country) = self.countries.get_mut(&id) else {
            return Err(TamsysError::not_found("country", id));
        };
        if let Some(code) = new_code {
            self.country_codes.remove(&old_code);
            self.country_codes.insert(code.clone(), id);
            country.iso_code = code;
        }
        if let Some(name) = patch.name {
            country.name = name.trim().to_string();
        }
        if let Some(details) = patch.details {
            country.details = details;
        }
        Ok(country.clone())
    }

    /// Delete a country with its rules and compliance records.
    pub fn delete_country(&mut self, id: CountryId) -> Result<CascadeReport, TamsysError> {
        let country = self
            .countries
            .remove(&id)
            .ok_or_else(|| TamsysError::not_found("country", id))?;
        self.country_codes.remove(&country.iso_code);

        let mut report = CascadeReport {
            rules_removed: self.remove_rules_where(|rule| rule.country_id == id),
            ..Default::default()
        };
        let records = self.record_ids_where(|record| record.country_id == id);
        for record_id in records {
            report.absorb(self.remove_record_cascade(record_id));
        }
        tracing::info!(
            country_id = %id,
            iso_code = %country.iso_code,
            rules_removed = report.rules_removed,
            records_removed = report.records_removed.len(),
            "country deleted"
        );
        Ok(report)
    }

    // ── Certifications ──────────────────────────────────────────────────

    /// Add a certification; Conflict if the name is taken.
    pub fn create_certification(
        &mut self,
        input: NewCertification,
        now: DateTime<Utc>,
    ) -> Result<Certification, TamsysError> {
        input.validate()?;
        let certification = Certification {
            id: CertificationId::new(self.certification_seq.next),
            name: input.name.trim().to_string(),
            authority_name: input.authority_name,
            description: input.description,
            branding_image_url: input.branding_image_url,
            labeling_requirements: input.labeling_requirements,
            created_at: now,
        };
        self.insert_certification(certification.clone())?;
        Ok(certification)
    }

    pub(super) fn insert_certification(
        &mut self,
        certification: Certification,
    ) -> Result<(), TamsysError> {
        if self.certification_names.contains_key(&certification.name) {
            return Err(TamsysError::Conflict(format!(
                "certification {:?} already exists",
                certification.name
            )));
        }
        if self.certifications.contains_key(&certification.id) {
            return Err(TamsysError::Conflict(format!(
                "certification id {} already exists",
                certification.id
            )));
        }
        self.certification_seq.observe(certification.id.get());
        self.certification_names
            .insert(certification.name.clone(), certification.id);
        self.certifications.insert(certification.id, certification);
        Ok(())
    }

    /// Look up a certification.
    pub fn certification(&self, id: CertificationId) -> Option<&Certification> {
        self.certifications.get(&id)
    }

    /// Look up a certification by exact name.
    pub fn certification_by_name(&self, name: &str) -> Option<&Certification> {
        self.certification_names
            .get(name.trim())
            .and_then(|id| self.certifications.get(id))
    }

    /// All certifications in id order.
    pub fn certifications(&self) -> impl Iterator<Item = &Certification> {
        self.certifications.values()
    }

    /// Update a certification.
    pub fn update_certification(
        &mut self,
        id: CertificationId,
        patch: CertificationPatch,
    ) -> Result<Certification, TamsysError> {
        patch.validate()?;
        let current = self
            .certifications
            .get(&id)
            .ok_or_else(|| TamsysError::not_found("certification", id))?;
        let new_name = patch.name.as_deref().map(str::trim).map(str::to_string);
        if let Some(name) = &new_name {
            if *name != current.name && self.certification_names.contains_key(name) {
                return Err(TamsysError::Conflict(format!(
                    "certification {name:?} already exists"
                )));
            }
        }
        let old_name = current.name.clone();
        let Some(certification) = self.certifications.get_mut(&id) else {
            return Err(TamsysError::not_found("certification", id));
        };
        if let Some(name) = new_name {
            self.certification_names.remove(&old_name);
            self.certification_names.insert(name.clone(), id);
            certification.name = name;
        }
        if let Some(authority) = patch.authority_name {
            certification.authority_name = Some(authority);
        }
        if let Some(description) = patch.description {
            certification.description = Some(description);
        }
        if let Some(url) = patch.branding_image_url {
            certification.branding_image_url = Some(url);
        }
        if let Some(requirements) = patch.labeling_requirements {
            certification.labeling_requirements = Some(requirements);
        }
        Ok(certification.clone())
    }

    /// Delete a certification with its rules and compliance records.
    pub fn delete_certification(
        &mut self,
        id: CertificationId,
    ) -> Result<CascadeReport, TamsysError> {
        let certification = self
            .certifications
            .remove(&id)
            .ok_or_else(|| TamsysError::not_found("certification", id))?;
        self.certification_names.remove(&certification.name);

        let mut report = CascadeReport {
            rules_removed: self.remove_rules_where(|rule| rule.certification_id == id),
            ..Default::default()
        };
        let records = self.record_ids_where(|record| record.certification_id == id);
        for record_id in records {
            report.absorb(self.remove_record_cascade(record_id));
        }
        tracing::info!(
            certification_id = %id,
            rules_removed = report.rules_removed,
            records_removed = report.records_removed.len(),
            "certification deleted"
        );
        Ok(report)
    }

    // ── Rule matrix ─────────────────────────────────────────────────────

    /// Add a rule. NotFound for a dangling reference, Conflict for a
    /// duplicate triple.
    pub fn create_rule(
        &mut self,
        input: NewRule,
        now: DateTime<Utc>,
    ) -> Result<RegulatoryRule, TamsysError> {
        let rule = RegulatoryRule {
            id: RuleId::new(self.rule_seq.next),
            technology_id: input.technology_id,
            country_id: input.country_id,
            certification_id: input.certification_id,
            is_mandatory: input.is_mandatory,
            notes: input.notes,
            created_at: now,
        };
        self.insert_rule(rule.clone())?;
        Ok(rule)
    }

    pub(super) fn insert_rule(&mut self, rule: RegulatoryRule) -> Result<(), TamsysError> {
        if !self.technologies.contains_key(&rule.technology_id) {
            return Err(TamsysError::not_found("technology", rule.technology_id));
        }
        if !self.countries.contains_key(&rule.country_id) {
            return Err(TamsysError::not_found("country", rule.country_id));
        }
        if !self.certifications.contains_key(&rule.certification_id) {
            return Err(TamsysError::not_found(
                "certification",
                rule.certification_id,
            ));
        }
        let key = rule.key();
        if self.rule_keys.contains_key(&key) {
            return Err(TamsysError::Conflict(format!(
                "rule for technology {} / country {} / certification {} already exists",
                key.technology_id, key.country_id, key.certification_id
            )));
        }
        if self.rules.contains_key(&rule.id) {
            return Err(TamsysError::Conflict(format!(
                "rule id {} already exists",
                rule.id
            )));
        }
        self.rule_seq.observe(rule.id.get());
        self.rule_keys.insert(key, rule.id);
        self.rules.insert(rule.id, rule);
        Ok(())
    }

    /// Look up a rule.
    pub fn rule(&self, id: RuleId) -> Option<&RegulatoryRule> {
        self.rules.get(&id)
    }

    /// All rules in id order.
    pub fn rules(&self) -> impl Iterator<Item = &RegulatoryRule> {
        self.rules.values()
    }

    /// Change a rule's mandatory flag or notes.
    pub fn update_rule(
        &mut self,
        id: RuleId,
        patch: RulePatch,
    ) -> Result<RegulatoryRule, TamsysError> {
        let rule = self
            .rules
            .get_mut(&id)
            .ok_or_else(|| TamsysError::not_found("rule", id))?;
        if let Some(mandatory) = patch.is_mandatory {
            rule.is_mandatory = mandatory;
        }
        if let Some(notes) = patch.notes {
            rule.notes = Some(notes);
        }
        Ok(rule.clone())
    }

    /// Delete a rule.
    pub fn delete_rule(&mut self, id: RuleId) -> Result<RegulatoryRule, TamsysError> {
        let rule = self
            .rules
            .remove(&id)
            .ok_or_else(|| TamsysError::not_found("rule", id))?;
        self.rule_keys.remove(&rule.key());
        Ok(rule)
    }

    fn remove_rules_where(&mut self, predicate: impl Fn(&RegulatoryRule) -> bool) -> usize {
        let doomed: Vec<RuleId> = self
            .rules
            .values()
            .filter(|rule| predicate(rule))
            .map(|rule| rule.id)
            .collect();
        for id in &doomed {
            if let Some(rule) = self.rules.remove(id) {
                self.rule_keys.remove(&rule.key());
            }
        }
        doomed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use tamsys_core::TargetMarkets;
    use tamsys_state::RecordDraft;

    use crate::registry::NewRecord;

    #[test]
    fn duplicate_technology_name_conflicts() {
        let mut registry = Registry::new();
        technology(&mut registry, "Wi-Fi 6E");
        let err = registry
            .create_technology(
                NewTechnology {
                    name: " Wi-Fi 6E ".into(),
                    description: None,
                },
                now(),
            )
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn duplicate_iso_code_conflicts_case_insensitively() {
        let mut registry = Registry::new();
        country(&mut registry, "India", "IND");
        let err = registry
            .create_country(
                NewCountry {
                    name: "Bharat".into(),
                    iso_code: "ind".into(),
                    details: None,
                },
                now(),
            )
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn invalid_iso_code_is_validation_error() {
        let mut registry = Registry::new();
        let err = registry
            .create_country(
                NewCountry {
                    name: "Nowhere".into(),
                    iso_code: "XX".into(),
                    details: None,
                },
                now(),
            )
            .unwrap_err();
        assert!(matches!(err, TamsysError::Validation(_)));
    }

    #[test]
    fn duplicate_rule_triple_conflicts() {
        let mut registry = Registry::new();
        let wifi = technology(&mut registry, "Wi-Fi 6E");
        let ind = country(&mut registry, "India", "IND");
        let wpc = certification(&mut registry, "WPC");
        rule(&mut registry, wifi, ind, wpc, true);
        let err = registry
            .create_rule(
                NewRule {
                    technology_id: wifi,
                    country_id: ind,
                    certification_id: wpc,
                    is_mandatory: false,
                    notes: None,
                },
                now(),
            )
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(registry.rules().count(), 1);
    }

    #[test]
    fn rule_with_unknown_reference_is_not_found() {
        let mut registry = Registry::new();
        let wifi = technology(&mut registry, "Wi-Fi 6E");
        let wpc = certification(&mut registry, "WPC");
        let err = registry
            .create_rule(
                NewRule {
                    technology_id: wifi,
                    country_id: CountryId::new(404),
                    certification_id: wpc,
                    is_mandatory: true,
                    notes: None,
                },
                now(),
            )
            .unwrap_err();
        assert!(matches!(err, TamsysError::NotFound { kind: "country", .. }));
    }

    #[test]
    fn same_technology_may_need_several_certifications() {
        let mut registry = Registry::new();
        let lte = technology(&mut registry, "LTE");
        let ind = country(&mut registry, "India", "IND");
        let tec = certification(&mut registry, "TEC");
        let wpc = certification(&mut registry, "WPC");
        rule(&mut registry, lte, ind, tec, true);
        rule(&mut registry, lte, ind, wpc, true);
        assert_eq!(registry.rules().count(), 2);
    }

    #[test]
    fn renaming_to_existing_name_conflicts() {
        let mut registry = Registry::new();
        technology(&mut registry, "LTE");
        let nfc = technology(&mut registry, "NFC");
        let err = registry
            .update_technology(
                nfc,
                TechnologyPatch {
                    name: Some("LTE".into()),
                    description: None,
                },
            )
            .unwrap_err();
        assert!(err.is_conflict());
        let renamed = registry
            .update_technology(
                nfc,
                TechnologyPatch {
                    name: Some("NFC-A".into()),
                    description: None,
                },
            )
            .unwrap();
        assert_eq!(renamed.name, "NFC-A");
        assert!(registry.technology_by_name("NFC").is_none());
        assert!(registry.technology_by_name("NFC-A").is_some());
    }

    #[test]
    fn deleting_technology_cascades_to_rules_and_devices() {
        let mut registry = Registry::new();
        let wifi = technology(&mut registry, "Wi-Fi 6E");
        let bt = technology(&mut registry, "Bluetooth");
        let ind = country(&mut registry, "India", "IND");
        let wpc = certification(&mut registry, "WPC");
        rule(&mut registry, wifi, ind, wpc, true);
        rule(&mut registry, bt, ind, wpc, true);
        let tenant = tenant(&mut registry, "Acme");
        let device = device(&mut registry, tenant, "Watch", &[wifi, bt], TargetMarkets::All);

        let report = registry.delete_technology(wifi).unwrap();
        assert_eq!(report.rules_removed, 1);
        assert_eq!(report.devices_unlinked, 1);
        assert_eq!(registry.rules().count(), 1);
        let device = registry.device(tenant, device).unwrap();
        assert_eq!(device.technology_ids.iter().copied().collect::<Vec<_>>(), vec![bt]);

        // The freed triple can be re-created under a new technology of the same name.
        let wifi2 = technology(&mut registry, "Wi-Fi 6E");
        rule(&mut registry, wifi2, ind, wpc, true);
    }

    #[test]
    fn deleting_country_cascades_to_records() {
        let mut registry = Registry::new();
        let wifi = technology(&mut registry, "Wi-Fi 6E");
        let ind = country(&mut registry, "India", "IND");
        let wpc = certification(&mut registry, "WPC");
        rule(&mut registry, wifi, ind, wpc, true);
        let tenant = tenant(&mut registry, "Acme");
        let device = device(&mut registry, tenant, "Watch", &[wifi], TargetMarkets::All);
        let record = registry
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

        let report = registry.delete_country(ind).unwrap();
        assert_eq!(report.rules_removed, 1);
        assert_eq!(report.records_removed.len(), 1);
        assert_eq!(report.records_removed[0].id, record.id);
        assert!(registry.record(tenant, record.id).is_err());
        assert!(registry.country_by_iso(&IsoCode::parse("IND").unwrap()).is_none());
    }

    #[test]
    fn deleting_unknown_certification_is_not_found() {
        let mut registry = Registry::new();
        assert!(matches!(
            registry.delete_certification(CertificationId::new(1)),
            Err(TamsysError::NotFound { .. })
        ));
    }
}
