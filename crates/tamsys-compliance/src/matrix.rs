//! # Regulatory Rule Matrix
//!
//! The rule base is a flat set of explicit (technology, country,
//! certification) rows. There is no inheritance at query time; group rules
//! such as "every EU member state" are expanded into rows when a dataset is
//! loaded (see [`crate::seed`]).

use std::collections::BTreeSet;

use tamsys_core::{CountryId, RegulatoryRule, TechnologyId};

use crate::registry::Registry;

impl Registry {
    /// Mandatory rules for any of `technology_ids` in `country_id`, in rule
    /// id order. Non-mandatory rows are stored but never returned.
    pub fn rules_for(
        &self,
        technology_ids: &BTreeSet<TechnologyId>,
        country_id: CountryId,
    ) -> Vec<&RegulatoryRule> {
        if technology_ids.is_empty() {
            return Vec::new();
        }
        self.rules()
            .filter(|rule| {
                rule.is_mandatory
                    && rule.country_id == country_id
                    && technology_ids.contains(&rule.technology_id)
            })
            .collect()
    }
}
