//! # Identity Newtypes
//!
//! Distinct identifier types for every entity in TAMSys.
//!
//! Catalog entries (technologies, countries, certifications, rules) are
//! global reference data keyed by integer surrogates. Tenant-owned data
//! (devices, compliance records, tasks, notes, notification rules) is keyed
//! by random UUIDs. Both serialize transparently as their inner value.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Access the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

macro_rules! serial_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wrap a raw surrogate key.
            pub fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// The raw surrogate key.
            pub fn get(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// An isolated customer organization.
    TenantId
);
uuid_id!(
    /// A tenant-owned hardware product.
    DeviceId
);
uuid_id!(
    /// A compliance record tracking one certification requirement.
    RecordId
);
uuid_id!(
    /// A checklist task attached to a compliance record.
    TaskId
);
uuid_id!(
    /// A free-text note attached to a task.
    NoteId
);
uuid_id!(
    /// A tenant's expiry notification threshold.
    NotificationRuleId
);

serial_id!(
    /// A radio or electrical technology in the global catalog.
    TechnologyId
);
serial_id!(
    /// A country (market) in the global catalog.
    CountryId
);
serial_id!(
    /// A regulatory certification in the global catalog.
    CertificationId
);
serial_id!(
    /// A row of the regulatory rule matrix.
    RuleId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_ids_are_unique() {
        assert_ne!(DeviceId::new(), DeviceId::new());
    }

    #[test]
    fn uuid_id_round_trips_through_display_and_parse() {
        let id = RecordId::new();
        let parsed: RecordId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn ids_serialize_transparently() {
        let id = CountryId::new(7);
        assert_eq!(serde_json::to_string(&id).unwrap(), "7");
        let tenant = TenantId::new();
        assert_eq!(
            serde_json::to_string(&tenant).unwrap(),
            format!("\"{}\"", tenant.as_uuid())
        );
    }

    #[test]
    fn serial_ids_order_by_value() {
        assert!(TechnologyId::new(1) < TechnologyId::new(2));
    }
}
