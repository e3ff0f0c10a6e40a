//! Identity types for Tessera records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Common behaviour of the strongly-typed identifiers.
///
/// Every id wraps a UUIDv7 so ids sort by creation time. The nil UUID is
/// reserved to mean "not provided" and is rejected by argument validation.
pub trait EntityIdType: Copy + Eq + Ord + std::hash::Hash + fmt::Display {
    /// Wrap an existing UUID.
    fn new(uuid: Uuid) -> Self;

    /// Access the underlying UUID.
    fn as_uuid(&self) -> Uuid;

    /// Generate a fresh timestamp-sortable id.
    fn now_v7() -> Self {
        Self::new(Uuid::now_v7())
    }

    /// The nil id, used as the "missing" sentinel.
    fn nil() -> Self {
        Self::new(Uuid::nil())
    }

    /// Returns true if this id is the nil sentinel.
    fn is_nil(&self) -> bool {
        self.as_uuid().is_nil()
    }
}

macro_rules! define_entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl EntityIdType for $name {
            fn new(uuid: Uuid) -> Self {
                Self(uuid)
            }

            fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

define_entity_id!(
    /// Tenant partition boundary.
    TenantId
);
define_entity_id!(
    /// Profile definition (schema) identifier.
    ProfileId
);
define_entity_id!(
    /// Attribute extend identifier.
    AttributeId
);
define_entity_id!(
    /// Owner entity (group, user) carrying profile values.
    EntityId
);
define_entity_id!(
    /// Stored extend value row identifier.
    ExtendValId
);
