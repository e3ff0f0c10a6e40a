//! Tessera Core - Profile Data Types
//!
//! Identifiers, schema and value records, the error taxonomy, configuration,
//! the message bundle and the tenant context. All other crates depend on this.
//! This crate contains no storage or resolution logic.

pub mod config;
pub mod entities;
pub mod error;
pub mod identity;
pub mod message;
pub mod tenancy;
pub mod value;

pub use config::ProfileConfig;
pub use entities::{
    AttributeExtend, AttributeRef, AttributeValModel, AttributeValueType, EntityKind, ExtendVal,
    ProfileDefinition, RecordType,
};
pub use error::{
    ConfigError, ErrorKind, ProfileError, StorageError, TesseraError, TesseraResult,
    ValidationError,
};
pub use identity::{
    AttributeId, EntityId, EntityIdType, ExtendValId, ProfileId, TenantId, Timestamp,
};
pub use message::{DefaultMessages, MessageProvider};
pub use tenancy::{FixedTenant, NoTenant, TenantContext};
pub use value::{AttributeMap, ProfileValue};
