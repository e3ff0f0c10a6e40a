//! Tessera Profile - Dynamic Attribute Resolution
//!
//! Entities (groups, users) carry attributes that are not fixed columns but
//! rows keyed by a per-tenant attribute code. A profile definition describes
//! which codes an entity of that profile carries, including nested
//! sub-profiles. This crate projects stored values back through those
//! definitions and provides the transactional write path.
//!
//! - [`ProfileDefinitionCache`]: tenant-scoped read-through definition cache
//! - [`ProfileResolver`]: recursive, cycle-checked projection
//! - [`AttributeRegistry`]: lazy, race-tolerant attribute code creation
//! - [`EntityAttributeStore`]: bulk value reads and upserts
//! - [`ProfileService`]: the read and write paths

pub mod lookup;
pub mod registry;
pub mod resolve;
pub mod service;
pub mod values;

pub use lookup::{DefinitionLookup, ProfileDefinitionCache, TenantDefinitionLookup};
pub use registry::{validate_value, AttributeRegistry};
pub use resolve::ProfileResolver;
pub use service::{AttributeWrites, ProfileService};
pub use values::{EntityAttributeStore, StoredValues};
