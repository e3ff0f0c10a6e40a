//! Tessera Storage - Storage Traits, In-Memory Store and Cache
//!
//! Defines the storage abstraction the profile engine runs against: schema
//! lookup, attribute extend catalog, extend value rows and explicit
//! transactions. [`MemoryStore`] is the in-process implementation used by
//! tests and embedders; durable engines implement the same traits.

pub mod cache;
pub mod memory;

pub use cache::{
    CacheBackend, CacheConfig, CacheRead, CacheStats, CacheableEntity, CachedEntry,
    ChangeJournal, Freshness, InMemoryCacheBackend, InMemoryChangeJournal, ReadThroughCache,
    StorageFetcher, TenantScopedKey, Watermark,
};
pub use memory::{MemoryStore, MemoryTransaction, StoreStatistics};

use std::collections::BTreeSet;
use std::sync::Arc;

use tessera_core::{
    AttributeExtend, AttributeId, EntityId, EntityKind, ExtendVal, ProfileDefinition, ProfileId,
    TenantId, TesseraResult,
};

// ============================================================================
// STORE TRAITS
// ============================================================================

/// Durable source of profile definitions.
pub trait ProfileSchemaStore: Send + Sync {
    /// Get a definition by id within a tenant.
    fn profile_definition_get(
        &self,
        tenant_id: TenantId,
        profile_id: ProfileId,
    ) -> TesseraResult<Option<ProfileDefinition>>;

    /// The journal this store reports definition changes to, if any.
    /// Definition caches over the store revalidate against it.
    fn change_journal(&self) -> Option<Arc<dyn ChangeJournal>>;
}

/// Attribute extend catalog. Codes are unique per tenant.
pub trait AttributeExtendStore {
    /// Get an extend by code.
    fn attribute_extend_get_by_code(
        &self,
        tenant_id: TenantId,
        code: &str,
    ) -> TesseraResult<Option<AttributeExtend>>;

    /// Get every extend whose code is in `codes`. Unknown codes are skipped.
    fn attribute_extends_get_by_codes(
        &self,
        tenant_id: TenantId,
        codes: &BTreeSet<String>,
    ) -> TesseraResult<Vec<AttributeExtend>>;

    /// Insert a new extend.
    ///
    /// Fails with `StorageError::UniqueViolation` when the tenant already has
    /// an extend with the same code.
    fn attribute_extend_insert(&self, extend: &AttributeExtend) -> TesseraResult<()>;
}

/// Extend value rows, one per (entity kind, entity, attribute).
pub trait ExtendValStore {
    /// Bulk query of the rows of one entity restricted to `attribute_ids`.
    fn extend_val_query(
        &self,
        entity_kind: EntityKind,
        entity_id: EntityId,
        attribute_ids: &BTreeSet<AttributeId>,
    ) -> TesseraResult<Vec<ExtendVal>>;

    /// Insert the row or overwrite its value. `None` clears the value.
    fn extend_val_upsert(
        &self,
        entity_kind: EntityKind,
        entity_id: EntityId,
        attribute_id: AttributeId,
        value: Option<String>,
    ) -> TesseraResult<ExtendVal>;
}

/// A unit of work. Writes are private until `commit`; dropping the
/// transaction without committing rolls it back.
pub trait StoreTransaction: AttributeExtendStore + ExtendValStore {
    /// Apply every staged write atomically.
    fn commit(self) -> TesseraResult<()>
    where
        Self: Sized;

    /// Discard every staged write.
    fn rollback(self)
    where
        Self: Sized;
}

/// A store that can open transactions.
pub trait TransactionalStore:
    ProfileSchemaStore + AttributeExtendStore + ExtendValStore + Send + Sync
{
    type Transaction<'a>: StoreTransaction
    where
        Self: 'a;

    /// Begin a new transaction.
    fn begin(&self) -> TesseraResult<Self::Transaction<'_>>;
}
