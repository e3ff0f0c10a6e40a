//! Cache backend traits and cacheable record marker.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tessera_core::{EntityIdType, ProfileDefinition, RecordType, TenantId, TesseraResult};
use uuid::Uuid;

use super::watermark::Watermark;

/// Marker trait for types that can be cached.
///
/// - `record_type()` must return the same value for all instances
/// - `record_id()` is the unique identifier of this instance
/// - `tenant_id()` is the tenant that owns this record
pub trait CacheableEntity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn record_type() -> RecordType;

    fn record_id(&self) -> Uuid;

    fn tenant_id(&self) -> TenantId;
}

/// A cached value together with the moment and journal position it was cached at.
#[derive(Debug, Clone)]
pub struct CachedEntry<T> {
    pub value: T,
    pub cached_at: DateTime<Utc>,
    pub watermark: Option<Watermark>,
}

/// Cache backend trait for pluggable cache implementations.
///
/// Implementations must be thread-safe. Keys are built from tenant, record
/// type and record id; values are serialized by the backend.
pub trait CacheBackend: Send + Sync {
    /// Get a value from the cache.
    fn get<T: CacheableEntity>(
        &self,
        record_id: Uuid,
        tenant_id: TenantId,
    ) -> TesseraResult<Option<CachedEntry<T>>>;

    /// Put a value into the cache, replacing any previous entry.
    fn put<T: CacheableEntity>(
        &self,
        entity: &T,
        cached_at: DateTime<Utc>,
        watermark: Option<Watermark>,
    ) -> TesseraResult<()>;

    /// Delete a value from the cache.
    fn delete<T: CacheableEntity>(&self, record_id: Uuid, tenant_id: TenantId) -> TesseraResult<()> {
        self.delete_by_key(T::record_type(), record_id, tenant_id)
    }

    /// Delete a value by key components.
    fn delete_by_key(
        &self,
        record_type: RecordType,
        record_id: Uuid,
        tenant_id: TenantId,
    ) -> TesseraResult<()>;

    /// Invalidate all cached entries for a tenant.
    fn invalidate_tenant(&self, tenant_id: TenantId) -> TesseraResult<u64>;

    /// Invalidate all cached entries of one record type for a tenant.
    fn invalidate_record_type(
        &self,
        tenant_id: TenantId,
        record_type: RecordType,
    ) -> TesseraResult<u64>;

    /// Get cache statistics.
    fn stats(&self) -> TesseraResult<CacheStats>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entry_count: u64,
    /// Approximate serialized size of all entries.
    pub memory_bytes: u64,
    /// Entries dropped to respect the per-tenant capacity.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// ============================================================================
// IMPLEMENTATIONS FOR TESSERA RECORDS
// ============================================================================

impl CacheableEntity for ProfileDefinition {
    fn record_type() -> RecordType {
        RecordType::ProfileDefinition
    }

    fn record_id(&self) -> Uuid {
        self.profile_id.as_uuid()
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}
