//! Read-through cache with correctness contracts.
//!
//! Reads are routed by their freshness requirement, and the change journal
//! decides whether a cached entry may still be served.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tessera_core::{ProfileConfig, RecordType, TenantId, TesseraResult};
use uuid::Uuid;

use super::freshness::{age_of, CacheRead, Freshness};
use super::traits::{CacheBackend, CacheStats, CacheableEntity, CachedEntry};
use super::watermark::{ChangeJournal, Watermark};

/// Configuration for the read-through cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Staleness accepted when the caller does not choose; `None` means
    /// consistent reads.
    pub default_max_staleness: Option<Duration>,
    /// Maximum number of entries to cache per tenant.
    pub max_entries_per_tenant: usize,
    /// TTL for cached entries (even if not stale by watermark).
    pub entry_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_max_staleness: None,
            max_entries_per_tenant: 10_000,
            entry_ttl: Duration::from_secs(3600),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache settings taken from the engine configuration.
    pub fn from_profile_config(config: &ProfileConfig) -> Self {
        Self {
            default_max_staleness: config.definition_max_staleness,
            max_entries_per_tenant: config.cache_max_entries_per_tenant,
            entry_ttl: config.cache_entry_ttl,
        }
    }

    pub fn with_max_staleness(mut self, duration: Duration) -> Self {
        self.default_max_staleness = Some(duration);
        self
    }

    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries_per_tenant = max;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = ttl;
        self
    }

    /// Freshness used for reads that don't specify one.
    pub fn default_freshness(&self) -> Freshness {
        Freshness::from_max_staleness(self.default_max_staleness)
    }
}

/// Loads records from the underlying storage on a cache miss.
pub trait StorageFetcher<T: CacheableEntity> {
    /// Fetch a record by id. `Ok(None)` means the record does not exist.
    fn fetch(&self, record_id: Uuid, tenant_id: TenantId) -> TesseraResult<Option<T>>;
}

impl<T, F> StorageFetcher<T> for F
where
    T: CacheableEntity,
    F: Fn(Uuid, TenantId) -> TesseraResult<Option<T>>,
{
    fn fetch(&self, record_id: Uuid, tenant_id: TenantId) -> TesseraResult<Option<T>> {
        self(record_id, tenant_id)
    }
}

/// Read-through cache with correctness contracts.
///
/// Callers state their freshness requirement on every read and receive
/// staleness metadata back.
///
/// # Type Parameters
///
/// - `C`: The cache backend for storing cached records
/// - `J`: The change journal for invalidation
///
/// # Example
///
/// ```ignore
/// let cache = ReadThroughCache::new(backend, journal, config);
///
/// // Best-effort read (may be stale)
/// let read = cache.get::<ProfileDefinition, _>(
///     profile_id.as_uuid(),
///     tenant_id,
///     Freshness::best_effort(Duration::from_secs(60)),
///     &fetcher,
/// )?;
///
/// // Consistent read (checks journal)
/// let read = cache.get::<ProfileDefinition, _>(
///     profile_id.as_uuid(),
///     tenant_id,
///     Freshness::Consistent,
///     &fetcher,
/// )?;
/// ```
pub struct ReadThroughCache<C, J>
where
    C: CacheBackend,
    J: ChangeJournal + ?Sized,
{
    cache: Arc<C>,
    journal: Arc<J>,
    config: CacheConfig,
}

impl<C, J> ReadThroughCache<C, J>
where
    C: CacheBackend,
    J: ChangeJournal + ?Sized,
{
    pub fn new(cache: Arc<C>, journal: Arc<J>, config: CacheConfig) -> Self {
        Self {
            cache,
            journal,
            config,
        }
    }

    pub fn with_defaults(cache: Arc<C>, journal: Arc<J>) -> Self {
        Self::new(cache, journal, CacheConfig::default())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn backend(&self) -> &C {
        &self.cache
    }

    pub fn journal(&self) -> &J {
        &self.journal
    }

    /// Get a record from the cache, falling back to storage on miss.
    ///
    /// - `BestEffort`: returns cached data if not older than max_staleness,
    ///   otherwise fetches from storage.
    /// - `Consistent`: serves cached data only when the journal shows no
    ///   change of the record type since the entry was cached.
    ///
    /// Entries older than `entry_ttl` are refetched under either mode.
    /// Returns `Ok(None)` if the record doesn't exist in storage.
    pub fn get<T, S>(
        &self,
        record_id: Uuid,
        tenant_id: TenantId,
        freshness: Freshness,
        storage: &S,
    ) -> TesseraResult<Option<CacheRead<T>>>
    where
        T: CacheableEntity,
        S: StorageFetcher<T> + ?Sized,
    {
        match freshness {
            Freshness::BestEffort { max_staleness } => {
                self.get_best_effort(record_id, tenant_id, max_staleness, storage)
            }
            Freshness::Consistent => self.get_consistent(record_id, tenant_id, storage),
        }
    }

    fn get_best_effort<T, S>(
        &self,
        record_id: Uuid,
        tenant_id: TenantId,
        max_staleness: Duration,
        storage: &S,
    ) -> TesseraResult<Option<CacheRead<T>>>
    where
        T: CacheableEntity,
        S: StorageFetcher<T> + ?Sized,
    {
        if let Some(entry) = self.cache.get::<T>(record_id, tenant_id)? {
            let limit = Freshness::best_effort(max_staleness).age_limit(self.config.entry_ttl);
            if age_of(entry.cached_at) <= limit {
                return Ok(Some(hit(entry)));
            }
        }

        let watermark = self.journal.current_watermark(tenant_id)?;
        self.fetch_and_cache(record_id, tenant_id, storage, watermark)
    }

    fn get_consistent<T, S>(
        &self,
        record_id: Uuid,
        tenant_id: TenantId,
        storage: &S,
    ) -> TesseraResult<Option<CacheRead<T>>>
    where
        T: CacheableEntity,
        S: StorageFetcher<T> + ?Sized,
    {
        // Read the watermark before storage so a concurrent write is seen as
        // newer than the fetched copy.
        let current_watermark = self.journal.current_watermark(tenant_id)?;

        if let Some(entry) = self.cache.get::<T>(record_id, tenant_id)? {
            if let Some(cache_watermark) = entry.watermark {
                let has_changes = self.journal.changes_since(
                    tenant_id,
                    &cache_watermark,
                    &[T::record_type()],
                )?;
                let limit = Freshness::Consistent.age_limit(self.config.entry_ttl);
                if !has_changes && age_of(entry.cached_at) <= limit {
                    return Ok(Some(hit(entry)));
                }
            }
        }

        self.fetch_and_cache(record_id, tenant_id, storage, current_watermark)
    }

    fn fetch_and_cache<T, S>(
        &self,
        record_id: Uuid,
        tenant_id: TenantId,
        storage: &S,
        watermark: Watermark,
    ) -> TesseraResult<Option<CacheRead<T>>>
    where
        T: CacheableEntity,
        S: StorageFetcher<T> + ?Sized,
    {
        match storage.fetch(record_id, tenant_id)? {
            Some(record) => {
                self.cache.put(&record, Utc::now(), Some(watermark))?;
                Ok(Some(CacheRead::from_storage(record, Some(watermark))))
            }
            None => {
                // A record deleted in storage must not linger in the cache.
                self.cache.delete::<T>(record_id, tenant_id)?;
                Ok(None)
            }
        }
    }

    /// Put a record into the cache at the tenant's current watermark.
    pub fn put<T: CacheableEntity>(&self, record: &T) -> TesseraResult<()> {
        let watermark = self.journal.current_watermark(record.tenant_id())?;
        self.cache.put(record, Utc::now(), Some(watermark))
    }

    /// Invalidate a single record.
    pub fn invalidate<T: CacheableEntity>(
        &self,
        record_id: Uuid,
        tenant_id: TenantId,
    ) -> TesseraResult<()> {
        self.cache.delete::<T>(record_id, tenant_id)
    }

    /// Invalidate all cached entries for a tenant.
    pub fn invalidate_tenant(&self, tenant_id: TenantId) -> TesseraResult<u64> {
        self.cache.invalidate_tenant(tenant_id)
    }

    /// Invalidate all cached entries of a specific record type for a tenant.
    pub fn invalidate_record_type(
        &self,
        tenant_id: TenantId,
        record_type: RecordType,
    ) -> TesseraResult<u64> {
        self.cache.invalidate_record_type(tenant_id, record_type)
    }

    pub fn stats(&self) -> TesseraResult<CacheStats> {
        self.cache.stats()
    }
}

impl<C, J> Clone for ReadThroughCache<C, J>
where
    C: CacheBackend,
    J: ChangeJournal + ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            journal: Arc::clone(&self.journal),
            config: self.config.clone(),
        }
    }
}

fn hit<T>(entry: CachedEntry<T>) -> CacheRead<T> {
    CacheRead::from_cache(entry.value, entry.cached_at, entry.watermark)
}
