//! In-process cache backend with tenant-ordered keys.
//!
//! Entries live in a `BTreeMap` keyed by the encoded [`TenantScopedKey`], so
//! tenant-wide and type-wide invalidation are range scans over a key prefix,
//! the same layout an LMDB or RocksDB backend would use.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tessera_core::{RecordType, StorageError, TenantId, TesseraResult};
use uuid::Uuid;

use super::tenant_key::{TenantScopedKey, KEY_LEN};
use super::traits::{CacheBackend, CacheStats, CacheableEntity, CachedEntry};
use super::watermark::Watermark;

#[derive(Debug, Clone)]
struct StoredEntry {
    bytes: Vec<u8>,
    cached_at: DateTime<Utc>,
    watermark: Option<Watermark>,
}

/// In-memory cache backend bounded per tenant.
///
/// When a tenant exceeds `max_entries_per_tenant`, its oldest entry is
/// evicted.
#[derive(Debug)]
pub struct InMemoryCacheBackend {
    entries: RwLock<BTreeMap<[u8; KEY_LEN], StoredEntry>>,
    max_entries_per_tenant: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl Default for InMemoryCacheBackend {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl InMemoryCacheBackend {
    pub fn new(max_entries_per_tenant: usize) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            max_entries_per_tenant: max_entries_per_tenant.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Number of entries cached for one tenant.
    pub fn tenant_entry_count(&self, tenant_id: TenantId) -> TesseraResult<usize> {
        let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries
            .range(prefix_range(&TenantScopedKey::tenant_prefix(tenant_id)))
            .count())
    }

    fn remove_prefix(&self, prefix: &[u8]) -> TesseraResult<u64> {
        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        let keys: Vec<[u8; KEY_LEN]> = entries.range(prefix_range(prefix)).map(|(k, _)| *k).collect();
        for key in &keys {
            entries.remove(key);
        }
        Ok(keys.len() as u64)
    }
}

/// Inclusive key range covering every key that starts with `prefix`.
fn prefix_range(prefix: &[u8]) -> RangeInclusive<[u8; KEY_LEN]> {
    let mut lo = [0x00u8; KEY_LEN];
    let mut hi = [0xFFu8; KEY_LEN];
    lo[..prefix.len()].copy_from_slice(prefix);
    hi[..prefix.len()].copy_from_slice(prefix);
    lo..=hi
}

impl CacheBackend for InMemoryCacheBackend {
    fn get<T: CacheableEntity>(
        &self,
        record_id: Uuid,
        tenant_id: TenantId,
    ) -> TesseraResult<Option<CachedEntry<T>>> {
        let key = TenantScopedKey::new(tenant_id, T::record_type(), record_id).encode();
        let stored = {
            let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
            entries.get(&key).cloned()
        };

        match stored {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                let value: T = serde_json::from_slice(&entry.bytes).map_err(|e| {
                    StorageError::Serialization {
                        reason: e.to_string(),
                    }
                })?;
                Ok(Some(CachedEntry {
                    value,
                    cached_at: entry.cached_at,
                    watermark: entry.watermark,
                }))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    fn put<T: CacheableEntity>(
        &self,
        entity: &T,
        cached_at: DateTime<Utc>,
        watermark: Option<Watermark>,
    ) -> TesseraResult<()> {
        let tenant_id = entity.tenant_id();
        let key = TenantScopedKey::new(tenant_id, T::record_type(), entity.record_id()).encode();
        let bytes = serde_json::to_vec(entity).map_err(|e| StorageError::Serialization {
            reason: e.to_string(),
        })?;

        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        let is_new = entries
            .insert(
                key,
                StoredEntry {
                    bytes,
                    cached_at,
                    watermark,
                },
            )
            .is_none();

        if is_new {
            let range = prefix_range(&TenantScopedKey::tenant_prefix(tenant_id));
            let tenant_len = entries.range(range.clone()).count();
            if tenant_len > self.max_entries_per_tenant {
                let oldest = entries
                    .range(range)
                    .filter(|(k, _)| **k != key)
                    .min_by_key(|(_, e)| e.cached_at)
                    .map(|(k, _)| *k);
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(tenant_id = %tenant_id, "evicted oldest cache entry");
                }
            }
        }

        Ok(())
    }

    fn delete_by_key(
        &self,
        record_type: RecordType,
        record_id: Uuid,
        tenant_id: TenantId,
    ) -> TesseraResult<()> {
        let key = TenantScopedKey::new(tenant_id, record_type, record_id).encode();
        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        entries.remove(&key);
        Ok(())
    }

    fn invalidate_tenant(&self, tenant_id: TenantId) -> TesseraResult<u64> {
        self.remove_prefix(&TenantScopedKey::tenant_prefix(tenant_id))
    }

    fn invalidate_record_type(
        &self,
        tenant_id: TenantId,
        record_type: RecordType,
    ) -> TesseraResult<u64> {
        self.remove_prefix(&TenantScopedKey::tenant_type_prefix(tenant_id, record_type))
    }

    fn stats(&self) -> TesseraResult<CacheStats> {
        let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: entries.len() as u64,
            memory_bytes: entries.values().map(|e| e.bytes.len() as u64).sum(),
            evictions: self.evictions.load(Ordering::Relaxed),
        })
    }
}
