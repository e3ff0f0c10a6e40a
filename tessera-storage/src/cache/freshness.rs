//! Freshness contracts for definition reads.
//!
//! A caller either accepts a bounded staleness or demands an entry that the
//! change journal confirms is current. Either way the entry's hard TTL still
//! applies, and the returned [`CacheRead`] reports where the value came from.

use chrono::{DateTime, Utc};
use std::time::Duration;

use super::watermark::Watermark;

/// Freshness requirement for cache reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Freshness {
    /// Serve a cached entry no older than `max_staleness`.
    BestEffort { max_staleness: Duration },

    /// Serve a cached entry only if no record of its type changed for the
    /// tenant since it was cached.
    #[default]
    Consistent,
}

impl Freshness {
    pub fn best_effort(max_staleness: Duration) -> Self {
        Self::BestEffort { max_staleness }
    }

    /// `Consistent` when no staleness is configured.
    pub fn from_max_staleness(max_staleness: Option<Duration>) -> Self {
        max_staleness.map_or(Self::Consistent, Self::best_effort)
    }

    pub fn is_best_effort(&self) -> bool {
        matches!(self, Self::BestEffort { .. })
    }

    pub fn is_consistent(&self) -> bool {
        matches!(self, Self::Consistent)
    }

    /// Oldest entry age this requirement admits under `ttl`.
    pub fn age_limit(&self, ttl: Duration) -> Duration {
        match self {
            Self::BestEffort { max_staleness } => (*max_staleness).min(ttl),
            Self::Consistent => ttl,
        }
    }
}

/// Time elapsed since `cached_at`, zero for timestamps in the future.
pub(crate) fn age_of(cached_at: DateTime<Utc>) -> Duration {
    Utc::now()
        .signed_duration_since(cached_at)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// A value read through the cache.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    cached_at: DateTime<Utc>,
    watermark: Option<Watermark>,
    was_cache_hit: bool,
}

impl<T> CacheRead<T> {
    pub fn from_cache(value: T, cached_at: DateTime<Utc>, watermark: Option<Watermark>) -> Self {
        Self {
            value,
            cached_at,
            watermark,
            was_cache_hit: true,
        }
    }

    /// A value just fetched from storage.
    pub fn from_storage(value: T, watermark: Option<Watermark>) -> Self {
        Self {
            value,
            cached_at: Utc::now(),
            watermark,
            was_cache_hit: false,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn staleness(&self) -> Duration {
        age_of(self.cached_at)
    }

    pub fn cached_at(&self) -> DateTime<Utc> {
        self.cached_at
    }

    /// Journal watermark the value was cached at.
    pub fn watermark(&self) -> Option<&Watermark> {
        self.watermark.as_ref()
    }

    pub fn was_cache_hit(&self) -> bool {
        self.was_cache_hit
    }

    pub fn was_cache_miss(&self) -> bool {
        !self.was_cache_hit
    }
}
