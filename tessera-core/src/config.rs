//! Configuration types

use crate::{ConfigError, TesseraError, TesseraResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Maximum sub-profile nesting followed during resolution.
    pub max_profile_depth: usize,
    /// How many times a write is re-run after a commit-time code conflict.
    pub conflict_retry_limit: u32,
    /// Staleness accepted for cached definitions. `None` revalidates every
    /// cached definition against the change journal.
    pub definition_max_staleness: Option<Duration>,
    /// Hard lifetime of a cached definition.
    pub cache_entry_ttl: Duration,
    /// Capacity of the definition cache, per tenant.
    pub cache_max_entries_per_tenant: usize,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            max_profile_depth: 16,
            conflict_retry_limit: 3,
            definition_max_staleness: None,
            cache_entry_ttl: Duration::from_secs(3600),
            cache_max_entries_per_tenant: 10_000,
        }
    }
}

impl ProfileConfig {
    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `TESSERA_PROFILE_MAX_DEPTH`: Maximum sub-profile nesting (default: 16)
    /// - `TESSERA_PROFILE_CONFLICT_RETRIES`: Write re-runs on conflict (default: 3)
    /// - `TESSERA_DEFINITION_MAX_STALENESS_SECS`: Accepted definition staleness
    ///   (default: unset, consistent reads)
    /// - `TESSERA_CACHE_ENTRY_TTL_SECS`: Cached definition lifetime (default: 3600)
    /// - `TESSERA_CACHE_MAX_ENTRIES`: Cached definitions per tenant (default: 10000)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            max_profile_depth: env_parse("TESSERA_PROFILE_MAX_DEPTH")
                .unwrap_or(defaults.max_profile_depth),
            conflict_retry_limit: env_parse("TESSERA_PROFILE_CONFLICT_RETRIES")
                .unwrap_or(defaults.conflict_retry_limit),
            definition_max_staleness: env_parse::<u64>("TESSERA_DEFINITION_MAX_STALENESS_SECS")
                .map(Duration::from_secs)
                .or(defaults.definition_max_staleness),
            cache_entry_ttl: env_parse::<u64>("TESSERA_CACHE_ENTRY_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_entry_ttl),
            cache_max_entries_per_tenant: env_parse("TESSERA_CACHE_MAX_ENTRIES")
                .unwrap_or(defaults.cache_max_entries_per_tenant),
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_profile_depth = depth;
        self
    }

    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retry_limit = retries;
        self
    }

    pub fn with_max_staleness(mut self, staleness: Duration) -> Self {
        self.definition_max_staleness = Some(staleness);
        self
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - max_profile_depth > 0
    /// - cache_entry_ttl is positive
    /// - cache_max_entries_per_tenant > 0
    pub fn validate(&self) -> TesseraResult<()> {
        if self.max_profile_depth == 0 {
            return Err(invalid(
                "max_profile_depth",
                self.max_profile_depth.to_string(),
                "max_profile_depth must be greater than 0",
            ));
        }

        if self.cache_entry_ttl.is_zero() {
            return Err(invalid(
                "cache_entry_ttl",
                format!("{:?}", self.cache_entry_ttl),
                "cache_entry_ttl must be positive",
            ));
        }

        if self.cache_max_entries_per_tenant == 0 {
            return Err(invalid(
                "cache_max_entries_per_tenant",
                self.cache_max_entries_per_tenant.to_string(),
                "cache_max_entries_per_tenant must be greater than 0",
            ));
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn invalid(field: &str, value: String, reason: &str) -> TesseraError {
    TesseraError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value,
        reason: reason.to_string(),
    })
}
