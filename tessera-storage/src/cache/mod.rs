//! Cache layer with correctness contracts and tenant isolation.
//!
//! Callers state how stale a read may be via [`Freshness`], and every read
//! returns a [`CacheRead<T>`] carrying its staleness metadata.
//!
//! # Tenant Isolation
//!
//! Cache keys are [`TenantScopedKey`]s, which cannot be constructed without a
//! tenant id. A lookup that forgets the tenant does not compile.
//!
//! # Example
//!
//! ```ignore
//! // Caller explicitly opts into potentially stale data
//! let read = cache.get::<ProfileDefinition, _>(
//!     id,
//!     tenant_id,
//!     Freshness::best_effort(Duration::from_secs(60)),
//!     &fetcher,
//! )?;
//!
//! // Or demands data validated against the change journal
//! let read = cache.get::<ProfileDefinition, _>(id, tenant_id, Freshness::Consistent, &fetcher)?;
//!
//! if read.staleness() > Duration::from_secs(30) {
//!     tracing::warn!("definition is getting stale");
//! }
//! ```

pub mod freshness;
pub mod memory_backend;
pub mod read_through;
pub mod tenant_key;
pub mod traits;
pub mod watermark;

pub use freshness::{CacheRead, Freshness};
pub use memory_backend::InMemoryCacheBackend;
pub use read_through::{CacheConfig, ReadThroughCache, StorageFetcher};
pub use tenant_key::TenantScopedKey;
pub use traits::{CacheBackend, CacheStats, CacheableEntity, CachedEntry};
pub use watermark::{ChangeJournal, InMemoryChangeJournal, Watermark};
