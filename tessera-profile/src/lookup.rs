//! Profile definition cache and per-pass definition lookup.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use tessera_core::{
    ConfigError, EntityIdType, ProfileConfig, ProfileDefinition, ProfileError, ProfileId,
    TenantId, TesseraResult,
};
use tessera_storage::{
    CacheBackend, CacheConfig, CacheStats, ChangeJournal, Freshness, InMemoryCacheBackend,
    ProfileSchemaStore, ReadThroughCache, StorageFetcher,
};
use tracing::debug;
use uuid::Uuid;

/// Resolves a profile id to its definition.
///
/// Implementations are bound to one tenant; sub-profile lookups made during
/// a resolution pass never cross tenants.
pub trait DefinitionLookup {
    fn get(&self, profile_id: ProfileId) -> TesseraResult<Arc<ProfileDefinition>>;
}

impl<F> DefinitionLookup for F
where
    F: Fn(ProfileId) -> TesseraResult<Arc<ProfileDefinition>>,
{
    fn get(&self, profile_id: ProfileId) -> TesseraResult<Arc<ProfileDefinition>> {
        self(profile_id)
    }
}

struct SchemaFetcher<'a, S: ?Sized>(&'a S);

impl<S> StorageFetcher<ProfileDefinition> for SchemaFetcher<'_, S>
where
    S: ProfileSchemaStore + ?Sized,
{
    fn fetch(
        &self,
        record_id: Uuid,
        tenant_id: TenantId,
    ) -> TesseraResult<Option<ProfileDefinition>> {
        self.0
            .profile_definition_get(tenant_id, ProfileId::new(record_id))
    }
}

/// Tenant-scoped read-through cache of profile definitions.
///
/// Entries are keyed by `(tenant, profile id)` and revalidated against the
/// store's change journal unless a maximum staleness is configured.
pub struct ProfileDefinitionCache<S, C = InMemoryCacheBackend>
where
    S: ProfileSchemaStore + ?Sized,
    C: CacheBackend,
{
    cache: ReadThroughCache<C, dyn ChangeJournal>,
    store: Arc<S>,
}

impl<S> ProfileDefinitionCache<S, InMemoryCacheBackend>
where
    S: ProfileSchemaStore + ?Sized,
{
    /// Cache backed by an in-process backend sized from `config`.
    pub fn new(store: Arc<S>, config: &ProfileConfig) -> TesseraResult<Self> {
        let backend = Arc::new(InMemoryCacheBackend::new(
            config.cache_max_entries_per_tenant,
        ));
        Self::with_backend(store, backend, CacheConfig::from_profile_config(config))
    }
}

impl<S, C> ProfileDefinitionCache<S, C>
where
    S: ProfileSchemaStore + ?Sized,
    C: CacheBackend,
{
    /// Fails with `ConfigError::MissingRequired` when the store reports
    /// changes to no journal.
    pub fn with_backend(store: Arc<S>, backend: Arc<C>, config: CacheConfig) -> TesseraResult<Self> {
        let journal = store
            .change_journal()
            .ok_or_else(|| ConfigError::MissingRequired {
                field: "change_journal".to_string(),
            })?;
        Ok(Self {
            cache: ReadThroughCache::new(backend, journal, config),
            store,
        })
    }

    /// Get a definition using the configured freshness.
    ///
    /// Fails with `DefinitionNotFound` when the schema store has no such
    /// definition for the tenant.
    pub fn get(
        &self,
        profile_id: ProfileId,
        tenant_id: TenantId,
    ) -> TesseraResult<Arc<ProfileDefinition>> {
        self.get_with_freshness(profile_id, tenant_id, self.cache.config().default_freshness())
    }

    pub fn get_with_freshness(
        &self,
        profile_id: ProfileId,
        tenant_id: TenantId,
        freshness: Freshness,
    ) -> TesseraResult<Arc<ProfileDefinition>> {
        let read = self.cache.get::<ProfileDefinition, _>(
            profile_id.as_uuid(),
            tenant_id,
            freshness,
            &SchemaFetcher(&*self.store),
        )?;

        match read {
            Some(read) => {
                debug!(
                    tenant_id = %tenant_id,
                    profile_id = %profile_id,
                    cache_hit = read.was_cache_hit(),
                    "profile definition lookup"
                );
                Ok(Arc::new(read.into_value()))
            }
            None => Err(ProfileError::DefinitionNotFound {
                profile_id,
                tenant_id,
            }
            .into()),
        }
    }

    /// Lookup fixed to `tenant_id` that memoizes definitions for one pass.
    pub fn bind(&self, tenant_id: TenantId) -> TenantDefinitionLookup<'_, S, C> {
        TenantDefinitionLookup {
            cache: self,
            tenant_id,
            seen: RefCell::new(HashMap::new()),
        }
    }

    pub fn invalidate(&self, profile_id: ProfileId, tenant_id: TenantId) -> TesseraResult<()> {
        self.cache
            .invalidate::<ProfileDefinition>(profile_id.as_uuid(), tenant_id)
    }

    pub fn invalidate_tenant(&self, tenant_id: TenantId) -> TesseraResult<u64> {
        self.cache.invalidate_tenant(tenant_id)
    }

    pub fn stats(&self) -> TesseraResult<CacheStats> {
        self.cache.stats()
    }
}

/// A [`DefinitionLookup`] bound to one tenant for one resolution pass.
///
/// Each id is fetched at most once, so the pass sees one consistent
/// definition per id even if the schema changes concurrently.
pub struct TenantDefinitionLookup<'c, S, C = InMemoryCacheBackend>
where
    S: ProfileSchemaStore + ?Sized,
    C: CacheBackend,
{
    cache: &'c ProfileDefinitionCache<S, C>,
    tenant_id: TenantId,
    seen: RefCell<HashMap<ProfileId, Arc<ProfileDefinition>>>,
}

impl<S, C> TenantDefinitionLookup<'_, S, C>
where
    S: ProfileSchemaStore + ?Sized,
    C: CacheBackend,
{
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

impl<S, C> DefinitionLookup for TenantDefinitionLookup<'_, S, C>
where
    S: ProfileSchemaStore + ?Sized,
    C: CacheBackend,
{
    fn get(&self, profile_id: ProfileId) -> TesseraResult<Arc<ProfileDefinition>> {
        if let Some(definition) = self.seen.borrow().get(&profile_id) {
            return Ok(Arc::clone(definition));
        }
        let definition = self.cache.get(profile_id, self.tenant_id)?;
        self.seen
            .borrow_mut()
            .insert(profile_id, Arc::clone(&definition));
        Ok(definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{TesseraError, TesseraResult};
    use tessera_storage::{InMemoryChangeJournal, MemoryStore};

    fn setup(config: &ProfileConfig) -> (Arc<MemoryStore>, ProfileDefinitionCache<MemoryStore>) {
        let store = Arc::new(MemoryStore::with_journal(Arc::new(InMemoryChangeJournal::new())));
        let cache = ProfileDefinitionCache::new(Arc::clone(&store), config).unwrap();
        (store, cache)
    }

    #[test]
    fn test_store_without_journal_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        match ProfileDefinitionCache::new(store, &ProfileConfig::default()) {
            Err(TesseraError::Config(ConfigError::MissingRequired { field })) => {
                assert_eq!(field, "change_journal")
            }
            Err(other) => panic!("expected a missing journal error, got {other:?}"),
            Ok(_) => panic!("expected a missing journal error"),
        }
    }

    #[test]
    fn test_read_through_and_hit() -> TesseraResult<()> {
        let (store, cache) = setup(&ProfileConfig::default());
        let tenant = TenantId::now_v7();
        let definition = ProfileDefinition::new(tenant, "member").with_attribute("age");
        store.put_profile_definition(definition.clone())?;

        assert_eq!(*cache.get(definition.profile_id, tenant)?, definition);
        assert_eq!(*cache.get(definition.profile_id, tenant)?, definition);

        let stats = cache.stats()?;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        Ok(())
    }

    #[test]
    fn test_missing_definition_is_not_found() {
        let (_, cache) = setup(&ProfileConfig::default());
        let tenant = TenantId::now_v7();
        let profile_id = ProfileId::now_v7();

        let err = cache.get(profile_id, tenant).unwrap_err();
        assert_eq!(
            err,
            TesseraError::Profile(ProfileError::DefinitionNotFound {
                profile_id,
                tenant_id: tenant
            })
        );
    }

    #[test]
    fn test_other_tenant_cannot_see_definition() -> TesseraResult<()> {
        let (store, cache) = setup(&ProfileConfig::default());
        let tenant = TenantId::now_v7();
        let definition = ProfileDefinition::new(tenant, "member");
        store.put_profile_definition(definition.clone())?;
        cache.get(definition.profile_id, tenant)?;

        assert!(cache.get(definition.profile_id, TenantId::now_v7()).is_err());
        Ok(())
    }

    #[test]
    fn test_schema_change_is_picked_up() -> TesseraResult<()> {
        let (store, cache) = setup(&ProfileConfig::default());
        let tenant = TenantId::now_v7();
        let definition = ProfileDefinition::new(tenant, "member").with_attribute("age");
        store.put_profile_definition(definition.clone())?;
        cache.get(definition.profile_id, tenant)?;

        let updated = definition.clone().with_attribute("city");
        store.put_profile_definition(updated.clone())?;

        assert_eq!(*cache.get(definition.profile_id, tenant)?, updated);
        Ok(())
    }

    #[test]
    fn test_best_effort_tolerates_staleness() -> TesseraResult<()> {
        let config = ProfileConfig::default().with_max_staleness(std::time::Duration::from_secs(60));
        let (store, cache) = setup(&config);
        let tenant = TenantId::now_v7();
        let definition = ProfileDefinition::new(tenant, "member").with_attribute("age");
        store.put_profile_definition(definition.clone())?;
        cache.get(definition.profile_id, tenant)?;

        store.put_profile_definition(definition.clone().with_attribute("city"))?;
        assert_eq!(*cache.get(definition.profile_id, tenant)?, definition);

        cache.invalidate(definition.profile_id, tenant)?;
        assert_eq!(cache.get(definition.profile_id, tenant)?.attributes.len(), 2);
        Ok(())
    }

    #[test]
    fn test_bound_lookup_memoizes() -> TesseraResult<()> {
        let (store, cache) = setup(&ProfileConfig::default());
        let tenant = TenantId::now_v7();
        let definition = ProfileDefinition::new(tenant, "member");
        store.put_profile_definition(definition.clone())?;

        let lookup = cache.bind(tenant);
        assert_eq!(lookup.tenant_id(), tenant);
        let first = lookup.get(definition.profile_id)?;

        store.remove_profile_definition(tenant, definition.profile_id)?;
        let second = lookup.get(definition.profile_id)?;
        assert!(Arc::ptr_eq(&first, &second));

        // A fresh pass sees the removal.
        assert!(cache.bind(tenant).get(definition.profile_id).is_err());
        Ok(())
    }
}
