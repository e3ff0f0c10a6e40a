//! Profile read and write paths.

use std::collections::BTreeMap;
use std::sync::Arc;

use tessera_core::{
    AttributeMap, AttributeValModel, EntityId, EntityIdType, EntityKind, ProfileConfig,
    ProfileId, TenantContext, TenantId, TesseraError, TesseraResult,
};
use tessera_storage::{AttributeExtendStore, ExtendValStore, StoreTransaction, TransactionalStore};
use tracing::{debug, warn};

use crate::lookup::{DefinitionLookup, ProfileDefinitionCache};
use crate::registry::{validate_value, AttributeRegistry};
use crate::resolve::ProfileResolver;
use crate::values::EntityAttributeStore;

/// Write-path input: attribute code to the model to store. A `None` model
/// clears the value.
pub type AttributeWrites = BTreeMap<String, Option<AttributeValModel>>;

/// Reads and writes entity profiles.
///
/// The tenant is taken from the context once per call and fixed for the
/// whole resolution, including every sub-profile lookup.
pub struct ProfileService<S, T>
where
    S: TransactionalStore,
    T: TenantContext,
{
    store: Arc<S>,
    definitions: ProfileDefinitionCache<S>,
    resolver: ProfileResolver,
    tenant: T,
    config: ProfileConfig,
}

impl<S, T> ProfileService<S, T>
where
    S: TransactionalStore,
    T: TenantContext,
{
    /// Build a service over `store`. Cached definitions revalidate against
    /// the store's own change journal, so the store must have one.
    pub fn new(store: Arc<S>, tenant: T, config: ProfileConfig) -> TesseraResult<Self> {
        config.validate()?;
        Ok(Self {
            definitions: ProfileDefinitionCache::new(Arc::clone(&store), &config)?,
            resolver: ProfileResolver::from_config(&config),
            store,
            tenant,
            config,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn definitions(&self) -> &ProfileDefinitionCache<S> {
        &self.definitions
    }

    pub fn config(&self) -> &ProfileConfig {
        &self.config
    }

    /// Resolve the profile `profile_id` for an entity.
    ///
    /// Fails with `DefinitionNotFound` before any value is read when the
    /// definition does not exist.
    pub fn get_profile(
        &self,
        entity_kind: EntityKind,
        entity_id: EntityId,
        profile_id: ProfileId,
    ) -> TesseraResult<AttributeMap> {
        require_id(entity_id, "entity_id")?;
        require_id(profile_id, "profile_id")?;
        let tenant_id = self.tenant.tenant_id_with_check()?;

        let lookup = self.definitions.bind(tenant_id);
        self.read_profile(
            &*self.store,
            &lookup,
            tenant_id,
            entity_kind,
            entity_id,
            profile_id,
        )
    }

    /// Write attribute values for an entity and return the resolved profile.
    ///
    /// Unknown codes get an attribute extend on first use. All writes of one
    /// call commit together or not at all. An empty `attributes` map writes
    /// nothing and behaves as [`get_profile`](Self::get_profile).
    pub fn add_or_update_profile(
        &self,
        entity_kind: EntityKind,
        entity_id: EntityId,
        profile_id: ProfileId,
        attributes: &AttributeWrites,
    ) -> TesseraResult<AttributeMap> {
        require_id(entity_id, "entity_id")?;
        require_id(profile_id, "profile_id")?;
        if attributes.is_empty() {
            return self.get_profile(entity_kind, entity_id, profile_id);
        }
        let tenant_id = self.tenant.tenant_id_with_check()?;

        let mut attempt = 0;
        loop {
            match self.write_once(tenant_id, entity_kind, entity_id, profile_id, attributes) {
                Err(e) if e.is_conflict() && attempt < self.config.conflict_retry_limit => {
                    attempt += 1;
                    warn!(
                        tenant_id = %tenant_id,
                        entity_id = %entity_id,
                        profile_id = %profile_id,
                        attempt,
                        error = %e,
                        "attribute code conflict at commit, re-running write"
                    );
                }
                result => return result,
            }
        }
    }

    fn write_once(
        &self,
        tenant_id: TenantId,
        entity_kind: EntityKind,
        entity_id: EntityId,
        profile_id: ProfileId,
        attributes: &AttributeWrites,
    ) -> TesseraResult<AttributeMap> {
        let lookup = self.definitions.bind(tenant_id);
        lookup.get(profile_id)?;

        let tx = self.store.begin()?;
        {
            let registry = AttributeRegistry::new(&tx);
            let values = EntityAttributeStore::new(&tx);
            for (code, model) in attributes {
                let extend =
                    registry.add_attribute_extend_if_non_existent(tenant_id, code, model.as_ref())?;
                let value = model.as_ref().and_then(|m| m.value.clone());
                validate_value(&extend, value.as_deref())?;
                values.add_or_update(entity_kind, entity_id, extend.attribute_id, value)?;
            }
        }

        let resolved = self.read_profile(
            &tx,
            &lookup,
            tenant_id,
            entity_kind,
            entity_id,
            profile_id,
        )?;
        tx.commit()?;

        debug!(
            tenant_id = %tenant_id,
            entity_id = %entity_id,
            profile_id = %profile_id,
            written = attributes.len(),
            "profile attributes written"
        );
        Ok(resolved)
    }

    fn read_profile<R, L>(
        &self,
        reader: &R,
        lookup: &L,
        tenant_id: TenantId,
        entity_kind: EntityKind,
        entity_id: EntityId,
        profile_id: ProfileId,
    ) -> TesseraResult<AttributeMap>
    where
        R: AttributeExtendStore + ExtendValStore + ?Sized,
        L: DefinitionLookup + ?Sized,
    {
        let root = lookup.get(profile_id)?;
        let profile_ids = self.resolver.collect_profile_ids(&root, lookup)?;
        let stored = EntityAttributeStore::new(reader).query_attribute_val(
            tenant_id,
            entity_kind,
            entity_id,
            &profile_ids,
            lookup,
        )?;

        debug!(
            tenant_id = %tenant_id,
            entity_kind = %entity_kind,
            entity_id = %entity_id,
            profile_id = %profile_id,
            profiles = profile_ids.len(),
            stored = stored.len(),
            "resolving profile"
        );
        self.resolver.resolve(&root, &stored, lookup)
    }
}

fn require_id<I: EntityIdType>(id: I, field: &str) -> TesseraResult<()> {
    if id.is_nil() {
        return Err(TesseraError::required(field));
    }
    Ok(())
}
