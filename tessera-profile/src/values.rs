//! Entity attribute store: bulk reads and upserts of extend values.

use std::collections::{BTreeMap, BTreeSet};

use tessera_core::{
    AttributeId, EntityId, EntityKind, ExtendVal, ProfileId, TenantId, TesseraError,
    TesseraResult,
};
use tessera_storage::{AttributeExtendStore, ExtendValStore};

use crate::lookup::DefinitionLookup;
use crate::registry::AttributeRegistry;

/// Extend values fetched for one entity, keyed by attribute id, together
/// with the code index used to find them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredValues {
    rows: BTreeMap<AttributeId, ExtendVal>,
    codes: BTreeMap<String, AttributeId>,
}

impl StoredValues {
    /// Build from a code index and the rows fetched for it. Rows whose
    /// attribute is not in the index are kept but unreachable by code.
    pub fn new(codes: BTreeMap<String, AttributeId>, rows: impl IntoIterator<Item = ExtendVal>) -> Self {
        Self {
            rows: rows.into_iter().map(|row| (row.attribute_id, row)).collect(),
            codes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn get(&self, attribute_id: AttributeId) -> Option<&ExtendVal> {
        self.rows.get(&attribute_id)
    }

    /// The stored row for an attribute code, if any.
    pub fn value_for_code(&self, code: &str) -> Option<&ExtendVal> {
        self.codes.get(code).and_then(|id| self.rows.get(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AttributeId, &ExtendVal)> {
        self.rows.iter()
    }

    /// Rows keyed by the attribute id rendered as a string.
    pub fn into_keyed_map(self) -> BTreeMap<String, ExtendVal> {
        self.rows
            .into_iter()
            .map(|(id, row)| (id.to_string(), row))
            .collect()
    }
}

/// Value access for one store or open transaction.
pub struct EntityAttributeStore<'s, S: ?Sized> {
    store: &'s S,
}

impl<'s, S> EntityAttributeStore<'s, S>
where
    S: AttributeExtendStore + ExtendValStore + ?Sized,
{
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Fetch, in one bulk query, every stored value of the entity for the
    /// attributes the given profiles define.
    ///
    /// `profile_ids` must not be empty. Profiles that define no attributes,
    /// or attributes that were never written, produce an empty result
    /// without touching the value store.
    pub fn query_attribute_val<L>(
        &self,
        tenant_id: TenantId,
        entity_kind: EntityKind,
        entity_id: EntityId,
        profile_ids: &BTreeSet<ProfileId>,
        lookup: &L,
    ) -> TesseraResult<StoredValues>
    where
        L: DefinitionLookup + ?Sized,
    {
        if profile_ids.is_empty() {
            return Err(TesseraError::required("profile_ids"));
        }

        let mut codes = BTreeSet::new();
        for profile_id in profile_ids {
            let definition = lookup.get(*profile_id)?;
            codes.extend(definition.scalar_codes().map(str::to_string));
        }

        let index = AttributeRegistry::new(self.store).attribute_index(tenant_id, &codes)?;
        if index.is_empty() {
            return Ok(StoredValues::default());
        }

        let attribute_ids: BTreeSet<AttributeId> = index.values().copied().collect();
        let rows = self
            .store
            .extend_val_query(entity_kind, entity_id, &attribute_ids)?;
        Ok(StoredValues::new(index, rows))
    }

    /// Insert or overwrite one value. `None` clears it.
    pub fn add_or_update(
        &self,
        entity_kind: EntityKind,
        entity_id: EntityId,
        attribute_id: AttributeId,
        value: Option<String>,
    ) -> TesseraResult<ExtendVal> {
        self.store
            .extend_val_upsert(entity_kind, entity_id, attribute_id, value)
    }
}
