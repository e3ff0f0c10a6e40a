//! In-memory store with staged transactions.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tessera_core::{
    AttributeExtend, AttributeId, EntityId, EntityIdType, EntityKind, ExtendVal,
    ProfileDefinition, ProfileId, RecordType, StorageError, TenantId, TesseraResult,
};

use crate::cache::ChangeJournal;
use crate::{
    AttributeExtendStore, ExtendValStore, ProfileSchemaStore, StoreTransaction,
    TransactionalStore,
};

type ValueKey = (EntityKind, EntityId, AttributeId);

#[derive(Debug, Default)]
struct Tables {
    definitions: HashMap<(TenantId, ProfileId), ProfileDefinition>,
    extends: HashMap<AttributeId, AttributeExtend>,
    extend_codes: HashMap<(TenantId, String), AttributeId>,
    values: HashMap<ValueKey, ExtendVal>,
}

#[derive(Debug, Default)]
struct Counters {
    value_queries: AtomicU64,
    value_writes: AtomicU64,
    extend_inserts: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
}

/// Operation counters, for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStatistics {
    /// Bulk extend value queries issued.
    pub value_queries: u64,
    /// Extend value upserts issued (staged or direct).
    pub value_writes: u64,
    /// Attribute extend inserts issued (staged or direct).
    pub extend_inserts: u64,
    pub commits: u64,
    pub rollbacks: u64,
}

/// In-memory store for profile definitions, attribute extends and extend
/// values.
///
/// Direct writes through the store traits autocommit. Writes made through a
/// [`MemoryTransaction`] stay private to it until `commit`, which applies
/// them under a single write lock. Definition changes are reported to the
/// attached [`ChangeJournal`], if any.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    journal: Option<Arc<dyn ChangeJournal>>,
    counters: Counters,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that reports changes to `journal`.
    pub fn with_journal(journal: Arc<dyn ChangeJournal>) -> Self {
        Self {
            journal: Some(journal),
            ..Self::default()
        }
    }

    fn read(&self) -> TesseraResult<RwLockReadGuard<'_, Tables>> {
        Ok(self.tables.read().map_err(|_| StorageError::LockPoisoned)?)
    }

    fn write(&self) -> TesseraResult<RwLockWriteGuard<'_, Tables>> {
        Ok(self.tables.write().map_err(|_| StorageError::LockPoisoned)?)
    }

    fn record_change(
        &self,
        tenant_id: TenantId,
        record_type: RecordType,
        record_id: uuid::Uuid,
    ) -> TesseraResult<()> {
        if let Some(journal) = &self.journal {
            journal.record_change(tenant_id, record_type, record_id)?;
        }
        Ok(())
    }

    /// Insert or replace a profile definition.
    pub fn put_profile_definition(&self, definition: ProfileDefinition) -> TesseraResult<()> {
        let (tenant_id, profile_id) = (definition.tenant_id, definition.profile_id);
        self.write()?
            .definitions
            .insert((tenant_id, profile_id), definition);
        self.record_change(tenant_id, RecordType::ProfileDefinition, profile_id.as_uuid())
    }

    /// Remove a profile definition. Returns whether it existed.
    pub fn remove_profile_definition(
        &self,
        tenant_id: TenantId,
        profile_id: ProfileId,
    ) -> TesseraResult<bool> {
        let removed = self
            .write()?
            .definitions
            .remove(&(tenant_id, profile_id))
            .is_some();
        if removed {
            self.record_change(tenant_id, RecordType::ProfileDefinition, profile_id.as_uuid())?;
        }
        Ok(removed)
    }

    /// Number of attribute extends a tenant has.
    pub fn attribute_extend_count(&self, tenant_id: TenantId) -> TesseraResult<usize> {
        Ok(self
            .read()?
            .extends
            .values()
            .filter(|e| e.tenant_id == tenant_id)
            .count())
    }

    /// Number of extend value rows of one entity.
    pub fn extend_val_count(
        &self,
        entity_kind: EntityKind,
        entity_id: EntityId,
    ) -> TesseraResult<usize> {
        Ok(self
            .read()?
            .values
            .keys()
            .filter(|(kind, id, _)| *kind == entity_kind && *id == entity_id)
            .count())
    }

    pub fn statistics(&self) -> StoreStatistics {
        StoreStatistics {
            value_queries: self.counters.value_queries.load(Ordering::Relaxed),
            value_writes: self.counters.value_writes.load(Ordering::Relaxed),
            extend_inserts: self.counters.extend_inserts.load(Ordering::Relaxed),
            commits: self.counters.commits.load(Ordering::Relaxed),
            rollbacks: self.counters.rollbacks.load(Ordering::Relaxed),
        }
    }

    /// Apply staged writes atomically. Nothing is applied if any staged
    /// extend code is already taken.
    fn apply(&self, staged: Staged) -> TesseraResult<()> {
        let mut tables = self.write()?;

        for extend in &staged.extends {
            let key = (extend.tenant_id, extend.code.clone());
            if tables
                .extend_codes
                .get(&key)
                .is_some_and(|existing| *existing != extend.attribute_id)
            {
                return Err(unique_violation(&extend.code).into());
            }
        }

        for extend in staged.extends {
            tables
                .extend_codes
                .insert((extend.tenant_id, extend.code.clone()), extend.attribute_id);
            tables.extends.insert(extend.attribute_id, extend);
        }

        for (key, mut row) in staged.values {
            if let Some(existing) = tables.values.get(&key) {
                row.extend_val_id = existing.extend_val_id;
                row.created_at = existing.created_at;
            }
            tables.values.insert(key, row);
        }
        Ok(())
    }
}

fn unique_violation(code: &str) -> StorageError {
    StorageError::UniqueViolation {
        record_type: RecordType::AttributeExtend,
        key: format!("code={code}"),
    }
}

fn query_rows(
    tables: &Tables,
    entity_kind: EntityKind,
    entity_id: EntityId,
    attribute_ids: &BTreeSet<AttributeId>,
) -> BTreeMap<AttributeId, ExtendVal> {
    attribute_ids
        .iter()
        .filter_map(|attribute_id| {
            tables
                .values
                .get(&(entity_kind, entity_id, *attribute_id))
                .map(|row| (*attribute_id, row.clone()))
        })
        .collect()
}

fn upserted(existing: Option<&ExtendVal>, key: ValueKey, value: Option<String>) -> ExtendVal {
    match existing {
        Some(row) => ExtendVal {
            value,
            updated_at: Utc::now(),
            ..row.clone()
        },
        None => ExtendVal::new(key.0, key.1, key.2, value),
    }
}

impl ProfileSchemaStore for MemoryStore {
    fn profile_definition_get(
        &self,
        tenant_id: TenantId,
        profile_id: ProfileId,
    ) -> TesseraResult<Option<ProfileDefinition>> {
        Ok(self.read()?.definitions.get(&(tenant_id, profile_id)).cloned())
    }

    fn change_journal(&self) -> Option<Arc<dyn ChangeJournal>> {
        self.journal.clone()
    }
}

impl AttributeExtendStore for MemoryStore {
    fn attribute_extend_get_by_code(
        &self,
        tenant_id: TenantId,
        code: &str,
    ) -> TesseraResult<Option<AttributeExtend>> {
        let tables = self.read()?;
        Ok(tables
            .extend_codes
            .get(&(tenant_id, code.to_string()))
            .and_then(|id| tables.extends.get(id))
            .cloned())
    }

    fn attribute_extends_get_by_codes(
        &self,
        tenant_id: TenantId,
        codes: &BTreeSet<String>,
    ) -> TesseraResult<Vec<AttributeExtend>> {
        let tables = self.read()?;
        Ok(codes
            .iter()
            .filter_map(|code| tables.extend_codes.get(&(tenant_id, code.clone())))
            .filter_map(|id| tables.extends.get(id))
            .cloned()
            .collect())
    }

    fn attribute_extend_insert(&self, extend: &AttributeExtend) -> TesseraResult<()> {
        self.counters.extend_inserts.fetch_add(1, Ordering::Relaxed);
        self.apply(Staged {
            extends: vec![extend.clone()],
            values: BTreeMap::new(),
        })
    }
}

impl ExtendValStore for MemoryStore {
    fn extend_val_query(
        &self,
        entity_kind: EntityKind,
        entity_id: EntityId,
        attribute_ids: &BTreeSet<AttributeId>,
    ) -> TesseraResult<Vec<ExtendVal>> {
        self.counters.value_queries.fetch_add(1, Ordering::Relaxed);
        let tables = self.read()?;
        Ok(query_rows(&tables, entity_kind, entity_id, attribute_ids)
            .into_values()
            .collect())
    }

    fn extend_val_upsert(
        &self,
        entity_kind: EntityKind,
        entity_id: EntityId,
        attribute_id: AttributeId,
        value: Option<String>,
    ) -> TesseraResult<ExtendVal> {
        self.counters.value_writes.fetch_add(1, Ordering::Relaxed);
        let key = (entity_kind, entity_id, attribute_id);
        let mut tables = self.write()?;
        let row = upserted(tables.values.get(&key), key, value);
        tables.values.insert(key, row.clone());
        Ok(row)
    }
}

impl TransactionalStore for MemoryStore {
    type Transaction<'a> = MemoryTransaction<'a>;

    fn begin(&self) -> TesseraResult<MemoryTransaction<'_>> {
        Ok(MemoryTransaction {
            store: self,
            staged: Mutex::new(Staged::default()),
            finished: false,
        })
    }
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

#[derive(Debug, Default)]
struct Staged {
    extends: Vec<AttributeExtend>,
    values: BTreeMap<ValueKey, ExtendVal>,
}

/// A transaction over a [`MemoryStore`].
///
/// Reads see committed data overlaid with this transaction's own staged
/// writes. Dropping it without `commit` discards the staged writes.
pub struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    staged: Mutex<Staged>,
    finished: bool,
}

impl MemoryTransaction<'_> {
    fn staged(&self) -> TesseraResult<std::sync::MutexGuard<'_, Staged>> {
        Ok(self.staged.lock().map_err(|_| StorageError::LockPoisoned)?)
    }

    fn note_rollback(&self) {
        self.store.counters.rollbacks.fetch_add(1, Ordering::Relaxed);
    }
}

impl AttributeExtendStore for MemoryTransaction<'_> {
    fn attribute_extend_get_by_code(
        &self,
        tenant_id: TenantId,
        code: &str,
    ) -> TesseraResult<Option<AttributeExtend>> {
        let staged = self
            .staged()?
            .extends
            .iter()
            .find(|e| e.tenant_id == tenant_id && e.code == code)
            .cloned();
        match staged {
            Some(extend) => Ok(Some(extend)),
            None => self.store.attribute_extend_get_by_code(tenant_id, code),
        }
    }

    fn attribute_extends_get_by_codes(
        &self,
        tenant_id: TenantId,
        codes: &BTreeSet<String>,
    ) -> TesseraResult<Vec<AttributeExtend>> {
        let mut found = self.store.attribute_extends_get_by_codes(tenant_id, codes)?;
        let staged = self.staged()?;
        found.extend(
            staged
                .extends
                .iter()
                .filter(|e| e.tenant_id == tenant_id && codes.contains(&e.code))
                .cloned(),
        );
        Ok(found)
    }

    fn attribute_extend_insert(&self, extend: &AttributeExtend) -> TesseraResult<()> {
        self.store
            .counters
            .extend_inserts
            .fetch_add(1, Ordering::Relaxed);
        if self
            .store
            .attribute_extend_get_by_code(extend.tenant_id, &extend.code)?
            .is_some()
        {
            return Err(unique_violation(&extend.code).into());
        }
        let mut staged = self.staged()?;
        if staged
            .extends
            .iter()
            .any(|e| e.tenant_id == extend.tenant_id && e.code == extend.code)
        {
            return Err(unique_violation(&extend.code).into());
        }
        staged.extends.push(extend.clone());
        Ok(())
    }
}

impl ExtendValStore for MemoryTransaction<'_> {
    fn extend_val_query(
        &self,
        entity_kind: EntityKind,
        entity_id: EntityId,
        attribute_ids: &BTreeSet<AttributeId>,
    ) -> TesseraResult<Vec<ExtendVal>> {
        self.store
            .counters
            .value_queries
            .fetch_add(1, Ordering::Relaxed);
        let mut rows = query_rows(&*self.store.read()?, entity_kind, entity_id, attribute_ids);
        let staged = self.staged()?;
        for attribute_id in attribute_ids {
            if let Some(row) = staged.values.get(&(entity_kind, entity_id, *attribute_id)) {
                rows.insert(*attribute_id, row.clone());
            }
        }
        Ok(rows.into_values().collect())
    }

    fn extend_val_upsert(
        &self,
        entity_kind: EntityKind,
        entity_id: EntityId,
        attribute_id: AttributeId,
        value: Option<String>,
    ) -> TesseraResult<ExtendVal> {
        self.store
            .counters
            .value_writes
            .fetch_add(1, Ordering::Relaxed);
        let key = (entity_kind, entity_id, attribute_id);
        let base = self.store.read()?.values.get(&key).cloned();
        let mut staged = self.staged()?;
        let row = upserted(staged.values.get(&key).or(base.as_ref()), key, value);
        staged.values.insert(key, row.clone());
        Ok(row)
    }
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn commit(mut self) -> TesseraResult<()> {
        self.finished = true;
        let staged = std::mem::take(
            self.staged
                .get_mut()
                .map_err(|_| StorageError::LockPoisoned)?,
        );
        match self.store.apply(staged) {
            Ok(()) => {
                self.store.counters.commits.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.note_rollback();
                tracing::debug!(error = %e, "commit rejected, staged writes discarded");
                Err(e)
            }
        }
    }

    fn rollback(mut self) {
        self.finished = true;
        self.note_rollback();
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.note_rollback();
            tracing::debug!("transaction dropped without commit, staged writes discarded");
        }
    }
}
