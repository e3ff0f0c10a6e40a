//! Concurrent first creation of attribute codes.
//!
//! Two writers introducing the same unknown code must both succeed and
//! leave exactly one attribute extend behind.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use tessera_core::{
    AttributeExtend, AttributeId, AttributeValModel, EntityId, EntityIdType, EntityKind,
    ExtendVal, FixedTenant, ProfileDefinition, ProfileId, TenantId, TesseraResult,
};
use tessera_profile::{AttributeWrites, ProfileService};
use tessera_storage::{
    AttributeExtendStore, ChangeJournal, ExtendValStore, MemoryStore, MemoryTransaction,
    ProfileSchemaStore, StoreTransaction, TransactionalStore,
};
use tessera_test_utils::assertions::assert_scalar;
use tessera_test_utils::fixtures::{member_profile, test_config, ProfileFixture};
use tessera_test_utils::{init_test_tracing, InMemoryChangeJournal};

// ============================================================================
// RACING STORE
// ============================================================================

/// Wraps a [`MemoryStore`] and, right before a transaction commits, inserts
/// a competing extend for `code` directly into the committed tables. The
/// next `races` commits lose the race this way.
struct RacingStore {
    inner: MemoryStore,
    tenant_id: TenantId,
    code: String,
    races: AtomicU32,
}

impl RacingStore {
    fn new(inner: MemoryStore, tenant_id: TenantId, code: &str, races: u32) -> Self {
        Self {
            inner,
            tenant_id,
            code: code.to_string(),
            races: AtomicU32::new(races),
        }
    }

    fn race(&self) {
        let take = self
            .races
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if take.is_ok() {
            let competitor = AttributeExtend::from_model(self.tenant_id, self.code.clone(), None);
            // Loses silently once the competitor already exists.
            let _ = self.inner.attribute_extend_insert(&competitor);
        }
    }
}

impl ProfileSchemaStore for RacingStore {
    fn profile_definition_get(
        &self,
        tenant_id: TenantId,
        profile_id: ProfileId,
    ) -> TesseraResult<Option<ProfileDefinition>> {
        self.inner.profile_definition_get(tenant_id, profile_id)
    }

    fn change_journal(&self) -> Option<Arc<dyn ChangeJournal>> {
        self.inner.change_journal()
    }
}

impl AttributeExtendStore for RacingStore {
    fn attribute_extend_get_by_code(
        &self,
        tenant_id: TenantId,
        code: &str,
    ) -> TesseraResult<Option<AttributeExtend>> {
        self.inner.attribute_extend_get_by_code(tenant_id, code)
    }

    fn attribute_extends_get_by_codes(
        &self,
        tenant_id: TenantId,
        codes: &BTreeSet<String>,
    ) -> TesseraResult<Vec<AttributeExtend>> {
        self.inner.attribute_extends_get_by_codes(tenant_id, codes)
    }

    fn attribute_extend_insert(&self, extend: &AttributeExtend) -> TesseraResult<()> {
        self.inner.attribute_extend_insert(extend)
    }
}

impl ExtendValStore for RacingStore {
    fn extend_val_query(
        &self,
        entity_kind: EntityKind,
        entity_id: EntityId,
        attribute_ids: &BTreeSet<AttributeId>,
    ) -> TesseraResult<Vec<ExtendVal>> {
        self.inner.extend_val_query(entity_kind, entity_id, attribute_ids)
    }

    fn extend_val_upsert(
        &self,
        entity_kind: EntityKind,
        entity_id: EntityId,
        attribute_id: AttributeId,
        value: Option<String>,
    ) -> TesseraResult<ExtendVal> {
        self.inner
            .extend_val_upsert(entity_kind, entity_id, attribute_id, value)
    }
}

impl TransactionalStore for RacingStore {
    type Transaction<'a> = RacingTransaction<'a>;

    fn begin(&self) -> TesseraResult<RacingTransaction<'_>> {
        Ok(RacingTransaction {
            store: self,
            inner: self.inner.begin()?,
        })
    }
}

struct RacingTransaction<'a> {
    store: &'a RacingStore,
    inner: MemoryTransaction<'a>,
}

impl AttributeExtendStore for RacingTransaction<'_> {
    fn attribute_extend_get_by_code(
        &self,
        tenant_id: TenantId,
        code: &str,
    ) -> TesseraResult<Option<AttributeExtend>> {
        self.inner.attribute_extend_get_by_code(tenant_id, code)
    }

    fn attribute_extends_get_by_codes(
        &self,
        tenant_id: TenantId,
        codes: &BTreeSet<String>,
    ) -> TesseraResult<Vec<AttributeExtend>> {
        self.inner.attribute_extends_get_by_codes(tenant_id, codes)
    }

    fn attribute_extend_insert(&self, extend: &AttributeExtend) -> TesseraResult<()> {
        self.inner.attribute_extend_insert(extend)
    }
}

impl ExtendValStore for RacingTransaction<'_> {
    fn extend_val_query(
        &self,
        entity_kind: EntityKind,
        entity_id: EntityId,
        attribute_ids: &BTreeSet<AttributeId>,
    ) -> TesseraResult<Vec<ExtendVal>> {
        self.inner.extend_val_query(entity_kind, entity_id, attribute_ids)
    }

    fn extend_val_upsert(
        &self,
        entity_kind: EntityKind,
        entity_id: EntityId,
        attribute_id: AttributeId,
        value: Option<String>,
    ) -> TesseraResult<ExtendVal> {
        self.inner
            .extend_val_upsert(entity_kind, entity_id, attribute_id, value)
    }
}

impl StoreTransaction for RacingTransaction<'_> {
    fn commit(self) -> TesseraResult<()> {
        self.store.race();
        self.inner.commit()
    }

    fn rollback(self) {
        self.inner.rollback()
    }
}

// ============================================================================
// TEST HELPERS
// ============================================================================

fn racing_service(
    races: u32,
    retry_limit: u32,
) -> (
    Arc<RacingStore>,
    ProfileId,
    ProfileService<RacingStore, FixedTenant>,
) {
    init_test_tracing();
    let tenant_id = TenantId::now_v7();
    let inner = MemoryStore::with_journal(Arc::new(InMemoryChangeJournal::new()));
    let definition = member_profile(tenant_id);
    let profile = definition.profile_id;
    inner.put_profile_definition(definition).unwrap();

    let store = Arc::new(RacingStore::new(inner, tenant_id, "nickname", races));
    let service = ProfileService::new(
        Arc::clone(&store),
        FixedTenant(tenant_id),
        test_config().with_conflict_retries(retry_limit),
    )
    .unwrap();
    (store, profile, service)
}

fn nickname(value: &str) -> AttributeWrites {
    [(
        "nickname".to_string(),
        Some(AttributeValModel::value(value)),
    )]
    .into()
}

// ============================================================================
// TESTS
// ============================================================================

#[test]
fn test_commit_conflict_is_retried() {
    let (store, profile, svc) = racing_service(1, 3);
    let entity = EntityId::now_v7();

    let resolved = svc
        .add_or_update_profile(EntityKind::User, entity, profile, &nickname("ace"))
        .unwrap();

    assert_scalar(&resolved, "nickname", "ace");
    let tenant_id = store.tenant_id;
    assert_eq!(store.inner.attribute_extend_count(tenant_id).unwrap(), 1);
    let stats = store.inner.statistics();
    assert_eq!(stats.commits, 1);
    assert_eq!(stats.rollbacks, 1);

    // The surviving extend is the competitor's, and the value points at it.
    let extend = store
        .inner
        .attribute_extend_get_by_code(tenant_id, "nickname")
        .unwrap()
        .unwrap();
    let rows = store
        .inner
        .extend_val_query(EntityKind::User, entity, &[extend.attribute_id].into())
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn test_commit_conflict_propagates_without_retries() {
    let (store, profile, svc) = racing_service(1, 0);
    let entity = EntityId::now_v7();

    let err = svc
        .add_or_update_profile(EntityKind::User, entity, profile, &nickname("ace"))
        .unwrap_err();

    assert!(err.is_conflict());
    assert_eq!(store.inner.extend_val_count(EntityKind::User, entity).unwrap(), 0);
    assert_eq!(store.inner.attribute_extend_count(store.tenant_id).unwrap(), 1);
}

#[test]
fn test_concurrent_first_creation_yields_one_extend() {
    init_test_tracing();
    let fx = ProfileFixture::new();
    let profile = fx.define(member_profile(fx.tenant_id));
    let svc = ProfileService::new(
        Arc::clone(&fx.store),
        FixedTenant(fx.tenant_id),
        test_config(),
    )
    .unwrap();

    const WRITERS: usize = 4;
    let barrier = Barrier::new(WRITERS);
    let entities: Vec<EntityId> = (0..WRITERS).map(|_| EntityId::now_v7()).collect();

    thread::scope(|scope| {
        for (i, entity) in entities.iter().enumerate() {
            let svc = &svc;
            let barrier = &barrier;
            scope.spawn(move || {
                barrier.wait();
                let resolved = svc
                    .add_or_update_profile(
                        EntityKind::Group,
                        *entity,
                        profile,
                        &nickname(&format!("writer-{i}")),
                    )
                    .unwrap();
                assert_scalar(&resolved, "nickname", &format!("writer-{i}"));
            });
        }
    });

    assert_eq!(fx.store.attribute_extend_count(fx.tenant_id).unwrap(), 1);
    for (i, entity) in entities.iter().enumerate() {
        let resolved = svc.get_profile(EntityKind::Group, *entity, profile).unwrap();
        assert_scalar(&resolved, "nickname", &format!("writer-{i}"));
    }
}
