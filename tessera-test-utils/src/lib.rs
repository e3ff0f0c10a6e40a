//! Tessera Test Utilities
//!
//! Shared test infrastructure for the Tessera workspace:
//! - Proptest generators for ids, codes, write models and definition graphs
//! - Fixtures wiring an in-memory store to a change journal
//! - Assertions for Tessera-specific error and result shapes
//! - One-time tracing setup for tests

// Re-export the in-memory store from its source crate
pub use tessera_storage::{InMemoryChangeJournal, MemoryStore};

// Re-export core types for convenience
pub use tessera_core::{
    AttributeId, AttributeMap, AttributeRef, AttributeValModel, AttributeValueType, EntityId,
    EntityIdType, EntityKind, ProfileConfig, ProfileDefinition, ProfileError, ProfileId,
    ProfileValue, StorageError, TenantId, TesseraError, TesseraResult, ValidationError,
};

use std::sync::Once;

static TRACING: Once = Once::new();

/// Install a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to `warn`.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating Tessera types.

    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    // === Identity Type Generators ===

    /// Generate a random UUID (for generic ID generation).
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    pub fn arb_tenant_id() -> impl Strategy<Value = TenantId> {
        arb_uuid().prop_map(TenantId::new)
    }

    pub fn arb_profile_id() -> impl Strategy<Value = ProfileId> {
        arb_uuid().prop_map(ProfileId::new)
    }

    pub fn arb_entity_id() -> impl Strategy<Value = EntityId> {
        arb_uuid().prop_map(EntityId::new)
    }

    // === Enum Generators ===

    pub fn arb_entity_kind() -> impl Strategy<Value = EntityKind> {
        prop_oneof![Just(EntityKind::Group), Just(EntityKind::User)]
    }

    pub fn arb_value_type() -> impl Strategy<Value = AttributeValueType> {
        prop_oneof![
            Just(AttributeValueType::String),
            Just(AttributeValueType::Integer),
            Just(AttributeValueType::Decimal),
            Just(AttributeValueType::Boolean),
            Just(AttributeValueType::Date),
        ]
    }

    // === Value Generators ===

    /// Attribute codes: lowercase identifiers.
    pub fn arb_attribute_code() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,11}"
    }

    /// Free-text values valid for the `String` type.
    pub fn arb_attribute_value() -> impl Strategy<Value = String> {
        "[A-Za-z0-9 ]{0,16}"
    }

    /// A write model with an optional value and no type, so any value is
    /// accepted.
    pub fn arb_attribute_val_model() -> impl Strategy<Value = AttributeValModel> {
        (
            proptest::option::of(arb_attribute_value()),
            proptest::option::of("[a-z]{3,8}"),
        )
            .prop_map(|(value, category)| AttributeValModel {
                value,
                category,
                ..Default::default()
            })
    }

    /// A non-empty write map; `None` entries clear the value.
    pub fn arb_attribute_writes(
    ) -> impl Strategy<Value = BTreeMap<String, Option<AttributeValModel>>> {
        proptest::collection::btree_map(
            arb_attribute_code(),
            proptest::option::weighted(0.9, arb_attribute_val_model()),
            1..6,
        )
    }

    // === Definition Graph Generators ===

    /// An acyclic definition graph for one tenant. Element 0 is the root;
    /// a definition only references definitions after it. Codes are
    /// prefixed with the profile index so they are unique across the graph.
    pub fn arb_profile_dag(tenant_id: TenantId) -> impl Strategy<Value = Vec<ProfileDefinition>> {
        (1usize..6)
            .prop_flat_map(|n| {
                proptest::collection::vec(
                    (
                        proptest::collection::btree_set(arb_attribute_code(), 0..4),
                        proptest::collection::vec(any::<usize>(), 0..3),
                    ),
                    n,
                )
            })
            .prop_map(move |nodes| {
                let n = nodes.len();
                let ids: Vec<ProfileId> = (0..n).map(|_| ProfileId::now_v7()).collect();
                nodes
                    .into_iter()
                    .enumerate()
                    .map(|(i, (codes, children))| {
                        let mut definition =
                            ProfileDefinition::new(tenant_id, format!("profile-{i}"));
                        definition.profile_id = ids[i];
                        for code in codes {
                            definition = definition.with_attribute(format!("p{i}_{code}"));
                        }
                        let remaining = n - i - 1;
                        if remaining > 0 {
                            for (k, child) in children.into_iter().enumerate() {
                                let target = i + 1 + child % remaining;
                                definition =
                                    definition.with_sub_profile(format!("p{i}-sub{k}"), ids[target]);
                            }
                        }
                        definition
                    })
                    .collect()
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use std::sync::Arc;

    /// Configuration used by most tests.
    pub fn test_config() -> ProfileConfig {
        ProfileConfig::default()
            .with_max_depth(8)
            .with_conflict_retries(3)
    }

    /// A store for one tenant, reporting to `journal`.
    pub struct ProfileFixture {
        pub tenant_id: TenantId,
        pub journal: Arc<InMemoryChangeJournal>,
        pub store: Arc<MemoryStore>,
    }

    impl Default for ProfileFixture {
        fn default() -> Self {
            Self::new()
        }
    }

    impl ProfileFixture {
        pub fn new() -> Self {
            let journal = Arc::new(InMemoryChangeJournal::new());
            let store = Arc::new(MemoryStore::with_journal(journal.clone()));
            Self {
                tenant_id: TenantId::now_v7(),
                journal,
                store,
            }
        }

        /// Store a definition and return its id.
        pub fn define(&self, definition: ProfileDefinition) -> ProfileId {
            let id = definition.profile_id;
            self.store
                .put_profile_definition(definition)
                .unwrap_or_else(|e| panic!("failed to store definition: {e}"));
            id
        }

        pub fn define_all(&self, definitions: impl IntoIterator<Item = ProfileDefinition>) {
            for definition in definitions {
                self.define(definition);
            }
        }
    }

    /// `member`: `age`, `nickname` and `tier` (default `basic`).
    pub fn member_profile(tenant_id: TenantId) -> ProfileDefinition {
        ProfileDefinition::new(tenant_id, "member")
            .with_description("Basic member attributes")
            .with_attribute("age")
            .with_attribute("nickname")
            .with_ref(AttributeRef::scalar("tier").with_default("basic"))
    }

    /// `address`: `street` and `city`.
    pub fn address_profile(tenant_id: TenantId) -> ProfileDefinition {
        ProfileDefinition::new(tenant_id, "address")
            .with_attribute("street")
            .with_attribute("city")
    }

    /// `member` with the `address` profile nested under `address`.
    /// Returns `(root, address)`.
    pub fn nested_member_profile(tenant_id: TenantId) -> (ProfileDefinition, ProfileDefinition) {
        let address = address_profile(tenant_id);
        let root = member_profile(tenant_id).with_sub_profile("address", address.profile_id);
        (root, address)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for Tessera-specific validation.

    use super::*;

    /// Assert that a TesseraResult is a DefinitionNotFound for `profile_id`.
    #[track_caller]
    pub fn assert_definition_not_found<T: std::fmt::Debug>(
        result: &TesseraResult<T>,
        profile_id: ProfileId,
    ) {
        match result {
            Err(TesseraError::Profile(ProfileError::DefinitionNotFound {
                profile_id: missing,
                ..
            })) => assert_eq!(*missing, profile_id, "Wrong profile id in NotFound error"),
            other => panic!("Expected DefinitionNotFound for {profile_id}, got: {other:?}"),
        }
    }

    /// Assert that a TesseraResult is a RequiredFieldMissing for `field`.
    #[track_caller]
    pub fn assert_required_field<T: std::fmt::Debug>(result: &TesseraResult<T>, field: &str) {
        match result {
            Err(TesseraError::Validation(ValidationError::RequiredFieldMissing { field: f })) => {
                assert_eq!(f, field, "Wrong field in RequiredFieldMissing error")
            }
            other => panic!("Expected RequiredFieldMissing for {field}, got: {other:?}"),
        }
    }

    /// Assert that a TesseraResult is a CircularReference error.
    #[track_caller]
    pub fn assert_circular_reference<T: std::fmt::Debug>(result: &TesseraResult<T>) {
        match result {
            Err(TesseraError::Validation(ValidationError::CircularReference { .. })) => {}
            other => panic!("Expected CircularReference error, got: {other:?}"),
        }
    }

    /// Assert that `map` holds `code -> Scalar(expected)`.
    #[track_caller]
    pub fn assert_scalar(map: &AttributeMap, code: &str, expected: &str) {
        match map.get(code) {
            Some(ProfileValue::Scalar(value)) => assert_eq!(value, expected, "Wrong value for {code}"),
            other => panic!("Expected {code} -> {expected:?}, got: {other:?}"),
        }
    }

    /// Assert that `code` is not present in `map`.
    #[track_caller]
    pub fn assert_absent(map: &AttributeMap, code: &str) {
        assert!(
            !map.contains_key(code),
            "Expected {code} to be absent, got: {:?}",
            map.get(code)
        );
    }

    /// Assert that `code` resolves to a nested map and return it.
    #[track_caller]
    pub fn assert_nested<'m>(map: &'m AttributeMap, code: &str) -> &'m AttributeMap {
        match map.get(code) {
            Some(ProfileValue::Nested(nested)) => nested,
            other => panic!("Expected {code} to be a nested profile, got: {other:?}"),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
