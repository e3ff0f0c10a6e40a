//! Profile resolution: projecting stored values through a definition graph.
//!
//! A definition's attribute refs are either scalar codes or sub-profile
//! refs. Resolution walks the graph depth-first and builds an
//! [`AttributeMap`] whose nested maps mirror the sub-profile structure.
//!
//! Policy for a scalar code:
//! - stored row with a value: `Scalar(value)`
//! - stored row that was cleared: `Null`
//! - no row, schema default present: `Scalar(default)`
//! - otherwise the code is omitted
//!
//! A sub-profile appears only when its resolved map is non-empty. Cycles
//! are rejected with `CircularReference`, and nesting beyond the configured
//! depth with `DepthExceeded`.

use std::collections::BTreeSet;

use tessera_core::{
    AttributeMap, EntityIdType, ProfileConfig, ProfileDefinition, ProfileId, ProfileValue,
    RecordType, TesseraResult, ValidationError,
};
use tracing::debug;

use crate::lookup::DefinitionLookup;
use crate::values::StoredValues;

/// Stateless resolver bounded by a maximum nesting depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileResolver {
    max_depth: usize,
}

impl Default for ProfileResolver {
    fn default() -> Self {
        Self::from_config(&ProfileConfig::default())
    }
}

impl ProfileResolver {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn from_config(config: &ProfileConfig) -> Self {
        Self::new(config.max_profile_depth)
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Every profile id reachable from `root` through sub-profile refs,
    /// `root` included.
    pub fn collect_profile_ids<L>(
        &self,
        root: &ProfileDefinition,
        lookup: &L,
    ) -> TesseraResult<BTreeSet<ProfileId>>
    where
        L: DefinitionLookup + ?Sized,
    {
        let mut path = Vec::new();
        let mut seen = BTreeSet::new();
        self.collect_into(root, lookup, &mut path, &mut seen)?;
        Ok(seen)
    }

    fn collect_into<L>(
        &self,
        definition: &ProfileDefinition,
        lookup: &L,
        path: &mut Vec<ProfileId>,
        seen: &mut BTreeSet<ProfileId>,
    ) -> TesseraResult<()>
    where
        L: DefinitionLookup + ?Sized,
    {
        self.enter(definition.profile_id, path)?;
        seen.insert(definition.profile_id);

        for child in definition.sub_profile_ids() {
            check_cycle(child, path)?;
            // Fully explored already; a cycle through it would have been seen.
            if seen.contains(&child) {
                continue;
            }
            let nested = lookup.get(child)?;
            self.collect_into(&nested, lookup, path, seen)?;
        }

        path.pop();
        Ok(())
    }

    /// Project `stored` through `definition`.
    ///
    /// An entity with no stored values resolves to an empty map, defaults
    /// included, once the graph under `definition` is known to be acyclic
    /// and within the depth bound. Inputs are only borrowed; the same inputs
    /// always give the same map.
    pub fn resolve<L>(
        &self,
        definition: &ProfileDefinition,
        stored: &StoredValues,
        lookup: &L,
    ) -> TesseraResult<AttributeMap>
    where
        L: DefinitionLookup + ?Sized,
    {
        if stored.is_empty() {
            self.collect_profile_ids(definition, lookup)?;
            return Ok(AttributeMap::new());
        }
        let mut path = Vec::new();
        let resolved = self.project(definition, stored, lookup, &mut path)?;
        debug!(
            profile_id = %definition.profile_id,
            attributes = resolved.len(),
            "resolved profile"
        );
        Ok(resolved)
    }

    fn project<L>(
        &self,
        definition: &ProfileDefinition,
        stored: &StoredValues,
        lookup: &L,
        path: &mut Vec<ProfileId>,
    ) -> TesseraResult<AttributeMap>
    where
        L: DefinitionLookup + ?Sized,
    {
        self.enter(definition.profile_id, path)?;
        let mut map = AttributeMap::new();

        for attribute in &definition.attributes {
            match attribute.sub_profile {
                None => {
                    let value = match stored.value_for_code(&attribute.code) {
                        Some(row) => Some(ProfileValue::from(row.value.clone())),
                        None => attribute
                            .default_value
                            .as_deref()
                            .map(ProfileValue::from),
                    };
                    if let Some(value) = value {
                        map.insert(attribute.code.clone(), value);
                    }
                }
                Some(child) => {
                    check_cycle(child, path)?;
                    let nested_definition = lookup.get(child)?;
                    let nested = self.project(&nested_definition, stored, lookup, path)?;
                    if !nested.is_empty() {
                        map.insert(attribute.code.clone(), ProfileValue::Nested(nested));
                    }
                }
            }
        }

        path.pop();
        Ok(map)
    }

    fn enter(&self, profile_id: ProfileId, path: &mut Vec<ProfileId>) -> TesseraResult<()> {
        if path.len() > self.max_depth {
            return Err(ValidationError::DepthExceeded {
                max_depth: self.max_depth,
            }
            .into());
        }
        path.push(profile_id);
        Ok(())
    }
}

fn check_cycle(child: ProfileId, path: &[ProfileId]) -> TesseraResult<()> {
    match path.iter().position(|id| *id == child) {
        Some(start) => {
            let ids = path[start..]
                .iter()
                .chain(std::iter::once(&child))
                .map(|id| id.as_uuid())
                .collect();
            Err(ValidationError::CircularReference {
                record_type: RecordType::ProfileDefinition,
                ids,
            }
            .into())
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Arc;
    use tessera_core::{
        AttributeId, AttributeRef, EntityId, EntityKind, ExtendVal, ProfileError, TenantId,
        TesseraError,
    };

    #[derive(Default)]
    struct Graph {
        definitions: HashMap<ProfileId, Arc<ProfileDefinition>>,
    }

    impl Graph {
        fn add(&mut self, definition: ProfileDefinition) -> ProfileId {
            let id = definition.profile_id;
            self.definitions.insert(id, Arc::new(definition));
            id
        }
    }

    impl DefinitionLookup for Graph {
        fn get(&self, profile_id: ProfileId) -> TesseraResult<Arc<ProfileDefinition>> {
            self.definitions.get(&profile_id).cloned().ok_or_else(|| {
                ProfileError::DefinitionNotFound {
                    profile_id,
                    tenant_id: TenantId::nil(),
                }
                .into()
            })
        }
    }

    fn stored(values: &[(&str, Option<&str>)]) -> StoredValues {
        let entity = EntityId::now_v7();
        let mut codes = BTreeMap::new();
        let mut rows = Vec::new();
        for (code, value) in values {
            let id = AttributeId::now_v7();
            codes.insert(code.to_string(), id);
            rows.push(ExtendVal::new(
                EntityKind::Group,
                entity,
                id,
                value.map(str::to_string),
            ));
        }
        StoredValues::new(codes, rows)
    }

    #[test]
    fn test_no_values_resolves_empty() {
        let tenant = TenantId::now_v7();
        let definition = ProfileDefinition::new(tenant, "member")
            .with_attribute("age")
            .with_ref(AttributeRef::scalar("tier").with_default("basic"));
        let resolved = ProfileResolver::default()
            .resolve(&definition, &StoredValues::default(), &Graph::default())
            .unwrap();
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_scalar_policy() {
        let tenant = TenantId::now_v7();
        let definition = ProfileDefinition::new(tenant, "member")
            .with_attribute("age")
            .with_attribute("nickname")
            .with_attribute("missing")
            .with_ref(AttributeRef::scalar("tier").with_default("basic"));
        let values = stored(&[("age", Some("30")), ("nickname", None)]);

        let resolved = ProfileResolver::default()
            .resolve(&definition, &values, &Graph::default())
            .unwrap();

        assert_eq!(resolved.get("age"), Some(&ProfileValue::from("30")));
        assert_eq!(resolved.get("nickname"), Some(&ProfileValue::Null));
        assert_eq!(resolved.get("tier"), Some(&ProfileValue::from("basic")));
        assert!(!resolved.contains_key("missing"));
    }

    #[test]
    fn test_nested_sub_profile() {
        let tenant = TenantId::now_v7();
        let mut graph = Graph::default();
        let address = graph.add(ProfileDefinition::new(tenant, "address").with_attribute("city"));
        let empty = graph.add(ProfileDefinition::new(tenant, "empty").with_attribute("nothing"));
        let root = ProfileDefinition::new(tenant, "member")
            .with_attribute("age")
            .with_sub_profile("address", address)
            .with_sub_profile("extra", empty);
        let values = stored(&[("age", Some("30")), ("city", Some("Oslo"))]);

        let resolved = ProfileResolver::default()
            .resolve(&root, &values, &graph)
            .unwrap();

        let nested = resolved.get("address").and_then(ProfileValue::as_nested).unwrap();
        assert_eq!(nested.get("city"), Some(&ProfileValue::from("Oslo")));
        assert!(!resolved.contains_key("extra"));
    }

    #[test]
    fn test_collect_includes_root_and_diamond_once() {
        let tenant = TenantId::now_v7();
        let mut graph = Graph::default();
        let shared = graph.add(ProfileDefinition::new(tenant, "shared").with_attribute("x"));
        let left = graph.add(ProfileDefinition::new(tenant, "left").with_sub_profile("s", shared));
        let right = graph.add(ProfileDefinition::new(tenant, "right").with_sub_profile("s", shared));
        let root = ProfileDefinition::new(tenant, "root")
            .with_sub_profile("l", left)
            .with_sub_profile("r", right);

        let ids = ProfileResolver::default()
            .collect_profile_ids(&root, &graph)
            .unwrap();

        let expected: BTreeSet<ProfileId> = [root.profile_id, left, right, shared].into();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_cycle_rejected() {
        let tenant = TenantId::now_v7();
        let mut graph = Graph::default();
        let a = ProfileDefinition::new(tenant, "a");
        let b = ProfileDefinition::new(tenant, "b").with_sub_profile("a", a.profile_id);
        let a = a.with_sub_profile("b", b.profile_id);
        let a_id = graph.add(a.clone());
        let b_id = graph.add(b);

        let err = ProfileResolver::default()
            .collect_profile_ids(&a, &graph)
            .unwrap_err();
        match err {
            TesseraError::Validation(ValidationError::CircularReference { ids, .. }) => {
                assert_eq!(ids, vec![a_id.as_uuid(), b_id.as_uuid(), a_id.as_uuid()]);
            }
            other => panic!("expected a cycle error, got {other:?}"),
        }

        let values = stored(&[("x", Some("1"))]);
        assert!(matches!(
            ProfileResolver::default().resolve(&a, &values, &graph),
            Err(TesseraError::Validation(ValidationError::CircularReference { .. }))
        ));
    }

    #[test]
    fn test_cycle_rejected_without_stored_values() {
        let tenant = TenantId::now_v7();
        let mut graph = Graph::default();
        let a = ProfileDefinition::new(tenant, "a");
        let b = ProfileDefinition::new(tenant, "b").with_sub_profile("a", a.profile_id);
        let a = a.with_sub_profile("b", b.profile_id);
        graph.add(a.clone());
        graph.add(b);

        let err = ProfileResolver::default()
            .resolve(&a, &StoredValues::default(), &graph)
            .unwrap_err();
        assert!(matches!(
            err,
            TesseraError::Validation(ValidationError::CircularReference { .. })
        ));
    }

    #[test]
    fn test_depth_bound_without_stored_values() {
        let tenant = TenantId::now_v7();
        let mut graph = Graph::default();
        let leaf = graph.add(ProfileDefinition::new(tenant, "leaf").with_attribute("x"));
        let root = ProfileDefinition::new(tenant, "root").with_sub_profile("leaf", leaf);

        let err = ProfileResolver::new(0)
            .resolve(&root, &StoredValues::default(), &graph)
            .unwrap_err();
        assert_eq!(
            err,
            TesseraError::Validation(ValidationError::DepthExceeded { max_depth: 0 })
        );
    }

    #[test]
    fn test_self_reference_rejected() {
        let tenant = TenantId::now_v7();
        let mut graph = Graph::default();
        let a = ProfileDefinition::new(tenant, "a");
        let a = a.clone().with_sub_profile("me", a.profile_id);
        graph.add(a.clone());

        assert!(ProfileResolver::default()
            .collect_profile_ids(&a, &graph)
            .is_err());
    }

    #[test]
    fn test_depth_bound() {
        let tenant = TenantId::now_v7();
        let mut graph = Graph::default();
        let leaf = graph.add(ProfileDefinition::new(tenant, "leaf").with_attribute("x"));
        let middle = graph.add(ProfileDefinition::new(tenant, "middle").with_sub_profile("leaf", leaf));
        let root = ProfileDefinition::new(tenant, "root").with_sub_profile("middle", middle);

        assert!(ProfileResolver::new(2).collect_profile_ids(&root, &graph).is_ok());
        let err = ProfileResolver::new(1)
            .collect_profile_ids(&root, &graph)
            .unwrap_err();
        assert_eq!(
            err,
            TesseraError::Validation(ValidationError::DepthExceeded { max_depth: 1 })
        );
    }

    #[test]
    fn test_missing_sub_profile_is_not_found() {
        let tenant = TenantId::now_v7();
        let root = ProfileDefinition::new(tenant, "root").with_sub_profile("gone", ProfileId::now_v7());
        let err = ProfileResolver::default()
            .collect_profile_ids(&root, &Graph::default())
            .unwrap_err();
        assert!(err.is_bad_request());
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let tenant = TenantId::now_v7();
        let mut graph = Graph::default();
        let address = graph.add(ProfileDefinition::new(tenant, "address").with_attribute("city"));
        let root = ProfileDefinition::new(tenant, "member")
            .with_attribute("age")
            .with_sub_profile("address", address);
        let values = stored(&[("age", Some("30")), ("city", Some("Oslo"))]);
        let before = values.clone();

        let resolver = ProfileResolver::default();
        let first = resolver.resolve(&root, &values, &graph).unwrap();
        let second = resolver.resolve(&root, &values, &graph).unwrap();

        assert_eq!(first, second);
        assert_eq!(values, before);
    }
}
