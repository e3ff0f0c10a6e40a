//! Attribute registry: the per-tenant catalog of attribute codes.

use std::collections::{BTreeMap, BTreeSet};

use tessera_core::{
    AttributeExtend, AttributeId, AttributeValModel, StorageError, TenantId, TesseraError,
    TesseraResult, ValidationError,
};
use tessera_storage::AttributeExtendStore;
use tracing::{info, warn};

/// Registry operations over an attribute extend store or an open
/// transaction.
pub struct AttributeRegistry<'s, S: ?Sized> {
    store: &'s S,
}

impl<'s, S> AttributeRegistry<'s, S>
where
    S: AttributeExtendStore + ?Sized,
{
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Return the extend for `code`, creating it from `model` if the tenant
    /// doesn't have one yet.
    ///
    /// Two callers racing to create the same code both end up with the one
    /// row that won: an insert rejected with `UniqueViolation` re-fetches
    /// the existing extend.
    pub fn add_attribute_extend_if_non_existent(
        &self,
        tenant_id: TenantId,
        code: &str,
        model: Option<&AttributeValModel>,
    ) -> TesseraResult<AttributeExtend> {
        if code.trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "attribute_code".to_string(),
                reason: "attribute code must not be blank".to_string(),
            }
            .into());
        }

        if let Some(existing) = self.store.attribute_extend_get_by_code(tenant_id, code)? {
            return Ok(existing);
        }

        let extend = AttributeExtend::from_model(tenant_id, code, model);
        match self.store.attribute_extend_insert(&extend) {
            Ok(()) => {
                info!(
                    tenant_id = %tenant_id,
                    code,
                    attribute_id = %extend.attribute_id,
                    value_type = ?extend.value_type,
                    "created attribute extend"
                );
                Ok(extend)
            }
            Err(TesseraError::Storage(StorageError::UniqueViolation { .. })) => {
                warn!(
                    tenant_id = %tenant_id,
                    code,
                    "attribute code created concurrently, re-fetching"
                );
                self.store
                    .attribute_extend_get_by_code(tenant_id, code)?
                    .ok_or_else(|| {
                        StorageError::TransactionFailed {
                            reason: format!("attribute code {code} conflicted but is not visible"),
                        }
                        .into()
                    })
            }
            Err(e) => Err(e),
        }
    }

    /// Map each known code in `codes` to its attribute id. Unknown codes are
    /// left out.
    pub fn attribute_index(
        &self,
        tenant_id: TenantId,
        codes: &BTreeSet<String>,
    ) -> TesseraResult<BTreeMap<String, AttributeId>> {
        if codes.is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(self
            .store
            .attribute_extends_get_by_codes(tenant_id, codes)?
            .into_iter()
            .map(|extend| (extend.code, extend.attribute_id))
            .collect())
    }
}

/// Check a raw value against the extend's declared type. Cleared values
/// always pass.
pub fn validate_value(extend: &AttributeExtend, value: Option<&str>) -> TesseraResult<()> {
    let Some(raw) = value else {
        return Ok(());
    };
    extend.value_type.validate(raw).map_err(|reason| {
        ValidationError::InvalidValue {
            field: extend.code.clone(),
            reason,
        }
        .into()
    })
}
