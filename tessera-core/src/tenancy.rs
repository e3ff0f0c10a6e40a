//! Tenant context supplied by the embedding service.

use crate::{ProfileError, TenantId, TesseraResult};

/// Source of the tenant for the current request.
pub trait TenantContext: Send + Sync {
    /// The current tenant, if one is bound.
    fn current_tenant(&self) -> Option<TenantId>;

    /// The current tenant, failing when none is bound.
    fn tenant_id_with_check(&self) -> TesseraResult<TenantId> {
        self.current_tenant()
            .ok_or_else(|| ProfileError::TenantUnavailable.into())
    }
}

/// Context that always reports the same tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedTenant(pub TenantId);

impl TenantContext for FixedTenant {
    fn current_tenant(&self) -> Option<TenantId> {
        Some(self.0)
    }
}

/// Context with no tenant bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTenant;

impl TenantContext for NoTenant {
    fn current_tenant(&self) -> Option<TenantId> {
        None
    }
}

impl<F> TenantContext for F
where
    F: Fn() -> Option<TenantId> + Send + Sync,
{
    fn current_tenant(&self) -> Option<TenantId> {
        self()
    }
}
