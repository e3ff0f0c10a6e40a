//! Tenant-scoped cache keys.
//!
//! A `TenantScopedKey` can only be built with a tenant id, so a cache lookup
//! that forgets the tenant does not compile.

use tessera_core::{EntityIdType, RecordType, TenantId};
use uuid::Uuid;

/// Separator byte between tenant_id and the rest of the key.
const SEPARATOR: u8 = 0xFF;

/// Encoded key length in bytes.
pub const KEY_LEN: usize = 34;

/// A cache key that is scoped to a specific tenant.
///
/// # Binary Format
///
/// The key encodes to a fixed 34-byte array:
/// - Bytes 0-15: tenant_id (UUID as bytes)
/// - Byte 16: separator (0xFF)
/// - Byte 17: record_type (single byte discriminant)
/// - Bytes 18-33: record id (UUID as bytes)
///
/// Keys sort by tenant first, so one tenant's entries form a contiguous
/// range that prefix scans can walk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantScopedKey {
    inner: TenantKeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TenantKeyInner {
    tenant_id: TenantId,
    record_type: RecordType,
    record_id: Uuid,
}

impl TenantScopedKey {
    /// Create a new tenant-scoped cache key.
    pub fn new(tenant_id: TenantId, record_type: RecordType, record_id: Uuid) -> Self {
        Self {
            inner: TenantKeyInner {
                tenant_id,
                record_type,
                record_id,
            },
        }
    }

    /// Get the tenant ID this key is scoped to.
    pub fn tenant_id(&self) -> TenantId {
        self.inner.tenant_id
    }

    /// Get the record type for this key.
    pub fn record_type(&self) -> RecordType {
        self.inner.record_type
    }

    /// Get the record id for this key.
    pub fn record_id(&self) -> Uuid {
        self.inner.record_id
    }

    /// Encode this key to a fixed-size byte array.
    ///
    /// Format: [tenant_id: 16 bytes][separator: 1 byte][type: 1 byte][record_id: 16 bytes]
    pub fn encode(&self) -> [u8; KEY_LEN] {
        let mut bytes = [0u8; KEY_LEN];
        bytes[0..16].copy_from_slice(self.inner.tenant_id.as_uuid().as_bytes());
        bytes[16] = SEPARATOR;
        bytes[17] = record_type_to_byte(self.inner.record_type);
        bytes[18..34].copy_from_slice(self.inner.record_id.as_bytes());
        bytes
    }

    /// Decode a key from bytes.
    ///
    /// Returns `None` if the length, separator or record type byte is wrong.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != KEY_LEN || bytes[16] != SEPARATOR {
            return None;
        }

        let tenant_id = Uuid::from_slice(&bytes[0..16]).ok()?;
        let record_type = byte_to_record_type(bytes[17])?;
        let record_id = Uuid::from_slice(&bytes[18..34]).ok()?;

        Some(Self::new(TenantId::new(tenant_id), record_type, record_id))
    }

    /// Prefix shared by every key of a tenant.
    pub fn tenant_prefix(tenant_id: TenantId) -> [u8; 17] {
        let mut prefix = [0u8; 17];
        prefix[0..16].copy_from_slice(tenant_id.as_uuid().as_bytes());
        prefix[16] = SEPARATOR;
        prefix
    }

    /// Prefix shared by every key of one record type within a tenant.
    pub fn tenant_type_prefix(tenant_id: TenantId, record_type: RecordType) -> [u8; 18] {
        let mut prefix = [0u8; 18];
        prefix[0..17].copy_from_slice(&Self::tenant_prefix(tenant_id));
        prefix[17] = record_type_to_byte(record_type);
        prefix
    }
}

fn record_type_to_byte(record_type: RecordType) -> u8 {
    match record_type {
        RecordType::ProfileDefinition => 0,
        RecordType::AttributeExtend => 1,
        RecordType::ExtendVal => 2,
    }
}

fn byte_to_record_type(byte: u8) -> Option<RecordType> {
    match byte {
        0 => Some(RecordType::ProfileDefinition),
        1 => Some(RecordType::AttributeExtend),
        2 => Some(RecordType::ExtendVal),
        _ => None,
    }
}
