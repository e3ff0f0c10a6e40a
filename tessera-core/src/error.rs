//! Error types for Tessera operations

use crate::{ProfileId, RecordType, TenantId};
use thiserror::Error;
use uuid::Uuid;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Unique constraint violated for {record_type:?} on {key}")]
    UniqueViolation { record_type: RecordType, key: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Circular reference detected in {record_type:?}: {ids:?}")]
    CircularReference { record_type: RecordType, ids: Vec<Uuid> },

    #[error("Profile nesting exceeds the maximum depth of {max_depth}")]
    DepthExceeded { max_depth: usize },
}

/// Profile lookup errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProfileError {
    #[error("Profile definition {profile_id} not found for tenant {tenant_id}")]
    DefinitionNotFound {
        profile_id: ProfileId,
        tenant_id: TenantId,
    },

    #[error("No tenant available in the current context")]
    TenantUnavailable,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Coarse classification used by the service layer to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Conflict,
    Internal,
}

/// Master error type for all Tessera errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TesseraError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl TesseraError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::Profile(ProfileError::TenantUnavailable) => {
                ErrorKind::InvalidArgument
            }
            Self::Profile(ProfileError::DefinitionNotFound { .. }) => ErrorKind::NotFound,
            Self::Storage(StorageError::UniqueViolation { .. }) => ErrorKind::Conflict,
            Self::Storage(_) | Self::Config(_) => ErrorKind::Internal,
        }
    }

    /// Errors a client caused and should see as a bad request.
    pub fn is_bad_request(&self) -> bool {
        matches!(self.kind(), ErrorKind::InvalidArgument | ErrorKind::NotFound)
    }

    /// A uniqueness conflict that a re-fetch or re-run can resolve.
    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    /// Shorthand for a missing required argument.
    pub fn required(field: impl Into<String>) -> Self {
        Self::Validation(ValidationError::RequiredFieldMissing {
            field: field.into(),
        })
    }
}

/// Result type alias for Tessera operations.
pub type TesseraResult<T> = Result<T, TesseraError>;

// =============================================================================
// TESTS
// =============================================================================
