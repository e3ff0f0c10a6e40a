//! Resolved profile values

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resolved profile: attribute code to value, ordered by code.
pub type AttributeMap = BTreeMap<String, ProfileValue>;

/// One resolved attribute value.
///
/// Serializes untagged, so a resolved profile renders as plain JSON:
/// strings, nulls and nested objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProfileValue {
    /// A stored row whose value was cleared.
    Null,
    Scalar(String),
    /// A resolved sub-profile.
    Nested(AttributeMap),
}

impl ProfileValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_nested(&self) -> Option<&AttributeMap> {
        match self {
            Self::Nested(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<Option<String>> for ProfileValue {
    fn from(value: Option<String>) -> Self {
        value.map(Self::Scalar).unwrap_or(Self::Null)
    }
}

impl From<&str> for ProfileValue {
    fn from(value: &str) -> Self {
        Self::Scalar(value.to_string())
    }
}
