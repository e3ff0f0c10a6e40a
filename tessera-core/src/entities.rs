//! Profile schema and attribute storage records

use crate::identity::{
    AttributeId, EntityId, EntityIdType, ExtendValId, ProfileId, TenantId, Timestamp,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Record type discriminator used by cache keys, errors and the change journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordType {
    ProfileDefinition,
    AttributeExtend,
    ExtendVal,
}

/// Kind of owner entity a set of extend values belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Group,
    User,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group => f.write_str("group"),
            Self::User => f.write_str("user"),
        }
    }
}

/// Declared type of an attribute's raw value.
///
/// Values are always stored as strings; the type only governs validation
/// on the write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeValueType {
    #[default]
    String,
    Integer,
    Decimal,
    Boolean,
    /// `YYYY-MM-DD` or an RFC 3339 timestamp.
    Date,
}

impl AttributeValueType {
    /// Check that `raw` is a valid rendition of this type.
    ///
    /// Returns a human-readable reason on failure.
    pub fn validate(&self, raw: &str) -> Result<(), String> {
        match self {
            Self::String => Ok(()),
            Self::Integer => raw
                .trim()
                .parse::<i64>()
                .map(|_| ())
                .map_err(|e| format!("expected an integer: {}", e)),
            Self::Decimal => match raw.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(()),
                Ok(_) => Err("expected a finite decimal".to_string()),
                Err(e) => Err(format!("expected a decimal: {}", e)),
            },
            Self::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "false" => Ok(()),
                _ => Err("expected true or false".to_string()),
            },
            Self::Date => {
                let trimmed = raw.trim();
                if NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").is_ok()
                    || DateTime::parse_from_rfc3339(trimmed).is_ok()
                {
                    Ok(())
                } else {
                    Err("expected YYYY-MM-DD or an RFC 3339 timestamp".to_string())
                }
            }
        }
    }
}

/// One entry of a profile definition.
///
/// A plain entry names an attribute code; an entry with `sub_profile` set
/// embeds another profile definition under `code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRef {
    pub code: String,
    pub sub_profile: Option<ProfileId>,
    /// Value emitted when the entity has no stored row for `code`.
    pub default_value: Option<String>,
}

impl AttributeRef {
    /// Reference to a scalar attribute.
    pub fn scalar(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            sub_profile: None,
            default_value: None,
        }
    }

    /// Reference to a nested profile.
    pub fn sub_profile(code: impl Into<String>, profile_id: ProfileId) -> Self {
        Self {
            code: code.into(),
            sub_profile: Some(profile_id),
            default_value: None,
        }
    }

    /// Attach a schema default. Ignored for sub-profile references.
    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn is_sub_profile(&self) -> bool {
        self.sub_profile.is_some()
    }
}

/// A profile definition (schema).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDefinition {
    pub profile_id: ProfileId,
    pub tenant_id: TenantId,
    pub name: String,
    pub description: Option<String>,
    /// Ordered attribute references.
    pub attributes: Vec<AttributeRef>,
}

impl ProfileDefinition {
    /// Create an empty definition with a fresh id.
    pub fn new(tenant_id: TenantId, name: impl Into<String>) -> Self {
        Self {
            profile_id: ProfileId::now_v7(),
            tenant_id,
            name: name.into(),
            description: None,
            attributes: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Append an attribute reference.
    pub fn with_ref(mut self, attribute: AttributeRef) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Append a scalar attribute reference.
    pub fn with_attribute(self, code: impl Into<String>) -> Self {
        self.with_ref(AttributeRef::scalar(code))
    }

    /// Append a sub-profile reference.
    pub fn with_sub_profile(self, code: impl Into<String>, profile_id: ProfileId) -> Self {
        self.with_ref(AttributeRef::sub_profile(code, profile_id))
    }

    /// Codes of the scalar attributes declared directly by this definition.
    pub fn scalar_codes(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .iter()
            .filter(|a| !a.is_sub_profile())
            .map(|a| a.code.as_str())
    }

    /// Ids of the directly referenced sub-profiles, in declaration order.
    pub fn sub_profile_ids(&self) -> impl Iterator<Item = ProfileId> + '_ {
        self.attributes.iter().filter_map(|a| a.sub_profile)
    }
}

/// Canonical, tenant-scoped definition of one attribute code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeExtend {
    pub attribute_id: AttributeId,
    pub tenant_id: TenantId,
    /// Unique per tenant.
    pub code: String,
    pub value_type: AttributeValueType,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub created_at: Timestamp,
}

impl AttributeExtend {
    /// Build a new extend for `code`, taking metadata from the write model.
    pub fn from_model(
        tenant_id: TenantId,
        code: impl Into<String>,
        model: Option<&AttributeValModel>,
    ) -> Self {
        let code = code.into();
        Self {
            attribute_id: AttributeId::now_v7(),
            tenant_id,
            value_type: model.and_then(|m| m.value_type).unwrap_or_default(),
            category: model.and_then(|m| m.category.clone()),
            subcategory: model.and_then(|m| m.subcategory.clone()),
            display_name: model.and_then(|m| m.display_name.clone()),
            description: model.and_then(|m| m.description.clone()),
            code,
            created_at: Utc::now(),
        }
    }
}

/// Stored raw value of one attribute on one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendVal {
    pub extend_val_id: ExtendValId,
    pub entity_kind: EntityKind,
    pub entity_id: EntityId,
    pub attribute_id: AttributeId,
    /// `None` means the value was cleared.
    pub value: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ExtendVal {
    pub fn new(
        entity_kind: EntityKind,
        entity_id: EntityId,
        attribute_id: AttributeId,
        value: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            extend_val_id: ExtendValId::now_v7(),
            entity_kind,
            entity_id,
            attribute_id,
            value,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Write-path input for one attribute.
///
/// The metadata fields are only consulted when the attribute extend does not
/// exist yet and has to be created.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttributeValModel {
    pub value: Option<String>,
    pub value_type: Option<AttributeValueType>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
}

impl AttributeValModel {
    /// Model carrying only a value.
    pub fn value(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            ..Default::default()
        }
    }

    /// Model that clears the stored value.
    pub fn cleared() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, value_type: AttributeValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }
}
