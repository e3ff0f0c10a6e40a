//! Localized, user-facing error text.
//!
//! Messages are looked up by key and formatted with positional `{n}`
//! placeholders. The text is presentational only; no logic depends on it.

use crate::error::{ConfigError, ProfileError, StorageError, TesseraError, ValidationError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

pub const ENTITY_NOT_FOUND: &str = "common.entity.not.found";
pub const PARAMETER_EMPTY: &str = "common.parameter.empty";
pub const PARAMETER_INVALID: &str = "common.parameter.invalid";
pub const PROFILE_CYCLE: &str = "profile.definition.cycle";
pub const PROFILE_TOO_DEEP: &str = "profile.definition.too.deep";
pub const TENANT_MISSING: &str = "common.tenant.missing";
pub const ATTRIBUTE_CONFLICT: &str = "attribute.code.conflict";
pub const INTERNAL_ERROR: &str = "common.internal.error";

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{(\d+)\}").expect("valid regex"));

/// Maps a message key and arguments to display text.
pub trait MessageProvider: Send + Sync {
    /// Template for `key`, if the bundle knows it.
    fn template(&self, key: &str) -> Option<&str>;

    /// Render `key` with positional arguments.
    ///
    /// Unknown keys render as the key itself followed by the arguments, so a
    /// missing translation never hides the underlying information.
    fn message(&self, key: &str, args: &[String]) -> String {
        match self.template(key) {
            Some(template) => format_template(template, args),
            None if args.is_empty() => key.to_string(),
            None => format!("{} {}", key, args.join(" ")),
        }
    }
}

/// Substitute `{n}` placeholders; out-of-range placeholders are kept verbatim.
pub fn format_template(template: &str, args: &[String]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| args.get(i))
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Built-in English bundle.
#[derive(Debug, Clone)]
pub struct DefaultMessages {
    templates: HashMap<&'static str, String>,
}

impl Default for DefaultMessages {
    fn default() -> Self {
        let templates = [
            (ENTITY_NOT_FOUND, "{0} {1} does not exist"),
            (PARAMETER_EMPTY, "{0} must not be empty"),
            (PARAMETER_INVALID, "{0} is invalid: {1}"),
            (PROFILE_CYCLE, "profile definitions reference each other in a cycle: {0}"),
            (PROFILE_TOO_DEEP, "profile nesting is deeper than {0} levels"),
            (TENANT_MISSING, "no tenant is associated with the current request"),
            (ATTRIBUTE_CONFLICT, "attribute {0} was modified concurrently, please retry"),
            (INTERNAL_ERROR, "internal error: {0}"),
        ]
        .into_iter()
        .map(|(k, v)| (k, v.to_string()))
        .collect();
        Self { templates }
    }
}

impl DefaultMessages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override or add a template.
    pub fn with_template(mut self, key: &'static str, template: impl Into<String>) -> Self {
        self.templates.insert(key, template.into());
        self
    }
}

impl MessageProvider for DefaultMessages {
    fn template(&self, key: &str) -> Option<&str> {
        self.templates.get(key).map(String::as_str)
    }
}

impl TesseraError {
    /// Message key and arguments describing this error.
    pub fn message_key(&self) -> (&'static str, Vec<String>) {
        match self {
            Self::Profile(ProfileError::DefinitionNotFound { profile_id, .. }) => (
                ENTITY_NOT_FOUND,
                vec!["profileId".to_string(), profile_id.to_string()],
            ),
            Self::Profile(ProfileError::TenantUnavailable) => (TENANT_MISSING, vec![]),
            Self::Validation(ValidationError::RequiredFieldMissing { field }) => {
                (PARAMETER_EMPTY, vec![field.clone()])
            }
            Self::Validation(ValidationError::InvalidValue { field, reason }) => {
                (PARAMETER_INVALID, vec![field.clone(), reason.clone()])
            }
            Self::Validation(ValidationError::CircularReference { ids, .. }) => {
                let path = ids
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(" -> ");
                (PROFILE_CYCLE, vec![path])
            }
            Self::Validation(ValidationError::DepthExceeded { max_depth }) => {
                (PROFILE_TOO_DEEP, vec![max_depth.to_string()])
            }
            Self::Storage(StorageError::UniqueViolation { key, .. }) => {
                (ATTRIBUTE_CONFLICT, vec![key.clone()])
            }
            Self::Storage(other) => (INTERNAL_ERROR, vec![other.to_string()]),
            Self::Config(ConfigError::MissingRequired { field })
            | Self::Config(ConfigError::InvalidValue { field, .. }) => {
                (INTERNAL_ERROR, vec![format!("configuration field {}", field)])
            }
        }
    }

    /// Render this error through a message bundle.
    pub fn localized(&self, messages: &dyn MessageProvider) -> String {
        let (key, args) = self.message_key();
        messages.message(key, &args)
    }
}
