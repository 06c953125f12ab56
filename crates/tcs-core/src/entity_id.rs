//! Entity ID type representing a domain.object_id pair

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for malformed entity IDs in configuration
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntityIdError {
    #[error("entity_id '{0}' must contain exactly one '.' separator")]
    InvalidFormat(String),

    #[error("entity_id '{0}' has an empty domain or object_id")]
    EmptyPart(String),

    #[error("entity_id '{0}' must be lowercase alphanumeric with underscores")]
    InvalidChars(String),
}

/// A host entity id such as `binary_sensor.front_door` or `cover.den_vents`
///
/// Validation is deliberately the same as the host platform's: both parts are
/// lowercase ascii alphanumeric plus underscores, with no leading or trailing
/// underscore.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    domain: String,
    object_id: String,
}

impl EntityId {
    pub fn new(
        domain: impl Into<String>,
        object_id: impl Into<String>,
    ) -> Result<Self, EntityIdError> {
        let domain = domain.into();
        let object_id = object_id.into();
        let full = format!("{}.{}", domain, object_id);

        if domain.is_empty() || object_id.is_empty() {
            return Err(EntityIdError::EmptyPart(full));
        }
        if !Self::is_valid_part(&domain) || domain.contains("__") || !Self::is_valid_part(&object_id)
        {
            return Err(EntityIdError::InvalidChars(full));
        }

        Ok(Self { domain, object_id })
    }

    /// The domain part (`binary_sensor`, `climate`, ...)
    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    /// True when this id belongs to `domain`
    pub fn is_domain(&self, domain: &str) -> bool {
        self.domain == domain
    }

    fn is_valid_part(s: &str) -> bool {
        !s.starts_with('_')
            && !s.ends_with('_')
            && s.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    }
}

impl FromStr for EntityId {
    type Err = EntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((domain, object_id)) if !object_id.contains('.') => Self::new(domain, object_id),
            _ => Err(EntityIdError::InvalidFormat(s.to_string())),
        }
    }
}

impl TryFrom<String> for EntityId {
    type Error = EntityIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> String {
        id.to_string()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain, self.object_id)
    }
}
