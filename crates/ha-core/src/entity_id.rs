//! Entity ID type representing a domain.object_id pair

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for invalid entity IDs
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntityIdError {
    #[error("entity_id must contain exactly one '.' separator")]
    InvalidFormat,

    #[error("domain cannot be empty")]
    EmptyDomain,

    #[error("object_id cannot be empty")]
    EmptyObjectId,

    #[error("domain contains invalid characters (lowercase alphanumeric and single underscores only)")]
    InvalidDomainChars,

    #[error("object_id contains invalid characters (lowercase alphanumeric and underscores only)")]
    InvalidObjectIdChars,
}

/// A Home Assistant entity ID such as `update.home_assistant_core_update`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    domain: String,
    object_id: String,
}

impl EntityId {
    /// Create a new EntityId from domain and object_id parts
    pub fn new(
        domain: impl Into<String>,
        object_id: impl Into<String>,
    ) -> Result<Self, EntityIdError> {
        let domain = domain.into();
        let object_id = object_id.into();

        if domain.is_empty() {
            return Err(EntityIdError::EmptyDomain);
        }
        if object_id.is_empty() {
            return Err(EntityIdError::EmptyObjectId);
        }
        if domain.contains("__") || !is_slug(&domain) {
            return Err(EntityIdError::InvalidDomainChars);
        }
        if !is_slug(&object_id) {
            return Err(EntityIdError::InvalidObjectIdChars);
        }

        Ok(Self { domain, object_id })
    }

    /// Generate an entity ID in `domain` from a human-readable name
    ///
    /// `"Home Assistant Core Update"` becomes `home_assistant_core_update`.
    pub fn from_name(domain: impl Into<String>, name: &str) -> Result<Self, EntityIdError> {
        Self::new(domain, slugify(name))
    }

    /// Get the domain part of the entity ID
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Get the object_id part of the entity ID
    pub fn object_id(&self) -> &str {
        &self.object_id
    }
}

/// Lowercase alphanumerics and underscores, no leading or trailing underscore
fn is_slug(s: &str) -> bool {
    !s.starts_with('_')
        && !s.ends_with('_')
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Turn arbitrary text into an underscore-separated lowercase slug
///
/// Non-ASCII letters are transliterated: `"Über Zigbee"` becomes `uber_zigbee`.
pub fn slugify(text: &str) -> String {
    slug::slugify(text).replace('-', "_")
}

impl FromStr for EntityId {
    type Err = EntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((domain, object_id)) if !object_id.contains('.') => Self::new(domain, object_id),
            _ => Err(EntityIdError::InvalidFormat),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entity_id() {
        let id: EntityId = "update.test_update".parse().unwrap();
        assert_eq!(id.domain(), "update");
        assert_eq!(id.object_id(), "test_update");
        assert_eq!(id.to_string(), "update.test_update");
    }

    #[test]
    fn test_invalid_format() {
        assert_eq!(
            "no_separator".parse::<EntityId>().unwrap_err(),
            EntityIdError::InvalidFormat
        );
        assert_eq!(
            "too.many.parts".parse::<EntityId>().unwrap_err(),
            EntityIdError::InvalidFormat
        );
        assert_eq!(
            ".object".parse::<EntityId>().unwrap_err(),
            EntityIdError::EmptyDomain
        );
        assert_eq!(
            "update.".parse::<EntityId>().unwrap_err(),
            EntityIdError::EmptyObjectId
        );
    }

    #[test]
    fn test_invalid_chars() {
        assert_eq!(
            "Update.core".parse::<EntityId>().unwrap_err(),
            EntityIdError::InvalidDomainChars
        );
        assert_eq!(
            "my__domain.core".parse::<EntityId>().unwrap_err(),
            EntityIdError::InvalidDomainChars
        );
        assert_eq!(
            "update._core".parse::<EntityId>().unwrap_err(),
            EntityIdError::InvalidObjectIdChars
        );
        assert!("update.my__addon".parse::<EntityId>().is_ok());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(
            slugify("Home Assistant Operating System Update"),
            "home_assistant_operating_system_update"
        );
        assert_eq!(slugify("test2 Update"), "test2_update");
        assert_eq!(slugify("  Mosquitto broker -- Update!"), "mosquitto_broker_update");
        assert_eq!(slugify("my__addon"), "my_addon");
    }

    #[test]
    fn test_slugify_transliterates() {
        assert_eq!(slugify("Über Zigbee Update"), "uber_zigbee_update");
        assert_eq!(slugify("Café Señor"), "cafe_senor");

        let id = EntityId::from_name("update", "Über Zigbee Update").unwrap();
        assert_eq!(id.to_string(), "update.uber_zigbee_update");
    }

    #[test]
    fn test_from_name() {
        let id = EntityId::from_name("update", "Home Assistant Supervisor Update").unwrap();
        assert_eq!(id.to_string(), "update.home_assistant_supervisor_update");

        assert_eq!(
            EntityId::from_name("update", "!!!").unwrap_err(),
            EntityIdError::EmptyObjectId
        );
    }

    #[test]
    fn test_serde_as_string() {
        let id = EntityId::new("update", "test_update").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"update.test_update\"");

        let parsed: EntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
