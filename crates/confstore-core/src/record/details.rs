//! Descriptive metadata of a configuration.

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Details about a configuration.
///
/// Two details are equal if they have the same key; the display name and the
/// description do not take part in identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationDetails {
    key: String,
    nice_name: String,
    #[serde(default)]
    description: String,
}

impl ConfigurationDetails {
    /// Start building details for `key`. The display name defaults to the key.
    pub fn builder(key: impl Into<String>) -> ConfigurationDetailsBuilder {
        let key = key.into();
        ConfigurationDetailsBuilder {
            nice_name: key.clone(),
            key,
            description: String::new(),
        }
    }

    /// Identifier of the configuration.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Name for presentation to a user.
    pub fn nice_name(&self) -> &str {
        &self.nice_name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Copy of these details under a different key.
    pub fn with_key(&self, key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            nice_name: self.nice_name.clone(),
            description: self.description.clone(),
        }
    }
}

impl PartialEq for ConfigurationDetails {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ConfigurationDetails {}

impl Hash for ConfigurationDetails {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

/// Builder for [`ConfigurationDetails`].
#[derive(Debug, Clone)]
pub struct ConfigurationDetailsBuilder {
    key: String,
    nice_name: String,
    description: String,
}

impl ConfigurationDetailsBuilder {
    /// Set a name to present instead of the key.
    pub fn nice_name(mut self, value: impl Into<String>) -> Self {
        self.nice_name = value.into();
        self
    }

    pub fn description(mut self, value: impl Into<String>) -> Self {
        self.description = value.into();
        self
    }

    pub fn build(self) -> ConfigurationDetails {
        ConfigurationDetails {
            key: self.key,
            nice_name: self.nice_name,
            description: self.description,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_builder_defaults() {
        let details = ConfigurationDetails::builder("id-1").build();
        assert_eq!(details.key(), "id-1");
        assert_eq!(details.nice_name(), "id-1");
        assert_eq!(details.description(), "");
    }

    #[test]
    fn test_equality_uses_key_only() {
        let a = ConfigurationDetails::builder("id-1")
            .nice_name("A")
            .description("first")
            .build();
        let b = ConfigurationDetails::builder("id-1")
            .nice_name("B")
            .description("second")
            .build();
        let c = ConfigurationDetails::builder("id-2").nice_name("A").build();
        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_with_key_keeps_content() {
        let details = ConfigurationDetails::builder("old")
            .nice_name("Name")
            .description("Desc")
            .build();
        let copy = details.with_key("new");
        assert_eq!(copy.key(), "new");
        assert_eq!(copy.nice_name(), "Name");
        assert_eq!(copy.description(), "Desc");
        assert_eq!(details.key(), "old");
    }
}
