//! Aggregation of configuration sources.
//!
//! A [`ConfigurationsCatalog`] is assembled from a fixed list of read-only
//! providers and at most one provider of user configurations.

use crate::catalog::UserConfigurations;
use crate::error::{CatalogError, Result};
use crate::record::{Configuration, ConfigurationDetails, Properties};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// A source of configurations.
pub trait ConfigurationsProvider: Send + Sync {
    /// Details of every configuration the provider offers.
    fn configuration_details(&self) -> HashSet<ConfigurationDetails>;

    /// Properties of a configuration, or `None` if the provider does not have it.
    fn configuration(&self, identifier: &str) -> Option<Properties>;
}

/// A provider whose configurations can be added and removed at runtime.
pub trait UserConfigurationsProvider: ConfigurationsProvider {
    /// Store a new configuration and return its identifier.
    fn add_configuration(
        &self,
        nice_name: &str,
        description: &str,
        properties: Properties,
    ) -> Option<String>;

    fn remove_configuration(&self, identifier: &str) -> bool;

    fn contains_configuration(&self, identifier: &str) -> bool;
}

impl ConfigurationsProvider for UserConfigurations {
    fn configuration_details(&self) -> HashSet<ConfigurationDetails> {
        UserConfigurations::configuration_details(self)
    }

    fn configuration(&self, identifier: &str) -> Option<Properties> {
        UserConfigurations::configuration(self, identifier)
    }
}

impl UserConfigurationsProvider for UserConfigurations {
    fn add_configuration(
        &self,
        nice_name: &str,
        description: &str,
        properties: Properties,
    ) -> Option<String> {
        UserConfigurations::add_configuration(self, nice_name, description, properties)
    }

    fn remove_configuration(&self, identifier: &str) -> bool {
        UserConfigurations::remove_configuration(self, identifier)
    }

    fn contains_configuration(&self, identifier: &str) -> bool {
        UserConfigurations::contains_configuration(self, identifier)
    }
}

/// Read-only provider over a fixed set of configurations.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    configurations: HashMap<String, Configuration>,
}

impl MemoryProvider {
    pub fn new(configurations: impl IntoIterator<Item = Configuration>) -> Self {
        Self {
            configurations: configurations
                .into_iter()
                .map(|c| (c.key().to_string(), c))
                .collect(),
        }
    }
}

impl ConfigurationsProvider for MemoryProvider {
    fn configuration_details(&self) -> HashSet<ConfigurationDetails> {
        self.configurations
            .values()
            .map(|c| c.details().clone())
            .collect()
    }

    fn configuration(&self, identifier: &str) -> Option<Properties> {
        self.configurations
            .get(identifier)
            .map(|c| c.properties().clone())
    }
}

/// Builder for [`ConfigurationsCatalog`].
#[derive(Default)]
pub struct ConfigurationsCatalogBuilder {
    providers: Vec<Arc<dyn ConfigurationsProvider>>,
    user_configurations: Option<Arc<dyn UserConfigurationsProvider>>,
}

impl ConfigurationsCatalogBuilder {
    /// Add a read-only provider. On duplicate keys, later providers win.
    pub fn provider(mut self, provider: Arc<dyn ConfigurationsProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Set the provider of user configurations, replacing any previous one.
    pub fn user_configurations(mut self, provider: Arc<dyn UserConfigurationsProvider>) -> Self {
        self.user_configurations = Some(provider);
        self
    }

    pub fn build(self) -> ConfigurationsCatalog {
        debug!(
            "Assembled configurations catalog with {} providers{}",
            self.providers.len(),
            if self.user_configurations.is_some() {
                " and user configurations"
            } else {
                ""
            }
        );
        ConfigurationsCatalog {
            providers: self.providers,
            user_configurations: self.user_configurations,
            owners: RwLock::new(HashMap::new()),
        }
    }
}

/// All configurations available to an application.
///
/// User configurations take precedence over provider configurations with the
/// same identifier.
pub struct ConfigurationsCatalog {
    providers: Vec<Arc<dyn ConfigurationsProvider>>,
    user_configurations: Option<Arc<dyn UserConfigurationsProvider>>,
    /// Identifier -> index of the provider that owns it.
    owners: RwLock<HashMap<String, usize>>,
}

impl ConfigurationsCatalog {
    pub fn builder() -> ConfigurationsCatalogBuilder {
        ConfigurationsCatalogBuilder::default()
    }

    /// Details of every available configuration.
    pub fn configuration_details(&self) -> HashSet<ConfigurationDetails> {
        let mut details = HashSet::new();
        let user = self
            .user_configurations
            .iter()
            .map(|u| u.configuration_details());
        for set in self.providers.iter().map(|p| p.configuration_details()).chain(user) {
            for d in set {
                details.replace(d);
            }
        }
        details
    }

    /// Properties of a configuration.
    pub fn configuration(&self, identifier: &str) -> Result<Properties> {
        if let Some(properties) = self
            .user_configurations
            .as_ref()
            .and_then(|u| u.configuration(identifier))
        {
            return Ok(properties);
        }

        self.owner(identifier)
            .and_then(|provider| provider.configuration(identifier))
            .ok_or_else(|| CatalogError::NotFound {
                identifier: identifier.to_string(),
            })
    }

    pub fn supports_user_configurations(&self) -> bool {
        self.user_configurations.is_some()
    }

    /// Store a new user configuration. `None` without user configurations.
    pub fn add_configuration(
        &self,
        nice_name: &str,
        description: &str,
        properties: Properties,
    ) -> Option<String> {
        self.user_configurations
            .as_ref()?
            .add_configuration(nice_name, description, properties)
    }

    pub fn remove_configuration(&self, identifier: &str) -> bool {
        self.user_configurations
            .as_ref()
            .is_some_and(|u| u.remove_configuration(identifier))
    }

    /// Returns true if the configuration is a user configuration.
    pub fn is_removable(&self, identifier: &str) -> bool {
        self.user_configurations
            .as_ref()
            .is_some_and(|u| u.contains_configuration(identifier))
    }

    fn owner(&self, identifier: &str) -> Option<&Arc<dyn ConfigurationsProvider>> {
        let cached = self
            .owners
            .read()
            .ok()
            .and_then(|owners| owners.get(identifier).copied());
        if let Some(index) = cached {
            return self.providers.get(index);
        }

        let wanted = ConfigurationDetails::builder(identifier).build();
        let mut found = None;
        for (index, provider) in self.providers.iter().enumerate() {
            if provider.configuration_details().contains(&wanted) {
                if let Some(previous) = found.replace(index) {
                    debug!(
                        "Configuration {} of provider {} replaced by provider {}",
                        identifier, previous, index
                    );
                }
            }
        }

        let index = found?;
        debug!("Found provider {} for {}", index, identifier);
        if let Ok(mut owners) = self.owners.write() {
            owners.insert(identifier.to_string(), index);
        }
        self.providers.get(index)
    }
}
