//! Compile-time service catalog
//!
//! Services are registered by name before the hub starts. Each entry is a
//! factory so a misconfigured plugin can fail at load without taking the
//! other services down with it.

use std::collections::BTreeMap;

use super::{heartbeat::Heartbeat, temperature::BoardTemperature};
use super::{PluginError, ServicePlugin};

/// Constructor for one service plugin.
pub type ServiceFactory = Box<dyn Fn() -> Result<Box<dyn ServicePlugin>, PluginError> + Send>;

/// Named set of service factories the registry is built from.
pub struct ServiceCatalog {
    factories: BTreeMap<String, ServiceFactory>,
}

impl ServiceCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        ServiceCatalog {
            factories: BTreeMap::new(),
        }
    }

    /// Catalog with the services that ship with the hub.
    pub fn builtin() -> Self {
        let mut catalog = ServiceCatalog::new();
        catalog.register("board_temperature", || Ok(Box::new(BoardTemperature::new())));
        catalog.register("heartbeat", || Ok(Box::new(Heartbeat::new())));
        catalog
    }

    /// Register a factory under a service name.
    ///
    /// Names are taken verbatim (they are matched case-sensitively against
    /// `service_name` payload fields). Registering an existing name replaces
    /// the previous factory.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Box<dyn ServicePlugin>, PluginError> + Send + 'static,
    {
        let name = name.into();
        if self.factories.insert(name.clone(), Box::new(factory)).is_some() {
            tracing::debug!(service = %name, "Service factory replaced");
        }
    }

    /// True when a factory is registered under the name.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered service names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Number of registered factories.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// True when no factory is registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Default for ServiceCatalog {
    fn default() -> Self {
        ServiceCatalog::new()
    }
}

impl IntoIterator for ServiceCatalog {
    type Item = (String, ServiceFactory);
    type IntoIter = std::collections::btree_map::IntoIter<String, ServiceFactory>;

    fn into_iter(self) -> Self::IntoIter {
        self.factories.into_iter()
    }
}
