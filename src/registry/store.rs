//! Service registry implementation
//!
//! The registry is built once at hub startup from a [`ServiceCatalog`] and
//! owned by the gateway control path. A factory that fails only costs its
//! own service; the rest of the catalog still loads.

use std::collections::BTreeMap;

use tokio::sync::mpsc;

use super::error::{SubscribeError, UnsubscribeError};
use super::instance::{ActivationState, ServiceInstance, SubscribeOutcome, UnsubscribeOutcome};
use crate::server::config::HubConfig;
use crate::service::{PublishEvent, ServiceCatalog};
use crate::session::SessionId;

/// All service instances, keyed by name.
pub struct ServiceRegistry {
    services: BTreeMap<String, ServiceInstance>,
    config: HubConfig,
    publish_tx: mpsc::Sender<PublishEvent>,
    shut_down: bool,
}

impl ServiceRegistry {
    /// Instantiate every catalog entry.
    ///
    /// `publish_tx` is the write end of the publish channel; every service
    /// activated later gets a handle cloned from it.
    pub fn build(
        catalog: ServiceCatalog,
        config: HubConfig,
        publish_tx: mpsc::Sender<PublishEvent>,
    ) -> Self {
        let mut services = BTreeMap::new();
        for (name, factory) in catalog {
            match factory() {
                Ok(plugin) => {
                    tracing::info!(service = %name, "Service loaded");
                    services.insert(name.clone(), ServiceInstance::new(name, plugin));
                }
                Err(e) => {
                    tracing::error!(service = %name, error = %e, "Failed to load service, skipping");
                }
            }
        }
        ServiceRegistry {
            services,
            config,
            publish_tx,
            shut_down: false,
        }
    }

    /// Subscribe a session to a named service, activating it if needed.
    pub fn subscribe(
        &mut self,
        service: &str,
        id: SessionId,
    ) -> Result<SubscribeOutcome, SubscribeError> {
        let instance = match self.services.get_mut(service) {
            Some(instance) => instance,
            None => return Err(SubscribeError::UnknownService(service.to_string())),
        };

        match instance.add_subscriber(id, &self.config, &self.publish_tx) {
            Ok(SubscribeOutcome::Added) => {
                tracing::info!(
                    service = %service,
                    client_id = id,
                    subscribers = instance.subscriber_count(),
                    "Subscriber added"
                );
                Ok(SubscribeOutcome::Added)
            }
            Ok(SubscribeOutcome::AlreadySubscribed) => {
                tracing::warn!(service = %service, client_id = id, "Already subscribed");
                Ok(SubscribeOutcome::AlreadySubscribed)
            }
            Err(e) => {
                tracing::error!(service = %service, client_id = id, error = %e, "Service setup failed");
                Err(SubscribeError::SetupFailed {
                    service: service.to_string(),
                    source: e,
                })
            }
        }
    }

    /// Remove a session from a named service, deactivating it when the last
    /// subscriber leaves.
    pub fn unsubscribe(
        &mut self,
        service: &str,
        id: SessionId,
    ) -> Result<UnsubscribeOutcome, UnsubscribeError> {
        let instance = match self.services.get_mut(service) {
            Some(instance) => instance,
            None => return Err(UnsubscribeError::UnknownService(service.to_string())),
        };

        match instance.remove_subscriber(id) {
            UnsubscribeOutcome::Removed => {
                tracing::info!(
                    service = %service,
                    client_id = id,
                    subscribers = instance.subscriber_count(),
                    "Subscriber removed"
                );
                Ok(UnsubscribeOutcome::Removed)
            }
            UnsubscribeOutcome::NotSubscribed => {
                tracing::warn!(service = %service, client_id = id, "Not subscribed");
                Ok(UnsubscribeOutcome::NotSubscribed)
            }
        }
    }

    /// Look up a service instance by name.
    pub fn get(&self, service: &str) -> Option<&ServiceInstance> {
        self.services.get(service)
    }

    /// True when a service with that name exists.
    pub fn contains(&self, service: &str) -> bool {
        self.services.contains_key(service)
    }

    /// Registered service names in sorted order.
    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    /// Number of registered services.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// True when no service loaded.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Deactivate every active service, subscribers or not.
    ///
    /// Waits for each plugin's cleanup to finish. Idempotent, so calling it
    /// again after an accept failure already tore things down is safe.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        tracing::info!("Cleaning up all services");
        for (name, instance) in &mut self.services {
            if instance.state() == ActivationState::Active {
                tracing::info!(
                    service = %name,
                    subscribers = instance.subscriber_count(),
                    "Cleaning up active service"
                );
                instance.shutdown();
            }
        }
        tracing::info!("All services cleaned up");
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.services.keys().collect::<Vec<_>>())
            .field("shut_down", &self.shut_down)
            .finish()
    }
}
