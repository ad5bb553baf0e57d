//! Per-service instance state machine

use std::collections::BTreeSet;
use std::time::Instant;
use tokio::sync::mpsc;

use crate::server::config::HubConfig;
use crate::service::{PublishEvent, PublishHandle, ServicePlugin, SetupError};
use crate::session::SessionId;

/// Lifecycle state of a service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationState {
    /// No subscribers; the plugin is not running.
    Inactive,
    /// At least one subscriber; `setup` has succeeded.
    Active,
}

impl std::fmt::Display for ActivationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivationState::Inactive => write!(f, "inactive"),
            ActivationState::Active => write!(f, "active"),
        }
    }
}

/// Result of a subscribe request that the registry accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// The session is now subscribed.
    Added,
    /// The session was subscribed before the request; nothing changed.
    AlreadySubscribed,
}

/// Result of an unsubscribe request that the registry accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    /// The session is no longer subscribed.
    Removed,
    /// The session was not subscribed; nothing changed.
    NotSubscribed,
}

/// One named service and its subscriber set.
///
/// The instance enforces the activation invariant: `setup` runs exactly when
/// the subscriber count goes 0 -> 1 and `cleanup` exactly when it returns to
/// zero (or at hub shutdown). A failed `setup` leaves the instance inactive
/// with no subscribers, so the next subscribe retries it.
pub struct ServiceInstance {
    name: String,
    plugin: Box<dyn ServicePlugin>,
    subscribers: BTreeSet<SessionId>,
    state: ActivationState,
    activated_at: Option<Instant>,
}

impl ServiceInstance {
    pub(crate) fn new(name: String, plugin: Box<dyn ServicePlugin>) -> Self {
        ServiceInstance {
            name,
            plugin,
            subscribers: BTreeSet::new(),
            state: ActivationState::Inactive,
            activated_at: None,
        }
    }

    /// Registry name of the service.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ActivationState {
        self.state
    }

    /// Number of subscribed sessions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// True when the session is subscribed to this service.
    pub fn is_subscribed(&self, id: SessionId) -> bool {
        self.subscribers.contains(&id)
    }

    /// Subscriber ids at this moment, for fan-out.
    pub fn subscriber_snapshot(&self) -> Vec<SessionId> {
        self.subscribers.iter().copied().collect()
    }

    pub(crate) fn add_subscriber(
        &mut self,
        id: SessionId,
        config: &HubConfig,
        publish_tx: &mpsc::Sender<PublishEvent>,
    ) -> Result<SubscribeOutcome, SetupError> {
        if self.subscribers.contains(&id) {
            return Ok(SubscribeOutcome::AlreadySubscribed);
        }

        if self.state == ActivationState::Inactive {
            tracing::info!(service = %self.name, "Activating service");
            let handle = PublishHandle::new(self.name.clone(), publish_tx.clone());
            self.plugin.setup(config, handle)?;
            self.state = ActivationState::Active;
            self.activated_at = Some(Instant::now());
        }

        self.subscribers.insert(id);
        Ok(SubscribeOutcome::Added)
    }

    pub(crate) fn remove_subscriber(&mut self, id: SessionId) -> UnsubscribeOutcome {
        if !self.subscribers.remove(&id) {
            return UnsubscribeOutcome::NotSubscribed;
        }
        if self.subscribers.is_empty() && self.state == ActivationState::Active {
            self.deactivate();
        }
        UnsubscribeOutcome::Removed
    }

    /// Force the instance down regardless of subscriber count.
    pub(crate) fn shutdown(&mut self) {
        self.subscribers.clear();
        if self.state == ActivationState::Active {
            self.deactivate();
        }
    }

    fn deactivate(&mut self) {
        let active_for = self.activated_at.map(|t| t.elapsed());
        tracing::info!(service = %self.name, active_for = ?active_for, "Deactivating service");
        self.plugin.cleanup();
        self.state = ActivationState::Inactive;
        self.activated_at = None;
    }
}

impl std::fmt::Debug for ServiceInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceInstance")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("subscribers", &self.subscribers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Probe {
        setups: Arc<AtomicUsize>,
        cleanups: Arc<AtomicUsize>,
        fail_setup: Arc<AtomicBool>,
    }

    struct ProbePlugin {
        probe: Probe,
    }

    impl ServicePlugin for ProbePlugin {
        fn setup(&mut self, _: &HubConfig, _: PublishHandle) -> Result<(), SetupError> {
            if self.probe.fail_setup.load(Ordering::SeqCst) {
                return Err(SetupError::new("probe told to fail"));
            }
            self.probe.setups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn cleanup(&mut self) {
            self.probe.cleanups.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn make_instance(probe: &Probe) -> ServiceInstance {
        ServiceInstance::new(
            "probe".to_string(),
            Box::new(ProbePlugin {
                probe: probe.clone(),
            }),
        )
    }

    fn publish_tx() -> mpsc::Sender<PublishEvent> {
        mpsc::channel(4).0
    }

    #[test]
    fn test_first_subscriber_activates() {
        let probe = Probe::default();
        let mut instance = make_instance(&probe);
        let tx = publish_tx();

        assert_eq!(instance.state(), ActivationState::Inactive);
        let outcome = instance
            .add_subscriber(1, &HubConfig::default(), &tx)
            .unwrap();
        assert_eq!(outcome, SubscribeOutcome::Added);
        assert_eq!(instance.state(), ActivationState::Active);
        assert_eq!(probe.setups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_second_subscriber_does_not_reactivate() {
        let probe = Probe::default();
        let mut instance = make_instance(&probe);
        let tx = publish_tx();

        instance.add_subscriber(1, &HubConfig::default(), &tx).unwrap();
        let outcome = instance
            .add_subscriber(2, &HubConfig::default(), &tx)
            .unwrap();
        assert_eq!(outcome, SubscribeOutcome::Added);
        assert_eq!(probe.setups.load(Ordering::SeqCst), 1);
        assert_eq!(instance.subscriber_count(), 2);
    }

    #[test]
    fn test_duplicate_subscribe_is_flagged() {
        let probe = Probe::default();
        let mut instance = make_instance(&probe);
        let tx = publish_tx();

        instance.add_subscriber(1, &HubConfig::default(), &tx).unwrap();
        let outcome = instance
            .add_subscriber(1, &HubConfig::default(), &tx)
            .unwrap();
        assert_eq!(outcome, SubscribeOutcome::AlreadySubscribed);
        assert_eq!(instance.subscriber_count(), 1);
        assert_eq!(probe.setups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_last_unsubscribe_deactivates() {
        let probe = Probe::default();
        let mut instance = make_instance(&probe);
        let tx = publish_tx();

        instance.add_subscriber(1, &HubConfig::default(), &tx).unwrap();
        instance.add_subscriber(2, &HubConfig::default(), &tx).unwrap();

        assert_eq!(instance.remove_subscriber(1), UnsubscribeOutcome::Removed);
        assert_eq!(probe.cleanups.load(Ordering::SeqCst), 0);
        assert_eq!(instance.remove_subscriber(2), UnsubscribeOutcome::Removed);
        assert_eq!(probe.cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(instance.state(), ActivationState::Inactive);
    }

    #[test]
    fn test_unsubscribe_without_subscription_changes_nothing() {
        let probe = Probe::default();
        let mut instance = make_instance(&probe);

        assert_eq!(
            instance.remove_subscriber(9),
            UnsubscribeOutcome::NotSubscribed
        );
        assert_eq!(instance.state(), ActivationState::Inactive);
        assert_eq!(probe.cleanups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_setup_leaves_instance_inactive_and_retryable() {
        let probe = Probe::default();
        probe.fail_setup.store(true, Ordering::SeqCst);
        let mut instance = make_instance(&probe);
        let tx = publish_tx();

        assert!(instance.add_subscriber(1, &HubConfig::default(), &tx).is_err());
        assert_eq!(instance.state(), ActivationState::Inactive);
        assert_eq!(instance.subscriber_count(), 0);

        // Next attempt retries setup and succeeds once the fault clears.
        probe.fail_setup.store(false, Ordering::SeqCst);
        let outcome = instance
            .add_subscriber(1, &HubConfig::default(), &tx)
            .unwrap();
        assert_eq!(outcome, SubscribeOutcome::Added);
        assert_eq!(instance.state(), ActivationState::Active);
    }

    #[test]
    fn test_shutdown_forces_cleanup_with_subscribers_attached() {
        let probe = Probe::default();
        let mut instance = make_instance(&probe);
        let tx = publish_tx();

        instance.add_subscriber(1, &HubConfig::default(), &tx).unwrap();
        instance.add_subscriber(2, &HubConfig::default(), &tx).unwrap();
        instance.shutdown();

        assert_eq!(probe.cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(instance.state(), ActivationState::Inactive);
        assert_eq!(instance.subscriber_count(), 0);

        // Second shutdown is a no-op.
        instance.shutdown();
        assert_eq!(probe.cleanups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscriber_snapshot_is_sorted() {
        let probe = Probe::default();
        let mut instance = make_instance(&probe);
        let tx = publish_tx();

        for id in [5, 1, 3] {
            instance.add_subscriber(id, &HubConfig::default(), &tx).unwrap();
        }
        assert_eq!(instance.subscriber_snapshot(), vec![1, 3, 5]);
        assert!(instance.is_subscribed(3));
        assert!(!instance.is_subscribed(4));
    }
}
