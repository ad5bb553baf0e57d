//! Mutable hub state owned by the control path

use std::collections::HashMap;

use serde_json::Value;

use crate::protocol::{Packet, Payload};
use crate::registry::{
    ServiceRegistry, SubscribeError, SubscribeOutcome, UnsubscribeError, UnsubscribeOutcome,
};
use crate::session::{ClientSession, SessionId};

/// Everything a command handler may read or mutate.
///
/// Owned exclusively by the gateway control path and passed by `&mut` into
/// handlers, which keeps session table and registry membership in step
/// without any locking.
pub struct GatewayState {
    sessions: HashMap<SessionId, ClientSession>,
    registry: ServiceRegistry,
}

impl GatewayState {
    pub(crate) fn new(registry: ServiceRegistry) -> Self {
        GatewayState {
            sessions: HashMap::new(),
            registry,
        }
    }

    pub(crate) fn insert_session(&mut self, session: ClientSession) {
        self.sessions.insert(session.id(), session);
    }

    /// Look up a session by id.
    pub fn session(&self, id: SessionId) -> Option<&ClientSession> {
        self.sessions.get(&id)
    }

    /// Number of connected sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Read access to the service registry.
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Queue a packet to one session. Unknown or disconnected sessions are
    /// ignored; slow ones drop the packet.
    pub fn reply(&mut self, id: SessionId, packet: Packet) {
        if let Some(session) = self.sessions.get_mut(&id) {
            session.send(packet);
        } else {
            tracing::trace!(client_id = id, "Reply to unknown session dropped");
        }
    }

    /// Subscribe a session to a service, keeping both sides of the
    /// bookkeeping in step.
    pub fn subscribe(
        &mut self,
        id: SessionId,
        service: &str,
    ) -> Result<SubscribeOutcome, SubscribeError> {
        let outcome = self.registry.subscribe(service, id)?;
        if outcome == SubscribeOutcome::Added {
            if let Some(session) = self.sessions.get_mut(&id) {
                session.subscribe(service);
            }
        }
        Ok(outcome)
    }

    /// Unsubscribe a session from a service.
    pub fn unsubscribe(
        &mut self,
        id: SessionId,
        service: &str,
    ) -> Result<UnsubscribeOutcome, UnsubscribeError> {
        let outcome = self.registry.unsubscribe(service, id)?;
        if outcome == UnsubscribeOutcome::Removed {
            if let Some(session) = self.sessions.get_mut(&id) {
                session.unsubscribe(service);
            }
        }
        Ok(outcome)
    }

    /// Change a session's username.
    pub fn set_username(&mut self, id: SessionId, username: &str) {
        if let Some(session) = self.sessions.get_mut(&id) {
            let previous = session.username().to_string();
            session.set_username(username);
            tracing::info!(
                client_id = id,
                from = %previous,
                to = %username,
                "Username changed"
            );
        }
    }

    /// Service names the session is subscribed to, sorted.
    pub fn subscriptions(&self, id: SessionId) -> Vec<String> {
        self.sessions
            .get(&id)
            .map(|s| s.subscriptions().iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove a session and release every subscription it held.
    ///
    /// Returns the closed session for the disconnect log.
    pub(crate) fn disconnect(&mut self, id: SessionId) -> Option<ClientSession> {
        let mut session = self.sessions.remove(&id)?;
        for service in session.close() {
            let released = self.registry.unsubscribe(&service, id);
            debug_assert!(matches!(released, Ok(UnsubscribeOutcome::Removed)));
        }
        Some(session)
    }

    /// Fan one batch of published values out to the service's subscribers.
    ///
    /// Returns how many sessions the packet was queued to.
    pub(crate) fn broadcast(&mut self, service: &str, values: Payload) -> usize {
        let instance = match self.registry.get(service) {
            Some(instance) => instance,
            None => {
                tracing::debug!(service = %service, "Publish for unknown service dropped");
                return 0;
            }
        };

        let subscribers = instance.subscriber_snapshot();
        if subscribers.is_empty() {
            return 0;
        }

        let packet = Packet::new("notify_values")
            .field("service", service)
            .field("values", Value::Object(values));

        let mut delivered = 0;
        for id in subscribers {
            if let Some(session) = self.sessions.get_mut(&id) {
                if session.send(packet.clone()) {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Tear down the registry. Sessions drop with the gateway.
    pub(crate) fn shutdown(&mut self) {
        self.registry.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::config::HubConfig;
    use crate::service::{PublishHandle, ServiceCatalog, ServicePlugin, SetupError};
    use serde_json::json;
    use tokio::sync::mpsc;

    struct NullPlugin;

    impl ServicePlugin for NullPlugin {
        fn setup(&mut self, _: &HubConfig, _: PublishHandle) -> Result<(), SetupError> {
            Ok(())
        }

        fn cleanup(&mut self) {}
    }

    fn make_state(services: &[&str]) -> GatewayState {
        let mut catalog = ServiceCatalog::new();
        for name in services {
            catalog.register(*name, || Ok(Box::new(NullPlugin)));
        }
        let (tx, _rx) = mpsc::channel(8);
        GatewayState::new(ServiceRegistry::build(catalog, HubConfig::default(), tx))
    }

    fn attach_session(state: &mut GatewayState, id: SessionId) -> mpsc::Receiver<Packet> {
        let (tx, rx) = mpsc::channel(16);
        let addr = "127.0.0.1:50000".parse().unwrap();
        state.insert_session(ClientSession::new(id, addr, tx));
        rx
    }

    #[test]
    fn test_subscribe_updates_session_and_registry() {
        let mut state = make_state(&["gyroscope"]);
        let _rx = attach_session(&mut state, 1);

        state.subscribe(1, "gyroscope").unwrap();
        assert!(state.session(1).unwrap().is_subscribed("gyroscope"));
        assert!(state.registry().get("gyroscope").unwrap().is_subscribed(1));
    }

    #[test]
    fn test_unsubscribe_updates_both_sides() {
        let mut state = make_state(&["gyroscope"]);
        let _rx = attach_session(&mut state, 1);

        state.subscribe(1, "gyroscope").unwrap();
        state.unsubscribe(1, "gyroscope").unwrap();
        assert!(!state.session(1).unwrap().is_subscribed("gyroscope"));
        assert!(!state.registry().get("gyroscope").unwrap().is_subscribed(1));
    }

    #[test]
    fn test_disconnect_releases_all_subscriptions() {
        let mut state = make_state(&["a", "b"]);
        let _rx = attach_session(&mut state, 1);

        state.subscribe(1, "a").unwrap();
        state.subscribe(1, "b").unwrap();
        let session = state.disconnect(1).unwrap();

        assert!(!session.is_connected());
        assert_eq!(state.session_count(), 0);
        assert_eq!(state.registry().get("a").unwrap().subscriber_count(), 0);
        assert_eq!(state.registry().get("b").unwrap().subscriber_count(), 0);
        assert!(state.disconnect(1).is_none());
    }

    #[test]
    fn test_broadcast_reaches_only_subscribers() {
        let mut state = make_state(&["gyroscope"]);
        let mut rx1 = attach_session(&mut state, 1);
        let mut rx2 = attach_session(&mut state, 2);

        state.subscribe(1, "gyroscope").unwrap();

        let mut values = Payload::new();
        values.insert("x".to_string(), json!(1.5));
        let delivered = state.broadcast("gyroscope", values);

        assert_eq!(delivered, 1);
        let packet = rx1.try_recv().unwrap();
        assert_eq!(packet.event, "notify_values");
        assert_eq!(packet.get_str("service"), Some("gyroscope"));
        assert_eq!(packet.get("values"), Some(&json!({"x": 1.5})));
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_without_subscribers_delivers_nothing() {
        let mut state = make_state(&["gyroscope"]);
        let mut rx = attach_session(&mut state, 1);

        assert_eq!(state.broadcast("gyroscope", Payload::new()), 0);
        assert_eq!(state.broadcast("ghost", Payload::new()), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_reply_to_unknown_session_is_ignored() {
        let mut state = make_state(&[]);
        state.reply(42, Packet::new("ping"));
    }

    #[test]
    fn test_set_username_and_subscriptions() {
        let mut state = make_state(&["a"]);
        let _rx = attach_session(&mut state, 1);

        state.set_username(1, "rover1");
        assert_eq!(state.session(1).unwrap().username(), "rover1");

        state.subscribe(1, "a").unwrap();
        assert_eq!(state.subscriptions(1), vec!["a".to_string()]);
        assert!(state.subscriptions(99).is_empty());
    }
}
