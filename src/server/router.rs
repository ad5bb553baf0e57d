//! Command routing
//!
//! Maps inbound event names to handlers. The four built-in commands cover
//! subscription management; embedders can register more (or replace the
//! built-ins) before starting the gateway. Unknown events are not an error,
//! the gateway just logs and drops them.

use std::collections::HashMap;

use serde_json::Value;

use super::state::GatewayState;
use crate::protocol::Packet;
use crate::registry::{SubscribeOutcome, UnsubscribeOutcome};
use crate::session::SessionId;

/// Handler for one inbound event name.
///
/// Runs on the control path with exclusive access to the hub state; replies
/// go through [`GatewayState::reply`].
pub type CommandHandler = Box<dyn Fn(&mut GatewayState, SessionId, &Packet) + Send>;

/// Event name to handler table.
pub struct CommandRouter {
    handlers: HashMap<String, CommandHandler>,
}

impl CommandRouter {
    /// Router with no handlers at all.
    pub fn new() -> Self {
        CommandRouter {
            handlers: HashMap::new(),
        }
    }

    /// Router with the built-in subscription commands registered:
    /// `subscribe`, `unsubscribe`, `set_username` and `get_subscriptions`.
    pub fn with_builtins() -> Self {
        let mut router = CommandRouter::new();
        router.register("subscribe", on_subscribe);
        router.register("unsubscribe", on_unsubscribe);
        router.register("set_username", on_set_username);
        router.register("get_subscriptions", on_get_subscriptions);
        router
    }

    /// Register a handler for an event name.
    ///
    /// Names are lowercased to match parsed packets. Registering a name
    /// again replaces the previous handler.
    pub fn register<F>(&mut self, event: impl Into<String>, handler: F)
    where
        F: Fn(&mut GatewayState, SessionId, &Packet) + Send + 'static,
    {
        let event = event.into().to_lowercase();
        if self
            .handlers
            .insert(event.clone(), Box::new(handler))
            .is_some()
        {
            tracing::debug!(event = %event, "Command handler replaced");
        }
    }

    /// True when a handler is registered for the event name.
    pub fn handles(&self, event: &str) -> bool {
        self.handlers.contains_key(event)
    }

    /// Dispatch one inbound packet. Returns false when no handler matched.
    pub fn dispatch(&self, state: &mut GatewayState, id: SessionId, packet: &Packet) -> bool {
        match self.handlers.get(&packet.event) {
            Some(handler) => {
                handler(state, id, packet);
                true
            }
            None => false,
        }
    }
}

impl Default for CommandRouter {
    fn default() -> Self {
        CommandRouter::with_builtins()
    }
}

fn on_subscribe(state: &mut GatewayState, id: SessionId, packet: &Packet) {
    let service = match packet.get_str("service_name") {
        Some(service) => service,
        None => {
            tracing::warn!(client_id = id, "Subscribe without service_name");
            let reply =
                Packet::new("subscribe").field("error", "missing \"service_name\" key in packet");
            state.reply(id, reply);
            return;
        }
    };

    // A repeat subscribe changes nothing and is reported like a failure.
    let reply = match state.subscribe(id, service) {
        Ok(SubscribeOutcome::Added) => Packet::new("subscribe").field(
            "message",
            format!("successfully subscribed to service {}", service),
        ),
        Ok(SubscribeOutcome::AlreadySubscribed) | Err(_) => Packet::new("subscribe")
            .field("error", format!("fail to subscribe to service {}", service)),
    };
    state.reply(id, reply);
}

fn on_unsubscribe(state: &mut GatewayState, id: SessionId, packet: &Packet) {
    let service = match packet.get_str("service_name") {
        Some(service) => service,
        None => {
            tracing::warn!(client_id = id, "Unsubscribe without service_name");
            let reply =
                Packet::new("unsubscribe").field("error", "missing \"service_name\" key in packet");
            state.reply(id, reply);
            return;
        }
    };

    let reply = match state.unsubscribe(id, service) {
        Ok(UnsubscribeOutcome::Removed) => Packet::new("unsubscribe").field(
            "message",
            format!("successfully unsubscribed from service {}", service),
        ),
        Ok(UnsubscribeOutcome::NotSubscribed) | Err(_) => Packet::new("unsubscribe").field(
            "error",
            format!("fail to unsubscribe from service {}", service),
        ),
    };
    state.reply(id, reply);
}

fn on_set_username(state: &mut GatewayState, id: SessionId, packet: &Packet) {
    let username = match packet.get_str("username") {
        Some(username) => username,
        None => {
            tracing::warn!(client_id = id, "set_username without username");
            let reply = Packet::new("set_username").field("error", "missing field 'username'");
            state.reply(id, reply);
            return;
        }
    };

    state.set_username(id, username);
    let reply =
        Packet::new("set_username").field("message", format!("username changed to '{}'", username));
    state.reply(id, reply);
}

fn on_get_subscriptions(state: &mut GatewayState, id: SessionId, _packet: &Packet) {
    let subscriptions: Vec<Value> = state
        .subscriptions(id)
        .into_iter()
        .map(Value::String)
        .collect();
    let reply =
        Packet::new("get_subscriptions").field("subscriptions", Value::Array(subscriptions));
    state.reply(id, reply);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ServiceRegistry;
    use crate::server::config::HubConfig;
    use crate::service::{PublishHandle, ServiceCatalog, ServicePlugin, SetupError};
    use crate::session::ClientSession;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    struct NullPlugin {
        fail_setup: bool,
    }

    impl ServicePlugin for NullPlugin {
        fn setup(&mut self, _: &HubConfig, _: PublishHandle) -> Result<(), SetupError> {
            if self.fail_setup {
                return Err(SetupError::new("Refusing to start"));
            }
            Ok(())
        }

        fn cleanup(&mut self) {}
    }

    fn make_state(services: &[(&str, bool)]) -> GatewayState {
        let mut catalog = ServiceCatalog::new();
        for (name, fail_setup) in services {
            let fail = *fail_setup;
            catalog.register(*name, move || Ok(Box::new(NullPlugin { fail_setup: fail })));
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

    fn dispatch_raw(
        router: &CommandRouter,
        state: &mut GatewayState,
        id: SessionId,
        raw: &str,
    ) -> bool {
        router.dispatch(state, id, &Packet::parse(raw).unwrap())
    }

    #[test]
    fn test_unknown_event_is_not_handled() {
        let router = CommandRouter::with_builtins();
        let mut state = make_state(&[]);
        let _rx = attach_session(&mut state, 1);

        assert!(!dispatch_raw(&router, &mut state, 1, r#"{"event": "dance"}"#));
    }

    #[test]
    fn test_subscribe_success_reply() {
        let router = CommandRouter::with_builtins();
        let mut state = make_state(&[("gyroscope", false)]);
        let mut rx = attach_session(&mut state, 1);

        assert!(dispatch_raw(
            &router,
            &mut state,
            1,
            r#"{"event": "subscribe", "payload": {"service_name": "gyroscope"}}"#,
        ));

        let reply = rx.try_recv().unwrap();
        assert_eq!(reply.event, "subscribe");
        assert_eq!(
            reply.get_str("message"),
            Some("successfully subscribed to service gyroscope")
        );
    }

    #[test]
    fn test_subscribe_unknown_service_reply() {
        let router = CommandRouter::with_builtins();
        let mut state = make_state(&[]);
        let mut rx = attach_session(&mut state, 1);

        dispatch_raw(
            &router,
            &mut state,
            1,
            r#"{"event": "subscribe", "payload": {"service_name": "ghost"}}"#,
        );

        let reply = rx.try_recv().unwrap();
        assert_eq!(
            reply.get_str("error"),
            Some("fail to subscribe to service ghost")
        );
    }

    #[test]
    fn test_subscribe_setup_failure_reply() {
        let router = CommandRouter::with_builtins();
        let mut state = make_state(&[("broken", true)]);
        let mut rx = attach_session(&mut state, 1);

        dispatch_raw(
            &router,
            &mut state,
            1,
            r#"{"event": "subscribe", "payload": {"service_name": "broken"}}"#,
        );

        let reply = rx.try_recv().unwrap();
        assert_eq!(
            reply.get_str("error"),
            Some("fail to subscribe to service broken")
        );
        assert!(!state.session(1).unwrap().is_subscribed("broken"));
    }

    #[test]
    fn test_subscribe_missing_service_name_reply() {
        let router = CommandRouter::with_builtins();
        let mut state = make_state(&[]);
        let mut rx = attach_session(&mut state, 1);

        dispatch_raw(&router, &mut state, 1, r#"{"event": "subscribe"}"#);
        let reply = rx.try_recv().unwrap();
        assert_eq!(
            reply.get_str("error"),
            Some("missing \"service_name\" key in packet")
        );

        // A non-string value is treated the same as a missing key.
        dispatch_raw(
            &router,
            &mut state,
            1,
            r#"{"event": "subscribe", "payload": {"service_name": 3}}"#,
        );
        let reply = rx.try_recv().unwrap();
        assert_eq!(
            reply.get_str("error"),
            Some("missing \"service_name\" key in packet")
        );
    }

    #[test]
    fn test_duplicate_subscribe_replies_failure_wording() {
        let router = CommandRouter::with_builtins();
        let mut state = make_state(&[("gyroscope", false)]);
        let mut rx = attach_session(&mut state, 1);

        let raw = r#"{"event": "subscribe", "payload": {"service_name": "gyroscope"}}"#;
        dispatch_raw(&router, &mut state, 1, raw);
        dispatch_raw(&router, &mut state, 1, raw);

        let first = rx.try_recv().unwrap();
        assert_eq!(
            first.get_str("message"),
            Some("successfully subscribed to service gyroscope")
        );
        // The repeat is a benign no-op, reported like a failure.
        let second = rx.try_recv().unwrap();
        assert_eq!(
            second.get_str("error"),
            Some("fail to subscribe to service gyroscope")
        );
        assert!(state.session(1).unwrap().is_subscribed("gyroscope"));
    }

    #[test]
    fn test_unsubscribe_replies() {
        let router = CommandRouter::with_builtins();
        let mut state = make_state(&[("gyroscope", false)]);
        let mut rx = attach_session(&mut state, 1);

        dispatch_raw(
            &router,
            &mut state,
            1,
            r#"{"event": "subscribe", "payload": {"service_name": "gyroscope"}}"#,
        );
        rx.try_recv().unwrap();

        dispatch_raw(
            &router,
            &mut state,
            1,
            r#"{"event": "unsubscribe", "payload": {"service_name": "gyroscope"}}"#,
        );
        let reply = rx.try_recv().unwrap();
        assert_eq!(reply.event, "unsubscribe");
        assert_eq!(
            reply.get_str("message"),
            Some("successfully unsubscribed from service gyroscope")
        );

        // Not subscribed anymore: benign, but reported as a failure.
        dispatch_raw(
            &router,
            &mut state,
            1,
            r#"{"event": "unsubscribe", "payload": {"service_name": "gyroscope"}}"#,
        );
        let reply = rx.try_recv().unwrap();
        assert_eq!(
            reply.get_str("error"),
            Some("fail to unsubscribe from service gyroscope")
        );
    }

    #[test]
    fn test_unsubscribe_missing_service_name_reply() {
        let router = CommandRouter::with_builtins();
        let mut state = make_state(&[]);
        let mut rx = attach_session(&mut state, 1);

        dispatch_raw(&router, &mut state, 1, r#"{"event": "unsubscribe"}"#);
        let reply = rx.try_recv().unwrap();
        assert_eq!(
            reply.get_str("error"),
            Some("missing \"service_name\" key in packet")
        );
    }

    #[test]
    fn test_set_username_replies() {
        let router = CommandRouter::with_builtins();
        let mut state = make_state(&[]);
        let mut rx = attach_session(&mut state, 1);

        dispatch_raw(
            &router,
            &mut state,
            1,
            r#"{"event": "set_username", "payload": {"username": "rover1"}}"#,
        );
        let reply = rx.try_recv().unwrap();
        assert_eq!(
            reply.get_str("message"),
            Some("username changed to 'rover1'")
        );
        assert_eq!(state.session(1).unwrap().username(), "rover1");

        dispatch_raw(&router, &mut state, 1, r#"{"event": "set_username"}"#);
        let reply = rx.try_recv().unwrap();
        assert_eq!(reply.get_str("error"), Some("missing field 'username'"));
        // Username keeps its previous value.
        assert_eq!(state.session(1).unwrap().username(), "rover1");
    }

    #[test]
    fn test_get_subscriptions_reply_lists_sorted_names() {
        let router = CommandRouter::with_builtins();
        let mut state = make_state(&[("b_svc", false), ("a_svc", false)]);
        let mut rx = attach_session(&mut state, 1);

        dispatch_raw(&router, &mut state, 1, r#"{"event": "get_subscriptions"}"#);
        assert_eq!(
            rx.try_recv().unwrap().get("subscriptions"),
            Some(&json!([]))
        );

        for service in ["b_svc", "a_svc"] {
            dispatch_raw(
                &router,
                &mut state,
                1,
                &format!(r#"{{"event": "subscribe", "payload": {{"service_name": "{}"}}}}"#, service),
            );
            rx.try_recv().unwrap();
        }

        dispatch_raw(&router, &mut state, 1, r#"{"event": "get_subscriptions"}"#);
        assert_eq!(
            rx.try_recv().unwrap().get("subscriptions"),
            Some(&json!(["a_svc", "b_svc"]))
        );
    }

    #[test]
    fn test_register_custom_handler_and_case_folding() {
        let mut router = CommandRouter::new();
        let hits = Arc::new(AtomicBool::new(false));
        let hits_clone = hits.clone();
        router.register("Ping", move |state, id, _packet| {
            hits_clone.store(true, Ordering::SeqCst);
            state.reply(id, Packet::new("pong"));
        });

        assert!(router.handles("ping"));
        let mut state = make_state(&[]);
        let mut rx = attach_session(&mut state, 1);

        assert!(dispatch_raw(&router, &mut state, 1, r#"{"event": "PING"}"#));
        assert!(hits.load(Ordering::SeqCst));
        assert_eq!(rx.try_recv().unwrap().event, "pong");
    }

    #[test]
    fn test_register_replaces_existing_handler() {
        let mut router = CommandRouter::with_builtins();
        router.register("subscribe", |state, id, _packet| {
            state.reply(id, Packet::new("subscribe").field("message", "overridden"));
        });

        let mut state = make_state(&[]);
        let mut rx = attach_session(&mut state, 1);
        dispatch_raw(&router, &mut state, 1, r#"{"event": "subscribe"}"#);
        assert_eq!(rx.try_recv().unwrap().get_str("message"), Some("overridden"));
    }
}
