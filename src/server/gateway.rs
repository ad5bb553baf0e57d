//! Connection gateway and control path
//!
//! Accepts TCP connections and runs the hub's single control path. Each
//! connection gets two detached tasks: a reader that turns frames into
//! control events and a writer that drains the session's outbound queue.
//! The control path itself is one `select!` loop over the listener, the
//! event channel and the publish channel; it is the only place that touches
//! [`GatewayState`].

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};

use super::config::HubConfig;
use super::router::CommandRouter;
use super::state::GatewayState;
use crate::error::{Error, Result};
use crate::protocol::{CodecError, Packet, PacketCodec};
use crate::registry::ServiceRegistry;
use crate::service::{PublishEvent, ServiceCatalog};
use crate::session::{ClientSession, SessionId};

/// What the per-connection reader tasks report to the control path.
enum GatewayEvent {
    /// A parsed inbound packet.
    Inbound { id: SessionId, packet: Packet },
    /// The connection ended (EOF, transport error or protocol violation).
    Disconnected { id: SessionId },
}

/// The hub server.
///
/// Bind, optionally register extra commands, then hand the gateway to
/// [`run`](Self::run) or [`run_until`](Self::run_until):
///
/// ```no_run
/// use sensor_hub::{ConnectionGateway, HubConfig, ServiceCatalog};
///
/// #[tokio::main]
/// async fn main() -> sensor_hub::Result<()> {
///     let gateway = ConnectionGateway::bind(HubConfig::default(), ServiceCatalog::builtin()).await?;
///     gateway.run().await
/// }
/// ```
pub struct ConnectionGateway {
    config: HubConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
    state: GatewayState,
    router: CommandRouter,
    events_tx: mpsc::Sender<GatewayEvent>,
    events_rx: mpsc::Receiver<GatewayEvent>,
    publish_rx: mpsc::Receiver<PublishEvent>,
    next_session_id: SessionId,
}

impl ConnectionGateway {
    /// Bind the listener and build the registry from the catalog.
    ///
    /// Plugin factories run here; a factory error skips that service but
    /// does not fail the bind.
    pub async fn bind(config: HubConfig, catalog: ServiceCatalog) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(Error::Bind)?;
        let local_addr = listener.local_addr().map_err(Error::Bind)?;

        let (publish_tx, publish_rx) = mpsc::channel(config.publish_capacity.max(1));
        let (events_tx, events_rx) = mpsc::channel(config.event_capacity.max(1));
        let registry = ServiceRegistry::build(catalog, config.clone(), publish_tx);

        tracing::info!(
            addr = %local_addr,
            services = registry.len(),
            "Hub listening"
        );

        Ok(ConnectionGateway {
            config,
            listener,
            local_addr,
            state: GatewayState::new(registry),
            router: CommandRouter::with_builtins(),
            events_tx,
            events_rx,
            publish_rx,
            next_session_id: 1,
        })
    }

    /// Address the listener actually bound, useful with port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Mutable access to the command router, for registering custom
    /// commands before the gateway runs.
    pub fn router_mut(&mut self) -> &mut CommandRouter {
        &mut self.router
    }

    /// Run the hub until the accept loop fails.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Run the hub until the shutdown future resolves.
    ///
    /// On shutdown the gateway stops accepting, cleans up every active
    /// service (waiting for each plugin), and drops all sessions, which
    /// closes their sockets.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown signal received");
                    break Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((socket, peer_addr)) => self.accept_connection(socket, peer_addr),
                    Err(e) if is_transient_accept_error(&e) => {
                        tracing::warn!(error = %e, "Transient accept failure");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept connection");
                        break Err(Error::Accept(e));
                    }
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event),
                Some(publish) = self.publish_rx.recv() => self.handle_publish(publish),
            }
        };

        // Closing the publish channel first unblocks any worker waiting in
        // publish, so the cleanup joins below cannot deadlock.
        drop(self.publish_rx);
        self.state.shutdown();
        result
    }

    fn accept_connection(&mut self, socket: TcpStream, peer_addr: SocketAddr) {
        if let Err(e) = self.configure_socket(&socket) {
            tracing::error!(peer = %peer_addr, error = %e, "Failed to configure socket");
            return;
        }

        let id = self.next_session_id;
        self.next_session_id += 1;

        tracing::debug!(client_id = id, peer = %peer_addr, "New connection");

        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_capacity.max(1));
        self.state
            .insert_session(ClientSession::new(id, peer_addr, outbound_tx));

        let codec = PacketCodec::new(self.config.max_frame_len);
        let (read_half, write_half) = socket.into_split();
        tokio::spawn(write_loop(
            id,
            FramedWrite::new(write_half, codec.clone()),
            outbound_rx,
        ));
        tokio::spawn(read_loop(
            id,
            FramedRead::new(read_half, codec),
            self.events_tx.clone(),
        ));
    }

    fn configure_socket(&self, socket: &TcpStream) -> io::Result<()> {
        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }

    fn handle_event(&mut self, event: GatewayEvent) {
        // Publishes queued before this event keep their ordering, and a
        // cleanup join triggered below can never wait on a worker blocked
        // against a full publish channel.
        self.drain_pending_publishes();

        match event {
            GatewayEvent::Inbound { id, packet } => {
                if !self.router.dispatch(&mut self.state, id, &packet) {
                    tracing::debug!(client_id = id, event = %packet.event, "Ignoring unknown command");
                }
            }
            GatewayEvent::Disconnected { id } => {
                if let Some(session) = self.state.disconnect(id) {
                    tracing::info!(
                        client = %session,
                        sent = session.packets_sent(),
                        dropped = session.packets_dropped(),
                        duration = ?session.duration(),
                        "Client disconnected"
                    );
                }
            }
        }
    }

    fn drain_pending_publishes(&mut self) {
        while let Ok(publish) = self.publish_rx.try_recv() {
            self.handle_publish(publish);
        }
    }

    fn handle_publish(&mut self, publish: PublishEvent) {
        let delivered = self.state.broadcast(&publish.service, publish.values);
        tracing::debug!(service = %publish.service, delivered = delivered, "Values published");
    }
}

async fn read_loop(
    id: SessionId,
    mut frames: FramedRead<OwnedReadHalf, PacketCodec>,
    events: mpsc::Sender<GatewayEvent>,
) {
    while let Some(result) = frames.next().await {
        match result {
            Ok(packet) => {
                if events
                    .send(GatewayEvent::Inbound { id, packet })
                    .await
                    .is_err()
                {
                    // Control path is gone, nothing left to notify.
                    return;
                }
            }
            Err(CodecError::Io(e)) => {
                tracing::debug!(client_id = id, error = %e, "Read failed");
                break;
            }
            Err(e) => {
                tracing::warn!(client_id = id, error = %e, "Protocol violation, closing connection");
                break;
            }
        }
    }
    let _ = events.send(GatewayEvent::Disconnected { id }).await;
}

async fn write_loop(
    id: SessionId,
    mut frames: FramedWrite<OwnedWriteHalf, PacketCodec>,
    mut outbound: mpsc::Receiver<Packet>,
) {
    while let Some(packet) = outbound.recv().await {
        if let Err(e) = frames.send(packet).await {
            tracing::debug!(client_id = id, error = %e, "Write failed");
            break;
        }
    }
    let _ = frames.close().await;
}

fn is_transient_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
    )
}
