//! The connection supervisor: one Tokio task per client that owns the
//! socket and everything scoped to it.
//!
//! ```text
//!                     ┌──────────────────── Supervisor task ─────────────────────┐
//! RconClient ──mpsc──►│ commands ─► encode ─► socket                              │
//!                     │ socket ─► BytesMut ─► RconCodec ─┬─► Correlator ─► reply  │
//!                     │                                  └─► push parser ─► events│
//!                     │ heartbeat / reconnect / auth / command deadlines (timers) │
//!                     └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything runs in a single `tokio::select!` loop, so no two
//! decode/route steps for the same connection ever overlap and no locks
//! are needed.
//!
//! Lifecycle:
//!
//! ```text
//! Connecting → Authenticating → Ready
//!      ↑              │           │
//!      └─ (delay) ─ Disconnected ◄┘        close() from anywhere → Closing
//! ```
//!
//! A reconnect reuses this task and resets connection-scoped state in
//! place (buffer, correlator, id counter), so subscribers and callbacks
//! stay registered.

use std::future::Future;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use rcon_events::{parse_command_output, parse_push_body};
use rcon_heartbeat::{Heartbeat, HeartbeatConfig};
use rcon_protocol::{
    AUTH_ID, Frame, Inbound, KEEP_ALIVE_ID, PacketType, ProtocolError, RconCodec, TERMINATOR_ID,
    encode,
};
use rcon_session::{
    CommandIds, ConnectionState, Correlator, Response, ResponseSink, SessionError,
};
use rcon_transport::{Connection, Connector, TcpConnection, TcpConnector, TransportError};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{self, Instant};
use tokio_util::codec::{Decoder, Encoder};

use crate::events::{EventBus, EventCallbacks, RconEvent};
use crate::{ClientConfig, RconClient, RconError};

/// Backpressure bound for the command channel.
const COMMAND_CHANNEL_SIZE: usize = 64;

/// Id the server uses on the auth response when the password is wrong.
const AUTH_FAILED_ID: i32 = -1;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// A snapshot of the connection, published on every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// Where the connection currently is.
    pub state: ConnectionState,
    /// Why the last connection attempt or connection ended.
    /// Cleared once authentication succeeds.
    pub last_error: Option<SessionError>,
    /// A reconnect is scheduled.
    pub reconnecting: bool,
}

impl Status {
    fn initial() -> Self {
        Self {
            state: ConnectionState::Connecting,
            last_error: None,
            reconnecting: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Requests from [`RconClient`] handles to the supervisor.
pub(crate) enum ClientCommand {
    /// Run a command; the outcome arrives on `reply`.
    Execute { command: String, reply: ResponseSink },

    /// Shut down. `reply` fires once shutdown is complete.
    Close { reply: oneshot::Sender<()> },
}

type ConnectFuture = Pin<Box<dyn Future<Output = Result<TcpConnection, TransportError>> + Send>>;

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

pub(crate) struct Supervisor {
    config: ClientConfig,
    connector: TcpConnector,
    commands: mpsc::Receiver<ClientCommand>,
    status: watch::Sender<Status>,
    events: EventBus,

    state: ConnectionState,
    last_error: Option<SessionError>,

    /// In-flight TCP connect, if any.
    connecting: Option<ConnectFuture>,
    conn: Option<TcpConnection>,
    /// Bytes received but not yet decoded.
    buffer: BytesMut,
    codec: RconCodec,
    correlator: Correlator,
    ids: CommandIds,
    heartbeat: Heartbeat,

    reconnect_at: Option<Instant>,
    auth_deadline: Option<Instant>,
}

/// Starts a supervisor task and returns a handle to it.
///
/// Must be called from within a Tokio runtime.
pub(crate) fn spawn(config: ClientConfig, callbacks: EventCallbacks) -> RconClient {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
    let (status_tx, status_rx) = watch::channel(Status::initial());
    let (event_tx, _) = broadcast::channel(config.event_capacity);

    let supervisor = Supervisor {
        connector: TcpConnector::new(&config.host, config.port, config.connect_timeout()),
        correlator: Correlator::new(config.command_timeout()),
        heartbeat: Heartbeat::new(HeartbeatConfig::with_interval(config.ping_interval())),
        config,
        commands: command_rx,
        status: status_tx,
        events: EventBus::new(event_tx.clone(), callbacks),
        state: ConnectionState::Connecting,
        last_error: None,
        connecting: None,
        conn: None,
        buffer: BytesMut::new(),
        codec: RconCodec::new(),
        ids: CommandIds::new(),
        reconnect_at: None,
        auth_deadline: None,
    };

    tracing::debug!(addr = %supervisor.config.addr(), config = ?supervisor.config, "spawning supervisor");
    tokio::spawn(supervisor.run());

    RconClient::new(command_tx, status_rx, event_tx)
}

impl Supervisor {
    /// Runs until the client is closed or every handle is dropped.
    async fn run(mut self) {
        tracing::info!(addr = %self.connector.addr(), "rcon supervisor started");
        self.start_connect();

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(ClientCommand::Execute { command, reply }) => {
                        self.execute(command, reply).await;
                    }
                    Some(ClientCommand::Close { reply }) => {
                        self.shutdown().await;
                        let _ = reply.send(());
                        break;
                    }
                    None => {
                        tracing::debug!("all client handles dropped");
                        self.shutdown().await;
                        break;
                    }
                },
                result = finish_connect(&mut self.connecting) => {
                    self.connecting = None;
                    self.on_socket(result).await;
                }
                chunk = next_chunk(self.conn.as_ref()) => match chunk {
                    Ok(Some(bytes)) => self.on_data(&bytes).await,
                    Ok(None) => {
                        let reason = SessionError::ConnectionLost("server closed the connection".into());
                        self.on_disconnect(reason).await;
                    }
                    Err(e) => {
                        let reason = SessionError::ConnectionLost(e.to_string());
                        self.events.publish(RconError::from(e));
                        self.on_disconnect(reason).await;
                    }
                },
                beat = self.heartbeat.wait_for_beat() => {
                    tracing::trace!(beat = beat.beat, "sending keep-alive");
                    self.ping().await;
                }
                () = sleep_until(self.reconnect_at) => {
                    self.reconnect_at = None;
                    self.start_connect();
                }
                () = sleep_until(self.auth_deadline) => {
                    self.auth_deadline = None;
                    tracing::warn!(addr = %self.connector.addr(), "authentication timed out");
                    self.events.publish(RconError::from(SessionError::AuthenticationTimeout));
                    self.on_disconnect(SessionError::AuthenticationTimeout).await;
                }
                () = sleep_until(self.correlator.next_deadline()) => {
                    self.correlator.expire(Instant::now());
                }
            }
        }

        tracing::info!(addr = %self.connector.addr(), "rcon supervisor stopped");
    }

    // -- Connection lifecycle ---------------------------------------------

    fn start_connect(&mut self) {
        tracing::debug!(addr = %self.connector.addr(), "connecting");
        let connector = self.connector.clone();
        self.connecting = Some(Box::pin(async move { connector.connect().await }));
        self.state = ConnectionState::Connecting;
        self.publish_status();
    }

    /// The TCP connect finished; send the auth request.
    async fn on_socket(&mut self, result: Result<TcpConnection, TransportError>) {
        let conn = match result {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "connect failed");
                let reason = SessionError::ConnectionLost(e.to_string());
                self.events.publish(RconError::from(e));
                self.on_disconnect(reason).await;
                return;
            }
        };

        tracing::info!(peer = %conn.peer_addr(), id = %conn.id(), "connected, authenticating");
        self.conn = Some(conn);
        self.buffer.clear();
        self.state = ConnectionState::Authenticating;
        self.auth_deadline = Some(Instant::now() + self.config.connect_timeout());
        self.publish_status();

        let sent = match encode(PacketType::Auth, AUTH_ID, &self.config.password) {
            Ok(bytes) => send(self.conn.as_ref(), &bytes).await.map_err(RconError::from),
            Err(e) => Err(RconError::from(e)),
        };
        if let Err(e) = sent {
            let reason = SessionError::ConnectionLost(e.to_string());
            self.events.publish(e);
            self.on_disconnect(reason).await;
        }
    }

    fn on_ready(&mut self) {
        self.auth_deadline = None;
        self.state = ConnectionState::Ready;
        self.last_error = None;
        self.heartbeat.resume();
        if self.heartbeat.is_enabled() {
            tracing::info!(
                addr = %self.connector.addr(),
                keep_alive = ?self.heartbeat.interval(),
                "authenticated"
            );
        } else {
            tracing::info!(addr = %self.connector.addr(), "authenticated, keep-alive disabled");
        }
        self.publish_status();
        self.events.publish(RconEvent::Connected);
    }

    /// Tears down the current connection and, if enabled, schedules a
    /// reconnect.
    async fn on_disconnect(&mut self, reason: SessionError) {
        if self.state.is_terminal() {
            return;
        }

        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                tracing::debug!(error = %e, "error while closing socket");
            }
        }
        self.connecting = None;
        self.auth_deadline = None;
        self.buffer.clear();
        tracing::debug!(
            pending = self.correlator.in_flight(),
            keep_alives = self.heartbeat.beat_count(),
            "tearing down connection"
        );
        let lost = match &reason {
            SessionError::ConnectionLost(_) => reason.clone(),
            other => SessionError::ConnectionLost(other.to_string()),
        };
        self.correlator.fail_all(lost);
        self.ids.reset();
        self.heartbeat.pause();

        self.state = ConnectionState::Disconnected;
        self.last_error = Some(reason.clone());

        if self.config.auto_reconnect {
            let delay = self.config.reconnect_delay();
            self.reconnect_at = Some(Instant::now() + delay);
            tracing::warn!(%reason, ?delay, "disconnected, will reconnect");
        } else {
            tracing::warn!(%reason, "disconnected");
        }

        self.publish_status();
        self.events.publish(RconEvent::Disconnected {
            reason: reason.to_string(),
        });
    }

    /// Final shutdown. Rejects everything still pending or queued.
    async fn shutdown(&mut self) {
        tracing::info!(addr = %self.connector.addr(), "closing");
        self.state = ConnectionState::Closing;
        self.reconnect_at = None;
        self.auth_deadline = None;
        self.connecting = None;
        self.heartbeat.pause();
        self.correlator.fail_all(SessionError::ConnectionClosed);
        self.buffer.clear();

        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                tracing::debug!(error = %e, "error while closing socket");
            }
        }

        self.publish_status();
        self.events.publish(RconEvent::Disconnected {
            reason: SessionError::ConnectionClosed.to_string(),
        });

        // Nothing sent after this point will be accepted.
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            match command {
                ClientCommand::Execute { reply, .. } => {
                    let _ = reply.send(Err(SessionError::ConnectionClosed));
                }
                ClientCommand::Close { reply } => {
                    let _ = reply.send(());
                }
            }
        }
    }

    // -- Outbound ---------------------------------------------------------

    async fn execute(&mut self, command: String, reply: ResponseSink) {
        match self.state {
            ConnectionState::Ready => {}
            ConnectionState::Closing => {
                let _ = reply.send(Err(SessionError::ConnectionClosed));
                return;
            }
            _ => {
                let _ = reply.send(Err(SessionError::NotConnected));
                return;
            }
        }

        // The command and its terminator go out in one write.
        let id = self.ids.next_id();
        let mut bytes = BytesMut::new();
        let encoded = self
            .codec
            .encode(Frame::new(PacketType::Command, id, command.as_str()), &mut bytes)
            .and_then(|()| {
                self.codec
                    .encode(Frame::new(PacketType::Command, TERMINATOR_ID, ""), &mut bytes)
            });
        if let Err(e) = encoded {
            let _ = reply.send(Err(SessionError::InvalidCommand(e.to_string())));
            return;
        }

        self.correlator.enqueue(id, command, reply);
        tracing::debug!(id, in_flight = self.correlator.in_flight(), "sending command");

        if let Err(e) = send(self.conn.as_ref(), &bytes).await {
            let reason = SessionError::ConnectionLost(e.to_string());
            self.events.publish(RconError::from(e));
            self.on_disconnect(reason).await;
        }
    }

    async fn ping(&mut self) {
        if !self.state.is_ready() {
            return;
        }
        let sent = match encode(PacketType::Command, KEEP_ALIVE_ID, "") {
            Ok(bytes) => send(self.conn.as_ref(), &bytes).await,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode keep-alive");
                return;
            }
        };
        if let Err(e) = sent {
            let reason = SessionError::ConnectionLost(e.to_string());
            self.events.publish(RconError::from(e));
            self.on_disconnect(reason).await;
        }
    }

    // -- Inbound ----------------------------------------------------------

    async fn on_data(&mut self, bytes: &Bytes) {
        self.buffer.extend_from_slice(bytes);

        // A single read may carry many frames, or none.
        while self.conn.is_some() {
            let item = match self.codec.decode(&mut self.buffer) {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(e) => {
                    self.buffer.clear();
                    self.events.publish(RconError::from(e));
                    break;
                }
            };

            match item {
                Inbound::Frame(frame) => self.route(frame).await,
                Inbound::Sentinel => {
                    if let Some(response) = self.correlator.on_sentinel() {
                        self.publish_output(&response);
                    }
                }
                Inbound::BadPacket(reason) => {
                    self.correlator.on_bad_packet();
                    self.events.publish(RconError::from(ProtocolError::BadPacket(reason)));
                }
            }
        }
    }

    async fn route(&mut self, frame: Frame) {
        tracing::debug!(id = frame.id, kind = %frame.packet_type, len = frame.body.len(), "frame");
        self.events.publish(RconEvent::Data(frame.clone()));

        match frame.packet_type {
            PacketType::Response => match self.correlator.on_response(frame.id, &frame.body) {
                Ok(Some(response)) => self.publish_output(&response),
                Ok(None) => {}
                Err(e) => self.events.publish(RconError::from(e)),
            },
            PacketType::ServerPush => {
                for event in parse_push_body(&frame.body) {
                    self.events.publish(event);
                }
            }
            PacketType::Command => self.on_auth_response(frame.id).await,
            PacketType::Auth => {
                tracing::debug!(id = frame.id, "ignoring auth request from server");
            }
        }
    }

    async fn on_auth_response(&mut self, id: i32) {
        if self.state != ConnectionState::Authenticating {
            tracing::debug!(id, state = %self.state, "unexpected auth response");
            return;
        }
        match id {
            AUTH_ID => self.on_ready(),
            AUTH_FAILED_ID => {
                tracing::warn!(addr = %self.connector.addr(), "authentication failed");
                self.events.publish(RconError::from(SessionError::AuthenticationFailed));
                self.on_disconnect(SessionError::AuthenticationFailed).await;
            }
            other => tracing::debug!(id = other, "auth response with unknown id"),
        }
    }

    fn publish_output(&self, response: &Response) {
        match parse_command_output(&response.command, &response.body) {
            Ok(Some(output)) => self.events.publish(output),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(command = %response.command, error = %e, "unparseable command output");
                self.events.publish(RconError::from(e));
            }
        }
    }

    fn publish_status(&self) {
        self.status.send_replace(Status {
            state: self.state,
            last_error: self.last_error.clone(),
            reconnecting: self.reconnect_at.is_some(),
        });
    }
}

// ---------------------------------------------------------------------------
// select! helpers
// ---------------------------------------------------------------------------

// The waiting helpers pend forever when their resource is absent, which
// disables the corresponding `select!` branch.

async fn finish_connect(
    connecting: &mut Option<ConnectFuture>,
) -> Result<TcpConnection, TransportError> {
    match connecting {
        Some(fut) => fut.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn next_chunk(conn: Option<&TcpConnection>) -> Result<Option<Bytes>, TransportError> {
    match conn {
        Some(conn) => conn.recv().await,
        None => std::future::pending().await,
    }
}

async fn send(conn: Option<&TcpConnection>, bytes: &[u8]) -> Result<(), TransportError> {
    match conn {
        Some(conn) => conn.send(bytes).await,
        None => Err(TransportError::ConnectionClosed("no open connection".into())),
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
