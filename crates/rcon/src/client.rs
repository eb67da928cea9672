//! `RconClient` handle and its builder.
//!
//! This is the entry point for talking to a server. The handle is a thin
//! wrapper around channels into the supervisor task; cloning it is cheap
//! and every clone drives the same connection.

use std::time::Duration;

use rcon_events::{
    MapInfo, Player, ServerInfo, Squad, parse_current_map, parse_list_players, parse_list_squads,
    parse_next_map, parse_server_info,
};
use rcon_protocol::check_body_len;
use rcon_session::{ConnectionState, SessionError};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::config::millis;
use crate::events::{EventCallbacks, RconEvent};
use crate::supervisor::{self, ClientCommand, Status};
use crate::{ClientConfig, RconError};

/// Builder for configuring and starting an [`RconClient`].
///
/// # Example
///
/// ```rust,ignore
/// use rcon::prelude::*;
///
/// let client = RconClient::builder()
///     .host("127.0.0.1")
///     .port(21114)
///     .password("secret")
///     .callbacks(EventCallbacks::new().on_chat(|m| println!("{}", m.message)))
///     .connect()
///     .await?;
/// let players = client.list_players().await?;
/// ```
#[derive(Debug, Default)]
pub struct RconClientBuilder {
    config: ClientConfig,
    callbacks: EventCallbacks,
}

impl RconClientBuilder {
    /// Creates a builder with default settings and no server.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing config.
    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            callbacks: EventCallbacks::default(),
        }
    }

    /// Server hostname or IP address.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// RCON port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// RCON password sent during auth.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = password.into();
        self
    }

    /// Keep-alive interval. `Duration::ZERO` disables keep-alives.
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.config.ping_interval_ms = millis(interval);
        self
    }

    /// Reconnect after an unexpected disconnect.
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.config.auto_reconnect = enabled;
        self
    }

    /// Wait between reconnect attempts.
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.auto_reconnect_delay_ms = millis(delay);
        self
    }

    /// Per-command timeout; `None` waits forever.
    pub fn command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.command_timeout_ms = timeout.map(millis);
        self
    }

    /// Limit on TCP connect plus authentication.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_ms = millis(timeout);
        self
    }

    /// Events buffered per subscriber before it starts lagging.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    /// Handlers called for each event, in addition to subscribers.
    pub fn callbacks(mut self, callbacks: EventCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Starts the client without waiting for it to authenticate.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// Returns [`RconError::Config`] if the config is invalid.
    pub fn spawn(self) -> Result<RconClient, RconError> {
        self.config.validate()?;
        Ok(supervisor::spawn(self.config, self.callbacks))
    }

    /// Starts the client and waits until it is ready for commands.
    ///
    /// With auto-reconnect enabled this keeps retrying until the server
    /// accepts the connection. Without it, the first failure is returned.
    ///
    /// # Errors
    /// Returns [`RconError::Config`] for an invalid config, or the session
    /// error that ended the first attempt.
    pub async fn connect(self) -> Result<RconClient, RconError> {
        let client = self.spawn()?;
        if let Err(e) = client.wait_ready().await {
            let _ = client.close().await;
            return Err(e);
        }
        Ok(client)
    }
}

/// A handle to one RCON connection.
#[derive(Debug, Clone)]
pub struct RconClient {
    commands: mpsc::Sender<ClientCommand>,
    status: watch::Receiver<Status>,
    events: broadcast::Sender<RconEvent>,
}

impl RconClient {
    pub(crate) fn new(
        commands: mpsc::Sender<ClientCommand>,
        status: watch::Receiver<Status>,
        events: broadcast::Sender<RconEvent>,
    ) -> Self {
        Self {
            commands,
            status,
            events,
        }
    }

    /// Creates a new builder.
    pub fn builder() -> RconClientBuilder {
        RconClientBuilder::new()
    }

    /// Shorthand for `RconClientBuilder::from_config(config).connect()`.
    ///
    /// # Errors
    /// See [`RconClientBuilder::connect`].
    pub async fn connect(config: ClientConfig) -> Result<Self, RconError> {
        RconClientBuilder::from_config(config).connect().await
    }

    /// Runs a command and returns its full response text.
    ///
    /// Concurrent calls are answered in the order they were made.
    ///
    /// # Errors
    /// - [`ProtocolError::BodyTooLarge`](rcon_protocol::ProtocolError::BodyTooLarge)
    ///   if the command doesn't fit in a frame.
    /// - [`SessionError::NotConnected`] if the client isn't ready.
    /// - [`SessionError::CommandTimeout`] if no answer arrived in time.
    /// - [`SessionError::ConnectionLost`] if the connection dropped first.
    /// - [`SessionError::ConnectionClosed`] if the client was closed.
    pub async fn execute(&self, command: &str) -> Result<String, RconError> {
        check_body_len(command)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(ClientCommand::Execute {
                command: command.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| SessionError::ConnectionClosed)?;
        let response = reply_rx
            .await
            .map_err(|_| SessionError::ConnectionClosed)??;
        Ok(response.body)
    }

    /// Runs `ListPlayers`.
    pub async fn list_players(&self) -> Result<Vec<Player>, RconError> {
        Ok(parse_list_players(&self.execute("ListPlayers").await?))
    }

    /// Runs `ListSquads`.
    pub async fn list_squads(&self) -> Result<Vec<Squad>, RconError> {
        Ok(parse_list_squads(&self.execute("ListSquads").await?))
    }

    /// Runs `ShowCurrentMap`.
    pub async fn current_map(&self) -> Result<MapInfo, RconError> {
        Ok(parse_current_map(&self.execute("ShowCurrentMap").await?))
    }

    /// Runs `ShowNextMap`.
    pub async fn next_map(&self) -> Result<MapInfo, RconError> {
        Ok(parse_next_map(&self.execute("ShowNextMap").await?))
    }

    /// Runs `ShowServerInfo`.
    pub async fn server_info(&self) -> Result<ServerInfo, RconError> {
        Ok(parse_server_info(&self.execute("ShowServerInfo").await?)?)
    }

    /// Closes the connection and stops reconnecting.
    ///
    /// Pending commands are rejected with [`SessionError::ConnectionClosed`].
    /// Resolves once the socket is closed. Calling it again, from this or
    /// any other clone, is a no-op.
    pub async fn close(&self) -> Result<(), RconError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .commands
            .send(ClientCommand::Close { reply: reply_tx })
            .await
            .is_err()
        {
            // Already shut down.
            return Ok(());
        }
        let _ = reply_rx.await;
        Ok(())
    }

    /// Subscribes to every event from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RconEvent> {
        self.events.subscribe()
    }

    /// The current connection status.
    pub fn status(&self) -> Status {
        self.status.borrow().clone()
    }

    /// Waits until the client is ready for commands.
    ///
    /// # Errors
    /// Returns [`SessionError::ConnectionClosed`] once the client is closed,
    /// or the last session error when the connection dropped and no
    /// reconnect is scheduled.
    pub async fn wait_ready(&self) -> Result<(), RconError> {
        let mut status = self.status.clone();
        loop {
            {
                let current = status.borrow_and_update();
                match current.state {
                    ConnectionState::Ready => return Ok(()),
                    ConnectionState::Closing => return Err(SessionError::ConnectionClosed.into()),
                    ConnectionState::Disconnected if !current.reconnecting => {
                        if let Some(err) = current.last_error.clone() {
                            return Err(err.into());
                        }
                    }
                    _ => {}
                }
            }
            status
                .changed()
                .await
                .map_err(|_| SessionError::ConnectionClosed)?;
        }
    }
}
