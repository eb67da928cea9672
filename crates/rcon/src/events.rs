//! Event delivery: the broadcast channel and per-type callbacks.
//!
//! Every event the supervisor produces goes through one [`EventBus`] per
//! client. Subscribers get it two ways:
//!
//! - [`RconClient::subscribe`](crate::RconClient::subscribe) hands out a
//!   `broadcast::Receiver<RconEvent>` that sees every event.
//! - [`EventCallbacks`] registered at build time are called synchronously
//!   on the supervisor task, one optional handler per event type.
//!
//! Callbacks run inside the connection loop. Keep them short; anything
//! slow belongs behind a subscriber instead.

use std::fmt;
use std::sync::Arc;

use rcon_events::{
    AdminCamera, ChatMessage, CommandOutput, GameEvent, MapInfo, Player, PlayerBanned,
    PlayerKicked, PlayerWarned, ServerInfo, Squad, SquadCreated,
};
use rcon_protocol::Frame;
use tokio::sync::broadcast;

use crate::RconError;

// ---------------------------------------------------------------------------
// RconEvent
// ---------------------------------------------------------------------------

/// Everything a client can observe.
#[derive(Debug, Clone)]
pub enum RconEvent {
    /// Authentication succeeded; commands can be issued.
    Connected,
    /// The connection ended. Emitted on every drop and once on close.
    Disconnected { reason: String },
    /// Something went wrong. Informational; recovery is automatic.
    Error(Arc<RconError>),
    /// A raw frame, before routing.
    Data(Frame),

    Chat(ChatMessage),
    AdminCameraPossessed(AdminCamera),
    AdminCameraUnpossessed(AdminCamera),
    PlayerWarned(PlayerWarned),
    PlayerKicked(PlayerKicked),
    PlayerBanned(PlayerBanned),
    SquadCreated(SquadCreated),

    PlayersListed(Vec<Player>),
    SquadsListed(Vec<Squad>),
    CurrentMap(MapInfo),
    NextMap(MapInfo),
    ServerInfo(ServerInfo),
}

impl From<GameEvent> for RconEvent {
    fn from(event: GameEvent) -> Self {
        match event {
            GameEvent::Chat(e) => Self::Chat(e),
            GameEvent::AdminCameraPossessed(e) => Self::AdminCameraPossessed(e),
            GameEvent::AdminCameraUnpossessed(e) => Self::AdminCameraUnpossessed(e),
            GameEvent::PlayerWarned(e) => Self::PlayerWarned(e),
            GameEvent::PlayerKicked(e) => Self::PlayerKicked(e),
            GameEvent::PlayerBanned(e) => Self::PlayerBanned(e),
            GameEvent::SquadCreated(e) => Self::SquadCreated(e),
        }
    }
}

impl From<CommandOutput> for RconEvent {
    fn from(output: CommandOutput) -> Self {
        match output {
            CommandOutput::Players(p) => Self::PlayersListed(p),
            CommandOutput::Squads(s) => Self::SquadsListed(s),
            CommandOutput::CurrentMap(m) => Self::CurrentMap(m),
            CommandOutput::NextMap(m) => Self::NextMap(m),
            CommandOutput::ServerInfo(i) => Self::ServerInfo(i),
        }
    }
}

impl From<RconError> for RconEvent {
    fn from(err: RconError) -> Self {
        Self::Error(Arc::new(err))
    }
}

// ---------------------------------------------------------------------------
// EventCallbacks
// ---------------------------------------------------------------------------

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Optional handlers, one per event type.
///
/// Built fluently and handed to
/// [`RconClientBuilder::callbacks`](crate::RconClientBuilder::callbacks):
///
/// ```rust,ignore
/// let callbacks = EventCallbacks::new()
///     .on_chat(|msg| println!("{}: {}", msg.player_name, msg.message))
///     .on_disconnected(|reason| eprintln!("lost connection: {reason}"));
/// ```
#[derive(Clone, Default)]
pub struct EventCallbacks {
    any: Option<Callback<RconEvent>>,
    connected: Option<Callback<()>>,
    disconnected: Option<Callback<String>>,
    error: Option<Callback<RconError>>,
    data: Option<Callback<Frame>>,
    chat: Option<Callback<ChatMessage>>,
    admin_camera_possessed: Option<Callback<AdminCamera>>,
    admin_camera_unpossessed: Option<Callback<AdminCamera>>,
    player_warned: Option<Callback<PlayerWarned>>,
    player_kicked: Option<Callback<PlayerKicked>>,
    player_banned: Option<Callback<PlayerBanned>>,
    squad_created: Option<Callback<SquadCreated>>,
    players_listed: Option<Callback<Vec<Player>>>,
    squads_listed: Option<Callback<Vec<Squad>>>,
    current_map: Option<Callback<MapInfo>>,
    next_map: Option<Callback<MapInfo>>,
    server_info: Option<Callback<ServerInfo>>,
}

impl EventCallbacks {
    /// No handlers registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called for every event, before the type-specific handler.
    pub fn on_event(mut self, f: impl Fn(&RconEvent) + Send + Sync + 'static) -> Self {
        self.any = Some(Arc::new(f));
        self
    }

    /// Called once the connection is authenticated.
    pub fn on_connected(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.connected = Some(Arc::new(move |_: &()| f()));
        self
    }

    /// Receives the disconnect reason.
    pub fn on_disconnected(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.disconnected = Some(Arc::new(move |reason: &String| f(reason.as_str())));
        self
    }

    /// Non-fatal errors such as bad packets.
    pub fn on_error(mut self, f: impl Fn(&RconError) + Send + Sync + 'static) -> Self {
        self.error = Some(Arc::new(f));
        self
    }

    /// Every decoded frame, before correlation.
    pub fn on_data(mut self, f: impl Fn(&Frame) + Send + Sync + 'static) -> Self {
        self.data = Some(Arc::new(f));
        self
    }

    /// Chat messages.
    pub fn on_chat(mut self, f: impl Fn(&ChatMessage) + Send + Sync + 'static) -> Self {
        self.chat = Some(Arc::new(f));
        self
    }

    /// An admin entered the admin camera.
    pub fn on_admin_camera_possessed(
        mut self,
        f: impl Fn(&AdminCamera) + Send + Sync + 'static,
    ) -> Self {
        self.admin_camera_possessed = Some(Arc::new(f));
        self
    }

    /// An admin left the admin camera.
    pub fn on_admin_camera_unpossessed(
        mut self,
        f: impl Fn(&AdminCamera) + Send + Sync + 'static,
    ) -> Self {
        self.admin_camera_unpossessed = Some(Arc::new(f));
        self
    }

    /// Player warnings.
    pub fn on_player_warned(mut self, f: impl Fn(&PlayerWarned) + Send + Sync + 'static) -> Self {
        self.player_warned = Some(Arc::new(f));
        self
    }

    /// Player kicks.
    pub fn on_player_kicked(mut self, f: impl Fn(&PlayerKicked) + Send + Sync + 'static) -> Self {
        self.player_kicked = Some(Arc::new(f));
        self
    }

    /// Player bans.
    pub fn on_player_banned(mut self, f: impl Fn(&PlayerBanned) + Send + Sync + 'static) -> Self {
        self.player_banned = Some(Arc::new(f));
        self
    }

    /// Squad creation.
    pub fn on_squad_created(mut self, f: impl Fn(&SquadCreated) + Send + Sync + 'static) -> Self {
        self.squad_created = Some(Arc::new(f));
        self
    }

    /// Parsed output of `ListPlayers`.
    pub fn on_players_listed(mut self, f: impl Fn(&Vec<Player>) + Send + Sync + 'static) -> Self {
        self.players_listed = Some(Arc::new(f));
        self
    }

    /// Parsed output of `ListSquads`.
    pub fn on_squads_listed(mut self, f: impl Fn(&Vec<Squad>) + Send + Sync + 'static) -> Self {
        self.squads_listed = Some(Arc::new(f));
        self
    }

    /// Parsed output of `ShowCurrentMap`.
    pub fn on_current_map(mut self, f: impl Fn(&MapInfo) + Send + Sync + 'static) -> Self {
        self.current_map = Some(Arc::new(f));
        self
    }

    /// Parsed output of `ShowNextMap`.
    pub fn on_next_map(mut self, f: impl Fn(&MapInfo) + Send + Sync + 'static) -> Self {
        self.next_map = Some(Arc::new(f));
        self
    }

    /// Parsed output of `ShowServerInfo`.
    pub fn on_server_info(mut self, f: impl Fn(&ServerInfo) + Send + Sync + 'static) -> Self {
        self.server_info = Some(Arc::new(f));
        self
    }

    /// Calls the handlers registered for `event`.
    pub(crate) fn dispatch(&self, event: &RconEvent) {
        invoke(&self.any, event);
        match event {
            RconEvent::Connected => invoke(&self.connected, &()),
            RconEvent::Disconnected { reason } => invoke(&self.disconnected, reason),
            RconEvent::Error(err) => invoke(&self.error, err.as_ref()),
            RconEvent::Data(frame) => invoke(&self.data, frame),
            RconEvent::Chat(e) => invoke(&self.chat, e),
            RconEvent::AdminCameraPossessed(e) => invoke(&self.admin_camera_possessed, e),
            RconEvent::AdminCameraUnpossessed(e) => invoke(&self.admin_camera_unpossessed, e),
            RconEvent::PlayerWarned(e) => invoke(&self.player_warned, e),
            RconEvent::PlayerKicked(e) => invoke(&self.player_kicked, e),
            RconEvent::PlayerBanned(e) => invoke(&self.player_banned, e),
            RconEvent::SquadCreated(e) => invoke(&self.squad_created, e),
            RconEvent::PlayersListed(p) => invoke(&self.players_listed, p),
            RconEvent::SquadsListed(s) => invoke(&self.squads_listed, s),
            RconEvent::CurrentMap(m) => invoke(&self.current_map, m),
            RconEvent::NextMap(m) => invoke(&self.next_map, m),
            RconEvent::ServerInfo(i) => invoke(&self.server_info, i),
        }
    }
}

fn invoke<T>(callback: &Option<Callback<T>>, value: &T) {
    if let Some(callback) = callback {
        callback(value);
    }
}

impl fmt::Debug for EventCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventCallbacks").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Fans each event out to the callbacks and the broadcast channel.
pub(crate) struct EventBus {
    sender: broadcast::Sender<RconEvent>,
    callbacks: EventCallbacks,
}

impl EventBus {
    pub(crate) fn new(sender: broadcast::Sender<RconEvent>, callbacks: EventCallbacks) -> Self {
        Self { sender, callbacks }
    }

    pub(crate) fn publish(&self, event: impl Into<RconEvent>) {
        let event = event.into();
        self.callbacks.dispatch(&event);
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use rcon_session::SessionError;

    use super::*;

    fn chat() -> ChatMessage {
        match rcon_events::parse_push_line("[ChatAll] [SteamID:76561197960287930] A : hi") {
            Some(GameEvent::Chat(message)) => message,
            other => panic!("expected chat, got {other:?}"),
        }
    }

    #[test]
    fn test_dispatch_calls_matching_handler_only() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let chats = Arc::clone(&seen);
        let kicks = Arc::clone(&seen);
        let callbacks = EventCallbacks::new()
            .on_chat(move |m| chats.lock().unwrap().push(format!("chat:{}", m.message)))
            .on_player_kicked(move |k| kicks.lock().unwrap().push(format!("kick:{}", k.player_name)));

        callbacks.dispatch(&RconEvent::Chat(chat()));
        callbacks.dispatch(&RconEvent::Connected);

        assert_eq!(*seen.lock().unwrap(), vec!["chat:hi".to_string()]);
    }

    #[test]
    fn test_on_event_sees_everything() {
        let count = Arc::new(Mutex::new(0));
        let c = Arc::clone(&count);
        let callbacks = EventCallbacks::new().on_event(move |_| *c.lock().unwrap() += 1);

        callbacks.dispatch(&RconEvent::Connected);
        callbacks.dispatch(&RconEvent::Disconnected {
            reason: "x".into(),
        });
        callbacks.dispatch(&RconEvent::NextMap(MapInfo::default()));

        assert_eq!(*count.lock().unwrap(), 3);
    }

    #[test]
    fn test_lifecycle_callbacks() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (a, b, c) = (Arc::clone(&log), Arc::clone(&log), Arc::clone(&log));
        let callbacks = EventCallbacks::new()
            .on_connected(move || a.lock().unwrap().push("connected".to_string()))
            .on_disconnected(move |r| b.lock().unwrap().push(format!("disconnected:{r}")))
            .on_error(move |e| c.lock().unwrap().push(format!("error:{e}")));

        callbacks.dispatch(&RconEvent::Connected);
        callbacks.dispatch(&RconEvent::Disconnected {
            reason: "bye".into(),
        });
        callbacks.dispatch(&RconError::from(SessionError::ProtocolDesync).into());

        assert_eq!(
            *log.lock().unwrap(),
            vec!["connected", "disconnected:bye", "error:protocol desync"]
        );
    }

    #[test]
    fn test_command_output_maps_to_event() {
        let event: RconEvent = CommandOutput::Players(Vec::new()).into();
        assert!(matches!(event, RconEvent::PlayersListed(p) if p.is_empty()));
    }

    #[tokio::test]
    async fn test_bus_publishes_to_subscribers() {
        let (tx, mut rx) = broadcast::channel(8);
        let bus = EventBus::new(tx, EventCallbacks::new());

        bus.publish(RconEvent::Connected);
        assert!(matches!(rx.recv().await, Ok(RconEvent::Connected)));
    }

    #[test]
    fn test_bus_without_subscribers_does_not_panic() {
        let (tx, rx) = broadcast::channel(8);
        drop(rx);
        let bus = EventBus::new(tx, EventCallbacks::new());
        bus.publish(RconEvent::Connected);
    }
}
