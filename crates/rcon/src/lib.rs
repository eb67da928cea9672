//! # rcon
//!
//! Async client for the Squad RCON protocol.
//!
//! The client authenticates, runs text commands and correlates their
//! (often fragmented) responses back to the caller, and turns the
//! server's push stream into typed events. Reconnects and keep-alives are
//! handled in the background.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rcon::prelude::*;
//!
//! # async fn run() -> Result<(), RconError> {
//! let client = RconClient::builder()
//!     .host("127.0.0.1")
//!     .port(21114)
//!     .password("secret")
//!     .connect()
//!     .await?;
//!
//! let mut events = client.subscribe();
//! let map = client.current_map().await?;
//! println!("playing {:?}", map.layer);
//!
//! while let Ok(event) = events.recv().await {
//!     if let RconEvent::Chat(msg) = event {
//!         println!("[{}] {}: {}", msg.channel, msg.player_name, msg.message);
//!     }
//! }
//! client.close().await
//! # }
//! ```
//!
//! ## Layers
//!
//! | Crate            | Role |
//! |------------------|------|
//! | `rcon-protocol`  | frame layout and streaming codec |
//! | `rcon-transport` | TCP plumbing |
//! | `rcon-session`   | response correlation, connection state |
//! | `rcon-heartbeat` | keep-alive timer |
//! | `rcon-events`    | push-line and command-output parsers |
//! | `rcon` (this)    | supervisor task, client handle, events |

mod client;
mod config;
mod error;
mod events;
mod supervisor;

pub use client::{RconClient, RconClientBuilder};
pub use config::ClientConfig;
pub use error::RconError;
pub use events::{EventCallbacks, RconEvent};
pub use supervisor::Status;

pub use rcon_events::{
    AdminCamera, ChatChannel, ChatMessage, CommandOutput, GameEvent, Identities, MapInfo,
    ParseError, Player, PlayerBanned, PlayerKicked, PlayerWarned, ServerInfo, Squad, SquadCreated,
};
pub use rcon_protocol::{Frame, PacketType, ProtocolError};
pub use rcon_session::{ConnectionState, SessionError};
pub use rcon_transport::TransportError;

/// Everything needed for typical use, in one import.
pub mod prelude {
    pub use crate::{
        ChatChannel, ChatMessage, ClientConfig, ConnectionState, EventCallbacks, MapInfo, Player,
        RconClient, RconClientBuilder, RconError, RconEvent, ServerInfo, SessionError, Squad,
        Status,
    };
}
