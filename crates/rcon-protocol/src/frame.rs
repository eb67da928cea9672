//! Frame types for the RCON wire format.
//!
//! A frame is one discrete length-prefixed message. On the wire it looks
//! like this (all integers little-endian `i32`):
//!
//! ```text
//! ┌────────┬────────┬────────┬──────────────┬──────┐
//! │ length │   id   │  type  │ body (UTF-8) │ 0 0  │
//! └────────┴────────┴────────┴──────────────┴──────┘
//!            ╰──────────── counted by `length` ────╯
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Limits and reserved ids
// ---------------------------------------------------------------------------

/// Largest `length` field the server will ever send.
pub const MAX_FRAME_LEN: usize = 8192;

/// Smallest valid `length` field: id + type + the two terminator bytes,
/// with an empty body.
pub const MIN_FRAME_LEN: usize = 10;

/// Id of the empty frame written after every command. Its echo marks the
/// end of the command's response.
pub const TERMINATOR_ID: i32 = 100;

/// Id of the authentication frame (and of its successful echo).
pub const AUTH_ID: i32 = 101;

/// Id of the periodic keep-alive frame.
pub const KEEP_ALIVE_ID: i32 = 102;

/// Command ids cycle through `1..=MAX_COMMAND_ID`, well clear of the
/// reserved ids above.
pub const MAX_COMMAND_ID: i32 = 80;

// ---------------------------------------------------------------------------
// PacketType
// ---------------------------------------------------------------------------

/// The `type` field of a frame.
///
/// The server reuses `Command` (2) as its auth-response type, which is why
/// there is no separate variant for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketType {
    /// A fragment of a command response (server → client).
    Response,
    /// An unsolicited log/chat line (server → client).
    ServerPush,
    /// A command (client → server), or an auth response (server → client).
    Command,
    /// Authentication request carrying the password (client → server).
    Auth,
}

impl PacketType {
    /// The on-wire value of this type.
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Response => 0,
            Self::ServerPush => 1,
            Self::Command => 2,
            Self::Auth => 3,
        }
    }

    /// Maps an on-wire value back to a known type.
    ///
    /// Returns `None` for values the client has no meaning for, including
    /// the structurally valid but unused 4 and 5.
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Response),
            1 => Some(Self::ServerPush),
            2 => Some(Self::Command),
            3 => Some(Self::Auth),
            _ => None,
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Response => "RESPONSE",
            Self::ServerPush => "SERVER_PUSH",
            Self::Command => "COMMAND",
            Self::Auth => "AUTH",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// One decoded frame.
///
/// Frames are transient: they exist between the decoder and the router
/// and are also handed to raw-data subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Request id echoed by the server, or a reserved id.
    pub id: i32,
    /// What kind of frame this is.
    pub packet_type: PacketType,
    /// Body text between the header and the terminator.
    pub body: String,
}

impl Frame {
    /// Creates a frame from its parts.
    pub fn new(packet_type: PacketType, id: i32, body: impl Into<String>) -> Self {
        Self {
            id,
            packet_type,
            body: body.into(),
        }
    }

    /// Returns `true` for the empty-body frames the server uses as
    /// response boundaries.
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{} ({} bytes)",
            self.packet_type,
            self.id,
            self.body.len()
        )
    }
}
