//! Typed game events and command-output parsers for Squad RCON.
//!
//! The server speaks plain text. This crate turns that text into values:
//!
//! - **Push lines** (chat, kicks, bans, squad creation, admin camera) arrive
//!   unsolicited on the push stream. [`parse_push_line`] classifies one line
//!   into a [`GameEvent`], or ignores it.
//! - **Command output** (`ListPlayers`, `ListSquads`, `ShowCurrentMap`,
//!   `ShowNextMap`, `ShowServerInfo`) is parsed by the function matching
//!   the command that produced it. [`parse_command_output`] dispatches on
//!   the command text.
//!
//! Every parser here is a pure function: no I/O and no state that outlives
//! a call. Unrecognised lines are skipped, since the server emits plenty
//! of log noise nobody subscribes to.

mod command;
mod error;
mod identity;
mod push;

pub use command::{
    CommandOutput, MapInfo, Player, ServerInfo, Squad, parse_command_output, parse_current_map,
    parse_list_players, parse_list_squads, parse_next_map, parse_server_info,
};
pub use error::ParseError;
pub use identity::Identities;
pub use push::{
    AdminCamera, ChatChannel, ChatMessage, GameEvent, PlayerBanned, PlayerKicked, PlayerWarned,
    SquadCreated, parse_push_body, parse_push_line, parse_push_line_at,
};
