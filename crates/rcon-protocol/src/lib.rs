//! Wire protocol for the RCON client.
//!
//! This crate defines the bytes that travel between the client and the
//! game server:
//!
//! - **Frames** ([`Frame`], [`PacketType`]): one length-prefixed message.
//! - **Codec** ([`RconCodec`], [`encode`]): how frames are turned into
//!   bytes and how an arbitrarily chunked byte stream is cut back into
//!   frames.
//! - **Errors** ([`ProtocolError`]): what can go wrong while encoding.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and session
//! (command correlation). It doesn't know about sockets or pending
//! commands; it only knows the frame layout.
//!
//! ```text
//! Transport (bytes) → Protocol (Inbound) → Session (responses)
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod error;
mod frame;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::{BadPacket, Inbound, RconCodec, SENTINEL, check_body_len, encode};
pub use error::ProtocolError;
pub use frame::{
    AUTH_ID, Frame, KEEP_ALIVE_ID, MAX_COMMAND_ID, MAX_FRAME_LEN, MIN_FRAME_LEN, PacketType,
    TERMINATOR_ID,
};
