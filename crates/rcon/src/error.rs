//! Unified error type for the RCON client.

use rcon_events::ParseError;
use rcon_protocol::ProtocolError;
use rcon_session::SessionError;
use rcon_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `rcon` facade you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant generates the `From` impls, so `?` converts
/// sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum RconError {
    /// A socket-level failure (connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame-level failure (oversized body, corrupt stream).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A command or connection outcome (timeout, closed, auth).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A command response that could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The client configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RconError {
    /// The session-level cause, if this is a session error.
    pub fn as_session(&self) -> Option<&SessionError> {
        match self {
            Self::Session(err) => Some(err),
            _ => None,
        }
    }
}
