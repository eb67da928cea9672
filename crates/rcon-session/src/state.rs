//! The connection lifecycle state machine.

use std::fmt;

/// Where a client's connection currently is in its lifecycle.
///
/// ```text
///   Disconnected ──connect()──→ Connecting ──socket up──→ Authenticating
///        ↑                                                     │
///        │                                           auth echo │
///        └──────────(error / close / auth failure)──── Ready ←─┘
///
///   any state ──close()──→ Closing   (terminal)
/// ```
///
/// Only the supervisor mutates this; everyone else observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No socket. A reconnect may be scheduled.
    #[default]
    Disconnected,

    /// TCP connect in progress.
    Connecting,

    /// Socket up, auth frame sent, waiting for the echo.
    Authenticating,

    /// Authenticated; commands may be executed.
    Ready,

    /// `close()` was requested. Nothing reconnects from here.
    Closing,
}

impl ConnectionState {
    /// Returns `true` if commands may be issued.
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Returns `true` once the client has been closed.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closing)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Ready => "ready",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}
