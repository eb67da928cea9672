//! Error types for the session layer.

/// Errors that end a single command or a connection attempt.
///
/// These are `Clone` because one connection loss fans out to every
/// pending command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// A command was issued while the connection was not `Ready`.
    #[error("not connected")]
    NotConnected,

    /// No terminating response arrived within the command timeout.
    #[error("command timed out")]
    CommandTimeout,

    /// The client was closed; pending work was cancelled.
    #[error("connection closed")]
    ConnectionClosed,

    /// The socket failed or the server went away.
    /// Commands in flight at that moment have to be re-submitted.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The inbound stream failed structural validation and was reset.
    #[error("protocol desync")]
    ProtocolDesync,

    /// The server rejected the password.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// The server never answered the auth request.
    #[error("authentication timed out")]
    AuthenticationTimeout,

    /// The command could not be encoded.
    #[error("invalid command: {0}")]
    InvalidCommand(String),
}
