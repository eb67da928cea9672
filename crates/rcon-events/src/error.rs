//! Error types for the parsers.

/// A command response that could not be parsed at all.
///
/// Line-oriented outputs never fail: lines that don't match are skipped.
/// Only structured bodies can be malformed.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// `ShowServerInfo` returned something that isn't a JSON object.
    #[error("invalid server info: {0}")]
    ServerInfo(#[from] serde_json::Error),
}
