//! Error types for the protocol layer.
//!
//! Each crate in the workspace defines its own error enum. When you see a
//! `ProtocolError`, you know the problem is in the frame layout, not in
//! networking or command correlation.
//!
//! Note that the decoder never *returns* a corrupt stream as an error: it
//! yields [`Inbound::BadPacket`](crate::Inbound::BadPacket) so the stream
//! keeps flowing after the buffer reset. [`ProtocolError::BadPacket`] exists
//! so callers can report that condition through the usual error channels.

use crate::BadPacket;

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The body would produce a frame longer than the server accepts.
    ///
    /// `len` is the frame length the body would need (everything after
    /// the length prefix), `max` is [`MAX_FRAME_LEN`](crate::MAX_FRAME_LEN).
    #[error("frame length {len} exceeds maximum of {max} bytes")]
    BodyTooLarge { len: usize, max: usize },

    /// An I/O error surfaced through the codec.
    ///
    /// `tokio_util::codec::Decoder` requires its error type to be
    /// constructible from `std::io::Error`.
    #[error("codec i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// The inbound stream failed validation and the buffer was discarded.
    #[error("bad packet: {0}")]
    BadPacket(BadPacket),
}
