//! The streaming frame codec.
//!
//! TCP gives us a byte stream, not messages. A single read may carry many
//! frames, or a fraction of one. [`RconCodec`] implements the
//! `tokio_util::codec` traits so the caller can keep appending reads to a
//! `BytesMut` and call [`Decoder::decode`] until it returns `Ok(None)`;
//! incomplete tails stay in the buffer for the next read.
//!
//! Two things can appear on the stream besides regular frames:
//!
//! - the 7-byte [`SENTINEL`] marker, which some server versions use to
//!   delimit a multi-packet response, and
//! - garbage. When the header doesn't make sense the decoder drops the
//!   whole buffer and yields [`Inbound::BadPacket`]. There is no finer
//!   resync than that; the next valid frame starts a fresh buffer.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{MAX_FRAME_LEN, MIN_FRAME_LEN};
use crate::{Frame, PacketType, ProtocolError};

/// Out-of-band response boundary marker.
pub const SENTINEL: [u8; 7] = [0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00];

/// Offset of the body inside a frame (length + id + type).
const HEADER_LEN: usize = 12;

/// Highest `type` value that passes structural validation.
const MAX_RAW_TYPE: i32 = 5;

// ---------------------------------------------------------------------------
// Decoder output
// ---------------------------------------------------------------------------

/// Why the decoder gave up on the buffered bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BadPacket {
    /// The length prefix is outside `MIN_FRAME_LEN..=MAX_FRAME_LEN`.
    LengthOutOfRange(i32),
    /// The id is negative (and not an auth-failure echo).
    NegativeId(i32),
    /// The type is outside `0..=5`.
    InvalidType(i32),
    /// The two bytes where the terminator belongs are not zero.
    MissingTerminator,
}

impl fmt::Display for BadPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LengthOutOfRange(len) => write!(f, "length {len} out of range"),
            Self::NegativeId(id) => write!(f, "negative id {id}"),
            Self::InvalidType(ty) => write!(f, "invalid type {ty}"),
            Self::MissingTerminator => f.write_str("missing terminator"),
        }
    }
}

/// One item cut from the inbound byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A complete, structurally valid frame.
    Frame(Frame),
    /// The 7-byte sentinel marker.
    Sentinel,
    /// The buffer was corrupt and has been discarded.
    BadPacket(BadPacket),
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Checks that `body` fits in a single frame.
///
/// # Errors
/// Returns [`ProtocolError::BodyTooLarge`] when the resulting frame length
/// would exceed [`MAX_FRAME_LEN`].
pub fn check_body_len(body: &str) -> Result<(), ProtocolError> {
    let len = body.len() + MIN_FRAME_LEN;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::BodyTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }
    Ok(())
}

/// Encodes one frame: `length | id | type | body | 0x00 0x00`.
///
/// `length` covers everything after itself, so it is `body.len() + 10`.
///
/// # Errors
/// Returns [`ProtocolError::BodyTooLarge`] if the body doesn't fit.
pub fn encode(packet_type: PacketType, id: i32, body: &str) -> Result<Bytes, ProtocolError> {
    let mut dst = BytesMut::new();
    write_frame(&mut dst, packet_type, id, body)?;
    Ok(dst.freeze())
}

fn write_frame(
    dst: &mut BytesMut,
    packet_type: PacketType,
    id: i32,
    body: &str,
) -> Result<(), ProtocolError> {
    check_body_len(body)?;
    let len = body.len() + MIN_FRAME_LEN;
    dst.reserve(len + 4);
    dst.put_i32_le(len as i32);
    dst.put_i32_le(id);
    dst.put_i32_le(packet_type.as_i32());
    dst.put_slice(body.as_bytes());
    dst.put_u16_le(0);
    Ok(())
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Stateless codec for RCON frames.
///
/// All decoding state lives in the caller's `BytesMut`, so resetting a
/// connection only means clearing that buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct RconCodec;

impl RconCodec {
    /// Creates a new codec.
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for RconCodec {
    type Item = Inbound;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Inbound>, ProtocolError> {
        loop {
            if src.len() < SENTINEL.len() {
                return Ok(None);
            }

            if src[..SENTINEL.len()] == SENTINEL {
                src.advance(SENTINEL.len());
                return Ok(Some(Inbound::Sentinel));
            }

            let length = read_i32(&src[0..4]);
            if !(MIN_FRAME_LEN as i32..=MAX_FRAME_LEN as i32).contains(&length) {
                return Ok(Some(bad_packet(src, BadPacket::LengthOutOfRange(length))));
            }

            let length = length as usize;
            let total = length + 4;
            if src.len() < total {
                src.reserve(total - src.len());
                return Ok(None);
            }

            let id = read_i32(&src[4..8]);
            let raw_type = read_i32(&src[8..12]);

            if src[length + 2] != 0 || src[length + 3] != 0 {
                return Ok(Some(bad_packet(src, BadPacket::MissingTerminator)));
            }
            if !(0..=MAX_RAW_TYPE).contains(&raw_type) {
                return Ok(Some(bad_packet(src, BadPacket::InvalidType(raw_type))));
            }
            // The server signals a rejected password with id -1 on the
            // auth-response type; any other negative id is corruption.
            let auth_failure = id == -1 && raw_type == PacketType::Command.as_i32();
            if id < 0 && !auth_failure {
                return Ok(Some(bad_packet(src, BadPacket::NegativeId(id))));
            }

            let body = String::from_utf8_lossy(&src[HEADER_LEN..length + 2]).into_owned();
            src.advance(total);

            match PacketType::from_i32(raw_type) {
                Some(packet_type) => {
                    return Ok(Some(Inbound::Frame(Frame {
                        id,
                        packet_type,
                        body,
                    })));
                }
                None => {
                    tracing::debug!(id, raw_type, "skipping frame of unused type");
                }
            }
        }
    }
}

impl Encoder<Frame> for RconCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        write_frame(dst, frame.packet_type, frame.id, &frame.body)
    }
}

fn read_i32(bytes: &[u8]) -> i32 {
    i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn bad_packet(src: &mut BytesMut, reason: BadPacket) -> Inbound {
    tracing::warn!(%reason, discarded = src.len(), "bad packet, clearing buffer");
    src.clear();
    Inbound::BadPacket(reason)
}

// =========================================================================
// Tests
// =========================================================================
