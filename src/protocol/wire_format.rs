//! Wire format encoding and decoding.
//!
//! Implements the 8-byte header format:
//! ```text
//! ┌──────────┬──────────┐
//! │ Opcode   │ Length   │
//! │ 4 bytes  │ 4 bytes  │
//! │ int32 LE │ int32 LE │
//! └──────────┴──────────┘
//! ```
//!
//! followed by `length` bytes of UTF-8 JSON. All integers are Little Endian.

use crate::error::{Result, RpcError};

/// Header size in bytes (fixed, exactly 8).
pub const HEADER_SIZE: usize = 8;

/// Maximum frame size, header included (64 KiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Maximum body length that fits in a frame.
pub const MAX_PAYLOAD_SIZE: usize = MAX_FRAME_SIZE - HEADER_SIZE;

/// Protocol version announced in the handshake.
pub const RPC_VERSION: i64 = 1;

/// Frame opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Opcode {
    /// Initial frame identifying the application.
    Handshake = 0,
    /// JSON command or event.
    Message = 1,
    /// Peer is closing the connection; body carries `{code, message}`.
    Close = 2,
    /// Keep-alive request; must be answered with a Pong.
    Ping = 3,
    /// Keep-alive reply.
    Pong = 4,
}

impl Opcode {
    /// Map a raw opcode value, `None` if unrecognized.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Opcode::Handshake),
            1 => Some(Opcode::Message),
            2 => Some(Opcode::Close),
            3 => Some(Opcode::Ping),
            4 => Some(Opcode::Pong),
            _ => None,
        }
    }
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Frame opcode.
    pub opcode: Opcode,
    /// Body length in bytes.
    pub length: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(opcode: Opcode, length: u32) -> Self {
        Self { opcode, length }
    }

    /// Encode header to bytes (Little Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use presence_ipc::protocol::{Header, Opcode};
    ///
    /// let bytes = Header::new(Opcode::Message, 5).encode();
    /// assert_eq!(bytes, [1, 0, 0, 0, 5, 0, 0, 0]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&(self.opcode as u32).to_le_bytes());
        buf[4..8].copy_from_slice(&self.length.to_le_bytes());
        buf
    }

    /// Decode and validate a header.
    ///
    /// Fails with a protocol error if the buffer is short, the opcode is
    /// unknown, or the length exceeds `max_payload`.
    pub fn decode(buf: &[u8], max_payload: usize) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(RpcError::corrupt("Truncated frame header"));
        }
        let raw_opcode = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let length = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);

        let opcode = Opcode::from_u32(raw_opcode)
            .ok_or_else(|| RpcError::corrupt(format!("Unknown opcode {raw_opcode}")))?;

        if length as usize > max_payload {
            return Err(RpcError::corrupt(format!(
                "Frame length {length} exceeds maximum {max_payload}"
            )));
        }

        Ok(Self { opcode, length })
    }
}

/// Encode a complete frame into `dest`.
///
/// Returns the number of bytes written. Fails with [`RpcError::Overflow`]
/// without touching `dest` if the frame does not fit or the body exceeds
/// [`MAX_PAYLOAD_SIZE`].
pub fn encode_frame(opcode: Opcode, body: &[u8], dest: &mut [u8]) -> Result<usize> {
    let total = HEADER_SIZE + body.len();
    if body.len() > MAX_PAYLOAD_SIZE || total > dest.len() {
        return Err(RpcError::Overflow);
    }
    dest[..HEADER_SIZE].copy_from_slice(&Header::new(opcode, body.len() as u32).encode());
    dest[HEADER_SIZE..total].copy_from_slice(body);
    Ok(total)
}

/// Write a header for a body already placed at `dest[HEADER_SIZE..]`.
pub(crate) fn finish_frame(opcode: Opcode, body_len: usize, dest: &mut [u8]) -> Result<usize> {
    if body_len > MAX_PAYLOAD_SIZE || HEADER_SIZE + body_len > dest.len() {
        return Err(RpcError::Overflow);
    }
    dest[..HEADER_SIZE].copy_from_slice(&Header::new(opcode, body_len as u32).encode());
    Ok(HEADER_SIZE + body_len)
}
