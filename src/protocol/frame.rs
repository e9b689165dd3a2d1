//! Frame struct with typed accessors.
//!
//! Represents a complete protocol frame: opcode plus JSON payload.
//! Uses `bytes::Bytes` so payloads can be handed between the reader,
//! the connection and the dispatcher without copying.
//!
//! # Example
//!
//! ```
//! use presence_ipc::protocol::{Frame, Opcode};
//!
//! let frame = Frame::from_parts(Opcode::Message, br#"{"evt":"READY"}"#);
//! assert_eq!(frame.opcode, Opcode::Message);
//! assert_eq!(frame.to_bytes().len(), 8 + 15);
//! ```

use bytes::Bytes;

use super::wire_format::{Header, Opcode, HEADER_SIZE};

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame opcode.
    pub opcode: Opcode,
    /// Payload bytes (UTF-8 JSON, may be empty).
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from opcode and payload.
    pub fn new(opcode: Opcode, payload: Bytes) -> Self {
        Self { opcode, payload }
    }

    /// Create a frame from opcode and raw bytes (copies data).
    pub fn from_parts(opcode: Opcode, payload: &[u8]) -> Self {
        Self {
            opcode,
            payload: Bytes::copy_from_slice(payload),
        }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Header describing this frame.
    #[inline]
    pub fn header(&self) -> Header {
        Header::new(self.opcode, self.payload.len() as u32)
    }

    /// Serialize header and payload into one contiguous buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&self.header().encode());
        buf.extend_from_slice(&self.payload);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MAX_PAYLOAD_SIZE;

    #[test]
    fn test_frame_creation() {
        let frame = Frame::new(Opcode::Ping, Bytes::from_static(b"{}"));
        assert_eq!(frame.opcode, Opcode::Ping);
        assert_eq!(frame.payload(), b"{}");
        assert_eq!(frame.header().length, 2);
    }

    #[test]
    fn test_frame_empty_payload() {
        let frame = Frame::from_parts(Opcode::Close, b"");
        assert!(frame.payload().is_empty());
        assert_eq!(frame.to_bytes().len(), HEADER_SIZE);
    }

    #[test]
    fn test_to_bytes_decodes_back() {
        let frame = Frame::from_parts(Opcode::Message, b"hello");
        let bytes = frame.to_bytes();
        let header = Header::decode(&bytes[..HEADER_SIZE], MAX_PAYLOAD_SIZE).unwrap();
        assert_eq!(header.opcode, Opcode::Message);
        assert_eq!(header.length, 5);
        assert_eq!(&bytes[HEADER_SIZE..], b"hello");
    }
}
