//! Frame reader for non-blocking transports.
//!
//! Implements a state machine for frames that arrive across several ticks:
//! - `WaitingForHeader`: need the 8-byte header
//! - `WaitingForBody`: header parsed, body not yet fully available
//!
//! The transport guarantees all-or-nothing reads, so the only state kept
//! between calls is the parsed header. A body that is not ready yet is
//! retried on the next call without re-reading the header.

use bytes::{Bytes, BytesMut};

use super::wire_format::{Header, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use super::Frame;
use crate::error::Result;
use crate::transport::Transport;

/// State machine for frame parsing.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for a complete header.
    WaitingForHeader,
    /// Header parsed, waiting for the body.
    WaitingForBody { header: Header },
}

/// Reconstructs frames from a [`Transport`].
#[derive(Debug)]
pub struct FrameReader {
    /// Current parsing state.
    state: State,
    /// Maximum allowed body length.
    max_payload_size: usize,
}

impl FrameReader {
    /// Create a reader accepting bodies up to [`MAX_PAYLOAD_SIZE`].
    pub fn new() -> Self {
        Self::with_max_payload(MAX_PAYLOAD_SIZE)
    }

    /// Create a reader with a custom body limit.
    pub fn with_max_payload(max_payload_size: usize) -> Self {
        Self {
            state: State::WaitingForHeader,
            max_payload_size,
        }
    }

    /// Try to read one complete frame. Never blocks.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` when a frame was completed
    /// - `Ok(None)` when more data is needed (or the transport closed)
    /// - `Err(...)` on a protocol violation (unknown opcode, oversized length)
    pub fn try_read_frame<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
    ) -> Result<Option<Frame>> {
        let header = match self.state {
            State::WaitingForHeader => {
                let mut raw = [0u8; HEADER_SIZE];
                if !transport.read(&mut raw) {
                    return Ok(None);
                }
                let header = Header::decode(&raw, self.max_payload_size)?;
                if header.length == 0 {
                    return Ok(Some(Frame::new(header.opcode, Bytes::new())));
                }
                self.state = State::WaitingForBody { header };
                header
            }
            State::WaitingForBody { header } => header,
        };

        let mut body = BytesMut::zeroed(header.length as usize);
        if !transport.read(&mut body) {
            return Ok(None);
        }

        self.state = State::WaitingForHeader;
        Ok(Some(Frame::new(header.opcode, body.freeze())))
    }

    /// Drop any half-read frame (used when the connection is torn down).
    pub fn reset(&mut self) {
        self.state = State::WaitingForHeader;
    }

    /// Whether a header has been consumed and its body is still pending.
    pub fn is_mid_frame(&self) -> bool {
        matches!(self.state, State::WaitingForBody { .. })
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcError;
    use crate::protocol::Opcode;
    use crate::transport::MemoryTransport;

    fn open_pair() -> (MemoryTransport, crate::transport::MemoryPeer) {
        let (mut transport, peer) = MemoryTransport::pair();
        assert!(transport.open());
        (transport, peer)
    }

    #[test]
    fn test_single_complete_frame() {
        let (mut transport, peer) = open_pair();
        peer.send_frame(Opcode::Message, b"hello");

        let mut reader = FrameReader::new();
        let frame = reader.try_read_frame(&mut transport).unwrap().unwrap();
        assert_eq!(frame.opcode, Opcode::Message);
        assert_eq!(frame.payload(), b"hello");
        assert!(!reader.is_mid_frame());
    }

    #[test]
    fn test_nothing_available() {
        let (mut transport, _peer) = open_pair();
        let mut reader = FrameReader::new();
        assert!(reader.try_read_frame(&mut transport).unwrap().is_none());
        assert!(!reader.is_mid_frame());
    }

    #[test]
    fn test_body_retried_without_rereading_header() {
        let (mut transport, peer) = open_pair();
        let frame_bytes = Frame::from_parts(Opcode::Message, b"fragmented body").to_bytes();

        peer.send_raw(&frame_bytes[..HEADER_SIZE + 4]);
        let mut reader = FrameReader::new();
        assert!(reader.try_read_frame(&mut transport).unwrap().is_none());
        assert!(reader.is_mid_frame());

        // Still incomplete: stays in body state.
        assert!(reader.try_read_frame(&mut transport).unwrap().is_none());
        assert!(reader.is_mid_frame());

        peer.send_raw(&frame_bytes[HEADER_SIZE + 4..]);
        let frame = reader.try_read_frame(&mut transport).unwrap().unwrap();
        assert_eq!(frame.payload(), b"fragmented body");
        assert!(!reader.is_mid_frame());
    }

    #[test]
    fn test_empty_body() {
        let (mut transport, peer) = open_pair();
        peer.send_frame(Opcode::Pong, b"");

        let mut reader = FrameReader::new();
        let frame = reader.try_read_frame(&mut transport).unwrap().unwrap();
        assert_eq!(frame.opcode, Opcode::Pong);
        assert!(frame.payload().is_empty());
    }

    #[test]
    fn test_max_payload_validation() {
        let (mut transport, peer) = open_pair();
        peer.send_raw(&Header::new(Opcode::Message, 1000).encode());

        let mut reader = FrameReader::with_max_payload(100);
        let err = reader.try_read_frame(&mut transport).unwrap_err();
        assert!(matches!(err, RpcError::Protocol { .. }));
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_unknown_opcode_rejected() {
        let (mut transport, peer) = open_pair();
        peer.send_raw(&[7, 0, 0, 0, 0, 0, 0, 0]);

        let mut reader = FrameReader::new();
        assert!(reader.try_read_frame(&mut transport).is_err());
    }

    #[test]
    fn test_consecutive_frames() {
        let (mut transport, peer) = open_pair();
        peer.send_frame(Opcode::Ping, b"1");
        peer.send_frame(Opcode::Message, b"2");

        let mut reader = FrameReader::new();
        let first = reader.try_read_frame(&mut transport).unwrap().unwrap();
        let second = reader.try_read_frame(&mut transport).unwrap().unwrap();
        assert_eq!(first.opcode, Opcode::Ping);
        assert_eq!(second.payload(), b"2");
        assert!(reader.try_read_frame(&mut transport).unwrap().is_none());
    }

    #[test]
    fn test_reset_drops_pending_header() {
        let (mut transport, peer) = open_pair();
        peer.send_raw(&Header::new(Opcode::Message, 10).encode());

        let mut reader = FrameReader::new();
        assert!(reader.try_read_frame(&mut transport).unwrap().is_none());
        assert!(reader.is_mid_frame());

        reader.reset();
        assert!(!reader.is_mid_frame());
    }
}
