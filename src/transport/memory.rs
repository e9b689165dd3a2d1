//! In-process transport with a scriptable peer.
//!
//! [`MemoryTransport::pair`] returns the engine side and a [`MemoryPeer`]
//! handle that plays the role of the local chat client: it accepts or
//! refuses connections, queues inbound bytes, inspects what was written and
//! injects failures.
//!
//! # Example
//!
//! ```
//! use presence_ipc::transport::{MemoryTransport, Transport};
//!
//! let (mut transport, peer) = MemoryTransport::pair();
//! assert!(transport.open());
//! assert!(transport.write(b"ping"));
//! assert_eq!(peer.written(), b"ping");
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Buf, BytesMut};
use serde_json::Value;

use super::Transport;
use crate::protocol::{Frame, FrameReader, Opcode};

#[derive(Debug)]
struct Shared {
    /// Whether `open()` succeeds.
    listening: bool,
    /// Whether a connection is established.
    open: bool,
    /// Bytes waiting to be read by the engine.
    inbound: BytesMut,
    /// Bytes written by the engine during the current connection.
    outbound: BytesMut,
    /// Make every write fail (and close) until cleared.
    fail_writes: bool,
    open_count: usize,
    close_count: usize,
}

impl Shared {
    fn disconnect(&mut self) {
        if self.open {
            self.open = false;
            self.close_count += 1;
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Engine side of an in-memory connection.
#[derive(Debug)]
pub struct MemoryTransport {
    shared: Arc<Mutex<Shared>>,
}

/// Peer side of an in-memory connection.
#[derive(Debug, Clone)]
pub struct MemoryPeer {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryTransport {
    /// Create a connected pair. The peer starts out listening.
    pub fn pair() -> (MemoryTransport, MemoryPeer) {
        let shared = Arc::new(Mutex::new(Shared {
            listening: true,
            open: false,
            inbound: BytesMut::new(),
            outbound: BytesMut::new(),
            fail_writes: false,
            open_count: 0,
            close_count: 0,
        }));
        (
            MemoryTransport {
                shared: shared.clone(),
            },
            MemoryPeer { shared },
        )
    }
}

impl Transport for MemoryTransport {
    fn open(&mut self) -> bool {
        let mut shared = lock(&self.shared);
        if !shared.listening {
            return false;
        }
        shared.open = true;
        shared.open_count += 1;
        shared.inbound.clear();
        shared.outbound.clear();
        true
    }

    fn close(&mut self) {
        lock(&self.shared).disconnect();
    }

    fn is_open(&self) -> bool {
        lock(&self.shared).open
    }

    fn read(&mut self, buf: &mut [u8]) -> bool {
        let mut shared = lock(&self.shared);
        if !shared.open || shared.inbound.len() < buf.len() {
            return false;
        }
        shared.inbound.copy_to_slice(buf);
        true
    }

    fn write(&mut self, buf: &[u8]) -> bool {
        let mut shared = lock(&self.shared);
        if !shared.open {
            return false;
        }
        if shared.fail_writes {
            shared.disconnect();
            return false;
        }
        shared.outbound.extend_from_slice(buf);
        true
    }
}

impl MemoryPeer {
    /// Accept (`true`) or refuse (`false`) future `open()` calls.
    pub fn set_listening(&self, listening: bool) {
        lock(&self.shared).listening = listening;
    }

    /// Queue raw bytes for the engine to read.
    pub fn send_raw(&self, bytes: &[u8]) {
        lock(&self.shared).inbound.extend_from_slice(bytes);
    }

    /// Queue a complete frame for the engine to read.
    pub fn send_frame(&self, opcode: Opcode, payload: &[u8]) {
        self.send_raw(&Frame::from_parts(opcode, payload).to_bytes());
    }

    /// Queue the READY dispatch that completes the handshake.
    pub fn send_ready(&self, user_id: &str, username: &str) {
        let body = serde_json::json!({
            "cmd": "DISPATCH",
            "evt": "READY",
            "data": {
                "v": 1,
                "user": {
                    "id": user_id,
                    "username": username,
                    "discriminator": "0",
                    "avatar": null,
                }
            }
        });
        self.send_frame(Opcode::Message, body.to_string().as_bytes());
    }

    /// Queue an event dispatch (`cmd: DISPATCH`) with the given data.
    pub fn send_event(&self, evt: &str, data: Value) {
        let body = serde_json::json!({ "cmd": "DISPATCH", "evt": evt, "data": data });
        self.send_frame(Opcode::Message, body.to_string().as_bytes());
    }

    /// Simulate the peer process going away.
    pub fn hang_up(&self) {
        lock(&self.shared).disconnect();
    }

    /// Make writes fail (closing the connection) until cleared.
    pub fn fail_writes(&self, fail: bool) {
        lock(&self.shared).fail_writes = fail;
    }

    /// Whether the engine currently holds an open connection.
    pub fn is_open(&self) -> bool {
        lock(&self.shared).open
    }

    /// Number of successful `open()` calls.
    pub fn open_count(&self) -> usize {
        lock(&self.shared).open_count
    }

    /// Number of times an open connection was closed.
    pub fn close_count(&self) -> usize {
        lock(&self.shared).close_count
    }

    /// Copy of every byte written during the current connection.
    pub fn written(&self) -> Vec<u8> {
        lock(&self.shared).outbound.to_vec()
    }

    /// Drain and decode every complete frame written so far.
    pub fn take_frames(&self) -> Vec<Frame> {
        let bytes = std::mem::take(&mut lock(&self.shared).outbound);

        let (mut scratch, feeder) = MemoryTransport::pair();
        scratch.open();
        feeder.send_raw(&bytes);

        let mut reader = FrameReader::new();
        let mut frames = Vec::new();
        while let Ok(Some(frame)) = reader.try_read_frame(&mut scratch) {
            frames.push(frame);
        }
        frames
    }

    /// Drain written Message frames and parse their bodies as JSON.
    pub fn take_messages(&self) -> Vec<Value> {
        self.take_frames()
            .into_iter()
            .filter(|frame| frame.opcode == Opcode::Message)
            .filter_map(|frame| serde_json::from_slice(frame.payload()).ok())
            .collect()
    }
}
