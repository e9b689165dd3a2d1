//! Transport module - the byte pipe between this process and the peer.
//!
//! The engine only ever talks to a [`Transport`]. Provided implementations:
//! - [`UnixSocketTransport`] - Unix Domain Socket with endpoint discovery (Unix only)
//! - [`MemoryTransport`] - in-process pair scripted through a [`MemoryPeer`]

mod memory;
#[cfg(unix)]
mod pipe;

pub use memory::{MemoryPeer, MemoryTransport};
#[cfg(unix)]
pub use pipe::{ipc_candidates, temp_dir, UnixSocketTransport};

/// Non-blocking byte transport to the local peer.
///
/// No method may block. `read` and `write` are all-or-nothing: a partial
/// transfer is never reported as success.
pub trait Transport: Send {
    /// Try the candidate endpoints in order until one connects.
    fn open(&mut self) -> bool;

    /// Close the connection. Closing a closed transport is a no-op.
    fn close(&mut self);

    /// Whether a connection is currently open.
    fn is_open(&self) -> bool;

    /// Fill `buf` completely or not at all.
    ///
    /// Returns `false` with no state change when not enough bytes are
    /// available yet. On a hard error (or peer hang-up) the transport closes
    /// itself, so callers check [`Transport::is_open`] after a `false`.
    fn read(&mut self, buf: &mut [u8]) -> bool;

    /// Write all of `buf`. Returns `true` only if every byte was accepted.
    fn write(&mut self, buf: &[u8]) -> bool;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self) -> bool {
        (**self).open()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn read(&mut self, buf: &mut [u8]) -> bool {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> bool {
        (**self).write(buf)
    }
}
