//! Unix Domain Socket transport.
//!
//! The peer listens on `discord-ipc-{0..9}` inside the user's runtime
//! directory, or inside a snap/flatpak sandbox directory below it. `open()`
//! probes those locations in a fixed order and keeps the first that accepts.
//!
//! The socket is switched to non-blocking mode after connecting. Incoming
//! bytes are staged in a `BytesMut` so that `read` can honour the
//! all-or-nothing contract even when the kernel hands over partial frames.

use std::io::{ErrorKind, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use bytes::{Buf, BytesMut};
use tracing::{debug, warn};

use super::Transport;

/// Sub-directories of the temp dir where sandboxed clients put their socket.
const SOCKET_DIRS: [&str; 4] = [
    "",
    "snap.discord",
    ".flatpak/com.discordapp.Discord/xdg-run",
    ".flatpak/dev.vencord.Vesktop/xdg-run",
];

/// Number of numbered socket slots probed per directory.
const PIPE_SLOTS: usize = 10;

/// Chunk size for draining the socket into the staging buffer.
const READ_CHUNK: usize = 16 * 1024;

/// Resolve the runtime/temp directory.
///
/// Checks `XDG_RUNTIME_DIR`, `TMPDIR`, `TMP`, `TEMP` in that order and falls
/// back to `/tmp`.
pub fn temp_dir() -> PathBuf {
    ["XDG_RUNTIME_DIR", "TMPDIR", "TMP", "TEMP"]
        .iter()
        .filter_map(|var| std::env::var_os(var))
        .find(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
}

/// Every candidate socket path under `base`, in probe order.
pub fn ipc_candidates(base: &Path) -> Vec<PathBuf> {
    SOCKET_DIRS
        .iter()
        .flat_map(|dir| {
            let root = if dir.is_empty() {
                base.to_path_buf()
            } else {
                base.join(dir)
            };
            (0..PIPE_SLOTS).map(move |slot| root.join(format!("discord-ipc-{slot}")))
        })
        .collect()
}

/// Non-blocking Unix socket connection to the peer.
#[derive(Debug)]
pub struct UnixSocketTransport {
    candidates: Vec<PathBuf>,
    stream: Option<UnixStream>,
    staging: BytesMut,
}

impl UnixSocketTransport {
    /// Transport probing the default locations under [`temp_dir`].
    pub fn new() -> Self {
        Self::with_candidates(ipc_candidates(&temp_dir()))
    }

    /// Transport probing an explicit list of socket paths.
    pub fn with_candidates(candidates: Vec<PathBuf>) -> Self {
        Self {
            candidates,
            stream: None,
            staging: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    /// Pull whatever the socket has into the staging buffer.
    fn fill_staging(&mut self, wanted: usize) {
        let mut chunk = [0u8; READ_CHUNK];
        while self.staging.len() < wanted {
            let Some(stream) = self.stream.as_mut() else {
                return;
            };
            match stream.read(&mut chunk) {
                Ok(0) => {
                    debug!("peer closed the socket");
                    self.close();
                    return;
                }
                Ok(n) => self.staging.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "socket read failed");
                    self.close();
                    return;
                }
            }
        }
    }
}

impl Default for UnixSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UnixSocketTransport {
    fn open(&mut self) -> bool {
        self.close();
        for path in &self.candidates {
            let Ok(stream) = UnixStream::connect(path) else {
                continue;
            };
            if let Err(e) = stream.set_nonblocking(true) {
                warn!(path = %path.display(), error = %e, "cannot make socket non-blocking");
                continue;
            }
            debug!(path = %path.display(), "connected to IPC socket");
            self.stream = Some(stream);
            return true;
        }
        false
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        self.staging.clear();
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn read(&mut self, buf: &mut [u8]) -> bool {
        if self.staging.len() < buf.len() {
            self.fill_staging(buf.len());
        }
        if self.stream.is_none() || self.staging.len() < buf.len() {
            return false;
        }
        self.staging.copy_to_slice(buf);
        true
    }

    fn write(&mut self, buf: &[u8]) -> bool {
        let Some(stream) = self.stream.as_mut() else {
            return false;
        };
        // A short write would leave half a frame on the wire, so anything but
        // a complete write tears the connection down.
        match stream.write(buf) {
            Ok(n) if n == buf.len() => true,
            Ok(n) => {
                warn!(written = n, expected = buf.len(), "short socket write");
                self.close();
                false
            }
            Err(e) => {
                warn!(error = %e, "socket write failed");
                self.close();
                false
            }
        }
    }
}
