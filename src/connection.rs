//! Connection lifecycle state machine.
//!
//! ```text
//! Disconnected ──open()──► Connecting ──handshake──► AwaitingReady ──READY──► Connected
//!      ▲                                                   │                      │
//!      └──────────── failure / Close / protocol error ─────┴──────────────────────┘
//! ```
//!
//! The machine owns its [`Transport`] and is driven by [`Connection::tick`].
//! Each tick connects if a retry is due, flushes one pending control frame
//! and reads at most one frame; it never blocks.
//!
//! Every collapse closes the transport and schedules exactly one retry delay
//! from the [`ExponentialBackoff`]. Only reaching `Connected` resets it.
//! A collapse before the handshake is written produces no event.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::activity::User;
use crate::backoff::ExponentialBackoff;
use crate::codec::encode_handshake;
use crate::error::{Result, RpcError, PIPE_CLOSED, READ_CORRUPT};
use crate::handler::Envelope;
use crate::protocol::{Frame, FrameReader, Opcode, MAX_FRAME_SIZE, RPC_VERSION};
use crate::transport::Transport;

/// Retry delay used when the backoff delay does not fit in an [`Instant`].
const MAX_RETRY_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Where the connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport; waiting for the next retry.
    Disconnected,
    /// Transport open, handshake not written yet.
    Connecting,
    /// Handshake written, waiting for READY.
    AwaitingReady,
    /// READY received.
    Connected,
}

/// Something the owner of the connection must react to.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The handshake completed.
    Ready(User),
    /// A message arrived while connected.
    Message(Envelope),
    /// The connection collapsed. `protocol` is set when the peer sent
    /// something unreadable, as opposed to going away.
    Closed {
        /// Peer close code, or [`PIPE_CLOSED`] / [`READ_CORRUPT`].
        code: i32,
        /// Human-readable reason.
        message: String,
        /// Whether the peer sent something unreadable.
        protocol: bool,
    },
}

#[derive(Deserialize)]
struct CloseData {
    #[serde(default = "pipe_closed")]
    code: i32,
    #[serde(default)]
    message: String,
}

fn pipe_closed() -> i32 {
    PIPE_CLOSED
}

/// A connection to the peer over a [`Transport`].
#[derive(Debug)]
pub struct Connection<T: Transport> {
    transport: T,
    state: ConnectionState,
    reader: FrameReader,
    backoff: ExponentialBackoff,
    /// When the next `open()` may happen; `None` means right away.
    next_attempt: Option<Instant>,
    client_id: String,
    /// Control frames (pongs) waiting to be written.
    pending: VecDeque<Frame>,
    /// Collapse caused by a `send`, reported by the next tick.
    deferred: Option<ConnectionEvent>,
    scratch: Vec<u8>,
}

impl<T: Transport> Connection<T> {
    /// Create a disconnected machine; the first tick tries to connect.
    pub fn new(transport: T, client_id: impl Into<String>, backoff: ExponentialBackoff) -> Self {
        Self {
            transport,
            state: ConnectionState::Disconnected,
            reader: FrameReader::new(),
            backoff,
            next_attempt: None,
            client_id: client_id.into(),
            pending: VecDeque::new(),
            deferred: None,
            scratch: vec![0u8; MAX_FRAME_SIZE],
        }
    }

    /// Limit accepted frame bodies to `max_payload` bytes.
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.reader = FrameReader::with_max_payload(max_payload);
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether READY has been received on the current connection.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// When the next connection attempt is allowed.
    pub fn next_attempt(&self) -> Option<Instant> {
        self.next_attempt
    }

    /// Retry schedule, for inspecting attempts.
    pub fn backoff(&self) -> &ExponentialBackoff {
        &self.backoff
    }

    /// Get a reference to the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Advance the machine using the current time.
    pub fn tick(&mut self) -> Option<ConnectionEvent> {
        self.tick_at(Instant::now())
    }

    /// Advance the machine as if the time were `now`.
    pub fn tick_at(&mut self, now: Instant) -> Option<ConnectionEvent> {
        if let Some(event) = self.deferred.take() {
            return Some(event);
        }

        if self.state == ConnectionState::Disconnected {
            if self.next_attempt.is_some_and(|at| now < at) {
                return None;
            }
            if !self.transport.open() {
                let delay = self.schedule_retry(now);
                debug!(?delay, attempts = self.backoff.attempts(), "peer not reachable");
                return None;
            }
            self.state = ConnectionState::Connecting;
            debug!("transport open, sending handshake");
        }

        if self.state == ConnectionState::Connecting {
            return self.send_handshake(now);
        }

        if let Some(frame) = self.pending.pop_front() {
            if !self.transport.write(&frame.to_bytes()) {
                return Some(self.collapse(now, PIPE_CLOSED, "Pipe closed", false));
            }
        }

        match self.reader.try_read_frame(&mut self.transport) {
            Ok(Some(frame)) => self.handle_frame(now, frame),
            Ok(None) if !self.transport.is_open() => {
                Some(self.collapse(now, PIPE_CLOSED, "Pipe closed", false))
            }
            Ok(None) => None,
            Err(RpcError::Protocol { code, message }) => Some(self.collapse(now, code, message, true)),
            Err(e) => Some(self.collapse(now, READ_CORRUPT, e.to_string(), true)),
        }
    }

    /// Write a frame to the peer.
    ///
    /// Handshake frames need an open transport; everything else needs the
    /// handshake to have been sent.
    ///
    /// # Errors
    ///
    /// - [`RpcError::NotConnected`] in the wrong state
    /// - [`RpcError::Overflow`] if the frame exceeds [`MAX_FRAME_SIZE`]
    /// - [`RpcError::Transport`] if the write failed; the collapse is
    ///   reported by the next tick
    pub fn send(&mut self, frame: &Frame) -> Result<()> {
        let allowed = match frame.opcode {
            Opcode::Handshake => self.transport.is_open(),
            _ => matches!(
                self.state,
                ConnectionState::AwaitingReady | ConnectionState::Connected
            ),
        };
        if !allowed {
            return Err(RpcError::NotConnected);
        }
        let bytes = frame.to_bytes();
        if bytes.len() > MAX_FRAME_SIZE {
            return Err(RpcError::Overflow);
        }
        self.write_frame(&bytes)
    }

    /// Write pre-encoded frame bytes. Same state rules as [`Connection::send`]
    /// for non-handshake frames.
    pub(crate) fn send_encoded(&mut self, bytes: &[u8]) -> Result<()> {
        if !matches!(
            self.state,
            ConnectionState::AwaitingReady | ConnectionState::Connected
        ) {
            return Err(RpcError::NotConnected);
        }
        self.write_frame(bytes)
    }

    /// Close the transport without scheduling a retry.
    pub fn shutdown(&mut self) {
        if self.transport.is_open() {
            info!("closing connection");
        }
        self.transport.close();
        self.reader.reset();
        self.pending.clear();
        self.deferred = None;
        self.state = ConnectionState::Disconnected;
    }

    fn write_frame(&mut self, bytes: &[u8]) -> Result<()> {
        if self.transport.write(bytes) {
            return Ok(());
        }
        let event = self.collapse(Instant::now(), PIPE_CLOSED, "Pipe closed", false);
        self.deferred = Some(event);
        Err(RpcError::Transport("write failed".into()))
    }

    /// Failures here only schedule a retry: nothing was established, so
    /// there is no disconnect to report.
    fn send_handshake(&mut self, now: Instant) -> Option<ConnectionEvent> {
        let n = match encode_handshake(RPC_VERSION, &self.client_id, &mut self.scratch) {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "cannot encode handshake");
                self.collapse(now, READ_CORRUPT, e.to_string(), true);
                return None;
            }
        };
        if !self.transport.write(&self.scratch[..n]) {
            self.collapse(now, PIPE_CLOSED, "Pipe closed", false);
            return None;
        }
        self.state = ConnectionState::AwaitingReady;
        None
    }

    fn handle_frame(&mut self, now: Instant, frame: Frame) -> Option<ConnectionEvent> {
        match frame.opcode {
            Opcode::Message => self.handle_message(now, &frame.payload),
            Opcode::Ping => {
                self.pending.push_back(Frame::new(Opcode::Pong, frame.payload));
                None
            }
            Opcode::Pong => None,
            Opcode::Close => {
                let (code, message) = match serde_json::from_slice::<CloseData>(&frame.payload) {
                    Ok(data) => (data.code, data.message),
                    Err(_) => (PIPE_CLOSED, "Pipe closed".to_string()),
                };
                Some(self.collapse(now, code, message, false))
            }
            Opcode::Handshake => {
                Some(self.collapse(now, READ_CORRUPT, "Unexpected handshake frame", true))
            }
        }
    }

    fn handle_message(&mut self, now: Instant, payload: &Bytes) -> Option<ConnectionEvent> {
        let envelope = match Envelope::parse(payload) {
            Ok(envelope) => envelope,
            Err(e) => return Some(self.collapse(now, READ_CORRUPT, e.to_string(), true)),
        };

        if self.state == ConnectionState::Connected {
            return Some(ConnectionEvent::Message(envelope));
        }

        if envelope.is_ready() {
            let user = envelope.user().unwrap_or_default();
            self.state = ConnectionState::Connected;
            self.next_attempt = None;
            self.backoff.reset();
            info!(user = %user.username, "connected");
            return Some(ConnectionEvent::Ready(user));
        }

        // Anything else before READY is the peer rejecting the handshake.
        let (code, message) = envelope
            .error()
            .unwrap_or((PIPE_CLOSED, "Unexpected message before ready".to_string()));
        Some(self.collapse(now, code, message, false))
    }

    fn collapse(
        &mut self,
        now: Instant,
        code: i32,
        message: impl Into<String>,
        protocol: bool,
    ) -> ConnectionEvent {
        let message = message.into();
        self.transport.close();
        self.reader.reset();
        self.pending.clear();
        self.state = ConnectionState::Disconnected;
        let delay = self.schedule_retry(now);
        warn!(code, %message, protocol, ?delay, "connection lost");
        ConnectionEvent::Closed {
            code,
            message,
            protocol,
        }
    }

    fn schedule_retry(&mut self, now: Instant) -> Duration {
        let delay = self.backoff.next_delay();
        let at = now
            .checked_add(delay)
            .or_else(|| now.checked_add(MAX_RETRY_DELAY))
            .unwrap_or(now);
        self.next_attempt = Some(at);
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryPeer, MemoryTransport};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn backoff() -> ExponentialBackoff {
        ExponentialBackoff::with_rng(
            Duration::from_millis(500),
            Duration::from_secs(60),
            0.0,
            Box::new(StdRng::seed_from_u64(3)),
        )
    }

    fn connection() -> (Connection<MemoryTransport>, MemoryPeer) {
        let (transport, peer) = MemoryTransport::pair();
        (Connection::new(transport, "1234", backoff()), peer)
    }

    fn connect(conn: &mut Connection<MemoryTransport>, peer: &MemoryPeer, now: Instant) {
        assert_eq!(conn.tick_at(now), None);
        assert_eq!(conn.state(), ConnectionState::AwaitingReady);
        peer.send_ready("1", "ada");
        assert!(matches!(conn.tick_at(now), Some(ConnectionEvent::Ready(_))));
    }

    #[test]
    fn test_handshake_then_ready() {
        let (mut conn, peer) = connection();
        let now = Instant::now();

        assert_eq!(conn.tick_at(now), None);
        assert_eq!(conn.state(), ConnectionState::AwaitingReady);

        let frames = peer.take_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].opcode, Opcode::Handshake);
        assert_eq!(frames[0].payload(), br#"{"v":1,"client_id":"1234"}"#);

        assert_eq!(conn.tick_at(now), None);
        peer.send_ready("42", "ada");
        let Some(ConnectionEvent::Ready(user)) = conn.tick_at(now) else {
            panic!("expected ready");
        };
        assert_eq!(user.user_id, "42");
        assert!(conn.is_connected());
        assert_eq!(conn.backoff().attempts(), 0);
    }

    #[test]
    fn test_failed_open_schedules_one_delay() {
        let (mut conn, peer) = connection();
        peer.set_listening(false);
        let now = Instant::now();

        assert_eq!(conn.tick_at(now), None);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(conn.backoff().attempts(), 1);
        assert_eq!(conn.next_attempt(), Some(now + Duration::from_millis(500)));

        // Not due yet: no new attempt and no new delay.
        peer.set_listening(true);
        assert_eq!(conn.tick_at(now + Duration::from_millis(100)), None);
        assert_eq!(peer.open_count(), 0);
        assert_eq!(conn.backoff().attempts(), 1);

        conn.tick_at(now + Duration::from_millis(500));
        assert_eq!(peer.open_count(), 1);
        assert_eq!(conn.state(), ConnectionState::AwaitingReady);
    }

    #[test]
    fn test_hangup_collapses_exactly_once() {
        let (mut conn, peer) = connection();
        let now = Instant::now();
        connect(&mut conn, &peer, now);

        peer.hang_up();
        let event = conn.tick_at(now);
        assert_eq!(
            event,
            Some(ConnectionEvent::Closed {
                code: PIPE_CLOSED,
                message: "Pipe closed".into(),
                protocol: false
            })
        );
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(conn.backoff().attempts(), 1);

        // Further ticks before the retry is due are silent.
        assert_eq!(conn.tick_at(now + Duration::from_millis(10)), None);
        assert_eq!(conn.backoff().attempts(), 1);
        assert_eq!(peer.close_count(), 1);
    }

    #[test]
    fn test_handshake_write_failure_schedules_one_silent_retry() {
        let (mut conn, peer) = connection();
        peer.fail_writes(true);
        let now = Instant::now();

        assert_eq!(conn.tick_at(now), None);
        assert_eq!(peer.open_count(), 1);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(conn.backoff().attempts(), 1);
        assert_eq!(conn.next_attempt(), Some(now + Duration::from_millis(500)));
        assert_eq!(peer.close_count(), 1);

        assert_eq!(conn.tick_at(now + Duration::from_millis(10)), None);
        assert_eq!(conn.backoff().attempts(), 1);
        assert_eq!(peer.open_count(), 1);
    }

    #[test]
    fn test_hangup_while_awaiting_ready_collapses_exactly_once() {
        let (mut conn, peer) = connection();
        let now = Instant::now();
        assert_eq!(conn.tick_at(now), None);
        assert_eq!(conn.state(), ConnectionState::AwaitingReady);

        peer.hang_up();
        let events: Vec<_> = (0..4).filter_map(|_| conn.tick_at(now)).collect();
        assert_eq!(
            events,
            vec![ConnectionEvent::Closed {
                code: PIPE_CLOSED,
                message: "Pipe closed".into(),
                protocol: false
            }]
        );
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(conn.backoff().attempts(), 1);
        assert_eq!(peer.close_count(), 1);
    }

    #[test]
    fn test_huge_backoff_does_not_overflow_retry_time() {
        let (transport, peer) = MemoryTransport::pair();
        let backoff = ExponentialBackoff::with_rng(
            Duration::MAX,
            Duration::MAX,
            0.0,
            Box::new(StdRng::seed_from_u64(3)),
        );
        let mut conn = Connection::new(transport, "1234", backoff);
        peer.set_listening(false);
        let now = Instant::now();

        assert_eq!(conn.tick_at(now), None);
        let at = conn.next_attempt().unwrap();
        assert!(at >= now + MAX_RETRY_DELAY);
        assert_eq!(conn.tick_at(now + Duration::from_secs(60)), None);
        assert_eq!(conn.backoff().attempts(), 1);
    }

    #[test]
    fn test_backoff_grows_across_failures_and_resets_on_ready() {
        let (mut conn, peer) = connection();
        peer.set_listening(false);
        let mut now = Instant::now();
        for _ in 0..3 {
            conn.tick_at(now);
            now = conn.next_attempt().unwrap();
        }
        assert_eq!(conn.backoff().attempts(), 3);

        peer.set_listening(true);
        connect(&mut conn, &peer, now);
        assert_eq!(conn.backoff().attempts(), 0);
    }

    #[test]
    fn test_corrupt_frame_is_protocol_error() {
        let (mut conn, peer) = connection();
        let now = Instant::now();
        connect(&mut conn, &peer, now);

        peer.send_raw(&[9, 0, 0, 0, 0, 0, 0, 0]);
        let Some(ConnectionEvent::Closed { code, protocol, .. }) = conn.tick_at(now) else {
            panic!("expected collapse");
        };
        assert_eq!(code, READ_CORRUPT);
        assert!(protocol);
        assert!(!peer.is_open());
    }

    #[test]
    fn test_invalid_json_is_protocol_error() {
        let (mut conn, peer) = connection();
        let now = Instant::now();
        connect(&mut conn, &peer, now);

        peer.send_frame(Opcode::Message, b"not json");
        assert!(matches!(
            conn.tick_at(now),
            Some(ConnectionEvent::Closed {
                code: READ_CORRUPT,
                protocol: true,
                ..
            })
        ));
    }

    #[test]
    fn test_close_frame_carries_reason() {
        let (mut conn, peer) = connection();
        let now = Instant::now();
        connect(&mut conn, &peer, now);

        peer.send_frame(Opcode::Close, br#"{"code":4000,"message":"Invalid Client ID"}"#);
        assert_eq!(
            conn.tick_at(now),
            Some(ConnectionEvent::Closed {
                code: 4000,
                message: "Invalid Client ID".into(),
                protocol: false
            })
        );
    }

    #[test]
    fn test_error_before_ready_disconnects() {
        let (mut conn, peer) = connection();
        let now = Instant::now();
        conn.tick_at(now);

        peer.send_event("ERROR", serde_json::json!({"code": 4000, "message": "bad id"}));
        assert_eq!(
            conn.tick_at(now),
            Some(ConnectionEvent::Closed {
                code: 4000,
                message: "bad id".into(),
                protocol: false
            })
        );
    }

    #[test]
    fn test_ping_answered_with_pong() {
        let (mut conn, peer) = connection();
        let now = Instant::now();
        connect(&mut conn, &peer, now);
        peer.take_frames();

        peer.send_frame(Opcode::Ping, b"keepalive");
        assert_eq!(conn.tick_at(now), None);
        assert_eq!(conn.tick_at(now), None);

        let frames = peer.take_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].opcode, Opcode::Pong);
        assert_eq!(frames[0].payload(), b"keepalive");
    }

    #[test]
    fn test_messages_forwarded_when_connected() {
        let (mut conn, peer) = connection();
        let now = Instant::now();
        connect(&mut conn, &peer, now);

        peer.send_event("ACTIVITY_JOIN", serde_json::json!({"secret": "s"}));
        let Some(ConnectionEvent::Message(envelope)) = conn.tick_at(now) else {
            panic!("expected message");
        };
        assert_eq!(envelope.evt.as_deref(), Some("ACTIVITY_JOIN"));
    }

    #[test]
    fn test_send_rejected_when_disconnected() {
        let (mut conn, _peer) = connection();
        let frame = Frame::from_parts(Opcode::Message, b"{}");
        assert!(matches!(conn.send(&frame), Err(RpcError::NotConnected)));
    }

    #[test]
    fn test_failed_send_reported_by_next_tick() {
        let (mut conn, peer) = connection();
        let now = Instant::now();
        connect(&mut conn, &peer, now);

        peer.fail_writes(true);
        let frame = Frame::from_parts(Opcode::Message, b"{}");
        assert!(matches!(conn.send(&frame), Err(RpcError::Transport(_))));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(conn.backoff().attempts(), 1);

        assert!(matches!(
            conn.tick_at(now),
            Some(ConnectionEvent::Closed { code: PIPE_CLOSED, .. })
        ));
        assert_eq!(conn.tick_at(now), None);
        assert_eq!(conn.backoff().attempts(), 1);
    }

    #[test]
    fn test_shutdown_closes_without_retry() {
        let (mut conn, peer) = connection();
        let now = Instant::now();
        connect(&mut conn, &peer, now);

        conn.shutdown();
        assert!(!peer.is_open());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(conn.backoff().attempts(), 0);
    }
}
