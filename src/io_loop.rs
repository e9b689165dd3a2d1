//! IO side of the client.
//!
//! [`IoLoop::update`] ticks the connection, forwards inbound events to the
//! mailbox and drains the outbound queue while connected. It is called either
//! from the background [`IoThread`] or directly through
//! [`Client::update_connection`](crate::Client::update_connection); the loop
//! lives behind a mutex so both modes can coexist.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::{oneshot, Notify};
use tracing::{debug, error, info, trace, warn};

use crate::codec::{encode_command, Command, EventKind};
use crate::connection::{Connection, ConnectionEvent};
use crate::error::{Result, RpcError};
use crate::handler::{classify_envelope, InboundEvent, Mailbox};
use crate::queue::OutboundQueue;
use crate::transport::Transport;

/// Connection ticks per update at most.
const MAX_TICKS_PER_UPDATE: usize = 32;

/// Name of the background IO thread.
pub const IO_THREAD_NAME: &str = "presence-io";

/// State shared between the application thread and the IO side.
#[derive(Debug)]
pub(crate) struct Shared {
    pub queue: OutboundQueue,
    pub mailbox: Mailbox,
    pub connected: AtomicBool,
    /// Bit mask of [`EventKind::bit`] values to subscribe to on connect.
    pub subscriptions: AtomicU8,
    pub wake: Notify,
}

impl Shared {
    pub fn new(queue_capacity: usize, subscriptions: u8) -> Self {
        Self {
            queue: OutboundQueue::new(queue_capacity),
            mailbox: Mailbox::new(),
            connected: AtomicBool::new(false),
            subscriptions: AtomicU8::new(subscriptions),
            wake: Notify::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

/// Drives a [`Connection`] and moves commands and events across threads.
pub(crate) struct IoLoop {
    connection: Connection<Box<dyn Transport>>,
    shared: Arc<Shared>,
    nonce: u64,
    pid: u32,
    /// Latest presence handed to the connection, replayed after every
    /// READY until a clear or shutdown.
    last_presence: Option<Command>,
    buf: Vec<u8>,
}

impl IoLoop {
    pub fn new(
        connection: Connection<Box<dyn Transport>>,
        shared: Arc<Shared>,
        max_frame_size: usize,
    ) -> Self {
        Self {
            connection,
            shared,
            nonce: 0,
            pid: std::process::id(),
            last_presence: None,
            buf: vec![0u8; max_frame_size],
        }
    }

    /// One pump of the IO side. Never blocks on I/O.
    pub fn update(&mut self) {
        for _ in 0..MAX_TICKS_PER_UPDATE {
            let Some(event) = self.connection.tick() else {
                break;
            };
            self.handle_event(event);
        }

        if self.connection.is_connected() {
            self.drain_queue();
        }
    }

    /// Close the connection without a retry.
    pub fn shutdown(&mut self) {
        self.connection.shutdown();
        self.last_presence = None;
        self.shared.connected.store(false, Ordering::Release);
    }

    fn handle_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Ready(user) => {
                self.shared.connected.store(true, Ordering::Release);
                self.shared.mailbox.publish(InboundEvent::Ready(user));
                self.send_subscriptions();
                if let Some(presence) = self.last_presence.clone() {
                    debug!("replaying presence after reconnect");
                    self.send_command(presence);
                }
            }
            ConnectionEvent::Message(envelope) => {
                if let Some(event) = classify_envelope(&envelope) {
                    trace!(?event, "inbound event");
                    self.shared.mailbox.publish(event);
                }
            }
            ConnectionEvent::Closed {
                code,
                message,
                protocol,
            } => {
                self.shared.connected.store(false, Ordering::Release);
                if protocol {
                    self.shared.mailbox.publish(InboundEvent::Errored {
                        code,
                        message: message.clone(),
                    });
                }
                self.shared
                    .mailbox
                    .publish(InboundEvent::Disconnected { code, message });
            }
        }
    }

    fn send_subscriptions(&mut self) {
        let mask = self.shared.subscriptions.load(Ordering::Acquire);
        for kind in EventKind::ALL {
            if mask & kind.bit() != 0 {
                self.send_command(Command::Subscribe(kind));
            }
        }
    }

    fn drain_queue(&mut self) {
        while self.connection.is_connected() {
            let Some(command) = self.shared.queue.pop() else {
                break;
            };
            self.send_command(command);
        }
    }

    /// Encode and write one command. A failed write surfaces on the next tick.
    fn send_command(&mut self, command: Command) {
        self.nonce += 1;
        let n = match encode_command(&command, self.nonce, self.pid, &mut self.buf) {
            Ok(n) => n,
            Err(e) => {
                warn!(command = command.label(), error = %e, "dropping command");
                return;
            }
        };
        // Recorded before the write: a failed write must not leave an older
        // presence to replay.
        match &command {
            Command::UpdatePresence(_) => self.last_presence = Some(command.clone()),
            Command::ClearPresence => self.last_presence = None,
            _ => {}
        }
        match self.connection.send_encoded(&self.buf[..n]) {
            Ok(()) => trace!(command = command.label(), nonce = self.nonce, "sent"),
            Err(e) => debug!(command = command.label(), error = %e, "send failed"),
        }
    }
}

fn lock(io: &Mutex<IoLoop>) -> MutexGuard<'_, IoLoop> {
    io.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Lock the loop and run one update.
pub(crate) fn pump(io: &Mutex<IoLoop>) {
    lock(io).update();
}

/// Lock the loop and close its connection.
pub(crate) fn close(io: &Mutex<IoLoop>) {
    lock(io).shutdown();
}

/// Background thread running the IO loop on a current-thread runtime.
#[derive(Debug)]
pub(crate) struct IoThread {
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl IoThread {
    /// Spawn the thread. It updates the loop whenever `shared.wake` is
    /// notified or `poll_interval` elapses.
    pub fn spawn(io: Arc<Mutex<IoLoop>>, shared: Arc<Shared>, poll_interval: Duration) -> Result<Self> {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = std::thread::Builder::new()
            .name(IO_THREAD_NAME.to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!(error = %e, "cannot build IO runtime");
                        return;
                    }
                };

                runtime.block_on(async move {
                    info!("IO thread started");
                    loop {
                        pump(&io);
                        tokio::select! {
                            _ = &mut stop_rx => break,
                            _ = shared.wake.notified() => {}
                            _ = tokio::time::sleep(poll_interval) => {}
                        }
                    }
                    info!("IO thread stopped");
                });
            })
            .map_err(RpcError::Io)?;

        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Signal the thread and wait for it to exit. Idempotent.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("IO thread panicked");
            }
        }
    }
}

impl Drop for IoThread {
    fn drop(&mut self) {
        self.stop();
    }
}
