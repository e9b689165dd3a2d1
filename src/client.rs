//! Client builder and engine-facing API.
//!
//! The [`ClientBuilder`] provides a fluent API for configuring the client.
//! The [`Client`] manages the lifecycle:
//! 1. Optionally register the URL scheme handler
//! 2. Start the IO side (background thread, or manual pumping)
//! 3. Queue commands from the application thread
//! 4. Deliver inbound events from [`Client::run_callbacks`]
//!
//! # Example
//!
//! ```no_run
//! use presence_ipc::handler::Handlers;
//! use presence_ipc::{Client, RichPresence};
//!
//! # fn main() -> presence_ipc::Result<()> {
//! let handlers = Handlers::new().on_ready(|user| println!("hello {}", user.username));
//! let mut client = Client::initialize("1234", handlers, false, None)?;
//!
//! client.update_presence(&RichPresence {
//!     state: "In a match".into(),
//!     ..Default::default()
//! })?;
//!
//! loop {
//!     client.run_callbacks();
//!     # break;
//! }
//! client.shutdown();
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::RngCore;
use tracing::{debug, info, warn};

use crate::activity::{Reply, RichPresence};
use crate::backoff::{ExponentialBackoff, DEFAULT_BASE, DEFAULT_CAP, DEFAULT_JITTER};
use crate::codec::{encode_command, Command, EventKind};
use crate::connection::Connection;
use crate::error::{Result, RpcError};
use crate::handler::{subscription_mask, EventHandler, NoopHandler};
use crate::io_loop::{self, IoLoop, IoThread, Shared};
use crate::protocol::{HEADER_SIZE, MAX_FRAME_SIZE};
use crate::queue::DEFAULT_QUEUE_CAPACITY;
use crate::register;
use crate::transport::Transport;

/// Default interval between IO thread wake-ups when nothing is queued.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Application id sent in the handshake.
    pub app_id: String,
    /// Steam app id used for URL scheme registration.
    pub steam_id: Option<String>,
    /// Register the URL scheme handler on start.
    pub auto_register: bool,
    /// Run the IO side on a background thread. When off, call
    /// [`Client::update_connection`] regularly.
    pub io_thread: bool,
    /// Commands that may wait for the IO side.
    pub queue_capacity: usize,
    /// How often the background thread wakes without new commands.
    pub poll_interval: Duration,
    /// Largest frame (header included) sent or accepted.
    pub max_frame_size: usize,
    /// First reconnect delay.
    pub backoff_base: Duration,
    /// Longest reconnect delay.
    pub backoff_cap: Duration,
    /// Relative random spread applied to each delay.
    pub backoff_jitter: f64,
}

impl ClientConfig {
    /// Defaults for `app_id`.
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            steam_id: None,
            auto_register: false,
            io_thread: true,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_frame_size: MAX_FRAME_SIZE,
            backoff_base: DEFAULT_BASE,
            backoff_cap: DEFAULT_CAP,
            backoff_jitter: DEFAULT_JITTER,
        }
    }
}

/// Builder for configuring and creating a [`Client`].
pub struct ClientBuilder {
    config: ClientConfig,
    handlers: Box<dyn EventHandler>,
    transport: Option<Box<dyn Transport>>,
    rng: Option<Box<dyn RngCore + Send>>,
}

impl ClientBuilder {
    /// Create a new client builder.
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            config: ClientConfig::new(app_id),
            handlers: Box::new(NoopHandler),
            transport: None,
            rng: None,
        }
    }

    /// Set the event handlers.
    pub fn handlers(mut self, handlers: impl EventHandler + 'static) -> Self {
        self.handlers = Box::new(handlers);
        self
    }

    /// Register the URL scheme handler on start.
    ///
    /// Default: false
    pub fn auto_register(mut self, enabled: bool) -> Self {
        self.config.auto_register = enabled;
        self
    }

    /// Launch through Steam when registering the URL scheme.
    pub fn steam_id(mut self, steam_id: impl Into<String>) -> Self {
        self.config.steam_id = Some(steam_id.into());
        self
    }

    /// Use a custom transport instead of the platform default.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Run the IO side on a background thread.
    ///
    /// Default: true
    pub fn io_thread(mut self, enabled: bool) -> Self {
        self.config.io_thread = enabled;
        self
    }

    /// Set the outbound queue capacity.
    ///
    /// Default: 8
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Set the IO thread poll interval.
    ///
    /// Default: 50 ms
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the frame size limit, clamped to 64 KiB.
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Set the reconnect backoff.
    ///
    /// Default: 500 ms base, 60 s cap, 0.25 jitter
    pub fn backoff(mut self, base: Duration, cap: Duration, jitter: f64) -> Self {
        self.config.backoff_base = base;
        self.config.backoff_cap = cap;
        self.config.backoff_jitter = jitter;
        self
    }

    /// Draw backoff jitter from `rng`.
    pub fn rng(mut self, rng: Box<dyn RngCore + Send>) -> Self {
        self.rng = Some(rng);
        self
    }

    /// The configuration so far.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Build and start the client.
    ///
    /// This will:
    /// 1. Pick the transport
    /// 2. Register the URL scheme handler if asked to
    /// 3. Start the IO thread if enabled
    pub fn start(self) -> Result<Client> {
        let mut config = self.config;
        config.max_frame_size = config.max_frame_size.clamp(HEADER_SIZE + 1, MAX_FRAME_SIZE);

        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport()?,
        };

        if config.auto_register {
            let registered = match config.steam_id.as_deref() {
                Some(steam_id) => register::register_steam_game(&config.app_id, steam_id),
                None => register::register(&config.app_id, None),
            };
            if let Err(e) = registered {
                warn!(error = %e, "URL scheme registration failed");
            }
        }

        let backoff = match self.rng {
            Some(rng) => ExponentialBackoff::with_rng(
                config.backoff_base,
                config.backoff_cap,
                config.backoff_jitter,
                rng,
            ),
            None => ExponentialBackoff::new(config.backoff_base, config.backoff_cap, config.backoff_jitter),
        };
        let connection = Connection::new(transport, config.app_id.clone(), backoff)
            .with_max_payload(config.max_frame_size - HEADER_SIZE);

        let subscriptions = subscription_mask(&self.handlers.subscriptions());
        let shared = Arc::new(Shared::new(config.queue_capacity, subscriptions));
        let io = Arc::new(Mutex::new(IoLoop::new(
            connection,
            shared.clone(),
            config.max_frame_size,
        )));

        let thread = if config.io_thread {
            Some(IoThread::spawn(io.clone(), shared.clone(), config.poll_interval)?)
        } else {
            None
        };

        info!(app_id = %config.app_id, io_thread = config.io_thread, "client started");
        let scratch = Mutex::new(vec![0u8; config.max_frame_size]);
        Ok(Client {
            config,
            shared,
            io,
            thread,
            handlers: self.handlers,
            scratch,
            shut_down: false,
        })
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("config", &self.config)
            .field("custom_transport", &self.transport.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(unix)]
fn default_transport() -> Result<Box<dyn Transport>> {
    Ok(Box::new(crate::transport::UnixSocketTransport::new()))
}

#[cfg(not(unix))]
fn default_transport() -> Result<Box<dyn Transport>> {
    Err(RpcError::NoTransport)
}

/// A running presence client.
///
/// Dropping the client shuts it down.
pub struct Client {
    config: ClientConfig,
    shared: Arc<Shared>,
    io: Arc<Mutex<IoLoop>>,
    thread: Option<IoThread>,
    handlers: Box<dyn EventHandler>,
    /// Frame buffer for trial encodes in [`Client::update_presence`].
    scratch: Mutex<Vec<u8>>,
    shut_down: bool,
}

impl Client {
    /// Create a new client builder.
    pub fn builder(app_id: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(app_id)
    }

    /// Start a client with default settings and a background IO thread.
    pub fn initialize(
        app_id: &str,
        handlers: impl EventHandler + 'static,
        auto_register: bool,
        steam_id: Option<&str>,
    ) -> Result<Self> {
        let mut builder = ClientBuilder::new(app_id)
            .handlers(handlers)
            .auto_register(auto_register);
        if let Some(steam_id) = steam_id {
            builder = builder.steam_id(steam_id);
        }
        builder.start()
    }

    /// Configuration the client was started with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Queue a presence update.
    ///
    /// Over-long fields are truncated to their documented limits.
    ///
    /// # Errors
    ///
    /// - [`RpcError::Overflow`] if the command cannot fit in one frame
    /// - [`RpcError::QueueFull`] if too many commands are pending
    /// - [`RpcError::NotConnected`] after [`Client::shutdown`]
    pub fn update_presence(&self, presence: &RichPresence) -> Result<()> {
        let mut presence = presence.clone();
        presence.clamp_lengths();
        let command = Command::UpdatePresence(Box::new(presence));

        // Widest nonce, so the real encode cannot overflow where this passed.
        {
            let mut scratch = self.scratch.lock().unwrap_or_else(PoisonError::into_inner);
            encode_command(&command, u64::MAX, std::process::id(), &mut scratch)?;
        }

        self.enqueue(command)
    }

    /// Queue a command clearing the presence.
    pub fn clear_presence(&self) -> Result<()> {
        self.enqueue(Command::ClearPresence)
    }

    /// Answer a join request.
    ///
    /// # Errors
    ///
    /// [`RpcError::NotConnected`] while offline, as the request is tied to
    /// the current session.
    pub fn respond(&self, user_id: &str, reply: Reply) -> Result<()> {
        if !self.is_connected() {
            return Err(RpcError::NotConnected);
        }
        self.enqueue(Command::Respond {
            user_id: user_id.to_string(),
            reply,
        })
    }

    /// Replace the event handlers.
    ///
    /// While connected, subscriptions that changed are updated right away;
    /// otherwise they apply on the next connect.
    pub fn update_handlers(&mut self, handlers: impl EventHandler + 'static) -> Result<()> {
        self.handlers = Box::new(handlers);
        let mask = subscription_mask(&self.handlers.subscriptions());
        let previous = self
            .shared
            .subscriptions
            .swap(mask, std::sync::atomic::Ordering::AcqRel);

        if !self.is_connected() || previous == mask {
            return Ok(());
        }

        let mut result = Ok(());
        for kind in EventKind::ALL {
            let command = match (previous & kind.bit() != 0, mask & kind.bit() != 0) {
                (false, true) => Command::Subscribe(kind),
                (true, false) => Command::Unsubscribe(kind),
                _ => continue,
            };
            if let Err(e) = self.enqueue(command) {
                result = result.and(Err(e));
            }
        }
        result
    }

    /// Deliver pending events to the handlers, on the calling thread.
    ///
    /// Each handler fires at most once per call. A disconnect is reported
    /// before `ready` if the connection is back up, and last otherwise.
    pub fn run_callbacks(&mut self) {
        let connected = self.is_connected();
        let pending = self.shared.mailbox.take();
        if pending.is_empty() {
            return;
        }
        debug!(connected, "running callbacks");

        let handlers = &mut self.handlers;
        if connected {
            if let Some((code, message)) = &pending.disconnected {
                handlers.disconnected(*code, message);
            }
        }
        if let Some(user) = &pending.ready {
            handlers.ready(user);
        }
        if let Some((code, message)) = &pending.errored {
            handlers.errored(*code, message);
        }
        if let Some(secret) = &pending.join_game {
            handlers.join_game(secret);
        }
        if let Some(secret) = &pending.spectate_game {
            handlers.spectate_game(secret);
        }
        if let Some(user) = &pending.join_request {
            handlers.join_request(user);
        }
        if !connected {
            if let Some((code, message)) = &pending.disconnected {
                handlers.disconnected(*code, message);
            }
        }
    }

    /// Pump the IO side once from the calling thread.
    pub fn update_connection(&self) {
        if self.shut_down {
            return;
        }
        io_loop::pump(&self.io);
    }

    /// Snapshot of whether the handshake has completed.
    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    /// Stop the IO thread, close the connection and discard queued commands
    /// and undelivered events. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        if let Some(mut thread) = self.thread.take() {
            thread.stop();
        }
        io_loop::close(&self.io);
        self.shared.queue.clear();
        self.shared.mailbox.clear();
        info!("client shut down");
    }

    fn enqueue(&self, command: Command) -> Result<()> {
        if self.shut_down {
            return Err(RpcError::NotConnected);
        }
        let label = command.label();
        if let Err(e) = self.shared.queue.push(command) {
            warn!(command = label, error = %e, "command dropped");
            return Err(e);
        }
        self.shared.wake.notify_one();
        Ok(())
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .field("queued", &self.shared.queue.len())
            .field("shut_down", &self.shut_down)
            .finish_non_exhaustive()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown();
    }
}
