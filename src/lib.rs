//! # presence-ipc
//!
//! Rich presence client for a locally running chat peer.
//!
//! An application publishes what the user is doing ("Playing", "In a match",
//! party size, buttons) to the peer over a local socket, and receives events
//! back: ready, errors, and join/spectate requests from other users.
//!
//! ## Architecture
//!
//! - **Protocol**: 8-byte little-endian header (opcode, length) + UTF-8 JSON
//! - **Connection**: non-blocking state machine with handshake, keep-alive
//!   and exponential reconnect backoff
//! - **Hand-off**: bounded outbound queue and last-write-wins inbound mailbox
//!   between the application thread and the IO side
//!
//! ## Example
//!
//! ```no_run
//! use presence_ipc::handler::Handlers;
//! use presence_ipc::{Client, Reply, RichPresence};
//!
//! # fn main() -> presence_ipc::Result<()> {
//! let handlers = Handlers::new()
//!     .on_ready(|user| println!("connected as {}", user.username))
//!     .on_join_request(|user| println!("{} wants to join", user.username));
//!
//! let mut client = Client::initialize("1234", handlers, false, None)?;
//! client.update_presence(&RichPresence {
//!     state: "Exploring".into(),
//!     details: "Level 5".into(),
//!     start_timestamp: 1_700_000_000,
//!     ..Default::default()
//! })?;
//!
//! // Once per frame:
//! client.run_callbacks();
//! # Ok(())
//! # }
//! ```

pub mod activity;
pub mod backoff;
pub mod codec;
pub mod connection;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod queue;
pub mod register;
pub mod transport;

mod client;
mod io_loop;

pub use activity::{
    ActivityType, Button, PartyPrivacy, Reply, RichPresence, StatusDisplayType, User,
};
pub use client::{Client, ClientBuilder, ClientConfig, DEFAULT_POLL_INTERVAL};
pub use codec::{Command, EventKind};
pub use connection::{Connection, ConnectionEvent, ConnectionState};
pub use error::{Result, RpcError};
pub use handler::{EventHandler, Handlers};
