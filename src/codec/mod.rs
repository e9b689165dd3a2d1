//! Codec module - JSON bodies for outbound frames.
//!
//! - [`JsonWriter`] - bounded-cursor writer that never allocates
//! - [`encode_command`] / [`encode_handshake`] - per-command serializers with
//!   fixed field order
//!
//! Inbound payloads are decoded with `serde_json` in
//! [`handler::dispatcher`](crate::handler::dispatcher).

mod command;
mod json_writer;

pub use command::{encode_command, encode_handshake, Command, EventKind};
pub use json_writer::JsonWriter;
