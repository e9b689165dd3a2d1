//! Handler module - inbound events and application callbacks.
//!
//! Provides:
//! - [`classify`] - turns a Message body into an [`InboundEvent`]
//! - [`Mailbox`] - last-write-wins hand-off to the application thread
//! - [`EventHandler`] / [`Handlers`] - the callbacks `run_callbacks` invokes

pub mod dispatcher;
mod mailbox;
mod registry;

pub use dispatcher::{classify, classify_envelope, Envelope, InboundEvent};
pub use mailbox::{Mailbox, Pending};
pub(crate) use registry::subscription_mask;
pub use registry::{EventHandler, Handlers, NoopHandler};
