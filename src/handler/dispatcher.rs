//! Inbound payload classification.
//!
//! Every Message frame body is a JSON object with `cmd`, `evt`, `nonce` and
//! `data` members. Only events the application has handlers for are turned
//! into [`InboundEvent`]s; command responses and unknown events are dropped.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::activity::User;
use crate::error::Result;

/// An event waiting to be delivered to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Ready(User),
    Disconnected { code: i32, message: String },
    Errored { code: i32, message: String },
    JoinGame(String),
    SpectateGame(String),
    JoinRequest(User),
}

/// Top-level shape of every inbound message.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Envelope {
    /// Command name; `DISPATCH` for events.
    #[serde(default)]
    pub cmd: Option<String>,
    /// Event name for dispatches and errors.
    #[serde(default)]
    pub evt: Option<String>,
    /// Echo of the request nonce, `null` for events.
    #[serde(default)]
    pub nonce: Value,
    /// Event or response payload.
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Parse a frame body.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Whether this is the `DISPATCH`/`READY` message completing the handshake.
    pub fn is_ready(&self) -> bool {
        self.cmd.as_deref() == Some("DISPATCH") && self.evt.as_deref() == Some("READY")
    }

    /// The `data.user` object, if present and well-formed.
    pub fn user(&self) -> Option<User> {
        User::deserialize(self.data.get("user")?).ok()
    }

    /// `(code, message)` from an `ERROR` payload.
    pub fn error(&self) -> Option<(i32, String)> {
        let data = ErrorData::deserialize(&self.data).ok()?;
        Some((data.code, data.message))
    }
}

#[derive(Deserialize)]
struct ErrorData {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct SecretData {
    secret: String,
}

/// Classify a raw Message body.
///
/// # Errors
///
/// Returns a JSON error if the body is not a JSON object.
pub fn classify(payload: &[u8]) -> Result<Option<InboundEvent>> {
    Ok(classify_envelope(&Envelope::parse(payload)?))
}

/// Classify an already parsed message.
pub fn classify_envelope(envelope: &Envelope) -> Option<InboundEvent> {
    let evt = envelope.evt.as_deref()?;
    let event = match evt {
        "ERROR" => {
            let (code, message) = envelope.error().unwrap_or_default();
            InboundEvent::Errored { code, message }
        }
        "ACTIVITY_JOIN" => InboundEvent::JoinGame(secret(envelope)?),
        "ACTIVITY_SPECTATE" => InboundEvent::SpectateGame(secret(envelope)?),
        "ACTIVITY_JOIN_REQUEST" => match envelope.user() {
            Some(user) => InboundEvent::JoinRequest(user),
            None => {
                warn!("join request without a user");
                return None;
            }
        },
        other => {
            debug!(evt = other, "ignoring event");
            return None;
        }
    };
    Some(event)
}

fn secret(envelope: &Envelope) -> Option<String> {
    match SecretData::deserialize(&envelope.data) {
        Ok(data) => Some(data.secret),
        Err(e) => {
            warn!(evt = ?envelope.evt, error = %e, "event without a secret");
            None
        }
    }
}
