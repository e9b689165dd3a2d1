//! Single-slot-per-class event hand-off from the IO side to the application.
//!
//! Publishing overwrites whatever is already in the slot for that class, so a
//! slow `run_callbacks` caller only ever sees the latest event of each kind.

use std::sync::{Mutex, MutexGuard, PoisonError};

use super::InboundEvent;
use crate::activity::User;

/// Everything drained by one [`Mailbox::take`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pending {
    /// The user from the latest READY.
    pub ready: Option<User>,
    /// Code and message of the latest disconnect.
    pub disconnected: Option<(i32, String)>,
    /// Code and message of the latest error.
    pub errored: Option<(i32, String)>,
    /// Join secret.
    pub join_game: Option<String>,
    /// Spectate secret.
    pub spectate_game: Option<String>,
    /// The user asking to join.
    pub join_request: Option<User>,
}

impl Pending {
    /// Whether no slot holds an event.
    pub fn is_empty(&self) -> bool {
        *self == Pending::default()
    }
}

/// Last-write-wins slots shared by the IO side and the application thread.
#[derive(Debug, Default)]
pub struct Mailbox {
    slots: Mutex<Pending>,
}

impl Mailbox {
    /// Create an empty mailbox.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `event`, replacing any undelivered event of the same class.
    pub fn publish(&self, event: InboundEvent) {
        let mut slots = self.lock();
        match event {
            InboundEvent::Ready(user) => slots.ready = Some(user),
            InboundEvent::Disconnected { code, message } => slots.disconnected = Some((code, message)),
            InboundEvent::Errored { code, message } => slots.errored = Some((code, message)),
            InboundEvent::JoinGame(secret) => slots.join_game = Some(secret),
            InboundEvent::SpectateGame(secret) => slots.spectate_game = Some(secret),
            InboundEvent::JoinRequest(user) => slots.join_request = Some(user),
        }
    }

    /// Drain every slot at once.
    pub fn take(&self) -> Pending {
        std::mem::take(&mut *self.lock())
    }

    /// Drop every undelivered event.
    pub fn clear(&self) {
        *self.lock() = Pending::default();
    }
}
