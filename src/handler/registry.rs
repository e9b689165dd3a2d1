//! Application event handlers.
//!
//! Implement [`EventHandler`] directly, or assemble one from closures with
//! [`Handlers`]:
//!
//! ```
//! use presence_ipc::handler::{EventHandler, Handlers};
//! use presence_ipc::EventKind;
//!
//! let handlers = Handlers::new()
//!     .on_ready(|user| println!("connected as {}", user.username))
//!     .on_join_game(|secret| println!("joining {secret}"));
//!
//! assert_eq!(handlers.subscriptions(), vec![EventKind::Join]);
//! ```

use std::fmt;

use crate::activity::User;
use crate::codec::EventKind;

/// Callbacks invoked from [`Client::run_callbacks`](crate::Client::run_callbacks)
/// on the application thread.
///
/// Every method defaults to a no-op.
pub trait EventHandler: Send {
    fn ready(&mut self, _user: &User) {}

    fn disconnected(&mut self, _code: i32, _message: &str) {}

    fn errored(&mut self, _code: i32, _message: &str) {}

    fn join_game(&mut self, _join_secret: &str) {}

    fn spectate_game(&mut self, _spectate_secret: &str) {}

    fn join_request(&mut self, _user: &User) {}

    /// Events to subscribe to once connected.
    fn subscriptions(&self) -> Vec<EventKind> {
        Vec::new()
    }
}

/// Handler that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl EventHandler for NoopHandler {}

impl<H: EventHandler + ?Sized> EventHandler for Box<H> {
    fn ready(&mut self, user: &User) {
        (**self).ready(user)
    }

    fn disconnected(&mut self, code: i32, message: &str) {
        (**self).disconnected(code, message)
    }

    fn errored(&mut self, code: i32, message: &str) {
        (**self).errored(code, message)
    }

    fn join_game(&mut self, join_secret: &str) {
        (**self).join_game(join_secret)
    }

    fn spectate_game(&mut self, spectate_secret: &str) {
        (**self).spectate_game(spectate_secret)
    }

    fn join_request(&mut self, user: &User) {
        (**self).join_request(user)
    }

    fn subscriptions(&self) -> Vec<EventKind> {
        (**self).subscriptions()
    }
}

type UserFn = Box<dyn FnMut(&User) + Send>;
type StatusFn = Box<dyn FnMut(i32, &str) + Send>;
type SecretFn = Box<dyn FnMut(&str) + Send>;

/// Closure-backed [`EventHandler`].
///
/// Subscriptions follow from which closures are set: `on_join_game` subscribes
/// to `ACTIVITY_JOIN`, `on_spectate_game` to `ACTIVITY_SPECTATE` and
/// `on_join_request` to `ACTIVITY_JOIN_REQUEST`.
#[derive(Default)]
pub struct Handlers {
    ready: Option<UserFn>,
    disconnected: Option<StatusFn>,
    errored: Option<StatusFn>,
    join_game: Option<SecretFn>,
    spectate_game: Option<SecretFn>,
    join_request: Option<UserFn>,
}

impl Handlers {
    /// Create a registry with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler called when the connection is ready.
    pub fn on_ready(mut self, f: impl FnMut(&User) + Send + 'static) -> Self {
        self.ready = Some(Box::new(f));
        self
    }

    /// Register the handler called with the disconnect code and reason.
    pub fn on_disconnected(mut self, f: impl FnMut(i32, &str) + Send + 'static) -> Self {
        self.disconnected = Some(Box::new(f));
        self
    }

    /// Register the handler called with a protocol or peer error.
    pub fn on_errored(mut self, f: impl FnMut(i32, &str) + Send + 'static) -> Self {
        self.errored = Some(Box::new(f));
        self
    }

    /// Register the handler called with a join secret. Subscribes to joins.
    pub fn on_join_game(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.join_game = Some(Box::new(f));
        self
    }

    /// Register the handler called with a spectate secret. Subscribes to spectates.
    pub fn on_spectate_game(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.spectate_game = Some(Box::new(f));
        self
    }

    /// Register the handler called when a user asks to join. Subscribes to join requests.
    pub fn on_join_request(mut self, f: impl FnMut(&User) + Send + 'static) -> Self {
        self.join_request = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("ready", &self.ready.is_some())
            .field("disconnected", &self.disconnected.is_some())
            .field("errored", &self.errored.is_some())
            .field("join_game", &self.join_game.is_some())
            .field("spectate_game", &self.spectate_game.is_some())
            .field("join_request", &self.join_request.is_some())
            .finish()
    }
}

impl EventHandler for Handlers {
    fn ready(&mut self, user: &User) {
        if let Some(f) = self.ready.as_mut() {
            f(user);
        }
    }

    fn disconnected(&mut self, code: i32, message: &str) {
        if let Some(f) = self.disconnected.as_mut() {
            f(code, message);
        }
    }

    fn errored(&mut self, code: i32, message: &str) {
        if let Some(f) = self.errored.as_mut() {
            f(code, message);
        }
    }

    fn join_game(&mut self, join_secret: &str) {
        if let Some(f) = self.join_game.as_mut() {
            f(join_secret);
        }
    }

    fn spectate_game(&mut self, spectate_secret: &str) {
        if let Some(f) = self.spectate_game.as_mut() {
            f(spectate_secret);
        }
    }

    fn join_request(&mut self, user: &User) {
        if let Some(f) = self.join_request.as_mut() {
            f(user);
        }
    }

    fn subscriptions(&self) -> Vec<EventKind> {
        let mut kinds = Vec::new();
        if self.join_game.is_some() {
            kinds.push(EventKind::Join);
        }
        if self.spectate_game.is_some() {
            kinds.push(EventKind::Spectate);
        }
        if self.join_request.is_some() {
            kinds.push(EventKind::JoinRequest);
        }
        kinds
    }
}

/// Fold a subscription list into a bit mask.
pub(crate) fn subscription_mask(kinds: &[EventKind]) -> u8 {
    kinds.iter().fold(0, |mask, kind| mask | kind.bit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_closures_invoked() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let mut handlers = Handlers::new().on_errored(move |code, message| {
            log.lock().unwrap().push(format!("{code}:{message}"));
        });

        handlers.errored(7, "boom");
        handlers.ready(&User::default());
        assert_eq!(*seen.lock().unwrap(), vec!["7:boom".to_string()]);
    }

    #[test]
    fn test_subscriptions_follow_closures() {
        let handlers = Handlers::new()
            .on_ready(|_| {})
            .on_join_request(|_| {})
            .on_spectate_game(|_| {});
        assert_eq!(
            handlers.subscriptions(),
            vec![EventKind::Spectate, EventKind::JoinRequest]
        );
        assert_eq!(subscription_mask(&handlers.subscriptions()), 0b110);
        assert!(NoopHandler.subscriptions().is_empty());
    }

    #[test]
    fn test_boxed_handler_forwards() {
        let mut boxed: Box<dyn EventHandler> = Box::new(Handlers::new().on_join_game(|_| {}));
        assert_eq!(boxed.subscriptions(), vec![EventKind::Join]);
        boxed.join_game("secret");
    }
}
