//! Outbound command queue.
//!
//! Fixed-capacity ring buffer between the application thread (producer) and
//! the IO loop (consumer). A full queue rejects the new command; queued
//! commands are never reordered or evicted.
//!
//! The ring itself sits behind a mutex. An atomic mirror of the length lets
//! `len()` and `is_empty()` answer without taking the lock, the same way the
//! writer tracks pending frames.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::codec::Command;
use crate::error::{Result, RpcError};

/// Default number of queued commands.
pub const DEFAULT_QUEUE_CAPACITY: usize = 8;

#[derive(Debug)]
struct Ring {
    slots: Vec<Option<Command>>,
    head: usize,
    len: usize,
}

/// Bounded FIFO of owned commands.
#[derive(Debug)]
pub struct OutboundQueue {
    ring: Mutex<Ring>,
    len: AtomicUsize,
    capacity: usize,
}

impl OutboundQueue {
    /// Create a queue holding at most `capacity` commands (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: Mutex::new(Ring {
                slots: (0..capacity).map(|_| None).collect(),
                head: 0,
                len: 0,
            }),
            len: AtomicUsize::new(0),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ring> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a command.
    ///
    /// # Errors
    ///
    /// [`RpcError::QueueFull`] when `capacity` commands are already queued.
    pub fn push(&self, command: Command) -> Result<()> {
        let mut ring = self.lock();
        if ring.len == self.capacity {
            return Err(RpcError::QueueFull);
        }
        let tail = (ring.head + ring.len) % self.capacity;
        trace!(command = command.label(), slot = tail, "queued");
        ring.slots[tail] = Some(command);
        ring.len += 1;
        self.len.store(ring.len, Ordering::Release);
        Ok(())
    }

    /// Remove and return the oldest command.
    pub fn pop(&self) -> Option<Command> {
        let mut ring = self.lock();
        if ring.len == 0 {
            return None;
        }
        let head = ring.head;
        let command = ring.slots[head].take();
        ring.head = (head + 1) % self.capacity;
        ring.len -= 1;
        self.len.store(ring.len, Ordering::Release);
        command
    }

    /// Discard everything queued.
    pub fn clear(&self) {
        let mut ring = self.lock();
        ring.slots.iter_mut().for_each(|slot| *slot = None);
        ring.head = 0;
        ring.len = 0;
        self.len.store(0, Ordering::Release);
    }

    /// Snapshot of the number of queued commands.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of queued commands.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
