//! Bounded hand-off between an MQTT client's receive thread and the
//! kernel tick.
//!
//! ```text
//! ┌──────────────┐  Tagged{gen, event}  ┌──────────────┐
//! │  mqtt-rx     │────────────────────▶│  Kernel tick  │
//! │  (blocking)  │    EventQueue (16)   │  (poll_event) │
//! └──────────────┘                      └──────────────┘
//! ```
//!
//! Each connect bumps a generation counter; events tagged with an older
//! generation belong to a torn-down client and are discarded on receipt.
//! When the queue is full, broker messages are dropped and counted.
//! Connection events instead evict the oldest entry, so a lost link is
//! never hidden behind a burst of traffic.

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::app::ports::TransportEvent;

pub const QUEUE_DEPTH: usize = 16;

/// A transport event stamped with the session that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tagged {
    pub generation: u32,
    pub event: TransportEvent,
}

pub struct EventQueue {
    inner: Channel<CriticalSectionRawMutex, Tagged, QUEUE_DEPTH>,
    dropped: AtomicU32,
}

impl EventQueue {
    pub const fn new() -> Self {
        Self {
            inner: Channel::new(),
            dropped: AtomicU32::new(0),
        }
    }

    /// Enqueue from the receive side.  Returns `false` if the event was lost.
    pub fn push(&self, generation: u32, event: TransportEvent) -> bool {
        let control = !matches!(event, TransportEvent::Message(_));
        let tagged = Tagged { generation, event };
        match self.inner.try_send(tagged) {
            Ok(()) => true,
            Err(embassy_sync::channel::TrySendError::Full(tagged)) => {
                if control {
                    let _ = self.inner.try_receive();
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    self.inner.try_send(tagged).is_ok()
                } else {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    false
                }
            }
        }
    }

    pub fn pop(&self) -> Option<Tagged> {
        self.inner.try_receive().ok()
    }

    /// Next event belonging to `generation`; older ones are skipped.
    pub fn pop_current(&self, generation: u32) -> Option<TransportEvent> {
        while let Some(t) = self.pop() {
            if t.generation == generation {
                return Some(t.event);
            }
            log::debug!("mqtt: discarding stale event from session {}", t.generation);
        }
        None
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Events lost to a full queue since boot.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
