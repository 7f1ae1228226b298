//! Analog sampling engine.
//!
//! All analog channels share one [`Periodic`] timer.  Each time it fires a
//! sweep starts, and every [`AnalogEngine::poll`] then reads the next
//! channel still pending, so a tick never waits on more than one ADC
//! conversion.  A reading is published if it passes the filter:
//!
//! * no deadband configured: always;
//! * no previous publish: always;
//! * `|value - last_published| > deadband`;
//! * heartbeat configured and at least that long since the last publish.

use log::debug;

use crate::app::events::KernelEvent;
use crate::app::ports::EventSink;
use crate::channel::analog::Unit;
use crate::channel::{Backing, ChannelId, ChannelIo, CHANNEL_COUNT};
use crate::config::KernelConfig;
use crate::scheduler::Periodic;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalogSlot {
    pub unit: Unit,
    pub last_published: Option<f32>,
    pub last_publish_ms: u64,
}

/// Publish decision for one sample.
pub fn passes_filter(
    deadband: Option<f32>,
    heartbeat_ms: Option<u32>,
    slot: &AnalogSlot,
    value: f32,
    now_ms: u64,
) -> bool {
    let Some(last) = slot.last_published else {
        return true;
    };
    let Some(theta) = deadband else {
        return true;
    };
    if (value - last).abs() > theta {
        return true;
    }
    heartbeat_ms.is_some_and(|h| now_ms.saturating_sub(slot.last_publish_ms) >= u64::from(h))
}

pub struct AnalogEngine {
    timer: Periodic,
    deadband: Option<f32>,
    heartbeat_ms: Option<u32>,
    slots: [Option<AnalogSlot>; CHANNEL_COUNT],
    /// Bit per channel id still to be read in the current sweep.
    pending: u8,
}

impl AnalogEngine {
    pub fn new(config: &KernelConfig) -> Self {
        let slots = core::array::from_fn(|i| match config.channels[i].backing {
            Backing::AdcPair { scaling, .. } => Some(AnalogSlot {
                unit: scaling.unit(),
                last_published: None,
                last_publish_ms: 0,
            }),
            _ => None,
        });
        Self {
            timer: Periodic::new(u64::from(config.timing.analog_interval_ms)),
            deadband: config.deadband,
            heartbeat_ms: config.heartbeat_ms,
            slots,
            pending: 0,
        }
    }

    pub fn slot(&self, id: ChannelId) -> Option<&AnalogSlot> {
        self.slots[id.index()].as_ref()
    }

    pub fn sweep_pending(&self) -> bool {
        self.pending != 0
    }

    /// Forget what was published and sample on the next poll.  A new
    /// broker session has no memory of earlier readings.
    pub fn resync(&mut self) {
        self.timer.reset();
        for slot in self.slots.iter_mut().flatten() {
            slot.last_published = None;
        }
    }

    /// One step of the sweep: start a new one when the interval has
    /// elapsed, then read at most one pending channel.  Returns whether a
    /// reading was published.
    pub fn poll(&mut self, now_ms: u64, io: &mut impl ChannelIo, sink: &mut impl EventSink) -> bool {
        if self.timer.poll(now_ms) {
            self.pending |= self.sweep_mask();
        }
        if self.pending == 0 {
            return false;
        }
        let next = self.pending.trailing_zeros() as u8;
        self.pending &= !(1 << next);
        match ChannelId::new(next) {
            Some(id) => self.sample(id, now_ms, io, sink),
            None => false,
        }
    }

    /// Read one channel now and publish it if it passes the filter.
    /// Channels without an analog slot are ignored.
    pub fn sample(&mut self, id: ChannelId, now_ms: u64, io: &mut impl ChannelIo, sink: &mut impl EventSink) -> bool {
        let Some(slot) = self.slots[id.index()].as_mut() else {
            return false;
        };
        let value = match io.read(id).map(|v| v.as_analog()) {
            Ok(Some(v)) => v,
            Ok(None) => return false,
            Err(e) => {
                debug!("analog {}: sample skipped: {}", id, e);
                return false;
            }
        };
        if !passes_filter(self.deadband, self.heartbeat_ms, slot, value, now_ms) {
            return false;
        }
        slot.last_published = Some(value);
        slot.last_publish_ms = now_ms;
        sink.emit(&KernelEvent::AnalogSample { channel: id, value, unit: slot.unit });
        true
    }

    fn sweep_mask(&self) -> u8 {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .fold(0u8, |mask, (i, _)| mask | 1u8 << i)
    }
}
