//! Outbound kernel events.
//!
//! The engines emit these through the [`EventSink`](super::ports::EventSink)
//! port.  The kernel's MQTT sink maps each one onto a topic with the
//! [`TopicRouter`](crate::mqtt::topics::TopicRouter).

use crate::channel::analog::Unit;
use crate::channel::ChannelId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelEvent {
    /// A debounced digital input changed state.
    InputChanged { channel: ChannelId, value: bool },

    /// An output write was confirmed by the hardware; carries the applied value.
    OutputConfirmed { channel: ChannelId, value: bool },

    /// An analog reading passed the deadband (or heartbeat) filter.
    AnalogSample { channel: ChannelId, value: f32, unit: Unit },

    /// Periodic liveness refresh while connected.
    StatusOnline,
}
