//! Per-channel behaviour: debounced digital inputs, acknowledged digital
//! outputs, and deadband-filtered analog sampling.
//!
//! Both engines reach the hardware only through
//! [`ChannelIo`](crate::channel::ChannelIo) and report through an
//! [`EventSink`](crate::app::ports::EventSink); neither knows about MQTT.

pub mod analog;
pub mod digital;

pub use analog::AnalogEngine;
pub use digital::DigitalEngine;
