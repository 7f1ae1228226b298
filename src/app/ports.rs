//! Port traits: the hexagonal boundary between the kernel and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Kernel (domain)
//! ```
//!
//! Driven adapters (GPIO, MQTT client, clock, config storage, event sinks)
//! implement these traits.  The [`Kernel`](super::service::Kernel) consumes
//! them via generics, so the domain core never touches ESP-IDF directly and
//! every path can be driven from host tests with mocks.

use crate::config::{ConfigDocument, Direction};
use crate::error::{ConfigError, HardwareError, TransportError};
use crate::mqtt::InboundMessage;

use super::events::KernelEvent;

// ───────────────────────────────────────────────────────────────
// GPIO port (driven adapter: domain ↔ host pins)
// ───────────────────────────────────────────────────────────────

/// Direct host GPIO lines used by `DirectLine` channels.
pub trait GpioPort {
    /// Set the pin direction.  Inputs get the pull-up the board expects.
    fn configure(&mut self, pin: u8, direction: Direction) -> Result<(), HardwareError>;

    fn read(&mut self, pin: u8) -> Result<bool, HardwareError>;

    fn write(&mut self, pin: u8, high: bool) -> Result<(), HardwareError>;
}

// ───────────────────────────────────────────────────────────────
// MQTT transport port (driven adapter: domain ↔ broker)
// ───────────────────────────────────────────────────────────────

/// Last-will registration made with every connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Will<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
    pub retained: bool,
}

/// Per-session connect parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions<'a> {
    pub client_id: &'a str,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
    pub keep_alive_secs: u16,
    pub will: Will<'a>,
}

/// What the transport reports back, drained once per tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The broker accepted the connection.
    Connected,
    /// The connection dropped or was refused.
    Disconnected,
    Message(InboundMessage),
}

/// Non-blocking MQTT client.
///
/// `connect` starts a fresh session and returns immediately; the outcome
/// arrives later as a [`TransportEvent`].  A transport is expected to
/// discard any previous session state on `connect` and `disconnect`.
pub trait MqttTransport {
    fn connect(&mut self, opts: &ConnectOptions<'_>) -> Result<(), TransportError>;

    /// Next pending event, if any.  Never blocks.
    fn poll_event(&mut self) -> Option<TransportEvent>;

    fn publish(&mut self, topic: &str, payload: &[u8], retained: bool) -> Result<(), TransportError>;

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Tear the session down.  A clean disconnect suppresses the will.
    fn disconnect(&mut self);

    /// Drop the session without a DISCONNECT packet, so the broker
    /// publishes the will.  Transports that cannot skip the packet fall
    /// back to [`disconnect`](Self::disconnect).
    fn abort(&mut self) {
        self.disconnect();
    }
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic milliseconds since boot.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → MQTT / logging)
// ───────────────────────────────────────────────────────────────

/// The engines emit [`KernelEvent`]s through this port.  Adapters decide
/// where they go (MQTT publish, serial log, a test recorder).
pub trait EventSink {
    fn emit(&mut self, event: &KernelEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration store port (driven adapter: domain ↔ EEPROM)
// ───────────────────────────────────────────────────────────────

/// Persistent home of the configuration document.
///
/// Implementations MUST validate before persisting so a bad document can
/// never be written and brick the node on its next boot.
pub trait ConfigStore {
    fn load_document(&mut self) -> Result<ConfigDocument, StoreError>;

    fn save_document(&mut self, doc: &ConfigDocument) -> Result<(), StoreError>;
}

/// Errors from [`ConfigStore`] operations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StoreError {
    /// Nothing has been stored yet (first boot).
    Empty,
    /// Header or payload failed to decode.
    Corrupted,
    /// Encoded document does not fit the store.
    TooLarge(usize),
    /// Refused to persist a document that does not validate.
    Invalid(ConfigError),
    Hardware(HardwareError),
}

impl core::fmt::Display for StoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Empty => write!(f, "no stored config"),
            Self::Corrupted => write!(f, "stored config corrupted"),
            Self::TooLarge(n) => write!(f, "encoded config too large ({} bytes)", n),
            Self::Invalid(e) => write!(f, "config invalid: {}", e),
            Self::Hardware(e) => write!(f, "storage hardware: {}", e),
        }
    }
}

impl From<HardwareError> for StoreError {
    fn from(e: HardwareError) -> Self {
        Self::Hardware(e)
    }
}
