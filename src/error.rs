//! Error taxonomy for the IoTflow kernel.
//!
//! Four families, each with its own recovery rule:
//!
//! | Family           | Raised by                 | Recovery                        |
//! |------------------|---------------------------|---------------------------------|
//! | `ConfigError`    | config load / validation  | fatal at boot                   |
//! | `TransportError` | MQTT session              | reconnect with backoff          |
//! | `HardwareError`  | channel I/O, I2C drivers  | skip the channel for this tick  |
//! | `ProtocolError`  | topic router, dispatch    | log and discard the message     |
//!
//! All variants are `Copy` so they can be logged and passed around the
//! scheduler tick without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level kernel error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Error {
    Config(ConfigError),
    Transport(TransportError),
    Hardware(HardwareError),
    Protocol(ProtocolError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Hardware(e) => write!(f, "hardware: {e}"),
            Self::Protocol(e) => write!(f, "protocol: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Why a configuration document was refused.
///
/// Any of these stops the node before a single channel is created.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigError {
    /// The document does not parse against the schema.
    Malformed { line: usize, column: usize },
    /// The bank must declare exactly eight channels.
    ChannelCount(usize),
    /// A channel id is outside 0..=7.
    ChannelIdOutOfRange(u8),
    /// Two entries claim the same channel id.
    DuplicateChannel(u8),
    /// The channel's interface has no wiring on this board.
    InterfaceNotWired { channel: u8, interface: &'static str },
    /// Analog channels are input-only.
    AnalogOutput(u8),
    /// Unknown measurement range code on an analog channel.
    UnknownRange { channel: u8, code: u8 },
    /// Gain, shunt or offset of an analog channel is unusable.
    BadScaling(u8),
    /// Two GPIO channels map to the same host pin.
    PinConflict(u8),
    /// A GPIO channel sits on a line the board already uses (the I2C bus).
    ReservedPin(u8),
    /// One worst-case ADC conversion does not fit inside the debounce
    /// window, so sampling would hold up input scanning.
    ConversionTooSlow { worst_case_us: u32, debounce_ms: u32 },
    NegativeDeadband,
    ZeroDebounce,
    ZeroSampleInterval,
    ZeroHeartbeat,
    /// A named field is empty, zero, or out of range.
    InvalidField(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { line, column } => {
                write!(f, "malformed document at line {line}, column {column}")
            }
            Self::ChannelCount(n) => write!(f, "expected 8 channels, found {n}"),
            Self::ChannelIdOutOfRange(id) => write!(f, "channel id {id} out of range 0..=7"),
            Self::DuplicateChannel(id) => write!(f, "channel {id} declared twice"),
            Self::InterfaceNotWired { channel, interface } => {
                write!(f, "channel {channel}: interface '{interface}' is not wired on this board")
            }
            Self::AnalogOutput(id) => write!(f, "channel {id}: analog channels cannot be outputs"),
            Self::UnknownRange { channel, code } => {
                write!(f, "channel {channel}: unknown measurement range 0b{code:08b}")
            }
            Self::BadScaling(id) => write!(f, "channel {id}: gain, shunt or offset out of range"),
            Self::PinConflict(pin) => write!(f, "GPIO {pin} assigned to more than one channel"),
            Self::ReservedPin(pin) => write!(f, "GPIO {pin} is reserved for the I2C bus"),
            Self::ConversionTooSlow { worst_case_us, debounce_ms } => write!(
                f,
                "ADC conversion takes up to {worst_case_us} us, longer than the {debounce_ms} ms debounce window"
            ),
            Self::NegativeDeadband => write!(f, "deadband must be a non-negative number"),
            Self::ZeroDebounce => write!(f, "debounce window must be greater than zero"),
            Self::ZeroSampleInterval => write!(f, "analog sample interval must be greater than zero"),
            Self::ZeroHeartbeat => write!(f, "analog heartbeat must be greater than zero when set"),
            Self::InvalidField(field) => write!(f, "invalid field '{field}'"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The session is not in `Connected`; the message was dropped.
    NotConnected,
    /// The client could not be created or the broker refused the connection.
    ConnectFailed,
    /// No CONNACK arrived within the connect timeout.
    ConnectTimeout,
    PublishFailed,
    SubscribeFailed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected"),
            Self::ConnectFailed => write!(f, "connect failed"),
            Self::ConnectTimeout => write!(f, "connect timed out"),
            Self::PublishFailed => write!(f, "publish failed"),
            Self::SubscribeFailed => write!(f, "subscribe failed"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Hardware errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareError {
    /// An I2C transaction with the device at `addr` failed.
    I2c { addr: u8 },
    GpioConfig { pin: u8 },
    GpioRead { pin: u8 },
    GpioWrite { pin: u8 },
    /// The ADC at `addr` never reported a finished conversion.
    ConversionTimeout { addr: u8 },
    /// EEPROM write cycle did not complete in time.
    WriteCycleTimeout { addr: u8 },
    /// Access beyond the end of the EEPROM array.
    AddressOutOfRange,
    /// Write requested on an input or analog channel.
    NotWritable,
    /// No device backs this channel (board not populated).
    NoBacking,
}

impl fmt::Display for HardwareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I2c { addr } => write!(f, "I2C transaction with 0x{addr:02x} failed"),
            Self::GpioConfig { pin } => write!(f, "GPIO {pin} config failed"),
            Self::GpioRead { pin } => write!(f, "GPIO {pin} read failed"),
            Self::GpioWrite { pin } => write!(f, "GPIO {pin} write failed"),
            Self::ConversionTimeout { addr } => {
                write!(f, "ADC 0x{addr:02x} conversion timed out")
            }
            Self::WriteCycleTimeout { addr } => {
                write!(f, "EEPROM 0x{addr:02x} write cycle timed out")
            }
            Self::AddressOutOfRange => write!(f, "EEPROM access out of range"),
            Self::NotWritable => write!(f, "channel is not writable"),
            Self::NoBacking => write!(f, "no device backs this channel"),
        }
    }
}

impl From<HardwareError> for Error {
    fn from(e: HardwareError) -> Self {
        Self::Hardware(e)
    }
}

// ---------------------------------------------------------------------------
// Protocol errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Topic is outside `<base>/output/<c>/set`.
    UnknownTopic,
    /// Channel segment is not a decimal index in 0..=7.
    BadChannel,
    /// The addressed channel is not a digital output.
    NotAnOutput(u8),
    /// Payload is not one of `0`, `1`, `true`, `false`.
    BadPayload,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTopic => write!(f, "unknown topic"),
            Self::BadChannel => write!(f, "bad channel index"),
            Self::NotAnOutput(id) => write!(f, "channel {id} is not a digital output"),
            Self::BadPayload => write!(f, "payload is not 0/1/true/false"),
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Kernel-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
