//! Peripheral drivers: the I2C parts on the IoTextra mezzanine and the
//! task watchdog.
//!
//! Every I2C driver is generic over [`embedded_hal::i2c::I2c`] and takes
//! the bus per call, so a single bus can be shared by the expander, the
//! ADCs and the EEPROM without interior mutability.

pub mod ads1115;
pub mod m24c08;
pub mod pca9554;
pub mod watchdog;

use embedded_hal::i2c::Error as _;
use log::debug;

use crate::error::HardwareError;

/// Collapse a bus-level error into the kernel's hardware error, keeping
/// the device address for the log line.
pub(crate) fn bus_fault<E: embedded_hal::i2c::Error>(addr: u8, err: E) -> HardwareError {
    debug!("i2c 0x{:02x}: {:?}", addr, err.kind());
    HardwareError::I2c { addr }
}
