//! Fixed board wiring of the IoTbase PICO host.
//!
//! Channel GPIOs and I2C device addresses come from the configuration
//! document; only what must be known before the document is read lives
//! here.

/// GPIO numbers run 0..=48 on the ESP32-S3.
pub const GPIO_COUNT: u8 = 49;

// ---------------------------------------------------------------------------
// I²C bus (mezzanine connector)
// ---------------------------------------------------------------------------

pub const I2C_SDA_GPIO: i32 = 8;
pub const I2C_SCL_GPIO: i32 = 9;
/// Standard mode; the M24C08 and PCA9554 both top out at 400 kHz.
pub const I2C_BAUD_HZ: u32 = 100_000;

// ---------------------------------------------------------------------------
// Configuration EEPROM
// ---------------------------------------------------------------------------

/// M24C08 as strapped on the mezzanine; the driver masks the block bits,
/// so the chip answers on 0x54..=0x57.
pub const CONFIG_EEPROM_ADDR: u8 = 0x57;
