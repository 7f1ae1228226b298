//! TI ADS1115 16-bit delta-sigma ADC.
//!
//! Only single-shot differential conversions are used: one IoTextra
//! analog channel is one differential pair (AIN0-AIN1 or AIN2-AIN3).
//!
//! ## Config register (0x01)
//!
//! | Bits  | Field    | Value used                                  |
//! |-------|----------|---------------------------------------------|
//! | 15    | OS       | 1 = start a conversion / 1 on read = idle   |
//! | 14:12 | MUX      | 000 = AIN0-AIN1, 011 = AIN2-AIN3            |
//! | 11:9  | PGA      | full-scale range, see [`Pga`]               |
//! | 8     | MODE     | 1 = single-shot                             |
//! | 7:5   | DR       | data rate, see [`DataRate`]                 |
//! | 1:0   | COMP_QUE | 11 = comparator disabled                    |

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use super::bus_fault;
use crate::error::HardwareError;

const REG_CONVERSION: u8 = 0x00;
const REG_CONFIG: u8 = 0x01;

const OS_BIT: u16 = 1 << 15;
const MODE_SINGLE_SHOT: u16 = 1 << 8;
const COMP_QUEUE_DISABLE: u16 = 0b11;

/// Completion polls after the nominal conversion time before giving up.
pub const POLL_ATTEMPTS: u8 = 10;
const POLL_INTERVAL_US: u32 = 1_000;

/// Programmable gain amplifier setting (full-scale range).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Pga {
    Fsr6v144 = 0,
    Fsr4v096 = 1,
    Fsr2v048 = 2,
    Fsr1v024 = 3,
    Fsr0v512 = 4,
    Fsr0v256 = 5,
}

impl Pga {
    /// Full-scale input in volts for this gain.
    pub const fn full_scale_volts(self) -> f32 {
        match self {
            Self::Fsr6v144 => 6.144,
            Self::Fsr4v096 => 4.096,
            Self::Fsr2v048 => 2.048,
            Self::Fsr1v024 => 1.024,
            Self::Fsr0v512 => 0.512,
            Self::Fsr0v256 => 0.256,
        }
    }

    const fn bits(self) -> u16 {
        (self as u16) << 9
    }
}

/// Differential input pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffPair {
    Ain0Ain1,
    Ain2Ain3,
}

impl DiffPair {
    /// Pair used by the even/odd channel sharing one converter.
    pub const fn for_channel(channel: u8) -> Self {
        if channel % 2 == 0 { Self::Ain0Ain1 } else { Self::Ain2Ain3 }
    }

    const fn bits(self) -> u16 {
        match self {
            Self::Ain0Ain1 => 0b000 << 12,
            Self::Ain2Ain3 => 0b011 << 12,
        }
    }
}

/// Conversion rate, stored as the 3-bit DR index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataRate(u8);

const RATES_SPS: [u16; 8] = [8, 16, 32, 64, 128, 250, 475, 860];

impl DataRate {
    pub const DEFAULT: Self = Self(4);

    /// Map a samples-per-second figure onto the chip's rate table.
    /// Only the eight rates the chip supports are accepted.
    pub fn from_sps(sps: u16) -> Option<Self> {
        RATES_SPS
            .iter()
            .position(|&r| r == sps)
            .map(|idx| Self(idx as u8))
    }

    pub const fn sps(self) -> u16 {
        RATES_SPS[self.0 as usize]
    }

    /// Nominal time for one conversion, rounded up, plus a small margin.
    pub const fn conversion_us(self) -> u32 {
        1_000_000 / self.sps() as u32 + 100
    }

    /// Longest [`Ads1115::read_raw`] can block: the nominal wait plus
    /// every completion poll.
    pub const fn worst_case_us(self) -> u32 {
        self.conversion_us() + POLL_ATTEMPTS as u32 * POLL_INTERVAL_US
    }

    const fn bits(self) -> u16 {
        (self.0 as u16) << 5
    }
}

impl Default for DataRate {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Build the config-register word that starts one single-shot conversion.
pub const fn config_word(pair: DiffPair, pga: Pga, rate: DataRate) -> u16 {
    OS_BIT | pair.bits() | pga.bits() | MODE_SINGLE_SHOT | rate.bits() | COMP_QUEUE_DISABLE
}

/// One ADS1115 on the shared bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ads1115 {
    addr: u8,
    rate: DataRate,
}

impl Ads1115 {
    pub const fn new(addr: u8, rate: DataRate) -> Self {
        Self { addr, rate }
    }

    pub const fn addr(&self) -> u8 {
        self.addr
    }

    /// Run one conversion and return the signed raw code.
    pub fn read_raw<I: I2c, D: DelayNs>(
        &self,
        bus: &mut I,
        delay: &mut D,
        pair: DiffPair,
        pga: Pga,
    ) -> Result<i16, HardwareError> {
        let [hi, lo] = config_word(pair, pga, self.rate).to_be_bytes();
        bus.write(self.addr, &[REG_CONFIG, hi, lo])
            .map_err(|e| bus_fault(self.addr, e))?;

        delay.delay_us(self.rate.conversion_us());

        for _ in 0..POLL_ATTEMPTS {
            let mut status = [0u8; 2];
            bus.write_read(self.addr, &[REG_CONFIG], &mut status)
                .map_err(|e| bus_fault(self.addr, e))?;
            if u16::from_be_bytes(status) & OS_BIT != 0 {
                let mut raw = [0u8; 2];
                bus.write_read(self.addr, &[REG_CONVERSION], &mut raw)
                    .map_err(|e| bus_fault(self.addr, e))?;
                return Ok(i16::from_be_bytes(raw));
            }
            delay.delay_us(POLL_INTERVAL_US);
        }

        Err(HardwareError::ConversionTimeout { addr: self.addr })
    }

    /// Run one conversion and return the differential input in volts.
    pub fn read_volts<I: I2c, D: DelayNs>(
        &self,
        bus: &mut I,
        delay: &mut D,
        pair: DiffPair,
        pga: Pga,
    ) -> Result<f32, HardwareError> {
        let raw = self.read_raw(bus, delay, pair, pga)?;
        Ok(raw_to_volts(raw, pga))
    }
}

pub fn raw_to_volts(raw: i16, pga: Pga) -> f32 {
    f32::from(raw) * pga.full_scale_volts() / 32_768.0
}
