//! Measurement ranges and engineering-unit scaling for analog channels.
//!
//! A range code is one byte: bit 7 set = bipolar, bit 5 set = current
//! loop, low bits = span.  Each range also fixes the ADS1115 gain that
//! keeps the conditioned signal inside the converter's full scale.

use core::fmt;

use crate::drivers::ads1115::Pga;

pub const DEFAULT_RANGE_CODE: u8 = 0b0000_0010;
/// Front-end divider ratio of the IoTextra analog inputs.
pub const DEFAULT_HARDWARE_GAIN: f32 = 0.237_619_05;
pub const DEFAULT_SHUNT_OHMS: f32 = 0.249;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Volts,
    Milliamps,
}

impl Unit {
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Volts => "V",
            Self::Milliamps => "mA",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementRange {
    pub code: u8,
    pub unit: Unit,
    pub min: f32,
    pub max: f32,
    pub pga: Pga,
}

const fn range(code: u8, unit: Unit, min: f32, max: f32, pga: Pga) -> MeasurementRange {
    MeasurementRange { code, unit, min, max, pga }
}

const RANGES: [MeasurementRange; 10] = [
    range(0b0000_0001, Unit::Volts, 0.0, 0.5, Pga::Fsr0v512),
    range(0b0000_0010, Unit::Volts, 0.0, 5.0, Pga::Fsr4v096),
    range(0b0000_0011, Unit::Volts, 0.0, 10.0, Pga::Fsr6v144),
    range(0b1000_0001, Unit::Volts, -0.5, 0.5, Pga::Fsr0v512),
    range(0b1000_0010, Unit::Volts, -5.0, 5.0, Pga::Fsr4v096),
    range(0b1000_0011, Unit::Volts, -10.0, 10.0, Pga::Fsr6v144),
    range(0b0010_0001, Unit::Milliamps, 0.0, 20.0, Pga::Fsr4v096),
    range(0b1010_0001, Unit::Milliamps, -20.0, 20.0, Pga::Fsr4v096),
    range(0b0010_0010, Unit::Milliamps, 4.0, 20.0, Pga::Fsr4v096),
    range(0b0010_0011, Unit::Milliamps, 0.0, 40.0, Pga::Fsr6v144),
];

impl MeasurementRange {
    pub fn from_code(code: u8) -> Option<Self> {
        RANGES.iter().copied().find(|r| r.code == code)
    }

    pub const fn is_bipolar(&self) -> bool {
        self.code & 0b1000_0000 != 0
    }

    pub const fn is_current(&self) -> bool {
        self.code & 0b0010_0000 != 0
    }
}

/// Per-channel conversion from converter volts to the channel's unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalogScaling {
    pub range: MeasurementRange,
    pub hardware_gain: f32,
    pub shunt_ohms: f32,
    pub offset: f32,
}

impl AnalogScaling {
    pub fn to_physical(&self, adc_volts: f32) -> f32 {
        let scaled = adc_volts / self.hardware_gain;
        let value = match self.range.unit {
            Unit::Volts => scaled,
            Unit::Milliamps => scaled / self.shunt_ohms,
        };
        (value + self.offset).clamp(self.range.min, self.range.max)
    }

    pub const fn unit(&self) -> Unit {
        self.range.unit
    }
}
