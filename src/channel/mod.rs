//! Channel abstraction.
//!
//! Every node exposes a fixed bank of [`CHANNEL_COUNT`] channels.  The
//! engines only ever see [`ChannelIo`]: a channel id in, a value out.
//! Which physical mechanism sits behind an id (a GPIO line, a bit of the
//! I2C expander, a differential pair on an ADS1115) is decided once from
//! the configuration and recorded as the channel's [`Backing`].
//!
//! ```text
//!   DigitalEngine ─┐                     ┌─▶ GpioPort        (DirectLine)
//!                  ├─▶ ChannelIo ─▶ Bank ├─▶ Pca9554 over I2C (ExpanderRegister)
//!   AnalogEngine ──┘                     └─▶ Ads1115 over I2C (AdcPair)
//! ```

pub mod analog;

use core::fmt;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::info;

use crate::app::ports::GpioPort;
use crate::config::{Direction, KernelConfig, MAX_ADCS, SignalKind};
use crate::drivers::ads1115::{Ads1115, DiffPair};
use crate::drivers::pca9554::Pca9554;
use crate::error::HardwareError;
use analog::AnalogScaling;

/// Channels per node.
pub const CHANNEL_COUNT: usize = 8;

// ---------------------------------------------------------------------------
// Identity and values
// ---------------------------------------------------------------------------

/// Zero-based channel index, guaranteed `< CHANNEL_COUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(u8);

impl ChannelId {
    pub const fn new(raw: u8) -> Option<Self> {
        if (raw as usize) < CHANNEL_COUNT {
            Some(Self(raw))
        } else {
            None
        }
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub fn all() -> impl Iterator<Item = Self> {
        (0..CHANNEL_COUNT as u8).map(Self)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Instantaneous physical value of a channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelValue {
    Digital(bool),
    Analog(f32),
}

impl ChannelValue {
    pub const fn as_digital(self) -> Option<bool> {
        match self {
            Self::Digital(v) => Some(v),
            Self::Analog(_) => None,
        }
    }

    pub const fn as_analog(self) -> Option<f32> {
        match self {
            Self::Analog(v) => Some(v),
            Self::Digital(_) => None,
        }
    }
}

/// Uniform access to the channel bank.
///
/// Failures are reported, never retried here; the engines decide what a
/// failed read or write means for their state machines.
pub trait ChannelIo {
    fn read(&mut self, id: ChannelId) -> Result<ChannelValue, HardwareError>;

    /// Drive a digital output.  Inputs and analog channels refuse with
    /// [`HardwareError::NotWritable`].
    fn write(&mut self, id: ChannelId, value: bool) -> Result<(), HardwareError>;
}

// ---------------------------------------------------------------------------
// Backing
// ---------------------------------------------------------------------------

/// Physical mechanism behind a channel, fixed at boot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backing {
    /// A host GPIO line.
    DirectLine { pin: u8 },
    /// One bit of the I2C port expander.
    ExpanderRegister { bit: u8 },
    /// A differential pair on one of the ADCs (index into the ADC list).
    AdcPair { adc: u8, pair: DiffPair, scaling: AnalogScaling },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Channel {
    pub id: ChannelId,
    pub direction: Direction,
    pub kind: SignalKind,
    pub backing: Backing,
}

// ---------------------------------------------------------------------------
// Channel bank
// ---------------------------------------------------------------------------

/// Bus handles the bank drives.  The I2C bus is shared by the expander
/// and every ADC.
pub struct IoHal<I, G, D> {
    pub i2c: I,
    pub gpio: G,
    pub delay: D,
}

/// The eight configured channels over real (or mock) buses.
pub struct ChannelBank<I, G, D> {
    hal: IoHal<I, G, D>,
    channels: [Channel; CHANNEL_COUNT],
    expander: Option<Pca9554>,
    adcs: heapless::Vec<Ads1115, MAX_ADCS>,
    /// Last value written to each GPIO output line.
    latched: [bool; CHANNEL_COUNT],
}

impl<I: I2c, G: GpioPort, D: DelayNs> ChannelBank<I, G, D> {
    /// Bring every channel to its configured direction with outputs low.
    ///
    /// Only accepts a validated [`KernelConfig`], so every backing here is
    /// known to be wired.
    pub fn new(config: &KernelConfig, mut hal: IoHal<I, G, D>) -> Result<Self, HardwareError> {
        let channels: [Channel; CHANNEL_COUNT] = core::array::from_fn(|i| {
            let c = &config.channels[i];
            Channel {
                id: c.id,
                direction: c.direction,
                kind: c.kind,
                backing: c.backing,
            }
        });

        for ch in &channels {
            if let Backing::DirectLine { pin } = ch.backing {
                hal.gpio.configure(pin, ch.direction)?;
                if ch.direction == Direction::Output {
                    hal.gpio.write(pin, false)?;
                }
            }
        }

        let expander = match config.hardware.expander_addr {
            Some(addr) if channels.iter().any(|c| matches!(c.backing, Backing::ExpanderRegister { .. })) => {
                let mut exp = Pca9554::new(addr, expander_input_mask(&channels));
                exp.init(&mut hal.i2c)?;
                Some(exp)
            }
            _ => None,
        };

        let adcs = config
            .hardware
            .adc_addrs
            .iter()
            .map(|&addr| Ads1115::new(addr, config.hardware.adc_rate))
            .collect();

        info!(
            "channel bank ready: expander={:?} adcs={}",
            expander.map(|e| e.addr()),
            config.hardware.adc_addrs.len()
        );

        Ok(Self {
            hal,
            channels,
            expander,
            adcs,
            latched: [false; CHANNEL_COUNT],
        })
    }

    pub fn channel(&self, id: ChannelId) -> &Channel {
        &self.channels[id.index()]
    }

    pub fn channels(&self) -> &[Channel; CHANNEL_COUNT] {
        &self.channels
    }

    pub fn hal(&self) -> &IoHal<I, G, D> {
        &self.hal
    }

    pub fn hal_mut(&mut self) -> &mut IoHal<I, G, D> {
        &mut self.hal
    }

    /// Hand the buses back, e.g. to rebuild the bank after a reload.
    pub fn into_hal(self) -> IoHal<I, G, D> {
        self.hal
    }
}

/// Expander direction mask: only digital outputs on the expander are 0;
/// unused bits stay high-impedance inputs.
fn expander_input_mask(channels: &[Channel; CHANNEL_COUNT]) -> u8 {
    channels.iter().fold(0xFF, |mask, ch| match ch.backing {
        Backing::ExpanderRegister { bit } if ch.direction == Direction::Output => mask & !(1 << bit),
        _ => mask,
    })
}

impl<I: I2c, G: GpioPort, D: DelayNs> ChannelIo for ChannelBank<I, G, D> {
    fn read(&mut self, id: ChannelId) -> Result<ChannelValue, HardwareError> {
        let ch = self.channels[id.index()];
        match ch.backing {
            Backing::DirectLine { pin } => {
                if ch.direction == Direction::Output {
                    return Ok(ChannelValue::Digital(self.latched[id.index()]));
                }
                self.hal.gpio.read(pin).map(ChannelValue::Digital)
            }
            Backing::ExpanderRegister { bit } => {
                let exp = self.expander.as_ref().ok_or(HardwareError::NoBacking)?;
                exp.read_bit(&mut self.hal.i2c, bit).map(ChannelValue::Digital)
            }
            Backing::AdcPair { adc, pair, scaling } => {
                let dev = self.adcs.get(adc as usize).ok_or(HardwareError::NoBacking)?;
                let volts = dev.read_volts(&mut self.hal.i2c, &mut self.hal.delay, pair, scaling.range.pga)?;
                Ok(ChannelValue::Analog(scaling.to_physical(volts)))
            }
        }
    }

    fn write(&mut self, id: ChannelId, value: bool) -> Result<(), HardwareError> {
        let ch = self.channels[id.index()];
        if ch.direction != Direction::Output {
            return Err(HardwareError::NotWritable);
        }
        match ch.backing {
            Backing::DirectLine { pin } => {
                self.hal.gpio.write(pin, value)?;
                self.latched[id.index()] = value;
                Ok(())
            }
            Backing::ExpanderRegister { bit } => {
                let exp = self.expander.as_mut().ok_or(HardwareError::NoBacking)?;
                exp.write_bit(&mut self.hal.i2c, bit, value)
            }
            Backing::AdcPair { .. } => Err(HardwareError::NotWritable),
        }
    }
}
