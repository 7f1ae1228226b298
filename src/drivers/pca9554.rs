//! PCA9554/TCA9554-class 8-bit I2C port expander.
//!
//! Each expander bit is one IoTextra channel.  The configuration register
//! marks a bit as input (1) or output (0); output bits are driven from a
//! shadow copy of the output register so writing one channel never
//! disturbs its neighbours.

use embedded_hal::i2c::I2c;

use super::bus_fault;
use crate::error::HardwareError;

const REG_INPUT: u8 = 0x00;
const REG_OUTPUT: u8 = 0x01;
const REG_POLARITY: u8 = 0x02;
const REG_CONFIG: u8 = 0x03;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pca9554 {
    addr: u8,
    /// 1 = input, 0 = output.
    input_mask: u8,
    output_shadow: u8,
}

impl Pca9554 {
    pub const fn new(addr: u8, input_mask: u8) -> Self {
        Self {
            addr,
            input_mask,
            output_shadow: 0,
        }
    }

    pub const fn addr(&self) -> u8 {
        self.addr
    }

    pub const fn input_mask(&self) -> u8 {
        self.input_mask
    }

    /// Latched value of the output register.
    pub const fn output_shadow(&self) -> u8 {
        self.output_shadow
    }

    /// Drive all outputs low, clear polarity inversion, then set directions.
    ///
    /// Outputs are written before the direction flip so no output ever
    /// glitches high on boot.
    pub fn init<I: I2c>(&mut self, bus: &mut I) -> Result<(), HardwareError> {
        self.write_reg(bus, REG_OUTPUT, 0)?;
        self.output_shadow = 0;
        self.write_reg(bus, REG_POLARITY, 0)?;
        self.write_reg(bus, REG_CONFIG, self.input_mask)
    }

    /// Sample the input port register.
    pub fn read_inputs<I: I2c>(&self, bus: &mut I) -> Result<u8, HardwareError> {
        let mut value = [0u8; 1];
        bus.write_read(self.addr, &[REG_INPUT], &mut value)
            .map_err(|e| bus_fault(self.addr, e))?;
        Ok(value[0])
    }

    /// Current level of one bit.  Output bits report the latched value.
    pub fn read_bit<I: I2c>(&self, bus: &mut I, bit: u8) -> Result<bool, HardwareError> {
        let mask = 1u8 << bit;
        if self.input_mask & mask == 0 {
            return Ok(self.output_shadow & mask != 0);
        }
        Ok(self.read_inputs(bus)? & mask != 0)
    }

    /// Set one output bit.  The shadow only changes once the bus write
    /// has been acknowledged.
    pub fn write_bit<I: I2c>(&mut self, bus: &mut I, bit: u8, high: bool) -> Result<(), HardwareError> {
        let mask = 1u8 << bit;
        if self.input_mask & mask != 0 {
            return Err(HardwareError::NotWritable);
        }
        let next = if high {
            self.output_shadow | mask
        } else {
            self.output_shadow & !mask
        };
        self.write_reg(bus, REG_OUTPUT, next)?;
        self.output_shadow = next;
        Ok(())
    }

    fn write_reg<I: I2c>(&self, bus: &mut I, reg: u8, value: u8) -> Result<(), HardwareError> {
        bus.write(self.addr, &[reg, value])
            .map_err(|e| bus_fault(self.addr, e))
    }
}
