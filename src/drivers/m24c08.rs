//! ST M24C08 8-Kbit (1 KiB) I2C EEPROM holding the node configuration.
//!
//! The two high address bits select one of four 256-byte blocks through
//! the device-select code, so a block boundary also changes the I2C
//! address.  Writes are split at 16-byte page boundaries; after each page
//! the chip goes deaf for its internal write cycle, which is detected by
//! polling for an address ACK.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::debug;

use super::bus_fault;
use crate::error::HardwareError;

pub const CAPACITY: usize = 1024;
pub const PAGE_SIZE: usize = 16;
const BLOCK_SIZE: usize = 256;

/// tW is 5 ms max on the datasheet; poll up to 30 ms to stay safe on
/// marginal supplies.
const WRITE_POLL_ATTEMPTS: u32 = 30;
const WRITE_POLL_INTERVAL_US: u32 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct M24c08 {
    /// Device-select code for block 0 (A9/A8 bits cleared).
    base: u8,
}

impl M24c08 {
    /// `addr` may be any of the four block addresses; the block bits are
    /// masked off.
    pub const fn new(addr: u8) -> Self {
        Self { base: addr & 0xFC }
    }

    pub const fn base_addr(&self) -> u8 {
        self.base
    }

    const fn device_addr(&self, offset: usize) -> u8 {
        self.base | ((offset >> 8) & 0x03) as u8
    }

    pub fn read<I: I2c>(&self, bus: &mut I, offset: usize, buf: &mut [u8]) -> Result<(), HardwareError> {
        check_bounds(offset, buf.len())?;

        let mut done = 0;
        while done < buf.len() {
            let at = offset + done;
            let block_left = BLOCK_SIZE - at % BLOCK_SIZE;
            let n = block_left.min(buf.len() - done);
            let dev = self.device_addr(at);
            bus.write_read(dev, &[(at & 0xFF) as u8], &mut buf[done..done + n])
                .map_err(|e| bus_fault(dev, e))?;
            done += n;
        }
        Ok(())
    }

    pub fn write<I: I2c, D: DelayNs>(
        &self,
        bus: &mut I,
        delay: &mut D,
        offset: usize,
        data: &[u8],
    ) -> Result<(), HardwareError> {
        check_bounds(offset, data.len())?;

        let mut frame = [0u8; PAGE_SIZE + 1];
        let mut done = 0;
        while done < data.len() {
            let at = offset + done;
            let page_left = PAGE_SIZE - at % PAGE_SIZE;
            let n = page_left.min(data.len() - done);
            let dev = self.device_addr(at);

            frame[0] = (at & 0xFF) as u8;
            frame[1..=n].copy_from_slice(&data[done..done + n]);
            bus.write(dev, &frame[..=n]).map_err(|e| bus_fault(dev, e))?;
            self.wait_write_cycle(bus, delay, dev)?;
            done += n;
        }
        debug!("m24c08: wrote {} bytes at 0x{:03x}", data.len(), offset);
        Ok(())
    }

    fn wait_write_cycle<I: I2c, D: DelayNs>(&self, bus: &mut I, delay: &mut D, dev: u8) -> Result<(), HardwareError> {
        let mut probe = [0u8; 1];
        for _ in 0..WRITE_POLL_ATTEMPTS {
            delay.delay_us(WRITE_POLL_INTERVAL_US);
            if bus.read(dev, &mut probe).is_ok() {
                return Ok(());
            }
        }
        Err(HardwareError::WriteCycleTimeout { addr: dev })
    }
}

fn check_bounds(offset: usize, len: usize) -> Result<(), HardwareError> {
    match offset.checked_add(len) {
        Some(end) if end <= CAPACITY => Ok(()),
        _ => Err(HardwareError::AddressOutOfRange),
    }
}
