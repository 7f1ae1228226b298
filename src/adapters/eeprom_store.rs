//! EEPROM-backed configuration store.
//!
//! Image layout on the M24C08, starting at offset 0:
//!
//! ```text
//! ┌────────┬─────────┬────────────┬──────────────────────────┐
//! │ "IOTF" │ version │ len (u16BE)│ postcard(ConfigDocument) │
//! │ 4 B    │ 1 B     │ 2 B        │ len B                    │
//! └────────┴─────────┴────────────┴──────────────────────────┘
//! ```
//!
//! An erased chip (all `0xFF`) or a zeroed one reads as `Empty`.  A
//! document is validated before it is written and read back afterwards.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{info, warn};

use crate::app::ports::{ConfigStore, StoreError};
use crate::config::{ConfigDocument, KernelConfig};
use crate::drivers::m24c08::{M24c08, CAPACITY};

pub const MAGIC: [u8; 4] = *b"IOTF";
pub const FORMAT_VERSION: u8 = 1;
pub const HEADER_LEN: usize = 7;
pub const MAX_PAYLOAD: usize = CAPACITY - HEADER_LEN;

pub struct EepromConfigStore<'a, I, D> {
    bus: &'a mut I,
    delay: &'a mut D,
    chip: M24c08,
}

impl<'a, I: I2c, D: DelayNs> EepromConfigStore<'a, I, D> {
    pub fn new(bus: &'a mut I, delay: &'a mut D, addr: u8) -> Self {
        Self { bus, delay, chip: M24c08::new(addr) }
    }
}

/// Split a header into its payload length, or say why it is unusable.
fn parse_header(header: &[u8; HEADER_LEN]) -> Result<usize, StoreError> {
    if header.iter().all(|&b| b == 0xFF) || header.iter().all(|&b| b == 0x00) {
        return Err(StoreError::Empty);
    }
    if header[..4] != MAGIC || header[4] != FORMAT_VERSION {
        return Err(StoreError::Corrupted);
    }
    let len = usize::from(u16::from_be_bytes([header[5], header[6]]));
    if len == 0 || len > MAX_PAYLOAD {
        return Err(StoreError::Corrupted);
    }
    Ok(len)
}

fn encode_image(doc: &ConfigDocument) -> Result<Vec<u8>, StoreError> {
    let payload = postcard::to_allocvec(doc).map_err(|_| StoreError::Corrupted)?;
    if payload.len() > MAX_PAYLOAD {
        return Err(StoreError::TooLarge(payload.len()));
    }
    let mut image = Vec::with_capacity(HEADER_LEN + payload.len());
    image.extend_from_slice(&MAGIC);
    image.push(FORMAT_VERSION);
    image.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    image.extend_from_slice(&payload);
    Ok(image)
}

impl<I: I2c, D: DelayNs> ConfigStore for EepromConfigStore<'_, I, D> {
    fn load_document(&mut self) -> Result<ConfigDocument, StoreError> {
        let mut header = [0u8; HEADER_LEN];
        self.chip.read(self.bus, 0, &mut header)?;
        let len = parse_header(&header)?;

        let mut payload = vec![0u8; len];
        self.chip.read(self.bus, HEADER_LEN, &mut payload)?;
        let doc = postcard::from_bytes(&payload).map_err(|_| StoreError::Corrupted)?;
        info!("eeprom: loaded config image ({} bytes)", len);
        Ok(doc)
    }

    fn save_document(&mut self, doc: &ConfigDocument) -> Result<(), StoreError> {
        KernelConfig::from_document(doc.clone()).map_err(StoreError::Invalid)?;
        let image = encode_image(doc)?;

        self.chip.write(self.bus, self.delay, 0, &image)?;

        let mut readback = vec![0u8; image.len()];
        self.chip.read(self.bus, 0, &mut readback)?;
        if readback != image {
            warn!("eeprom: readback mismatch after write");
            return Err(StoreError::Corrupted);
        }
        info!("eeprom: stored config image ({} bytes)", image.len());
        Ok(())
    }
}
