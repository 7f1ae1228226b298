//! Simulated I²C mezzanine for integration tests.
//!
//! One shared bus carries the devices the default board populates: the
//! PCA9554 expander, two ADS1115 converters and the M24C08 EEPROM.  Each
//! device is a small register model, so the real drivers run unmodified
//! against it.  Tests keep a clone of [`MockI2c`] to poke at the devices
//! after the bank has taken ownership of the bus.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use iotflow::adapters::hardware::EspGpio;
use iotflow::channel::{ChannelBank, IoHal};
use iotflow::KernelConfig;

pub const EXPANDER_ADDR: u8 = 0x3f;
pub const ADC0_ADDR: u8 = 0x49;
pub const ADC1_ADDR: u8 = 0x4B;
pub const EEPROM_BASE: u8 = 0x54;
pub const EEPROM_SIZE: usize = 1024;

const OS_BIT: u16 = 1 << 15;

// ── Device models ─────────────────────────────────────────────

pub struct Expander {
    pub addr: u8,
    /// input, output, polarity, config
    pub regs: [u8; 4],
    /// Levels driven onto the pins from outside.
    pub pins: u8,
    pointer: u8,
}

impl Expander {
    fn read(&self) -> u8 {
        match self.pointer {
            0 => {
                let config = self.regs[3];
                (self.pins & config) | (self.regs[1] & !config)
            }
            r => self.regs[(r & 3) as usize],
        }
    }
}

pub struct Adc {
    pub addr: u8,
    /// Conversion result for pair A (AIN0-AIN1) and pair B (AIN2-AIN3).
    pub raw: [i16; 2],
    /// Never reports a finished conversion.
    pub stuck: bool,
    pub conversions: u32,
    config: u16,
    pointer: u8,
}

impl Adc {
    fn selected_pair(&self) -> usize {
        if (self.config >> 12) & 0b111 == 0b011 { 1 } else { 0 }
    }
}

pub struct Eeprom {
    pub mem: Vec<u8>,
    pointer: usize,
}

#[derive(Default)]
pub struct Bus {
    pub expander: Option<Expander>,
    pub adcs: Vec<Adc>,
    pub eeprom: Option<Eeprom>,
    /// Addresses that NACK everything.
    pub dead: HashSet<u8>,
    pub transactions: u32,
}

impl Bus {
    fn write(&mut self, addr: u8, bytes: &[u8]) -> Result<(), ErrorKind> {
        if let Some(exp) = self.expander.as_mut().filter(|e| e.addr == addr) {
            if let Some(&reg) = bytes.first() {
                exp.pointer = reg & 3;
            }
            if let Some(&value) = bytes.get(1) {
                exp.regs[exp.pointer as usize] = value;
            }
            return Ok(());
        }
        if let Some(adc) = self.adcs.iter_mut().find(|a| a.addr == addr) {
            if let Some(&reg) = bytes.first() {
                adc.pointer = reg & 1;
            }
            if bytes.len() == 3 && adc.pointer == 1 {
                adc.config = u16::from_be_bytes([bytes[1], bytes[2]]);
                adc.conversions += 1;
            }
            return Ok(());
        }
        if let Some(rom) = self.eeprom.as_mut().filter(|_| (EEPROM_BASE..EEPROM_BASE + 4).contains(&addr)) {
            let block = usize::from(addr - EEPROM_BASE) * 256;
            if let Some((&offset, data)) = bytes.split_first() {
                rom.pointer = block + usize::from(offset);
                for &b in data {
                    rom.mem[rom.pointer % EEPROM_SIZE] = b;
                    rom.pointer += 1;
                }
            }
            return Ok(());
        }
        Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address))
    }

    fn read(&mut self, addr: u8, buf: &mut [u8]) -> Result<(), ErrorKind> {
        if let Some(exp) = self.expander.as_ref().filter(|e| e.addr == addr) {
            buf.fill(exp.read());
            return Ok(());
        }
        if let Some(adc) = self.adcs.iter().find(|a| a.addr == addr) {
            let word = if adc.pointer == 1 {
                if adc.stuck { adc.config & !OS_BIT } else { adc.config | OS_BIT }
            } else {
                adc.raw[adc.selected_pair()] as u16
            };
            for (dst, src) in buf.iter_mut().zip(word.to_be_bytes()) {
                *dst = src;
            }
            return Ok(());
        }
        if let Some(rom) = self.eeprom.as_mut().filter(|_| (EEPROM_BASE..EEPROM_BASE + 4).contains(&addr)) {
            for b in buf.iter_mut() {
                *b = rom.mem[rom.pointer % EEPROM_SIZE];
                rom.pointer += 1;
            }
            return Ok(());
        }
        Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address))
    }
}

// ── Bus handle ────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockI2c(pub Rc<RefCell<Bus>>);

#[allow(dead_code)]
impl MockI2c {
    /// Expander at 0x3f, ADCs at 0x49/0x4B and a blank EEPROM.
    pub fn combo_board() -> Self {
        let adc = |addr| Adc {
            addr,
            raw: [0; 2],
            stuck: false,
            conversions: 0,
            config: 0,
            pointer: 0,
        };
        let bus = Bus {
            expander: Some(Expander {
                addr: EXPANDER_ADDR,
                regs: [0, 0xFF, 0, 0xFF],
                pins: 0,
                pointer: 0,
            }),
            adcs: vec![adc(ADC0_ADDR), adc(ADC1_ADDR)],
            eeprom: Some(Eeprom {
                mem: vec![0xFF; EEPROM_SIZE],
                pointer: 0,
            }),
            ..Bus::default()
        };
        Self(Rc::new(RefCell::new(bus)))
    }

    pub fn set_adc_raw(&self, addr: u8, pair: usize, raw: i16) {
        let mut bus = self.0.borrow_mut();
        if let Some(adc) = bus.adcs.iter_mut().find(|a| a.addr == addr) {
            adc.raw[pair] = raw;
        }
    }

    pub fn set_adc_stuck(&self, addr: u8, stuck: bool) {
        let mut bus = self.0.borrow_mut();
        if let Some(adc) = bus.adcs.iter_mut().find(|a| a.addr == addr) {
            adc.stuck = stuck;
        }
    }

    pub fn conversions(&self, addr: u8) -> u32 {
        self.0
            .borrow()
            .adcs
            .iter()
            .find(|a| a.addr == addr)
            .map_or(0, |a| a.conversions)
    }

    pub fn set_expander_pin(&self, bit: u8, high: bool) {
        if let Some(exp) = self.0.borrow_mut().expander.as_mut() {
            if high {
                exp.pins |= 1 << bit;
            } else {
                exp.pins &= !(1 << bit);
            }
        }
    }

    pub fn expander_output(&self) -> u8 {
        self.0.borrow().expander.as_ref().map_or(0, |e| e.regs[1])
    }

    pub fn expander_config(&self) -> u8 {
        self.0.borrow().expander.as_ref().map_or(0, |e| e.regs[3])
    }

    pub fn kill(&self, addr: u8) {
        self.0.borrow_mut().dead.insert(addr);
    }

    pub fn revive(&self, addr: u8) {
        self.0.borrow_mut().dead.remove(&addr);
    }

    pub fn eeprom_bytes(&self, offset: usize, len: usize) -> Vec<u8> {
        self.0
            .borrow()
            .eeprom
            .as_ref()
            .map(|r| r.mem[offset..offset + len].to_vec())
            .unwrap_or_default()
    }

    pub fn poke_eeprom(&self, offset: usize, bytes: &[u8]) {
        if let Some(rom) = self.0.borrow_mut().eeprom.as_mut() {
            rom.mem[offset..offset + bytes.len()].copy_from_slice(bytes);
        }
    }

    pub fn transactions(&self) -> u32 {
        self.0.borrow().transactions
    }
}

impl ErrorType for MockI2c {
    type Error = ErrorKind;
}

impl I2c for MockI2c {
    fn transaction(&mut self, addr: u8, ops: &mut [Operation<'_>]) -> Result<(), ErrorKind> {
        let mut bus = self.0.borrow_mut();
        bus.transactions += 1;
        if bus.dead.contains(&addr) {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        for op in ops.iter_mut() {
            match op {
                Operation::Write(bytes) => bus.write(addr, bytes)?,
                Operation::Read(buf) => bus.read(addr, buf)?,
            }
        }
        Ok(())
    }
}

// ── Delay ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct NoopDelay;

impl DelayNs for NoopDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

// ── Bank ──────────────────────────────────────────────────────

pub type MockBank = ChannelBank<MockI2c, EspGpio, NoopDelay>;

pub fn default_config() -> KernelConfig {
    KernelConfig::load(include_bytes!("../../config/default.json")).unwrap()
}

/// Bring up the bank over `bus` with simulated host GPIO.
pub fn bank(config: &KernelConfig, bus: &MockI2c) -> MockBank {
    let hal = IoHal {
        i2c: bus.clone(),
        gpio: EspGpio::new(),
        delay: NoopDelay,
    };
    ChannelBank::new(config, hal).unwrap()
}
