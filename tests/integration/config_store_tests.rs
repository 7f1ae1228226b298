//! EEPROM configuration store over the simulated M24C08.

use iotflow::adapters::eeprom_store::{EepromConfigStore, MAGIC};
use iotflow::app::ports::{ConfigStore, StoreError};
use iotflow::config::ConfigDocument;
use iotflow::error::ConfigError;
use iotflow::pins::CONFIG_EEPROM_ADDR;
use iotflow::KernelConfig;

use crate::mock_hw::{MockI2c, NoopDelay, EEPROM_BASE};

fn default_document() -> ConfigDocument {
    ConfigDocument::from_json(include_bytes!("../../config/default.json")).unwrap()
}

#[test]
fn blank_chip_reads_as_empty() {
    let mut bus = MockI2c::combo_board();
    let mut delay = NoopDelay;
    let mut store = EepromConfigStore::new(&mut bus, &mut delay, CONFIG_EEPROM_ADDR);
    assert_eq!(store.load_document(), Err(StoreError::Empty));
}

#[test]
fn saved_document_loads_back() {
    let mut bus = MockI2c::combo_board();
    let chip = bus.clone();
    let mut delay = NoopDelay;
    let doc = default_document();

    let mut store = EepromConfigStore::new(&mut bus, &mut delay, CONFIG_EEPROM_ADDR);
    store.save_document(&doc).unwrap();
    let loaded = store.load_document().unwrap();

    assert_eq!(loaded, doc);
    assert_eq!(chip.eeprom_bytes(0, 4), MAGIC);
    let config = KernelConfig::from_document(loaded).unwrap();
    assert_eq!(config.base_topic, "iotflow/device_1");
}

#[test]
fn invalid_document_is_never_written() {
    let mut bus = MockI2c::combo_board();
    let chip = bus.clone();
    let mut delay = NoopDelay;
    let mut doc = default_document();
    doc.channels.pop();

    let mut store = EepromConfigStore::new(&mut bus, &mut delay, CONFIG_EEPROM_ADDR);
    assert_eq!(
        store.save_document(&doc),
        Err(StoreError::Invalid(ConfigError::ChannelCount(7)))
    );
    assert!(chip.eeprom_bytes(0, 16).iter().all(|&b| b == 0xFF));
}

#[test]
fn damaged_image_reads_as_corrupted() {
    let mut bus = MockI2c::combo_board();
    let chip = bus.clone();
    let mut delay = NoopDelay;

    let mut store = EepromConfigStore::new(&mut bus, &mut delay, CONFIG_EEPROM_ADDR);
    store.save_document(&default_document()).unwrap();
    chip.poke_eeprom(0, b"JUNK");
    assert_eq!(store.load_document(), Err(StoreError::Corrupted));
}

#[test]
fn truncated_payload_reads_as_corrupted() {
    let mut bus = MockI2c::combo_board();
    let chip = bus.clone();
    let mut delay = NoopDelay;

    let mut store = EepromConfigStore::new(&mut bus, &mut delay, CONFIG_EEPROM_ADDR);
    store.save_document(&default_document()).unwrap();
    // Claim a 3-byte payload: postcard cannot decode a document from it.
    chip.poke_eeprom(5, &[0x00, 0x03]);
    assert_eq!(store.load_document(), Err(StoreError::Corrupted));
}

#[test]
fn missing_chip_is_a_hardware_error() {
    let mut bus = MockI2c::combo_board();
    for addr in EEPROM_BASE..EEPROM_BASE + 4 {
        bus.kill(addr);
    }
    let mut delay = NoopDelay;
    let mut store = EepromConfigStore::new(&mut bus, &mut delay, CONFIG_EEPROM_ADDR);
    assert!(matches!(store.load_document(), Err(StoreError::Hardware(_))));
}
