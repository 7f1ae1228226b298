//! IoTflow node firmware: main entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                     │
//! │                                                              │
//! │  EepromConfigStore   ChannelBank         EspMqttTransport    │
//! │  (ConfigStore)       (ChannelIo)         (MqttTransport)     │
//! │  WifiStation         MonotonicClock      Watchdog            │
//! │                                                              │
//! │  ──────────────── Port Trait Boundary ─────────────────      │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────┐      │
//! │  │                 Kernel (pure logic)                │      │
//! │  │  SessionManager · DigitalEngine · AnalogEngine     │      │
//! │  └────────────────────────────────────────────────────┘      │
//! │                                                              │
//! │  Scheduler (fixed-period cooperative loop)                   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::{anyhow, Result};
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::delay::{Delay, FreeRtos};
use esp_idf_svc::hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::units::Hertz;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::{error, info, warn};

use iotflow::adapters::device_id;
use iotflow::adapters::eeprom_store::EepromConfigStore;
use iotflow::adapters::esp_mqtt::EspMqttTransport;
use iotflow::adapters::hardware::EspGpio;
use iotflow::adapters::time::MonotonicClock;
use iotflow::adapters::wifi::WifiStation;
use iotflow::app::ports::{ConfigStore, StoreError};
use iotflow::channel::{ChannelBank, IoHal};
use iotflow::config::ConfigDocument;
use iotflow::drivers::watchdog::{Watchdog, DEFAULT_TIMEOUT_MS};
use iotflow::scheduler::Scheduler;
use iotflow::{pins, Error, Kernel, KernelConfig};

/// Written to a blank EEPROM on first boot.
const FACTORY_CONFIG: &[u8] = include_bytes!("../config/default.json");

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  IoTflow kernel v{}                ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    // ── 2. I²C bus ────────────────────────────────────────────
    // GPIO8/GPIO9 match pins::I2C_SDA_GPIO / pins::I2C_SCL_GPIO.
    let i2c_config = I2cConfig::new().baudrate(Hertz(pins::I2C_BAUD_HZ));
    let mut i2c = I2cDriver::new(
        peripherals.i2c0,
        peripherals.pins.gpio8,
        peripherals.pins.gpio9,
        &i2c_config,
    )?;
    let mut delay = Delay::new_default();
    info!(
        "I2C: SDA={} SCL={} @ {} Hz",
        pins::I2C_SDA_GPIO,
        pins::I2C_SCL_GPIO,
        pins::I2C_BAUD_HZ
    );

    // ── 3. Configuration ──────────────────────────────────────
    let config = match load_config(&mut i2c, &mut delay) {
        Ok(config) => config,
        Err(e) => {
            error!("Config: {:#}; refusing to start", e);
            park();
        }
    };
    info!(
        "Node: {} / {} base='{}'",
        config.node.module_type, config.node.mezzanine_type, config.base_topic
    );

    // ── 4. WiFi station ───────────────────────────────────────
    let mut wifi = WifiStation::start(
        peripherals.modem,
        sysloop,
        Some(nvs),
        &config.network.wifi_ssid,
        &config.network.wifi_password,
    )?;

    // ── 5. Channel bank ───────────────────────────────────────
    let bank = match ChannelBank::new(&config, IoHal { i2c, gpio: EspGpio::new(), delay }) {
        Ok(bank) => bank,
        Err(e) => {
            error!("Channels: init failed ({}); refusing to start", e);
            park();
        }
    };

    // ── 6. Kernel ─────────────────────────────────────────────
    let transport = EspMqttTransport::new(&config.broker.host, config.broker.port);
    let client_id = device_id::resolve(config.broker.client_id.as_deref(), &device_id::read_mac());
    let mut kernel = Kernel::new(&config, bank, transport, &client_id).map_err(Error::from)?;
    let mut sched = Scheduler::new(MonotonicClock::new());
    let watchdog = Watchdog::new(DEFAULT_TIMEOUT_MS);

    info!("System ready. Entering scheduler loop.");

    // ── 7. Scheduler loop ─────────────────────────────────────
    loop {
        wifi.poll(sched.now_ms());
        let report = sched.cycle(&mut kernel);
        watchdog.feed();

        if sched.cycles() % 6000 == 0 {
            let stats = kernel.stats();
            info!(
                "Stats: ticks={} applied={} rejected={} dropped={} mqtt_dropped={} overruns={}",
                stats.ticks,
                stats.commands_applied,
                stats.commands_rejected,
                stats.events_dropped,
                kernel.session().transport().dropped_events(),
                sched.overruns()
            );
        }

        FreeRtos::delay_ms(report.sleep_ms.max(1) as u32);
    }
}

/// Read the stored document, provisioning the factory default on a blank
/// chip.  A stored document that is corrupt or invalid is fatal.
fn load_config<I: I2c, D: DelayNs>(i2c: &mut I, delay: &mut D) -> Result<KernelConfig> {
    let mut store = EepromConfigStore::new(i2c, delay, pins::CONFIG_EEPROM_ADDR);
    match store.load_document() {
        Ok(doc) => {
            info!("Config: loaded from EEPROM");
            Ok(KernelConfig::from_document(doc).map_err(Error::from)?)
        }
        Err(StoreError::Empty) => {
            warn!("Config: EEPROM blank, provisioning factory defaults");
            let doc = ConfigDocument::from_json(FACTORY_CONFIG).map_err(Error::from)?;
            let config = KernelConfig::from_document(doc.clone()).map_err(Error::from)?;
            if let Err(e) = store.save_document(&doc) {
                warn!("Config: defaults not persisted ({})", e);
            }
            Ok(config)
        }
        Err(e) => Err(anyhow!("stored config unusable: {}", e)),
    }
}

/// Halt without feeding anything; a human has to fix the EEPROM.
fn park() -> ! {
    loop {
        FreeRtos::delay_ms(1000);
    }
}
