//! Node configuration.
//!
//! Two layers:
//!
//! - [`ConfigDocument`]: the serde mirror of the JSON document written by
//!   the authoring tool (and of the postcard image kept in EEPROM).
//! - [`KernelConfig`]: the validated, immutable view the kernel runs on.
//!   The only way to obtain one is through [`KernelConfig::load`] or
//!   [`KernelConfig::from_document`], both of which fail closed.

use serde::{Deserialize, Serialize};

use crate::adapters::wifi::{self, WifiError};
use crate::channel::analog::{
    AnalogScaling, MeasurementRange, DEFAULT_HARDWARE_GAIN, DEFAULT_RANGE_CODE, DEFAULT_SHUNT_OHMS,
};
use crate::channel::{Backing, ChannelId, CHANNEL_COUNT};
use crate::drivers::ads1115::{DataRate, DiffPair};
use crate::error::ConfigError;
use crate::pins;

/// Longest accepted base topic, leaving room for `/output/<c>/state`.
pub const MAX_BASE_TOPIC_LEN: usize = 64;
/// Converters addressable on one mezzanine (two channels each).
pub const MAX_ADCS: usize = CHANNEL_COUNT / 2;

// ---------------------------------------------------------------------------
// Channel attributes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interface {
    Gpio,
    I2c,
}

impl Interface {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Gpio => "gpio",
            Self::I2c => "i2c",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    #[default]
    Digital,
    Analog,
}

// ---------------------------------------------------------------------------
// Document (wire form)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    pub node: NodeSection,
    #[serde(default)]
    pub network: NetworkSection,
    pub mqtt: MqttSection,
    #[serde(default)]
    pub hardware: HardwareSection,
    pub channels: Vec<ChannelSection>,
    #[serde(default)]
    pub timing: TimingSection,
    #[serde(default)]
    pub analog: AnalogSection,
}

impl ConfigDocument {
    /// Decode the JSON form without validating it.
    pub fn from_json(raw: &[u8]) -> Result<Self, ConfigError> {
        serde_json::from_slice(raw).map_err(|e| ConfigError::Malformed {
            line: e.line(),
            column: e.column(),
        })
    }
}

/// Descriptive board identity, reported in the boot log only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    pub module_type: String,
    pub mezzanine_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    pub wifi_ssid: String,
    pub wifi_password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttSection {
    pub broker: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub base_topic: String,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u16,
    #[serde(default = "default_reconnect_max")]
    pub reconnect_max_secs: u32,
}

fn default_port() -> u16 {
    1883
}

fn default_keep_alive() -> u16 {
    30
}

fn default_reconnect_max() -> u32 {
    60
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareSection {
    /// Host GPIO per channel index, when channels are wired straight to
    /// the MCU.
    pub gpio_host_pins: Option<[u8; CHANNEL_COUNT]>,
    pub expander_addr: Option<u8>,
    pub adc_addrs: Vec<u8>,
    pub adc_sampling_rate: u16,
}

impl Default for HardwareSection {
    fn default() -> Self {
        Self {
            gpio_host_pins: None,
            expander_addr: None,
            adc_addrs: Vec::new(),
            adc_sampling_rate: DataRate::DEFAULT.sps(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSection {
    pub channel: u8,
    #[serde(default)]
    pub name: String,
    pub direction: Direction,
    pub interface: Interface,
    #[serde(default)]
    pub kind: SignalKind,
    #[serde(default)]
    pub analog: Option<AnalogChannelSection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalogChannelSection {
    pub range_code: u8,
    pub hardware_gain: f32,
    pub shunt_ohms: f32,
    pub offset: f32,
}

impl Default for AnalogChannelSection {
    fn default() -> Self {
        Self {
            range_code: DEFAULT_RANGE_CODE,
            hardware_gain: DEFAULT_HARDWARE_GAIN,
            shunt_ohms: DEFAULT_SHUNT_OHMS,
            offset: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSection {
    pub debounce_ms: u32,
    pub analog_interval_ms: u32,
    /// Period of the retained `online` refresh; 0 disables it.
    pub status_interval_secs: u32,
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            debounce_ms: 50,
            analog_interval_ms: 1000,
            status_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalogSection {
    /// Minimum change before a reading is republished; `None` publishes
    /// every sample.
    pub deadband: Option<f32>,
    /// Force a publish after this long even inside the deadband.
    pub heartbeat_ms: Option<u32>,
}

// ---------------------------------------------------------------------------
// Validated configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u16,
    pub reconnect_max_secs: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareConfig {
    pub expander_addr: Option<u8>,
    pub adc_addrs: heapless::Vec<u8, MAX_ADCS>,
    pub adc_rate: DataRate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    pub id: ChannelId,
    pub name: String,
    pub direction: Direction,
    pub interface: Interface,
    pub kind: SignalKind,
    pub backing: Backing,
}

impl ChannelConfig {
    pub fn is_digital_output(&self) -> bool {
        self.kind == SignalKind::Digital && self.direction == Direction::Output
    }

    pub fn is_digital_input(&self) -> bool {
        self.kind == SignalKind::Digital && self.direction == Direction::Input
    }

    pub fn is_analog(&self) -> bool {
        self.kind == SignalKind::Analog
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    pub debounce_ms: u32,
    pub analog_interval_ms: u32,
    pub status_interval_secs: u32,
}

/// Validated node configuration.  Immutable for the life of the kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelConfig {
    pub node: NodeSection,
    pub network: NetworkSection,
    pub broker: BrokerConfig,
    pub base_topic: String,
    pub hardware: HardwareConfig,
    /// Indexed by channel id.
    pub channels: [ChannelConfig; CHANNEL_COUNT],
    pub timing: TimingConfig,
    pub deadband: Option<f32>,
    pub heartbeat_ms: Option<u32>,
}

impl KernelConfig {
    /// Parse and validate a JSON configuration document.
    pub fn load(raw: &[u8]) -> Result<Self, ConfigError> {
        Self::from_document(ConfigDocument::from_json(raw)?)
    }

    /// Validate an already-decoded document.
    pub fn from_document(doc: ConfigDocument) -> Result<Self, ConfigError> {
        if doc.channels.len() != CHANNEL_COUNT {
            return Err(ConfigError::ChannelCount(doc.channels.len()));
        }

        validate_network(&doc.network)?;
        let broker = validate_broker(&doc.mqtt)?;
        validate_base_topic(&doc.mqtt.base_topic)?;
        let hardware = validate_hardware(&doc.hardware)?;

        let mut slots: [Option<ChannelConfig>; CHANNEL_COUNT] = Default::default();
        for section in &doc.channels {
            let id = ChannelId::new(section.channel).ok_or(ConfigError::ChannelIdOutOfRange(section.channel))?;
            if slots[id.index()].is_some() {
                return Err(ConfigError::DuplicateChannel(section.channel));
            }
            let backing = resolve_backing(id, section, &doc.hardware, &hardware)?;
            slots[id.index()] = Some(ChannelConfig {
                id,
                name: section.name.clone(),
                direction: section.direction,
                interface: section.interface,
                kind: section.kind,
                backing,
            });
        }
        check_pin_conflicts(&slots)?;

        let channels = channels_from_slots(slots, doc.channels.len())?;

        let timing = validate_timing(&doc.timing)?;
        let (deadband, heartbeat_ms) = validate_analog(&doc.analog)?;
        if channels.iter().any(ChannelConfig::is_analog) {
            check_conversion_budget(hardware.adc_rate, &timing)?;
        }

        Ok(Self {
            node: doc.node,
            network: doc.network,
            broker,
            base_topic: doc.mqtt.base_topic,
            hardware,
            channels,
            timing,
            deadband,
            heartbeat_ms,
        })
    }

    pub fn channel(&self, id: ChannelId) -> &ChannelConfig {
        &self.channels[id.index()]
    }

    /// Ids of digital outputs, the channels that accept `set` commands.
    pub fn outputs(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.channels.iter().filter(|c| c.is_digital_output()).map(|c| c.id)
    }

    pub fn inputs(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.channels.iter().filter(|c| c.is_digital_input()).map(|c| c.id)
    }

    pub fn analog_channels(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.channels.iter().filter(|c| c.is_analog()).map(|c| c.id)
    }
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

/// The station refuses to start on credentials the radio cannot use, so
/// they are refused here first.
fn validate_network(n: &NetworkSection) -> Result<(), ConfigError> {
    wifi::validate_credentials(&n.wifi_ssid, &n.wifi_password).map_err(|e| match e {
        WifiError::InvalidPassword => ConfigError::InvalidField("network.wifi_password"),
        WifiError::InvalidSsid | WifiError::Driver(_) => ConfigError::InvalidField("network.wifi_ssid"),
    })
}

fn validate_broker(mqtt: &MqttSection) -> Result<BrokerConfig, ConfigError> {
    if mqtt.broker.trim().is_empty() {
        return Err(ConfigError::InvalidField("mqtt.broker"));
    }
    if mqtt.port == 0 {
        return Err(ConfigError::InvalidField("mqtt.port"));
    }
    if mqtt.keep_alive_secs == 0 {
        return Err(ConfigError::InvalidField("mqtt.keep_alive_secs"));
    }
    if mqtt.reconnect_max_secs == 0 {
        return Err(ConfigError::InvalidField("mqtt.reconnect_max_secs"));
    }
    if let Some(id) = &mqtt.client_id {
        if id.is_empty() || id.len() > 64 {
            return Err(ConfigError::InvalidField("mqtt.client_id"));
        }
    }
    Ok(BrokerConfig {
        host: mqtt.broker.trim().to_owned(),
        port: mqtt.port,
        client_id: mqtt.client_id.clone(),
        username: mqtt.username.clone(),
        password: mqtt.password.clone(),
        keep_alive_secs: mqtt.keep_alive_secs,
        reconnect_max_secs: mqtt.reconnect_max_secs,
    })
}

fn validate_base_topic(base: &str) -> Result<(), ConfigError> {
    let bad = base.is_empty()
        || base.len() > MAX_BASE_TOPIC_LEN
        || base.ends_with('/')
        || base.contains(['+', '#', '\0']);
    if bad {
        return Err(ConfigError::InvalidField("mqtt.base_topic"));
    }
    Ok(())
}

fn validate_hardware(hw: &HardwareSection) -> Result<HardwareConfig, ConfigError> {
    if hw.expander_addr.is_some_and(|a| a > 0x7F) {
        return Err(ConfigError::InvalidField("hardware.expander_addr"));
    }
    if hw.adc_addrs.iter().any(|&a| a > 0x7F) {
        return Err(ConfigError::InvalidField("hardware.adc_addrs"));
    }
    let adc_addrs = heapless::Vec::from_slice(&hw.adc_addrs)
        .map_err(|_| ConfigError::InvalidField("hardware.adc_addrs"))?;
    let adc_rate = DataRate::from_sps(hw.adc_sampling_rate)
        .ok_or(ConfigError::InvalidField("hardware.adc_sampling_rate"))?;
    Ok(HardwareConfig {
        expander_addr: hw.expander_addr,
        adc_addrs,
        adc_rate,
    })
}

/// Pick the physical backing for one channel, refusing anything the
/// board cannot reach.
fn resolve_backing(
    id: ChannelId,
    section: &ChannelSection,
    doc_hw: &HardwareSection,
    hw: &HardwareConfig,
) -> Result<Backing, ConfigError> {
    let channel = id.get();
    match (section.kind, section.interface) {
        (SignalKind::Digital, Interface::Gpio) => {
            let pins = doc_hw.gpio_host_pins.ok_or(ConfigError::InterfaceNotWired {
                channel,
                interface: Interface::Gpio.name(),
            })?;
            Ok(Backing::DirectLine { pin: pins[id.index()] })
        }
        (SignalKind::Digital, Interface::I2c) => {
            if hw.expander_addr.is_none() {
                return Err(ConfigError::InterfaceNotWired {
                    channel,
                    interface: Interface::I2c.name(),
                });
            }
            Ok(Backing::ExpanderRegister { bit: channel })
        }
        (SignalKind::Analog, Interface::Gpio) => Err(ConfigError::InterfaceNotWired {
            channel,
            interface: Interface::Gpio.name(),
        }),
        (SignalKind::Analog, Interface::I2c) => {
            if section.direction == Direction::Output {
                return Err(ConfigError::AnalogOutput(channel));
            }
            let adc = channel / 2;
            if adc as usize >= hw.adc_addrs.len() {
                return Err(ConfigError::InterfaceNotWired { channel, interface: "adc" });
            }
            let scaling = resolve_scaling(channel, &section.analog.unwrap_or_default())?;
            Ok(Backing::AdcPair {
                adc,
                pair: DiffPair::for_channel(channel),
                scaling,
            })
        }
    }
}

fn resolve_scaling(channel: u8, a: &AnalogChannelSection) -> Result<AnalogScaling, ConfigError> {
    let range = MeasurementRange::from_code(a.range_code).ok_or(ConfigError::UnknownRange {
        channel,
        code: a.range_code,
    })?;
    let usable = a.hardware_gain.is_finite()
        && a.hardware_gain > 0.0
        && a.shunt_ohms.is_finite()
        && a.shunt_ohms > 0.0
        && a.offset.is_finite();
    if !usable {
        return Err(ConfigError::BadScaling(channel));
    }
    Ok(AnalogScaling {
        range,
        hardware_gain: a.hardware_gain,
        shunt_ohms: a.shunt_ohms,
        offset: a.offset,
    })
}

/// Every GPIO channel needs its own line, one that exists on the chip and
/// is not already carrying the mezzanine bus.
fn check_pin_conflicts(slots: &[Option<ChannelConfig>; CHANNEL_COUNT]) -> Result<(), ConfigError> {
    let mut seen: u64 = 0;
    for slot in slots.iter().flatten() {
        if let Backing::DirectLine { pin } = slot.backing {
            if pin >= pins::GPIO_COUNT {
                return Err(ConfigError::InvalidField("hardware.gpio_host_pins"));
            }
            if [pins::I2C_SDA_GPIO, pins::I2C_SCL_GPIO].contains(&i32::from(pin)) {
                return Err(ConfigError::ReservedPin(pin));
            }
            let bit = 1u64 << pin;
            if seen & bit != 0 {
                return Err(ConfigError::PinConflict(pin));
            }
            seen |= bit;
        }
    }
    Ok(())
}

/// Eight entries, all distinct and in range, fill every slot.
fn channels_from_slots(
    slots: [Option<ChannelConfig>; CHANNEL_COUNT],
    declared: usize,
) -> Result<[ChannelConfig; CHANNEL_COUNT], ConfigError> {
    let filled: Vec<ChannelConfig> = slots
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or(ConfigError::ChannelCount(declared))?;
    filled.try_into().map_err(|_| ConfigError::ChannelCount(declared))
}

fn validate_timing(t: &TimingSection) -> Result<TimingConfig, ConfigError> {
    if t.debounce_ms == 0 {
        return Err(ConfigError::ZeroDebounce);
    }
    if t.analog_interval_ms == 0 {
        return Err(ConfigError::ZeroSampleInterval);
    }
    Ok(TimingConfig {
        debounce_ms: t.debounce_ms,
        analog_interval_ms: t.analog_interval_ms,
        status_interval_secs: t.status_interval_secs,
    })
}

/// The kernel reads at most one analog channel per tick; that one read
/// must still finish well inside an input's debounce window.
fn check_conversion_budget(rate: DataRate, timing: &TimingConfig) -> Result<(), ConfigError> {
    let worst_case_us = rate.worst_case_us();
    if u64::from(worst_case_us) >= u64::from(timing.debounce_ms) * 1_000 {
        return Err(ConfigError::ConversionTooSlow {
            worst_case_us,
            debounce_ms: timing.debounce_ms,
        });
    }
    Ok(())
}

fn validate_analog(a: &AnalogSection) -> Result<(Option<f32>, Option<u32>), ConfigError> {
    if let Some(d) = a.deadband {
        // NaN fails this comparison as well.
        if !(d >= 0.0 && d.is_finite()) {
            return Err(ConfigError::NegativeDeadband);
        }
    }
    if a.heartbeat_ms == Some(0) {
        return Err(ConfigError::ZeroHeartbeat);
    }
    Ok((a.deadband, a.heartbeat_ms))
}
