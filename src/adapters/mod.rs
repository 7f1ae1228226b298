//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements     | Connects to                    |
//! |----------------|----------------|--------------------------------|
//! | `eeprom_store` | ConfigStore    | M24C08 EEPROM over I2C         |
//! | `esp_mqtt`     | MqttTransport  | ESP-IDF MQTT client (espidf)   |
//! | `hardware`     | GpioPort       | ESP32 GPIO / in-memory pins    |
//! | `time`         | Clock          | ESP32 system timer / Instant   |
//! | `wifi`         | (none)         | ESP-IDF WiFi STA (espidf)      |
//! | `device_id`    | (none)         | eFuse MAC                      |

pub mod device_id;
pub mod eeprom_store;
#[cfg(target_os = "espidf")]
pub mod esp_mqtt;
pub mod hardware;
pub mod time;
pub mod wifi;
