//! WiFi station adapter.
//!
//! The MQTT session owns reconnection to the broker; this adapter only
//! keeps the station associated.  While the link is down it retries
//! `connect()` on a fixed interval from the main loop, never blocking.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: [`WifiStation`] over `esp_idf_svc::wifi::EspWifi`.
//! - **all targets**: credential validation, so a document with an
//!   unusable SSID is caught in host tests too.

use core::fmt;

// ───────────────────────────────────────────────────────────────
// Errors and validation
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiError {
    InvalidSsid,
    InvalidPassword,
    /// The IDF driver refused an operation (code from `EspError`).
    Driver(i32),
}

impl fmt::Display for WifiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)"),
            Self::Driver(code) => write!(f, "WiFi driver error {}", code),
        }
    }
}

impl std::error::Error for WifiError {}

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

pub fn validate_credentials(ssid: &str, password: &str) -> Result<(), WifiError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(WifiError::InvalidSsid);
    }
    if !password.is_empty() && !(8..=64).contains(&password.len()) {
        return Err(WifiError::InvalidPassword);
    }
    Ok(())
}

/// Retry period while the station is not associated.
pub const RETRY_INTERVAL_MS: u64 = 5_000;

// ───────────────────────────────────────────────────────────────
// Station (ESP-IDF)
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use station::WifiStation;

#[cfg(target_os = "espidf")]
mod station {
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::hal::modem::Modem;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi};
    use log::{info, warn};

    use super::{validate_credentials, WifiError, RETRY_INTERVAL_MS};
    use crate::scheduler::Periodic;

    pub struct WifiStation {
        wifi: EspWifi<'static>,
        retry: Periodic,
        associated: bool,
    }

    impl WifiStation {
        pub fn start(
            modem: Modem,
            sysloop: EspSystemEventLoop,
            nvs: Option<EspDefaultNvsPartition>,
            ssid: &str,
            password: &str,
        ) -> Result<Self, WifiError> {
            validate_credentials(ssid, password)?;
            let driver = |e: esp_idf_svc::sys::EspError| WifiError::Driver(e.code());

            let mut wifi = EspWifi::new(modem, sysloop, nvs).map_err(driver)?;
            let config = ClientConfiguration {
                ssid: ssid.try_into().map_err(|_| WifiError::InvalidSsid)?,
                password: password.try_into().map_err(|_| WifiError::InvalidPassword)?,
                auth_method: if password.is_empty() {
                    AuthMethod::None
                } else {
                    AuthMethod::WPA2Personal
                },
                ..Default::default()
            };
            wifi.set_configuration(&Configuration::Client(config)).map_err(driver)?;
            wifi.start().map_err(driver)?;
            info!("WiFi: station started for '{}'", ssid);

            Ok(Self {
                wifi,
                retry: Periodic::new(RETRY_INTERVAL_MS),
                associated: false,
            })
        }

        pub fn is_connected(&self) -> bool {
            self.wifi.is_connected().unwrap_or(false)
        }

        /// Track association and retry while it is down.
        pub fn poll(&mut self, now_ms: u64) {
            let connected = self.is_connected();
            if connected != self.associated {
                self.associated = connected;
                if connected {
                    info!("WiFi: associated");
                } else {
                    warn!("WiFi: link lost");
                    self.retry.reset();
                }
            }
            if !connected && self.retry.poll(now_ms) {
                if let Err(e) = self.wifi.connect() {
                    warn!("WiFi: connect attempt failed: {}", e);
                }
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
