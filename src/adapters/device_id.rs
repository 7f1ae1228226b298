//! Device identity derived from the ESP32 factory MAC address.
//!
//! Used as the MQTT client id when the configuration leaves it empty:
//! `iotflow-xxyyzz`, the last three MAC bytes in lowercase hex.  Stable
//! across reboots because the MAC is burned into eFuse.

use core::fmt::Write;

pub type ClientIdString = heapless::String<24>;

pub type MacAddress = [u8; 6];

#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    // SAFETY: the buffer is exactly the six bytes the call writes.
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: a fixed, recognisable MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0x24, 0x0A, 0xC4, 0x1F, 0x2E, 0x3D]
}

pub fn client_id(mac: &MacAddress) -> ClientIdString {
    let mut id = ClientIdString::new();
    let _ = write!(id, "iotflow-{:02x}{:02x}{:02x}", mac[3], mac[4], mac[5]);
    id
}

/// The configured id when there is one, otherwise the MAC-derived one.
pub fn resolve(configured: Option<&str>, mac: &MacAddress) -> String {
    match configured {
        Some(id) => id.to_owned(),
        None => client_id(mac).as_str().to_owned(),
    }
}
