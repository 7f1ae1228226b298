//! IoTflow node kernel library.
//!
//! Exposes the kernel and its building blocks for the firmware binary and
//! for host-side integration tests.  All ESP-IDF-specific code is guarded
//! by `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod channel;
pub mod config;
pub mod drivers;
pub mod engine;
pub mod error;
pub mod mqtt;
pub mod pins;
pub mod scheduler;

mod esp_link_shims;

pub use app::service::Kernel;
pub use config::KernelConfig;
pub use error::{Error, Result};
