//! Integration test driver for `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises a subsystem against the
//! simulated mezzanine and broker.  All tests run on the host with no real
//! hardware required.

#![cfg(not(target_os = "espidf"))]

mod channel_bank_tests;
mod config_store_tests;
mod kernel_tests;
mod mock_hw;
mod mock_mqtt;
