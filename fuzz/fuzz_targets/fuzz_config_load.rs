//! Fuzz target: `KernelConfig::load`
//!
//! Arbitrary bytes must either validate into a complete eight-channel
//! configuration or fail with a `ConfigError`; never panic.
//!
//! cargo fuzz run fuzz_config_load

#![no_main]

use iotflow::channel::CHANNEL_COUNT;
use iotflow::KernelConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(cfg) = KernelConfig::load(data) {
        assert_eq!(cfg.channels.len(), CHANNEL_COUNT);
        assert!(cfg.timing.debounce_ms > 0);
        assert!(cfg.deadband.is_none_or(|d| d >= 0.0));
    }
});
