#![no_main]

use libfuzzer_sys::fuzz_target;
use lockknock::config::MonitorConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Parsing must never panic, and anything it accepts must be valid
        if let Ok(config) = MonitorConfig::from_toml_str(input) {
            assert!(config.validate().is_ok());
        }
    }
});
