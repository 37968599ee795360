#![no_main]

use libfuzzer_sys::fuzz_target;
use tfprobe_core::config::ProbeConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(content) = std::str::from_utf8(data) {
        if let Ok(config) = ProbeConfig::parse(content) {
            let _ = config.validate();
        }
    }
});
