#![no_main]

use libfuzzer_sys::fuzz_target;
use tfprobe_lifecycle::verifier::{extract_summary, parse_summary};

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Some(line) = extract_summary(text) {
            // 추출된 줄은 항상 다시 파싱 가능해야 함
            assert!(parse_summary(line).is_some());
        }
    }
});
