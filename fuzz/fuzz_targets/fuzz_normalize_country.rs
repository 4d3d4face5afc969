#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Some(code) = kontor::core::normalize_country(s) {
            assert!(kontor::core::is_known_country_code(code));
        }
    }
});
