#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        match kontor::core::check_digit(s) {
            Ok(digit) => {
                assert!(digit <= 9);
                assert!(kontor::core::verify_check_digit(&format!("{s}{digit}")));
            }
            Err(_) => assert!(s.bytes().any(|b| !b.is_ascii_digit())),
        }
    }
});
