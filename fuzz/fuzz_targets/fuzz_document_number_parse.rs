#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Whatever parses must display back to the same text.
        if let Ok(number) = kontor::core::DocumentNumber::parse(s) {
            assert_eq!(number.display(), s);
        }
    }
});
