#![no_main]

use libfuzzer_sys::fuzz_target;
use xdrz::drizzle::{DrizzleData, DrizzleParserOptions};

fuzz_target!(|data: &[u8]| {
    // Exercises both the XML and the legacy plain-text decoders through
    // the format dispatcher; failures must be errors, never panics
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = DrizzleData::parse_text(text, DrizzleParserOptions::default());
        let lenient = DrizzleParserOptions {
            strict: false,
            ignore_integration_data: true,
        };
        let _ = DrizzleData::parse_text(text, lenient);
    }
});
