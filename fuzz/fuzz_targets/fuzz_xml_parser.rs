#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must never panic the parser: every malformed input
    // has to surface as an Err with a location
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(doc) = xdrz::xml::XmlDocument::parse(text) {
            // A successfully parsed document must serialize and reparse
            let _ = xdrz::xml::XmlDocument::parse(&doc.serialize());
        }
    }
});
