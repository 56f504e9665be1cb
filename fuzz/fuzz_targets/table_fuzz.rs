#![no_main]
use ezmount::modules::registry::{self, parse_table};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let report = parse_table(text);
        for entry in &report.entries {
            // Loaded rows always have three fields and never a reserved root
            assert!(!entry.label.is_empty());
            assert!(!entry.remote.is_empty());
            assert!(!entry.mount_point.is_empty());
            assert!(!registry::is_reserved(&entry.mount_point));
        }
    }
});
