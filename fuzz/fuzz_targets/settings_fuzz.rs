#![no_main]
use ezmount::Settings;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(settings) = serde_json::from_slice::<Settings>(data) {
        let _ = settings.probe_timeout();
        let _ = settings.cleanup_delay();
        let _ = settings.helper_dir();
    }
});
