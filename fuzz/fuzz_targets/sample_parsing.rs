#![no_main]
use connwatch::directory::RelayDirectory;
use connwatch::source::parse_sample;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let _ = parse_sample(input);
        let _ = RelayDirectory::parse(input);
    }
});
