#![no_main]
use connwatch::config::{Config, PanelSettings};
use connwatch::validation::{validate_file_path, validate_process_name};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // settings clamp whatever either config format yields
        let _ = PanelSettings::from_config(&Config::parse_armrc(input));
        if let Ok(config) = toml::from_str::<Config>(input) {
            let _ = PanelSettings::from_config(&config);
        }

        let _ = validate_file_path(input, Some("log"));
        let _ = validate_process_name(input);
    }
});
