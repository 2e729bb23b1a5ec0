#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(config) = toml::from_str::<fraudwatch::Config>(s) {
            let _ = config.validate();
            let _ = config.agent_engine_resource();
        }
    }
});
