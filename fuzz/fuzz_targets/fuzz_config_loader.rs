#![no_main]
use libfuzzer_sys::fuzz_target;

// Parsing and validation must reject bad input with an error, never a panic.
fuzz_target!(|data: &str| {
    if let Ok(cfg) = desk_config::load_toml(data) {
        if cfg.validate().is_ok() {
            for name in cfg.positions.keys() {
                let _ = cfg.position(name);
            }
        }
    }
});
