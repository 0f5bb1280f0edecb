#![no_main]
use desk_core::codec::{BASE_HEIGHT_MM, MAX_HEIGHT_MM, decode_telemetry};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    match decode_telemetry(data) {
        Ok(sample) => {
            assert_eq!(data.len(), 4);
            assert!((BASE_HEIGHT_MM..=MAX_HEIGHT_MM).contains(&sample.height_mm));
        }
        Err(e) => assert_ne!(e.len, 4),
    }
});
