use desk_core::codec::{
    BASE_HEIGHT_MM, MAX_HEIGHT_MM, decode_telemetry, encode_reference_target, mm_to_raw,
    raw_to_mm,
};
use desk_hardware::sim::encode_sample;
use proptest::prelude::*;

proptest! {
    #[test]
    fn mm_raw_round_trip_within_a_tenth(mm in 620.0f32..=1270.0f32) {
        let back = raw_to_mm(mm_to_raw(mm));
        prop_assert!((back - mm).abs() <= 0.1, "{mm} -> {back}");
    }

    #[test]
    fn set_point_bytes_match_raw(mm in 620.0f32..=1270.0f32) {
        let wire = encode_reference_target(mm);
        prop_assert_eq!(u16::from_le_bytes(wire), mm_to_raw(mm));
        prop_assert!(u16::from_le_bytes(wire) <= 6500);
    }

    #[test]
    fn decode_inverts_peripheral_encoding(raw in 0u16..=6500u16, speed in any::<i16>()) {
        let mm = raw_to_mm(raw);
        let sample = decode_telemetry(&encode_sample(mm, speed)).unwrap();
        prop_assert!((sample.height_mm - mm).abs() < 0.05);
        prop_assert_eq!(sample.speed, speed);
    }

    #[test]
    fn decoded_height_stays_in_band(bytes in prop::array::uniform4(any::<u8>())) {
        let s = decode_telemetry(&bytes).unwrap();
        prop_assert!(s.height_mm >= BASE_HEIGHT_MM && s.height_mm <= MAX_HEIGHT_MM);
    }

    #[test]
    fn other_lengths_are_rejected(bytes in prop::collection::vec(any::<u8>(), 0..16)) {
        prop_assume!(bytes.len() != 4);
        let err = decode_telemetry(&bytes).unwrap_err();
        prop_assert_eq!(err.len, bytes.len());
    }
}
