//! Wire encoding for the desk's control box.
//!
//! All multi-byte values are little-endian. Heights travel as tenths of a
//! millimetre above [`BASE_HEIGHT_MM`]: `mm = raw / 10 + 620`.

use thiserror::Error;

/// Lowest reachable height; raw value 0.
pub const BASE_HEIGHT_MM: f32 = desk_config::BASE_HEIGHT_MM;
/// Highest reachable height; raw value 6500.
pub const MAX_HEIGHT_MM: f32 = desk_config::MAX_HEIGHT_MM;

pub const REFERENCE_STOP: u16 = 32769;
pub const REFERENCE_UP: u16 = 32768;
pub const REFERENCE_DOWN: u16 = 32767;

/// Length of a height notification: u16 height + i16 speed.
pub const TELEMETRY_LEN: usize = 4;

/// One-shot movement opcodes for the command characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Opcode {
    Up = 71,
    Down = 70,
    Stop = 255,
    Wakeup = 254,
}

/// Values accepted by the reference-input characteristic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReferenceInput {
    /// Absolute set-point in millimetres.
    Target(f32),
    Stop,
    Up,
    Down,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("telemetry payload must be 4 bytes, got {len}")]
pub struct ProtocolDecodeError {
    pub len: usize,
}

/// Telemetry exactly as it arrives on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawTelemetry {
    pub height_raw: u16,
    pub speed: i16,
}

/// Decoded telemetry. `speed == 0` means the actuator is at rest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    pub height_mm: f32,
    pub speed: i16,
}

impl RawTelemetry {
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolDecodeError> {
        match *bytes {
            [h0, h1, s0, s1] => Ok(Self {
                height_raw: u16::from_le_bytes([h0, h1]),
                speed: i16::from_le_bytes([s0, s1]),
            }),
            _ => Err(ProtocolDecodeError { len: bytes.len() }),
        }
    }

    /// Convert to millimetres, clamping out-of-band heights into the travel range.
    pub fn to_sample(self) -> TelemetrySample {
        let mm = raw_to_mm(self.height_raw);
        if mm > MAX_HEIGHT_MM {
            tracing::warn!(raw = self.height_raw, "reported height above travel range; clamping");
        }
        TelemetrySample {
            height_mm: mm.clamp(BASE_HEIGHT_MM, MAX_HEIGHT_MM),
            speed: self.speed,
        }
    }
}

#[inline]
pub fn raw_to_mm(raw: u16) -> f32 {
    f32::from(raw) / 10.0 + BASE_HEIGHT_MM
}

/// Millimetres to the raw set-point, clamped into the travel range.
#[inline]
pub fn mm_to_raw(mm: f32) -> u16 {
    let clamped = if mm.is_nan() {
        BASE_HEIGHT_MM
    } else {
        mm.clamp(BASE_HEIGHT_MM, MAX_HEIGHT_MM)
    };
    ((clamped - BASE_HEIGHT_MM) * 10.0).round() as u16
}

pub fn encode_command(op: Opcode) -> [u8; 2] {
    (op as u16).to_le_bytes()
}

pub fn encode_reference_target(mm: f32) -> [u8; 2] {
    mm_to_raw(mm).to_le_bytes()
}

pub fn encode_reference(input: ReferenceInput) -> [u8; 2] {
    match input {
        ReferenceInput::Target(mm) => encode_reference_target(mm),
        ReferenceInput::Stop => REFERENCE_STOP.to_le_bytes(),
        ReferenceInput::Up => REFERENCE_UP.to_le_bytes(),
        ReferenceInput::Down => REFERENCE_DOWN.to_le_bytes(),
    }
}

pub fn decode_telemetry(bytes: &[u8]) -> Result<TelemetrySample, ProtocolDecodeError> {
    RawTelemetry::parse(bytes).map(RawTelemetry::to_sample)
}
