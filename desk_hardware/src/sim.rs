//! Simulated desk peripheral.
//!
//! Models a Linak-style control box: every reference-input write advances the
//! actuator by one step toward the set-point and pushes a height/speed
//! notification synchronously, so one controller poll tick equals one step.
//! Fault injection covers the failure paths the control core must survive.
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use desk_traits::{Characteristic, DeviceHandle, NotifySink, Transport, TransportError};

use crate::error::HwError;

const BASE_HEIGHT_MM: f32 = 620.0;
const MAX_HEIGHT_MM: f32 = 1270.0;

const OP_UP: u16 = 71;
const OP_DOWN: u16 = 70;
const OP_STOP: u16 = 255;
const OP_WAKEUP: u16 = 254;
const REF_DOWN: u16 = 32767;
const REF_UP: u16 = 32768;
const REF_STOP: u16 = 32769;

/// Behaviour knobs for [`SimulatedDesk`].
#[derive(Debug, Clone)]
pub struct SimSettings {
    pub address: String,
    pub name: String,
    pub start_height_mm: f32,
    /// Travel per reference-input write.
    pub step_mm: f32,
    /// Settle this far short of every set-point (0 = reaches it).
    pub stall_short_mm: f32,
    /// Number of initial connect attempts that fail.
    pub fail_connects: u32,
    /// Whether the peripheral shows up in scans.
    pub advertising: bool,
    /// 1-based index of a reference-input write that fails with a GATT error.
    pub fail_reference_write: Option<usize>,
    /// 1-based index of a reference-input write that drops the link.
    pub drop_link_on_reference_write: Option<usize>,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            address: "FD:46:77:A9:30:CA".to_string(),
            name: "Desk 4711".to_string(),
            start_height_mm: 720.0,
            step_mm: 20.0,
            stall_short_mm: 0.0,
            fail_connects: 0,
            advertising: true,
            fail_reference_write: None,
            drop_link_on_reference_write: None,
        }
    }
}

/// Everything the simulated peripheral observed, for assertions.
#[derive(Debug, Clone, Default)]
pub struct SimLog {
    pub connect_attempts: u32,
    pub writes: Vec<(Characteristic, Vec<u8>)>,
    pub notify_starts: u32,
    pub notify_stops: u32,
    pub notifications_sent: u32,
    pub disconnects: u32,
}

impl SimLog {
    /// Decoded u16 values written to one characteristic, in order.
    pub fn values(&self, characteristic: Characteristic) -> Vec<u16> {
        self.writes
            .iter()
            .filter(|(c, p)| *c == characteristic && p.len() == 2)
            .map(|(_, p)| u16::from_le_bytes([p[0], p[1]]))
            .collect()
    }

    /// Number of reference-input writes carrying a real set-point.
    pub fn target_writes(&self) -> usize {
        self.values(Characteristic::ReferenceInput)
            .into_iter()
            .filter(|v| !matches!(*v, REF_DOWN | REF_UP | REF_STOP))
            .count()
    }
}

struct SimState {
    settings: SimSettings,
    height_mm: f32,
    speed: i16,
    set_point_mm: Option<f32>,
    connected: bool,
    sink: Option<Arc<dyn Fn(&[u8]) + Send + Sync>>,
    reference_writes: usize,
    log: SimLog,
}

impl SimState {
    fn payload(&self) -> [u8; 4] {
        encode_sample(self.height_mm, self.speed)
    }

    fn tick(&mut self) {
        let Some(set_point) = self.set_point_mm else {
            self.speed = 0;
            return;
        };
        let direction = if set_point >= self.height_mm { 1.0 } else { -1.0 };
        let goal = (set_point - direction * self.settings.stall_short_mm)
            .clamp(BASE_HEIGHT_MM, MAX_HEIGHT_MM);
        let remaining = goal - self.height_mm;
        if remaining.abs() <= self.settings.step_mm {
            self.height_mm = goal;
            self.speed = 0;
        } else {
            self.height_mm += remaining.signum() * self.settings.step_mm;
            // Sub-0.2 mm steps would truncate to zero and read as "at rest".
            let magnitude = (self.settings.step_mm * 5.0).clamp(1.0, f32::from(i16::MAX)) as i16;
            self.speed = if remaining > 0.0 { magnitude } else { -magnitude };
        }
    }

    fn jog(&mut self, up: bool) {
        let delta = if up {
            self.settings.step_mm
        } else {
            -self.settings.step_mm
        };
        self.set_point_mm = None;
        self.height_mm = (self.height_mm + delta).clamp(BASE_HEIGHT_MM, MAX_HEIGHT_MM);
        self.speed = 0;
    }
}

/// Wire encoding used by the real control box: LE u16 tenths above base, LE i16 speed.
pub fn encode_sample(height_mm: f32, speed: i16) -> [u8; 4] {
    let raw = ((height_mm - BASE_HEIGHT_MM) * 10.0)
        .round()
        .clamp(0.0, f32::from(u16::MAX)) as u16;
    let h = raw.to_le_bytes();
    let s = speed.to_le_bytes();
    [h[0], h[1], s[0], s[1]]
}

/// In-memory BLE peripheral implementing [`Transport`].
///
/// Cloning yields a handle onto the same simulated desk, which lets tests keep
/// an observer after the transport has been moved into a session.
#[derive(Clone)]
pub struct SimulatedDesk {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedDesk {
    pub fn new(settings: SimSettings) -> Self {
        let height_mm = settings
            .start_height_mm
            .clamp(BASE_HEIGHT_MM, MAX_HEIGHT_MM);
        Self {
            state: Arc::new(Mutex::new(SimState {
                settings,
                height_mm,
                speed: 0,
                set_point_mm: None,
                connected: false,
                sink: None,
                reference_writes: 0,
                log: SimLog::default(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn height_mm(&self) -> f32 {
        self.lock().height_mm
    }

    pub fn log(&self) -> SimLog {
        self.lock().log.clone()
    }

    /// Push a raw payload through the active notification sink, bypassing the model.
    pub fn inject_notification(&self, payload: &[u8]) {
        let sink = self.lock().sink.clone();
        if let Some(sink) = sink {
            sink(payload);
        }
    }

    fn notify(&self) {
        let (sink, payload) = {
            let mut st = self.lock();
            if st.sink.is_some() {
                st.log.notifications_sent += 1;
            }
            (st.sink.clone(), st.payload())
        };
        // Deliver outside the lock; the sink may take its own locks.
        if let Some(sink) = sink {
            sink(&payload);
        }
    }
}

impl Default for SimulatedDesk {
    fn default() -> Self {
        Self::new(SimSettings::default())
    }
}

impl Transport for SimulatedDesk {
    fn scan(&mut self, _timeout: Duration) -> Result<Vec<DeviceHandle>, TransportError> {
        let st = self.lock();
        if !st.settings.advertising {
            return Ok(Vec::new());
        }
        Ok(vec![
            DeviceHandle::new(st.settings.address.clone()).with_name(st.settings.name.clone()),
        ])
    }

    fn connect(&mut self, device: &DeviceHandle, _timeout: Duration) -> Result<(), TransportError> {
        let mut st = self.lock();
        st.log.connect_attempts += 1;
        if !device.matches(&st.settings.address) {
            return Err(Box::new(HwError::NotFound(device.address.clone())));
        }
        if st.log.connect_attempts <= st.settings.fail_connects {
            tracing::debug!(attempt = st.log.connect_attempts, "sim: refusing connection");
            return Err(Box::new(HwError::Gatt("connection refused".into())));
        }
        st.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        let mut st = self.lock();
        st.connected = false;
        st.sink = None;
        st.log.disconnects += 1;
        Ok(())
    }

    fn write(
        &mut self,
        characteristic: Characteristic,
        payload: &[u8],
        _timeout: Duration,
    ) -> Result<(), TransportError> {
        {
            let mut st = self.lock();
            if !st.connected {
                return Err(Box::new(HwError::NotConnected));
            }
            if payload.len() != 2 {
                return Err(Box::new(HwError::Gatt(format!(
                    "invalid payload length {}",
                    payload.len()
                ))));
            }
            let value = u16::from_le_bytes([payload[0], payload[1]]);
            match characteristic {
                Characteristic::ReferenceInput => {
                    st.reference_writes += 1;
                    let n = st.reference_writes;
                    if st.settings.drop_link_on_reference_write == Some(n) {
                        st.connected = false;
                        st.sink = None;
                        return Err(Box::new(HwError::Disconnected));
                    }
                    if st.settings.fail_reference_write == Some(n) {
                        return Err(Box::new(HwError::Gatt("write rejected".into())));
                    }
                    st.log.writes.push((characteristic, payload.to_vec()));
                    match value {
                        REF_STOP => {
                            st.set_point_mm = None;
                            st.speed = 0;
                        }
                        REF_UP => st.set_point_mm = Some(MAX_HEIGHT_MM),
                        REF_DOWN => st.set_point_mm = Some(BASE_HEIGHT_MM),
                        raw => st.set_point_mm = Some(f32::from(raw) / 10.0 + BASE_HEIGHT_MM),
                    }
                    st.tick();
                }
                Characteristic::Command => {
                    st.log.writes.push((characteristic, payload.to_vec()));
                    match value {
                        OP_STOP => {
                            st.set_point_mm = None;
                            st.speed = 0;
                        }
                        OP_UP => st.jog(true),
                        OP_DOWN => st.jog(false),
                        OP_WAKEUP => {}
                        other => {
                            return Err(Box::new(HwError::Gatt(format!("unknown opcode {other}"))));
                        }
                    }
                }
                Characteristic::Height => {
                    return Err(Box::new(HwError::Gatt(
                        "height characteristic is not writable".into(),
                    )));
                }
            }
        }
        self.notify();
        Ok(())
    }

    fn read(
        &mut self,
        characteristic: Characteristic,
        _timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let st = self.lock();
        if !st.connected {
            return Err(Box::new(HwError::NotConnected));
        }
        match characteristic {
            Characteristic::Height => Ok(st.payload().to_vec()),
            other => Err(Box::new(HwError::Gatt(format!("{other:?} is not readable")))),
        }
    }

    fn start_notify(
        &mut self,
        characteristic: Characteristic,
        sink: NotifySink,
    ) -> Result<(), TransportError> {
        let mut st = self.lock();
        if !st.connected {
            return Err(Box::new(HwError::NotConnected));
        }
        if characteristic != Characteristic::Height {
            return Err(Box::new(HwError::Gatt(format!(
                "{characteristic:?} does not notify"
            ))));
        }
        st.sink = Some(Arc::from(sink));
        st.log.notify_starts += 1;
        Ok(())
    }

    fn stop_notify(&mut self, _characteristic: Characteristic) -> Result<(), TransportError> {
        let mut st = self.lock();
        st.sink = None;
        st.log.notify_stops += 1;
        Ok(())
    }
}
