//! Telemetry subscription.
//!
//! `subscribe` installs a sink on the transport that decodes each payload,
//! records it as the session's latest telemetry and then hands it to a
//! [`TelemetryHandler`]. Subscriptions are single-flight: a second
//! `subscribe` on a subscribed session changes nothing.
use std::sync::Arc;

use desk_traits::{Characteristic, NotifySink, Transport};

use crate::codec::{self, TelemetrySample};
use crate::error::Result;
use crate::hw_error::map_transport_error;
use crate::session::{Session, lock_telemetry};

/// Receives status lines from a movement.
///
/// Called once per telemetry sample and with `"Done"` exactly once when a
/// movement finishes. Runs on the transport's delivery context; keep it short.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, status: &str);
}

impl<F> ProgressReporter for F
where
    F: Fn(&str) + Send + Sync,
{
    fn report(&self, status: &str) {
        self(status)
    }
}

/// Consumer of decoded telemetry.
pub trait TelemetryHandler: Send + Sync {
    fn on_sample(&self, sample: &TelemetrySample);
}

/// Forwards every sample to a [`ProgressReporter`] as `"Height: {mm}; Speed: {speed}"`.
pub struct StatusForwarder {
    reporter: Arc<dyn ProgressReporter>,
}

impl StatusForwarder {
    pub fn new(reporter: Arc<dyn ProgressReporter>) -> Self {
        Self { reporter }
    }
}

pub fn status_line(sample: &TelemetrySample) -> String {
    format!("Height: {:.1}; Speed: {}", sample.height_mm, sample.speed)
}

impl TelemetryHandler for StatusForwarder {
    fn on_sample(&self, sample: &TelemetrySample) {
        self.reporter.report(&status_line(sample));
    }
}

pub fn subscribe<T: Transport>(
    session: &mut Session<T>,
    characteristic: Characteristic,
    handler: Arc<dyn TelemetryHandler>,
) -> Result<()> {
    if session.is_subscribed() {
        tracing::trace!(?characteristic, "already subscribed");
        return Ok(());
    }
    let cell = session.telemetry_cell();
    let sink: NotifySink = Box::new(move |payload: &[u8]| {
        match codec::decode_telemetry(payload) {
            Ok(sample) => {
                lock_telemetry(&cell).record(&sample);
                handler.on_sample(&sample);
            }
            Err(e) => tracing::warn!(error = %e, "dropping malformed telemetry"),
        }
    });
    session
        .transport_mut()
        .start_notify(characteristic, sink)
        .map_err(map_transport_error)?;
    session.set_subscribed(true);
    tracing::debug!(?characteristic, "subscribed");
    Ok(())
}

/// Stop delivery. The session counts as unsubscribed afterwards even if the
/// transport reported an error.
pub fn unsubscribe<T: Transport>(
    session: &mut Session<T>,
    characteristic: Characteristic,
) -> Result<()> {
    if !session.is_subscribed() {
        return Ok(());
    }
    session.set_subscribed(false);
    session
        .transport_mut()
        .stop_notify(characteristic)
        .map_err(map_transport_error)?;
    tracing::debug!(?characteristic, "unsubscribed");
    Ok(())
}
