//! Whole-run orchestration: discover, connect, act, disconnect.
use std::sync::Arc;

use desk_traits::{Clock, Transport};

use crate::config::DeskCfg;
use crate::connection::ConnectionManager;
use crate::controller::{CancelToken, MotionController, MovementOutcome};
use crate::error::Result;
use crate::notify::ProgressReporter;
use crate::session::Session;

/// Open a session to the configured desk, hand it to `f`, and always
/// disconnect afterwards. The closure's result is returned unchanged;
/// disconnect failures are only logged.
pub fn run_with_session<T, R, F>(
    mut transport: T,
    cfg: &DeskCfg,
    clock: Arc<dyn Clock + Send + Sync>,
    f: F,
) -> Result<R>
where
    T: Transport,
    F: FnOnce(&MotionController, &mut Session<T>) -> Result<R>,
{
    let manager = ConnectionManager::new(cfg.connection.clone()).with_clock(Arc::clone(&clock));
    let device = manager.discover_cached(
        &mut transport,
        &cfg.mac_address,
        cfg.device_cache.as_deref(),
    )?;
    let mut session = manager.connect(transport, &device, cfg.connection.attempts)?;
    let controller = MotionController::new(cfg.motion.clone()).with_clock(clock);

    let result = f(&controller, &mut session);

    if let Err(e) = manager.disconnect(&mut session) {
        tracing::warn!(error = %e, "disconnect failed");
    }
    result
}

/// Move the configured desk to `target_mm` in one self-contained run.
pub fn run_to_position<T: Transport>(
    transport: T,
    cfg: &DeskCfg,
    clock: Arc<dyn Clock + Send + Sync>,
    target_mm: f32,
    reporter: Arc<dyn ProgressReporter>,
    cancel: &CancelToken,
) -> Result<MovementOutcome> {
    run_with_session(transport, cfg, clock, |controller, session| {
        controller.move_to_position_with_cancel(session, target_mm, reporter, cancel)
    })
}
