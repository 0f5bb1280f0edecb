//! Closed-loop positioning.
//!
//! One movement runs up to `attempts` cycles of
//! `WakingUp -> Stopping -> Streaming -> Settled`. While streaming, the
//! set-point is rewritten every poll interval until telemetry reports zero
//! speed; the settled height is then compared against the target. Whatever
//! happens, the movement guard stops the actuator, drops the subscription
//! and reports `"Done"` exactly once.
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use desk_traits::{Characteristic, Clock, MonotonicClock, Transport};

use crate::codec::{
    self, BASE_HEIGHT_MM, MAX_HEIGHT_MM, Opcode, TelemetrySample, encode_command,
    encode_reference, encode_reference_target,
};
use crate::config::MotionCfg;
use crate::error::{DeskError, Result};
use crate::notify::{self, ProgressReporter, StatusForwarder};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionState {
    Idle,
    WakingUp,
    Stopping,
    Streaming,
    Settled,
    Success,
    Retry,
    Exhausted,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementStatus {
    Reached,
    Exhausted,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementOutcome {
    pub status: MovementStatus,
    /// Best known height when the movement ended.
    pub final_height_mm: f32,
    pub attempts_used: u32,
}

impl MovementOutcome {
    pub fn success(&self) -> bool {
        self.status == MovementStatus::Reached
    }

    /// Turn `Exhausted`/`Cancelled` into errors for callers that treat them as fatal.
    pub fn into_result(self) -> Result<Self> {
        match self.status {
            MovementStatus::Reached => Ok(self),
            MovementStatus::Exhausted => Err(DeskError::AttemptsExhausted {
                attempts: self.attempts_used,
                final_height_mm: self.final_height_mm,
            }),
            MovementStatus::Cancelled => Err(DeskError::Cancelled),
        }
    }
}

/// Cooperative cancellation flag, checked once per poll tick.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

enum StreamEnd {
    AtRest,
    TickCeiling,
    Cancelled,
}

/// Swallows per-write failures; link loss and missing connection propagate.
fn absorb(res: Result<()>) -> Result<()> {
    match res {
        Err(DeskError::ProtocolWrite {
            characteristic,
            cause,
        }) => {
            tracing::warn!(?characteristic, %cause, "write failed; continuing");
            Ok(())
        }
        other => other,
    }
}

fn stop_pair() -> [(Characteristic, [u8; 2]); 2] {
    [
        (Characteristic::Command, encode_command(Opcode::Stop)),
        (
            Characteristic::ReferenceInput,
            encode_reference(codec::ReferenceInput::Stop),
        ),
    ]
}

fn enter(state: &mut MotionState, next: MotionState, attempt: u32) {
    let prev = *state;
    tracing::debug!(from = ?prev, to = ?next, attempt, "motion state");
    *state = next;
}

/// Scope guard for one movement; cleanup runs in `Drop`.
struct MovementGuard<'a, T: Transport> {
    session: &'a mut Session<T>,
    reporter: Arc<dyn ProgressReporter>,
}

impl<T: Transport> Deref for MovementGuard<'_, T> {
    type Target = Session<T>;
    fn deref(&self) -> &Session<T> {
        &*self.session
    }
}

impl<T: Transport> DerefMut for MovementGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Session<T> {
        &mut *self.session
    }
}

impl<T: Transport> Drop for MovementGuard<'_, T> {
    fn drop(&mut self) {
        for (characteristic, payload) in stop_pair() {
            if !self.session.is_connected() {
                break;
            }
            if let Err(e) = self.session.write(characteristic, &payload) {
                tracing::warn!(?characteristic, error = %e, "stop during cleanup failed");
            }
        }
        if let Err(e) = notify::unsubscribe(&mut *self.session, Characteristic::Height) {
            tracing::warn!(error = %e, "unsubscribe during cleanup failed");
        }
        self.reporter.report("Done");
    }
}

pub struct MotionController {
    cfg: MotionCfg,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl MotionController {
    pub fn new(cfg: MotionCfg) -> Self {
        Self {
            cfg,
            clock: Arc::new(MonotonicClock::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &MotionCfg {
        &self.cfg
    }

    pub fn move_to_position<T: Transport>(
        &self,
        session: &mut Session<T>,
        target_mm: f32,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<MovementOutcome> {
        self.move_to_position_with_cancel(session, target_mm, reporter, &CancelToken::new())
    }

    /// Drive the desk to `target_mm`.
    ///
    /// Returns `Ok` with `Reached`, `Exhausted` or `Cancelled`; errors are
    /// reserved for invalid targets and lost links.
    pub fn move_to_position_with_cancel<T: Transport>(
        &self,
        session: &mut Session<T>,
        target_mm: f32,
        reporter: Arc<dyn ProgressReporter>,
        cancel: &CancelToken,
    ) -> Result<MovementOutcome> {
        if !(BASE_HEIGHT_MM..=MAX_HEIGHT_MM).contains(&target_mm) {
            return Err(DeskError::TargetOutOfRange(target_mm));
        }
        if !session.is_connected() {
            return Err(DeskError::NotConnected);
        }
        let budget = self.cfg.attempts;
        tracing::info!(target_mm, budget, "moving");

        let mut desk = MovementGuard {
            session,
            reporter: Arc::clone(&reporter),
        };
        let mut state = MotionState::Idle;
        let mut attempt = 0;

        while attempt < budget {
            if cancel.is_cancelled() {
                break;
            }
            attempt += 1;

            enter(&mut state, MotionState::WakingUp, attempt);
            absorb(desk.write(Characteristic::Command, &encode_command(Opcode::Wakeup)))?;

            enter(&mut state, MotionState::Stopping, attempt);
            for (characteristic, payload) in stop_pair() {
                absorb(desk.write(characteristic, &payload))?;
            }

            enter(&mut state, MotionState::Streaming, attempt);
            if !desk.is_subscribed() {
                let handler = Arc::new(StatusForwarder::new(Arc::clone(&reporter)));
                notify::subscribe(&mut *desk, Characteristic::Height, handler)?;
                if desk.telemetry().samples == 0 {
                    // Seed the height so a desk that never moves still settles correctly.
                    if let Err(e) = desk.read_height() {
                        tracing::debug!(error = %e, "initial height read failed");
                    }
                }
            }
            match self.stream(&mut *desk, target_mm, cancel)? {
                StreamEnd::AtRest => {}
                StreamEnd::TickCeiling => {
                    tracing::warn!(
                        attempt,
                        ticks = self.cfg.max_stream_ticks,
                        "actuator never reported rest"
                    );
                }
                StreamEnd::Cancelled => break,
            }

            enter(&mut state, MotionState::Settled, attempt);
            let height = desk.telemetry().height_mm;
            if (height - target_mm).abs() <= self.cfg.height_tolerance_mm {
                enter(&mut state, MotionState::Success, attempt);
                tracing::info!(height_mm = height, attempts = attempt, "target reached");
                return Ok(MovementOutcome {
                    status: MovementStatus::Reached,
                    final_height_mm: height,
                    attempts_used: attempt,
                });
            }
            let mismatch = DeskError::HeightMismatchAfterSettle {
                target_mm,
                actual_mm: height,
            };
            tracing::warn!(attempt, budget, error = %mismatch, "retrying");
            enter(&mut state, MotionState::Retry, attempt);
        }

        if desk.telemetry().samples == 0 {
            // No attempt ran; report a measured height rather than the default.
            if let Err(e) = desk.read_height() {
                tracing::debug!(error = %e, "final height read failed");
            }
        }
        let final_height_mm = desk.telemetry().height_mm;
        let status = if cancel.is_cancelled() {
            enter(&mut state, MotionState::Cancelled, attempt);
            tracing::info!(height_mm = final_height_mm, "movement cancelled");
            MovementStatus::Cancelled
        } else {
            enter(&mut state, MotionState::Exhausted, attempt);
            tracing::warn!(height_mm = final_height_mm, attempts = attempt, "attempts exhausted");
            MovementStatus::Exhausted
        };
        Ok(MovementOutcome {
            status,
            final_height_mm,
            attempts_used: attempt,
        })
    }

    fn stream<T: Transport>(
        &self,
        session: &mut Session<T>,
        target_mm: f32,
        cancel: &CancelToken,
    ) -> Result<StreamEnd> {
        let payload = encode_reference_target(target_mm);
        let mut ticks = 0u32;
        loop {
            absorb(session.write(Characteristic::ReferenceInput, &payload))?;
            self.clock.sleep(self.cfg.poll_interval);
            ticks += 1;
            if cancel.is_cancelled() {
                return Ok(StreamEnd::Cancelled);
            }
            let t = session.telemetry();
            tracing::trace!(tick = ticks, height_mm = t.height_mm, speed = t.speed, "poll");
            if t.speed == 0 {
                return Ok(StreamEnd::AtRest);
            }
            if ticks >= self.cfg.max_stream_ticks {
                return Ok(StreamEnd::TickCeiling);
            }
        }
    }

    /// Jog one step: WAKEUP followed by a single UP or DOWN opcode.
    pub fn nudge<T: Transport>(
        &self,
        session: &mut Session<T>,
        direction: Direction,
    ) -> Result<()> {
        let op = match direction {
            Direction::Up => Opcode::Up,
            Direction::Down => Opcode::Down,
        };
        session.write(Characteristic::Command, &encode_command(Opcode::Wakeup))?;
        session.write(Characteristic::Command, &encode_command(op))?;
        tracing::info!(?direction, "nudged");
        Ok(())
    }

    /// Halt the actuator (STOP opcode, then the reference STOP sentinel).
    pub fn stop<T: Transport>(&self, session: &mut Session<T>) -> Result<()> {
        for (characteristic, payload) in stop_pair() {
            session.write(characteristic, &payload)?;
        }
        Ok(())
    }

    pub fn read_height<T: Transport>(&self, session: &mut Session<T>) -> Result<TelemetrySample> {
        session.read_height()
    }
}

/// A session shared between threads, e.g. a button handler and a scheduler.
///
/// Only one movement may run at a time; a second caller gets `Busy`
/// instead of interleaving writes with the first.
pub struct SharedDesk<T: Transport> {
    session: Arc<Mutex<Session<T>>>,
    controller: Arc<MotionController>,
}

impl<T: Transport> Clone for SharedDesk<T> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            controller: Arc::clone(&self.controller),
        }
    }
}

impl<T: Transport> SharedDesk<T> {
    pub fn new(session: Session<T>, controller: MotionController) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            controller: Arc::new(controller),
        }
    }

    pub fn try_move_to(
        &self,
        target_mm: f32,
        reporter: Arc<dyn ProgressReporter>,
        cancel: &CancelToken,
    ) -> Result<MovementOutcome> {
        let mut session = match self.session.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => return Err(DeskError::Busy),
        };
        self.controller
            .move_to_position_with_cancel(&mut *session, target_mm, reporter, cancel)
    }

    /// Block until the session is free.
    pub fn lock(&self) -> MutexGuard<'_, Session<T>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Recover the session once every other handle is gone.
    pub fn into_session(self) -> Option<Session<T>> {
        Arc::try_unwrap(self.session)
            .ok()
            .map(|m| m.into_inner().unwrap_or_else(|e| e.into_inner()))
    }
}
