//! Prime/fire interlock.
//!
//! STANDBY --prime--> PRIMING --feedback | watchdog--> READY --fire--> FIRING --watchdog--> STANDBY
//!
//! The stepper is asserted only in PRIMING and the solenoid only in FIRING,
//! and each of those states always has a watchdog armed. All transitions run
//! under one lock, so the feedback signal and the priming watchdog cannot both
//! complete PRIMING -> READY: whichever takes the lock second finds the state
//! already moved on (or its token superseded) and does nothing.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use turret_traits::{Clock, CountdownTimer, OutputLine};

use crate::config::ActuationCfg;
use crate::error::TurretError;
use crate::hw_error::map_hw_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurretState {
    Standby,
    Priming,
    Ready,
    Firing,
}

impl TurretState {
    pub fn name(self) -> &'static str {
        match self {
            TurretState::Standby => "STANDBY",
            TurretState::Priming => "PRIMING",
            TurretState::Ready => "READY",
            TurretState::Firing => "FIRING",
        }
    }
}

impl core::fmt::Display for TurretState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Operator-triggered actuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Prime,
    Fire,
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Action::Prime => "prime",
            Action::Fire => "fire",
        })
    }
}

/// The two actuator outputs owned by the controller.
pub struct ActuationLines {
    pub stepper: Box<dyn OutputLine>,
    pub solenoid: Box<dyn OutputLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Watchdog {
    token: u64,
    deadline: Instant,
}

/// Point-in-time view for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuationSnapshot {
    pub state: TurretState,
    pub stepper_asserted: bool,
    pub solenoid_asserted: bool,
    pub watchdog_deadline: Option<Instant>,
    pub watchdog_token: Option<u64>,
}

struct Inner {
    state: TurretState,
    lines: ActuationLines,
    stepper_asserted: bool,
    solenoid_asserted: bool,
    watchdog: Box<dyn CountdownTimer>,
    pending: Option<Watchdog>,
    last_token: u64,
    /// Set by `shutdown`; nothing is asserted again afterwards.
    closed: bool,
}

pub struct ActuationController {
    inner: Mutex<Inner>,
    cfg: ActuationCfg,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl core::fmt::Debug for ActuationController {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = self.snapshot();
        f.debug_struct("ActuationController")
            .field("state", &s.state)
            .field("stepper", &s.stepper_asserted)
            .field("solenoid", &s.solenoid_asserted)
            .finish()
    }
}

impl ActuationController {
    pub fn new(
        lines: ActuationLines,
        watchdog: Box<dyn CountdownTimer>,
        cfg: ActuationCfg,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: TurretState::Standby,
                lines,
                stepper_asserted: false,
                solenoid_asserted: false,
                watchdog,
                pending: None,
                last_token: 0,
                closed: false,
            }),
            cfg,
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> TurretState {
        self.lock().state
    }

    pub fn snapshot(&self) -> ActuationSnapshot {
        let g = self.lock();
        ActuationSnapshot {
            state: g.state,
            stepper_asserted: g.stepper_asserted,
            solenoid_asserted: g.solenoid_asserted,
            watchdog_deadline: g.pending.map(|w| w.deadline),
            watchdog_token: g.pending.map(|w| w.token),
        }
    }

    /// STANDBY -> PRIMING: run the stepper until feedback or `prime_timeout`.
    pub fn prime(&self) -> Result<(), TurretError> {
        self.engage(Action::Prime, TurretState::Standby, TurretState::Priming)
    }

    /// READY -> FIRING: energize the solenoid for `fire_timeout`.
    pub fn fire(&self) -> Result<(), TurretError> {
        self.engage(Action::Fire, TurretState::Ready, TurretState::Firing)
    }

    /// Mechanism-primed signal. Returns true when it completed PRIMING -> READY.
    pub fn on_feedback(&self) -> bool {
        let mut guard = self.lock();
        let g = &mut *guard;
        if g.state != TurretState::Priming {
            tracing::debug!(state = %g.state, "feedback ignored");
            return false;
        }
        g.watchdog.disarm();
        g.pending = None;
        drive_low(&mut g.lines.stepper, "stepper");
        g.stepper_asserted = false;
        g.state = TurretState::Ready;
        tracing::info!("primed (feedback)");
        true
    }

    /// Watchdog expiry carrying the token it was armed with. Expiries whose
    /// token is no longer pending were superseded and are ignored.
    pub fn on_watchdog_expiry(&self, token: u64) -> bool {
        let mut guard = self.lock();
        let g = &mut *guard;
        match g.pending {
            Some(w) if w.token == token => g.pending = None,
            _ => {
                tracing::trace!(token, "stale watchdog expiry ignored");
                return false;
            }
        }
        match g.state {
            TurretState::Priming => {
                drive_low(&mut g.lines.stepper, "stepper");
                g.stepper_asserted = false;
                g.state = TurretState::Ready;
                tracing::warn!(
                    timeout_ms = self.cfg.prime_timeout.as_millis() as u64,
                    "priming feedback not seen before timeout; stepper stopped"
                );
                true
            }
            TurretState::Firing => {
                drive_low(&mut g.lines.solenoid, "solenoid");
                g.solenoid_asserted = false;
                g.state = TurretState::Standby;
                tracing::info!("fire complete");
                true
            }
            other => {
                tracing::debug!(state = %other, "watchdog expiry with nothing to do");
                false
            }
        }
    }

    /// Cancel the pending watchdog without touching outputs. Only used as the
    /// first step of an ordered shutdown, which `shutdown` then completes.
    pub fn disarm_watchdog(&self) {
        let mut g = self.lock();
        g.watchdog.disarm();
        g.pending = None;
    }

    /// Disarm the watchdog and drive both actuators low. Returns to STANDBY
    /// for good: later `prime`/`fire` calls are refused.
    pub fn shutdown(&self) -> Result<(), TurretError> {
        let mut guard = self.lock();
        let g = &mut *guard;
        g.closed = true;
        g.watchdog.disarm();
        g.pending = None;
        let stepper = g.lines.stepper.set(false);
        let solenoid = g.lines.solenoid.set(false);
        g.stepper_asserted = false;
        g.solenoid_asserted = false;
        g.state = TurretState::Standby;
        stepper
            .and(solenoid)
            .map_err(|e| map_hw_error(&*e))
    }

    fn engage(
        &self,
        action: Action,
        from: TurretState,
        to: TurretState,
    ) -> Result<(), TurretError> {
        let mut guard = self.lock();
        let g = &mut *guard;
        if g.closed {
            tracing::debug!(%action, "refused after shutdown");
            return Err(TurretError::ResourceUnavailable("turret is shut down".into()));
        }
        if g.state != from {
            tracing::debug!(%action, state = %g.state, "guard violation");
            return Err(TurretError::GuardViolation {
                action,
                state: g.state,
            });
        }

        let timeout = self.timeout_for(action);
        let token = g.last_token.wrapping_add(1);
        // Arm first: an asserted actuator must never exist without a watchdog.
        g.watchdog
            .arm(timeout, token)
            .map_err(|e| map_hw_error(&*e))?;
        let (line, name) = match action {
            Action::Prime => (&mut g.lines.stepper, "stepper"),
            Action::Fire => (&mut g.lines.solenoid, "solenoid"),
        };
        if let Err(e) = line.set(true) {
            g.watchdog.disarm();
            drive_low(line, name);
            tracing::error!(%action, error = %e, "actuator refused assert");
            return Err(map_hw_error(&*e));
        }

        g.last_token = token;
        g.pending = Some(Watchdog {
            token,
            deadline: self.clock.now() + timeout,
        });
        match action {
            Action::Prime => g.stepper_asserted = true,
            Action::Fire => g.solenoid_asserted = true,
        }
        g.state = to;
        tracing::info!(%action, timeout_ms = timeout.as_millis() as u64, state = %to, "actuation started");
        Ok(())
    }

    fn timeout_for(&self, action: Action) -> Duration {
        match action {
            Action::Prime => self.cfg.prime_timeout,
            Action::Fire => self.cfg.fire_timeout,
        }
    }
}

fn drive_low(line: &mut Box<dyn OutputLine>, name: &'static str) {
    if let Err(e) = line.set(false) {
        tracing::error!(line = name, error = %e, "failed to de-assert");
    }
}

impl Drop for ActuationController {
    fn drop(&mut self) {
        let s = self.snapshot();
        if s.stepper_asserted || s.solenoid_asserted || s.watchdog_token.is_some() {
            let _ = self.shutdown();
        }
    }
}
