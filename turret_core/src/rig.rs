//! Assembly and ordered teardown of the whole rig.
//!
//! `TurretBuilder::assemble` acquires the four output lines and the two
//! timers, drives every line low, and wires the scheduler, the actuation
//! controller and the command protocol together. If any acquisition fails,
//! everything already acquired is driven low and released in reverse order.
//!
//! `Turret` itself is passive: something must deliver timer expiries to
//! `on_scheduler_expiry` / `on_watchdog_expiry`. Tests do that by hand with
//! the manual timers in `mocks`; `runtime::TurretRuntime` does it with one
//! reactor thread per timer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use turret_traits::{
    Clock, CommandSink, CountdownTimer, LineFactory, LineRole, MonotonicClock, OutputLine,
    TimerFactory, TimerRole,
};

use crate::actuation::{ActuationController, ActuationLines};
use crate::channel::{Adjustment, ChannelBank, ChannelId, Preset, PulseChannel};
use crate::config::TurretCfg;
use crate::error::{Result, TurretError};
use crate::protocol::{Command, CommandOutcome, CommandProtocol};
use crate::scheduler::{EdgeScheduler, Tick};
use crate::status::TurretStatus;

const LINE_ORDER: [LineRole; 4] = [
    LineRole::Pan,
    LineRole::Tilt,
    LineRole::Stepper,
    LineRole::Solenoid,
];
const TIMER_ORDER: [TimerRole; 2] = [TimerRole::Scheduler, TimerRole::Watchdog];

/// Resources acquired so far, in acquisition order.
#[derive(Default)]
struct Acquired {
    lines: Vec<(LineRole, Box<dyn OutputLine>)>,
    timers: Vec<(TimerRole, Box<dyn CountdownTimer>)>,
}

impl Acquired {
    /// Drive low and drop everything, newest first. Timers were acquired
    /// after every line, so they go first.
    fn unwind(mut self) {
        while let Some((role, mut timer)) = self.timers.pop() {
            timer.disarm();
            tracing::debug!(timer = role.name(), "released");
            drop(timer);
        }
        while let Some((role, mut line)) = self.lines.pop() {
            if let Err(e) = line.set(false) {
                tracing::error!(line = role.name(), error = %e, "failed to drive low before release");
            }
            tracing::debug!(line = role.name(), "released");
            drop(line);
        }
    }

    fn take_line(&mut self, role: LineRole) -> Option<Box<dyn OutputLine>> {
        let idx = self.lines.iter().position(|(r, _)| *r == role)?;
        Some(self.lines.remove(idx).1)
    }

    fn take_timer(&mut self, role: TimerRole) -> Option<Box<dyn CountdownTimer>> {
        let idx = self.timers.iter().position(|(r, _)| *r == role)?;
        Some(self.timers.remove(idx).1)
    }
}

fn unavailable(what: &str, e: &(dyn std::error::Error + 'static)) -> eyre::Report {
    eyre::Report::new(TurretError::ResourceUnavailable(format!("{what}: {e}")))
}

pub struct TurretBuilder {
    cfg: TurretCfg,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl TurretBuilder {
    pub fn new(cfg: TurretCfg) -> Self {
        Self {
            cfg,
            clock: Arc::new(MonotonicClock::new()),
        }
    }

    /// Builder from a loaded and validated TOML config.
    pub fn from_config(cfg: &turret_config::Config) -> Self {
        Self::new(TurretCfg::from(cfg))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    pub fn cfg(&self) -> &TurretCfg {
        &self.cfg
    }

    pub fn clock(&self) -> Arc<dyn Clock + Send + Sync> {
        Arc::clone(&self.clock)
    }

    /// Acquire lines (pan, tilt, stepper, solenoid) then timers (scheduler,
    /// watchdog) and wire the rig. Nothing is started yet.
    pub fn assemble(
        self,
        lines: &mut dyn LineFactory,
        timers: &mut dyn TimerFactory,
    ) -> Result<Turret> {
        self.cfg.check().map_err(eyre::Report::new)?;

        let mut acq = Acquired::default();
        for role in LINE_ORDER {
            let mut line = match lines.acquire(role) {
                Ok(l) => l,
                Err(e) => {
                    tracing::error!(line = role.name(), error = %e, "line acquisition failed");
                    acq.unwind();
                    return Err(unavailable(role.name(), &*e));
                }
            };
            if let Err(e) = line.set(false) {
                tracing::error!(line = role.name(), error = %e, "line refused initial low");
                drop(line);
                acq.unwind();
                return Err(unavailable(role.name(), &*e));
            }
            tracing::debug!(line = role.name(), "acquired");
            acq.lines.push((role, line));
        }
        for role in TIMER_ORDER {
            match timers.acquire(role) {
                Ok(t) => {
                    tracing::debug!(timer = role.name(), "acquired");
                    acq.timers.push((role, t));
                }
                Err(e) => {
                    tracing::error!(timer = role.name(), error = %e, "timer acquisition failed");
                    acq.unwind();
                    return Err(unavailable(role.name(), &*e));
                }
            }
        }

        let (Some(pan), Some(tilt), Some(stepper), Some(solenoid), Some(sched_timer), Some(watchdog)) = (
            acq.take_line(LineRole::Pan),
            acq.take_line(LineRole::Tilt),
            acq.take_line(LineRole::Stepper),
            acq.take_line(LineRole::Solenoid),
            acq.take_timer(TimerRole::Scheduler),
            acq.take_timer(TimerRole::Watchdog),
        ) else {
            acq.unwind();
            return Err(eyre::eyre!("internal: acquired resources incomplete"));
        };

        let bank = Arc::new(ChannelBank::new(vec![
            PulseChannel::new(ChannelId::Pan, self.cfg.pan.limits, self.cfg.pan.initial_us),
            PulseChannel::new(ChannelId::Tilt, self.cfg.tilt.limits, self.cfg.tilt.initial_us),
        ]));
        let scheduler = EdgeScheduler::new(
            Arc::clone(&bank),
            vec![pan, tilt],
            sched_timer,
            self.cfg.scheduler,
        )
        .map_err(eyre::Report::new)?;
        let actuation = Arc::new(ActuationController::new(
            ActuationLines { stepper, solenoid },
            watchdog,
            self.cfg.actuation,
            Arc::clone(&self.clock),
        ));
        let protocol = CommandProtocol::new(Arc::clone(&bank), Arc::clone(&actuation));

        tracing::info!(
            period_us = self.cfg.scheduler.period.as_micros() as u64,
            pan_us = self.cfg.pan.initial_us,
            tilt_us = self.cfg.tilt.initial_us,
            "turret assembled"
        );
        Ok(Turret {
            bank,
            scheduler: Mutex::new(scheduler),
            actuation,
            protocol,
            clock: self.clock,
            shut_down: AtomicBool::new(false),
        })
    }
}

pub struct Turret {
    bank: Arc<ChannelBank>,
    scheduler: Mutex<EdgeScheduler>,
    actuation: Arc<ActuationController>,
    protocol: CommandProtocol,
    clock: Arc<dyn Clock + Send + Sync>,
    shut_down: AtomicBool,
}

impl core::fmt::Debug for Turret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Turret")
            .field("channels", &self.bank.snapshot())
            .field("actuation", &self.actuation)
            .field("shut_down", &self.shut_down.load(Ordering::Relaxed))
            .finish()
    }
}

impl Turret {
    fn sched(&self) -> MutexGuard<'_, EdgeScheduler> {
        self.scheduler.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_live(&self) -> std::result::Result<(), TurretError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(TurretError::ResourceUnavailable("turret is shut down".into()));
        }
        Ok(())
    }

    /// Begin the first period now.
    pub fn start(&self) -> std::result::Result<(), TurretError> {
        self.ensure_live()?;
        self.sched().start(self.clock.now())
    }

    /// Parse and apply one raw 3-byte command. Refused once shut down.
    pub fn submit(&self, raw: &[u8]) -> std::result::Result<CommandOutcome, TurretError> {
        self.ensure_live()?;
        self.protocol.submit(raw)
    }

    pub fn dispatch(&self, cmd: Command) -> std::result::Result<CommandOutcome, TurretError> {
        self.ensure_live()?;
        self.protocol.dispatch(cmd)
    }

    pub fn apply_preset(
        &self,
        channel: ChannelId,
        preset: Preset,
    ) -> std::result::Result<Adjustment, TurretError> {
        self.ensure_live()?;
        self.protocol.apply_preset(channel, preset)
    }

    /// Mechanism-primed signal from the feedback sensor.
    pub fn feedback(&self) -> bool {
        if self.shut_down.load(Ordering::Acquire) {
            return false;
        }
        self.actuation.on_feedback()
    }

    /// Deliver one expiry of the scheduler timer.
    pub fn on_scheduler_expiry(&self, now: Instant) -> Tick {
        self.sched().on_timer_expiry(now)
    }

    /// Deliver one expiry of the watchdog timer.
    pub fn on_watchdog_expiry(&self, token: u64) -> bool {
        self.actuation.on_watchdog_expiry(token)
    }

    pub fn actuation(&self) -> &ActuationController {
        &self.actuation
    }

    pub fn bank(&self) -> &ChannelBank {
        &self.bank
    }

    pub fn clock(&self) -> &Arc<dyn Clock + Send + Sync> {
        &self.clock
    }

    pub fn status(&self) -> TurretStatus {
        let (scheduler_running, cycles, resets) = {
            let s = self.sched();
            (s.is_running(), s.cycle(), s.resets())
        };
        TurretStatus {
            channels: self.bank.snapshot(),
            actuation: self.actuation.snapshot(),
            scheduler_running,
            cycles,
            resets,
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Disarm both timers, then drive every output low. Idempotent; the
    /// line handles themselves are released when the `Turret` is dropped.
    pub fn shutdown(&self) -> std::result::Result<(), TurretError> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut sched = self.sched();
        sched.disarm();
        self.actuation.disarm_watchdog();
        let channels = sched.shutdown();
        let actuators = self.actuation.shutdown();
        drop(sched);
        tracing::info!("turret shut down");
        channels.and(actuators)
    }
}

impl Drop for Turret {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::error!(error = %e, "shutdown on drop failed");
        }
    }
}

impl CommandSink for Turret {
    fn submit(&mut self, command: &[u8]) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Self::submit(self, command).map(|_| ()).map_err(Into::into)
    }
}

impl CommandSink for &Turret {
    fn submit(&mut self, command: &[u8]) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Turret::submit(self, command).map(|_| ()).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{LineLog, ManualTimers, RecordingLines};

    #[test]
    fn assemble_drives_every_line_low_once() {
        let log = LineLog::new();
        let mut lines = RecordingLines::new(log.clone());
        let mut timers = ManualTimers::new();
        let t = TurretBuilder::new(TurretCfg::default())
            .assemble(&mut lines, &mut timers)
            .expect("assemble");
        for role in LINE_ORDER {
            assert_eq!(log.levels(role.name()), vec![false], "{}", role.name());
        }
        assert_eq!(t.status().actuation.state, crate::TurretState::Standby);
        assert!(!t.status().scheduler_running);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let log = LineLog::new();
        let mut timers = ManualTimers::new();
        let t = TurretBuilder::new(TurretCfg::default())
            .assemble(&mut RecordingLines::new(log.clone()), &mut timers)
            .expect("assemble");
        t.start().expect("start");
        t.shutdown().expect("first");
        let n = log.events().len();
        t.shutdown().expect("second");
        assert_eq!(log.events().len(), n);
        assert!(t.start().is_err());
    }

    #[test]
    fn invalid_cfg_is_a_build_error() {
        let mut cfg = TurretCfg::default();
        cfg.pan.limits.step_us = 0;
        let err = TurretBuilder::new(cfg)
            .assemble(&mut RecordingLines::new(LineLog::new()), &mut ManualTimers::new())
            .expect_err("invalid");
        assert!(err.downcast_ref::<crate::BuildError>().is_some());
    }
}
