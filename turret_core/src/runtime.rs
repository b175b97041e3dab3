//! Threaded runtime: one reactor thread per countdown timer.
//!
//! A `ReactorTimer` is the `CountdownTimer` handed to the scheduler or the
//! actuation controller; arming it just sends the absolute deadline to its
//! reactor thread. The thread blocks in `recv_timeout` until that deadline
//! and then delivers the expiry to the rig. No reactor polls.
//!
//! Thread lifetime is owned by `TimerReactor`, never by the timer handle, so
//! an expiry handler can re-arm its own timer without joining itself.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel as xch;
use turret_traits::{Clock, CountdownTimer, LineFactory, TimerFactory, TimerRole};

use crate::channel::{Adjustment, ChannelId, Preset};
use crate::error::{Result, TurretError};
use crate::protocol::CommandOutcome;
use crate::rig::{Turret, TurretBuilder};
use crate::status::TurretStatus;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Copy)]
enum TimerMsg {
    Arm { deadline: Instant, tag: u64 },
    Disarm,
    Stop,
}

/// `CountdownTimer` backed by a reactor thread.
pub struct ReactorTimer {
    tx: xch::Sender<TimerMsg>,
    clock: Arc<dyn Clock + Send + Sync>,
    role: TimerRole,
}

impl CountdownTimer for ReactorTimer {
    fn arm(&mut self, after: Duration, tag: u64) -> std::result::Result<(), BoxError> {
        let deadline = self.clock.now() + after;
        self.tx
            .send(TimerMsg::Arm { deadline, tag })
            .map_err(|_| format!("{} reactor unavailable", self.role.name()).into())
    }

    fn disarm(&mut self) {
        // A stopped reactor has nothing left to cancel.
        let _ = self.tx.send(TimerMsg::Disarm);
    }
}

/// One reactor thread and the channel that feeds it.
pub struct TimerReactor {
    role: TimerRole,
    tx: xch::Sender<TimerMsg>,
    join_handle: Option<JoinHandle<()>>,
}

impl TimerReactor {
    /// Spawn a reactor that calls `on_expiry(now, tag)` each time the armed
    /// deadline passes.
    fn spawn<F>(
        role: TimerRole,
        tx: xch::Sender<TimerMsg>,
        rx: xch::Receiver<TimerMsg>,
        clock: Arc<dyn Clock + Send + Sync>,
        mut on_expiry: F,
    ) -> std::result::Result<Self, TurretError>
    where
        F: FnMut(Instant, u64) + Send + 'static,
    {
        let join_handle = std::thread::Builder::new()
            .name(format!("turret-{}", role.name()))
            .spawn(move || {
                let mut armed: Option<(Instant, u64)> = None;
                loop {
                    let msg = match armed {
                        Some((deadline, tag)) => {
                            let now = clock.now();
                            if now >= deadline {
                                armed = None;
                                on_expiry(now, tag);
                                continue;
                            }
                            match rx.recv_timeout(deadline - now) {
                                Ok(m) => m,
                                Err(xch::RecvTimeoutError::Timeout) => continue,
                                Err(xch::RecvTimeoutError::Disconnected) => break,
                            }
                        }
                        None => match rx.recv() {
                            Ok(m) => m,
                            Err(_) => break,
                        },
                    };
                    match msg {
                        TimerMsg::Arm { deadline, tag } => armed = Some((deadline, tag)),
                        TimerMsg::Disarm => armed = None,
                        TimerMsg::Stop => break,
                    }
                }
                tracing::trace!(timer = role.name(), "reactor exiting cleanly");
            })
            .map_err(|e| {
                TurretError::ResourceUnavailable(format!("{} reactor thread: {e}", role.name()))
            })?;
        Ok(Self {
            role,
            tx,
            join_handle: Some(join_handle),
        })
    }

    /// Stop the thread and wait for it. Idempotent.
    pub fn stop(&mut self) {
        let _ = self.tx.send(TimerMsg::Stop);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!(timer = self.role.name(), "reactor joined"),
                Err(e) => tracing::warn!(?e, timer = self.role.name(), "reactor panicked"),
            }
        }
    }
}

impl Drop for TimerReactor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// `TimerFactory` that hands out `ReactorTimer`s and keeps the receiving
/// ends until the reactors are spawned.
struct ReactorTimers {
    clock: Arc<dyn Clock + Send + Sync>,
    channels: Vec<(TimerRole, xch::Sender<TimerMsg>, xch::Receiver<TimerMsg>)>,
}

impl ReactorTimers {
    fn take(
        &mut self,
        role: TimerRole,
    ) -> Option<(xch::Sender<TimerMsg>, xch::Receiver<TimerMsg>)> {
        let idx = self.channels.iter().position(|(r, _, _)| *r == role)?;
        let (_, tx, rx) = self.channels.remove(idx);
        Some((tx, rx))
    }
}

impl TimerFactory for ReactorTimers {
    fn acquire(&mut self, role: TimerRole) -> std::result::Result<Box<dyn CountdownTimer>, BoxError> {
        let (tx, rx) = xch::unbounded();
        self.channels.push((role, tx.clone(), rx));
        Ok(Box::new(ReactorTimer {
            tx,
            clock: Arc::clone(&self.clock),
            role,
        }))
    }
}

/// A started rig with live timer reactors.
pub struct TurretRuntime {
    turret: Arc<Turret>,
    reactors: Vec<TimerReactor>,
}

impl core::fmt::Debug for TurretRuntime {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TurretRuntime")
            .field("turret", &self.turret)
            .field("reactors", &self.reactors.len())
            .finish()
    }
}

impl TurretRuntime {
    /// Assemble the rig on `lines`, spawn the scheduler and watchdog
    /// reactors and begin the first period.
    pub fn start(builder: TurretBuilder, lines: &mut dyn LineFactory) -> Result<Self> {
        let clock = builder.clock();
        let mut timers = ReactorTimers {
            clock: Arc::clone(&clock),
            channels: Vec::with_capacity(2),
        };
        let turret = Arc::new(builder.assemble(lines, &mut timers)?);

        let mut rt = Self {
            turret: Arc::clone(&turret),
            reactors: Vec::with_capacity(2),
        };
        for role in [TimerRole::Scheduler, TimerRole::Watchdog] {
            let Some((tx, rx)) = timers.take(role) else {
                rt.shutdown()?;
                return Err(eyre::Report::new(TurretError::ResourceUnavailable(format!(
                    "{} timer was never acquired",
                    role.name()
                ))));
            };
            let weak = Arc::downgrade(&turret);
            let spawned = match role {
                TimerRole::Scheduler => {
                    TimerReactor::spawn(role, tx, rx, Arc::clone(&clock), move |now, _| {
                        if let Some(t) = weak.upgrade() {
                            t.on_scheduler_expiry(now);
                        }
                    })
                }
                TimerRole::Watchdog => {
                    TimerReactor::spawn(role, tx, rx, Arc::clone(&clock), move |_, token| {
                        if let Some(t) = weak.upgrade() {
                            t.on_watchdog_expiry(token);
                        }
                    })
                }
            };
            match spawned {
                Ok(r) => rt.reactors.push(r),
                Err(e) => {
                    let _ = rt.shutdown();
                    return Err(eyre::Report::new(e));
                }
            }
        }

        if let Err(e) = turret.start() {
            let _ = rt.shutdown();
            return Err(eyre::Report::new(e));
        }
        tracing::info!("turret runtime started");
        Ok(rt)
    }

    pub fn turret(&self) -> &Turret {
        &self.turret
    }

    /// Shared handle for callbacks that outlive a borrow, e.g. a GPIO interrupt.
    pub fn shared(&self) -> Arc<Turret> {
        Arc::clone(&self.turret)
    }

    pub fn submit(&self, raw: &[u8]) -> std::result::Result<CommandOutcome, TurretError> {
        self.turret.submit(raw)
    }

    pub fn apply_preset(
        &self,
        channel: ChannelId,
        preset: Preset,
    ) -> std::result::Result<Adjustment, TurretError> {
        self.turret.apply_preset(channel, preset)
    }

    pub fn feedback(&self) -> bool {
        self.turret.feedback()
    }

    pub fn status(&self) -> TurretStatus {
        self.turret.status()
    }

    /// Ordered shutdown: disarm both timers, drive every output low, then
    /// stop and join the reactor threads. Idempotent.
    pub fn shutdown(&mut self) -> std::result::Result<(), TurretError> {
        let res = self.turret.shutdown();
        while let Some(mut r) = self.reactors.pop() {
            r.stop();
        }
        res
    }
}

impl Drop for TurretRuntime {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::error!(error = %e, "runtime shutdown on drop failed");
        }
    }
}
