//! Test and helper mocks for turret_core.
//!
//! `RecordingLine` and `ManualTimer` stand in for real outputs and timers;
//! the factories hand them out by role and can be told to refuse one role to
//! exercise initialization unwinding.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use turret_traits::{
    Clock, CountdownTimer, LineFactory, LineRole, MonotonicClock, OutputLine, TimerFactory,
    TimerRole,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOp {
    Set(bool),
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEvent {
    pub line: &'static str,
    pub op: LineOp,
    pub at: Instant,
}

/// Shared, ordered record of everything the mock lines and timers did.
#[derive(Clone)]
pub struct LineLog {
    events: Arc<Mutex<Vec<LineEvent>>>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl core::fmt::Debug for LineLog {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(lock(&self.events).iter()).finish()
    }
}

impl Default for LineLog {
    fn default() -> Self {
        Self::new()
    }
}

impl LineLog {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(MonotonicClock::new()))
    }

    /// Timestamp events with `clock` (e.g. a shared `TestClock`).
    pub fn with_clock(clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            clock,
        }
    }

    pub fn record(&self, line: &'static str, op: LineOp) {
        let at = self.clock.now();
        lock(&self.events).push(LineEvent { line, op, at });
    }

    pub fn events(&self) -> Vec<LineEvent> {
        lock(&self.events).clone()
    }

    /// Levels written to `line`, in order.
    pub fn levels(&self, line: &str) -> Vec<bool> {
        lock(&self.events)
            .iter()
            .filter(|e| e.line == line)
            .filter_map(|e| match e.op {
                LineOp::Set(high) => Some(high),
                LineOp::Released => None,
            })
            .collect()
    }

    /// Timed level changes of `line`.
    pub fn transitions(&self, line: &str) -> Vec<(Instant, bool)> {
        lock(&self.events)
            .iter()
            .filter(|e| e.line == line)
            .filter_map(|e| match e.op {
                LineOp::Set(high) => Some((e.at, high)),
                LineOp::Released => None,
            })
            .collect()
    }

    /// Last level written to `line`, if any.
    pub fn level(&self, line: &str) -> Option<bool> {
        self.levels(line).last().copied()
    }

    /// Names of released lines and timers, in release order.
    pub fn releases(&self) -> Vec<&'static str> {
        lock(&self.events)
            .iter()
            .filter(|e| e.op == LineOp::Released)
            .map(|e| e.line)
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }
}

/// Output line that logs every successful write and its own release.
pub struct RecordingLine {
    label: &'static str,
    log: LineLog,
    fail: Arc<AtomicBool>,
}

impl RecordingLine {
    pub fn new(label: &'static str, log: LineLog) -> Self {
        Self {
            label,
            log,
            fail: Arc::new(AtomicBool::new(false)),
        }
    }

    /// While the returned flag is set, every write fails.
    pub fn fail_switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.fail)
    }
}

impl OutputLine for RecordingLine {
    fn set(&mut self, high: bool) -> Result<(), BoxError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(Box::new(std::io::Error::other(format!(
                "injected fault on {} line",
                self.label
            ))));
        }
        self.log.record(self.label, LineOp::Set(high));
        Ok(())
    }
}

impl Drop for RecordingLine {
    fn drop(&mut self) {
        self.log.record(self.label, LineOp::Released);
    }
}

#[derive(Debug, Default)]
struct TimerState {
    armed: Option<(Duration, u64)>,
    arms: usize,
    disarms: usize,
    fail: bool,
}

/// Countdown timer that only records; tests deliver expiries by hand.
pub struct ManualTimer {
    state: Arc<Mutex<TimerState>>,
    release: Option<(&'static str, LineLog)>,
}

/// Test-side view of a `ManualTimer`.
#[derive(Clone)]
pub struct TimerTap {
    state: Arc<Mutex<TimerState>>,
}

impl ManualTimer {
    pub fn new() -> (Self, TimerTap) {
        let state = Arc::new(Mutex::new(TimerState::default()));
        (
            Self {
                state: Arc::clone(&state),
                release: None,
            },
            TimerTap { state },
        )
    }

    /// Like `new`, but logs a release event under `label` when dropped.
    pub fn logged(label: &'static str, log: LineLog) -> (Self, TimerTap) {
        let (mut t, p) = Self::new();
        t.release = Some((label, log));
        (t, p)
    }
}

impl CountdownTimer for ManualTimer {
    fn arm(&mut self, after: Duration, tag: u64) -> Result<(), BoxError> {
        let mut s = lock(&self.state);
        if s.fail {
            return Err(Box::new(std::io::Error::other("timer unavailable")));
        }
        s.armed = Some((after, tag));
        s.arms += 1;
        Ok(())
    }

    fn disarm(&mut self) {
        let mut s = lock(&self.state);
        s.armed = None;
        s.disarms += 1;
    }
}

impl Drop for ManualTimer {
    fn drop(&mut self) {
        if let Some((label, log)) = &self.release {
            log.record(label, LineOp::Released);
        }
    }
}

impl TimerTap {
    /// Pending `(after, tag)`; `None` once disarmed.
    pub fn armed(&self) -> Option<(Duration, u64)> {
        lock(&self.state).armed
    }

    /// Pending tag, consuming the arm as if the countdown had fired.
    pub fn take(&self) -> Option<u64> {
        lock(&self.state).armed.take().map(|(_, tag)| tag)
    }

    pub fn arm_count(&self) -> usize {
        lock(&self.state).arms
    }

    pub fn disarm_count(&self) -> usize {
        lock(&self.state).disarms
    }

    /// Make subsequent `arm` calls fail.
    pub fn set_failing(&self, fail: bool) {
        lock(&self.state).fail = fail;
    }
}

/// Hands out `RecordingLine`s named after their role.
pub struct RecordingLines {
    log: LineLog,
    fail_on: Option<LineRole>,
    switches: HashMap<LineRole, Arc<AtomicBool>>,
}

impl RecordingLines {
    pub fn new(log: LineLog) -> Self {
        Self {
            log,
            fail_on: None,
            switches: HashMap::new(),
        }
    }

    /// Refuse to hand out `role`.
    pub fn fail_on(mut self, role: LineRole) -> Self {
        self.fail_on = Some(role);
        self
    }

    /// Fault-injection flag of an acquired line.
    pub fn switch(&self, role: LineRole) -> Option<Arc<AtomicBool>> {
        self.switches.get(&role).cloned()
    }
}

impl LineFactory for RecordingLines {
    fn acquire(&mut self, role: LineRole) -> Result<Box<dyn OutputLine>, BoxError> {
        if self.fail_on == Some(role) {
            return Err(Box::new(std::io::Error::other(format!(
                "{} line unavailable",
                role.name()
            ))));
        }
        let line = RecordingLine::new(role.name(), self.log.clone());
        self.switches.insert(role, line.fail_switch());
        Ok(Box::new(line))
    }
}

/// Hands out `ManualTimer`s and keeps their taps.
pub struct ManualTimers {
    log: Option<LineLog>,
    fail_on: Option<TimerRole>,
    taps: HashMap<TimerRole, TimerTap>,
}

impl Default for ManualTimers {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualTimers {
    pub fn new() -> Self {
        Self {
            log: None,
            fail_on: None,
            taps: HashMap::new(),
        }
    }

    /// Log timer releases into `log` next to the line events.
    pub fn logged(log: LineLog) -> Self {
        Self {
            log: Some(log),
            ..Self::new()
        }
    }

    pub fn fail_on(mut self, role: TimerRole) -> Self {
        self.fail_on = Some(role);
        self
    }

    pub fn tap(&self, role: TimerRole) -> Option<TimerTap> {
        self.taps.get(&role).cloned()
    }
}

impl TimerFactory for ManualTimers {
    fn acquire(&mut self, role: TimerRole) -> Result<Box<dyn CountdownTimer>, BoxError> {
        if self.fail_on == Some(role) {
            return Err(Box::new(std::io::Error::other(format!(
                "{} timer unavailable",
                role.name()
            ))));
        }
        let (timer, tap) = match &self.log {
            Some(log) => ManualTimer::logged(role.name(), log.clone()),
            None => ManualTimer::new(),
        };
        self.taps.insert(role, tap);
        Ok(Box::new(timer))
    }
}
