//! Pulse scheduler: N servo signals on one countdown timer.
//!
//! The timer holds exactly one pending expiry, so the scheduler keeps a
//! min-ordered queue of upcoming edges and always arms the timer for the
//! nearest one (or the period boundary, whichever comes first).
//!
//! Per period:
//! - widths are sampled once from the `ChannelBank` at the boundary;
//! - every channel with a nonzero width rises at the boundary and falls at
//!   `boundary + width`;
//! - all edges due at an expiry are applied before the timer is re-armed, so
//!   coincident edges never expose an intermediate state.
//!
//! Widths written mid-period are picked up at the next boundary. A late expiry
//! beyond `max_lateness`, or an output that refuses a write, forces every
//! output low and starts a fresh period one period later instead of
//! propagating an error.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use turret_traits::{CountdownTimer, OutputLine};

use crate::channel::ChannelBank;
use crate::config::SchedulerCfg;
use crate::error::{BuildError, TurretError};
use crate::hw_error::map_hw_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EdgeKind {
    Rising,
    Falling,
}

/// One scheduled assertion or de-assertion of a channel output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Edge {
    pub deadline: Instant,
    pub kind: EdgeKind,
    pub channel: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerFault {
    MissedDeadline { late_by: Duration },
    Output { channel: usize, reason: String },
    Timer(String),
}

impl core::fmt::Display for SchedulerFault {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SchedulerFault::MissedDeadline { late_by } => {
                write!(f, "missed deadline by {}us", late_by.as_micros())
            }
            SchedulerFault::Output { channel, reason } => {
                write!(f, "output {channel} write failed: {reason}")
            }
            SchedulerFault::Timer(reason) => write!(f, "timer failed: {reason}"),
        }
    }
}

/// What one timer expiry did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// Expiry arrived while the scheduler was not running.
    Stopped,
    /// Edges applied and the timer re-armed for `next_in`.
    Applied {
        rising: usize,
        falling: usize,
        next_in: Duration,
    },
    /// A fault forced every output low; a fresh period has been armed.
    Recovered(SchedulerFault),
    /// The timer could not be re-armed; outputs are low and the scheduler stopped.
    Halted(SchedulerFault),
}

pub struct EdgeScheduler {
    bank: Arc<ChannelBank>,
    lines: Vec<Box<dyn OutputLine>>,
    timer: Box<dyn CountdownTimer>,
    cfg: SchedulerCfg,
    running: bool,
    pending: BinaryHeap<Reverse<Edge>>,
    asserted: Vec<bool>,
    period_start: Instant,
    next_deadline: Instant,
    cycle: u64,
    resets: u64,
}

impl core::fmt::Debug for EdgeScheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EdgeScheduler")
            .field("period_us", &self.cfg.period.as_micros())
            .field("running", &self.running)
            .field("cycle", &self.cycle)
            .field("pending", &self.pending.len())
            .field("asserted", &self.asserted)
            .finish()
    }
}

impl EdgeScheduler {
    /// `lines[i]` drives channel `i` of `bank`.
    pub fn new(
        bank: Arc<ChannelBank>,
        lines: Vec<Box<dyn OutputLine>>,
        timer: Box<dyn CountdownTimer>,
        cfg: SchedulerCfg,
    ) -> Result<Self, BuildError> {
        let channels = bank.len();
        if lines.len() != channels {
            return Err(BuildError::LineCountMismatch {
                lines: lines.len(),
                channels,
            });
        }
        if cfg.period.is_zero() {
            return Err(BuildError::InvalidConfig("period must be > 0"));
        }
        let now = Instant::now();
        Ok(Self {
            bank,
            lines,
            timer,
            cfg,
            running: false,
            pending: BinaryHeap::with_capacity(2 * channels),
            asserted: vec![false; channels],
            period_start: now,
            next_deadline: now,
            cycle: 0,
            resets: 0,
        })
    }

    /// Begin a period at `now` and arm the timer immediately; the first expiry
    /// raises every channel with a nonzero width.
    pub fn start(&mut self, now: Instant) -> Result<(), TurretError> {
        self.begin_period(now);
        self.next_deadline = now;
        self.timer
            .arm(Duration::ZERO, self.cycle)
            .map_err(|e| map_hw_error(&*e))?;
        self.running = true;
        tracing::debug!(
            channels = self.lines.len(),
            period_us = self.cfg.period.as_micros() as u64,
            "pulse scheduler started"
        );
        Ok(())
    }

    /// Handle one firing of the countdown timer.
    pub fn on_timer_expiry(&mut self, now: Instant) -> Tick {
        if !self.running {
            tracing::trace!("expiry while stopped");
            return Tick::Stopped;
        }

        // Spurious early wake: keep the schedule and re-arm the remainder.
        if now < self.next_deadline {
            return self.rearm(now, 0, 0);
        }

        let late_by = now.saturating_duration_since(self.next_deadline);
        if late_by > self.cfg.max_lateness {
            return self.safe_reset(now, SchedulerFault::MissedDeadline { late_by });
        }

        let (mut rising, mut falling) = match self.apply_due(now) {
            Ok(counts) => counts,
            Err(fault) => return self.safe_reset(now, fault),
        };

        let boundary = self.period_end();
        if now >= boundary {
            self.begin_period(boundary);
            match self.apply_due(now) {
                Ok((r, f)) => {
                    rising += r;
                    falling += f;
                }
                Err(fault) => return self.safe_reset(now, fault),
            }
        }

        self.rearm(now, rising, falling)
    }

    /// Stop reacting and cancel the pending expiry; outputs are left as they are.
    pub fn disarm(&mut self) {
        self.timer.disarm();
        self.running = false;
        self.pending.clear();
    }

    /// Disarm the timer and drive every output low. Keeps going past a
    /// failing line so the others still reach the safe level.
    pub fn shutdown(&mut self) -> Result<(), TurretError> {
        self.disarm();
        let res = self.force_low();
        tracing::debug!(cycles = self.cycle, resets = self.resets, "pulse scheduler stopped");
        res
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Number of periods begun so far.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Number of safe-state resets since construction.
    pub fn resets(&self) -> u64 {
        self.resets
    }

    pub fn period(&self) -> Duration {
        self.cfg.period
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.running.then_some(self.next_deadline)
    }

    /// Outstanding edges in deadline order.
    pub fn pending_edges(&self) -> Vec<Edge> {
        let mut v: Vec<Edge> = self.pending.iter().map(|Reverse(e)| *e).collect();
        v.sort_unstable();
        v
    }

    pub fn asserted(&self) -> &[bool] {
        &self.asserted
    }

    #[inline]
    fn period_end(&self) -> Instant {
        self.period_start + self.cfg.period
    }

    fn begin_period(&mut self, start: Instant) {
        self.period_start = start;
        self.cycle = self.cycle.wrapping_add(1);
        self.pending.clear();
        for (channel, w_us) in self.bank.sample_widths().into_iter().enumerate() {
            if w_us == 0 {
                continue;
            }
            let width = Duration::from_micros(u64::from(w_us)).min(self.cfg.period);
            self.pending.push(Reverse(Edge {
                deadline: start,
                kind: EdgeKind::Rising,
                channel,
            }));
            self.pending.push(Reverse(Edge {
                deadline: start + width,
                kind: EdgeKind::Falling,
                channel,
            }));
        }
        tracing::trace!(cycle = self.cycle, edges = self.pending.len(), "period begin");
    }

    /// Pop and apply every edge with `deadline <= now`, in deadline order.
    fn apply_due(&mut self, now: Instant) -> Result<(usize, usize), SchedulerFault> {
        let mut rising = 0;
        let mut falling = 0;
        let mut result = Ok(());
        while let Some(Reverse(edge)) = self.pending.peek().copied() {
            if edge.deadline > now {
                break;
            }
            self.pending.pop();
            let high = edge.kind == EdgeKind::Rising;
            if let Err(e) = self.lines[edge.channel].set(high) {
                result = Err(SchedulerFault::Output {
                    channel: edge.channel,
                    reason: e.to_string(),
                });
                break;
            }
            self.asserted[edge.channel] = high;
            if high {
                rising += 1;
            } else {
                falling += 1;
            }
        }
        self.bank.publish_asserted(&self.asserted);
        result.map(|()| (rising, falling))
    }

    fn rearm(&mut self, now: Instant, rising: usize, falling: usize) -> Tick {
        let boundary = self.period_end();
        let next = match self.pending.peek() {
            Some(Reverse(edge)) if edge.deadline < boundary => edge.deadline,
            _ => boundary,
        };
        self.next_deadline = next;
        let next_in = next.saturating_duration_since(now);
        match self.timer.arm(next_in, self.cycle) {
            Ok(()) => Tick::Applied {
                rising,
                falling,
                next_in,
            },
            Err(e) => self.halt(SchedulerFault::Timer(e.to_string())),
        }
    }

    fn safe_reset(&mut self, now: Instant, fault: SchedulerFault) -> Tick {
        self.resets += 1;
        tracing::warn!(fault = %fault, resets = self.resets, "pulse scheduler fault, resetting outputs");
        if let Err(e) = self.force_low() {
            tracing::error!(error = %e, "could not drive every output low during reset");
        }
        // Outputs stay low for one full period before the fresh one begins.
        let restart = now + self.cfg.period;
        self.begin_period(restart);
        self.next_deadline = restart;
        match self.timer.arm(self.cfg.period, self.cycle) {
            Ok(()) => Tick::Recovered(fault),
            Err(e) => self.halt(SchedulerFault::Timer(e.to_string())),
        }
    }

    fn halt(&mut self, fault: SchedulerFault) -> Tick {
        tracing::error!(fault = %fault, "pulse scheduler halted");
        self.running = false;
        self.pending.clear();
        let _ = self.force_low();
        Tick::Halted(fault)
    }

    fn force_low(&mut self) -> Result<(), TurretError> {
        let mut first_err = None;
        for (i, line) in self.lines.iter_mut().enumerate() {
            match line.set(false) {
                Ok(()) => self.asserted[i] = false,
                Err(e) => {
                    tracing::error!(channel = i, error = %e, "output refused safe level");
                    first_err.get_or_insert_with(|| map_hw_error(&*e));
                }
            }
        }
        self.bank.publish_asserted(&self.asserted);
        first_err.map_or(Ok(()), Err)
    }
}

impl Drop for EdgeScheduler {
    fn drop(&mut self) {
        if self.running {
            let _ = self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelId, PulseChannel, PulseLimits};
    use crate::mocks::{LineLog, ManualTimer, RecordingLine};

    fn one_channel(width: u32) -> (EdgeScheduler, crate::mocks::TimerTap, LineLog) {
        let bank = Arc::new(ChannelBank::new(vec![PulseChannel::new(
            ChannelId::Pan,
            PulseLimits::default(),
            width,
        )]));
        let log = LineLog::new();
        let (timer, tap) = ManualTimer::new();
        let s = EdgeScheduler::new(
            bank,
            vec![Box::new(RecordingLine::new("pan", log.clone()))],
            Box::new(timer),
            SchedulerCfg::default(),
        )
        .expect("scheduler");
        (s, tap, log)
    }

    #[test]
    fn start_arms_immediately_and_first_expiry_raises() {
        let (mut s, tap, log) = one_channel(1_500);
        let t0 = Instant::now();
        s.start(t0).expect("start");
        assert_eq!(tap.armed().map(|a| a.0), Some(Duration::ZERO));
        let tick = s.on_timer_expiry(t0);
        assert_eq!(
            tick,
            Tick::Applied {
                rising: 1,
                falling: 0,
                next_in: Duration::from_micros(1_500)
            }
        );
        assert_eq!(log.levels("pan"), vec![true]);
    }

    #[test]
    fn falling_edge_then_boundary() {
        let (mut s, tap, _log) = one_channel(1_500);
        let t0 = Instant::now();
        s.start(t0).expect("start");
        s.on_timer_expiry(t0);
        let tick = s.on_timer_expiry(t0 + Duration::from_micros(1_500));
        assert_eq!(
            tick,
            Tick::Applied {
                rising: 0,
                falling: 1,
                next_in: Duration::from_micros(18_500)
            }
        );
        assert_eq!(tap.armed().map(|a| a.0), Some(Duration::from_micros(18_500)));
        assert_eq!(s.cycle(), 1);
        s.on_timer_expiry(t0 + Duration::from_millis(20));
        assert_eq!(s.cycle(), 2);
        assert_eq!(s.asserted(), &[true]);
    }

    #[test]
    fn expiry_while_stopped_is_ignored() {
        let (mut s, _tap, log) = one_channel(1_500);
        assert_eq!(s.on_timer_expiry(Instant::now()), Tick::Stopped);
        assert!(log.events().is_empty());
    }

    #[test]
    fn early_wake_rearms_remainder_without_edges() {
        let (mut s, tap, _log) = one_channel(1_500);
        let t0 = Instant::now();
        s.start(t0).expect("start");
        s.on_timer_expiry(t0);
        let tick = s.on_timer_expiry(t0 + Duration::from_micros(500));
        assert_eq!(
            tick,
            Tick::Applied {
                rising: 0,
                falling: 0,
                next_in: Duration::from_micros(1_000)
            }
        );
        assert_eq!(tap.armed().map(|a| a.0), Some(Duration::from_micros(1_000)));
    }

    #[test]
    fn missed_deadline_forces_outputs_low_and_restarts() {
        let (mut s, tap, log) = one_channel(1_500);
        let t0 = Instant::now();
        s.start(t0).expect("start");
        s.on_timer_expiry(t0);
        let late = t0 + Duration::from_micros(1_500) + Duration::from_millis(5);
        match s.on_timer_expiry(late) {
            Tick::Recovered(SchedulerFault::MissedDeadline { late_by }) => {
                assert_eq!(late_by, Duration::from_millis(5));
            }
            other => panic!("expected recovery, got {other:?}"),
        }
        assert_eq!(s.resets(), 1);
        assert_eq!(log.levels("pan"), vec![true, false]);
        assert_eq!(tap.armed().map(|a| a.0), Some(Duration::from_millis(20)));
        assert!(s.is_running());
        // The fresh period rises a full period after the reset.
        let tick = s.on_timer_expiry(late + Duration::from_millis(20));
        assert!(matches!(tick, Tick::Applied { rising: 1, .. }), "{tick:?}");
    }

    #[test]
    fn failing_output_backs_off_a_period_per_reset() {
        let bank = Arc::new(ChannelBank::new(vec![PulseChannel::new(
            ChannelId::Pan,
            PulseLimits::default(),
            1_500,
        )]));
        let log = LineLog::new();
        let line = RecordingLine::new("pan", log.clone());
        let fail = line.fail_switch();
        let (timer, tap) = ManualTimer::new();
        let mut s = EdgeScheduler::new(bank, vec![Box::new(line)], Box::new(timer), SchedulerCfg::default())
            .expect("scheduler");
        let t0 = Instant::now();
        s.start(t0).expect("start");
        fail.store(true, std::sync::atomic::Ordering::Relaxed);

        let mut now = t0;
        for n in 1..=3 {
            let tick = s.on_timer_expiry(now);
            assert!(matches!(tick, Tick::Recovered(SchedulerFault::Output { channel: 0, .. })), "{tick:?}");
            assert_eq!(s.resets(), n);
            let (after, _) = tap.armed().expect("re-armed");
            assert_eq!(after, Duration::from_millis(20));
            // An expiry before the delayed restart is only an early wake.
            let early = s.on_timer_expiry(now);
            assert!(matches!(early, Tick::Applied { rising: 0, falling: 0, .. }), "{early:?}");
            assert_eq!(s.resets(), n);
            now += after;
        }
    }

    #[test]
    fn shutdown_disarms_and_drives_low() {
        let (mut s, tap, log) = one_channel(1_500);
        let t0 = Instant::now();
        s.start(t0).expect("start");
        s.on_timer_expiry(t0);
        s.shutdown().expect("shutdown");
        assert!(tap.armed().is_none());
        assert_eq!(log.levels("pan"), vec![true, false]);
        assert_eq!(s.on_timer_expiry(t0 + Duration::from_millis(1)), Tick::Stopped);
    }

    #[test]
    fn zero_width_channel_never_rises() {
        let bank = Arc::new(ChannelBank::new(vec![PulseChannel::new(
            ChannelId::Pan,
            PulseLimits {
                min_us: 0,
                max_us: 2_000,
                step_us: 100,
            },
            0,
        )]));
        let log = LineLog::new();
        let (timer, _tap) = ManualTimer::new();
        let mut s = EdgeScheduler::new(
            bank,
            vec![Box::new(RecordingLine::new("pan", log.clone()))],
            Box::new(timer),
            SchedulerCfg::default(),
        )
        .expect("scheduler");
        let t0 = Instant::now();
        s.start(t0).expect("start");
        assert_eq!(
            s.on_timer_expiry(t0),
            Tick::Applied {
                rising: 0,
                falling: 0,
                next_in: Duration::from_millis(20)
            }
        );
        assert!(log.levels("pan").is_empty());
    }

    #[test]
    fn rejects_mismatched_line_count() {
        let bank = Arc::new(ChannelBank::new(vec![PulseChannel::new(
            ChannelId::Pan,
            PulseLimits::default(),
            1_500,
        )]));
        let (timer, _tap) = ManualTimer::new();
        let err = EdgeScheduler::new(bank, Vec::new(), Box::new(timer), SchedulerCfg::default())
            .expect_err("mismatch");
        assert!(matches!(
            err,
            BuildError::LineCountMismatch {
                lines: 0,
                channels: 1
            }
        ));
    }
}
