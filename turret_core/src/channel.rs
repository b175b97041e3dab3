//! Servo channels and the shared width table.
//!
//! `ChannelBank` is the single lock around every channel's pulse width and
//! assertion flag. The command path writes widths; the scheduler samples them
//! once per period and publishes which outputs are high.

use std::sync::{Mutex, MutexGuard, PoisonError};

use turret_traits::LineRole;

use crate::error::{CommandFault, TurretError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelId {
    Pan,
    Tilt,
}

impl ChannelId {
    pub const ALL: [ChannelId; 2] = [ChannelId::Pan, ChannelId::Tilt];

    pub fn role(self) -> LineRole {
        match self {
            ChannelId::Pan => LineRole::Pan,
            ChannelId::Tilt => LineRole::Tilt,
        }
    }

    pub fn name(self) -> &'static str {
        self.role().name()
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pan" => Some(ChannelId::Pan),
            "tilt" => Some(ChannelId::Tilt),
            _ => None,
        }
    }
}

impl core::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-channel pulse bounds and command granularity, all in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseLimits {
    pub min_us: u32,
    pub max_us: u32,
    pub step_us: u32,
}

impl Default for PulseLimits {
    fn default() -> Self {
        Self {
            min_us: 1_000,
            max_us: 2_000,
            step_us: 100,
        }
    }
}

impl PulseLimits {
    #[inline]
    pub fn contains(&self, w_us: u32) -> bool {
        (self.min_us..=self.max_us).contains(&w_us)
    }

    #[inline]
    pub fn center(&self) -> u32 {
        self.min_us + self.max_us.saturating_sub(self.min_us) / 2
    }

    /// Clamp a signed width to `[min_us, max_us]`. Inverted bounds never
    /// panic: the upper bound wins.
    #[inline]
    pub fn clamp(&self, w_us: i64) -> u32 {
        let c = w_us
            .max(i64::from(self.min_us))
            .min(i64::from(self.max_us));
        u32::try_from(c).unwrap_or(self.max_us)
    }
}

/// Discrete positions offered on top of continuous adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Low,
    Mid,
    High,
}

impl Preset {
    pub fn width_us(self, limits: &PulseLimits) -> u32 {
        match self {
            Preset::Low => limits.min_us,
            Preset::Mid => limits.center(),
            Preset::High => limits.max_us,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" | "min" => Some(Preset::Low),
            "mid" | "center" => Some(Preset::Mid),
            "high" | "max" => Some(Preset::High),
            _ => None,
        }
    }
}

/// One controlled servo output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulseChannel {
    pub id: ChannelId,
    pub limits: PulseLimits,
    pulse_width_us: u32,
    asserted: bool,
}

impl PulseChannel {
    /// New channel; the initial width is clamped into the limits.
    pub fn new(id: ChannelId, limits: PulseLimits, initial_us: u32) -> Self {
        Self {
            id,
            limits,
            pulse_width_us: limits.clamp(i64::from(initial_us)),
            asserted: false,
        }
    }

    pub fn pulse_width_us(&self) -> u32 {
        self.pulse_width_us
    }

    pub fn asserted(&self) -> bool {
        self.asserted
    }
}

/// Result of one width change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adjustment {
    pub channel: ChannelId,
    pub from_us: u32,
    pub to_us: u32,
    /// The requested width fell outside the limits and was clamped.
    pub saturated: bool,
}

impl Adjustment {
    /// True when the command landed on a bound the channel already sat on.
    pub fn is_noop(&self) -> bool {
        self.from_us == self.to_us
    }
}

#[derive(Debug)]
pub struct ChannelBank {
    channels: Mutex<Vec<PulseChannel>>,
}

impl ChannelBank {
    pub fn new(channels: Vec<PulseChannel>) -> Self {
        Self {
            channels: Mutex::new(channels),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PulseChannel>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn index_of(&self, id: ChannelId) -> Option<usize> {
        self.lock().iter().position(|c| c.id == id)
    }

    pub fn limits(&self, id: ChannelId) -> Option<PulseLimits> {
        self.lock().iter().find(|c| c.id == id).map(|c| c.limits)
    }

    pub fn width_us(&self, id: ChannelId) -> Option<u32> {
        self.lock()
            .iter()
            .find(|c| c.id == id)
            .map(PulseChannel::pulse_width_us)
    }

    /// Set an absolute width, clamped into the channel limits.
    pub fn set_width(&self, id: ChannelId, w_us: u32) -> Option<Adjustment> {
        self.update(id, |_| Ok(i64::from(w_us))).ok().flatten()
    }

    /// Move a channel by `delta_us` (signed), clamping silently. The read,
    /// the arithmetic and the write happen under one lock acquisition.
    pub fn adjust(&self, id: ChannelId, delta_us: i64) -> Result<Adjustment, TurretError> {
        self.update(id, |cur| {
            i64::from(cur)
                .checked_add(delta_us)
                .ok_or(TurretError::InvalidCommand(CommandFault::Overflow))
        })?
        .ok_or_else(|| TurretError::ResourceUnavailable(format!("{id} channel not configured")))
    }

    fn update(
        &self,
        id: ChannelId,
        f: impl FnOnce(u32) -> Result<i64, TurretError>,
    ) -> Result<Option<Adjustment>, TurretError> {
        let mut chans = self.lock();
        let Some(ch) = chans.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        let from_us = ch.pulse_width_us;
        let wanted = f(from_us)?;
        let to_us = ch.limits.clamp(wanted);
        ch.pulse_width_us = to_us;
        Ok(Some(Adjustment {
            channel: id,
            from_us,
            to_us,
            saturated: i64::from(to_us) != wanted,
        }))
    }

    /// Widths in channel order, read once at a period boundary.
    pub fn sample_widths(&self) -> Vec<u32> {
        self.lock().iter().map(PulseChannel::pulse_width_us).collect()
    }

    /// Publish output levels for diagnostics; only the scheduler calls this.
    pub(crate) fn publish_asserted(&self, asserted: &[bool]) {
        for (ch, a) in self.lock().iter_mut().zip(asserted) {
            ch.asserted = *a;
        }
    }

    pub fn snapshot(&self) -> Vec<PulseChannel> {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank() -> ChannelBank {
        ChannelBank::new(vec![
            PulseChannel::new(ChannelId::Pan, PulseLimits::default(), 1_500),
            PulseChannel::new(
                ChannelId::Tilt,
                PulseLimits {
                    min_us: 1_200,
                    max_us: 1_800,
                    step_us: 50,
                },
                1_500,
            ),
        ])
    }

    #[test]
    fn adjust_clamps_and_flags_saturation() {
        let b = bank();
        let a = b.adjust(ChannelId::Tilt, 500).expect("adjust");
        assert_eq!((a.from_us, a.to_us, a.saturated), (1_500, 1_800, true));
        let again = b.adjust(ChannelId::Tilt, 50).expect("adjust");
        assert!(again.is_noop() && again.saturated);
    }

    #[test]
    fn set_width_round_trips_inside_limits() {
        let b = bank();
        for w in [1_000, 1_234, 2_000] {
            b.set_width(ChannelId::Pan, w);
            assert_eq!(b.width_us(ChannelId::Pan), Some(w));
        }
    }

    #[test]
    fn presets_map_to_bounds_and_center() {
        let l = PulseLimits {
            min_us: 1_200,
            max_us: 1_800,
            step_us: 50,
        };
        assert_eq!(Preset::Low.width_us(&l), 1_200);
        assert_eq!(Preset::Mid.width_us(&l), 1_500);
        assert_eq!(Preset::High.width_us(&l), 1_800);
    }

    #[test]
    fn inverted_limits_clamp_without_panicking() {
        let l = PulseLimits {
            min_us: 2_000,
            max_us: 1_000,
            step_us: 100,
        };
        assert_eq!(l.clamp(1_500), 1_000);
        assert_eq!(l.clamp(-5), 1_000);
        assert_eq!(l.clamp(i64::MAX), 1_000);
        assert_eq!(l.center(), 2_000);
    }

    #[test]
    fn initial_width_is_clamped() {
        let c = PulseChannel::new(ChannelId::Pan, PulseLimits::default(), 9_000);
        assert_eq!(c.pulse_width_us(), 2_000);
    }
}
