//! Runtime configuration for the rig.
//!
//! These are the structs the core consumes. They are separate from the
//! TOML-deserialized schema in `turret_config`; see `conversions`.

use std::time::Duration;

use crate::channel::PulseLimits;
use crate::error::BuildError;

/// Shared timing of the pulse scheduler.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerCfg {
    /// One full PWM cycle; every channel rises at its start.
    pub period: Duration,
    /// An expiry later than this past its deadline is a missed deadline.
    pub max_lateness: Duration,
}

impl Default for SchedulerCfg {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(20),
            max_lateness: Duration::from_millis(2),
        }
    }
}

/// One servo channel: bounds, step granularity and power-up width.
#[derive(Debug, Clone, Copy)]
pub struct ChannelCfg {
    pub limits: PulseLimits,
    pub initial_us: u32,
}

impl Default for ChannelCfg {
    fn default() -> Self {
        let limits = PulseLimits::default();
        Self {
            limits,
            initial_us: limits.center(),
        }
    }
}

/// Watchdog timeouts of the prime/fire interlock.
#[derive(Debug, Clone, Copy)]
pub struct ActuationCfg {
    /// Fallback for a feedback sensor that never reports the mechanism primed.
    pub prime_timeout: Duration,
    /// How long the solenoid stays energized per shot.
    pub fire_timeout: Duration,
}

impl Default for ActuationCfg {
    fn default() -> Self {
        Self {
            prime_timeout: Duration::from_secs(10),
            fire_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TurretCfg {
    pub scheduler: SchedulerCfg,
    pub pan: ChannelCfg,
    pub tilt: ChannelCfg,
    pub actuation: ActuationCfg,
}

impl TurretCfg {
    /// Re-check the invariants the scheduler relies on. The TOML loader checks
    /// the same things with friendlier messages; this guards hand-built configs.
    pub fn check(&self) -> Result<(), BuildError> {
        if self.scheduler.period.is_zero() {
            return Err(BuildError::InvalidConfig("period must be > 0"));
        }
        if self.scheduler.max_lateness >= self.scheduler.period {
            return Err(BuildError::InvalidConfig("max lateness must be < period"));
        }
        let period_us = self.scheduler.period.as_micros();
        for ch in [&self.pan, &self.tilt] {
            let l = ch.limits;
            if l.min_us > l.max_us {
                return Err(BuildError::InvalidConfig("min pulse must be <= max pulse"));
            }
            if u128::from(l.max_us) >= period_us {
                return Err(BuildError::InvalidConfig("max pulse must be < period"));
            }
            if l.step_us == 0 {
                return Err(BuildError::InvalidConfig("step must be > 0"));
            }
            if !l.contains(ch.initial_us) {
                return Err(BuildError::InvalidConfig("initial pulse out of bounds"));
            }
        }
        if self.actuation.prime_timeout.is_zero() || self.actuation.fire_timeout.is_zero() {
            return Err(BuildError::InvalidConfig("actuation timeouts must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_check() {
        TurretCfg::default().check().expect("defaults valid");
        assert_eq!(TurretCfg::default().pan.initial_us, 1_500);
    }

    #[test]
    fn rejects_pulse_longer_than_period() {
        let mut cfg = TurretCfg::default();
        cfg.scheduler.period = Duration::from_micros(1_800);
        cfg.scheduler.max_lateness = Duration::from_micros(100);
        assert!(matches!(cfg.check(), Err(BuildError::InvalidConfig(_))));
    }
}
