//! `From` implementations bridging `turret_config` types to `turret_core` types.

use std::time::Duration;

use crate::channel::PulseLimits;
use crate::config::{ActuationCfg, ChannelCfg, SchedulerCfg, TurretCfg};

// ── SchedulerCfg ─────────────────────────────────────────────────────────────

impl From<&turret_config::Timing> for SchedulerCfg {
    fn from(c: &turret_config::Timing) -> Self {
        Self {
            period: Duration::from_micros(u64::from(c.period_us)),
            max_lateness: Duration::from_micros(u64::from(c.max_lateness_us)),
        }
    }
}

// ── ChannelCfg ───────────────────────────────────────────────────────────────

impl From<&turret_config::ChannelCfg> for ChannelCfg {
    fn from(c: &turret_config::ChannelCfg) -> Self {
        Self {
            limits: PulseLimits {
                min_us: c.min_pulse_us,
                max_us: c.max_pulse_us,
                step_us: c.step_us,
            },
            initial_us: c.initial_or_center(),
        }
    }
}

// ── ActuationCfg ─────────────────────────────────────────────────────────────

impl From<&turret_config::Actuation> for ActuationCfg {
    fn from(c: &turret_config::Actuation) -> Self {
        Self {
            prime_timeout: Duration::from_millis(c.prime_timeout_ms),
            fire_timeout: Duration::from_millis(c.fire_timeout_ms),
        }
    }
}

// ── TurretCfg ────────────────────────────────────────────────────────────────

impl From<&turret_config::Config> for TurretCfg {
    fn from(c: &turret_config::Config) -> Self {
        Self {
            scheduler: (&c.timing).into(),
            pan: (&c.channels.pan).into(),
            tilt: (&c.channels.tilt).into(),
            actuation: (&c.actuation).into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_toml_document() {
        let cfg = turret_config::load_toml(
            r#"
[timing]
period_us = 25000
max_lateness_us = 1000

[channels.tilt]
min_pulse_us = 900
max_pulse_us = 2100
step_us = 20

[actuation]
fire_timeout_ms = 750
"#,
        )
        .expect("parse");
        let core: TurretCfg = (&cfg).into();
        assert_eq!(core.scheduler.period, Duration::from_micros(25_000));
        assert_eq!(core.tilt.limits.step_us, 20);
        assert_eq!(core.tilt.initial_us, 1_500);
        assert_eq!(core.pan.limits.max_us, 2_000);
        assert_eq!(core.actuation.fire_timeout, Duration::from_millis(750));
        assert_eq!(core.actuation.prime_timeout, Duration::from_secs(10));
        core.check().expect("valid");
    }
}
