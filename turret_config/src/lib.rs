#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the turret rig.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Everything here is read once at initialization and fixed thereafter.
use serde::Deserialize;

/// Upper bound accepted for either actuation timeout.
const MAX_TIMEOUT_MS: u64 = 60 * 60 * 1000;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// One full PWM cycle shared by every channel (µs).
    pub period_us: u32,
    /// How late a timer expiry may arrive before the scheduler treats it as a
    /// missed deadline and resets to a safe state (µs).
    pub max_lateness_us: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            period_us: 20_000,
            max_lateness_us: 2_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct ChannelCfg {
    pub min_pulse_us: u32,
    pub max_pulse_us: u32,
    /// Width change per unit of command magnitude.
    pub step_us: u32,
    /// Width at power-up; defaults to the center of [min, max].
    #[serde(default)]
    pub initial_pulse_us: Option<u32>,
}

impl Default for ChannelCfg {
    fn default() -> Self {
        Self {
            min_pulse_us: 1_000,
            max_pulse_us: 2_000,
            step_us: 100,
            initial_pulse_us: None,
        }
    }
}

impl ChannelCfg {
    pub fn initial_or_center(&self) -> u32 {
        self.initial_pulse_us
            .unwrap_or(self.min_pulse_us + (self.max_pulse_us.saturating_sub(self.min_pulse_us)) / 2)
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Channels {
    pub pan: ChannelCfg,
    pub tilt: ChannelCfg,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Actuation {
    /// Stepper runs at most this long waiting for the primed feedback.
    pub prime_timeout_ms: u64,
    /// Solenoid stays energized this long per shot.
    pub fire_timeout_ms: u64,
}

impl Default for Actuation {
    fn default() -> Self {
        Self {
            prime_timeout_ms: 10_000,
            fire_timeout_ms: 2_000,
        }
    }
}

/// BCM pin numbers, used only by the GPIO backend.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct Pins {
    pub pan: u8,
    pub tilt: u8,
    pub stepper: u8,
    pub solenoid: u8,
    pub feedback: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub timing: Timing,
    #[serde(default)]
    pub channels: Channels,
    #[serde(default)]
    pub actuation: Actuation,
    /// Required only when running against real GPIO.
    #[serde(default)]
    pub pins: Option<Pins>,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

pub fn load_file(path: &std::path::Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {:?}: {}", path, e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {:?}: {}", path, e))?;
    cfg.validate()?;
    Ok(cfg)
}

fn validate_channel(name: &str, c: &ChannelCfg, period_us: u32) -> eyre::Result<()> {
    if c.min_pulse_us == 0 {
        eyre::bail!("channels.{name}.min_pulse_us must be > 0");
    }
    if c.min_pulse_us > c.max_pulse_us {
        eyre::bail!("channels.{name}.min_pulse_us must be <= max_pulse_us");
    }
    if c.max_pulse_us >= period_us {
        eyre::bail!("channels.{name}.max_pulse_us must be < timing.period_us");
    }
    if c.step_us == 0 {
        eyre::bail!("channels.{name}.step_us must be > 0");
    }
    if let Some(w) = c.initial_pulse_us
        && !(c.min_pulse_us..=c.max_pulse_us).contains(&w)
    {
        eyre::bail!("channels.{name}.initial_pulse_us must be within [min_pulse_us, max_pulse_us]");
    }
    Ok(())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Timing
        if self.timing.period_us == 0 {
            eyre::bail!("timing.period_us must be > 0");
        }
        if self.timing.max_lateness_us >= self.timing.period_us {
            eyre::bail!("timing.max_lateness_us must be < timing.period_us");
        }

        // Channels
        validate_channel("pan", &self.channels.pan, self.timing.period_us)?;
        validate_channel("tilt", &self.channels.tilt, self.timing.period_us)?;

        // Actuation
        if self.actuation.prime_timeout_ms == 0 {
            eyre::bail!("actuation.prime_timeout_ms must be >= 1");
        }
        if self.actuation.prime_timeout_ms > MAX_TIMEOUT_MS {
            eyre::bail!("actuation.prime_timeout_ms is unreasonably large (>1h)");
        }
        if self.actuation.fire_timeout_ms == 0 {
            eyre::bail!("actuation.fire_timeout_ms must be >= 1");
        }
        if self.actuation.fire_timeout_ms > MAX_TIMEOUT_MS {
            eyre::bail!("actuation.fire_timeout_ms is unreasonably large (>1h)");
        }

        // Pins: the four outputs must be distinct
        if let Some(p) = &self.pins {
            let outs = [p.pan, p.tilt, p.stepper, p.solenoid];
            for (i, a) in outs.iter().enumerate() {
                if outs[i + 1..].contains(a) {
                    eyre::bail!("pins: output pin {a} is assigned more than once");
                }
            }
            if let Some(fb) = p.feedback
                && outs.contains(&fb)
            {
                eyre::bail!("pins.feedback must not reuse an output pin");
            }
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}
