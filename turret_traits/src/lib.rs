pub mod clock;

pub use clock::{Clock, MonotonicClock};

use std::time::Duration;

/// One physical output: a servo signal, the stepper enable or the solenoid driver.
pub trait OutputLine: Send {
    fn set(&mut self, high: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Single-deadline timer. Arming replaces any pending deadline and restarts
/// the countdown from zero; `tag` is handed back to the expiry handler.
pub trait CountdownTimer: Send {
    fn arm(
        &mut self,
        after: Duration,
        tag: u64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn disarm(&mut self);
}

/// Which physical line a handle drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineRole {
    Pan,
    Tilt,
    Stepper,
    Solenoid,
}

impl LineRole {
    pub fn name(self) -> &'static str {
        match self {
            LineRole::Pan => "pan",
            LineRole::Tilt => "tilt",
            LineRole::Stepper => "stepper",
            LineRole::Solenoid => "solenoid",
        }
    }
}

/// Hands out output lines at initialization.
pub trait LineFactory {
    fn acquire(
        &mut self,
        role: LineRole,
    ) -> Result<Box<dyn OutputLine>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Device-side consumer of 3-byte textual commands.
pub trait CommandSink {
    fn submit(&mut self, command: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Which countdown a timer handle serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerRole {
    Scheduler,
    Watchdog,
}

impl TimerRole {
    pub fn name(self) -> &'static str {
        match self {
            TimerRole::Scheduler => "scheduler",
            TimerRole::Watchdog => "watchdog",
        }
    }
}

/// Hands out countdown timers at initialization.
pub trait TimerFactory {
    fn acquire(
        &mut self,
        role: TimerRole,
    ) -> Result<Box<dyn CountdownTimer>, Box<dyn std::error::Error + Send + Sync>>;
}
