//! Point-in-time diagnostics of the whole rig.

use crate::actuation::ActuationSnapshot;
use crate::channel::PulseChannel;

#[derive(Debug, Clone)]
pub struct TurretStatus {
    pub channels: Vec<PulseChannel>,
    pub actuation: ActuationSnapshot,
    pub scheduler_running: bool,
    /// Periods begun since start.
    pub cycles: u64,
    /// Safe-state resets forced by scheduler faults.
    pub resets: u64,
}

impl core::fmt::Display for TurretStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "state={}", self.actuation.state)?;
        for ch in &self.channels {
            write!(f, " {}={}us", ch.id, ch.pulse_width_us())?;
        }
        write!(
            f,
            " stepper={} solenoid={} scheduler={} cycles={} resets={}",
            u8::from(self.actuation.stepper_asserted),
            u8::from(self.actuation.solenoid_asserted),
            if self.scheduler_running { "running" } else { "stopped" },
            self.cycles,
            self.resets
        )
    }
}
