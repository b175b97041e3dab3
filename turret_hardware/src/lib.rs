pub mod error;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use turret_traits::{LineFactory, LineRole, OutputLine};

use crate::error::HwError;

#[derive(Debug, Default)]
struct SimState {
    level: AtomicBool,
    writes: AtomicU64,
    fail: AtomicBool,
    released: AtomicBool,
}

/// Observer of one simulated line, usable after the line was handed out.
#[derive(Debug, Clone)]
pub struct LineTap {
    state: Arc<SimState>,
}

impl LineTap {
    pub fn is_high(&self) -> bool {
        self.state.level.load(Ordering::Acquire)
    }

    /// Successful writes so far.
    pub fn writes(&self) -> u64 {
        self.state.writes.load(Ordering::Relaxed)
    }

    pub fn is_released(&self) -> bool {
        self.state.released.load(Ordering::Acquire)
    }

    /// Make every following write fail until cleared.
    pub fn set_failing(&self, fail: bool) {
        self.state.fail.store(fail, Ordering::Relaxed);
    }
}

/// Simulated output line
pub struct SimLine {
    role: LineRole,
    state: Arc<SimState>,
}

impl OutputLine for SimLine {
    fn set(&mut self, high: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.state.fail.load(Ordering::Relaxed) {
            return Err(Box::new(HwError::Injected(self.role.name())));
        }
        self.state.level.store(high, Ordering::Release);
        self.state.writes.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(line = self.role.name(), high, "sim write");
        Ok(())
    }
}

impl Drop for SimLine {
    fn drop(&mut self) {
        self.state.released.store(true, Ordering::Release);
        tracing::trace!(line = self.role.name(), "sim line released");
    }
}

/// In-memory `LineFactory`; every role can be handed out once.
#[derive(Debug, Default)]
pub struct SimulatedLines {
    taps: HashMap<LineRole, LineTap>,
    unavailable: Option<LineRole>,
}

impl SimulatedLines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse to hand out `role`, as if its pin were missing.
    pub fn with_unavailable(mut self, role: LineRole) -> Self {
        self.unavailable = Some(role);
        self
    }

    pub fn tap(&self, role: LineRole) -> Option<LineTap> {
        self.taps.get(&role).cloned()
    }
}

impl LineFactory for SimulatedLines {
    fn acquire(
        &mut self,
        role: LineRole,
    ) -> Result<Box<dyn OutputLine>, Box<dyn std::error::Error + Send + Sync>> {
        if self.unavailable == Some(role) {
            return Err(Box::new(HwError::Unavailable(format!("{} line", role.name()))));
        }
        if self.taps.get(&role).is_some_and(|p| !p.is_released()) {
            return Err(Box::new(HwError::Unavailable(format!(
                "{} line already in use",
                role.name()
            ))));
        }
        let state = Arc::new(SimState::default());
        self.taps.insert(
            role,
            LineTap {
                state: Arc::clone(&state),
            },
        );
        tracing::debug!(line = role.name(), "sim line acquired");
        Ok(Box::new(SimLine { role, state }))
    }
}
