use std::time::{Duration, Instant};

/// Monotonic clock abstraction shared by both timer reactors.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Default, real-time monotonic clock backed by std::time::Instant.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Deterministic clock for driving reactors by hand in tests and simulations.
pub mod test_clock {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// now() = origin + offset, moved only by `advance`/`advance_to`.
    /// Clones share the same offset.
    #[derive(Debug, Clone)]
    pub struct TestClock {
        origin: Instant,
        offset: Arc<Mutex<Duration>>,
    }

    impl Default for TestClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestClock {
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
                offset: Arc::new(Mutex::new(Duration::ZERO)),
            }
        }

        /// Advance the clock by the given duration.
        pub fn advance(&self, d: Duration) {
            if let Ok(mut off) = self.offset.lock() {
                *off = off.saturating_add(d);
            }
        }

        /// Jump to an absolute instant; earlier instants are ignored.
        pub fn advance_to(&self, t: Instant) {
            if let Ok(mut off) = self.offset.lock() {
                let target = t.saturating_duration_since(self.origin);
                if target > *off {
                    *off = target;
                }
            }
        }

        /// The instant this clock started at.
        pub fn origin(&self) -> Instant {
            self.origin
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Instant {
            let off = self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO);
            self.origin + off
        }
    }

}
