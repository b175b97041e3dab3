use std::sync::Arc;
use std::time::{Duration, Instant};

use proptest::prelude::*;
use turret_core::mocks::{LineLog, ManualTimer, RecordingLine, TimerTap};
use turret_core::{
    ChannelBank, ChannelId, EdgeScheduler, PulseChannel, PulseLimits, SchedulerCfg, Tick,
};
use turret_traits::OutputLine;
use turret_traits::clock::Clock;
use turret_traits::clock::test_clock::TestClock;

const PERIOD_US: u32 = 20_000;
const NAMES: [&str; 2] = ["pan", "tilt"];

fn limits() -> PulseLimits {
    PulseLimits {
        min_us: 0,
        max_us: PERIOD_US - 1,
        step_us: 1,
    }
}

struct Harness {
    sched: EdgeScheduler,
    tap: TimerTap,
    log: LineLog,
    clock: TestClock,
    bank: Arc<ChannelBank>,
}

fn harness(widths: [u32; 2]) -> Harness {
    let clock = TestClock::new();
    let log = LineLog::with_clock(Arc::new(clock.clone()));
    let bank = Arc::new(ChannelBank::new(vec![
        PulseChannel::new(ChannelId::Pan, limits(), widths[0]),
        PulseChannel::new(ChannelId::Tilt, limits(), widths[1]),
    ]));
    let (timer, tap) = ManualTimer::new();
    let sched = EdgeScheduler::new(
        Arc::clone(&bank),
        NAMES
            .iter()
            .map(|&n| Box::new(RecordingLine::new(n, log.clone())) as Box<dyn OutputLine>)
            .collect(),
        Box::new(timer),
        SchedulerCfg {
            period: Duration::from_micros(u64::from(PERIOD_US)),
            max_lateness: Duration::from_micros(500),
        },
    )
    .expect("scheduler");
    Harness {
        sched,
        tap,
        log,
        clock,
        bank,
    }
}

impl Harness {
    /// Run on-time expiries until `until` has been handled; returns the ticks.
    fn run_until(&mut self, until: Instant) -> Vec<Tick> {
        let mut ticks = Vec::new();
        while self.clock.now() <= until {
            let Some((after, _)) = self.tap.armed() else {
                break;
            };
            if self.clock.now() + after > until {
                break;
            }
            self.clock.advance(after);
            ticks.push(self.sched.on_timer_expiry(self.clock.now()));
        }
        ticks
    }
}

proptest! {
    #[test]
    fn high_time_equals_sampled_width(pan in 0u32..PERIOD_US, tilt in 0u32..PERIOD_US) {
        let mut h = harness([pan, tilt]);
        let t0 = h.clock.now();
        h.sched.start(t0).expect("start");
        let period = Duration::from_micros(u64::from(PERIOD_US));
        let ticks = h.run_until(t0 + period);

        for (name, w) in NAMES.iter().zip([pan, tilt]) {
            let tr = h.log.transitions(name);
            if w == 0 {
                prop_assert!(tr.is_empty(), "{} never rises at width 0", name);
                continue;
            }
            prop_assert!(tr.len() >= 3, "{}: {:?}", name, tr);
            prop_assert_eq!(tr[0], (t0, true));
            prop_assert_eq!(tr[1], (t0 + Duration::from_micros(u64::from(w)), false));
            prop_assert_eq!(tr[2], (t0 + period, true));
        }
        // Every expiry in a clean run applies edges on time.
        for t in &ticks {
            let on_time = matches!(t, Tick::Applied { .. });
            prop_assert!(on_time, "{:?}", t);
        }
        // start + at most one re-arm per distinct deadline.
        prop_assert!(h.tap.arm_count() <= 2 * NAMES.len() + 2);
    }

    #[test]
    fn events_are_applied_in_time_order(pan in 1u32..PERIOD_US, tilt in 1u32..PERIOD_US) {
        let mut h = harness([pan, tilt]);
        let t0 = h.clock.now();
        h.sched.start(t0).expect("start");
        h.run_until(t0 + Duration::from_micros(u64::from(3 * PERIOD_US)));
        let times: Vec<Instant> = h.log.events().iter().map(|e| e.at).collect();
        prop_assert!(times.windows(2).all(|w| w[0] <= w[1]));
        prop_assert_eq!(h.sched.cycle(), 4);
    }

    #[test]
    fn mid_period_writes_land_on_the_next_boundary(first in 1u32..PERIOD_US, second in 1u32..PERIOD_US) {
        let mut h = harness([first, first]);
        let t0 = h.clock.now();
        let period = Duration::from_micros(u64::from(PERIOD_US));
        h.sched.start(t0).expect("start");
        h.run_until(t0);
        h.bank.set_width(ChannelId::Pan, second);
        h.run_until(t0 + period + Duration::from_micros(u64::from(PERIOD_US - 1)));
        let tr = h.log.transitions("pan");
        prop_assert_eq!(tr[1].0 - t0, Duration::from_micros(u64::from(first)));
        prop_assert_eq!(tr[3].0 - (t0 + period), Duration::from_micros(u64::from(second)));
    }

    #[test]
    fn clamp_is_idempotent(w in 1_000u32..=2_000, m in 0u8..=99, up in any::<bool>()) {
        let bank = ChannelBank::new(vec![PulseChannel::new(ChannelId::Pan, PulseLimits::default(), w)]);
        let delta = i64::from(m) * 100 * if up { 1 } else { -1 };
        let a = bank.adjust(ChannelId::Pan, delta).expect("adjust");
        let want = (i64::from(w) + delta).clamp(1_000, 2_000);
        prop_assert_eq!(i64::from(a.to_us), want);
        let again = bank.adjust(ChannelId::Pan, 0).expect("adjust");
        prop_assert!(again.is_noop());
        prop_assert_eq!(PulseLimits::default().clamp(i64::from(a.to_us)), a.to_us);
    }
}

#[test]
fn coincident_edges_are_applied_before_rearm() {
    let mut h = harness([1_200, 1_200]);
    let t0 = h.clock.now();
    h.sched.start(t0).expect("start");
    let ticks = h.run_until(t0 + Duration::from_micros(1_200));
    assert_eq!(
        ticks,
        vec![
            Tick::Applied {
                rising: 2,
                falling: 0,
                next_in: Duration::from_micros(1_200)
            },
            Tick::Applied {
                rising: 0,
                falling: 2,
                next_in: Duration::from_micros(18_800)
            },
        ]
    );
    assert_eq!(h.tap.arm_count(), 3);
}
