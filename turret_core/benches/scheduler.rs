use std::sync::Arc;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use turret_core::mocks::{LineLog, ManualTimer, RecordingLine};
use turret_core::{
    ChannelBank, ChannelId, EdgeScheduler, PulseChannel, PulseLimits, SchedulerCfg, parse_command,
};
use turret_traits::OutputLine;
use turret_traits::clock::Clock;
use turret_traits::clock::test_clock::TestClock;

// One full period for two channels: rise, two falls, boundary.
pub fn bench_period(c: &mut Criterion) {
    let mut g = c.benchmark_group("edge_scheduler");
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE")
        && let Ok(n) = ss.parse::<usize>()
    {
        g.sample_size(n.max(10));
    }
    g.bench_function("one_period_two_channels", |b| {
        b.iter_batched(
            || {
                let clock = TestClock::new();
                let log = LineLog::with_clock(Arc::new(clock.clone()));
                let bank = Arc::new(ChannelBank::new(vec![
                    PulseChannel::new(ChannelId::Pan, PulseLimits::default(), 1_200),
                    PulseChannel::new(ChannelId::Tilt, PulseLimits::default(), 1_800),
                ]));
                let lines: Vec<Box<dyn OutputLine>> = vec![
                    Box::new(RecordingLine::new("pan", log.clone())),
                    Box::new(RecordingLine::new("tilt", log)),
                ];
                let (timer, tap) = ManualTimer::new();
                let mut s = EdgeScheduler::new(bank, lines, Box::new(timer), SchedulerCfg::default())
                    .expect("scheduler");
                s.start(clock.now()).expect("start");
                (s, tap, clock)
            },
            |(mut s, tap, clock)| {
                for _ in 0..4 {
                    let (after, _) = tap.armed().expect("armed");
                    clock.advance(after);
                    std::hint::black_box(s.on_timer_expiry(clock.now()));
                }
                s
            },
            BatchSize::SmallInput,
        );
    });
    g.finish();
}

pub fn bench_parse(c: &mut Criterion) {
    c.bench_function("parse_command", |b| {
        b.iter(|| std::hint::black_box(parse_command(std::hint::black_box(b"U05\n"))));
    });
}

criterion_group!(benches, bench_period, bench_parse);
criterion_main!(benches);
