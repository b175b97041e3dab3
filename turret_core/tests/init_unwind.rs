use rstest::rstest;
use turret_core::error::TurretError;
use turret_core::mocks::{LineLog, ManualTimers, RecordingLines};
use turret_core::{TurretBuilder, TurretCfg};
use turret_traits::{LineFactory, LineRole, TimerRole};

#[derive(Debug, Clone, Copy)]
enum Refuse {
    Line(LineRole),
    Timer(TimerRole),
}

#[rstest]
#[case::pan(Refuse::Line(LineRole::Pan), &[])]
#[case::tilt(Refuse::Line(LineRole::Tilt), &["pan"])]
#[case::stepper(Refuse::Line(LineRole::Stepper), &["tilt", "pan"])]
#[case::solenoid(Refuse::Line(LineRole::Solenoid), &["stepper", "tilt", "pan"])]
#[case::scheduler(Refuse::Timer(TimerRole::Scheduler), &["solenoid", "stepper", "tilt", "pan"])]
#[case::watchdog(
    Refuse::Timer(TimerRole::Watchdog),
    &["scheduler", "solenoid", "stepper", "tilt", "pan"]
)]
fn failed_acquisition_releases_in_reverse(#[case] refuse: Refuse, #[case] want: &[&str]) {
    let log = LineLog::new();
    let mut lines = RecordingLines::new(log.clone());
    let mut timers = ManualTimers::logged(log.clone());
    match refuse {
        Refuse::Line(role) => lines = lines.fail_on(role),
        Refuse::Timer(role) => timers = timers.fail_on(role),
    }

    let err = TurretBuilder::new(TurretCfg::default())
        .assemble(&mut lines, &mut timers)
        .expect_err("acquisition must fail");
    match err.downcast_ref::<TurretError>() {
        Some(TurretError::ResourceUnavailable(msg)) => assert!(msg.contains("unavailable"), "{msg}"),
        other => panic!("expected ResourceUnavailable, got {other:?}"),
    }

    assert_eq!(log.releases(), want);
    // Every released line was left low.
    for name in want.iter().filter(|n| **n != "scheduler" && **n != "watchdog") {
        assert_eq!(log.level(name), Some(false), "{name}");
    }
}

#[test]
fn line_refusing_safe_level_aborts_assembly() {
    let log = LineLog::new();
    let mut lines = RecordingLines::new(log.clone());
    let mut timers = ManualTimers::new();
    // The stepper is handed out but refuses every write.
    struct Faulty<'a>(&'a mut RecordingLines);
    impl LineFactory for Faulty<'_> {
        fn acquire(
            &mut self,
            role: LineRole,
        ) -> Result<Box<dyn turret_traits::OutputLine>, Box<dyn std::error::Error + Send + Sync>>
        {
            let line = self.0.acquire(role)?;
            if role == LineRole::Stepper
                && let Some(sw) = self.0.switch(role)
            {
                sw.store(true, std::sync::atomic::Ordering::Relaxed);
            }
            Ok(line)
        }
    }
    let err = TurretBuilder::new(TurretCfg::default())
        .assemble(&mut Faulty(&mut lines), &mut timers)
        .expect_err("stepper cannot be driven low");
    assert!(err.downcast_ref::<TurretError>().is_some());
    assert_eq!(log.releases(), vec!["stepper", "tilt", "pan"]);
}

#[test]
fn successful_assembly_releases_on_drop() {
    let log = LineLog::new();
    let turret = TurretBuilder::new(TurretCfg::default())
        .assemble(
            &mut RecordingLines::new(log.clone()),
            &mut ManualTimers::logged(log.clone()),
        )
        .expect("assemble");
    assert!(log.releases().is_empty());
    drop(turret);
    let released = log.releases();
    assert_eq!(released.len(), 6, "{released:?}");
    for line in ["pan", "tilt", "stepper", "solenoid"] {
        assert_eq!(log.level(line), Some(false), "{line}");
    }
}
