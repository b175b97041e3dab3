use rstest::rstest;
use turret_hardware::SimulatedLines;
use turret_hardware::error::HwError;
use turret_traits::{LineFactory, LineRole};

#[rstest]
#[case(LineRole::Pan)]
#[case(LineRole::Tilt)]
#[case(LineRole::Stepper)]
#[case(LineRole::Solenoid)]
fn unavailable_role_is_reported_as_hw_error(#[case] role: LineRole) {
    let mut lines = SimulatedLines::new().with_unavailable(role);
    let err = lines.acquire(role).err().expect("refused");
    match err.downcast_ref::<HwError>() {
        Some(HwError::Unavailable(what)) => assert!(what.contains(role.name())),
        other => panic!("unexpected {other:?}"),
    }
    for other in [LineRole::Pan, LineRole::Tilt, LineRole::Stepper, LineRole::Solenoid] {
        if other != role {
            assert!(lines.acquire(other).is_ok(), "{}", other.name());
        }
    }
}

#[test]
fn injected_fault_is_typed_and_recoverable() {
    let mut lines = SimulatedLines::new();
    let mut solenoid = lines.acquire(LineRole::Solenoid).expect("acquire");
    let tap = lines.tap(LineRole::Solenoid).expect("tap");
    tap.set_failing(true);
    let err = solenoid.set(true).expect_err("fault");
    assert!(matches!(
        err.downcast_ref::<HwError>(),
        Some(HwError::Injected("solenoid"))
    ));
    assert!(!tap.is_high());
    tap.set_failing(false);
    solenoid.set(true).expect("recovered");
    assert!(tap.is_high());
}
