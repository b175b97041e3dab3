use rstest::rstest;
use turret_config::load_toml;

const VALID: &str = r#"
[timing]
period_us = 20000
max_lateness_us = 1500

[channels.pan]
min_pulse_us = 1000
max_pulse_us = 2000
step_us = 100

[channels.tilt]
min_pulse_us = 1200
max_pulse_us = 1800
step_us = 50
initial_pulse_us = 1300

[actuation]
prime_timeout_ms = 10000
fire_timeout_ms = 2000

[pins]
pan = 12
tilt = 13
stepper = 20
solenoid = 21
feedback = 26
"#;

#[test]
fn accepts_full_document() {
    let cfg = load_toml(VALID).expect("parse TOML");
    cfg.validate().expect("valid config");
    assert_eq!(cfg.channels.tilt.initial_or_center(), 1300);
    assert_eq!(cfg.pins.expect("pins").feedback, Some(26));
}

#[rstest]
#[case("period_us = 20000", "period_us = 0", "timing.period_us must be > 0")]
#[case(
    "max_lateness_us = 1500",
    "max_lateness_us = 20000",
    "timing.max_lateness_us must be < timing.period_us"
)]
#[case(
    "max_pulse_us = 2000",
    "max_pulse_us = 25000",
    "channels.pan.max_pulse_us must be < timing.period_us"
)]
#[case("step_us = 50", "step_us = 0", "channels.tilt.step_us must be > 0")]
#[case(
    "initial_pulse_us = 1300",
    "initial_pulse_us = 1900",
    "channels.tilt.initial_pulse_us must be within"
)]
#[case(
    "prime_timeout_ms = 10000",
    "prime_timeout_ms = 0",
    "actuation.prime_timeout_ms must be >= 1"
)]
#[case(
    "fire_timeout_ms = 2000",
    "fire_timeout_ms = 99999999",
    "actuation.fire_timeout_ms is unreasonably large"
)]
#[case("solenoid = 21", "solenoid = 12", "assigned more than once")]
#[case("feedback = 26", "feedback = 20", "pins.feedback must not reuse")]
fn rejects_invalid_fields(#[case] from: &str, #[case] to: &str, #[case] expected: &str) {
    let doc = VALID.replacen(from, to, 1);
    let cfg = load_toml(&doc).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(
        format!("{err}").contains(expected),
        "expected '{expected}' in '{err}'"
    );
}

#[test]
fn rejects_inverted_bounds() {
    let doc = VALID.replacen("min_pulse_us = 1000", "min_pulse_us = 2100", 1);
    let cfg = load_toml(&doc).expect("parse TOML");
    let err = cfg.validate().expect_err("min > max");
    assert!(format!("{err}").contains("channels.pan.min_pulse_us must be <= max_pulse_us"));
}

#[test]
fn rejects_unknown_rotation() {
    let doc = format!("{VALID}\n[logging]\nrotation = \"weekly\"\n");
    let cfg = load_toml(&doc).expect("parse TOML");
    assert!(cfg.validate().is_err());
}

#[test]
fn partial_channel_table_is_a_parse_error() {
    let doc = "[channels.pan]\nmin_pulse_us = 1000\n";
    assert!(load_toml(doc).is_err());
}

#[test]
fn load_file_reads_and_validates() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("turret.toml");
    std::fs::write(&path, VALID).expect("write");
    let cfg = turret_config::load_file(&path).expect("load");
    assert_eq!(cfg.timing.max_lateness_us, 1500);

    std::fs::write(&path, "[timing]\nperiod_us = 0\n").expect("write");
    assert!(turret_config::load_file(&path).is_err());
}

#[test]
fn shipped_sample_config_is_valid() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../etc/turret.toml");
    let cfg = turret_config::load_file(&path).expect("sample config");
    let pins = cfg.pins.expect("sample has pins");
    assert_eq!(pins.feedback, Some(25));
    assert_eq!(cfg.logging.rotation.as_deref(), Some("daily"));
}
