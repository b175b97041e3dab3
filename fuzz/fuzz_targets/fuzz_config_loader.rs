#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    if let Ok(cfg) = toml::from_str::<turret_config::Config>(data)
        && cfg.validate().is_ok()
    {
        // A config that validates must also pass the runtime check.
        let runtime = turret_core::TurretCfg::from(&cfg);
        assert!(runtime.check().is_ok());
    }
});
