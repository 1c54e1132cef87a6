#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    let Ok(cfg) = joint_config::load_toml(data) else {
        return;
    };
    if cfg.validate().is_err() {
        return;
    }
    // Unit conversion saturates instead of panicking on extreme values.
    let motor = joint_core::MotorConfig::from(&cfg);
    let _ = motor.validate();
});
