use joint_core::mocks::{DriverCommand, ScriptedSensor, SpyDriver, VecTable};
use joint_core::{Activity, Mode, Motor, MotorConfig, build_motor};

type MockMotor = Motor<ScriptedSensor, SpyDriver, VecTable>;

fn linear_table() -> VecTable {
    VecTable::from_entries((0..16_384u32).map(|i| (i * 25 / 8) as u16).collect())
}

/// Calibrated motor on a rotor that never moves, pushing 500 mA in current mode.
fn blocked_motor(stall_protect: bool) -> MockMotor {
    let mut cfg = MotorConfig::default();
    cfg.gains.stall_protect = stall_protect;
    cfg.faults.debounce_us = 1_000;
    let mut m = build_motor(ScriptedSensor::constant(4_000), SpyDriver::default(), linear_table(), cfg)
        .unwrap();
    m.set_current_acc(2_000_000);
    m.set_mode(Mode::CommandCurrent);
    m.set_current_setpoint(500);
    m
}

fn run(m: &mut MockMotor, ticks: usize) {
    for _ in 0..ticks {
        m.tick();
    }
}

#[test]
fn blocked_rotor_latches_stall_after_debounce() {
    let mut m = blocked_motor(true);
    // seed, mode switch, then 20 periods of 50 µs with current applied
    run(&mut m, 22);
    assert!(!m.state().is_stalled);
    m.tick();
    assert!(m.state().is_stalled);
    assert_eq!(m.activity(), Activity::Stall);

    m.tick();
    assert_eq!(m.driver().last, DriverCommand::Sleep);
    assert_eq!(m.state().foc_current, 0);
}

#[test]
fn stall_stays_latched_until_cleared() {
    let mut m = blocked_motor(true);
    run(&mut m, 30);
    assert!(m.state().is_stalled);
    run(&mut m, 1_000);
    assert!(m.state().is_stalled);

    m.clear_stall_flag();
    m.tick();
    assert!(matches!(m.driver().last, DriverCommand::Foc { .. }));
    assert_ne!(m.activity(), Activity::Stall);
}

#[test]
fn stall_protection_off_never_latches() {
    let mut m = blocked_motor(false);
    run(&mut m, 2_000);
    assert!(!m.state().is_stalled);
    assert_eq!(m.state().foc_current, 500);
    assert_eq!(m.activity(), Activity::Finish);
}

#[test]
fn releasing_the_disable_clears_the_stall() {
    let mut m = blocked_motor(true);
    run(&mut m, 30);
    assert!(m.state().is_stalled);
    m.set_disable(true);
    run(&mut m, 2);
    m.set_disable(false);
    m.tick();
    assert!(!m.state().is_stalled);
}

#[test]
fn saturated_velocity_loop_reports_overload() {
    let mut cfg = MotorConfig::default();
    cfg.faults.debounce_us = 1_000;
    let mut m = build_motor(ScriptedSensor::constant(0), SpyDriver::default(), linear_table(), cfg)
        .unwrap();
    m.set_mode(Mode::CommandVelocity);
    m.set_velocity_setpoint(1_000_000);
    run(&mut m, 2_000);
    assert_eq!(m.state().foc_current, m.config().motion.rated_current);
    assert!(m.state().overload_flag);
    assert!(!m.state().is_stalled);
    assert_eq!(m.activity(), Activity::Overload);
}
