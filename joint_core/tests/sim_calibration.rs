use joint_core::{
    Activity, CalibrationOutcome, CoreError, Mode, Motor, MotorConfig, Runner, build_motor,
    table_is_valid,
};
use joint_hardware::{MemoryTable, SensorModel, SimDriver, SimSensor, SimulatedJoint};
use joint_traits::PersistentTable;
use rstest::rstest;

const TURN: f64 = 51_200.0;
const BUDGET: u64 = 200_000;

type SimMotor = Motor<SimSensor, SimDriver, MemoryTable>;

fn sim_runner(model: SensorModel, table: MemoryTable) -> (SimulatedJoint, Runner<SimSensor, SimDriver, MemoryTable>) {
    let joint = SimulatedJoint::new(model);
    let motor: SimMotor =
        build_motor(joint.sensor(), joint.driver(), table, MotorConfig::default()).unwrap();
    (joint, Runner::new(motor))
}

fn circular_error(measured: i32, rotor: f64) -> f64 {
    let d = (f64::from(measured) - rotor.rem_euclid(TURN)).rem_euclid(TURN);
    d.min(TURN - d)
}

#[rstest]
#[case::aligned(SensorModel { offset: 0, error_amplitude: 0.0, reversed: false })]
#[case::offset_with_runout(SensorModel { offset: 3_000, error_amplitude: 40.0, reversed: false })]
#[case::reversed(SensorModel { offset: 9_100, error_amplitude: 25.0, reversed: true })]
fn sweep_commits_a_table_that_linearizes_the_sensor(#[case] model: SensorModel) {
    let (joint, mut runner) = sim_runner(model, MemoryTable::erased(16_384));
    assert!(!runner.motor().encoder().is_calibrated());

    let outcome = runner.calibrate(BUDGET).unwrap();
    assert_eq!(outcome, CalibrationOutcome::Committed { entries: 16_384 });
    assert!(runner.motor().encoder().is_calibrated());
    assert!(table_is_valid(runner.motor().encoder().table().entries()));
    assert!(joint.is_asleep());

    for rotor in [0.0, 777.0, 12_800.0, 25_601.0, 40_000.0, 51_000.0] {
        joint.set_position(rotor);
        runner.motor_mut().init();
        let angle = runner.motor().encoder().rectified_angle();
        assert!(
            circular_error(angle, rotor) <= 8.0,
            "rotor {rotor}: rectified {angle}"
        );
    }
}

#[test]
fn calibration_is_deterministic() {
    let model = SensorModel {
        offset: 1_234,
        error_amplitude: 30.0,
        reversed: false,
    };
    let (_, mut a) = sim_runner(model, MemoryTable::erased(16_384));
    let (_, mut b) = sim_runner(model, MemoryTable::erased(16_384));
    a.calibrate(BUDGET).unwrap();
    b.calibrate(BUDGET).unwrap();
    assert_eq!(
        a.motor().encoder().table().entries(),
        b.motor().encoder().table().entries()
    );
}

#[test]
fn committed_table_restarts_the_motor() {
    let (_, mut runner) = sim_runner(SensorModel::default(), MemoryTable::erased(16_384));
    runner.calibrate(BUDGET).unwrap();
    // re-initialized: the forced stall from the sweep is gone
    let state = runner.motor().state();
    assert!(!state.is_stalled);
    assert!(!runner.motor().controller().is_initialized());
    runner.tick();
    runner.tick();
    assert_ne!(runner.motor().activity(), Activity::NoCalib);
}

#[test]
fn storage_failure_mid_write_leaves_encoder_uncalibrated() {
    let (_, mut runner) = sim_runner(
        SensorModel::default(),
        MemoryTable::erased(16_384).fail_after(100),
    );
    let err = runner.calibrate(BUDGET).unwrap_err();
    match err.downcast_ref::<CoreError>() {
        Some(CoreError::Storage(msg)) => assert!(msg.contains("program failed")),
        other => panic!("expected a storage error, got {other:?}"),
    }
    assert!(!runner.motor().encoder().is_calibrated());
    assert!(!table_is_valid(runner.motor().encoder().table().entries()));
    assert!(!runner.calibrator().is_active());
}

#[test]
fn jammed_rotor_is_rejected_and_keeps_the_old_table() {
    let (joint, mut runner) = sim_runner(SensorModel::default(), MemoryTable::erased(16_384));
    runner.calibrate(BUDGET).unwrap();
    let good = runner.motor().encoder().table().entries().to_vec();
    let writes = runner.motor().encoder().table().total_writes();

    joint.set_jammed(true);
    let outcome = runner.calibrate(BUDGET).unwrap();
    assert!(matches!(outcome, CalibrationOutcome::Rejected(_)));
    assert_eq!(runner.motor().encoder().table().entries(), good.as_slice());
    assert_eq!(runner.motor().encoder().table().total_writes(), writes);
    assert!(runner.motor().encoder().is_calibrated());
    assert!(runner.motor().state().is_stalled);

    // neither a clear nor a fresh mode request lifts the hold
    joint.set_jammed(false);
    runner.motor_mut().clear_stall_flag();
    runner.motor_mut().set_mode(Mode::CommandVelocity);
    runner.motor_mut().set_disable(true);
    runner.run_ticks(2).unwrap();
    runner.motor_mut().set_disable(false);
    runner.run_ticks(2).unwrap();
    assert!(runner.motor().state().is_stalled);
    assert_eq!(runner.motor().activity(), Activity::Stall);
    assert!(joint.is_asleep());

    // only a restart does
    runner.motor_mut().init();
    runner.run_ticks(2).unwrap();
    assert!(!runner.motor().state().is_stalled);
}
