use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use joint_core::mocks::{ScriptedSensor, SpyDriver, VecTable};
use joint_core::{CoreError, Runner, MotorConfig, build_motor};
use joint_traits::ManualClock;
use rstest::rstest;

fn runner() -> Runner<ScriptedSensor, SpyDriver, VecTable> {
    let motor = build_motor(
        ScriptedSensor::constant(0),
        SpyDriver::default(),
        VecTable::erased(),
        MotorConfig::default(),
    )
    .unwrap();
    Runner::new(motor)
}

#[rstest]
fn calibration_aborts_on_stop_request() {
    // Flag toggled from outside, like a Ctrl-C handler would.
    let stop = Arc::new(AtomicBool::new(false));
    let polls = Arc::new(AtomicUsize::new(0));
    let (stop_ref, polls_ref) = (stop.clone(), polls.clone());

    let mut r = runner().with_stop_check(move || {
        if polls_ref.fetch_add(1, Ordering::Relaxed) == 500 {
            stop_ref.store(true, Ordering::Relaxed);
        }
        stop_ref.load(Ordering::Relaxed)
    });

    let err = r.calibrate(400_000).unwrap_err();
    assert!(matches!(err.downcast_ref::<CoreError>(), Some(CoreError::State(_))));
    assert_eq!(r.ticks(), 500);
    assert!(stop.load(Ordering::Relaxed));
    // the sweep is abandoned mid-way; nothing reached the table
    assert!(!r.motor().encoder().is_calibrated());
}

#[rstest]
#[case(1)]
#[case(64)]
fn paced_run_checks_between_batches(#[case] batch: u32) {
    let polls = Arc::new(AtomicUsize::new(0));
    let polls_ref = polls.clone();
    let mut r = runner().with_stop_check(move || polls_ref.fetch_add(1, Ordering::Relaxed) >= 3);
    let clock = ManualClock::new();
    r.run_paced(10_000, &clock, batch).unwrap();
    assert_eq!(r.ticks(), 3 * u64::from(batch));
}
