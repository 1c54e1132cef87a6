use joint_core::planner::{CurrentTracker, PositionTracker, TrajectoryTracker, VelocityTracker};
use proptest::prelude::*;
use rstest::rstest;

const F: i32 = 20_000;

/// Largest change one tick may make at `acc` per second.
fn per_tick(acc: i32) -> i64 {
    let (a, f) = (i64::from(acc), i64::from(F));
    (a + f - 1) / f + 1
}

/// Ticks a ramp needs to cover `error`, with one spare for the stop at zero.
fn ramp_budget(error: i64, acc: i32) -> i64 {
    let a = i64::from(acc);
    (error.abs() * i64::from(F) + a - 1) / a + 3
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn current_ramp_is_rate_bounded_and_converges(
        start in -3_300i32..=3_300,
        goal in -3_300i32..=3_300,
        acc in 20_000i32..=2_000_000,
    ) {
        let mut t = CurrentTracker::default();
        t.set_current_acc(acc);
        t.new_task(start);
        let budget = ramp_budget(i64::from(goal) - i64::from(start), acc);
        let mut prev = start;
        let mut ticks = 0i64;
        while prev != goal {
            t.calc_soft_goal(goal, F);
            let now = t.go_current();
            prop_assert!((i64::from(now) - i64::from(prev)).abs() <= per_tick(acc));
            prev = now;
            ticks += 1;
            prop_assert!(ticks <= budget, "no convergence after {} ticks", ticks);
        }
        for _ in 0..10 {
            t.calc_soft_goal(goal, F);
            prop_assert_eq!(t.go_current(), goal);
        }
    }

    #[test]
    fn velocity_ramp_is_rate_bounded_and_converges(
        start in -1_000_000i32..=1_000_000,
        goal in -1_000_000i32..=1_000_000,
        acc in 1_000_000i32..=20_000_000,
    ) {
        let mut t = VelocityTracker::default();
        t.set_velocity_acc(acc);
        t.new_task(start);
        let budget = ramp_budget(i64::from(goal) - i64::from(start), acc);
        let mut prev = start;
        let mut ticks = 0i64;
        while prev != goal {
            t.calc_soft_goal(goal, F);
            let now = t.go_velocity();
            prop_assert!((i64::from(now) - i64::from(prev)).abs() <= per_tick(acc));
            prev = now;
            ticks += 1;
            prop_assert!(ticks <= budget, "no convergence after {} ticks", ticks);
        }
    }

    #[test]
    fn position_profile_respects_rated_velocity_and_acceleration(
        goal in -50_000i32..=50_000,
        rated in 20_000i32..=400_000,
        acc in 2_048_000i32..=20_000_000,
    ) {
        let mut t = PositionTracker::default();
        t.set_velocity_acc(acc);
        t.new_task(0, 0);
        let lock = t.speed_locking_brake();
        let mut prev_v: i32 = 0;
        for _ in 0..20_000 {
            t.calc_soft_goal(goal, rated, F);
            let v = t.go_velocity();
            prop_assert!(v.abs() <= rated);
            let snapped = v == 0 && prev_v.abs() <= lock;
            prop_assert!(snapped || (i64::from(v) - i64::from(prev_v)).abs() <= per_tick(acc));
            prev_v = v;
        }
    }
}

#[rstest]
#[case(51_200, 1_536_000)]
#[case(-51_200, 1_536_000)]
#[case(7, 1_536_000)]
#[case(-300_000, 512_000)]
#[case(1_000_000, 5_120_000)]
fn position_profile_settles_exactly_on_goal(#[case] goal: i32, #[case] rated: i32) {
    let mut t = PositionTracker::default();
    t.set_velocity_acc(5_120_000);
    t.new_task(0, 0);
    let mut settled = false;
    for _ in 0..100_000 {
        t.calc_soft_goal(goal, rated, F);
        if t.go_position() == goal && t.go_velocity() == 0 {
            settled = true;
            break;
        }
    }
    assert!(settled, "stuck at {} v={}", t.go_position(), t.go_velocity());
    for _ in 0..1_000 {
        t.calc_soft_goal(goal, rated, F);
        assert_eq!((t.go_position(), t.go_velocity()), (goal, 0));
    }
}

#[test]
fn stale_trajectory_slows_to_a_stop() {
    let mut t = TrajectoryTracker::default();
    t.set_slow_down_acc(5_120_000);
    t.set_update_timeout_ms(10);
    t.new_task(0, 0);
    // accelerate toward a far set-point at cruise speed
    for _ in 0..100 {
        t.calc_soft_goal(1_000_000, 100_000, F, 50);
    }
    let moving = t.go_velocity();
    assert!(moving > 0);
    assert!(!t.is_overtime());

    // the same set-point for longer than the timeout counts as stale
    for _ in 0..200 {
        t.calc_soft_goal(1_000_000, 100_000, F, 50);
    }
    assert!(t.is_overtime());
    for _ in 0..2_000 {
        t.calc_soft_goal(1_000_000, 100_000, F, 50);
    }
    assert_eq!(t.go_velocity(), 0);

    // a fresh set-point resumes tracking
    t.calc_soft_goal(1_000_001, 100_000, F, 50);
    assert!(!t.is_overtime());
}
