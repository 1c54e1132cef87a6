//! Acceleration-bounded set-point generators.
//!
//! Each tracker turns a caller-given hard goal into a soft goal that moves at
//! most one tick's worth of acceleration per call. Every tracker exposes
//! `new_task(..)` to reseed from the live estimate and `calc_soft_goal(..)`
//! to advance one tick. Rates are per second; `freq` is the tick rate that
//! turns them into per-tick increments through `fixed_point::Integrator`.

mod current;
mod interpolator;
mod position;
mod trajectory;
mod velocity;

pub use current::CurrentTracker;
pub use interpolator::PositionInterpolator;
pub use position::PositionTracker;
pub use trajectory::TrajectoryTracker;
pub use velocity::VelocityTracker;

use crate::config::{MotionParams, TrajectoryCfg};
use crate::consts::{CONTROL_FREQUENCY, CONTROL_PERIOD_US};
use crate::fixed_point::Integrator;

/// All five trackers, owned by value, plus the tick rate they integrate at.
#[derive(Debug, Clone)]
pub struct MotionPlanner {
    pub frequency: i32,
    pub period_us: i32,
    pub current: CurrentTracker,
    pub velocity: VelocityTracker,
    pub position: PositionTracker,
    pub interpolator: PositionInterpolator,
    pub trajectory: TrajectoryTracker,
}

impl MotionPlanner {
    pub fn new(params: &MotionParams, trajectory: &TrajectoryCfg) -> Self {
        Self::with_frequency(CONTROL_FREQUENCY, CONTROL_PERIOD_US, params, trajectory)
    }

    pub fn with_frequency(
        frequency: i32,
        period_us: i32,
        params: &MotionParams,
        trajectory: &TrajectoryCfg,
    ) -> Self {
        let mut planner = Self {
            frequency,
            period_us,
            current: CurrentTracker::default(),
            velocity: VelocityTracker::default(),
            position: PositionTracker::default(),
            interpolator: PositionInterpolator::default(),
            trajectory: TrajectoryTracker::default(),
        };
        planner.configure(params, trajectory);
        planner
    }

    /// Push accelerations and timeouts into every tracker.
    pub fn configure(&mut self, params: &MotionParams, trajectory: &TrajectoryCfg) {
        self.current.set_current_acc(params.rated_current_acc);
        self.velocity.set_velocity_acc(params.rated_velocity_acc);
        self.position.set_velocity_acc(params.rated_velocity_acc);
        self.trajectory.set_slow_down_acc(
            trajectory
                .slow_down_acc
                .unwrap_or(params.rated_velocity_acc),
        );
        self.trajectory
            .set_update_timeout_ms(trajectory.update_timeout_ms);
    }
}

/// 1-D ramp shared by the current and velocity trackers.
///
/// Moves `track` toward `goal` by `acc` per second. When the goal lies on the
/// other side of zero the ramp stops at zero first and continues from there
/// on the next tick. Arriving at zero or at the goal drops the remainder.
pub(crate) fn ramp(track: &mut i32, integral: &mut Integrator, goal: i32, acc: i32, freq: i32) {
    let delta = i64::from(goal) - i64::from(*track);
    if delta == 0 {
        *track = goal;
    } else if delta > 0 {
        let from_negative = *track < 0;
        integral.step(track, acc, freq);
        if from_negative {
            let stop = goal.min(0);
            if *track >= stop {
                integral.reset();
                *track = stop;
            }
        } else if *track >= goal {
            integral.reset();
            *track = goal;
        }
    } else {
        let from_positive = *track > 0;
        integral.step(track, -acc, freq);
        if from_positive {
            let stop = goal.max(0);
            if *track <= stop {
                integral.reset();
                *track = stop;
            }
        } else if *track <= goal {
            integral.reset();
            *track = goal;
        }
    }
}
