use crate::fixed_point::Integrator;

/// Trapezoidal position profile.
///
/// Accelerates toward the goal up to the rated velocity and starts braking
/// once the remaining distance is within `v² / (2·acc)`. Near the goal, any
/// velocity within `speed_locking_brake` is dropped to zero at once so the
/// profile does not hunt around the target.
#[derive(Debug, Clone, Default)]
pub struct PositionTracker {
    velocity_up_acc: i32,
    velocity_down_acc: i32,
    speed_locking_brake: i32,
    velocity_integral: Integrator,
    track_velocity: i32,
    position_integral: Integrator,
    track_position: i32,
    go_position: i32,
    go_velocity: i32,
}

impl PositionTracker {
    /// Acceleration for both ramps; the lock-in band follows at `acc / 1000`.
    pub fn set_velocity_acc(&mut self, acc: i32) {
        self.velocity_up_acc = acc;
        self.velocity_down_acc = acc;
        self.speed_locking_brake = acc / 1000;
    }

    pub fn speed_locking_brake(&self) -> i32 {
        self.speed_locking_brake
    }

    pub fn new_task(&mut self, real_position: i32, real_velocity: i32) {
        self.velocity_integral.reset();
        self.track_velocity = real_velocity;
        self.position_integral.reset();
        self.track_position = real_position;
    }

    fn accelerate(&mut self, rate: i32, freq: i32) {
        self.velocity_integral
            .step(&mut self.track_velocity, rate, freq);
    }

    /// Slow toward zero velocity, stopping exactly at zero.
    fn brake(&mut self, freq: i32) {
        if self.track_velocity > 0 {
            self.accelerate(-self.velocity_down_acc, freq);
            if self.track_velocity <= 0 {
                self.velocity_integral.reset();
                self.track_velocity = 0;
            }
        } else if self.track_velocity < 0 {
            self.accelerate(self.velocity_down_acc, freq);
            if self.track_velocity >= 0 {
                self.velocity_integral.reset();
                self.track_velocity = 0;
            }
        }
    }

    fn braking_distance(&self) -> i64 {
        let v = i64::from(self.track_velocity);
        v * v / (2 * i64::from(self.velocity_down_acc.max(1)))
    }

    pub fn calc_soft_goal(&mut self, goal_position: i32, rated_velocity: i32, freq: i32) {
        let delta = i64::from(goal_position) - i64::from(self.track_position);
        let v = self.track_velocity;

        if delta == 0 {
            if v.abs() <= self.speed_locking_brake {
                self.velocity_integral.reset();
                self.track_velocity = 0;
                self.position_integral.reset();
            } else {
                self.brake(freq);
            }
        } else if v == 0 {
            let rate = if delta > 0 {
                self.velocity_up_acc
            } else {
                -self.velocity_up_acc
            };
            self.accelerate(rate, freq);
        } else if (delta > 0) == (v > 0) {
            // moving toward the goal
            let sign = v.signum();
            let speed = v.abs();
            if speed > rated_velocity {
                self.brake(freq);
            } else if delta.abs() > self.braking_distance() {
                if speed < rated_velocity {
                    self.accelerate(sign * self.velocity_up_acc, freq);
                    if self.track_velocity.abs() >= rated_velocity {
                        self.velocity_integral.reset();
                        self.track_velocity = sign * rated_velocity;
                    }
                }
            } else {
                self.brake(freq);
            }
        } else {
            // moving away from the goal
            self.brake(freq);
        }

        let velocity = self.track_velocity;
        self.position_integral
            .step(&mut self.track_position, velocity, freq);

        self.go_position = self.track_position;
        self.go_velocity = self.track_velocity;
    }

    pub fn go_position(&self) -> i32 {
        self.go_position
    }

    pub fn go_velocity(&self) -> i32 {
        self.go_velocity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const F: i32 = 20_000;

    #[test]
    fn locking_brake_zeroes_velocity_at_goal() {
        let mut t = PositionTracker::default();
        t.set_velocity_acc(5_120_000);
        assert_eq!(t.speed_locking_brake(), 5120);
        t.new_task(0, 4000);
        t.calc_soft_goal(0, 1_536_000, F);
        assert_eq!(t.go_velocity(), 0);
        assert_eq!(t.go_position(), 0);
    }

    #[test]
    fn fast_pass_through_goal_brakes_instead_of_locking() {
        let mut t = PositionTracker::default();
        t.set_velocity_acc(5_120_000);
        t.new_task(0, 100_000);
        t.calc_soft_goal(0, 1_536_000, F);
        assert_eq!(t.go_velocity(), 100_000 - 256);
    }

    #[test]
    fn reaches_goal_and_holds() {
        let mut t = PositionTracker::default();
        t.set_velocity_acc(5_120_000);
        t.new_task(0, 0);
        let goal = 51_200;
        let mut max_v = 0;
        for _ in 0..40_000 {
            t.calc_soft_goal(goal, 1_536_000, F);
            max_v = max_v.max(t.go_velocity());
            if t.go_position() == goal && t.go_velocity() == 0 {
                break;
            }
        }
        assert_eq!(t.go_position(), goal);
        assert_eq!(t.go_velocity(), 0);
        assert!(max_v <= 1_536_000);
        for _ in 0..100 {
            t.calc_soft_goal(goal, 1_536_000, F);
            assert_eq!(t.go_position(), goal);
        }
    }

    #[test]
    fn cruise_is_capped_at_rated_velocity() {
        let mut t = PositionTracker::default();
        t.set_velocity_acc(51_200_000);
        t.new_task(0, 0);
        for _ in 0..2_000 {
            t.calc_soft_goal(i32::MAX / 2, 512_000, F);
        }
        assert_eq!(t.go_velocity(), 512_000);
    }

    #[test]
    fn moving_away_from_goal_decelerates_first() {
        let mut t = PositionTracker::default();
        t.set_velocity_acc(5_120_000);
        t.new_task(0, -10_000);
        t.calc_soft_goal(10_000, 1_536_000, F);
        assert_eq!(t.go_velocity(), -10_000 + 256);
    }
}
