use crate::fixed_point::{Integrator, saturate_i32};

/// Follows a stream of `(position, velocity)` set-points.
///
/// Each new set-point solves for the constant acceleration that arrives at
/// the set-point velocity exactly at the set-point position. When the stream
/// stops for longer than the update timeout the tracker gives up on the
/// stale set-point and decelerates to zero at `slow_down_acc`.
#[derive(Debug, Clone)]
pub struct TrajectoryTracker {
    slow_down_acc: i32,
    update_timeout_ms: i32,
    dynamic_velocity_acc: i32,
    update_time_us: i64,
    overtime: bool,
    record_velocity: i32,
    record_position: i32,
    velocity_integral: Integrator,
    velocity_now: i32,
    position_integral: Integrator,
    position_now: i32,
    go_position: i32,
    go_velocity: i32,
}

impl Default for TrajectoryTracker {
    fn default() -> Self {
        Self {
            slow_down_acc: 0,
            update_timeout_ms: 200,
            dynamic_velocity_acc: 0,
            update_time_us: 0,
            overtime: false,
            record_velocity: 0,
            record_position: 0,
            velocity_integral: Integrator::new(),
            velocity_now: 0,
            position_integral: Integrator::new(),
            position_now: 0,
            go_position: 0,
            go_velocity: 0,
        }
    }
}

impl TrajectoryTracker {
    pub fn set_slow_down_acc(&mut self, acc: i32) {
        self.slow_down_acc = acc;
    }

    pub fn set_update_timeout_ms(&mut self, ms: i32) {
        self.update_timeout_ms = ms;
    }

    /// Reseed from the live estimate. The last recorded set-point is kept, so
    /// an unchanged set-point after a reseed counts toward the timeout.
    pub fn new_task(&mut self, real_position: i32, real_velocity: i32) {
        self.update_time_us = 0;
        self.overtime = false;
        self.velocity_integral.reset();
        self.velocity_now = real_velocity;
        self.position_integral.reset();
        self.position_now = real_position;
    }

    /// `(v_goal + v_now)(v_goal - v_now) / (2 (p_goal - p_now))`, truncated.
    /// Zero when already at the goal position.
    fn solve_acceleration(&self, goal_position: i32, goal_velocity: i32) -> i32 {
        let dp = i64::from(goal_position) - i64::from(self.position_now);
        if dp == 0 {
            return 0;
        }
        let vg = i128::from(goal_velocity);
        let vn = i128::from(self.velocity_now);
        let acc = (vg + vn) * (vg - vn) / (2 * i128::from(dp));
        let acc = acc.clamp(i128::from(i32::MIN), i128::from(i32::MAX));
        saturate_i32(i64::try_from(acc).unwrap_or_default())
    }

    pub fn calc_soft_goal(
        &mut self,
        goal_position: i32,
        goal_velocity: i32,
        freq: i32,
        period_us: i32,
    ) {
        if goal_velocity != self.record_velocity || goal_position != self.record_position {
            self.update_time_us = 0;
            self.record_velocity = goal_velocity;
            self.record_position = goal_position;
            self.dynamic_velocity_acc = self.solve_acceleration(goal_position, goal_velocity);
            self.overtime = false;
        } else if self.update_time_us >= i64::from(self.update_timeout_ms) * 1000 {
            if !self.overtime {
                tracing::debug!(
                    timeout_ms = self.update_timeout_ms,
                    "trajectory set-points went stale; slowing down"
                );
            }
            self.overtime = true;
        } else {
            self.update_time_us += i64::from(period_us);
        }

        if self.overtime {
            if self.velocity_now == 0 {
                self.velocity_integral.reset();
            } else if self.velocity_now > 0 {
                self.velocity_integral
                    .step(&mut self.velocity_now, -self.slow_down_acc, freq);
                if self.velocity_now <= 0 {
                    self.velocity_integral.reset();
                    self.velocity_now = 0;
                }
            } else {
                self.velocity_integral
                    .step(&mut self.velocity_now, self.slow_down_acc, freq);
                if self.velocity_now >= 0 {
                    self.velocity_integral.reset();
                    self.velocity_now = 0;
                }
            }
        } else {
            self.velocity_integral
                .step(&mut self.velocity_now, self.dynamic_velocity_acc, freq);
        }

        let velocity = self.velocity_now;
        self.position_integral
            .step(&mut self.position_now, velocity, freq);

        self.go_position = self.position_now;
        self.go_velocity = self.velocity_now;
    }

    pub fn is_overtime(&self) -> bool {
        self.overtime
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
    const P: i32 = 50;

    #[test]
    fn constant_acceleration_meets_set_point() {
        let mut t = TrajectoryTracker::default();
        t.set_slow_down_acc(1_000_000);
        // the approach takes ~316 ms of repeated set-points
        t.set_update_timeout_ms(400);
        t.new_task(0, 0);
        // v² = 2·a·d with a = 200_000 steps/s², d = 10_000 steps
        t.calc_soft_goal(10_000, 63_245, F, P);
        assert_eq!(t.dynamic_velocity_acc, 199_996);
        for _ in 1..6_324 {
            t.calc_soft_goal(10_000, 63_245, F, P);
        }
        assert!(!t.is_overtime());
        assert!((t.go_velocity() - 63_245).abs() < 100);
        assert!((t.go_position() - 10_000).abs() < 20);
    }

    #[test]
    fn same_position_set_point_needs_no_acceleration() {
        let mut t = TrajectoryTracker::default();
        t.new_task(500, 0);
        t.calc_soft_goal(500, 1_000, F, P);
        assert_eq!(t.dynamic_velocity_acc, 0);
    }

    #[test]
    fn stale_stream_times_out_and_stops() {
        let mut t = TrajectoryTracker::default();
        t.set_update_timeout_ms(10);
        t.set_slow_down_acc(2_000_000);
        t.new_task(0, 20_000);
        // cruise set-point far ahead: zero acceleration
        t.calc_soft_goal(1_000_000, 20_000, F, P);
        for _ in 0..200 {
            t.calc_soft_goal(1_000_000, 20_000, F, P);
        }
        assert!(!t.is_overtime());
        assert_eq!(t.go_velocity(), 20_000);
        t.calc_soft_goal(1_000_000, 20_000, F, P);
        assert!(t.is_overtime());
        for _ in 0..300 {
            t.calc_soft_goal(1_000_000, 20_000, F, P);
        }
        assert_eq!(t.go_velocity(), 0);
    }

    #[test]
    fn fresh_set_point_clears_timeout() {
        let mut t = TrajectoryTracker::default();
        t.set_update_timeout_ms(1);
        t.set_slow_down_acc(2_000_000);
        t.new_task(0, 0);
        for _ in 0..30 {
            t.calc_soft_goal(0, 0, F, P);
        }
        assert!(t.is_overtime());
        t.calc_soft_goal(100, 0, F, P);
        assert!(!t.is_overtime());
    }
}
