use crate::fixed_point::single_pole;

/// Follows an externally stepped position (step/dir input).
///
/// The position is taken as-is; the velocity feed-forward is the per-tick
/// position change, scaled to steps/s and smoothed by a `>> 6` single-pole
/// filter. There is no acceleration bound: the pulse rate is the profile.
#[derive(Debug, Clone, Default)]
pub struct PositionInterpolator {
    record_position: i32,
    record_position_last: i32,
    est_position: i32,
    est_velocity: i32,
    est_position_integral: i64,
    go_position: i32,
    go_velocity: i32,
}

const SMOOTHING_SHIFT: u32 = 6;

impl PositionInterpolator {
    pub fn new_task(&mut self, real_position: i32, real_velocity: i32) {
        self.record_position = real_position;
        self.record_position_last = real_position;
        self.est_position = real_position;
        self.est_velocity = real_velocity;
        self.est_position_integral = 0;
    }

    pub fn calc_soft_goal(&mut self, goal_position: i32, freq: i32) {
        self.record_position_last = self.record_position;
        self.record_position = goal_position;

        let moved = i64::from(self.record_position) - i64::from(self.record_position_last);
        self.est_velocity = single_pole(
            &mut self.est_position_integral,
            moved * i64::from(freq),
            self.est_velocity,
            SMOOTHING_SHIFT,
        );
        self.est_position = self.record_position;

        self.go_position = self.est_position;
        self.go_velocity = self.est_velocity;
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

    #[test]
    fn steady_pulse_train_settles_to_pulse_rate() {
        let mut t = PositionInterpolator::default();
        t.new_task(0, 0);
        let mut goal = 0;
        for _ in 0..5_000 {
            goal += 1;
            t.calc_soft_goal(goal, 20_000);
        }
        assert_eq!(t.go_position(), 5_000);
        assert_eq!(t.go_velocity(), 20_000);
    }

    #[test]
    fn first_pulse_is_smoothed() {
        let mut t = PositionInterpolator::default();
        t.new_task(100, 0);
        t.calc_soft_goal(101, 20_000);
        assert_eq!(t.go_position(), 101);
        assert_eq!(t.go_velocity(), 20_000 >> 6);
    }

    #[test]
    fn velocity_decays_when_pulses_stop() {
        let mut t = PositionInterpolator::default();
        t.new_task(0, 64_000);
        for _ in 0..2_000 {
            t.calc_soft_goal(0, 20_000);
        }
        assert_eq!(t.go_velocity(), 0);
    }
}
