use crate::fixed_point::Integrator;

/// Ramps the velocity set-point (steps/s) at a bounded acceleration.
#[derive(Debug, Clone, Default)]
pub struct VelocityTracker {
    velocity_acc: i32,
    integral: Integrator,
    track_velocity: i32,
    go_velocity: i32,
}

impl VelocityTracker {
    pub fn set_velocity_acc(&mut self, acc: i32) {
        self.velocity_acc = acc;
    }

    pub fn velocity_acc(&self) -> i32 {
        self.velocity_acc
    }

    pub fn new_task(&mut self, real_velocity: i32) {
        self.integral.reset();
        self.track_velocity = real_velocity;
    }

    pub fn calc_soft_goal(&mut self, goal_velocity: i32, freq: i32) {
        super::ramp(
            &mut self.track_velocity,
            &mut self.integral,
            goal_velocity,
            self.velocity_acc,
            freq,
        );
        self.go_velocity = self.track_velocity;
    }

    pub fn go_velocity(&self) -> i32 {
        self.go_velocity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decelerates_through_zero_into_reverse() {
        let mut t = VelocityTracker::default();
        t.set_velocity_acc(5_120_000);
        t.new_task(1000);
        let mut trace = Vec::new();
        for _ in 0..8 {
            t.calc_soft_goal(-700, 20_000);
            trace.push(t.go_velocity());
        }
        assert_eq!(trace, vec![744, 488, 232, 0, -256, -512, -700, -700]);
    }

    #[test]
    fn new_task_drops_partial_increment() {
        let mut t = VelocityTracker::default();
        t.set_velocity_acc(10_000);
        t.new_task(0);
        t.calc_soft_goal(100, 20_000);
        assert_eq!(t.go_velocity(), 0);
        t.new_task(0);
        t.calc_soft_goal(100, 20_000);
        // remainder from the first call was discarded
        assert_eq!(t.go_velocity(), 0);
        t.calc_soft_goal(100, 20_000);
        assert_eq!(t.go_velocity(), 1);
    }
}
