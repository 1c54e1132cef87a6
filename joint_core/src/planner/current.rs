use crate::fixed_point::Integrator;

/// Ramps the commanded current (mA) at a bounded rate.
#[derive(Debug, Clone, Default)]
pub struct CurrentTracker {
    current_acc: i32,
    integral: Integrator,
    track_current: i32,
    go_current: i32,
}

impl CurrentTracker {
    /// Ramp rate in mA/s.
    pub fn set_current_acc(&mut self, acc: i32) {
        self.current_acc = acc;
    }

    pub fn current_acc(&self) -> i32 {
        self.current_acc
    }

    pub fn new_task(&mut self, real_current: i32) {
        self.integral.reset();
        self.track_current = real_current;
    }

    pub fn calc_soft_goal(&mut self, goal_current: i32, freq: i32) {
        super::ramp(
            &mut self.track_current,
            &mut self.integral,
            goal_current,
            self.current_acc,
            freq,
        );
        self.go_current = self.track_current;
    }

    pub fn go_current(&self) -> i32 {
        self.go_current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramps_up_one_tenth_ma_per_tick() {
        let mut t = CurrentTracker::default();
        t.set_current_acc(2000);
        t.new_task(0);
        let mut last = 0;
        let mut ticks = 0;
        while t.go_current() != 1000 {
            t.calc_soft_goal(1000, 20_000);
            let now = t.go_current();
            assert!(now >= last && now - last <= 1);
            last = now;
            ticks += 1;
            assert!(ticks <= 10_000, "did not converge");
        }
        assert_eq!(ticks, 10_000);
        for _ in 0..100 {
            t.calc_soft_goal(1000, 20_000);
            assert_eq!(t.go_current(), 1000);
        }
    }

    #[test]
    fn reversal_stops_at_zero_first() {
        let mut t = CurrentTracker::default();
        t.set_current_acc(400_000);
        t.new_task(15);
        let seq: Vec<i32> = (0..5)
            .map(|_| {
                t.calc_soft_goal(-50, 20_000);
                t.go_current()
            })
            .collect();
        assert_eq!(seq, vec![0, -20, -40, -50, -50]);
    }

    #[test]
    fn negative_ramp_toward_negative_goal_does_not_overshoot() {
        let mut t = CurrentTracker::default();
        t.set_current_acc(200_000);
        t.new_task(-500);
        for _ in 0..1000 {
            t.calc_soft_goal(-100, 20_000);
            assert!(t.go_current() <= -100);
        }
        assert_eq!(t.go_current(), -100);
    }
}
