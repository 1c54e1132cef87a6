//! Per-tick orchestration of encoder, controller, planner and driver.

use joint_traits::{AngleSensor, Driver, PersistentTable};

use crate::config::{ControllerGains, MotorConfig};
use crate::controller::{Controller, MotorState};
use crate::encoder::Encoder;
use crate::error::{BuildError, Result};
use crate::mode::{Activity, Mode};
use crate::planner::MotionPlanner;

/// One closed-loop joint.
///
/// Everything is owned by value; the command methods are meant to be called
/// between ticks and take effect on the next `tick()`.
#[derive(Debug)]
pub struct Motor<S, D, T> {
    encoder: Encoder<S, T>,
    driver: D,
    controller: Controller,
    planner: MotionPlanner,
    config: MotorConfig,
}

impl<S, D, T> Motor<S, D, T>
where
    S: AngleSensor,
    D: Driver,
    T: PersistentTable,
{
    /// Assemble a motor. Call `init()` before the first tick.
    pub fn new(encoder: Encoder<S, T>, driver: D, config: MotorConfig) -> Self {
        let planner = MotionPlanner::new(&config.motion, &config.trajectory);
        let controller = Controller::new(&config);
        Self {
            encoder,
            driver,
            controller,
            planner,
            config,
        }
    }

    /// Boot sequence: re-validate the table and reset all live state.
    pub fn init(&mut self) {
        let calibrated = self.encoder.init();
        self.planner
            .configure(&self.config.motion, &self.config.trajectory);
        self.controller.init(&self.config);
        tracing::info!(
            calibrated,
            requested = %self.controller.state().mode_requested(),
            "motor initialized"
        );
    }

    /// One control period.
    pub fn tick(&mut self) {
        let angle = self.encoder.update_angle();
        self.close_loop_tick(angle);
    }

    fn close_loop_tick(&mut self, angle: i32) {
        if !self.controller.is_initialized() {
            self.controller
                .seed(angle, self.config.motion.encoder_home_offset);
            return;
        }

        let freq = self.planner.frequency;
        self.controller
            .update_estimate(angle, &self.config.lead, freq);

        let calibrated = self.encoder.is_calibrated();
        self.controller
            .drive(calibrated, &self.config, &mut self.driver);

        if self.controller.state_mut().modes.apply().is_some() {
            self.controller.state_mut().soft_new_curve = true;
        }

        self.controller.clamp_goals(&self.config.motion);

        let s = self.controller.state_mut();
        if (s.soft_disable && !s.goal_disable) || (s.soft_brake && !s.goal_brake) {
            s.soft_new_curve = true;
        }

        if self.controller.state().soft_new_curve {
            self.controller.state_mut().soft_new_curve = false;
            self.controller.clear_integral();
            self.controller.clear_stall_flag();
            self.reseed_tracker();
        }

        self.update_soft_goal();

        let s = self.controller.state_mut();
        s.soft_disable = s.goal_disable;
        s.soft_brake = s.goal_brake;

        self.controller
            .update_faults(&self.config, self.planner.period_us);
        self.controller.update_activity(calibrated);
    }

    /// Start the running mode's tracker from where the rotor is now.
    fn reseed_tracker(&mut self) {
        let s = self.controller.state_mut();
        let (p, v) = (s.est_position, s.est_velocity);
        match s.modes.running() {
            Mode::Stop => {}
            Mode::CommandPosition | Mode::PwmPosition => self.planner.position.new_task(p, v),
            Mode::CommandVelocity | Mode::PwmVelocity => self.planner.velocity.new_task(v),
            Mode::CommandCurrent | Mode::PwmCurrent => {
                self.planner.current.new_task(s.foc_current);
            }
            Mode::CommandTrajectory => self.planner.trajectory.new_task(p, v),
            Mode::StepDir => {
                self.planner.interpolator.new_task(p, v);
                s.goal_position = p;
            }
        }
    }

    /// Advance the running mode's tracker one tick and copy out its soft goal.
    fn update_soft_goal(&mut self) {
        let freq = self.planner.frequency;
        let period = self.planner.period_us;
        let rated_velocity = self.config.motion.rated_velocity;
        let s = self.controller.state_mut();
        match s.modes.running() {
            Mode::Stop => {}
            Mode::CommandPosition | Mode::PwmPosition => {
                let t = &mut self.planner.position;
                t.calc_soft_goal(s.goal_position, rated_velocity, freq);
                s.soft_position = t.go_position();
                s.soft_velocity = t.go_velocity();
            }
            Mode::CommandVelocity | Mode::PwmVelocity => {
                let t = &mut self.planner.velocity;
                t.calc_soft_goal(s.goal_velocity, freq);
                s.soft_velocity = t.go_velocity();
            }
            Mode::CommandCurrent | Mode::PwmCurrent => {
                let t = &mut self.planner.current;
                t.calc_soft_goal(s.goal_current, freq);
                s.soft_current = t.go_current();
            }
            Mode::CommandTrajectory => {
                let t = &mut self.planner.trajectory;
                t.calc_soft_goal(s.goal_position, s.goal_velocity, freq, period);
                s.soft_position = t.go_position();
                s.soft_velocity = t.go_velocity();
            }
            Mode::StepDir => {
                let t = &mut self.planner.interpolator;
                t.calc_soft_goal(s.goal_position, freq);
                s.soft_position = t.go_position();
                s.soft_velocity = t.go_velocity();
            }
        }
    }

    // ── Commands ────────────────────────────────────────────────────────────

    pub fn set_mode(&mut self, mode: Mode) {
        self.controller.set_mode(mode);
    }

    /// Current set-point in mA, clamped to the rated current.
    pub fn set_current_setpoint(&mut self, current_ma: i32) {
        self.controller
            .set_current_setpoint(current_ma, self.config.motion.rated_current);
    }

    /// Velocity set-point in steps/s, clamped to the rated velocity.
    pub fn set_velocity_setpoint(&mut self, velocity: i32) {
        self.controller
            .set_velocity_setpoint(velocity, self.config.motion.rated_velocity);
    }

    /// Position set-point in steps relative to home.
    pub fn set_position_setpoint(&mut self, position: i32) {
        self.controller
            .set_position_setpoint(position, self.config.motion.encoder_home_offset);
    }

    /// Streamed `(position, velocity)` set-point for trajectory mode.
    pub fn add_trajectory_setpoint(&mut self, position: i32, velocity: i32) {
        let home = self.config.motion.encoder_home_offset;
        let rated = self.config.motion.rated_velocity;
        self.controller.set_position_setpoint(position, home);
        self.controller.set_velocity_setpoint(velocity, rated);
    }

    /// Step/dir input: move the hard goal by `steps` pulses.
    pub fn add_step_pulses(&mut self, steps: i32) {
        self.controller.add_step_pulses(steps);
    }

    pub fn set_disable(&mut self, disable: bool) {
        self.controller.set_disable(disable);
    }

    pub fn set_brake(&mut self, brake: bool) {
        self.controller.set_brake(brake);
    }

    pub fn clear_stall_flag(&mut self) {
        self.controller.clear_stall_flag();
    }

    /// Make the current position the new home. Returns the stored offset.
    pub fn apply_position_as_home_offset(&mut self) -> i32 {
        let offset = self.controller.position_as_home_offset();
        self.config.motion.encoder_home_offset = offset;
        tracing::info!(offset, "home offset updated");
        offset
    }

    /// Move to `position` (relative to home) so that a trapezoidal profile
    /// under the rated acceleration lands in `seconds`.
    ///
    /// Returns false when no cruise velocity up to the velocity limit can do
    /// it; the move still starts, at the velocity limit.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn set_position_setpoint_with_time(&mut self, position: i32, seconds: f32) -> bool {
        let home = self.config.motion.encoder_home_offset;
        let goal = i64::from(position) + i64::from(home);
        let delta = (goal - i64::from(self.controller.state().real_position)).abs() as f64;
        let t = f64::from(seconds.max(0.0));
        let a = f64::from(self.config.motion.rated_velocity_acc);
        let limit = self.config.velocity_limit;

        let reachable = a * t * t / 4.0;
        let cruise = if delta > reachable {
            None
        } else {
            let v = (t * a - a * (t * t - 4.0 * delta / a).max(0.0).sqrt()) / 2.0;
            (v <= f64::from(limit)).then_some(v)
        };

        let feasible = cruise.is_some();
        self.config.motion.rated_velocity = match cruise {
            Some(v) => (v as i32).clamp(1, limit),
            None => {
                tracing::debug!(position, seconds, "timed move infeasible; using velocity limit");
                limit
            }
        };
        self.controller.set_position_setpoint(position, home);
        feasible
    }

    /// Steps/s² used by the velocity and position trackers.
    pub fn set_velocity_acc(&mut self, acc: i32) {
        self.config.motion.rated_velocity_acc = acc;
        self.planner.velocity.set_velocity_acc(acc);
        self.planner.position.set_velocity_acc(acc);
        if self.config.trajectory.slow_down_acc.is_none() {
            self.planner.trajectory.set_slow_down_acc(acc);
        }
    }

    /// mA/s used by the current tracker.
    pub fn set_current_acc(&mut self, acc: i32) {
        self.config.motion.rated_current_acc = acc;
        self.planner.current.set_current_acc(acc);
    }

    pub fn set_gains(&mut self, gains: ControllerGains) {
        self.config.gains = gains;
    }

    /// Replace the configuration after validating it.
    pub fn update_config(&mut self, config: MotorConfig) -> Result<()> {
        config
            .validate()
            .map_err(|msg| eyre::Report::new(BuildError::InvalidConfig(msg)))?;
        self.planner.configure(&config.motion, &config.trajectory);
        self.config = config;
        Ok(())
    }

    // ── Telemetry ───────────────────────────────────────────────────────────

    /// Position in turns from home; `lap` selects the single-turn value.
    pub fn position_turns(&self, lap: bool) -> f32 {
        self.controller
            .position_turns(lap, self.config.motion.encoder_home_offset)
    }

    pub fn velocity_turns(&self) -> f32 {
        self.controller.velocity_turns()
    }

    pub fn foc_current_amps(&self) -> f32 {
        self.controller.foc_current_amps()
    }

    pub fn state(&self) -> MotorState {
        *self.controller.state()
    }

    pub fn activity(&self) -> Activity {
        self.controller.state().activity
    }

    pub fn mode_running(&self) -> Mode {
        self.controller.state().mode_running()
    }

    pub fn mode_requested(&self) -> Mode {
        self.controller.state().mode_requested()
    }

    // ── Parts ───────────────────────────────────────────────────────────────

    pub fn config(&self) -> &MotorConfig {
        &self.config
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub(crate) fn controller_mut(&mut self) -> &mut Controller {
        &mut self.controller
    }

    pub fn planner(&self) -> &MotionPlanner {
        &self.planner
    }

    pub fn encoder(&self) -> &Encoder<S, T> {
        &self.encoder
    }

    pub(crate) fn encoder_mut(&mut self) -> &mut Encoder<S, T> {
        &mut self.encoder
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub(crate) fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Split the encoder and driver apart at the same time.
    pub(crate) fn encoder_and_driver(&mut self) -> (&mut Encoder<S, T>, &mut D) {
        (&mut self.encoder, &mut self.driver)
    }
}
