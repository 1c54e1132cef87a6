//! Live motor state, control laws, and fault detection.
//!
//! `Controller` owns every quantity that changes once per tick. It never
//! talks to the encoder or planner itself; `Motor::tick` feeds it the new
//! angle and the trackers' soft goals in a fixed order.

use joint_traits::Driver;

use crate::config::{ControllerGains, FaultCfg, LeadCompensation, MotionParams, MotorConfig};
use crate::consts::{
    DCE_POSITION_ERROR_LIMIT, DCE_VELOCITY_ERROR_LIMIT, PID_VELOCITY_ERROR_LIMIT, SOFT_DIVIDE,
    SUBDIVIDE_STEPS,
};
use crate::fixed_point::{clamp_symmetric, cycle_subtract, saturate_i32, shift_carry, single_pole};
use crate::mode::{Activity, ControlLaw, Mode, ModeSwitch};

/// `>> 5` velocity estimate smoothing.
const VELOCITY_FILTER_SHIFT: u32 = 5;

/// Snapshot of everything the tick tracks.
///
/// Positions are in subdivided steps, velocities in steps/s, currents in mA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotorState {
    pub modes: ModeSwitch,
    pub activity: Activity,

    /// Encoder angle this tick, possibly shifted by one turn at seeding.
    pub real_lap_position: i32,
    pub real_lap_position_last: i32,
    /// Unwrapped position.
    pub real_position: i32,
    pub real_position_last: i32,

    pub est_velocity_integral: i64,
    pub est_velocity: i32,
    pub est_lead_position: i32,
    pub est_position: i32,
    pub est_error: i32,

    pub goal_position: i32,
    pub goal_velocity: i32,
    pub goal_current: i32,
    pub goal_disable: bool,
    pub goal_brake: bool,

    pub soft_position: i32,
    pub soft_velocity: i32,
    pub soft_current: i32,
    pub soft_disable: bool,
    pub soft_brake: bool,
    pub soft_new_curve: bool,

    pub foc_position: i32,
    pub foc_current: i32,

    pub stalled_time_us: i32,
    pub is_stalled: bool,
    /// Set by a calibration run; holds the stall latch until `init`.
    pub calibration_inhibit: bool,
    pub overload_time_us: i32,
    pub overload_flag: bool,
}

impl MotorState {
    pub fn mode_running(&self) -> Mode {
        self.modes.running()
    }

    pub fn mode_requested(&self) -> Mode {
        self.modes.requested()
    }
}

/// Working terms of the velocity PID, scaled by 2^10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PidState {
    pub v_error: i64,
    pub v_error_last: i64,
    pub output_kp: i64,
    pub output_ki: i64,
    pub output_kd: i64,
    pub integral_round: i64,
    pub output: i32,
}

/// Working terms of the DCE law, scaled by 2^10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DceState {
    pub p_error: i64,
    pub v_error: i64,
    pub output_kp: i64,
    pub output_ki: i64,
    pub output_kd: i64,
    pub integral_round: i64,
    pub output: i32,
}

/// Count up while `condition` holds; returns true once `time` has
/// reached `debounce_us`. Any tick without the condition restarts the count.
fn debounce(time: &mut i32, condition: bool, debounce_us: i32, period_us: i32) -> bool {
    if !condition {
        *time = 0;
        return false;
    }
    if *time >= debounce_us {
        true
    } else {
        *time = time.saturating_add(period_us);
        false
    }
}

#[derive(Debug, Clone, Default)]
pub struct Controller {
    state: MotorState,
    pid: PidState,
    dce: DceState,
    initialized: bool,
}

impl Controller {
    pub fn new(config: &MotorConfig) -> Self {
        let mut c = Self::default();
        c.init(config);
        c
    }

    /// Reset all live state. The first tick afterwards only seeds positions.
    pub fn init(&mut self, config: &MotorConfig) {
        let requested = if config.boot.enable_motor_on_boot {
            config.boot.default_mode
        } else {
            Mode::Stop
        };
        self.state = MotorState {
            modes: ModeSwitch::new(requested),
            activity: Activity::Stop,
            goal_position: config.motion.encoder_home_offset,
            ..MotorState::default()
        };
        self.pid = PidState::default();
        self.dce = DceState::default();
        self.initialized = false;
    }

    pub fn state(&self) -> &MotorState {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut MotorState {
        &mut self.state
    }

    pub fn pid(&self) -> &PidState {
        &self.pid
    }

    pub fn dce(&self) -> &DceState {
        &self.dce
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// First tick after `init`: place the rotor in the revolution nearest the
    /// home offset and start the unwrapped position there.
    pub fn seed(&mut self, rectified_angle: i32, home_offset: i32) {
        let half = SUBDIVIDE_STEPS / 2;
        let angle = if home_offset < half {
            if rectified_angle > home_offset + half {
                rectified_angle - SUBDIVIDE_STEPS
            } else {
                rectified_angle
            }
        } else if rectified_angle < home_offset - half {
            rectified_angle + SUBDIVIDE_STEPS
        } else {
            rectified_angle
        };
        let s = &mut self.state;
        s.real_lap_position = angle;
        s.real_lap_position_last = angle;
        s.real_position = angle;
        s.real_position_last = angle;
        self.initialized = true;
        tracing::debug!(angle, home_offset, "controller seeded");
    }

    /// Unwrap the new angle and refresh the velocity and lead estimates.
    pub fn update_estimate(&mut self, rectified_angle: i32, lead: &LeadCompensation, freq: i32) {
        let s = &mut self.state;
        s.real_lap_position_last = s.real_lap_position;
        s.real_lap_position = rectified_angle;
        let delta = cycle_subtract(s.real_lap_position, s.real_lap_position_last, SUBDIVIDE_STEPS);

        s.real_position_last = s.real_position;
        s.real_position = s.real_position.wrapping_add(delta);

        let moved = i64::from(s.real_position) - i64::from(s.real_position_last);
        s.est_velocity = single_pole(
            &mut s.est_velocity_integral,
            moved * i64::from(freq),
            s.est_velocity,
            VELOCITY_FILTER_SHIFT,
        );

        s.est_lead_position = lead.lead(s.est_velocity);
        s.est_position = s.real_position.saturating_add(s.est_lead_position);
        s.est_error = s.soft_position.saturating_sub(s.est_position);
    }

    pub fn clear_integral(&mut self) {
        self.pid.integral_round = 0;
        self.pid.output_ki = 0;
        self.dce.integral_round = 0;
        self.dce.output_ki = 0;
    }

    fn zero_outputs(&mut self) {
        self.clear_integral();
        self.state.foc_position = 0;
        self.state.foc_current = 0;
    }

    /// Drive the coils for this tick: release them when disabled, stalled or
    /// uncalibrated, short them when braking, otherwise run the mode's law.
    pub fn drive<D: Driver + ?Sized>(
        &mut self,
        calibrated: bool,
        config: &MotorConfig,
        driver: &mut D,
    ) {
        if self.state.is_stalled || self.state.soft_disable || !calibrated {
            self.zero_outputs();
            driver.sleep();
            return;
        }
        if self.state.soft_brake {
            self.zero_outputs();
            driver.brake();
            return;
        }
        let rated = config.motion.rated_current;
        match self.state.modes.running().law() {
            ControlLaw::Release => {
                self.zero_outputs();
                driver.sleep();
            }
            ControlLaw::Current => {
                let current = self.state.soft_current;
                self.current_to_output(current, driver);
            }
            ControlLaw::Velocity => {
                let speed = self.state.soft_velocity;
                self.pid_to_output(speed, &config.gains, rated, driver);
            }
            ControlLaw::Position => {
                let (location, speed) = (self.state.soft_position, self.state.soft_velocity);
                self.dce_to_output(location, speed, &config.gains, rated, driver);
            }
        }
    }

    /// Current law: put the field 90° ahead of (or behind) the rotor.
    pub fn current_to_output<D: Driver + ?Sized>(&mut self, current: i32, driver: &mut D) {
        let s = &mut self.state;
        s.foc_current = current;
        s.foc_position = match current.signum() {
            1 => s.est_position.saturating_add(SOFT_DIVIDE),
            -1 => s.est_position.saturating_sub(SOFT_DIVIDE),
            _ => s.est_position,
        };
        // 51200 is a whole number of electrical cycles, so folding into one
        // revolution keeps the electrical angle.
        let direction = s.foc_position.rem_euclid(SUBDIVIDE_STEPS).unsigned_abs();
        driver.set_foc_vector(direction, s.foc_current);
    }

    /// PID on velocity error.
    pub fn pid_to_output<D: Driver + ?Sized>(
        &mut self,
        speed: i32,
        gains: &ControllerGains,
        rated_current: i32,
        driver: &mut D,
    ) {
        let g = gains.pid;
        let limit = i64::from(PID_VELOCITY_ERROR_LIMIT);
        let ki_limit = i64::from(rated_current) << 10;
        let pid = &mut self.pid;

        pid.v_error_last = pid.v_error;
        pid.v_error = (i64::from(speed) - i64::from(self.state.est_velocity)).clamp(-limit, limit);
        pid.output_kp = i64::from(g.kp) * pid.v_error;

        let carry = shift_carry(&mut pid.integral_round, i64::from(g.ki) * pid.v_error, 10);
        pid.output_ki = (pid.output_ki + carry).clamp(-ki_limit, ki_limit);

        pid.output_kd = i64::from(g.kd) * (pid.v_error - pid.v_error_last);

        let sum = (pid.output_kp + pid.output_ki + pid.output_kd) >> 10;
        pid.output = clamp_symmetric(saturate_i32(sum), rated_current);
        let out = pid.output;
        self.current_to_output(out, driver);
    }

    /// DCE: position error and velocity error combined into one current.
    pub fn dce_to_output<D: Driver + ?Sized>(
        &mut self,
        location: i32,
        speed: i32,
        gains: &ControllerGains,
        rated_current: i32,
        driver: &mut D,
    ) {
        let g = gains.dce;
        let p_limit = i64::from(DCE_POSITION_ERROR_LIMIT);
        let v_limit = i64::from(DCE_VELOCITY_ERROR_LIMIT);
        let ki_limit = i64::from(rated_current) << 10;
        let dce = &mut self.dce;

        dce.p_error =
            (i64::from(location) - i64::from(self.state.est_position)).clamp(-p_limit, p_limit);
        dce.v_error = ((i64::from(speed) - i64::from(self.state.est_velocity)) >> 7)
            .clamp(-v_limit, v_limit);

        dce.output_kp = i64::from(g.kp) * dce.p_error;

        let drive = i64::from(g.ki) * dce.p_error + i64::from(g.kv) * dce.v_error;
        let carry = shift_carry(&mut dce.integral_round, drive, 7);
        dce.output_ki = (dce.output_ki + carry).clamp(-ki_limit, ki_limit);

        dce.output_kd = i64::from(g.kd) * dce.v_error;

        let sum = (dce.output_kp + dce.output_ki + dce.output_kd) >> 10;
        dce.output = clamp_symmetric(saturate_i32(sum), rated_current);
        let out = dce.output;
        self.current_to_output(out, driver);
    }

    /// Pull the hard goals back inside the rated limits.
    pub fn clamp_goals(&mut self, motion: &MotionParams) {
        let s = &mut self.state;
        s.goal_velocity = clamp_symmetric(s.goal_velocity, motion.rated_velocity);
        s.goal_current = clamp_symmetric(s.goal_current, motion.rated_current);
    }

    /// Stall and overload detectors.
    ///
    /// Stall: (current mode with any current, or output at rated current)
    /// while slower than `stall_velocity`, for `debounce_us`; only with stall
    /// protection on, and only cleared by command. Overload: output at rated
    /// current for `debounce_us` in any mode; clears itself on release.
    pub fn update_faults(&mut self, config: &MotorConfig, period_us: i32) {
        let FaultCfg {
            debounce_us,
            stall_velocity,
        } = config.faults;
        let rated = config.motion.rated_current;
        let s = &mut self.state;
        let current = s.foc_current.saturating_abs();
        let saturated = current == rated;

        if config.gains.stall_protect {
            let driving = (s.modes.running().is_current() && current != 0) || saturated;
            let blocked = driving && s.est_velocity.saturating_abs() < stall_velocity;
            if debounce(&mut s.stalled_time_us, blocked, debounce_us, period_us) && !s.is_stalled {
                s.is_stalled = true;
                tracing::warn!(current, velocity = s.est_velocity, "stall detected; torque cut");
            }
        }

        if debounce(&mut s.overload_time_us, saturated, debounce_us, period_us) {
            if !s.overload_flag {
                tracing::warn!(current, "overload: output saturated at rated current");
            }
            s.overload_flag = true;
        } else if !saturated {
            s.overload_flag = false;
        }
    }

    /// Derive `Activity`: NoCalib > Stop > Stall > Overload > Running/Finish.
    pub fn update_activity(&mut self, calibrated: bool) {
        let s = &mut self.state;
        let running = s.modes.running();
        s.activity = if !calibrated {
            Activity::NoCalib
        } else if running == Mode::Stop {
            Activity::Stop
        } else if s.is_stalled {
            Activity::Stall
        } else if s.overload_flag {
            Activity::Overload
        } else {
            let finished = match running {
                Mode::CommandPosition | Mode::PwmPosition => {
                    s.soft_position == s.goal_position && s.soft_velocity == 0
                }
                Mode::CommandVelocity | Mode::PwmVelocity => s.soft_velocity == s.goal_velocity,
                Mode::CommandCurrent | Mode::PwmCurrent => s.soft_current == s.goal_current,
                _ => true,
            };
            if finished {
                Activity::Finish
            } else {
                Activity::Running
            }
        };
    }

    // ── Command surface ─────────────────────────────────────────────────────

    pub fn set_mode(&mut self, mode: Mode) {
        self.state.modes.request(mode);
    }

    pub fn set_current_setpoint(&mut self, current: i32, rated_current: i32) {
        self.state.goal_current = clamp_symmetric(current, rated_current);
    }

    pub fn set_velocity_setpoint(&mut self, velocity: i32, rated_velocity: i32) {
        self.state.goal_velocity = clamp_symmetric(velocity, rated_velocity);
    }

    /// Position relative to home.
    pub fn set_position_setpoint(&mut self, position: i32, home_offset: i32) {
        self.state.goal_position = position.saturating_add(home_offset);
    }

    pub fn add_step_pulses(&mut self, steps: i32) {
        self.state.goal_position = self.state.goal_position.saturating_add(steps);
    }

    pub fn set_disable(&mut self, disable: bool) {
        self.state.goal_disable = disable;
    }

    pub fn set_brake(&mut self, brake: bool) {
        self.state.goal_brake = brake;
    }

    /// Clear a detected stall. A calibration hold survives until `init`.
    pub fn clear_stall_flag(&mut self) {
        self.state.stalled_time_us = 0;
        self.state.is_stalled = self.state.calibration_inhibit;
    }

    /// Inhibit torque for the rest of this boot: a calibration is driving
    /// the coils, or its result has not been loaded yet.
    pub fn hold_for_calibration(&mut self) {
        self.state.calibration_inhibit = true;
        self.state.is_stalled = true;
    }

    /// Current position folded into one revolution, for use as home offset.
    pub fn position_as_home_offset(&self) -> i32 {
        self.state.real_position.rem_euclid(SUBDIVIDE_STEPS)
    }

    // ── Telemetry ───────────────────────────────────────────────────────────

    #[allow(clippy::cast_precision_loss)]
    pub fn position_turns(&self, lap: bool, home_offset: i32) -> f32 {
        let p = if lap {
            self.state.real_lap_position
        } else {
            self.state.real_position
        };
        (i64::from(p) - i64::from(home_offset)) as f32 / SUBDIVIDE_STEPS as f32
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn velocity_turns(&self) -> f32 {
        self.state.est_velocity as f32 / SUBDIVIDE_STEPS as f32
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn foc_current_amps(&self) -> f32 {
        self.state.foc_current as f32 / 1000.0
    }
}
