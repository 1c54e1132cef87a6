//! Runtime configuration in control-loop units.
//!
//! These are the structs the tick reads. They are separate from the
//! TOML-deserialized config in `joint_config`; see `conversions`.

use crate::consts::{STALL_VELOCITY, SUBDIVIDE_STEPS};
use crate::mode::Mode;

/// Motion limits and calibration drive strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionParams {
    /// Rectified angle treated as position zero (subdivided steps).
    pub encoder_home_offset: i32,
    /// Current used for the open-loop calibration sweep (mA).
    pub calibration_current: i32,
    /// Output current clamp for every control law (mA).
    pub rated_current: i32,
    /// Velocity clamp (steps/s).
    pub rated_velocity: i32,
    /// Acceleration of the position/velocity trackers (steps/s²).
    pub rated_velocity_acc: i32,
    /// Ramp of the current tracker (mA/s).
    pub rated_current_acc: i32,
}

impl Default for MotionParams {
    fn default() -> Self {
        Self {
            encoder_home_offset: 0,
            calibration_current: 2000,
            rated_current: 1000,
            rated_velocity: 30 * SUBDIVIDE_STEPS,
            rated_velocity_acc: 100 * SUBDIVIDE_STEPS,
            rated_current_acc: 2000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PidGains {
    pub kp: i32,
    pub ki: i32,
    pub kd: i32,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 5,
            ki: 30,
            kd: 0,
        }
    }
}

/// Gains of the dual-error (position + velocity) law.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DceGains {
    pub kp: i32,
    pub kv: i32,
    pub ki: i32,
    pub kd: i32,
}

impl Default for DceGains {
    fn default() -> Self {
        Self {
            kp: 200,
            kv: 80,
            ki: 300,
            kd: 250,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControllerGains {
    pub pid: PidGains,
    pub dce: DceGains,
    pub stall_protect: bool,
}

/// One piece of the velocity -> lead-angle map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeadSegment {
    /// |velocity| (steps/s) where the piece starts.
    pub start: i32,
    /// Lead per steps/s in Q20.
    pub slope_q20: i32,
    /// Lead at `start` (steps).
    pub base: i32,
}

/// Piecewise-linear sensor-latency compensation.
///
/// Below the first segment's start the lead is zero. The map is odd:
/// negative velocities mirror the positive side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadCompensation {
    pub segments: Vec<LeadSegment>,
    pub limit: i32,
}

impl Default for LeadCompensation {
    fn default() -> Self {
        // Breakpoints measured on DPS-series sensors.
        Self {
            segments: vec![
                LeadSegment {
                    start: 100_000,
                    slope_q20: 262,
                    base: 0,
                },
                LeadSegment {
                    start: 1_300_000,
                    slope_q20: 105,
                    base: 300,
                },
                LeadSegment {
                    start: 2_200_000,
                    slope_q20: 52,
                    base: 390,
                },
            ],
            limit: 430,
        }
    }
}

impl LeadCompensation {
    /// No lead at any velocity.
    pub fn disabled() -> Self {
        Self {
            segments: Vec::new(),
            limit: 0,
        }
    }

    /// Lead (steps) to add to the measured position at velocity `v`.
    pub fn lead(&self, v: i32) -> i32 {
        let mag = i64::from(v).abs();
        let Some(seg) = self.segments.iter().rev().find(|s| mag >= i64::from(s.start)) else {
            return 0;
        };
        let limit = i64::from(self.limit);
        let lead = if v < 0 {
            // `>>` floors, so this side rounds away from zero.
            (((i64::from(v) + i64::from(seg.start)) * i64::from(seg.slope_q20)) >> 20)
                - i64::from(seg.base)
        } else {
            (((i64::from(v) - i64::from(seg.start)) * i64::from(seg.slope_q20)) >> 20)
                + i64::from(seg.base)
        };
        crate::fixed_point::saturate_i32(lead.clamp(-limit, limit))
    }
}

/// Settings of the trajectory (streamed set-point) tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrajectoryCfg {
    /// Longest gap between set-points before braking to a stop (ms).
    pub update_timeout_ms: i32,
    /// Deceleration after a timeout; `None` uses `rated_velocity_acc`.
    pub slow_down_acc: Option<i32>,
}

impl Default for TrajectoryCfg {
    fn default() -> Self {
        Self {
            update_timeout_ms: 200,
            slow_down_acc: None,
        }
    }
}

/// Stall and overload detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultCfg {
    /// How long a condition must hold before its flag latches (µs).
    pub debounce_us: i32,
    /// |velocity| under which saturated current counts as a stall.
    pub stall_velocity: i32,
}

impl Default for FaultCfg {
    fn default() -> Self {
        Self {
            debounce_us: 1_000_000,
            stall_velocity: STALL_VELOCITY,
        }
    }
}

/// Power-on behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootCfg {
    pub default_mode: Mode,
    pub enable_motor_on_boot: bool,
}

impl Default for BootCfg {
    fn default() -> Self {
        Self {
            default_mode: Mode::CommandPosition,
            enable_motor_on_boot: false,
        }
    }
}

/// Everything the motor needs besides its hardware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotorConfig {
    pub motion: MotionParams,
    pub gains: ControllerGains,
    pub lead: LeadCompensation,
    pub trajectory: TrajectoryCfg,
    pub faults: FaultCfg,
    pub boot: BootCfg,
    /// Velocity restored when a timed move turns out infeasible (steps/s).
    pub velocity_limit: i32,
}

impl Default for MotorConfig {
    fn default() -> Self {
        let motion = MotionParams::default();
        Self {
            velocity_limit: motion.rated_velocity,
            motion,
            gains: ControllerGains::default(),
            lead: LeadCompensation::default(),
            trajectory: TrajectoryCfg::default(),
            faults: FaultCfg::default(),
            boot: BootCfg::default(),
        }
    }
}

impl MotorConfig {
    /// Check the invariants the tick relies on.
    pub fn validate(&self) -> Result<(), &'static str> {
        let m = &self.motion;
        if m.rated_current <= 0 {
            return Err("rated_current must be > 0");
        }
        if m.rated_velocity <= 0 {
            return Err("rated_velocity must be > 0");
        }
        if m.rated_velocity_acc <= 0 {
            return Err("rated_velocity_acc must be > 0");
        }
        if m.rated_current_acc <= 0 {
            return Err("rated_current_acc must be > 0");
        }
        if m.calibration_current <= 0 {
            return Err("calibration_current must be > 0");
        }
        if !(0..SUBDIVIDE_STEPS).contains(&m.encoder_home_offset) {
            return Err("encoder_home_offset must be within one revolution");
        }
        if self.trajectory.update_timeout_ms <= 0 {
            return Err("trajectory update timeout must be > 0");
        }
        if self.trajectory.slow_down_acc.is_some_and(|a| a <= 0) {
            return Err("trajectory slow-down acceleration must be > 0");
        }
        if self.faults.debounce_us <= 0 {
            return Err("fault debounce must be > 0");
        }
        if self.lead.limit < 0 {
            return Err("lead limit must be >= 0");
        }
        if self
            .lead
            .segments
            .windows(2)
            .any(|w| w[1].start <= w[0].start)
        {
            return Err("lead segments must be sorted by start velocity");
        }
        if self.velocity_limit <= 0 {
            return Err("velocity_limit must be > 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0)]
    #[case(99_999, 0)]
    #[case(-99_999, 0)]
    #[case(100_000, 0)]
    #[case(1_300_000, 300)]
    #[case(2_200_000, 390)]
    #[case(100_000_000, 430)]
    #[case(-100_000_000, -430)]
    fn default_lead_breakpoints(#[case] v: i32, #[case] want: i32) {
        assert_eq!(LeadCompensation::default().lead(v), want);
    }

    #[test]
    fn lead_interpolates_within_first_segment() {
        let lead = LeadCompensation::default();
        // (1_100_000 * 262) >> 20 = 274
        assert_eq!(lead.lead(1_200_000), 274);
        // negative side floors: (-1_100_000 * 262) >> 20 = -275
        assert_eq!(lead.lead(-1_200_000), -275);
    }

    #[test]
    fn disabled_lead_is_zero() {
        assert_eq!(LeadCompensation::disabled().lead(5_000_000), 0);
    }

    #[test]
    fn defaults_validate() {
        assert!(MotorConfig::default().validate().is_ok());
    }

    #[test]
    fn unsorted_lead_segments_are_rejected() {
        let mut cfg = MotorConfig::default();
        cfg.lead.segments.swap(0, 1);
        assert!(cfg.validate().is_err());
    }
}
