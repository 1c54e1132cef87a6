//! `From` implementations bridging `joint_config` types to `joint_core` types.
//!
//! The file format uses human units (rps, ms); the tick works in subdivided
//! steps and microseconds.

use crate::config::{
    BootCfg, ControllerGains, DceGains, FaultCfg, LeadCompensation, LeadSegment, MotionParams,
    MotorConfig, PidGains, TrajectoryCfg,
};
use crate::consts::{STALL_VELOCITY, SUBDIVIDE_STEPS};
use crate::mode::Mode;

/// Turns (per second, per second²) to subdivided steps, saturating.
#[allow(clippy::cast_possible_truncation)]
pub fn turns_to_steps(turns: f32) -> i32 {
    (f64::from(turns) * f64::from(SUBDIVIDE_STEPS)).round() as i32
}

// ── MotionParams ─────────────────────────────────────────────────────────────

impl From<&joint_config::MotionCfg> for MotionParams {
    fn from(c: &joint_config::MotionCfg) -> Self {
        Self {
            encoder_home_offset: c.encoder_home_offset,
            calibration_current: c.calibration_current_ma,
            rated_current: c.rated_current_ma,
            rated_velocity: turns_to_steps(c.rated_velocity_rps),
            rated_velocity_acc: turns_to_steps(c.rated_velocity_acc_rps2),
            rated_current_acc: c.rated_current_acc_ma_s,
        }
    }
}

// ── ControllerGains ──────────────────────────────────────────────────────────

impl From<&joint_config::Config> for ControllerGains {
    fn from(c: &joint_config::Config) -> Self {
        let (pid, dce) = (c.gains.pid, c.gains.dce);
        Self {
            pid: PidGains {
                kp: pid.kp,
                ki: pid.ki,
                kd: pid.kd,
            },
            dce: DceGains {
                kp: dce.kp,
                kv: dce.kv,
                ki: dce.ki,
                kd: dce.kd,
            },
            stall_protect: c.protection.stall_protect,
        }
    }
}

// ── LeadCompensation ─────────────────────────────────────────────────────────

impl From<&joint_config::LeadCompensationCfg> for LeadCompensation {
    fn from(c: &joint_config::LeadCompensationCfg) -> Self {
        Self {
            segments: c
                .segments
                .iter()
                .map(|s| LeadSegment {
                    start: s.velocity,
                    slope_q20: s.slope_q20,
                    base: s.base,
                })
                .collect(),
            limit: c.limit,
        }
    }
}

// ── TrajectoryCfg ────────────────────────────────────────────────────────────

impl From<&joint_config::TrajectoryCfg> for TrajectoryCfg {
    fn from(c: &joint_config::TrajectoryCfg) -> Self {
        Self {
            update_timeout_ms: i32::try_from(c.update_timeout_ms).unwrap_or(i32::MAX),
            slow_down_acc: c.slow_down_acc_rps2.map(turns_to_steps),
        }
    }
}

// ── FaultCfg ─────────────────────────────────────────────────────────────────

impl From<&joint_config::ProtectionCfg> for FaultCfg {
    fn from(c: &joint_config::ProtectionCfg) -> Self {
        Self {
            debounce_us: i32::try_from(u64::from(c.debounce_ms) * 1000).unwrap_or(i32::MAX),
            stall_velocity: STALL_VELOCITY,
        }
    }
}

// ── Mode / BootCfg ───────────────────────────────────────────────────────────

impl From<joint_config::BootMode> for Mode {
    fn from(m: joint_config::BootMode) -> Self {
        use joint_config::BootMode as B;
        match m {
            B::Stop => Self::Stop,
            B::CommandPosition => Self::CommandPosition,
            B::CommandVelocity => Self::CommandVelocity,
            B::CommandCurrent => Self::CommandCurrent,
            B::CommandTrajectory => Self::CommandTrajectory,
            B::PwmPosition => Self::PwmPosition,
            B::PwmVelocity => Self::PwmVelocity,
            B::PwmCurrent => Self::PwmCurrent,
            B::StepDir => Self::StepDir,
        }
    }
}

impl From<&joint_config::BootCfg> for BootCfg {
    fn from(c: &joint_config::BootCfg) -> Self {
        Self {
            default_mode: c.default_mode.into(),
            enable_motor_on_boot: c.enable_motor_on_boot,
        }
    }
}

// ── MotorConfig ──────────────────────────────────────────────────────────────

impl From<&joint_config::Config> for MotorConfig {
    fn from(c: &joint_config::Config) -> Self {
        let motion = MotionParams::from(&c.motion);
        Self {
            velocity_limit: motion.rated_velocity,
            motion,
            gains: ControllerGains::from(c),
            lead: LeadCompensation::from(&c.lead_compensation),
            trajectory: TrajectoryCfg::from(&c.trajectory),
            faults: FaultCfg::from(&c.protection),
            boot: BootCfg::from(&c.boot),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_agree_across_crates() {
        let from_file = MotorConfig::from(&joint_config::Config::default());
        assert_eq!(from_file, MotorConfig::default());
    }

    #[test]
    fn human_units_are_scaled() {
        let cfg = joint_config::load_toml(
            r#"
            [motion]
            rated_velocity_rps = 2.5
            rated_velocity_acc_rps2 = 0.5
            [protection]
            debounce_ms = 20
            [trajectory]
            slow_down_acc_rps2 = 1.0
            [boot]
            default_mode = "step_dir"
            "#,
        )
        .unwrap();
        let m = MotorConfig::from(&cfg);
        assert_eq!(m.motion.rated_velocity, 128_000);
        assert_eq!(m.velocity_limit, 128_000);
        assert_eq!(m.motion.rated_velocity_acc, 25_600);
        assert_eq!(m.faults.debounce_us, 20_000);
        assert_eq!(m.trajectory.slow_down_acc, Some(51_200));
        assert_eq!(m.boot.default_mode, Mode::StepDir);
    }
}
