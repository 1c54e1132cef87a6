//! Control modes, the request/running switch, and the derived activity state.

/// Operating mode selected by the command layer.
///
/// `Command*` modes take set-points from the command interface, `Pwm*`
/// from a PWM input; both families share trackers and control laws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    #[default]
    Stop,
    CommandPosition,
    CommandVelocity,
    CommandCurrent,
    CommandTrajectory,
    PwmPosition,
    PwmVelocity,
    PwmCurrent,
    StepDir,
}

/// Which control law a mode drives the coils with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlLaw {
    /// Coils released.
    Release,
    /// Current set-point straight to the FOC vector.
    Current,
    /// PID on velocity error.
    Velocity,
    /// DCE on position and velocity error.
    Position,
}

impl Mode {
    pub const ALL: [Self; 9] = [
        Self::Stop,
        Self::CommandPosition,
        Self::CommandVelocity,
        Self::CommandCurrent,
        Self::CommandTrajectory,
        Self::PwmPosition,
        Self::PwmVelocity,
        Self::PwmCurrent,
        Self::StepDir,
    ];

    pub const fn law(self) -> ControlLaw {
        match self {
            Self::Stop => ControlLaw::Release,
            Self::CommandCurrent | Self::PwmCurrent => ControlLaw::Current,
            Self::CommandVelocity | Self::PwmVelocity => ControlLaw::Velocity,
            Self::CommandPosition
            | Self::PwmPosition
            | Self::CommandTrajectory
            | Self::StepDir => ControlLaw::Position,
        }
    }

    pub const fn is_current(self) -> bool {
        matches!(self.law(), ControlLaw::Current)
    }

    /// Name used in configuration files and CLI flags.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::CommandPosition => "command_position",
            Self::CommandVelocity => "command_velocity",
            Self::CommandCurrent => "command_current",
            Self::CommandTrajectory => "command_trajectory",
            Self::PwmPosition => "pwm_position",
            Self::PwmVelocity => "pwm_velocity",
            Self::PwmCurrent => "pwm_current",
            Self::StepDir => "step_dir",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("unknown mode '{s}'"))
    }
}

/// Requested vs. running mode.
///
/// A request only takes effect when `apply` runs inside the tick, which
/// reports the switch so the caller can reseed the new tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModeSwitch {
    requested: Mode,
    running: Mode,
}

impl ModeSwitch {
    pub const fn new(requested: Mode) -> Self {
        Self {
            requested,
            running: Mode::Stop,
        }
    }

    pub fn request(&mut self, mode: Mode) {
        self.requested = mode;
    }

    pub const fn requested(&self) -> Mode {
        self.requested
    }

    pub const fn running(&self) -> Mode {
        self.running
    }

    /// Promote the requested mode. Returns the new mode when it differs from
    /// the one that was running; a repeated request for the running mode is
    /// a no-op.
    pub fn apply(&mut self) -> Option<Mode> {
        if self.running == self.requested {
            return None;
        }
        tracing::trace!(from = %self.running, to = %self.requested, "mode switch");
        self.running = self.requested;
        Some(self.running)
    }
}

/// Read-only summary of what the motor is doing, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Activity {
    /// No valid calibration table; torque is inhibited.
    NoCalib,
    #[default]
    Stop,
    /// Soft goal still moving toward the hard goal.
    Running,
    /// Soft goal reached the hard goal.
    Finish,
    /// Output saturated at rated current for the debounce time.
    Overload,
    /// Stall latched; torque is inhibited until cleared.
    Stall,
}

impl Activity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoCalib => "no_calib",
            Self::Stop => "stop",
            Self::Running => "running",
            Self::Finish => "finish",
            Self::Overload => "overload",
            Self::Stall => "stall",
        }
    }
}

impl std::fmt::Display for Activity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_request_does_not_switch() {
        let mut sw = ModeSwitch::new(Mode::CommandVelocity);
        assert_eq!(sw.apply(), Some(Mode::CommandVelocity));
        sw.request(Mode::CommandVelocity);
        assert_eq!(sw.apply(), None);
        assert_eq!(sw.running(), Mode::CommandVelocity);
    }

    #[test]
    fn request_takes_effect_only_on_apply() {
        let mut sw = ModeSwitch::new(Mode::Stop);
        sw.request(Mode::StepDir);
        assert_eq!(sw.running(), Mode::Stop);
        assert_eq!(sw.requested(), Mode::StepDir);
        assert_eq!(sw.apply(), Some(Mode::StepDir));
    }

    #[test]
    fn names_round_trip() {
        for m in Mode::ALL {
            assert_eq!(m.as_str().parse::<Mode>(), Ok(m));
        }
        assert!("warp".parse::<Mode>().is_err());
    }

    #[test]
    fn laws_group_modes() {
        assert!(Mode::PwmCurrent.is_current());
        assert_eq!(Mode::CommandTrajectory.law(), ControlLaw::Position);
        assert_eq!(Mode::PwmVelocity.law(), ControlLaw::Velocity);
        assert_eq!(Mode::Stop.law(), ControlLaw::Release);
    }
}
