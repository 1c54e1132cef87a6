//! Fixed numbers of the control loop and the 1.8° stepper geometry.

/// Control tick rate (Hz).
pub const CONTROL_FREQUENCY: i32 = 20_000;
/// Control tick period (µs).
pub const CONTROL_PERIOD_US: i32 = 1_000_000 / CONTROL_FREQUENCY;

/// Full steps per mechanical revolution.
pub const HARD_STEPS: i32 = 200;
/// Micro-steps per full step; a quarter electrical cycle.
pub const SOFT_DIVIDE: i32 = 256;
/// Subdivided steps per revolution, the unit of every position quantity.
pub const SUBDIVIDE_STEPS: i32 = HARD_STEPS * SOFT_DIVIDE;

/// Raw encoder counts per revolution (14 bits).
pub const ENCODER_RESOLUTION: i32 = 16_384;

/// Raw readings averaged per calibration point.
pub const SAMPLE_COUNTS_PER_STEP: usize = 16;
/// Subdivided steps advanced per tick while pre-rotating.
pub const AUTO_CALIB_SPEED: i32 = 2;
/// Subdivided steps advanced per tick while measuring.
pub const FINE_TUNE_CALIB_SPEED: i32 = 1;
/// Full steps overshot before measuring backwards, to take up backlash.
pub const BACKWARD_RETURN_STEPS: i32 = 20;

/// Value of an erased flash entry.
pub const ERASED_ENTRY: u16 = 0xFFFF;

/// Velocity below which a saturated rotor counts as stalled (steps/s).
pub const STALL_VELOCITY: i32 = SUBDIVIDE_STEPS / 5;

/// Clamp on the DCE position error (1/16 turn).
pub const DCE_POSITION_ERROR_LIMIT: i32 = 3200;
/// Clamp on the DCE velocity error (after `>> 7`).
pub const DCE_VELOCITY_ERROR_LIMIT: i32 = 4000;
/// Clamp on the PID velocity error.
pub const PID_VELOCITY_ERROR_LIMIT: i32 = 1024 * 1024;
