#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Closed-loop joint control (hardware-agnostic).
//!
//! This crate turns a magnetic angle sensor and a two-phase current driver
//! into a position/velocity/current servo. All hardware interactions go
//! through `joint_traits::AngleSensor`, `joint_traits::Driver` and
//! `joint_traits::PersistentTable`.
//!
//! ## Architecture
//!
//! - **Encoder**: raw angle plus the persisted correction table (`encoder`)
//! - **Planner**: five acceleration-bounded set-point trackers (`planner`)
//! - **Controller**: live state, current/PID/DCE laws, stall and overload (`controller`)
//! - **Motor**: the per-tick sequence and the command surface (`motor`)
//! - **Calibrator**: table generation from a two-way sweep (`calibrator`)
//! - **Runner**: tick/poll loop for host execution (`runner`)
//!
//! ## Fixed-Point Arithmetic
//!
//! Positions are `i32` subdivided steps (51 200 per turn), velocities steps/s,
//! currents mA. Per-tick integration carries its remainder explicitly; see
//! `fixed_point` for the rounding convention at each site.
//!
//! ## Errors
//!
//! The tick never fails. Builders, calibration commits and table I/O return
//! `eyre::Result` with typed `thiserror` errors inside.

pub mod atomic;
pub mod builder;
pub mod calibrator;
pub mod config;
pub mod consts;
pub mod controller;
pub mod conversions;
pub mod encoder;
pub mod error;
pub mod fixed_point;
pub mod hw_error;
pub mod mocks;
pub mod mode;
pub mod motor;
pub mod planner;
pub mod runner;

pub use builder::{DynMotor, Missing, MotorBuilder, Set, build_motor};
pub use calibrator::{CalibrationOutcome, CalibrationState, EncoderCalibrator, build_table};
pub use config::{
    BootCfg, ControllerGains, DceGains, FaultCfg, LeadCompensation, LeadSegment, MotionParams,
    MotorConfig, PidGains, TrajectoryCfg,
};
pub use controller::{Controller, MotorState};
pub use encoder::{Encoder, table_is_valid};
pub use error::{BuildError, CalibrationError, CoreError, Report, Result};
pub use mode::{Activity, ControlLaw, Mode, ModeSwitch};
pub use motor::Motor;
pub use planner::MotionPlanner;
pub use runner::Runner;
