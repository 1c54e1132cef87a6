//! CLI argument definitions and shared statics.

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "joint", version, about = "Closed-loop joint simulator")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/joint_config.toml")]
    pub config: PathBuf,

    /// Encoder calibration table CSV (strict `raw,angle` header)
    #[arg(long, value_name = "FILE")]
    pub calibration: Option<PathBuf>,

    /// Print results and errors as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); overrides [logging] level
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// How the simulated magnet/sensor pair is mounted.
#[derive(Args, Debug, Clone, Copy)]
pub struct SimArgs {
    /// Raw-count offset between rotor zero and sensor zero
    #[arg(long, value_name = "COUNTS", default_value_t = 0)]
    pub sensor_offset: u16,
    /// Amplitude of the once-per-turn sensor error (raw counts)
    #[arg(long, value_name = "COUNTS", default_value_t = 0.0)]
    pub sensor_runout: f64,
    /// Sensor counts down when the rotor turns forward
    #[arg(long, action = ArgAction::SetTrue)]
    pub sensor_reversed: bool,
    /// Give up on a calibration sweep after this many ticks
    #[arg(long, value_name = "TICKS", default_value_t = 400_000)]
    pub max_calibration_ticks: u64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum MoveMode {
    /// Go to `--target` turns (relative to home)
    Position,
    /// Spin at `--target` turns per second
    Velocity,
    /// Push `--target` mA of torque current
    Current,
    /// Feed `--target` turns worth of step pulses
    StepDir,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Calibrate the simulated encoder and export the table as CSV
    Calibrate {
        #[command(flatten)]
        sim: SimArgs,
        /// Where to write the table
        #[arg(long, value_name = "FILE", default_value = "calibration.csv")]
        out: PathBuf,
    },
    /// Run one move on the simulated joint and print a summary
    Run {
        #[command(flatten)]
        sim: SimArgs,
        #[arg(long, value_enum, default_value_t = MoveMode::Position)]
        mode: MoveMode,
        /// Goal in the mode's unit (turns, turns/s, or mA)
        #[arg(long, allow_negative_numbers = true)]
        target: f32,
        /// Simulated time to run
        #[arg(long, value_name = "SECONDS", default_value_t = 2.0)]
        seconds: f32,
        /// Position mode only: arrive after this many seconds instead of at rated velocity
        #[arg(long, value_name = "SECONDS")]
        move_time: Option<f32>,
        /// Pace the simulation on the wall clock instead of running flat out
        #[arg(long, action = ArgAction::SetTrue)]
        realtime: bool,
    },
    /// Validate the config (and calibration table, if given) without moving anything
    SelfCheck,
}
