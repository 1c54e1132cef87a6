//! Simulator assembly, calibration and move execution.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use eyre::WrapErr;
use joint_core::consts::{CONTROL_FREQUENCY, ENCODER_RESOLUTION, SUBDIVIDE_STEPS};
use joint_core::conversions::turns_to_steps;
use joint_core::{Activity, CalibrationOutcome, Mode, Motor, MotorConfig, Result, Runner};
use joint_hardware::{MemoryTable, SensorModel, SimDriver, SimSensor, SimulatedJoint};
use joint_traits::{ManualClock, MonotonicClock, PersistentTable};

use crate::cli::{MoveMode, SimArgs};

pub type SimRunner = Runner<SimSensor, SimDriver, MemoryTable>;

/// Ticks per pacing batch (5 ms of control time).
const BATCH: u32 = 100;

/// Build a motor on a fresh simulated joint and wrap it in a runner that
/// stops when `shutdown` is raised.
pub fn assemble(
    cfg: &MotorConfig,
    sim: &SimArgs,
    table: MemoryTable,
    shutdown: Arc<AtomicBool>,
) -> Result<(SimulatedJoint, SimRunner)> {
    let joint = SimulatedJoint::new(SensorModel {
        offset: sim.sensor_offset,
        error_amplitude: sim.sensor_runout,
        reversed: sim.sensor_reversed,
    });
    let motor: Motor<_, _, _> =
        joint_core::build_motor(joint.sensor(), joint.driver(), table, cfg.clone())?;
    let runner = Runner::new(motor).with_stop_check(move || shutdown.load(Ordering::Relaxed));
    Ok((joint, runner))
}

/// Sweep the encoder and return the committed table.
pub fn calibrate(runner: &mut SimRunner, max_ticks: u64) -> Result<Vec<u16>> {
    let started = Instant::now();
    match runner.calibrate(max_ticks)? {
        CalibrationOutcome::Committed { entries } => {
            tracing::info!(
                entries,
                ticks = runner.ticks(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "calibration finished"
            );
            Ok(runner.motor().encoder().table().entries().to_vec())
        }
        CalibrationOutcome::Rejected(code) => {
            Err(eyre::Report::new(code).wrap_err("encoder calibration rejected"))
        }
        CalibrationOutcome::Idle => Err(eyre::eyre!("calibration produced no result")),
    }
}

/// An erased table sized for the encoder.
pub fn erased_table() -> MemoryTable {
    MemoryTable::erased(ENCODER_RESOLUTION as usize)
}

/// A requested move in CLI units.
#[derive(Debug, Clone, Copy)]
pub struct MoveRequest {
    pub mode: MoveMode,
    pub target: f32,
    pub seconds: f32,
    pub move_time: Option<f32>,
    pub realtime: bool,
}

impl MoveRequest {
    /// Reject arguments clap cannot check on its own.
    pub fn validate(&self) -> Result<()> {
        if !(self.seconds.is_finite() && self.seconds > 0.0) {
            eyre::bail!("--seconds must be > 0");
        }
        if !self.target.is_finite() {
            eyre::bail!("--target must be a finite number");
        }
        if let Some(t) = self.move_time {
            if self.mode != MoveMode::Position {
                eyre::bail!("--move-time only applies to --mode position");
            }
            if !(t.is_finite() && t > 0.0) {
                eyre::bail!("--move-time must be > 0");
            }
        }
        Ok(())
    }
}

/// What the joint looked like at the end of a run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub mode: Mode,
    pub target: f32,
    pub ticks: u64,
    pub interrupted: bool,
    pub feasible: bool,
    pub activity: Activity,
    pub position_turns: f32,
    pub velocity_turns: f32,
    pub current_a: f32,
    pub rotor_turns: f64,
    pub stalled: bool,
    pub overload: bool,
}

impl RunSummary {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "mode": self.mode.to_string(),
            "target": self.target,
            "ticks": self.ticks,
            "interrupted": self.interrupted,
            "feasible": self.feasible,
            "activity": self.activity.to_string(),
            "position_turns": self.position_turns,
            "velocity_turns": self.velocity_turns,
            "current_a": self.current_a,
            "rotor_turns": self.rotor_turns,
            "stalled": self.stalled,
            "overload": self.overload,
        })
    }

    pub fn print_human(&self) {
        println!("Mode: {} (target {})", self.mode, self.target);
        println!("Ticks: {}{}", self.ticks, if self.interrupted { " (interrupted)" } else { "" });
        println!("Activity: {}", self.activity);
        println!(
            "Position: {:.4} turns  Velocity: {:.3} turns/s  Current: {:.3} A",
            self.position_turns, self.velocity_turns, self.current_a
        );
        println!("Rotor (sim): {:.4} turns", self.rotor_turns);
        if !self.feasible {
            println!("Note: requested move time was infeasible; moved at the velocity limit");
        }
        if self.stalled {
            println!("Warning: stall detected, torque was cut");
        }
    }
}

fn mode_for(mode: MoveMode) -> Mode {
    match mode {
        MoveMode::Position => Mode::CommandPosition,
        MoveMode::Velocity => Mode::CommandVelocity,
        MoveMode::Current => Mode::CommandCurrent,
        MoveMode::StepDir => Mode::StepDir,
    }
}

/// Command the move, run the requested time and report where the joint ended up.
pub fn run_move(
    runner: &mut SimRunner,
    joint: &SimulatedJoint,
    req: &MoveRequest,
) -> Result<RunSummary> {
    req.validate()?;
    let mode = mode_for(req.mode);
    let total = (f64::from(req.seconds) * f64::from(CONTROL_FREQUENCY)).round() as u64;
    let start_rotor = joint.position();

    // One tick seeds the position estimate; the mode switch needs another.
    runner.run_ticks(1)?;
    runner.motor_mut().set_mode(mode);
    runner.run_ticks(1)?;

    let mut feasible = true;
    let m = runner.motor_mut();
    match req.mode {
        MoveMode::Position => {
            let goal = turns_to_steps(req.target);
            match req.move_time {
                Some(t) => feasible = m.set_position_setpoint_with_time(goal, t),
                None => m.set_position_setpoint(goal),
            }
        }
        MoveMode::Velocity => m.set_velocity_setpoint(turns_to_steps(req.target)),
        MoveMode::Current => m.set_current_setpoint(req.target.round() as i32),
        MoveMode::StepDir => m.add_step_pulses(turns_to_steps(req.target)),
    }
    tracing::info!(%mode, target = req.target, ticks = total, "move started");

    let remaining = total.saturating_sub(2);
    let before = runner.ticks();
    if req.realtime {
        runner.run_paced(remaining, &MonotonicClock::new(), BATCH)
    } else {
        runner.run_paced(remaining, &ManualClock::new(), BATCH)
    }
    .wrap_err("move failed")?;
    let ran = runner.ticks() - before;

    let m = runner.motor();
    let state = m.state();
    let summary = RunSummary {
        mode,
        target: req.target,
        ticks: runner.ticks(),
        interrupted: ran < remaining,
        feasible,
        activity: m.activity(),
        position_turns: m.position_turns(false),
        velocity_turns: m.velocity_turns(),
        current_a: m.foc_current_amps(),
        rotor_turns: (joint.position() - start_rotor) / f64::from(SUBDIVIDE_STEPS),
        stalled: state.is_stalled,
        overload: state.overload_flag,
    };
    tracing::info!(activity = %summary.activity, ticks = summary.ticks, "move finished");
    Ok(summary)
}
