//! `joint`: calibrate and drive a simulated closed-loop joint.

mod cli;
mod error_fmt;
mod sim;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::{Result, WrapErr};
use joint_core::{DynMotor, MotorConfig};
use joint_hardware::{MemoryTable, SensorModel, SimulatedJoint};
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};
use crate::sim::MoveRequest;

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(e) = color_eyre::install() {
        eprintln!("warning: could not install error reporter: {e}");
    }

    if let Err(err) = run(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        std::process::exit(exit_code_for_error(&err));
    }
}

fn run(cli: Cli) -> Result<()> {
    let cfg = load_config(&cli.config)?;
    init_tracing(&cli, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), "configuration loaded");

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&shutdown);
        if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
            tracing::warn!(error = %e, "could not install Ctrl-C handler");
        }
    }

    let motor_cfg = MotorConfig::from(&cfg);
    match cli.cmd {
        Commands::Calibrate { sim, out } => {
            let (_joint, mut runner) =
                sim::assemble(&motor_cfg, &sim, sim::erased_table(), shutdown)?;
            let table = sim::calibrate(&mut runner, sim.max_calibration_ticks)?;
            let bytes = joint_config::calibration_csv_bytes(&table)?;
            joint_core::atomic::write_atomic(&out, &bytes)
                .wrap_err_with(|| format!("write calibration table {}", out.display()))?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({ "ok": true, "entries": table.len(), "out": out.display().to_string() })
                );
            } else {
                println!("Calibration committed: {} entries written to {}", table.len(), out.display());
            }
            Ok(())
        }
        Commands::Run {
            sim,
            mode,
            target,
            seconds,
            move_time,
            realtime,
        } => {
            let request = MoveRequest {
                mode,
                target,
                seconds,
                move_time,
                realtime,
            };
            request.validate()?;
            let table = load_table(cli.calibration.as_deref())?;
            let calibrated = !table.is_erased();
            let (joint, mut runner) = sim::assemble(&motor_cfg, &sim, table, shutdown)?;
            if !calibrated {
                tracing::warn!("no calibration table given; calibrating in memory first");
                sim::calibrate(&mut runner, sim.max_calibration_ticks)?;
            }
            let summary = sim::run_move(&mut runner, &joint, &request)?;
            if cli.json {
                println!("{}", summary.to_json());
            } else {
                summary.print_human();
            }
            Ok(())
        }
        Commands::SelfCheck => self_check(cli.calibration.as_deref(), cli.json, &motor_cfg),
    }
}

fn load_config(path: &Path) -> Result<joint_config::Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg = joint_config::load_toml(&text).wrap_err("invalid configuration")?;
    cfg.validate().wrap_err("invalid configuration")?;
    Ok(cfg)
}

fn load_table(path: Option<&Path>) -> Result<MemoryTable> {
    match path {
        Some(p) => {
            let entries = joint_config::load_calibration_csv(p)?;
            tracing::info!(path = %p.display(), entries = entries.len(), "calibration table loaded");
            Ok(MemoryTable::from_entries(entries))
        }
        None => Ok(sim::erased_table()),
    }
}

fn self_check(calibration: Option<&Path>, json: bool, motor_cfg: &MotorConfig) -> Result<()> {
    motor_cfg
        .validate()
        .map_err(|msg| eyre::Report::new(joint_core::BuildError::InvalidConfig(msg)))?;

    let table = load_table(calibration)?;
    let calibrated = !table.is_erased();
    if calibrated && !joint_core::table_is_valid(joint_traits::PersistentTable::entries(&table)) {
        eyre::bail!("calibration CSV does not describe a valid table");
    }

    let joint = SimulatedJoint::new(SensorModel::default());
    let motor = DynMotor::builder()
        .with_sensor(joint.sensor())
        .with_driver(joint.driver())
        .with_table(table)
        .with_config(motor_cfg.clone())
        .build()?;
    tracing::info!(calibrated, mode = %motor.mode_running(), "self-check passed");

    if json {
        println!("{}", serde_json::json!({ "ok": true, "calibrated": calibrated }));
    } else {
        println!("self-check ok");
    }
    Ok(())
}

fn init_tracing(cli: &Cli, logging: &joint_config::Logging) -> Result<()> {
    let level = cli
        .log_level
        .clone()
        .or_else(|| logging.level.clone())
        .unwrap_or_else(|| "info".to_string());
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&level))
        .wrap_err_with(|| format!("invalid log level {level:?}"))?;

    let console = if cli.json || logging.json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_writer(std::io::stderr).with_target(false).boxed()
    };

    let file = match logging.file.as_deref() {
        Some(path) => {
            let path = Path::new(path);
            let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = path.file_name().map_or_else(|| "joint.log".into(), |n| n.to_os_string());
            let rotation = match logging.rotation.as_deref() {
                Some("daily") => tracing_appender::rolling::Rotation::DAILY,
                Some("hourly") => tracing_appender::rolling::Rotation::HOURLY,
                _ => tracing_appender::rolling::Rotation::NEVER,
            };
            let appender = tracing_appender::rolling::RollingFileAppender::new(rotation, dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(fmt::layer().json().with_ansi(false).with_writer(writer).boxed())
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .wrap_err("install tracing subscriber")?;
    Ok(())
}
