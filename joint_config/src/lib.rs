#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Board configuration and calibration-table files for the joint controller.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Calibration tables round-trip through a strict `raw,angle` CSV.
//!
//! Values here are in human units (mA, rev/s, ms); `joint_core::conversions`
//! turns them into the fixed-point units the control loop runs on.
use serde::Deserialize;

/// Subdivided steps per revolution; home offsets must fall inside one turn.
pub const SUBDIVIDE_STEPS: i32 = 51_200;
/// Entries in a complete calibration table.
pub const TABLE_ENTRIES: usize = 16_384;
/// Upper bound of the driver's current DAC.
pub const MAX_DRIVER_CURRENT_MA: i32 = 3300;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MotionCfg {
    /// Rectified encoder angle treated as position zero (subdivided steps).
    pub encoder_home_offset: i32,
    pub rated_current_ma: i32,
    /// Current ramp used by the current-mode tracker (mA/s).
    pub rated_current_acc_ma_s: i32,
    pub rated_velocity_rps: f32,
    pub rated_velocity_acc_rps2: f32,
    /// Open-loop current applied while calibrating the encoder.
    pub calibration_current_ma: i32,
}

impl Default for MotionCfg {
    fn default() -> Self {
        Self {
            encoder_home_offset: 0,
            rated_current_ma: 1000,
            rated_current_acc_ma_s: 2000,
            rated_velocity_rps: 30.0,
            rated_velocity_acc_rps2: 100.0,
            calibration_current_ma: 2000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct PidCfg {
    pub kp: i32,
    pub ki: i32,
    pub kd: i32,
}

impl Default for PidCfg {
    fn default() -> Self {
        Self {
            kp: 5,
            ki: 30,
            kd: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct DceCfg {
    pub kp: i32,
    pub kv: i32,
    pub ki: i32,
    pub kd: i32,
}

impl Default for DceCfg {
    fn default() -> Self {
        Self {
            kp: 200,
            kv: 80,
            ki: 300,
            kd: 250,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct GainsCfg {
    pub pid: PidCfg,
    pub dce: DceCfg,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ProtectionCfg {
    /// Raise the stall flag (and cut torque) when the rotor stays blocked.
    pub stall_protect: bool,
    /// How long a stall/overload condition must hold before it latches.
    pub debounce_ms: u32,
}

impl Default for ProtectionCfg {
    fn default() -> Self {
        Self {
            stall_protect: false,
            debounce_ms: 1000,
        }
    }
}

/// Control mode names accepted in `[boot] default_mode`.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BootMode {
    Stop,
    #[default]
    CommandPosition,
    CommandVelocity,
    CommandCurrent,
    CommandTrajectory,
    PwmPosition,
    PwmVelocity,
    PwmCurrent,
    StepDir,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BootCfg {
    pub node_id: u32,
    pub default_mode: BootMode,
    pub enable_motor_on_boot: bool,
}

impl Default for BootCfg {
    fn default() -> Self {
        Self {
            node_id: 0,
            default_mode: BootMode::CommandPosition,
            enable_motor_on_boot: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TrajectoryCfg {
    /// Longest accepted gap between trajectory set-points before the tracker
    /// abandons the stream and brakes to zero velocity.
    pub update_timeout_ms: u32,
    /// Deceleration used after a timeout; defaults to the rated acceleration.
    pub slow_down_acc_rps2: Option<f32>,
}

impl Default for TrajectoryCfg {
    fn default() -> Self {
        Self {
            update_timeout_ms: 200,
            slow_down_acc_rps2: None,
        }
    }
}

/// One piece of the velocity -> lead-angle map (see `joint_core::LeadCompensation`).
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct LeadSegmentCfg {
    /// Velocity magnitude (steps/s) at which this piece starts.
    pub velocity: i32,
    /// Slope in Q20 (lead steps per steps/s, scaled by 2^20).
    pub slope_q20: i32,
    /// Lead at the start of the piece (steps).
    pub base: i32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LeadCompensationCfg {
    pub segments: Vec<LeadSegmentCfg>,
    pub limit: i32,
}

impl Default for LeadCompensationCfg {
    fn default() -> Self {
        // Tuned for DPS-series sensors.
        Self {
            segments: vec![
                LeadSegmentCfg {
                    velocity: 100_000,
                    slope_q20: 262,
                    base: 0,
                },
                LeadSegmentCfg {
                    velocity: 1_300_000,
                    slope_q20: 105,
                    base: 300,
                },
                LeadSegmentCfg {
                    velocity: 2_200_000,
                    slope_q20: 52,
                    base: 390,
                },
            ],
            limit: 430,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
    /// Emit JSON lines on stderr instead of human-readable text.
    pub json: bool,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub motion: MotionCfg,
    pub gains: GainsCfg,
    pub protection: ProtectionCfg,
    pub boot: BootCfg,
    pub trajectory: TrajectoryCfg,
    pub lead_compensation: LeadCompensationCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Motion
        let m = &self.motion;
        if !(0..SUBDIVIDE_STEPS).contains(&m.encoder_home_offset) {
            eyre::bail!("motion.encoder_home_offset must be in [0, {SUBDIVIDE_STEPS})");
        }
        if m.rated_current_ma <= 0 || m.rated_current_ma > MAX_DRIVER_CURRENT_MA {
            eyre::bail!("motion.rated_current_ma must be in (0, {MAX_DRIVER_CURRENT_MA}]");
        }
        if m.rated_current_acc_ma_s <= 0 {
            eyre::bail!("motion.rated_current_acc_ma_s must be > 0");
        }
        if !(m.rated_velocity_rps.is_finite() && m.rated_velocity_rps > 0.0) {
            eyre::bail!("motion.rated_velocity_rps must be > 0");
        }
        if m.rated_velocity_rps > 40.0 {
            eyre::bail!("motion.rated_velocity_rps is unreasonably large (>40 rev/s)");
        }
        if !(m.rated_velocity_acc_rps2.is_finite() && m.rated_velocity_acc_rps2 > 0.0) {
            eyre::bail!("motion.rated_velocity_acc_rps2 must be > 0");
        }
        if m.rated_velocity_acc_rps2 > 1000.0 {
            eyre::bail!("motion.rated_velocity_acc_rps2 is unreasonably large (>1000 rev/s^2)");
        }
        if m.calibration_current_ma <= 0 || m.calibration_current_ma > MAX_DRIVER_CURRENT_MA {
            eyre::bail!(
                "motion.calibration_current_ma must be in (0, {MAX_DRIVER_CURRENT_MA}]"
            );
        }

        // Gains
        let p = &self.gains.pid;
        if p.kp < 0 || p.ki < 0 || p.kd < 0 {
            eyre::bail!("gains.pid values must be >= 0");
        }
        let d = &self.gains.dce;
        if d.kp < 0 || d.kv < 0 || d.ki < 0 || d.kd < 0 {
            eyre::bail!("gains.dce values must be >= 0");
        }

        // Protection
        if self.protection.debounce_ms == 0 {
            eyre::bail!("protection.debounce_ms must be >= 1");
        }
        if self.protection.debounce_ms > 60_000 {
            eyre::bail!("protection.debounce_ms is unreasonably large (>60s)");
        }

        // Trajectory
        if self.trajectory.update_timeout_ms == 0 {
            eyre::bail!("trajectory.update_timeout_ms must be >= 1");
        }
        if let Some(acc) = self.trajectory.slow_down_acc_rps2
            && !(acc.is_finite() && acc > 0.0)
        {
            eyre::bail!("trajectory.slow_down_acc_rps2 must be > 0");
        }

        // Lead compensation
        let lead = &self.lead_compensation;
        if lead.segments.is_empty() {
            eyre::bail!("lead_compensation.segments must not be empty");
        }
        if lead.segments[0].velocity < 0 {
            eyre::bail!("lead_compensation.segments velocities must be >= 0");
        }
        if lead
            .segments
            .windows(2)
            .any(|w| w[1].velocity <= w[0].velocity)
        {
            eyre::bail!("lead_compensation.segments must be sorted by strictly increasing velocity");
        }
        if lead.limit < 0 {
            eyre::bail!("lead_compensation.limit must be >= 0");
        }

        Ok(())
    }
}

/// Calibration CSV schema.
///
/// Expected headers:
/// raw,angle
///
/// One row per raw sensor count, in raw order, `angle` in subdivided steps.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct TableRow {
    pub raw: u32,
    pub angle: u16,
}

/// Load a calibration table, enforcing the header, raw ordering and length.
pub fn load_calibration_csv(path: &std::path::Path) -> eyre::Result<Vec<u16>> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {:?}: {}", path, e))?;
    read_calibration(rdr).map_err(|e| e.wrap_err(format!("calibration CSV {path:?}")))
}

/// Same as `load_calibration_csv`, from in-memory text.
pub fn parse_calibration_csv(text: &str) -> eyre::Result<Vec<u16>> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());
    read_calibration(rdr)
}

fn read_calibration<R: std::io::Read>(mut rdr: csv::Reader<R>) -> eyre::Result<Vec<u16>> {
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers: {}", e))?
        .clone();
    let expected = ["raw", "angle"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "calibration CSV must have headers 'raw,angle', got: {}",
            actual.join(",")
        );
    }

    let mut table = Vec::with_capacity(TABLE_ENTRIES);
    for (idx, rec) in rdr.deserialize::<TableRow>().enumerate() {
        let row = rec.map_err(|e| eyre::eyre!("invalid CSV row {}: {}", idx + 2, e))?;
        if row.raw as usize != idx {
            eyre::bail!(
                "CSV row {} has raw={}, expected {} (rows must be in raw order)",
                idx + 2,
                row.raw,
                idx
            );
        }
        if i32::from(row.angle) >= SUBDIVIDE_STEPS {
            eyre::bail!(
                "CSV row {} angle {} is outside one revolution",
                idx + 2,
                row.angle
            );
        }
        table.push(row.angle);
    }
    if table.len() != TABLE_ENTRIES {
        eyre::bail!(
            "calibration table needs exactly {} rows, got {}",
            TABLE_ENTRIES,
            table.len()
        );
    }
    Ok(table)
}

/// Render a calibration table as `raw,angle` CSV bytes.
pub fn calibration_csv_bytes(table: &[u16]) -> eyre::Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::with_capacity(table.len() * 12));
    wtr.write_record(["raw", "angle"])?;
    for (raw, angle) in table.iter().enumerate() {
        wtr.write_record([raw.to_string(), angle.to_string()])?;
    }
    wtr.into_inner()
        .map_err(|e| eyre::eyre!("flush calibration CSV: {}", e))
}
