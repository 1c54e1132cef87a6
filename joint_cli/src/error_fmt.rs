//! Human-readable error descriptions and structured JSON error formatting.

use joint_core::error::{BuildError, CalibrationError, CoreError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingSensor => {
                "What happened: No angle sensor was provided to the motor.\nLikely causes: The sensor failed to initialize or was not wired into the builder.\nHow to fix: Pass the sensor via with_sensor(...) before build().".to_string()
            }
            BuildError::MissingDriver => {
                "What happened: No current driver was provided to the motor.\nLikely causes: The driver failed to initialize or was not wired into the builder.\nHow to fix: Pass the driver via with_driver(...) before build().".to_string()
            }
            BuildError::MissingTable => {
                "What happened: No calibration table storage was provided.\nLikely causes: The table backend was not wired into the builder.\nHow to fix: Pass a table via with_table(...), even an erased one.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun `joint self-check`."
            ),
        };
    }

    if let Some(code) = err.downcast_ref::<CalibrationError>() {
        return format!(
            "What happened: Encoder calibration was rejected ({code}).\nLikely causes: The rotor was blocked or slipped during the sweep, or the calibration current is too low for the load.\nHow to fix: Free the shaft, raise motion.calibration_current_ma, and calibrate again. The previous table was kept."
        );
    }

    if let Some(ce) = err.downcast_ref::<CoreError>() {
        return match ce {
            CoreError::Storage(detail) => format!(
                "What happened: Writing the calibration table failed ({detail}).\nLikely causes: Worn or write-protected table storage.\nHow to fix: Check the storage backend, then calibrate again. The encoder stays uncalibrated until a table commits."
            ),
            CoreError::State(detail) if detail.contains("interrupted") => {
                "What happened: The run was interrupted.\nLikely causes: Ctrl-C was pressed.\nHow to fix: Nothing to fix; start the command again when ready.".to_string()
            }
            CoreError::State(detail) if detail.contains("did not finish") => format!(
                "What happened: Calibration ran out of time ({detail}).\nLikely causes: The tick budget is too small for the sweep.\nHow to fix: Raise --max-calibration-ticks."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // Heuristics over the whole context chain for config and file errors
    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("calibration csv must have headers") {
        return "Invalid headers in calibration CSV. Expected 'raw,angle'.".to_string();
    }

    if lower.contains("calibration csv") || lower.contains("invalid csv row") {
        return format!(
            "What happened: The calibration table file could not be used.\nLikely causes: The file is truncated, out of order, or was not written by `joint calibrate`.\nHow to fix: Run `joint calibrate --out <FILE>` again. Details: {msg}"
        );
    }

    if lower.contains("invalid configuration") {
        return format!(
            "What happened: Configuration is invalid or incomplete.\nLikely causes: Out-of-range values or wrong types in the TOML.\nHow to fix: Edit the TOML config and try again. Details: {msg}"
        );
    }

    if lower.contains("read config") {
        return format!(
            "What happened: The config file could not be read.\nLikely causes: Wrong --config path or missing permissions.\nHow to fix: Point --config at an existing TOML file. Details: {msg}"
        );
    }

    format!(
        "Something went wrong.\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 3 for a rejected calibration, 4 for storage faults,
/// 130 for Ctrl-C, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<CalibrationError>().is_some() {
        return 3;
    }
    match err.downcast_ref::<CoreError>() {
        Some(CoreError::Storage(_)) => 4,
        Some(CoreError::State(detail)) if detail.contains("interrupted") => 130,
        _ => 1,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if err.downcast_ref::<CalibrationError>().is_some() {
        return "CalibrationRejected";
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return "BuildError";
    }
    match err.downcast_ref::<CoreError>() {
        Some(CoreError::Storage(_)) => "StorageFault",
        Some(CoreError::State(d)) if d.contains("interrupted") => "Interrupted",
        _ => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let mut obj = json!({
        "reason": reason_name(err),
        "message": humanize(err),
        "exit_code": exit_code_for_error(err),
    });
    if let Some(code) = err.downcast_ref::<CalibrationError>() {
        obj["details"] = json!({ "code": format!("{code:?}") });
    }
    obj.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::WrapErr;

    #[test]
    fn rejected_calibration_maps_to_exit_3() {
        let err = eyre::Report::new(CalibrationError::PhaseStep).wrap_err("encoder calibration rejected");
        assert_eq!(exit_code_for_error(&err), 3);
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "CalibrationRejected");
        assert_eq!(v["details"]["code"], "PhaseStep");
    }

    #[test]
    fn storage_fault_maps_to_exit_4() {
        let err = eyre::Report::new(CoreError::Storage("flash fault".into()));
        assert_eq!(exit_code_for_error(&err), 4);
        assert!(humanize(&err).contains("flash fault"));
    }

    #[test]
    fn header_error_is_found_through_context() {
        let err: eyre::Result<()> =
            Err(eyre::eyre!("calibration CSV must have headers 'raw,angle'"));
        let err = err.wrap_err("load calibration table.csv").unwrap_err();
        assert_eq!(
            humanize(&err),
            "Invalid headers in calibration CSV. Expected 'raw,angle'."
        );
        assert_eq!(exit_code_for_error(&err), 1);
    }
}
