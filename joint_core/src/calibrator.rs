//! Encoder calibration: sweep the rotor one turn each way at known electrical
//! angles, average the raw readings, and synthesize the correction table.
//!
//! The sweep runs in the tick context (`tick`), the analysis and the table
//! write in the polling context (`poll`). Nothing reaches the table until the
//! samples have passed every check.

use std::ops::Range;

use joint_traits::{AngleSensor, BoxError, Driver, PersistentTable};

use crate::consts::{
    AUTO_CALIB_SPEED, BACKWARD_RETURN_STEPS, ENCODER_RESOLUTION, FINE_TUNE_CALIB_SPEED,
    HARD_STEPS, SAMPLE_COUNTS_PER_STEP, SOFT_DIVIDE, SUBDIVIDE_STEPS,
};
use crate::error::{CalibrationError, CoreError, Result};
use crate::fixed_point::{cycle_average, cycle_data_average, cycle_mod, cycle_subtract};
use crate::hw_error::map_hw_error;
use crate::motor::Motor;

/// Calibration points per sweep: every full step, both ends included.
const POINTS: usize = HARD_STEPS as usize + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CalibrationState {
    #[default]
    Disabled,
    /// Spin one turn forward to settle the rotor.
    ForwardPrepare,
    ForwardMeasure,
    /// Overshoot a few full steps past the end.
    BackwardReturn,
    /// Come back to the end so backlash is taken up in the backward direction.
    BackwardGapDismiss,
    BackwardMeasure,
    /// Sweep done; waiting for `poll` to analyse.
    Calculating,
}

/// What `EncoderCalibrator::poll` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationOutcome {
    /// No finished sweep to analyse.
    Idle,
    /// Table validated and written.
    Committed { entries: usize },
    /// Samples failed a check; the stored table was not touched.
    Rejected(CalibrationError),
}

/// Sample buffers of one calibration, dropped when it ends.
#[derive(Debug, Clone)]
struct CalibrationRun {
    forward: Vec<u16>,
    backward: Vec<u16>,
    raw: [u16; SAMPLE_COUNTS_PER_STEP],
    sample_count: usize,
}

impl CalibrationRun {
    fn new() -> Self {
        Self {
            forward: vec![0; POINTS],
            backward: vec![0; POINTS],
            raw: [0; SAMPLE_COUNTS_PER_STEP],
            sample_count: 0,
        }
    }

    /// Take one reading at a full-step position. Returns the averaged point
    /// once `SAMPLE_COUNTS_PER_STEP` readings are in.
    fn sample(&mut self, raw: u16) -> Option<u16> {
        if let Some(slot) = self.raw.get_mut(self.sample_count) {
            *slot = raw;
        }
        self.sample_count += 1;
        if self.sample_count < SAMPLE_COUNTS_PER_STEP {
            return None;
        }
        self.sample_count = 0;
        u16::try_from(cycle_data_average(&self.raw, ENCODER_RESOLUTION)).ok()
    }
}

/// Index of the full-step point at electrical target `go`.
fn point_index(go: i32) -> Option<usize> {
    usize::try_from((go - SUBDIVIDE_STEPS) / SOFT_DIVIDE)
        .ok()
        .filter(|&i| i < POINTS)
}

#[derive(Debug, Clone, Default)]
pub struct EncoderCalibrator {
    state: CalibrationState,
    triggered: bool,
    go_position: i32,
    error: CalibrationError,
    run: Option<CalibrationRun>,
}

impl EncoderCalibrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a calibration; it starts on the next `tick`.
    pub fn trigger(&mut self) {
        self.triggered = true;
    }

    /// True from `trigger` until `poll` has finished the run.
    pub fn is_active(&self) -> bool {
        self.triggered || self.state != CalibrationState::Disabled
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    /// Result of the last finished run.
    pub fn error_code(&self) -> CalibrationError {
        self.error
    }

    fn enter(&mut self, state: CalibrationState) {
        tracing::debug!(from = ?self.state, to = ?state, go = self.go_position, "calibration phase");
        self.state = state;
    }

    /// One sweep step; replaces `Motor::tick` while a calibration is active.
    pub fn tick<S, D, T>(&mut self, motor: &mut Motor<S, D, T>)
    where
        S: AngleSensor,
        D: Driver,
        T: PersistentTable,
    {
        let current = motor.config().motion.calibration_current;
        if self.state == CalibrationState::Disabled && self.triggered {
            motor.controller_mut().hold_for_calibration();
        }
        let (encoder, driver) = motor.encoder_and_driver();
        encoder.update_angle();
        let raw = encoder.raw_angle();

        match self.state {
            CalibrationState::Disabled => {
                if self.triggered {
                    self.go_position = SUBDIVIDE_STEPS;
                    self.run = Some(CalibrationRun::new());
                    self.error = CalibrationError::NoError;
                    self.drive(driver, current);
                    self.enter(CalibrationState::ForwardPrepare);
                }
            }
            CalibrationState::ForwardPrepare => {
                self.go_position += AUTO_CALIB_SPEED;
                self.drive(driver, current);
                if self.go_position == 2 * SUBDIVIDE_STEPS {
                    self.go_position = SUBDIVIDE_STEPS;
                    self.enter(CalibrationState::ForwardMeasure);
                }
            }
            CalibrationState::ForwardMeasure => {
                self.measure(raw, true);
                self.drive(driver, current);
                if self.go_position > 2 * SUBDIVIDE_STEPS {
                    self.enter(CalibrationState::BackwardReturn);
                }
            }
            CalibrationState::BackwardReturn => {
                self.go_position += FINE_TUNE_CALIB_SPEED;
                self.drive(driver, current);
                if self.go_position == 2 * SUBDIVIDE_STEPS + SOFT_DIVIDE * BACKWARD_RETURN_STEPS {
                    self.enter(CalibrationState::BackwardGapDismiss);
                }
            }
            CalibrationState::BackwardGapDismiss => {
                self.go_position -= FINE_TUNE_CALIB_SPEED;
                self.drive(driver, current);
                if self.go_position == 2 * SUBDIVIDE_STEPS {
                    self.enter(CalibrationState::BackwardMeasure);
                }
            }
            CalibrationState::BackwardMeasure => {
                self.measure(raw, false);
                self.drive(driver, current);
                if self.go_position < SUBDIVIDE_STEPS {
                    self.enter(CalibrationState::Calculating);
                }
            }
            CalibrationState::Calculating => driver.set_foc_vector(0, 0),
        }
    }

    fn drive<D: Driver + ?Sized>(&self, driver: &mut D, current: i32) {
        driver.set_foc_vector(self.go_position.unsigned_abs(), current);
    }

    /// Hold on full-step positions until the point is averaged, move one
    /// micro-step otherwise.
    fn measure(&mut self, raw: u16, forward: bool) {
        let step = if forward {
            FINE_TUNE_CALIB_SPEED
        } else {
            -FINE_TUNE_CALIB_SPEED
        };
        if self.go_position % SOFT_DIVIDE != 0 {
            self.go_position += step;
            return;
        }
        let Some(run) = self.run.as_mut() else {
            self.go_position += step;
            return;
        };
        if let Some(avg) = run.sample(raw) {
            let points = if forward {
                &mut run.forward
            } else {
                &mut run.backward
            };
            if let Some(i) = point_index(self.go_position)
                && let Some(slot) = points.get_mut(i)
            {
                *slot = avg;
            }
            self.go_position += step;
        }
    }

    /// Analyse a finished sweep and, if it checks out, write the table.
    ///
    /// Either way the motor is left released and stalled; the caller
    /// re-initializes it to pick up a new table.
    pub fn poll<S, D, T>(&mut self, motor: &mut Motor<S, D, T>) -> Result<CalibrationOutcome>
    where
        S: AngleSensor,
        D: Driver,
        T: PersistentTable,
    {
        if self.state != CalibrationState::Calculating {
            return Ok(CalibrationOutcome::Idle);
        }
        motor.driver_mut().sleep();

        let run = self.run.take().unwrap_or_else(CalibrationRun::new);
        let analysed = build_table(&run.forward, &run.backward);

        self.enter(CalibrationState::Disabled);
        self.triggered = false;
        motor.controller_mut().hold_for_calibration();

        let entries = match analysed {
            Ok(entries) => entries,
            Err(code) => {
                self.error = code;
                tracing::warn!(error = %code, "calibration rejected; table left unchanged");
                return Ok(CalibrationOutcome::Rejected(code));
            }
        };
        self.error = CalibrationError::NoError;

        let encoder = motor.encoder_mut();
        if let Err(e) = write_table(encoder.table_mut(), &entries) {
            encoder.set_calibrated(false);
            tracing::warn!(error = %e, "calibration table write failed");
            return Err(eyre::Report::new(e));
        }
        encoder.set_calibrated(true);
        tracing::info!(entries = entries.len(), "calibration table committed");
        Ok(CalibrationOutcome::Committed {
            entries: entries.len(),
        })
    }
}

fn write_table<T: PersistentTable + ?Sized>(
    table: &mut T,
    entries: &[u16],
) -> std::result::Result<(), CoreError> {
    let mapped = |e: BoxError| map_hw_error(&*e);
    table.clear().map_err(mapped)?;
    table.begin_write().map_err(mapped)?;
    for &v in entries {
        table.append_u16(v).map_err(mapped)?;
    }
    table.end_write().map_err(mapped)
}

/// Where the averaged samples cross raw zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Wrap {
    /// Raw counts grow with the electrical angle.
    ascending: bool,
    /// Full step whose segment contains raw zero.
    step: i32,
    /// Offset into that segment at which raw zero sits.
    offset: i32,
}

/// Validate the averaged sweeps: one direction of travel, then exactly one
/// pass through raw zero, then every step within [0.5, 1.5] of nominal.
fn check_samples(points: &[i32]) -> std::result::Result<Wrap, CalibrationError> {
    let at = |i: i32| {
        usize::try_from(cycle_mod(i, HARD_STEPS))
            .ok()
            .and_then(|i| points.get(i).copied())
            .unwrap_or_default()
    };
    let nominal = ENCODER_RESOLUTION / HARD_STEPS;

    let first = cycle_subtract(at(0), at(HARD_STEPS - 1), ENCODER_RESOLUTION);
    if first == 0 {
        return Err(CalibrationError::AverageDirection);
    }
    let ascending = first > 0;

    let deltas: Vec<i32> = (1..HARD_STEPS)
        .map(|i| cycle_subtract(at(i), at(i - 1), ENCODER_RESOLUTION))
        .collect();
    if deltas.iter().any(|&d| d == 0 || (d > 0) != ascending) {
        return Err(CalibrationError::AverageDirection);
    }

    // Exactly one plain (unwrapped) step may go the wrong way: raw zero.
    let mut wraps = 0;
    let mut wrap = Wrap {
        ascending,
        step: 0,
        offset: 0,
    };
    for x in 0..HARD_STEPS {
        let d = at(x + 1) - at(x);
        if ascending && d < 0 {
            wraps += 1;
            wrap.step = x;
            wrap.offset = ENCODER_RESOLUTION - at(x);
        } else if !ascending && d > 0 {
            wraps += 1;
            wrap.step = x;
            wrap.offset = ENCODER_RESOLUTION - at(x + 1);
        }
    }
    if wraps != 1 {
        return Err(CalibrationError::PhaseStep);
    }

    if deltas
        .iter()
        .any(|d| d.abs() > nominal * 3 / 2 || d.abs() < nominal / 2)
    {
        return Err(CalibrationError::AverageContinuity);
    }
    Ok(wrap)
}

/// Turn the forward and backward sweeps into a raw-indexed correction table.
///
/// `forward[i]` and `backward[i]` are the averaged raw readings at full step
/// `i` (both `HARD_STEPS + 1` long). Entry `r` of the result is the angle, in
/// subdivided steps, at which the sensor reads `r`, interpolated linearly
/// between full steps.
pub fn build_table(
    forward: &[u16],
    backward: &[u16],
) -> std::result::Result<Vec<u16>, CalibrationError> {
    if forward.len() != POINTS || backward.len() != POINTS {
        return Err(CalibrationError::AnalysisQuantity);
    }
    let points: Vec<i32> = forward
        .iter()
        .zip(backward)
        .map(|(&f, &b)| cycle_average(i32::from(f), i32::from(b), ENCODER_RESOLUTION))
        .collect();
    let wrap = check_samples(&points)?;

    let at = |i: i32| {
        usize::try_from(cycle_mod(i, HARD_STEPS))
            .ok()
            .and_then(|i| points.get(i).copied())
            .unwrap_or_default()
    };
    let last = wrap.step + HARD_STEPS;
    let span = |x: i32, delta: i32| -> Range<i32> {
        if x == (if wrap.ascending { wrap.step } else { last }) {
            wrap.offset..delta
        } else if x == (if wrap.ascending { last } else { wrap.step }) {
            0..wrap.offset
        } else {
            0..delta
        }
    };

    let mut table = Vec::with_capacity(ENCODER_RESOLUTION as usize);
    let mut push = |angle: i32| -> std::result::Result<(), CalibrationError> {
        let v = u16::try_from(cycle_mod(angle, SUBDIVIDE_STEPS))
            .map_err(|_| CalibrationError::AnalysisQuantity)?;
        table.push(v);
        if table.len() > ENCODER_RESOLUTION as usize {
            return Err(CalibrationError::AnalysisQuantity);
        }
        Ok(())
    };

    if wrap.ascending {
        for x in wrap.step..=last {
            let delta = cycle_subtract(at(x + 1), at(x), ENCODER_RESOLUTION);
            for y in span(x, delta) {
                push(SOFT_DIVIDE * x + SOFT_DIVIDE * y / delta)?;
            }
        }
    } else {
        for x in (wrap.step..=last).rev() {
            let delta = cycle_subtract(at(x), at(x + 1), ENCODER_RESOLUTION);
            for y in span(x, delta) {
                push(SOFT_DIVIDE * (x + 1) - SOFT_DIVIDE * y / delta)?;
            }
        }
    }

    if table.len() != ENCODER_RESOLUTION as usize {
        return Err(CalibrationError::AnalysisQuantity);
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    /// Averaged points of an ideal sensor whose zero sits `offset` counts
    /// into the turn.
    fn ideal(offset: i32, ascending: bool) -> Vec<u16> {
        (0..POINTS as i32)
            .map(|i| {
                let r = (i * ENCODER_RESOLUTION + HARD_STEPS / 2) / HARD_STEPS;
                let r = if ascending { offset + r } else { offset - r };
                u16::try_from(r.rem_euclid(ENCODER_RESOLUTION)).unwrap()
            })
            .collect()
    }

    #[rstest]
    #[case(0, true)]
    #[case(5_000, true)]
    #[case(16_383, true)]
    #[case(0, false)]
    #[case(9_999, false)]
    fn ideal_sensor_yields_full_monotonic_table(#[case] offset: i32, #[case] ascending: bool) {
        let points = ideal(offset, ascending);
        let table = build_table(&points, &points).unwrap();
        assert_eq!(table.len(), 16_384);
        assert!(table.iter().all(|&v| i32::from(v) < SUBDIVIDE_STEPS));
        // consecutive raw counts map ~3.125 steps apart (one wrap allowed)
        let jumps = table
            .windows(2)
            .filter(|w| (i32::from(w[1]) - i32::from(w[0])).abs() > 8)
            .count();
        assert!(jumps <= 1, "jumps = {jumps}");
    }

    #[test]
    fn ascending_table_maps_full_steps_exactly() {
        let points = ideal(0, true);
        let table = build_table(&points, &points).unwrap();
        // the reading taken at full step i maps back to i * 256
        for i in [0usize, 1, 57, 199] {
            assert_eq!(i32::from(table[usize::from(points[i])]), i as i32 * SOFT_DIVIDE);
        }
    }

    #[test]
    fn descending_table_maps_full_steps_exactly() {
        let points = ideal(3_000, false);
        let table = build_table(&points, &points).unwrap();
        for i in [0usize, 1, 100, 199] {
            assert_eq!(i32::from(table[usize::from(points[i])]), i as i32 * SOFT_DIVIDE);
        }
    }

    #[test]
    fn same_input_same_table() {
        let points = ideal(1_234, true);
        assert_eq!(build_table(&points, &points), build_table(&points, &points));
    }

    #[test]
    fn flat_samples_have_no_direction() {
        let points = vec![100u16; POINTS];
        assert_eq!(
            build_table(&points, &points),
            Err(CalibrationError::AverageDirection)
        );
    }

    #[test]
    fn uneven_step_breaks_continuity() {
        let mut points = ideal(0, true);
        points[50] += 50;
        assert_eq!(
            build_table(&points, &points),
            Err(CalibrationError::AverageContinuity)
        );
    }

    #[test]
    fn two_wraparounds_is_a_phase_error() {
        // sensor turning twice per revolution
        let points: Vec<u16> = (0..POINTS as i32)
            .map(|i| u16::try_from((i * 164).rem_euclid(16_384)).unwrap())
            .collect();
        assert_eq!(
            build_table(&points, &points),
            Err(CalibrationError::PhaseStep)
        );
    }

    #[test]
    fn reversal_is_a_direction_error() {
        let mut points = ideal(0, true);
        points[81] = points[80] - 60;
        assert_eq!(
            build_table(&points, &points),
            Err(CalibrationError::AverageDirection)
        );
    }

    #[test]
    fn wrong_length_is_a_quantity_error() {
        let points = ideal(0, true);
        assert_eq!(
            build_table(&points[..100], &points),
            Err(CalibrationError::AnalysisQuantity)
        );
    }

    #[test]
    fn forward_backward_hysteresis_is_averaged() {
        let fwd = ideal(0, true);
        let bwd: Vec<u16> = fwd.iter().map(|&v| (v + 4) % 16_384).collect();
        let table = build_table(&fwd, &bwd).unwrap();
        let both = build_table(&ideal(2, true), &ideal(2, true)).unwrap();
        assert_eq!(table, both);
    }
}
