//! Host-side main loop: the 20 kHz tick plus the low-priority poll.

use std::time::Duration;

use joint_traits::{AngleSensor, Clock, Driver, PersistentTable};

use crate::calibrator::{CalibrationOutcome, EncoderCalibrator};
use crate::error::{CoreError, Result};
use crate::motor::Motor;

/// Owns a motor and its calibrator and decides which one runs each tick.
pub struct Runner<S, D, T> {
    motor: Motor<S, D, T>,
    calibrator: EncoderCalibrator,
    ticks: u64,
    stop_check: Option<Box<dyn Fn() -> bool>>,
}

impl<S, D, T> core::fmt::Debug for Runner<S, D, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Runner")
            .field("ticks", &self.ticks)
            .field("calibration", &self.calibrator.state())
            .field("stop_check", &self.stop_check.is_some())
            .finish_non_exhaustive()
    }
}

impl<S, D, T> Runner<S, D, T>
where
    S: AngleSensor,
    D: Driver,
    T: PersistentTable,
{
    pub fn new(motor: Motor<S, D, T>) -> Self {
        Self {
            motor,
            calibrator: EncoderCalibrator::new(),
            ticks: 0,
            stop_check: None,
        }
    }

    /// Polled between batches; the run loops return early once it is true.
    pub fn with_stop_check<F>(mut self, f: F) -> Self
    where
        F: Fn() -> bool + 'static,
    {
        self.stop_check = Some(Box::new(f));
        self
    }

    pub fn motor(&self) -> &Motor<S, D, T> {
        &self.motor
    }

    pub fn motor_mut(&mut self) -> &mut Motor<S, D, T> {
        &mut self.motor
    }

    pub fn calibrator(&self) -> &EncoderCalibrator {
        &self.calibrator
    }

    pub fn into_motor(self) -> Motor<S, D, T> {
        self.motor
    }

    /// Ticks executed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn start_calibration(&mut self) {
        tracing::info!("encoder calibration requested");
        self.calibrator.trigger();
    }

    fn stop_requested(&self) -> bool {
        self.stop_check.as_ref().is_some_and(|f| f())
    }

    /// Tick-context entry point.
    pub fn tick(&mut self) {
        if self.calibrator.is_active() {
            self.calibrator.tick(&mut self.motor);
        } else {
            self.motor.tick();
        }
        self.ticks += 1;
    }

    /// Poll-context entry point. A committed table restarts the motor so it
    /// boots with the new table, like a reset would.
    pub fn poll(&mut self) -> Result<CalibrationOutcome> {
        let outcome = self.calibrator.poll(&mut self.motor)?;
        if matches!(outcome, CalibrationOutcome::Committed { .. }) {
            self.motor.init();
        }
        Ok(outcome)
    }

    /// Run `n` ticks back to back, polling after each one.
    ///
    /// Returns the last calibration outcome seen, `Idle` if none.
    pub fn run_ticks(&mut self, n: u64) -> Result<CalibrationOutcome> {
        let mut last = CalibrationOutcome::Idle;
        for _ in 0..n {
            self.tick();
            match self.poll()? {
                CalibrationOutcome::Idle => {}
                other => last = other,
            }
        }
        Ok(last)
    }

    /// Run `n` ticks at the real tick rate, sleeping on `clock` after every
    /// `batch` ticks to stay on schedule.
    pub fn run_paced(&mut self, n: u64, clock: &dyn Clock, batch: u32) -> Result<CalibrationOutcome> {
        let batch = u64::from(batch.max(1));
        let period_us = u64::try_from(self.motor.planner().period_us).unwrap_or(1).max(1);
        let epoch = clock.now();
        let mut done = 0u64;
        let mut last = CalibrationOutcome::Idle;
        while done < n {
            if self.stop_requested() {
                tracing::info!(ticks = done, "run stopped on request");
                break;
            }
            let chunk = batch.min(n - done);
            match self.run_ticks(chunk)? {
                CalibrationOutcome::Idle => {}
                other => last = other,
            }
            done += chunk;
            let due_us = done.saturating_mul(period_us);
            let now_us = clock.us_since(epoch);
            if due_us > now_us {
                clock.sleep(Duration::from_micros(due_us - now_us));
            }
        }
        Ok(last)
    }

    /// Trigger a calibration and tick until it finishes.
    ///
    /// Errors if it has not finished after `max_ticks`, or on a storage failure.
    pub fn calibrate(&mut self, max_ticks: u64) -> Result<CalibrationOutcome> {
        self.start_calibration();
        for _ in 0..max_ticks {
            if self.stop_requested() {
                return Err(eyre::Report::new(CoreError::State(
                    "calibration interrupted".into(),
                )));
            }
            self.tick();
            let outcome = self.poll()?;
            if outcome != CalibrationOutcome::Idle {
                return Ok(outcome);
            }
        }
        Err(eyre::Report::new(CoreError::State(format!(
            "calibration did not finish within {max_ticks} ticks"
        ))))
    }
}
