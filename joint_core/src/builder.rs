//! Type-state builder for the boxed `DynMotor` and generic `build_motor` constructor.
//!
//! The builder enforces at compile time that sensor, driver, and table are
//! provided before `build()` is available. `try_build()` is always available
//! for dynamic checks.

use std::marker::PhantomData;

use joint_traits::{AngleSensor, Driver, PersistentTable};

use crate::config::MotorConfig;
use crate::encoder::Encoder;
use crate::error::{BuildError, Result};
use crate::motor::Motor;

/// Dynamically dispatched motor, as built from boxed hardware.
pub type DynMotor = Motor<Box<dyn AngleSensor>, Box<dyn Driver>, Box<dyn PersistentTable>>;

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `DynMotor`. The configuration is validated on `build()`.
pub struct MotorBuilder<S, D, T> {
    sensor: Option<Box<dyn AngleSensor>>,
    driver: Option<Box<dyn Driver>>,
    table: Option<Box<dyn PersistentTable>>,
    config: Option<MotorConfig>,
    _s: PhantomData<S>,
    _d: PhantomData<D>,
    _t: PhantomData<T>,
}

impl Default for MotorBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            sensor: None,
            driver: None,
            table: None,
            config: None,
            _s: PhantomData,
            _d: PhantomData,
            _t: PhantomData,
        }
    }
}

impl DynMotor {
    /// Start building a boxed motor.
    pub fn builder() -> MotorBuilder<Missing, Missing, Missing> {
        MotorBuilder::default()
    }
}

/// Validate the configuration and assemble an initialized motor.
///
/// Shared by `MotorBuilder::try_build()` and `build_motor()`.
fn validate_and_build<S, D, T>(
    sensor: S,
    driver: D,
    table: T,
    config: MotorConfig,
) -> Result<Motor<S, D, T>>
where
    S: AngleSensor,
    D: Driver,
    T: PersistentTable,
{
    config
        .validate()
        .map_err(|msg| eyre::Report::new(BuildError::InvalidConfig(msg)))?;
    let mut motor = Motor::new(Encoder::new(sensor, table), driver, config);
    motor.init();
    Ok(motor)
}

impl<S, D, T> MotorBuilder<S, D, T> {
    /// Fallible build available in any type-state; reports the missing piece.
    pub fn try_build(self) -> Result<DynMotor> {
        let sensor = self
            .sensor
            .ok_or_else(|| eyre::Report::new(BuildError::MissingSensor))?;
        let driver = self
            .driver
            .ok_or_else(|| eyre::Report::new(BuildError::MissingDriver))?;
        let table = self
            .table
            .ok_or_else(|| eyre::Report::new(BuildError::MissingTable))?;
        validate_and_build(sensor, driver, table, self.config.unwrap_or_default())
    }

    /// Chainable setter that does not affect type-state.
    pub fn with_config(mut self, config: MotorConfig) -> Self {
        self.config = Some(config);
        self
    }
}

// Setters that advance type-state
impl<D, T> MotorBuilder<Missing, D, T> {
    pub fn with_sensor(self, sensor: impl AngleSensor + 'static) -> MotorBuilder<Set, D, T> {
        MotorBuilder {
            sensor: Some(Box::new(sensor)),
            driver: self.driver,
            table: self.table,
            config: self.config,
            _s: PhantomData,
            _d: PhantomData,
            _t: PhantomData,
        }
    }
}

impl<S, T> MotorBuilder<S, Missing, T> {
    pub fn with_driver(self, driver: impl Driver + 'static) -> MotorBuilder<S, Set, T> {
        MotorBuilder {
            sensor: self.sensor,
            driver: Some(Box::new(driver)),
            table: self.table,
            config: self.config,
            _s: PhantomData,
            _d: PhantomData,
            _t: PhantomData,
        }
    }
}

impl<S, D> MotorBuilder<S, D, Missing> {
    pub fn with_table(self, table: impl PersistentTable + 'static) -> MotorBuilder<S, D, Set> {
        MotorBuilder {
            sensor: self.sensor,
            driver: self.driver,
            table: Some(Box::new(table)),
            config: self.config,
            _s: PhantomData,
            _d: PhantomData,
            _t: PhantomData,
        }
    }
}

impl MotorBuilder<Set, Set, Set> {
    /// Validate and build. Only available once sensor, driver, and table are set.
    pub fn build(self) -> Result<DynMotor> {
        self.try_build()
    }
}

/// Build a statically dispatched motor from concrete hardware.
///
/// Delegates to the shared `validate_and_build`.
pub fn build_motor<S, D, T>(
    sensor: S,
    driver: D,
    table: T,
    config: MotorConfig,
) -> Result<Motor<S, D, T>>
where
    S: AngleSensor,
    D: Driver,
    T: PersistentTable,
{
    validate_and_build(sensor, driver, table, config)
}
