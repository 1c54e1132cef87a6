use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum CoreError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("persistent storage error: {0}")]
    Storage(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid state: {0}")]
    State(String),
    #[error("io error: {0}")]
    Io(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing angle sensor")]
    MissingSensor,
    #[error("missing driver")]
    MissingDriver,
    #[error("missing calibration table")]
    MissingTable,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

/// Why a calibration run was discarded.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalibrationError {
    #[default]
    #[error("no error")]
    NoError,
    #[error("averaged samples do not move in one consistent direction")]
    AverageDirection,
    #[error("averaged sample step outside [0.5, 1.5] of the nominal step")]
    AverageContinuity,
    #[error("averaged samples wrap around more or less than exactly once")]
    PhaseStep,
    #[error("synthesized table does not cover every raw angle")]
    AnalysisQuantity,
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
