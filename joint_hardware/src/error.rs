use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("flash table full ({capacity} entries)")]
    TableFull { capacity: usize },
    #[error("flash write window is not open")]
    WriteNotOpen,
    #[error("flash write window already open")]
    WriteAlreadyOpen,
    #[error("flash fault: {0}")]
    Flash(String),
}

pub type Result<T> = std::result::Result<T, HwError>;
