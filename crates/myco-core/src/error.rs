//! Error types for the mycelial signal analysis system.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("signal processing error: {0}")]
    SignalProcessing(String),

    #[error("invalid sample record: {0}")]
    InvalidRecord(String),

    #[error("insufficient data: need {required} samples, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("acquisition error: {0}")]
    Acquisition(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("export error: {0}")]
    Export(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
