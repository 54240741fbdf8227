use core_types::DataError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("Strategy received invalid parameters: {0}")]
    InvalidParameters(String),

    /// A price or indicator lookup had no value; the evaluation is retried next tick.
    #[error("Data unavailable: {0}")]
    Data(#[from] DataError),

    #[error("An error occurred during indicator calculation: {0}")]
    IndicatorError(String),
}
