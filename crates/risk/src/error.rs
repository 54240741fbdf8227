use executor::BrokerError;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskError {
    #[error("Risk parameters from configuration are invalid: {0}")]
    InvalidParameters(String),

    /// Equity is at or below the binding floor.
    #[error("Equity {equity} is at or below the risk floor {floor}")]
    Breach { equity: Decimal, floor: Decimal },

    #[error("Account state unavailable: {0}")]
    Account(#[from] BrokerError),
}
