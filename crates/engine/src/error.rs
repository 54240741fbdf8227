use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Strategy error: {0}")]
    Strategy(#[from] strategies::StrategyError),

    #[error("Risk management error: {0}")]
    Risk(#[from] risk::RiskError),

    #[error("Broker error: {0}")]
    Broker(#[from] executor::BrokerError),

    #[error("Market data error: {0}")]
    Data(#[from] core_types::DataError),

    #[error("Invalid bar: {0}")]
    InvalidBar(#[from] core_types::CoreError),

    #[error("Serialization/deserialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),
}
