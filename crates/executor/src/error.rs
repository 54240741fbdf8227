use core_types::{OrderId, PositionId};
use events::RejectedOperation;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrokerError {
    /// The broker refused the request. Nothing changed on its side.
    #[error("{operation:?} request rejected: {reason}")]
    OrderRejected {
        operation: RejectedOperation,
        reason: String,
    },

    #[error("Position {0} not found")]
    PositionNotFound(PositionId),

    #[error("Pending order {0} not found")]
    OrderNotFound(OrderId),

    #[error("No quote available for symbol: {0}")]
    NoQuote(String),
}

impl BrokerError {
    pub fn rejected(operation: RejectedOperation, reason: impl Into<String>) -> Self {
        BrokerError::OrderRejected {
            operation,
            reason: reason.into(),
        }
    }
}
