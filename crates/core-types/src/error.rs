use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid input for {0}: {1}")]
    InvalidInput(String, String),

    #[error("Calculation error: {0}")]
    Calculation(String),
}

/// A price or indicator lookup that has no value yet.
///
/// This is distinct from "no signal": it aborts the evaluation cycle that hit it,
/// which is retried on the next tick.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataError {
    #[error("{what} unavailable at offset {offset}")]
    Unavailable { what: String, offset: usize },

    #[error("bar count between {from} and {to} unavailable")]
    BarCountUnavailable { from: String, to: String },

    /// The newest closed bar is not the one that just finished.
    #[error("latest closed bar opened at {latest}, expected {expected}")]
    StaleBar { latest: String, expected: String },
}

impl DataError {
    pub fn unavailable(what: impl Into<String>, offset: usize) -> Self {
        DataError::Unavailable {
            what: what.into(),
            offset,
        }
    }
}
