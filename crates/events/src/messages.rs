use crate::error::EventsError;
use chrono::{DateTime, Utc};
use core_types::{CloseSignal, OpenSignal, OrderId, OrderSide, PatternKind, PositionId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    /// An oscillator exit signal matched the position's direction.
    Signal,
    /// The position was held for the configured number of bars.
    Expired,
    /// The aggregate profit of its direction reached the target.
    ProfitTarget,
    /// Liquidation after an equity limit was breached.
    RiskBreach,
}

/// Why a protective stop was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// First stop for a position that had none (fixed or ATR distance).
    Initial,
    Trailing,
    BreakEven,
}

/// The broker request that was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectedOperation {
    Open,
    ModifyStop,
    Close,
    Cancel,
}

/// One decision or outcome of a controller tick.
///
/// Serialized with `#[serde(tag = "type", content = "payload")]`, so a closed
/// position looks like `{"type":"PositionClosed","payload":{...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ControllerEvent {
    /// A new bar was evaluated and the signal state committed.
    SignalEvaluated {
        time: DateTime<Utc>,
        bar_open: DateTime<Utc>,
        pattern: PatternKind,
        open: OpenSignal,
        close: CloseSignal,
    },
    /// Evaluation was aborted for lack of data; it is retried next tick.
    DataUnavailable { time: DateTime<Utc>, detail: String },
    PositionOpened {
        time: DateTime<Utc>,
        position_id: PositionId,
        side: OrderSide,
        volume: Decimal,
        price: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    },
    PositionClosed {
        time: DateTime<Utc>,
        position_id: PositionId,
        side: OrderSide,
        reason: CloseReason,
    },
    StopModified {
        time: DateTime<Utc>,
        position_id: PositionId,
        previous: Option<Decimal>,
        stop_loss: Decimal,
        reason: StopReason,
    },
    OrderCancelled { time: DateTime<Utc>, order_id: OrderId },
    /// The broker refused a request. State is left as-is and the decision is retried.
    OrderRejected {
        time: DateTime<Utc>,
        operation: RejectedOperation,
        position_id: Option<PositionId>,
        reason: String,
    },
    RiskBreach {
        time: DateTime<Utc>,
        equity: Decimal,
        floor: Decimal,
    },
    /// Trading is stopped for the rest of the run.
    Halted { time: DateTime<Utc> },
}

impl ControllerEvent {
    /// Renders the event as a single JSON line.
    pub fn to_json(&self) -> Result<String, EventsError> {
        serde_json::to_string(self).map_err(|e| EventsError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn serializes_with_type_tag() {
        let event = ControllerEvent::StopModified {
            time: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            position_id: PositionId(3),
            previous: None,
            stop_loss: dec!(1.2345),
            reason: StopReason::Trailing,
        };
        let json = event.to_json().unwrap();
        assert!(json.starts_with(r#"{"type":"StopModified","payload":{"#));
        assert!(json.contains(r#""reason":"Trailing""#));
    }
}
