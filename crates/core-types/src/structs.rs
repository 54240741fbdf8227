use crate::enums::{AppliedPrice, OrderSide};
use crate::error::CoreError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One completed period of price data. Immutable once closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

impl Bar {
    /// Builds a bar, rejecting an inconsistent high/low envelope.
    pub fn new(
        open_time: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
    ) -> Result<Self, CoreError> {
        if high < low {
            return Err(CoreError::InvalidInput(
                "bar".to_string(),
                format!("high {} is below low {}", high, low),
            ));
        }
        if open > high || open < low || close > high || close < low {
            return Err(CoreError::InvalidInput(
                "bar".to_string(),
                format!(
                    "open {} / close {} outside the range [{}, {}]",
                    open, close, low, high
                ),
            ));
        }
        Ok(Self {
            open_time,
            open,
            high,
            low,
            close,
        })
    }

    /// Absolute size of the candle body.
    pub fn body(&self) -> Decimal {
        (self.open - self.close).abs()
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// Midpoint of the body, `(open + close) / 2`.
    pub fn body_midpoint(&self) -> Decimal {
        (self.open + self.close) / Decimal::TWO
    }

    /// The price selected by `applied`.
    pub fn applied(&self, applied: AppliedPrice) -> Decimal {
        match applied {
            AppliedPrice::Close => self.close,
            AppliedPrice::Open => self.open,
            AppliedPrice::High => self.high,
            AppliedPrice::Low => self.low,
            AppliedPrice::Median => (self.high + self.low) / Decimal::TWO,
            AppliedPrice::Typical => (self.high + self.low + self.close) / Decimal::from(3),
            AppliedPrice::Weighted => {
                (self.high + self.low + self.close * Decimal::TWO) / Decimal::from(4)
            }
        }
    }
}

/// The current top of book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: Decimal,
    pub ask: Decimal,
    pub time: DateTime<Utc>,
}

impl Quote {
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }

    /// The price a new position of `side` is opened at.
    pub fn entry_price(&self, side: OrderSide) -> Decimal {
        match side {
            OrderSide::Buy => self.ask,
            OrderSide::Sell => self.bid,
        }
    }

    /// The price an open position of `side` would be closed at.
    pub fn exit_price(&self, side: OrderSide) -> Decimal {
        match side {
            OrderSide::Buy => self.bid,
            OrderSide::Sell => self.ask,
        }
    }
}

/// Broker-assigned position ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionId(pub u64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Broker-assigned pending order ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque strategy identity tagging every order and position of one strategy instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MagicNumber(pub u64);

impl fmt::Display for MagicNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An open position as reported by the broker.
///
/// The broker owns this state. The controller only reads it and requests changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub position_id: PositionId,
    pub symbol: String,
    pub magic: MagicNumber,
    pub side: OrderSide,
    pub volume: Decimal,
    pub open_price: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub open_time: DateTime<Utc>,
    /// Floating profit in account currency, as reported by the broker.
    pub profit: Decimal,
}

impl Position {
    /// Unrealized profit in points at `quote`, positive when the position is in profit.
    pub fn profit_points(&self, quote: &Quote, point: Decimal) -> Decimal {
        let move_in_price = match self.side {
            OrderSide::Buy => quote.bid - self.open_price,
            OrderSide::Sell => self.open_price - quote.ask,
        };
        move_in_price / point
    }

    /// Whether `candidate` protects more profit than the current stop.
    /// Strictly higher for longs, strictly lower for shorts; any stop beats no stop.
    pub fn is_tighter_stop(&self, candidate: Decimal) -> bool {
        match (self.side, self.stop_loss) {
            (_, None) => true,
            (OrderSide::Buy, Some(current)) => candidate > current,
            (OrderSide::Sell, Some(current)) => candidate < current,
        }
    }

    pub fn belongs_to(&self, symbol: &str, magic: MagicNumber) -> bool {
        self.symbol == symbol && self.magic == magic
    }
}
