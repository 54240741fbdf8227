use serde::{Deserialize, Serialize};
use std::fmt;

/// Side of an order, and by extension the direction of the position it opens.
/// A `Buy` position is long, a `Sell` position is short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side of the order
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    /// `+1` for longs, `-1` for shorts. Used to flip price offsets.
    pub fn sign(&self) -> i32 {
        match self {
            OrderSide::Buy => 1,
            OrderSide::Sell => -1,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "long"),
            OrderSide::Sell => write!(f, "short"),
        }
    }
}

/// The live entry signal for the current bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OpenSignal {
    #[default]
    None,
    Buy,
    Sell,
}

impl OpenSignal {
    pub fn side(&self) -> Option<OrderSide> {
        match self {
            OpenSignal::None => None,
            OpenSignal::Buy => Some(OrderSide::Buy),
            OpenSignal::Sell => Some(OrderSide::Sell),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, OpenSignal::None)
    }
}

/// The live exit signal for the current bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CloseSignal {
    #[default]
    None,
    CloseLong,
    CloseShort,
}

impl CloseSignal {
    /// The side of the positions this signal closes.
    pub fn side(&self) -> Option<OrderSide> {
        match self {
            CloseSignal::None => None,
            CloseSignal::CloseLong => Some(OrderSide::Buy),
            CloseSignal::CloseShort => Some(OrderSide::Sell),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, CloseSignal::None)
    }
}

/// Result of the two-bar candlestick scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PatternKind {
    #[default]
    None,
    BullishEngulfing,
    BearishEngulfing,
}

impl PatternKind {
    /// The trade direction implied by the pattern.
    pub fn direction(&self) -> Option<OrderSide> {
        match self {
            PatternKind::None => None,
            PatternKind::BullishEngulfing => Some(OrderSide::Buy),
            PatternKind::BearishEngulfing => Some(OrderSide::Sell),
        }
    }
}

/// Which bar price feeds the oscillator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppliedPrice {
    #[default]
    Close,
    Open,
    High,
    Low,
    /// (high + low) / 2
    Median,
    /// (high + low + close) / 3
    Typical,
    /// (high + low + 2 * close) / 4
    Weighted,
}

/// The indicator series the strategy reads from the indicator service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndicatorSeries {
    /// Main (K) line of the stochastic-over-RSI oscillator.
    StochRsiK,
    /// Signal (D) line of the stochastic-over-RSI oscillator.
    StochRsiD,
    /// Simple moving average of closes used as the trend reference.
    TrendMa,
    /// Average true range, in price units.
    Atr,
}

impl fmt::Display for IndicatorSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndicatorSeries::StochRsiK => "stoch_rsi_k",
            IndicatorSeries::StochRsiD => "stoch_rsi_d",
            IndicatorSeries::TrendMa => "trend_ma",
            IndicatorSeries::Atr => "atr",
        };
        f.write_str(name)
    }
}
