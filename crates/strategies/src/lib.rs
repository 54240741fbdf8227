//! # Candlewick Strategy Library
//!
//! This crate turns closed bars and indicator values into entry and exit
//! signals. It defines the `Strategy` trait and its implementations, the
//! engulfing pattern detector, the oscillator confirmation filter and the
//! per-bar signal state machine.
//!
//! ## Architectural Principles
//!
//! - **Pure logic:** No knowledge of brokers or accounts. It depends only on
//!   `core-types` and `configuration`, and reads market data through the
//!   `PriceFeed` and `IndicatorService` traits.
//! - **No partial updates:** An evaluation produces a complete `SignalSnapshot`
//!   or an error. Only a successful snapshot is committed to `SignalState`.
//!
//! ## Public API
//!
//! - `Strategy`: The trait all strategies implement.
//! - `create_strategy`: The factory function to construct a strategy instance.
//! - `SignalState` / `SignalSnapshot`: The per-bar signal machine.
//! - `BarSeriesIndicators`: An `IndicatorService` computed from bar history.

pub mod confirmation;
pub mod engulfing;
pub mod error;
pub mod factory;
pub mod indicators;
pub mod pattern;
pub mod signal;
pub mod stop_management;

#[cfg(test)]
mod test_support;

pub use confirmation::{OscillatorFilter, OscillatorReading};
pub use engulfing::EngulfingStochRsi;
pub use error::StrategyError;
pub use factory::create_strategy;
pub use indicators::{BarSeriesIndicators, IndicatorParams};
pub use pattern::{EngulfingDetector, MicroTrend, PatternResult};
pub use signal::{SignalPhase, SignalSnapshot, SignalState};
pub use stop_management::StopManagementOnly;

pub use configuration::StrategyId;

use core_types::{IndicatorService, PriceFeed};

/// The trait every signal generator implements.
///
/// `evaluate` runs once per bar boundary against the bars and indicators as
/// they stand when the new bar opens. `&mut self` lets implementations keep
/// their own state between bars.
pub trait Strategy: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Computes the open- and close-signal for the bar that just opened.
    ///
    /// Any unavailable price or indicator value is an error, never a silent
    /// "no signal".
    fn evaluate(
        &mut self,
        feed: &dyn PriceFeed,
        indicators: &dyn IndicatorService,
    ) -> Result<SignalSnapshot, StrategyError>;
}
