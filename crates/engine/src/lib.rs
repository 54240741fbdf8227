//! # Candlewick Engine Crate
//!
//! The engine runs the position lifecycle for one strategy identity. On every
//! tick it checks the risk guard, evaluates the strategy when a new bar has
//! opened, then reconciles the broker's positions with the live signals:
//! signal closes, entries, initial stops, profit-target and time exits, and
//! trailing or break-even stop adjustments.
//!
//! ## Architectural Principles
//!
//! - **Plan, then execute:** The decisions in `reconcile` are pure functions
//!   of a broker snapshot. The `StrategyController` only lists positions,
//!   runs the plan and reports what happened.
//! - **Stateless over positions:** Nothing about open positions is cached
//!   between ticks, so a rejected request is simply retried on the next one.
//!
//! ## Public API
//!
//! - `StrategyController`: Owns the signal state and drives ticks.
//! - `MarketData` / `MarketEvent`: Bar history and quotes as a `PriceFeed`.
//! - `plan_stage`: The pure lifecycle decisions, one stage at a time.
//! - `EngineError`: The specific error types that can be returned from this crate.

pub mod controller;
pub mod error;
pub mod market;
pub mod reconcile;
pub mod stops;

pub use controller::{QuoteSink, StrategyController, TickOutcome};
pub use error::EngineError;
pub use market::{MarketData, MarketEvent, DEFAULT_HISTORY};
pub use reconcile::{plan_stage, Action, LifecycleParams, Plan, Signals, Snapshot, Stage};
pub use stops::{break_even_price, spread_aware_distance, Distance, DistanceKind};
