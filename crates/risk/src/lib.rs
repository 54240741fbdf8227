//! # Candlewick Risk Crate
//!
//! Account-level protection for one strategy identity. The `RiskGuard` reads
//! equity on every tick, before any other lifecycle action. When equity falls
//! to the minimum-equity floor or the maximum-loss floor it closes every
//! position, cancels every pending order and halts trading for the run.

pub mod error;
pub mod guard;

pub use error::RiskError;
pub use guard::{GuardStatus, Liquidation, LiquidationFailure, RiskGuard, RiskState};
