//! # Candlewick Executor Crate
//!
//! This crate defines how the controller talks to the outside world about
//! orders and money: the `Broker` trait for order and position execution, the
//! `Account` trait for balance and equity, and a `PaperBroker` that implements
//! both in memory.
//!
//! ## Architectural Principles
//!
//! - **Broker as source of truth:** The controller keeps no copy of positions.
//!   It lists them from the broker on every tick and only requests changes.
//! - **Execution Abstraction:** The engine is agnostic about whether it talks
//!   to the paper account or a live connection.
//!
//! ## Public API
//!
//! - `Broker` / `Account`: The collaborator traits.
//! - `OpenRequest`: A market entry request.
//! - `PaperBroker`: The in-memory paper account.
//! - `BrokerError`: The specific error types that can be returned from this crate.

pub mod broker;
pub mod error;
pub mod paper;

pub use broker::{Account, Broker, OpenRequest};
pub use error::BrokerError;
pub use paper::PaperBroker;
