//! # Candlewick Events
//!
//! This crate defines the structured record of every decision the controller takes:
//! signal evaluations, entries, exits, stop changes, rejected requests and risk halts.
//!
//! As a Layer 0 crate, it depends only on `core-types`. The binary prints these
//! events as JSON lines; tests assert on them directly.

// Declare the modules that make up this crate.
pub mod error;
pub mod messages;

// Re-export the core types to provide a clean public API.
pub use error::EventsError;
pub use messages::{CloseReason, ControllerEvent, RejectedOperation, StopReason};
