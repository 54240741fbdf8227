pub mod enums;
pub mod error;
pub mod feed;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::{AppliedPrice, CloseSignal, IndicatorSeries, OpenSignal, OrderSide, PatternKind};
pub use error::{CoreError, DataError};
pub use feed::{period_start, IndicatorService, PriceFeed};
pub use structs::{Bar, MagicNumber, OrderId, Position, PositionId, Quote};
