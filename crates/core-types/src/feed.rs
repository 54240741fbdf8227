//! Read-only market data collaborators.
//!
//! Offsets count back from "now": offset 1 is the most recently closed bar,
//! offset 2 the one before it. A lookup that has no value returns
//! [`DataError`] instead of a sentinel number.

use crate::enums::IndicatorSeries;
use crate::error::DataError;
use crate::structs::{Bar, Quote};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

/// Price data for the one instrument a controller governs.
pub trait PriceFeed: Send + Sync {
    /// The closed bar at `offset`.
    fn bar(&self, offset: usize) -> Result<Bar, DataError>;

    /// Current top of book.
    fn quote(&self) -> Quote;

    /// Length of one bar.
    fn period(&self) -> Duration;

    /// Number of completed bars whose open time lies in `[from, to)`.
    fn bars_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<usize, DataError>;

    fn open(&self, offset: usize) -> Result<Decimal, DataError> {
        Ok(self.bar(offset)?.open)
    }

    fn high(&self, offset: usize) -> Result<Decimal, DataError> {
        Ok(self.bar(offset)?.high)
    }

    fn low(&self, offset: usize) -> Result<Decimal, DataError> {
        Ok(self.bar(offset)?.low)
    }

    fn close(&self, offset: usize) -> Result<Decimal, DataError> {
        Ok(self.bar(offset)?.close)
    }
}

/// Named indicator series evaluated on closed bars.
pub trait IndicatorService: Send + Sync {
    fn value(&self, series: IndicatorSeries, offset: usize) -> Result<Decimal, DataError>;
}

/// Start of the period containing `now`, aligned to the Unix epoch.
pub fn period_start(now: DateTime<Utc>, period: Duration) -> DateTime<Utc> {
    let secs = period.num_seconds().max(1);
    let ts = now.timestamp();
    let aligned = ts - ts.rem_euclid(secs);
    DateTime::<Utc>::from_timestamp(aligned, 0).unwrap_or(now)
}
