//! In-memory collaborators for unit tests.

use chrono::{DateTime, Duration, TimeZone, Utc};
use core_types::{Bar, DataError, IndicatorSeries, IndicatorService, PriceFeed, Quote};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Bars stored oldest first; offset 1 is the last element.
pub struct StaticFeed {
    pub bars: Vec<Bar>,
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

impl StaticFeed {
    /// Builds hourly bars from `(open, close)` pairs, oldest first.
    pub fn from_bodies(bodies: &[(Decimal, Decimal)]) -> Self {
        let bars = bodies
            .iter()
            .enumerate()
            .map(|(i, (open, close))| Bar {
                open_time: t0() + Duration::hours(i as i64),
                open: *open,
                high: (*open).max(*close),
                low: (*open).min(*close),
                close: *close,
            })
            .collect();
        Self { bars }
    }
}

impl PriceFeed for StaticFeed {
    fn bar(&self, offset: usize) -> Result<Bar, DataError> {
        if offset == 0 || offset > self.bars.len() {
            return Err(DataError::unavailable("bar", offset));
        }
        Ok(self.bars[self.bars.len() - offset])
    }

    fn quote(&self) -> Quote {
        let close = self.bars.last().map(|b| b.close).unwrap_or_default();
        Quote {
            bid: close,
            ask: close,
            time: t0(),
        }
    }

    fn period(&self) -> Duration {
        Duration::hours(1)
    }

    fn bars_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<usize, DataError> {
        Ok(self
            .bars
            .iter()
            .filter(|b| b.open_time >= from && b.open_time < to)
            .count())
    }
}

#[derive(Default)]
pub struct StaticIndicators {
    pub values: HashMap<(IndicatorSeries, usize), Decimal>,
}

impl StaticIndicators {
    pub fn with(mut self, series: IndicatorSeries, offset: usize, value: Decimal) -> Self {
        self.values.insert((series, offset), value);
        self
    }
}

impl IndicatorService for StaticIndicators {
    fn value(&self, series: IndicatorSeries, offset: usize) -> Result<Decimal, DataError> {
        self.values
            .get(&(series, offset))
            .copied()
            .ok_or_else(|| DataError::unavailable(series.to_string(), offset))
    }
}
