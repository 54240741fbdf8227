use crate::error::EngineError;
use chrono::{DateTime, Duration, Utc};
use configuration::Config;
use core_types::{Bar, DataError, PriceFeed, Quote};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strategies::{BarSeriesIndicators, IndicatorParams};

/// Bars kept in memory when no capacity is given.
pub const DEFAULT_HISTORY: usize = 1_000;

/// A market update for the controller's instrument.
///
/// As JSON: `{"type":"bar","open_time":"...","open":"1.1",...}` for a closed
/// bar, `{"type":"quote","bid":"1.1","ask":"1.1002","time":"..."}` for a quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketEvent {
    /// A bar that has closed.
    Bar(Bar),
    Quote(Quote),
}

impl FromStr for MarketEvent {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(serde_json::from_str(s)?)
    }
}

/// Rolling bar history and top of book, with indicators recomputed on every
/// closed bar. Serves as the controller's `PriceFeed`.
pub struct MarketData {
    period: Duration,
    capacity: usize,
    bars: Vec<Bar>,
    quote: Option<Quote>,
    params: IndicatorParams,
    indicators: BarSeriesIndicators,
}

impl MarketData {
    pub fn new(config: &Config) -> Self {
        Self {
            period: Duration::seconds(config.instrument.period_secs as i64),
            capacity: DEFAULT_HISTORY,
            bars: Vec::new(),
            quote: None,
            params: IndicatorParams::from_config(config),
            indicators: BarSeriesIndicators::default(),
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn has_quote(&self) -> bool {
        self.quote.is_some()
    }

    pub fn indicators(&self) -> &BarSeriesIndicators {
        &self.indicators
    }

    /// Folds one event into the history.
    ///
    /// A bar with the same open time as the last one replaces it; an older bar
    /// is ignored.
    pub fn apply(&mut self, event: &MarketEvent) -> Result<(), EngineError> {
        match event {
            MarketEvent::Quote(quote) => {
                self.quote = Some(*quote);
                Ok(())
            }
            MarketEvent::Bar(bar) => {
                let bar = Bar::new(bar.open_time, bar.open, bar.high, bar.low, bar.close)?;
                match self.bars.last() {
                    Some(last) if bar.open_time < last.open_time => {
                        tracing::warn!(open_time = %bar.open_time, last = %last.open_time, "Ignoring out-of-order bar");
                        return Ok(());
                    }
                    Some(last) if bar.open_time == last.open_time => {
                        self.bars.pop();
                    }
                    _ => {}
                }
                self.bars.push(bar);
                if self.bars.len() > self.capacity {
                    let excess = self.bars.len() - self.capacity;
                    self.bars.drain(..excess);
                }
                self.indicators = BarSeriesIndicators::compute(&self.params, &self.bars)?;
                Ok(())
            }
        }
    }
}

impl PriceFeed for MarketData {
    fn bar(&self, offset: usize) -> Result<Bar, DataError> {
        if offset == 0 || offset > self.bars.len() {
            return Err(DataError::unavailable("bar", offset));
        }
        Ok(self.bars[self.bars.len() - offset])
    }

    /// The last quote, or the last close before any quote has arrived.
    fn quote(&self) -> Quote {
        self.quote.unwrap_or_else(|| match self.bars.last() {
            Some(bar) => Quote {
                bid: bar.close,
                ask: bar.close,
                time: bar.open_time + self.period,
            },
            None => Quote {
                bid: Default::default(),
                ask: Default::default(),
                time: DateTime::<Utc>::UNIX_EPOCH,
            },
        })
    }

    fn period(&self) -> Duration {
        self.period
    }

    /// Fails when `from` predates the retained history.
    fn bars_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<usize, DataError> {
        match self.bars.first() {
            Some(first) if first.open_time <= from => Ok(self
                .bars
                .iter()
                .filter(|b| b.open_time >= from && b.open_time < to)
                .count()),
            _ => Err(DataError::BarCountUnavailable {
                from: from.to_rfc3339(),
                to: to.to_rfc3339(),
            }),
        }
    }
}
