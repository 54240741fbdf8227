use crate::error::StrategyError;
use configuration::PatternParams;
use core_types::{
    Bar, DataError, IndicatorSeries, IndicatorService, OrderSide, PatternKind, PriceFeed,
};
use rust_decimal::Decimal;

/// Direction of the move that preceded the pattern, judged by the midpoint of
/// the older bar's body against the trend average.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicroTrend {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternResult {
    pub kind: PatternKind,
    pub trend: MicroTrend,
}

impl PatternResult {
    pub fn direction(&self) -> Option<OrderSide> {
        self.kind.direction()
    }
}

/// Detects bullish and bearish engulfing formations on the two most recently closed bars.
#[derive(Debug, Clone)]
pub struct EngulfingDetector {
    body_window: usize,
}

impl EngulfingDetector {
    pub fn new(params: &PatternParams) -> Result<Self, StrategyError> {
        if params.body_window == 0 {
            return Err(StrategyError::InvalidParameters(
                "Average body window cannot be zero".to_string(),
            ));
        }
        Ok(Self {
            body_window: params.body_window,
        })
    }

    /// Mean of `|open - close|` over `body_window` consecutive bars starting at `offset`.
    pub fn average_body(&self, feed: &dyn PriceFeed, offset: usize) -> Result<Decimal, DataError> {
        let mut total = Decimal::ZERO;
        for i in offset..offset + self.body_window {
            total += feed.bar(i)?.body();
        }
        Ok(total / Decimal::from(self.body_window))
    }

    /// Scans offsets 1 and 2. Any missing input is an error, not "no pattern".
    pub fn detect(
        &self,
        feed: &dyn PriceFeed,
        indicators: &dyn IndicatorService,
    ) -> Result<PatternResult, DataError> {
        let last = feed.bar(1)?;
        let prior = feed.bar(2)?;
        let avg_body = self.average_body(feed, 1)?;
        let trend_ma = indicators.value(IndicatorSeries::TrendMa, 2)?;

        let midpoint = prior.body_midpoint();
        let trend = if midpoint > trend_ma {
            MicroTrend::Up
        } else if midpoint < trend_ma {
            MicroTrend::Down
        } else {
            MicroTrend::Flat
        };

        let kind = if is_bearish_engulfing(&last, &prior, avg_body, trend) {
            PatternKind::BearishEngulfing
        } else if is_bullish_engulfing(&last, &prior, avg_body, trend) {
            PatternKind::BullishEngulfing
        } else {
            PatternKind::None
        };

        tracing::debug!(?kind, ?trend, %avg_body, %trend_ma, "Engulfing scan complete");
        Ok(PatternResult { kind, trend })
    }
}

fn is_bearish_engulfing(last: &Bar, prior: &Bar, avg_body: Decimal, trend: MicroTrend) -> bool {
    prior.is_bullish()
        && last.open - last.close > avg_body
        && last.close < prior.open
        && trend == MicroTrend::Up
        && last.open > prior.close
}

fn is_bullish_engulfing(last: &Bar, prior: &Bar, avg_body: Decimal, trend: MicroTrend) -> bool {
    prior.is_bearish()
        && last.close - last.open > avg_body
        && last.close > prior.open
        && trend == MicroTrend::Down
        && last.open < prior.close
}
