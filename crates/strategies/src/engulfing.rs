use crate::confirmation::OscillatorFilter;
use crate::error::StrategyError;
use crate::pattern::EngulfingDetector;
use crate::signal::SignalSnapshot;
use crate::Strategy;
use configuration::Config;
use core_types::{CloseSignal, IndicatorSeries, IndicatorService, OpenSignal, OrderSide, PriceFeed};

/// Engulfing reversal entries confirmed by the stochastic RSI, with exits on
/// K crossing the zone boundaries.
pub struct EngulfingStochRsi {
    detector: EngulfingDetector,
    filter: OscillatorFilter,
}

impl EngulfingStochRsi {
    pub fn new(config: &Config) -> Result<Self, StrategyError> {
        Ok(Self {
            detector: EngulfingDetector::new(&config.pattern)?,
            filter: OscillatorFilter::new(&config.oscillator),
        })
    }
}

impl Strategy for EngulfingStochRsi {
    fn name(&self) -> &'static str {
        "engulfing_stoch_rsi"
    }

    fn evaluate(
        &mut self,
        feed: &dyn PriceFeed,
        indicators: &dyn IndicatorService,
    ) -> Result<SignalSnapshot, StrategyError> {
        let pattern = self.detector.detect(feed, indicators)?;

        let open = match pattern.direction() {
            Some(side) => {
                let latest = OscillatorFilter::reading(indicators, 1)?;
                if self.filter.confirm(pattern.kind, latest) {
                    match side {
                        OrderSide::Buy => OpenSignal::Buy,
                        OrderSide::Sell => OpenSignal::Sell,
                    }
                } else {
                    tracing::debug!(kind = ?pattern.kind, k = %latest.k, d = %latest.d, "Pattern vetoed by oscillator");
                    OpenSignal::None
                }
            }
            None => OpenSignal::None,
        };

        // Exits are only looked at when no entry is live for this bar.
        let close = if open.is_none() {
            let k_last = indicators.value(IndicatorSeries::StochRsiK, 1)?;
            let k_prev = indicators.value(IndicatorSeries::StochRsiK, 2)?;
            self.filter.close_signal(k_last, k_prev)
        } else {
            CloseSignal::None
        };

        Ok(SignalSnapshot {
            pattern: pattern.kind,
            open,
            close,
        })
    }
}
