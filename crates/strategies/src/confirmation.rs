use configuration::OscillatorParams;
use core_types::{CloseSignal, DataError, IndicatorSeries, IndicatorService, PatternKind};
use rust_decimal::Decimal;

/// K and D of the stochastic RSI at one offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OscillatorReading {
    pub k: Decimal,
    pub d: Decimal,
}

/// Confirms or vetoes a pattern with the oscillator, and derives exit signals
/// from K crossings.
#[derive(Debug, Clone)]
pub struct OscillatorFilter {
    oversold: Decimal,
    overbought: Decimal,
}

impl OscillatorFilter {
    pub fn new(params: &OscillatorParams) -> Self {
        Self {
            oversold: params.oversold,
            overbought: params.overbought,
        }
    }

    pub fn reading(
        indicators: &dyn IndicatorService,
        offset: usize,
    ) -> Result<OscillatorReading, DataError> {
        Ok(OscillatorReading {
            k: indicators.value(IndicatorSeries::StochRsiK, offset)?,
            d: indicators.value(IndicatorSeries::StochRsiD, offset)?,
        })
    }

    /// Bullish needs K and D both strictly below oversold, bearish both strictly
    /// above overbought. No pattern is trivially confirmed.
    pub fn confirm(&self, pattern: PatternKind, latest: OscillatorReading) -> bool {
        match pattern {
            PatternKind::None => true,
            PatternKind::BullishEngulfing => latest.k < self.oversold && latest.d < self.oversold,
            PatternKind::BearishEngulfing => {
                latest.k > self.overbought && latest.d > self.overbought
            }
        }
    }

    /// Exit signal from K between offset 2 (`k_prev`) and offset 1 (`k_last`).
    ///
    /// A downward cross of either zone boundary closes longs, an upward cross
    /// closes shorts.
    pub fn close_signal(&self, k_last: Decimal, k_prev: Decimal) -> CloseSignal {
        let crossed_down = |level: Decimal| k_prev > level && k_last < level;
        let crossed_up = |level: Decimal| k_prev < level && k_last > level;

        if crossed_down(self.overbought) || crossed_down(self.oversold) {
            CloseSignal::CloseLong
        } else if crossed_up(self.oversold) || crossed_up(self.overbought) {
            CloseSignal::CloseShort
        } else {
            CloseSignal::None
        }
    }
}
