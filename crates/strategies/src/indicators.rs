//! An [`IndicatorService`] computed from a window of closed bars.

use crate::error::StrategyError;
use configuration::Config;
use core_types::{AppliedPrice, Bar, DataError, IndicatorSeries, IndicatorService};
use rust_decimal::prelude::*;
use ta::indicators::{
    AverageTrueRange, Maximum, Minimum, RelativeStrengthIndex, SimpleMovingAverage as Sma,
};
use ta::{DataItem, Next, Reset};

/// Periods of the series this service computes.
#[derive(Debug, Clone)]
pub struct IndicatorParams {
    pub rsi_period: usize,
    pub stochastic_period: usize,
    pub k_smoothing: usize,
    pub d_smoothing: usize,
    pub applied_price: AppliedPrice,
    pub trend_ma_period: usize,
    pub atr_period: usize,
}

impl IndicatorParams {
    pub fn from_config(config: &Config) -> Self {
        Self {
            rsi_period: config.oscillator.rsi_period,
            stochastic_period: config.oscillator.stochastic_period,
            k_smoothing: config.oscillator.k_smoothing,
            d_smoothing: config.oscillator.d_smoothing,
            applied_price: config.oscillator.applied_price,
            trend_ma_period: config.pattern.trend_ma_period,
            atr_period: config.stops.atr_period,
        }
    }
}

/// Indicator values over closed bars, stored oldest first.
///
/// Each series holds `None` for bars inside its warm-up region, which the
/// service reports as unavailable.
#[derive(Debug, Clone, Default)]
pub struct BarSeriesIndicators {
    k: Vec<Option<Decimal>>,
    d: Vec<Option<Decimal>>,
    trend_ma: Vec<Option<Decimal>>,
    atr: Vec<Option<Decimal>>,
}

impl BarSeriesIndicators {
    /// Computes every series over `bars` (oldest first).
    pub fn compute(params: &IndicatorParams, bars: &[Bar]) -> Result<Self, StrategyError> {
        let applied: Vec<f64> = bars
            .iter()
            .map(|b| to_f64(b.applied(params.applied_price)))
            .collect();
        let closes: Vec<f64> = bars.iter().map(|b| to_f64(b.close)).collect();

        let rsi = rsi_series(&applied, params.rsi_period)?;
        let raw = stochastic(&rsi, params.stochastic_period)?;
        let k = rolling_mean(&raw, params.k_smoothing)?;
        let d = rolling_mean(&k, params.d_smoothing)?;

        Ok(Self {
            k: to_decimals(&k),
            d: to_decimals(&d),
            trend_ma: to_decimals(&sma_series(&closes, params.trend_ma_period)?),
            atr: to_decimals(&atr_series(bars, params.atr_period)?),
        })
    }

    pub fn len(&self) -> usize {
        self.k.len()
    }

    pub fn is_empty(&self) -> bool {
        self.k.is_empty()
    }

    fn series(&self, series: IndicatorSeries) -> &[Option<Decimal>] {
        match series {
            IndicatorSeries::StochRsiK => &self.k,
            IndicatorSeries::StochRsiD => &self.d,
            IndicatorSeries::TrendMa => &self.trend_ma,
            IndicatorSeries::Atr => &self.atr,
        }
    }
}

impl IndicatorService for BarSeriesIndicators {
    fn value(&self, series: IndicatorSeries, offset: usize) -> Result<Decimal, DataError> {
        let values = self.series(series);
        if offset == 0 || offset > values.len() {
            return Err(DataError::unavailable(series.to_string(), offset));
        }
        values[values.len() - offset].ok_or_else(|| DataError::unavailable(series.to_string(), offset))
    }
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}

fn to_decimals(values: &[Option<f64>]) -> Vec<Option<Decimal>> {
    values
        .iter()
        .map(|v| v.and_then(Decimal::from_f64))
        .collect()
}

fn ta_error(e: ta::errors::TaError) -> StrategyError {
    StrategyError::IndicatorError(format!("{:?}", e))
}

/// RSI of `values`; the first `period` outputs are warm-up.
fn rsi_series(values: &[f64], period: usize) -> Result<Vec<Option<f64>>, StrategyError> {
    let mut rsi = RelativeStrengthIndex::new(period).map_err(ta_error)?;
    Ok(values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let out = rsi.next(*v);
            (i >= period).then_some(out)
        })
        .collect())
}

fn sma_series(values: &[f64], period: usize) -> Result<Vec<Option<f64>>, StrategyError> {
    let mut sma = Sma::new(period).map_err(ta_error)?;
    Ok(values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let out = sma.next(*v);
            (i + 1 >= period).then_some(out)
        })
        .collect())
}

fn atr_series(bars: &[Bar], period: usize) -> Result<Vec<Option<f64>>, StrategyError> {
    let mut atr = AverageTrueRange::new(period).map_err(ta_error)?;
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let item = DataItem::builder()
                .open(to_f64(bar.open))
                .high(to_f64(bar.high))
                .low(to_f64(bar.low))
                .close(to_f64(bar.close))
                .volume(0.0)
                .build()
                .map_err(ta_error)?;
            let out = atr.next(&item);
            Ok((i >= period).then_some(out))
        })
        .collect()
}

/// Raw stochastic of `values` over `period`: `100 * (v - min) / (max - min)`,
/// 0 when the window is flat.
fn stochastic(values: &[Option<f64>], period: usize) -> Result<Vec<Option<f64>>, StrategyError> {
    let mut max = Maximum::new(period).map_err(ta_error)?;
    let mut min = Minimum::new(period).map_err(ta_error)?;
    let mut seen = 0;
    Ok(values
        .iter()
        .map(|v| {
            let Some(v) = *v else {
                seen = 0;
                max.reset();
                min.reset();
                return None;
            };
            seen += 1;
            let (hi, lo) = (max.next(v), min.next(v));
            if seen < period {
                None
            } else if hi - lo <= f64::EPSILON {
                Some(0.0)
            } else {
                Some(100.0 * (v - lo) / (hi - lo))
            }
        })
        .collect())
}

/// Simple mean over `period` values, `None` unless the whole window is present.
fn rolling_mean(values: &[Option<f64>], period: usize) -> Result<Vec<Option<f64>>, StrategyError> {
    let mut sma = Sma::new(period).map_err(ta_error)?;
    let mut seen = 0;
    Ok(values
        .iter()
        .map(|v| {
            let Some(v) = *v else {
                seen = 0;
                sma.reset();
                return None;
            };
            seen += 1;
            let out = sma.next(v);
            (seen >= period).then_some(out)
        })
        .collect())
}
