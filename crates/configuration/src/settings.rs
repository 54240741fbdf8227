use crate::error::ConfigError;
use core_types::{AppliedPrice, MagicNumber};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

/// The root configuration structure for one controller instance.
///
/// One instance governs exactly one instrument under one strategy identity.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub instrument: Instrument,
    pub strategy: StrategySettings,
    #[serde(default)]
    pub pattern: PatternParams,
    #[serde(default)]
    pub oscillator: OscillatorParams,
    #[serde(default)]
    pub orders: OrderParams,
    #[serde(default)]
    pub exits: ExitParams,
    #[serde(default)]
    pub stops: StopSettings,
    #[serde(default)]
    pub risk: RiskLimits,
}

/// The instrument this instance trades.
#[derive(Debug, Clone, Deserialize)]
pub struct Instrument {
    /// The symbol as the broker knows it (e.g., "EURUSD").
    pub symbol: String,
    /// Smallest quoted price increment.
    pub point: Decimal,
    /// Account-currency value of one point, used by profit-target closes.
    #[serde(default = "default_point_value")]
    pub point_value: Decimal,
    /// Bar period in seconds.
    #[serde(default = "default_period_secs")]
    pub period_secs: u64,
}

fn default_point_value() -> Decimal {
    dec!(1)
}

fn default_period_secs() -> u64 {
    3600
}

/// Which signal generator drives the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum StrategyId {
    /// Engulfing pattern confirmed by the stochastic RSI.
    EngulfingStochRsi,
    /// No entries or signal exits; only stops, time/profit exits and risk.
    StopManagementOnly,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategySettings {
    pub id: StrategyId,
    /// Strategy identity stamped on every order.
    pub magic: MagicNumber,
}

/// Parameters of the engulfing detector.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PatternParams {
    /// Number of bars in the average-body window.
    pub body_window: usize,
    /// Period of the trend moving average.
    pub trend_ma_period: usize,
}

impl Default for PatternParams {
    fn default() -> Self {
        Self {
            body_window: 12,
            trend_ma_period: 5,
        }
    }
}

/// Parameters of the stochastic-over-RSI oscillator and its zones.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OscillatorParams {
    pub rsi_period: usize,
    pub stochastic_period: usize,
    pub k_smoothing: usize,
    pub d_smoothing: usize,
    pub applied_price: AppliedPrice,
    pub oversold: Decimal,
    pub overbought: Decimal,
}

impl Default for OscillatorParams {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            stochastic_period: 14,
            k_smoothing: 3,
            d_smoothing: 3,
            applied_price: AppliedPrice::Close,
            oversold: dec!(20),
            overbought: dec!(80),
        }
    }
}

/// Entry order parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrderParams {
    /// Fixed volume of every entry.
    pub lot_size: Decimal,
    /// Maximum accepted deviation from the requested price, in points.
    pub slippage_points: u32,
    /// Entry stop-loss distance for the fixed policy. 0 = none.
    pub stop_loss_points: u32,
    /// Entry take-profit distance. 0 = none.
    pub take_profit_points: u32,
}

impl Default for OrderParams {
    fn default() -> Self {
        Self {
            lot_size: dec!(0.1),
            slippage_points: 10,
            stop_loss_points: 0,
            take_profit_points: 0,
        }
    }
}

/// Time- and profit-based exits. A zero disables the exit.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExitParams {
    pub holding_bars: usize,
    pub profit_target_points: u32,
}

/// Which stop-loss policy is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum StopPolicyKind {
    #[default]
    None,
    Fixed,
    Trailing,
    BreakEven,
    Atr,
}

/// Flat `[stops]` section. Only the fields of the selected policy are read.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StopSettings {
    pub policy: StopPolicyKind,
    pub trailing_points: u32,
    pub trailing_trigger_points: u32,
    pub break_even_fee_per_lot: Decimal,
    pub break_even_trigger_points: u32,
    pub atr_period: usize,
    pub atr_multiplier: Decimal,
}

impl Default for StopSettings {
    fn default() -> Self {
        Self {
            policy: StopPolicyKind::None,
            trailing_points: 200,
            trailing_trigger_points: 0,
            break_even_fee_per_lot: Decimal::ZERO,
            break_even_trigger_points: 0,
            atr_period: 14,
            atr_multiplier: dec!(2),
        }
    }
}

/// The resolved protective-stop policy. Exactly one is active per instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopLossPolicy {
    None,
    /// Stop at `open ∓ points · point`, set once.
    Fixed { points: u32 },
    /// Stop follows price at `points` once profit reaches `trigger_points`.
    Trailing { points: u32, trigger_points: u32 },
    /// Stop moves to the volume-weighted, fee-adjusted entry once profit reaches `trigger_points`.
    BreakEven {
        fee_per_lot: Decimal,
        trigger_points: u32,
    },
    /// Stop at `open ∓ ATR · multiplier`, set once.
    Atr { period: usize, multiplier: Decimal },
}

/// Account-level limits enforced by the risk guard.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskLimits {
    /// Equity at or below this floor triggers liquidation.
    pub minimum_equity: Decimal,
    /// Maximum loss from the starting balance, in percent.
    pub max_loss_pct: Decimal,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            minimum_equity: Decimal::ZERO,
            max_loss_pct: dec!(20),
        }
    }
}

impl Config {
    /// Resolves the flat `[stops]` section into the single active policy.
    pub fn stop_policy(&self) -> StopLossPolicy {
        let s = &self.stops;
        match s.policy {
            StopPolicyKind::None => StopLossPolicy::None,
            StopPolicyKind::Fixed => StopLossPolicy::Fixed {
                points: self.orders.stop_loss_points,
            },
            StopPolicyKind::Trailing => StopLossPolicy::Trailing {
                points: s.trailing_points,
                trigger_points: s.trailing_trigger_points,
            },
            StopPolicyKind::BreakEven => StopLossPolicy::BreakEven {
                fee_per_lot: s.break_even_fee_per_lot,
                trigger_points: s.break_even_trigger_points,
            },
            StopPolicyKind::Atr => StopLossPolicy::Atr {
                period: s.atr_period,
                multiplier: s.atr_multiplier,
            },
        }
    }

    /// Checks that the parameters are usable before any trading starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

        if self.instrument.symbol.trim().is_empty() {
            return invalid("instrument.symbol must not be empty");
        }
        if self.instrument.point <= Decimal::ZERO {
            return invalid("instrument.point must be greater than 0");
        }
        if self.instrument.point_value <= Decimal::ZERO {
            return invalid("instrument.point_value must be greater than 0");
        }
        if self.instrument.period_secs == 0 {
            return invalid("instrument.period_secs must be greater than 0");
        }
        if self.pattern.body_window == 0 || self.pattern.trend_ma_period == 0 {
            return invalid("pattern.body_window and pattern.trend_ma_period must be at least 1");
        }

        let osc = &self.oscillator;
        if osc.rsi_period == 0
            || osc.stochastic_period == 0
            || osc.k_smoothing == 0
            || osc.d_smoothing == 0
        {
            return invalid("oscillator periods must be at least 1");
        }
        if osc.oversold < Decimal::ZERO
            || osc.overbought > dec!(100)
            || osc.oversold >= osc.overbought
        {
            return invalid("oscillator zones must satisfy 0 <= oversold < overbought <= 100");
        }

        if self.orders.lot_size <= Decimal::ZERO {
            return invalid("orders.lot_size must be greater than 0");
        }

        match self.stop_policy() {
            StopLossPolicy::Fixed { points } if points == 0 => {
                return invalid("the fixed stop policy needs orders.stop_loss_points > 0");
            }
            StopLossPolicy::Trailing { points, .. } if points == 0 => {
                return invalid("stops.trailing_points must be greater than 0");
            }
            StopLossPolicy::BreakEven { fee_per_lot, .. } if fee_per_lot < Decimal::ZERO => {
                return invalid("stops.break_even_fee_per_lot must not be negative");
            }
            StopLossPolicy::Atr { period, multiplier } if period == 0 || multiplier <= Decimal::ZERO => {
                return invalid("the atr stop policy needs atr_period >= 1 and atr_multiplier > 0");
            }
            _ => {}
        }

        if self.risk.minimum_equity < Decimal::ZERO {
            return invalid("risk.minimum_equity must not be negative");
        }
        if self.risk.max_loss_pct < Decimal::ZERO || self.risk.max_loss_pct >= dec!(100) {
            return invalid("risk.max_loss_pct must be in [0, 100)");
        }

        Ok(())
    }
}
