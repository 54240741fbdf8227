#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use configuration::{parse_config, Config};
use core_types::{
    Bar, CloseSignal, IndicatorService, MagicNumber, OpenSignal, OrderSide, PatternKind, PositionId,
    PriceFeed, Quote,
};
use engine::{MarketData, MarketEvent, StrategyController};
use executor::{Broker, OpenRequest, PaperBroker};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use strategies::{SignalSnapshot, Strategy, StrategyError};

pub const SYMBOL: &str = "XAUUSD";
pub const MAGIC: MagicNumber = MagicNumber(7);

/// A config for `XAUUSD` with `point = 0.01` and hourly bars. `extra` is
/// appended verbatim and may add whole sections.
pub fn config(strategy: &str, extra: &str) -> Config {
    let toml = format!(
        r#"
        [instrument]
        symbol = "{SYMBOL}"
        point = "0.01"
        point_value = "0.1"
        period_secs = 3600

        [strategy]
        id = "{strategy}"
        magic = 7

        {extra}
        "#
    );
    parse_config(&toml).unwrap()
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap()
}

pub fn at(hours: i64, minutes: i64) -> DateTime<Utc> {
    t0() + Duration::hours(hours) + Duration::minutes(minutes)
}

pub fn quote(bid: Decimal, ask: Decimal, time: DateTime<Utc>) -> Quote {
    Quote { bid, ask, time }
}

/// Flat hourly bars opening at `t0` for `count` hours.
pub fn flat_bars(count: i64, price: Decimal) -> Vec<MarketEvent> {
    (0..count)
        .map(|h| {
            MarketEvent::Bar(Bar {
                open_time: at(h, 0),
                open: price,
                high: price + dec!(0.5),
                low: price - dec!(0.5),
                close: price,
            })
        })
        .collect()
}

/// Market data holding `hours` flat bars from `t0`, so quotes in the next
/// hour see an up-to-date history.
pub fn history(config: &Config, hours: i64) -> MarketData {
    let mut market = MarketData::new(config);
    for bar in flat_bars(hours, dec!(100)) {
        market.apply(&bar).unwrap();
    }
    market
}

/// Paper account with `point_value / point` as the contract size.
pub fn paper(balance: Decimal, config: &Config) -> Arc<PaperBroker> {
    Arc::new(PaperBroker::new(
        balance,
        config.instrument.point_value / config.instrument.point,
    ))
}

pub async fn controller(config: &Config, broker: &Arc<PaperBroker>) -> StrategyController {
    StrategyController::new(config.clone(), broker.clone(), broker.clone())
        .await
        .unwrap()
}

/// Moves the broker and the market to `quote`.
pub async fn set_quote(broker: &PaperBroker, market: &mut MarketData, quote: Quote) {
    broker.update_quote(SYMBOL, quote).await;
    market.apply(&MarketEvent::Quote(quote)).unwrap();
}

/// Opens a position directly on the broker at its current quote.
pub async fn open(broker: &PaperBroker, side: OrderSide, volume: Decimal) -> PositionId {
    broker
        .open_market(&OpenRequest::new(SYMBOL, MAGIC, side, volume))
        .await
        .unwrap()
}

/// Returns the same snapshot on every bar.
pub struct Scripted(pub SignalSnapshot);

impl Scripted {
    pub fn open(side: OpenSignal) -> Box<dyn Strategy> {
        let pattern = match side {
            OpenSignal::Buy => PatternKind::BullishEngulfing,
            OpenSignal::Sell => PatternKind::BearishEngulfing,
            OpenSignal::None => PatternKind::None,
        };
        Box::new(Scripted(SignalSnapshot {
            pattern,
            open: side,
            close: CloseSignal::None,
        }))
    }

    pub fn close(close: CloseSignal) -> Box<dyn Strategy> {
        Box::new(Scripted(SignalSnapshot {
            pattern: PatternKind::None,
            open: OpenSignal::None,
            close,
        }))
    }
}

impl Strategy for Scripted {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn evaluate(
        &mut self,
        _feed: &dyn PriceFeed,
        _indicators: &dyn IndicatorService,
    ) -> Result<SignalSnapshot, StrategyError> {
        Ok(self.0)
    }
}
