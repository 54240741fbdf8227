use crate::error::EngineError;
use crate::market::{MarketData, MarketEvent};
use crate::reconcile::{plan_stage, Action, LifecycleParams, Signals, Snapshot, Stage};
use crate::stops::DistanceKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use configuration::{Config, StopLossPolicy};
use core_types::{
    period_start, DataError, IndicatorSeries, IndicatorService, Position, PositionId, PriceFeed, Quote,
};
use events::{CloseReason, ControllerEvent, RejectedOperation};
use executor::{Account, Broker, BrokerError, PaperBroker};
use risk::{GuardStatus, Liquidation, LiquidationFailure, RiskGuard};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use strategies::{create_strategy, SignalState, Strategy, StrategyError};
use tokio::sync::{broadcast, mpsc};

/// Receives every quote before the controller ticks on it.
#[async_trait]
pub trait QuoteSink: Send + Sync {
    async fn on_quote(&self, symbol: &str, quote: Quote);
}

#[async_trait]
impl QuoteSink for PaperBroker {
    async fn on_quote(&self, symbol: &str, quote: Quote) {
        self.update_quote(symbol, quote).await;
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    pub events: Vec<ControllerEvent>,
    /// The risk guard has halted trading.
    pub halted: bool,
    /// Some positions or orders survived liquidation and will be swept again.
    pub pending_liquidation: bool,
}

/// The position-lifecycle controller for one (instrument, magic number) pair.
///
/// The controller keeps only the signal state between ticks. Positions are
/// listed from the broker before every lifecycle stage.
pub struct StrategyController {
    config: Config,
    params: LifecycleParams,
    strategy: Box<dyn Strategy>,
    signals: SignalState,
    guard: RiskGuard,
    broker: Arc<dyn Broker>,
    account: Arc<dyn Account>,
    events_tx: Option<broadcast::Sender<ControllerEvent>>,
    quote_sink: Option<Arc<dyn QuoteSink>>,
}

impl StrategyController {
    /// Builds the configured strategy and arms the risk guard with the
    /// current account balance.
    pub async fn new(
        config: Config,
        broker: Arc<dyn Broker>,
        account: Arc<dyn Account>,
    ) -> Result<Self, EngineError> {
        let strategy = create_strategy(config.strategy.id, &config)?;
        let guard = RiskGuard::start(
            account.as_ref(),
            &config.risk,
            &config.instrument.symbol,
            config.strategy.magic,
        )
        .await?;
        tracing::info!(
            symbol = %config.instrument.symbol,
            magic = %config.strategy.magic,
            strategy = strategy.name(),
            "Controller ready"
        );

        Ok(Self {
            params: LifecycleParams::from_config(&config),
            config,
            strategy,
            signals: SignalState::new(),
            guard,
            broker,
            account,
            events_tx: None,
            quote_sink: None,
        })
    }

    /// Publishes every event on `tx` as well as returning it from `on_tick`.
    pub fn with_event_sink(mut self, tx: broadcast::Sender<ControllerEvent>) -> Self {
        self.events_tx = Some(tx);
        self
    }

    /// Replaces the strategy built from the configuration.
    pub fn with_strategy(mut self, strategy: Box<dyn Strategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_quote_sink(mut self, sink: Arc<dyn QuoteSink>) -> Self {
        self.quote_sink = Some(sink);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn signals(&self) -> &SignalState {
        &self.signals
    }

    pub fn is_halted(&self) -> bool {
        self.guard.is_halted()
    }

    /// Drives ticks from market events until the channel closes, or until the
    /// guard has halted and nothing is left to liquidate.
    pub async fn run(&mut self, mut rx: mpsc::Receiver<MarketEvent>) -> Result<(), EngineError> {
        let mut market = MarketData::new(&self.config);

        while let Some(event) = rx.recv().await {
            if let Err(e) = market.apply(&event) {
                tracing::error!(error = %e, "Discarding market event");
                continue;
            }
            if let (MarketEvent::Quote(quote), Some(sink)) = (&event, &self.quote_sink) {
                sink.on_quote(&self.params.symbol, *quote).await;
            }
            if !market.has_quote() {
                continue;
            }

            match self.on_tick(&market, market.indicators()).await {
                Ok(outcome) if outcome.halted && !outcome.pending_liquidation => {
                    tracing::info!("Trading halted, controller stopping");
                    break;
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Tick failed, retrying on the next event"),
            }
        }
        Ok(())
    }

    /// Runs one tick to completion: risk check, bar evaluation when a new bar
    /// has opened, then every lifecycle stage in order.
    pub async fn on_tick(
        &mut self,
        feed: &dyn PriceFeed,
        indicators: &dyn IndicatorService,
    ) -> Result<TickOutcome, EngineError> {
        let mut outcome = TickOutcome::default();
        let result = self.tick(feed, indicators, &mut outcome).await;
        self.publish(&outcome.events);
        result.map(|()| outcome)
    }

    async fn tick(
        &mut self,
        feed: &dyn PriceFeed,
        indicators: &dyn IndicatorService,
        outcome: &mut TickOutcome,
    ) -> Result<(), EngineError> {
        let quote = feed.quote();
        let now = quote.time;
        let events = &mut outcome.events;

        match self
            .guard
            .check_and_enforce(self.account.as_ref(), self.broker.as_ref())
            .await?
        {
            GuardStatus::Clear => {}
            GuardStatus::Breached {
                equity,
                floor,
                liquidation,
            } => {
                events.push(ControllerEvent::RiskBreach {
                    time: now,
                    equity,
                    floor,
                });
                record_liquidation(now, &liquidation, events);
                events.push(ControllerEvent::Halted { time: now });
                outcome.halted = true;
                outcome.pending_liquidation = !liquidation.is_complete();
                return Ok(());
            }
            GuardStatus::Halted { liquidation } => {
                record_liquidation(now, &liquidation, events);
                outcome.halted = true;
                outcome.pending_liquidation = !liquidation.is_complete();
                return Ok(());
            }
        }

        if self.signals.is_due(now) {
            self.evaluate(feed, indicators, now, events)?;
        }

        let mut warned: BTreeSet<DistanceKind> = BTreeSet::new();
        for stage in Stage::ORDER {
            self.run_stage(stage, feed, indicators, &quote, &mut warned, events)
                .await?;
        }
        Ok(())
    }

    fn evaluate(
        &mut self,
        feed: &dyn PriceFeed,
        indicators: &dyn IndicatorService,
        now: DateTime<Utc>,
        events: &mut Vec<ControllerEvent>,
    ) -> Result<(), EngineError> {
        let period = feed.period();
        let bar_open = period_start(now, period);

        let evaluation = latest_bar_is_current(feed, bar_open)
            .map_err(StrategyError::from)
            .and_then(|()| self.strategy.evaluate(feed, indicators));

        match evaluation {
            Ok(snapshot) => {
                self.signals.commit(snapshot, bar_open, period);
                if !self.signals.open_signal().is_none() || !self.signals.close_signal().is_none() {
                    tracing::info!(
                        %bar_open,
                        pattern = ?snapshot.pattern,
                        open = ?self.signals.open_signal(),
                        close = ?self.signals.close_signal(),
                        "New signal"
                    );
                }
                events.push(ControllerEvent::SignalEvaluated {
                    time: now,
                    bar_open,
                    pattern: snapshot.pattern,
                    open: self.signals.open_signal(),
                    close: self.signals.close_signal(),
                });
                Ok(())
            }
            Err(StrategyError::Data(e)) => {
                tracing::warn!(error = %e, "Signal evaluation deferred, data unavailable");
                events.push(ControllerEvent::DataUnavailable {
                    time: now,
                    detail: e.to_string(),
                });
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn run_stage(
        &mut self,
        stage: Stage,
        feed: &dyn PriceFeed,
        indicators: &dyn IndicatorService,
        quote: &Quote,
        warned: &mut BTreeSet<DistanceKind>,
        events: &mut Vec<ControllerEvent>,
    ) -> Result<(), EngineError> {
        let positions = self.list_positions().await?;
        let signals = Signals {
            open: self.signals.open_signal(),
            close: self.signals.close_signal(),
        };

        let snapshot = Snapshot {
            positions: &positions,
            quote: *quote,
            atr: match (stage, self.params.policy) {
                (Stage::InitialStops, StopLossPolicy::Atr { .. }) => latest_atr(indicators),
                _ => None,
            },
            elapsed_bars: match stage {
                Stage::Expiry if self.params.holding_bars > 0 => {
                    elapsed_bars(feed, &positions, quote.time)
                }
                _ => BTreeMap::new(),
            },
        };
        let plan = plan_stage(stage, &self.params, &snapshot, signals);

        for kind in &plan.widened {
            if warned.insert(*kind) {
                tracing::warn!(
                    distance = %kind,
                    spread = %quote.spread(),
                    "Configured distance is narrower than the spread, using the spread"
                );
            }
        }

        let planned = plan.actions.len();
        let mut succeeded = 0;
        for action in plan.actions {
            if self.execute(action, quote, events).await {
                succeeded += 1;
            }
        }

        match stage {
            Stage::CloseSignaled => {
                if let Some(side) = signals.close.side() {
                    let remaining = if planned > 0 {
                        self.list_positions().await?
                    } else {
                        positions
                    };
                    if !remaining.iter().any(|p| p.side == side) {
                        self.signals.consume_close();
                    }
                }
            }
            Stage::OpenSignaled => {
                if let Some(side) = signals.open.side() {
                    let already_open = positions.iter().any(|p| p.side == side);
                    if already_open || (planned > 0 && succeeded == planned) {
                        self.signals.consume_open();
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn list_positions(&self) -> Result<Vec<Position>, EngineError> {
        Ok(self
            .broker
            .list_positions(&self.params.symbol, self.params.magic)
            .await?)
    }

    /// Sends one action to the broker and records the result. Returns whether it succeeded.
    async fn execute(&self, action: Action, quote: &Quote, events: &mut Vec<ControllerEvent>) -> bool {
        let now = quote.time;
        match action {
            Action::Open(request) => match self.broker.open_market(&request).await {
                Ok(position_id) => {
                    let price = quote.entry_price(request.side);
                    tracing::info!(
                        position = %position_id,
                        side = %request.side,
                        volume = %request.volume,
                        %price,
                        "Position opened"
                    );
                    events.push(ControllerEvent::PositionOpened {
                        time: now,
                        position_id,
                        side: request.side,
                        volume: request.volume,
                        price,
                        stop_loss: request.stop_loss,
                        take_profit: request.take_profit,
                    });
                    true
                }
                Err(e) => {
                    rejected(now, RejectedOperation::Open, None, &e, events);
                    false
                }
            },
            Action::Close {
                position_id,
                side,
                reason,
            } => match self.broker.close(position_id).await {
                Ok(()) => {
                    tracing::info!(position = %position_id, %side, ?reason, "Position closed");
                    events.push(ControllerEvent::PositionClosed {
                        time: now,
                        position_id,
                        side,
                        reason,
                    });
                    true
                }
                Err(e) => {
                    rejected(now, RejectedOperation::Close, Some(position_id), &e, events);
                    false
                }
            },
            Action::ModifyStop {
                position_id,
                previous,
                stop_loss,
                take_profit,
                reason,
            } => match self
                .broker
                .modify_stop(position_id, stop_loss, take_profit)
                .await
            {
                Ok(()) => {
                    tracing::info!(position = %position_id, %stop_loss, ?reason, "Stop moved");
                    events.push(ControllerEvent::StopModified {
                        time: now,
                        position_id,
                        previous,
                        stop_loss,
                        reason,
                    });
                    true
                }
                Err(e) => {
                    rejected(now, RejectedOperation::ModifyStop, Some(position_id), &e, events);
                    false
                }
            },
        }
    }

    fn publish(&self, events: &[ControllerEvent]) {
        if let Some(tx) = &self.events_tx {
            for event in events {
                // No subscribers is not an error.
                let _ = tx.send(event.clone());
            }
        }
    }
}

fn rejected(
    time: DateTime<Utc>,
    operation: RejectedOperation,
    position_id: Option<PositionId>,
    error: &BrokerError,
    events: &mut Vec<ControllerEvent>,
) {
    tracing::warn!(?operation, position = ?position_id, %error, "Broker rejected request");
    events.push(ControllerEvent::OrderRejected {
        time,
        operation,
        position_id,
        reason: error.to_string(),
    });
}

fn record_liquidation(time: DateTime<Utc>, liquidation: &Liquidation, events: &mut Vec<ControllerEvent>) {
    for position in &liquidation.closed {
        events.push(ControllerEvent::PositionClosed {
            time,
            position_id: position.position_id,
            side: position.side,
            reason: CloseReason::RiskBreach,
        });
    }
    for order_id in &liquidation.cancelled {
        events.push(ControllerEvent::OrderCancelled {
            time,
            order_id: *order_id,
        });
    }
    for failure in &liquidation.failures {
        let (operation, position_id, error) = match failure {
            LiquidationFailure::Close { position_id, error } => {
                (RejectedOperation::Close, Some(*position_id), error)
            }
            LiquidationFailure::Cancel { error, .. } => (RejectedOperation::Cancel, None, error),
            LiquidationFailure::Listing(error) => (RejectedOperation::Close, None, error),
        };
        rejected(time, operation, position_id, error, events);
    }
}

fn latest_atr(indicators: &dyn IndicatorService) -> Option<rust_decimal::Decimal> {
    match indicators.value(IndicatorSeries::Atr, 1) {
        Ok(atr) => Some(atr),
        Err(e) => {
            tracing::debug!(error = %e, "ATR unavailable, initial stop deferred");
            None
        }
    }
}

/// The bar at offset 1 must be the one that closed at `bar_open`. A quote can
/// reach a new period before that period's closing bar does.
fn latest_bar_is_current(feed: &dyn PriceFeed, bar_open: DateTime<Utc>) -> Result<(), DataError> {
    let expected = bar_open - feed.period();
    let latest = feed.bar(1)?;
    if latest.open_time == expected {
        Ok(())
    } else {
        Err(DataError::StaleBar {
            latest: latest.open_time.to_rfc3339(),
            expected: expected.to_rfc3339(),
        })
    }
}

/// Completed bars since each position's opening bar. A position opened in
/// the current period has 0.
fn elapsed_bars(
    feed: &dyn PriceFeed,
    positions: &[Position],
    now: DateTime<Utc>,
) -> BTreeMap<PositionId, Option<usize>> {
    let period = feed.period();
    let current = period_start(now, period);
    positions
        .iter()
        .map(|p| {
            let opened = period_start(p.open_time, period);
            let elapsed = if opened >= current {
                Ok(0)
            } else {
                feed.bars_between(opened, current)
            };
            let elapsed = match elapsed {
                Ok(n) => Some(n),
                Err(e) => {
                    tracing::warn!(position = %p.position_id, error = %e, "Bar count unavailable, treating position as expired");
                    None
                }
            };
            (p.position_id, elapsed)
        })
        .collect()
}
