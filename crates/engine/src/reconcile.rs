//! Pure reconciliation: broker snapshot in, actions out.
//!
//! Nothing here talks to the broker or keeps state between calls. The
//! controller lists positions afresh before every [`Stage`] and executes the
//! returned [`Plan`].

use crate::stops::{self, DistanceKind};
use configuration::{Config, StopLossPolicy};
use core_types::{CloseSignal, MagicNumber, OpenSignal, OrderSide, Position, PositionId, Quote};
use events::{CloseReason, StopReason};
use executor::OpenRequest;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};

/// The configuration the lifecycle decisions depend on.
#[derive(Debug, Clone)]
pub struct LifecycleParams {
    pub symbol: String,
    pub magic: MagicNumber,
    pub point: Decimal,
    pub point_value: Decimal,
    pub lot_size: Decimal,
    pub slippage_points: u32,
    pub take_profit_points: u32,
    pub holding_bars: usize,
    pub profit_target_points: u32,
    pub policy: StopLossPolicy,
}

impl LifecycleParams {
    pub fn from_config(config: &Config) -> Self {
        Self {
            symbol: config.instrument.symbol.clone(),
            magic: config.strategy.magic,
            point: config.instrument.point,
            point_value: config.instrument.point_value,
            lot_size: config.orders.lot_size,
            slippage_points: config.orders.slippage_points,
            take_profit_points: config.orders.take_profit_points,
            holding_bars: config.exits.holding_bars,
            profit_target_points: config.exits.profit_target_points,
            policy: config.stop_policy(),
        }
    }
}

/// The broker's view of this identity at one moment, plus the market inputs
/// the stages need.
#[derive(Debug, Clone)]
pub struct Snapshot<'a> {
    pub positions: &'a [Position],
    pub quote: Quote,
    /// Latest ATR, when the ATR policy is active and the value is available.
    pub atr: Option<Decimal>,
    /// Completed bars since each position opened. `None` means the count could
    /// not be obtained; such positions are treated as expired.
    pub elapsed_bars: BTreeMap<PositionId, Option<usize>>,
}

/// The live signals a tick acts on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signals {
    pub open: OpenSignal,
    pub close: CloseSignal,
}

/// One broker request.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Open(OpenRequest),
    Close {
        position_id: PositionId,
        side: OrderSide,
        reason: CloseReason,
    },
    ModifyStop {
        position_id: PositionId,
        previous: Option<Decimal>,
        stop_loss: Decimal,
        take_profit: Option<Decimal>,
        reason: StopReason,
    },
}

/// Actions of one stage, plus the distances that were widened to the spread.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub actions: Vec<Action>,
    pub widened: BTreeSet<DistanceKind>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Lifecycle steps, in the order a tick runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CloseSignaled,
    OpenSignaled,
    InitialStops,
    ProfitTarget,
    Expiry,
    StopAdjustment,
}

impl Stage {
    pub const ORDER: [Stage; 6] = [
        Stage::CloseSignaled,
        Stage::OpenSignaled,
        Stage::InitialStops,
        Stage::ProfitTarget,
        Stage::Expiry,
        Stage::StopAdjustment,
    ];
}

pub fn plan_stage(
    stage: Stage,
    params: &LifecycleParams,
    snapshot: &Snapshot<'_>,
    signals: Signals,
) -> Plan {
    match stage {
        Stage::CloseSignaled => close_if_signaled(snapshot, signals.close),
        Stage::OpenSignaled => open_if_signaled(params, snapshot, signals.open),
        Stage::InitialStops => initial_stops(params, snapshot),
        Stage::ProfitTarget => close_by_profit_target(params, snapshot),
        Stage::Expiry => close_expired_by_time(params, snapshot),
        Stage::StopAdjustment => adjust_stops(params, snapshot),
    }
}

/// Closes every position whose direction matches the close-signal.
pub fn close_if_signaled(snapshot: &Snapshot<'_>, close: CloseSignal) -> Plan {
    let Some(side) = close.side() else {
        return Plan::default();
    };
    Plan {
        actions: snapshot
            .positions
            .iter()
            .filter(|p| p.side == side)
            .map(|p| Action::Close {
                position_id: p.position_id,
                side: p.side,
                reason: CloseReason::Signal,
            })
            .collect(),
        widened: BTreeSet::new(),
    }
}

/// Requests a market entry when the open-signal is live and no position of
/// that direction exists yet.
pub fn open_if_signaled(params: &LifecycleParams, snapshot: &Snapshot<'_>, open: OpenSignal) -> Plan {
    let mut plan = Plan::default();
    let Some(side) = open.side() else {
        return plan;
    };
    if snapshot.positions.iter().any(|p| p.side == side) {
        return plan;
    }

    let quote = &snapshot.quote;
    let price = quote.entry_price(side);
    let spread = quote.spread();

    let mut request = OpenRequest::new(&params.symbol, params.magic, side, params.lot_size);
    request.slippage_points = params.slippage_points;

    if let StopLossPolicy::Fixed { points } = params.policy {
        if points > 0 {
            let distance = stops::spread_aware_distance(points, params.point, spread);
            if distance.widened {
                plan.widened.insert(DistanceKind::StopLoss);
            }
            let from_entry = stops::stop_from(side, price, distance.price);
            // Widened by the spread, the entry-based stop lands on the exit price.
            request.stop_loss = Some(if stops::is_protective(side, from_entry, quote) {
                from_entry
            } else {
                stops::stop_from(side, quote.exit_price(side), distance.price)
            });
        }
    }
    if params.take_profit_points > 0 {
        let distance = stops::spread_aware_distance(params.take_profit_points, params.point, spread);
        if distance.widened {
            plan.widened.insert(DistanceKind::TakeProfit);
        }
        request.take_profit = Some(stops::target_from(side, price, distance.price));
    }

    plan.actions.push(Action::Open(request));
    plan
}

/// Sets the first stop of positions that have none, under the fixed and ATR policies.
pub fn initial_stops(params: &LifecycleParams, snapshot: &Snapshot<'_>) -> Plan {
    let mut plan = Plan::default();
    let quote = &snapshot.quote;

    let distance = match params.policy {
        StopLossPolicy::Fixed { points } if points > 0 => {
            let d = stops::spread_aware_distance(points, params.point, quote.spread());
            if d.widened && snapshot.positions.iter().any(|p| p.stop_loss.is_none()) {
                plan.widened.insert(DistanceKind::StopLoss);
            }
            d.price
        }
        StopLossPolicy::Atr { multiplier, .. } => match snapshot.atr {
            Some(atr) => atr * multiplier,
            None => return plan,
        },
        _ => return plan,
    };

    for p in snapshot.positions.iter().filter(|p| p.stop_loss.is_none()) {
        let stop = stops::stop_from(p.side, p.open_price, distance);
        if stops::is_protective(p.side, stop, quote) {
            plan.actions.push(Action::ModifyStop {
                position_id: p.position_id,
                previous: None,
                stop_loss: stop,
                take_profit: p.take_profit,
                reason: StopReason::Initial,
            });
        }
    }
    plan
}

/// Closes a whole direction once its aggregate profit reaches
/// `count × profit_target_points × point_value`.
pub fn close_by_profit_target(params: &LifecycleParams, snapshot: &Snapshot<'_>) -> Plan {
    let mut plan = Plan::default();
    if params.profit_target_points == 0 {
        return plan;
    }

    for side in [OrderSide::Buy, OrderSide::Sell] {
        let same_side: Vec<&Position> = snapshot.positions.iter().filter(|p| p.side == side).collect();
        if same_side.is_empty() {
            continue;
        }
        let aggregate: Decimal = same_side.iter().map(|p| p.profit).sum();
        let threshold = Decimal::from(same_side.len())
            * Decimal::from(params.profit_target_points)
            * params.point_value;
        if aggregate >= threshold {
            plan.actions.extend(same_side.iter().map(|p| Action::Close {
                position_id: p.position_id,
                side,
                reason: CloseReason::ProfitTarget,
            }));
        }
    }
    plan
}

/// Closes positions held for at least `holding_bars` completed bars.
pub fn close_expired_by_time(params: &LifecycleParams, snapshot: &Snapshot<'_>) -> Plan {
    let mut plan = Plan::default();
    if params.holding_bars == 0 {
        return plan;
    }

    for p in snapshot.positions {
        let expired = match snapshot.elapsed_bars.get(&p.position_id) {
            Some(Some(elapsed)) => *elapsed >= params.holding_bars,
            // An unknown bar count fails safe toward closing.
            Some(None) | None => true,
        };
        if expired {
            plan.actions.push(Action::Close {
                position_id: p.position_id,
                side: p.side,
                reason: CloseReason::Expired,
            });
        }
    }
    plan
}

/// Trailing and break-even adjustments. A stop is only requested when it is
/// strictly tighter than the current one and on the protective side of price.
pub fn adjust_stops(params: &LifecycleParams, snapshot: &Snapshot<'_>) -> Plan {
    let mut plan = Plan::default();
    let quote = &snapshot.quote;

    match params.policy {
        StopLossPolicy::Trailing {
            points,
            trigger_points,
        } => {
            let distance = stops::spread_aware_distance(points, params.point, quote.spread());
            for p in snapshot.positions {
                let Some(candidate) =
                    stops::trailing_candidate(p, quote, params.point, distance.price, trigger_points)
                else {
                    continue;
                };
                if distance.widened {
                    plan.widened.insert(DistanceKind::Trailing);
                }
                if p.is_tighter_stop(candidate) && stops::is_protective(p.side, candidate, quote) {
                    plan.actions.push(Action::ModifyStop {
                        position_id: p.position_id,
                        previous: p.stop_loss,
                        stop_loss: candidate,
                        take_profit: p.take_profit,
                        reason: StopReason::Trailing,
                    });
                }
            }
        }
        StopLossPolicy::BreakEven {
            fee_per_lot,
            trigger_points,
        } => {
            for side in [OrderSide::Buy, OrderSide::Sell] {
                let same_side: Vec<&Position> =
                    snapshot.positions.iter().filter(|p| p.side == side).collect();
                let Some(break_even) = stops::break_even_price(&same_side, fee_per_lot) else {
                    continue;
                };
                let trigger = Decimal::from(trigger_points);
                for p in same_side {
                    if p.profit_points(quote, params.point) >= trigger
                        && p.is_tighter_stop(break_even)
                        && stops::is_protective(side, break_even, quote)
                    {
                        plan.actions.push(Action::ModifyStop {
                            position_id: p.position_id,
                            previous: p.stop_loss,
                            stop_loss: break_even,
                            take_profit: p.take_profit,
                            reason: StopReason::BreakEven,
                        });
                    }
                }
            }
        }
        StopLossPolicy::None | StopLossPolicy::Fixed { .. } | StopLossPolicy::Atr { .. } => {}
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn params(policy: StopLossPolicy) -> LifecycleParams {
        LifecycleParams {
            symbol: "EURUSD".to_string(),
            magic: MagicNumber(9),
            point: dec!(0.0001),
            point_value: dec!(1),
            lot_size: dec!(0.1),
            slippage_points: 10,
            take_profit_points: 0,
            holding_bars: 0,
            profit_target_points: 0,
            policy,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap()
    }

    fn quote(bid: Decimal, ask: Decimal) -> Quote {
        Quote {
            bid,
            ask,
            time: t0() + Duration::hours(20),
        }
    }

    fn position(id: u64, side: OrderSide, open_price: Decimal) -> Position {
        Position {
            position_id: PositionId(id),
            symbol: "EURUSD".to_string(),
            magic: MagicNumber(9),
            side,
            volume: dec!(0.1),
            open_price,
            stop_loss: None,
            take_profit: None,
            open_time: t0(),
            profit: Decimal::ZERO,
        }
    }

    fn snapshot<'a>(positions: &'a [Position], quote: Quote) -> Snapshot<'a> {
        Snapshot {
            positions,
            quote,
            atr: None,
            elapsed_bars: BTreeMap::new(),
        }
    }

    fn closed_ids(plan: &Plan) -> Vec<u64> {
        plan.actions
            .iter()
            .filter_map(|a| match a {
                Action::Close { position_id, .. } => Some(position_id.0),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn open_is_skipped_when_direction_already_held() {
        let p = params(StopLossPolicy::None);
        let held = [position(1, OrderSide::Buy, dec!(1.1))];
        let q = quote(dec!(1.1000), dec!(1.1002));
        assert!(open_if_signaled(&p, &snapshot(&held, q), OpenSignal::Buy).is_empty());
        assert_eq!(open_if_signaled(&p, &snapshot(&held, q), OpenSignal::Sell).actions.len(), 1);
        assert!(open_if_signaled(&p, &snapshot(&[], q), OpenSignal::None).is_empty());
    }

    #[test]
    fn entry_levels_use_fixed_distances_from_entry_price() {
        let mut p = params(StopLossPolicy::Fixed { points: 30 });
        p.take_profit_points = 60;
        let plan = open_if_signaled(&p, &snapshot(&[], quote(dec!(1.1000), dec!(1.1002))), OpenSignal::Buy);
        let Action::Open(request) = &plan.actions[0] else {
            panic!("expected an open");
        };
        assert_eq!(request.side, OrderSide::Buy);
        assert_eq!(request.volume, dec!(0.1));
        assert_eq!(request.stop_loss, Some(dec!(1.0972)));
        assert_eq!(request.take_profit, Some(dec!(1.1062)));
        assert!(plan.widened.is_empty());
    }

    #[test]
    fn entry_distance_narrower_than_spread_is_widened() {
        let mut p = params(StopLossPolicy::Fixed { points: 3 });
        p.take_profit_points = 4;
        let plan = open_if_signaled(&p, &snapshot(&[], quote(dec!(1.1000), dec!(1.1010))), OpenSignal::Sell);
        let Action::Open(request) = &plan.actions[0] else {
            panic!("expected an open");
        };
        // bid + spread would sit on the ask, so the stop is measured from the ask
        assert_eq!(request.stop_loss, Some(dec!(1.1020)));
        assert_eq!(request.take_profit, Some(dec!(1.0990)));
        assert!(plan.widened.contains(&DistanceKind::StopLoss));
        assert!(plan.widened.contains(&DistanceKind::TakeProfit));
    }

    #[test]
    fn entry_stop_equal_to_spread_stays_off_the_exit_price() {
        let p = params(StopLossPolicy::Fixed { points: 10 });
        let q = quote(dec!(1.1000), dec!(1.1010));
        let plan = open_if_signaled(&p, &snapshot(&[], q), OpenSignal::Buy);
        let Action::Open(request) = &plan.actions[0] else {
            panic!("expected an open");
        };
        assert_eq!(request.stop_loss, Some(dec!(1.0990)));
        assert!(stops::is_protective(OrderSide::Buy, dec!(1.0990), &q));
        assert!(plan.widened.is_empty());
    }

    #[test]
    fn close_signal_targets_matching_direction_only() {
        let positions = [
            position(1, OrderSide::Buy, dec!(1.1)),
            position(2, OrderSide::Sell, dec!(1.1)),
            position(3, OrderSide::Buy, dec!(1.1)),
        ];
        let plan = close_if_signaled(&snapshot(&positions, quote(dec!(1.1), dec!(1.1))), CloseSignal::CloseLong);
        assert_eq!(closed_ids(&plan), vec![1, 3]);
    }

    #[test]
    fn initial_fixed_stop_only_for_unprotected_positions() {
        let p = params(StopLossPolicy::Fixed { points: 50 });
        let mut protected = position(2, OrderSide::Buy, dec!(1.1000));
        protected.stop_loss = Some(dec!(1.0900));
        let positions = [position(1, OrderSide::Buy, dec!(1.1000)), protected];
        let plan = initial_stops(&p, &snapshot(&positions, quote(dec!(1.1010), dec!(1.1011))));
        assert_eq!(
            plan.actions,
            vec![Action::ModifyStop {
                position_id: PositionId(1),
                previous: None,
                stop_loss: dec!(1.0950),
                take_profit: None,
                reason: StopReason::Initial,
            }]
        );
    }

    #[test]
    fn atr_stop_needs_an_atr_value() {
        let p = params(StopLossPolicy::Atr {
            period: 14,
            multiplier: dec!(2),
        });
        let positions = [position(1, OrderSide::Sell, dec!(1.1000))];
        let mut snap = snapshot(&positions, quote(dec!(1.0990), dec!(1.0991)));
        assert!(initial_stops(&p, &snap).is_empty());

        snap.atr = Some(dec!(0.0015));
        let plan = initial_stops(&p, &snap);
        assert!(matches!(
            plan.actions[0],
            Action::ModifyStop { stop_loss, .. } if stop_loss == dec!(1.1030)
        ));
    }

    #[test]
    fn profit_target_closes_a_whole_direction() {
        let mut p = params(StopLossPolicy::None);
        p.profit_target_points = 10;
        let mut a = position(1, OrderSide::Buy, dec!(1.1));
        a.profit = dec!(25);
        let mut b = position(2, OrderSide::Buy, dec!(1.1));
        b.profit = dec!(-4);
        let mut c = position(3, OrderSide::Sell, dec!(1.1));
        c.profit = dec!(9);
        let positions = [a, b, c];
        // longs: 21 >= 2 * 10 * 1, shorts: 9 < 10
        let plan = close_by_profit_target(&p, &snapshot(&positions, quote(dec!(1.1), dec!(1.1))));
        assert_eq!(closed_ids(&plan), vec![1, 2]);
    }

    #[test]
    fn expiry_compares_completed_bars_and_fails_safe() {
        let mut p = params(StopLossPolicy::None);
        p.holding_bars = 10;
        let positions = [
            position(1, OrderSide::Buy, dec!(1.1)),
            position(2, OrderSide::Buy, dec!(1.1)),
            position(3, OrderSide::Sell, dec!(1.1)),
            position(4, OrderSide::Sell, dec!(1.1)),
        ];
        let mut snap = snapshot(&positions, quote(dec!(1.1), dec!(1.1)));
        snap.elapsed_bars = BTreeMap::from([
            (PositionId(1), Some(11)),
            (PositionId(2), Some(9)),
            (PositionId(3), None),
            (PositionId(4), Some(10)),
        ]);
        assert_eq!(closed_ids(&close_expired_by_time(&p, &snap)), vec![1, 3, 4]);
    }

    #[test]
    fn trailing_stop_never_loosens() {
        let p = params(StopLossPolicy::Trailing {
            points: 20,
            trigger_points: 10,
        });
        let mut long = position(1, OrderSide::Buy, dec!(1.1000));
        long.stop_loss = Some(dec!(1.1015));
        let positions = [long];

        // candidate 1.1030 - 0.0020 = 1.1010 is looser than 1.1015
        let plan = adjust_stops(&p, &snapshot(&positions, quote(dec!(1.1030), dec!(1.1031))));
        assert!(plan.is_empty());

        let plan = adjust_stops(&p, &snapshot(&positions, quote(dec!(1.1040), dec!(1.1041))));
        assert!(matches!(
            plan.actions[0],
            Action::ModifyStop { stop_loss, previous: Some(prev), .. }
                if stop_loss == dec!(1.1020) && prev == dec!(1.1015)
        ));
    }

    #[test]
    fn break_even_applies_the_aggregate_price_to_qualifying_positions() {
        let p = params(StopLossPolicy::BreakEven {
            fee_per_lot: dec!(20),
            trigger_points: 100,
        });
        let mut a = position(1, OrderSide::Buy, dec!(100));
        a.volume = dec!(1.0);
        let mut b = position(2, OrderSide::Buy, dec!(102));
        b.volume = dec!(0.5);
        let positions = [a, b];
        let mut params_points = p.clone();
        params_points.point = dec!(0.01);

        let plan = adjust_stops(&params_points, &snapshot(&positions, quote(dec!(125), dec!(125.01))));
        assert_eq!(plan.actions.len(), 2);
        for action in &plan.actions {
            let Action::ModifyStop { stop_loss, reason, .. } = action else {
                panic!("expected a stop modification");
            };
            assert_eq!(stop_loss.round_dp(3), dec!(120.667));
            assert_eq!(*reason, StopReason::BreakEven);
        }

        // below the break-even price the stop would not be protective
        let plan = adjust_stops(&params_points, &snapshot(&positions, quote(dec!(120), dec!(120.01))));
        assert!(plan.is_empty());
    }
}
