//! Protective-stop arithmetic for every `StopLossPolicy`.
//!
//! All functions are pure. Whether a stop is actually requested is decided in
//! [`crate::reconcile`], which also enforces that stops only ever tighten.

use core_types::{OrderSide, Position, Quote};
use rust_decimal::Decimal;
use std::fmt;

/// Which configured point distance a price offset was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DistanceKind {
    StopLoss,
    TakeProfit,
    Trailing,
}

impl fmt::Display for DistanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DistanceKind::StopLoss => "stop loss",
            DistanceKind::TakeProfit => "take profit",
            DistanceKind::Trailing => "trailing",
        };
        write!(f, "{}", name)
    }
}

/// A price distance, possibly widened to the spread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Distance {
    pub price: Decimal,
    /// The configured distance was smaller than the spread and was replaced by it.
    pub widened: bool,
}

/// Converts `points` to a price distance, falling back to the spread when the
/// configured distance is smaller.
pub fn spread_aware_distance(points: u32, point: Decimal, spread: Decimal) -> Distance {
    let configured = Decimal::from(points) * point;
    if configured < spread {
        Distance {
            price: spread,
            widened: true,
        }
    } else {
        Distance {
            price: configured,
            widened: false,
        }
    }
}

/// A stop `distance` away from `reference` on the losing side of `side`.
pub fn stop_from(side: OrderSide, reference: Decimal, distance: Decimal) -> Decimal {
    match side {
        OrderSide::Buy => reference - distance,
        OrderSide::Sell => reference + distance,
    }
}

/// A take-profit `distance` away from `reference` on the winning side of `side`.
pub fn target_from(side: OrderSide, reference: Decimal, distance: Decimal) -> Decimal {
    match side {
        OrderSide::Buy => reference + distance,
        OrderSide::Sell => reference - distance,
    }
}

/// Whether `stop` sits on the protective side of the price the position would close at.
pub fn is_protective(side: OrderSide, stop: Decimal, quote: &Quote) -> bool {
    match side {
        OrderSide::Buy => stop < quote.bid,
        OrderSide::Sell => stop > quote.ask,
    }
}

/// Trailing candidate once profit reaches `trigger_points`, `None` before.
pub fn trailing_candidate(
    position: &Position,
    quote: &Quote,
    point: Decimal,
    distance: Decimal,
    trigger_points: u32,
) -> Option<Decimal> {
    if position.profit_points(quote, point) < Decimal::from(trigger_points) {
        return None;
    }
    Some(stop_from(
        position.side,
        quote.exit_price(position.side),
        distance,
    ))
}

/// Volume-weighted entry of `positions` adjusted by the weighted fee:
/// `Σ(open·vol)/Σvol + Σ(fee·vol)/Σvol` for longs, minus the fee term for shorts.
///
/// All positions are expected to share one side. `None` when there is no volume.
pub fn break_even_price(positions: &[&Position], fee_per_lot: Decimal) -> Option<Decimal> {
    let side = positions.first()?.side;
    let total_volume: Decimal = positions.iter().map(|p| p.volume).sum();
    if total_volume.is_zero() {
        return None;
    }
    let weighted_open: Decimal = positions.iter().map(|p| p.open_price * p.volume).sum();
    let weighted_fee: Decimal = positions.iter().map(|p| fee_per_lot * p.volume).sum();

    let entry = weighted_open / total_volume;
    let fee = weighted_fee / total_volume;
    Some(target_from(side, entry, fee))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use core_types::{MagicNumber, PositionId};
    use rust_decimal_macros::dec;

    fn position(side: OrderSide, volume: Decimal, open_price: Decimal) -> Position {
        Position {
            position_id: PositionId(1),
            symbol: "EURUSD".to_string(),
            magic: MagicNumber(1),
            side,
            volume,
            open_price,
            stop_loss: None,
            take_profit: None,
            open_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            profit: Decimal::ZERO,
        }
    }

    fn quote(bid: Decimal, ask: Decimal) -> Quote {
        Quote {
            bid,
            ask,
            time: Utc.with_ymd_and_hms(2024, 1, 1, 5, 0, 0).unwrap(),
        }
    }

    #[test]
    fn narrow_distance_falls_back_to_spread() {
        let d = spread_aware_distance(5, dec!(0.0001), dec!(0.0012));
        assert_eq!(d.price, dec!(0.0012));
        assert!(d.widened);

        let d = spread_aware_distance(20, dec!(0.0001), dec!(0.0012));
        assert_eq!(d.price, dec!(0.0020));
        assert!(!d.widened);
    }

    #[test]
    fn break_even_aggregates_by_volume() {
        let a = position(OrderSide::Buy, dec!(1.0), dec!(100));
        let b = position(OrderSide::Buy, dec!(0.5), dec!(102));
        let price = break_even_price(&[&a, &b], dec!(20)).unwrap();
        assert_eq!(price.round_dp(3), dec!(120.667));
    }

    #[test]
    fn break_even_subtracts_fees_for_shorts() {
        let a = position(OrderSide::Sell, dec!(2), dec!(50));
        let price = break_even_price(&[&a], dec!(1.5)).unwrap();
        assert_eq!(price, dec!(48.5));
        assert_eq!(break_even_price(&[], dec!(1)), None);
    }

    #[test]
    fn trailing_waits_for_trigger() {
        let long = position(OrderSide::Buy, dec!(1), dec!(1.1000));
        let point = dec!(0.0001);
        assert_eq!(
            trailing_candidate(&long, &quote(dec!(1.1010), dec!(1.1012)), point, dec!(0.0020), 15),
            None
        );
        assert_eq!(
            trailing_candidate(&long, &quote(dec!(1.1030), dec!(1.1032)), point, dec!(0.0020), 15),
            Some(dec!(1.1010))
        );
    }

    #[test]
    fn short_trailing_references_ask() {
        let short = position(OrderSide::Sell, dec!(1), dec!(1.1000));
        let candidate = trailing_candidate(
            &short,
            &quote(dec!(1.0960), dec!(1.0962)),
            dec!(0.0001),
            dec!(0.0020),
            0,
        );
        assert_eq!(candidate, Some(dec!(1.0982)));
    }

    #[test]
    fn protective_side_is_relative_to_exit_price() {
        let q = quote(dec!(1.1000), dec!(1.1002));
        assert!(is_protective(OrderSide::Buy, dec!(1.0990), &q));
        assert!(!is_protective(OrderSide::Buy, dec!(1.1000), &q));
        assert!(is_protective(OrderSide::Sell, dec!(1.1010), &q));
        assert!(!is_protective(OrderSide::Sell, dec!(1.1001), &q));
    }
}
