use crate::broker::{Account, Broker, OpenRequest};
use crate::error::BrokerError;
use async_trait::async_trait;
use core_types::{MagicNumber, OrderId, OrderSide, Position, PositionId, Quote};
use events::RejectedOperation;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct PendingOrder {
    symbol: String,
    magic: MagicNumber,
}

#[derive(Debug, Default)]
struct PaperState {
    balance: Decimal,
    next_ticket: u64,
    positions: BTreeMap<PositionId, Position>,
    pending: BTreeMap<OrderId, PendingOrder>,
    quotes: HashMap<String, Quote>,
    rejections: Vec<(RejectedOperation, String)>,
}

impl PaperState {
    fn ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    fn check_rejection(&self, operation: RejectedOperation) -> Result<(), BrokerError> {
        match self.rejections.iter().find(|(op, _)| *op == operation) {
            Some((_, reason)) => Err(BrokerError::rejected(operation, reason.clone())),
            None => Ok(()),
        }
    }
}

/// An in-memory paper account.
///
/// Market requests fill at the current quote of their symbol, longs at the ask
/// and shorts at the bid. Floating profit and equity follow every quote update.
/// Stops and take-profits are stored and validated but never triggered.
pub struct PaperBroker {
    state: Mutex<PaperState>,
    /// Account-currency value of a one-unit price move for one lot.
    contract_size: Decimal,
}

impl PaperBroker {
    pub fn new(starting_balance: Decimal, contract_size: Decimal) -> Self {
        Self {
            state: Mutex::new(PaperState {
                balance: starting_balance,
                ..PaperState::default()
            }),
            contract_size,
        }
    }

    /// Records a new quote and re-marks the open positions of its symbol.
    pub async fn update_quote(&self, symbol: &str, quote: Quote) {
        let mut state = self.state.lock().await;
        state.quotes.insert(symbol.to_string(), quote);
        for position in state.positions.values_mut().filter(|p| p.symbol == symbol) {
            position.profit = floating_profit(position, &quote, self.contract_size);
        }
    }

    /// Rests a pending order on the book. It never fills.
    pub async fn place_pending_order(
        &self,
        symbol: &str,
        magic: MagicNumber,
        side: OrderSide,
        volume: Decimal,
        price: Decimal,
    ) -> OrderId {
        let mut state = self.state.lock().await;
        let order_id = OrderId(state.ticket());
        state.pending.insert(
            order_id,
            PendingOrder {
                symbol: symbol.to_string(),
                magic,
            },
        );
        tracing::debug!(%order_id, %side, %volume, %price, "Paper pending order placed");
        order_id
    }

    /// Makes every subsequent request of `operation` fail with `reason`.
    pub async fn reject(&self, operation: RejectedOperation, reason: &str) {
        let mut state = self.state.lock().await;
        state.rejections.retain(|(op, _)| *op != operation);
        state.rejections.push((operation, reason.to_string()));
    }

    /// Lifts a rejection installed by [`PaperBroker::reject`].
    pub async fn accept(&self, operation: RejectedOperation) {
        self.state
            .lock()
            .await
            .rejections
            .retain(|(op, _)| *op != operation);
    }
}

/// Money profit of `position` if it were closed at `quote`.
fn floating_profit(position: &Position, quote: &Quote, contract_size: Decimal) -> Decimal {
    let exit = quote.exit_price(position.side);
    let per_unit = match position.side {
        OrderSide::Buy => exit - position.open_price,
        OrderSide::Sell => position.open_price - exit,
    };
    per_unit * position.volume * contract_size
}

/// Stops must sit on the losing side of the price the position would close at,
/// take-profits on the winning side.
fn validate_levels(
    side: OrderSide,
    quote: &Quote,
    stop_loss: Option<Decimal>,
    take_profit: Option<Decimal>,
) -> Result<(), String> {
    let exit = quote.exit_price(side);
    let stop_ok = stop_loss.is_none_or(|sl| match side {
        OrderSide::Buy => sl < exit,
        OrderSide::Sell => sl > exit,
    });
    let target_ok = take_profit.is_none_or(|tp| match side {
        OrderSide::Buy => tp > exit,
        OrderSide::Sell => tp < exit,
    });
    match (stop_ok, target_ok) {
        (true, true) => Ok(()),
        (false, _) => Err(format!("invalid stop loss for a {} at {}", side, exit)),
        (_, false) => Err(format!("invalid take profit for a {} at {}", side, exit)),
    }
}

#[async_trait]
impl Broker for PaperBroker {
    async fn open_market(&self, request: &OpenRequest) -> Result<PositionId, BrokerError> {
        let mut state = self.state.lock().await;
        state.check_rejection(RejectedOperation::Open)?;

        if request.volume <= Decimal::ZERO {
            return Err(BrokerError::rejected(
                RejectedOperation::Open,
                format!("invalid volume {}", request.volume),
            ));
        }
        let quote = *state
            .quotes
            .get(&request.symbol)
            .ok_or_else(|| BrokerError::NoQuote(request.symbol.clone()))?;
        validate_levels(request.side, &quote, request.stop_loss, request.take_profit)
            .map_err(|reason| BrokerError::rejected(RejectedOperation::Open, reason))?;

        let position_id = PositionId(state.ticket());
        let mut position = Position {
            position_id,
            symbol: request.symbol.clone(),
            magic: request.magic,
            side: request.side,
            volume: request.volume,
            open_price: quote.entry_price(request.side),
            stop_loss: request.stop_loss,
            take_profit: request.take_profit,
            open_time: quote.time,
            profit: Decimal::ZERO,
        };
        position.profit = floating_profit(&position, &quote, self.contract_size);

        tracing::debug!(
            client_order_id = %request.client_order_id,
            %position_id,
            side = %request.side,
            price = %position.open_price,
            "Paper fill"
        );
        state.positions.insert(position_id, position);
        Ok(position_id)
    }

    async fn modify_stop(
        &self,
        position_id: PositionId,
        stop_loss: Decimal,
        take_profit: Option<Decimal>,
    ) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        state.check_rejection(RejectedOperation::ModifyStop)?;

        let (side, symbol) = state
            .positions
            .get(&position_id)
            .map(|p| (p.side, p.symbol.clone()))
            .ok_or(BrokerError::PositionNotFound(position_id))?;
        let quote = *state
            .quotes
            .get(&symbol)
            .ok_or_else(|| BrokerError::NoQuote(symbol.clone()))?;
        validate_levels(side, &quote, Some(stop_loss), take_profit)
            .map_err(|reason| BrokerError::rejected(RejectedOperation::ModifyStop, reason))?;

        if let Some(position) = state.positions.get_mut(&position_id) {
            position.stop_loss = Some(stop_loss);
            position.take_profit = take_profit;
        }
        Ok(())
    }

    async fn close(&self, position_id: PositionId) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        state.check_rejection(RejectedOperation::Close)?;

        let position = state
            .positions
            .remove(&position_id)
            .ok_or(BrokerError::PositionNotFound(position_id))?;
        state.balance += position.profit;
        tracing::debug!(%position_id, profit = %position.profit, balance = %state.balance, "Paper close");
        Ok(())
    }

    async fn cancel_pending_order(&self, order_id: OrderId) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        state.check_rejection(RejectedOperation::Cancel)?;

        state
            .pending
            .remove(&order_id)
            .map(|_| ())
            .ok_or(BrokerError::OrderNotFound(order_id))
    }

    async fn list_positions(
        &self,
        symbol: &str,
        magic: MagicNumber,
    ) -> Result<Vec<Position>, BrokerError> {
        let state = self.state.lock().await;
        Ok(state
            .positions
            .values()
            .filter(|p| p.belongs_to(symbol, magic))
            .cloned()
            .collect())
    }

    async fn list_pending_orders(
        &self,
        symbol: &str,
        magic: MagicNumber,
    ) -> Result<Vec<OrderId>, BrokerError> {
        let state = self.state.lock().await;
        Ok(state
            .pending
            .iter()
            .filter(|(_, order)| order.symbol == symbol && order.magic == magic)
            .map(|(id, _)| *id)
            .collect())
    }
}

#[async_trait]
impl Account for PaperBroker {
    async fn balance(&self) -> Result<Decimal, BrokerError> {
        Ok(self.state.lock().await.balance)
    }

    /// Balance plus the floating profit of every open position.
    async fn equity(&self) -> Result<Decimal, BrokerError> {
        let state = self.state.lock().await;
        let floating: Decimal = state.positions.values().map(|p| p.profit).sum();
        Ok(state.balance + floating)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    const SYMBOL: &str = "EURUSD";
    const MAGIC: MagicNumber = MagicNumber(11);

    fn quote(bid: Decimal, ask: Decimal) -> Quote {
        Quote {
            bid,
            ask,
            time: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        }
    }

    async fn broker() -> PaperBroker {
        let broker = PaperBroker::new(dec!(1000), dec!(100));
        broker.update_quote(SYMBOL, quote(dec!(1.10), dec!(1.12))).await;
        broker
    }

    #[tokio::test]
    async fn fills_longs_at_ask_and_marks_to_bid() {
        let broker = broker().await;
        let id = broker
            .open_market(&OpenRequest::new(SYMBOL, MAGIC, OrderSide::Buy, dec!(2)))
            .await
            .unwrap();

        let positions = broker.list_positions(SYMBOL, MAGIC).await.unwrap();
        assert_eq!(positions[0].position_id, id);
        assert_eq!(positions[0].open_price, dec!(1.12));
        // (1.10 - 1.12) * 2 * 100
        assert_eq!(positions[0].profit, dec!(-4));
        assert_eq!(broker.equity().await.unwrap(), dec!(996));

        broker.update_quote(SYMBOL, quote(dec!(1.20), dec!(1.22))).await;
        assert_eq!(broker.equity().await.unwrap(), dec!(1016));
    }

    #[tokio::test]
    async fn close_realizes_profit_into_balance() {
        let broker = broker().await;
        let id = broker
            .open_market(&OpenRequest::new(SYMBOL, MAGIC, OrderSide::Sell, dec!(1)))
            .await
            .unwrap();
        broker.update_quote(SYMBOL, quote(dec!(1.00), dec!(1.02))).await;
        broker.close(id).await.unwrap();

        // sold at 1.10, bought back at 1.02
        assert_eq!(broker.balance().await.unwrap(), dec!(1008));
        assert!(broker.list_positions(SYMBOL, MAGIC).await.unwrap().is_empty());
        assert_eq!(
            broker.close(id).await,
            Err(BrokerError::PositionNotFound(id))
        );
    }

    #[tokio::test]
    async fn listing_filters_on_symbol_and_magic() {
        let broker = broker().await;
        broker.update_quote("GBPUSD", quote(dec!(1.30), dec!(1.31))).await;
        broker
            .open_market(&OpenRequest::new(SYMBOL, MAGIC, OrderSide::Buy, dec!(1)))
            .await
            .unwrap();
        broker
            .open_market(&OpenRequest::new(SYMBOL, MagicNumber(99), OrderSide::Buy, dec!(1)))
            .await
            .unwrap();
        broker
            .open_market(&OpenRequest::new("GBPUSD", MAGIC, OrderSide::Buy, dec!(1)))
            .await
            .unwrap();
        assert_eq!(broker.list_positions(SYMBOL, MAGIC).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stop_on_the_wrong_side_is_rejected() {
        let broker = broker().await;
        let id = broker
            .open_market(&OpenRequest::new(SYMBOL, MAGIC, OrderSide::Buy, dec!(1)))
            .await
            .unwrap();
        let err = broker.modify_stop(id, dec!(1.11), None).await.unwrap_err();
        assert!(matches!(
            err,
            BrokerError::OrderRejected {
                operation: RejectedOperation::ModifyStop,
                ..
            }
        ));
        broker.modify_stop(id, dec!(1.05), Some(dec!(1.30))).await.unwrap();
        let position = &broker.list_positions(SYMBOL, MAGIC).await.unwrap()[0];
        assert_eq!(position.stop_loss, Some(dec!(1.05)));
        assert_eq!(position.take_profit, Some(dec!(1.30)));
    }

    #[tokio::test]
    async fn installed_rejection_applies_until_accepted() {
        let broker = broker().await;
        broker.reject(RejectedOperation::Open, "market closed").await;
        let request = OpenRequest::new(SYMBOL, MAGIC, OrderSide::Buy, dec!(1));
        assert!(broker.open_market(&request).await.is_err());

        broker.accept(RejectedOperation::Open).await;
        assert!(broker.open_market(&request).await.is_ok());
    }

    #[tokio::test]
    async fn pending_orders_can_be_cancelled_once() {
        let broker = broker().await;
        let order = broker
            .place_pending_order(SYMBOL, MAGIC, OrderSide::Buy, dec!(1), dec!(1.05))
            .await;
        assert_eq!(broker.list_pending_orders(SYMBOL, MAGIC).await.unwrap(), vec![order]);
        broker.cancel_pending_order(order).await.unwrap();
        assert_eq!(
            broker.cancel_pending_order(order).await,
            Err(BrokerError::OrderNotFound(order))
        );
    }

    #[tokio::test]
    async fn opening_without_a_quote_fails() {
        let broker = PaperBroker::new(dec!(1000), dec!(1));
        let err = broker
            .open_market(&OpenRequest::new(SYMBOL, MAGIC, OrderSide::Buy, dec!(1)))
            .await
            .unwrap_err();
        assert_eq!(err, BrokerError::NoQuote(SYMBOL.to_string()));
    }
}
