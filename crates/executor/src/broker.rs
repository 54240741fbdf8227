use crate::error::BrokerError;
use async_trait::async_trait;
use core_types::{MagicNumber, OrderId, OrderSide, Position, PositionId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A market entry request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenRequest {
    pub client_order_id: Uuid,
    pub symbol: String,
    pub magic: MagicNumber,
    pub side: OrderSide,
    pub volume: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    /// Maximum accepted deviation from the quoted price, in points.
    pub slippage_points: u32,
}

impl OpenRequest {
    pub fn new(symbol: &str, magic: MagicNumber, side: OrderSide, volume: Decimal) -> Self {
        Self {
            client_order_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            magic,
            side,
            volume,
            stop_loss: None,
            take_profit: None,
            slippage_points: 0,
        }
    }
}

/// Order and position execution.
///
/// The broker is the single source of truth for positions and orders. Every
/// call either succeeds or fails immediately; callers never assume success.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Places a market entry and returns the ticket of the new position.
    async fn open_market(&self, request: &OpenRequest) -> Result<PositionId, BrokerError>;

    /// Replaces the protective stop (and keeps or replaces the take-profit) of a position.
    async fn modify_stop(
        &self,
        position_id: PositionId,
        stop_loss: Decimal,
        take_profit: Option<Decimal>,
    ) -> Result<(), BrokerError>;

    async fn close(&self, position_id: PositionId) -> Result<(), BrokerError>;

    async fn cancel_pending_order(&self, order_id: OrderId) -> Result<(), BrokerError>;

    /// Open positions of one strategy identity on one instrument.
    async fn list_positions(
        &self,
        symbol: &str,
        magic: MagicNumber,
    ) -> Result<Vec<Position>, BrokerError>;

    async fn list_pending_orders(
        &self,
        symbol: &str,
        magic: MagicNumber,
    ) -> Result<Vec<OrderId>, BrokerError>;
}

/// Account introspection.
#[async_trait]
pub trait Account: Send + Sync {
    async fn balance(&self) -> Result<Decimal, BrokerError>;
    async fn equity(&self) -> Result<Decimal, BrokerError>;
}
