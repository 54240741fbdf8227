use crate::error::RiskError;
use configuration::RiskLimits;
use core_types::{MagicNumber, OrderId, Position, PositionId};
use executor::{Account, Broker, BrokerError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Account-level limits, with the starting balance captured once at start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskState {
    pub starting_balance: Decimal,
    pub minimum_equity: Decimal,
    pub max_loss_pct: Decimal,
}

impl RiskState {
    pub fn new(starting_balance: Decimal, limits: &RiskLimits) -> Result<Self, RiskError> {
        if limits.max_loss_pct < Decimal::ZERO || limits.max_loss_pct >= dec!(100) {
            return Err(RiskError::InvalidParameters(
                "max_loss_pct must be in [0, 100)".to_string(),
            ));
        }
        if limits.minimum_equity < Decimal::ZERO {
            return Err(RiskError::InvalidParameters(
                "minimum_equity must not be negative".to_string(),
            ));
        }
        Ok(Self {
            starting_balance,
            minimum_equity: limits.minimum_equity,
            max_loss_pct: limits.max_loss_pct,
        })
    }

    /// `starting_balance * (1 - max_loss_pct / 100)`.
    pub fn drawdown_floor(&self) -> Decimal {
        self.starting_balance * (Decimal::ONE - self.max_loss_pct / dec!(100))
    }

    /// The higher of the two floors; equity at or below it is a breach.
    pub fn floor(&self) -> Decimal {
        self.minimum_equity.max(self.drawdown_floor())
    }

    pub fn check(&self, equity: Decimal) -> Result<(), RiskError> {
        if equity <= self.minimum_equity || equity <= self.drawdown_floor() {
            return Err(RiskError::Breach {
                equity,
                floor: self.floor(),
            });
        }
        Ok(())
    }
}

/// A close or cancel that failed during liquidation.
#[derive(Debug, Clone, PartialEq)]
pub enum LiquidationFailure {
    Close {
        position_id: PositionId,
        error: BrokerError,
    },
    Cancel {
        order_id: OrderId,
        error: BrokerError,
    },
    /// Positions or orders could not be listed at all.
    Listing(BrokerError),
}

/// What one liquidation pass achieved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Liquidation {
    pub closed: Vec<Position>,
    pub cancelled: Vec<OrderId>,
    pub failures: Vec<LiquidationFailure>,
}

impl Liquidation {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.closed.is_empty() && self.cancelled.is_empty() && self.failures.is_empty()
    }
}

/// Result of one risk check.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardStatus {
    /// Limits hold; lifecycle actions may proceed.
    Clear,
    /// Limits were breached on this check. Everything was liquidated and the guard is now halted.
    Breached {
        equity: Decimal,
        floor: Decimal,
        liquidation: Liquidation,
    },
    /// Halted by an earlier breach. Leftovers from a failed liquidation were swept again.
    Halted { liquidation: Liquidation },
}

/// Monitors equity for one strategy identity and liquidates it on breach.
///
/// Once halted the guard stays halted for the rest of the run.
#[derive(Debug, Clone)]
pub struct RiskGuard {
    state: RiskState,
    symbol: String,
    magic: MagicNumber,
    halted: bool,
}

impl RiskGuard {
    pub fn new(state: RiskState, symbol: &str, magic: MagicNumber) -> Self {
        Self {
            state,
            symbol: symbol.to_string(),
            magic,
            halted: false,
        }
    }

    /// Captures the account balance as the starting balance.
    pub async fn start(
        account: &dyn Account,
        limits: &RiskLimits,
        symbol: &str,
        magic: MagicNumber,
    ) -> Result<Self, RiskError> {
        let starting_balance = account.balance().await?;
        let state = RiskState::new(starting_balance, limits)?;
        tracing::info!(
            %starting_balance,
            floor = %state.floor(),
            "Risk guard armed"
        );
        Ok(Self::new(state, symbol, magic))
    }

    pub fn state(&self) -> &RiskState {
        &self.state
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Reads equity and, on breach, liquidates every position and pending
    /// order of this identity and halts.
    pub async fn check_and_enforce(
        &mut self,
        account: &dyn Account,
        broker: &dyn Broker,
    ) -> Result<GuardStatus, RiskError> {
        if self.halted {
            let liquidation = self.liquidate(broker).await;
            return Ok(GuardStatus::Halted { liquidation });
        }

        let equity = account.equity().await?;
        match self.state.check(equity) {
            Ok(()) => Ok(GuardStatus::Clear),
            Err(RiskError::Breach { equity, floor }) => {
                tracing::error!(%equity, %floor, symbol = %self.symbol, magic = %self.magic, "Risk limit breached, liquidating");
                self.halted = true;
                let liquidation = self.liquidate(broker).await;
                Ok(GuardStatus::Breached {
                    equity,
                    floor,
                    liquidation,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Best-effort: every close and cancel is attempted independently.
    pub async fn liquidate(&self, broker: &dyn Broker) -> Liquidation {
        let mut result = Liquidation::default();

        match broker.list_positions(&self.symbol, self.magic).await {
            Ok(positions) => {
                for position in positions {
                    match broker.close(position.position_id).await {
                        Ok(()) => result.closed.push(position),
                        Err(error) => {
                            tracing::warn!(position = %position.position_id, %error, "Liquidation close failed");
                            result.failures.push(LiquidationFailure::Close {
                                position_id: position.position_id,
                                error,
                            });
                        }
                    }
                }
            }
            Err(error) => result.failures.push(LiquidationFailure::Listing(error)),
        }

        match broker.list_pending_orders(&self.symbol, self.magic).await {
            Ok(orders) => {
                for order_id in orders {
                    match broker.cancel_pending_order(order_id).await {
                        Ok(()) => result.cancelled.push(order_id),
                        Err(error) => {
                            tracing::warn!(order = %order_id, %error, "Liquidation cancel failed");
                            result
                                .failures
                                .push(LiquidationFailure::Cancel { order_id, error });
                        }
                    }
                }
            }
            Err(error) => result.failures.push(LiquidationFailure::Listing(error)),
        }

        result
    }
}
