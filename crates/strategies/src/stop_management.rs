use crate::error::StrategyError;
use crate::signal::SignalSnapshot;
use crate::Strategy;
use core_types::{IndicatorService, PriceFeed};

/// Emits no signals. The controller still runs stops, time and profit exits,
/// and the risk guard for positions carrying the strategy's magic number.
#[derive(Debug, Default)]
pub struct StopManagementOnly;

impl Strategy for StopManagementOnly {
    fn name(&self) -> &'static str {
        "stop_management_only"
    }

    fn evaluate(
        &mut self,
        _feed: &dyn PriceFeed,
        _indicators: &dyn IndicatorService,
    ) -> Result<SignalSnapshot, StrategyError> {
        Ok(SignalSnapshot::none())
    }
}
