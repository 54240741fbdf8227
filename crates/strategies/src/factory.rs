use crate::engulfing::EngulfingStochRsi;
use crate::error::StrategyError;
use crate::stop_management::StopManagementOnly;
use crate::Strategy;
use configuration::{Config, StrategyId};

/// Creates a new strategy instance based on the provided ID and configuration.
pub fn create_strategy(id: StrategyId, config: &Config) -> Result<Box<dyn Strategy>, StrategyError> {
    // The compiler errors here if a new StrategyId is added but not handled.
    match id {
        StrategyId::EngulfingStochRsi => Ok(Box::new(EngulfingStochRsi::new(config)?)),
        StrategyId::StopManagementOnly => Ok(Box::new(StopManagementOnly)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use configuration::parse_config;

    #[test]
    fn builds_the_configured_strategy() {
        let config = parse_config(
            r#"
            [instrument]
            symbol = "EURUSD"
            point = "0.00001"
            [strategy]
            id = "stop_management_only"
            magic = 1
            "#,
        )
        .unwrap();
        let strategy = create_strategy(config.strategy.id, &config).unwrap();
        assert_eq!(strategy.name(), "stop_management_only");
        let strategy = create_strategy(StrategyId::EngulfingStochRsi, &config).unwrap();
        assert_eq!(strategy.name(), "engulfing_stoch_rsi");
    }
}
