use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use error::ConfigError;
pub use settings::{
    Config, ExitParams, Instrument, OrderParams, OscillatorParams, PatternParams, RiskLimits,
    StopLossPolicy, StopPolicyKind, StopSettings, StrategyId, StrategySettings,
};

/// Prefix of environment variables that override file settings,
/// e.g. `CANDLEWICK__RISK__MAX_LOSS_PCT=15`.
pub const ENV_PREFIX: &str = "CANDLEWICK";

/// Loads the controller configuration from the TOML file at `path`.
///
/// Environment variables with the `CANDLEWICK__` prefix override file values.
/// The result is validated before it is returned.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path.as_ref()))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;
    tracing::debug!(symbol = %config.instrument.symbol, magic = %config.strategy.magic, "Configuration loaded");

    Ok(config)
}

/// Parses and validates configuration from TOML text.
pub fn parse_config(toml: &str) -> Result<Config, ConfigError> {
    let config = config::Config::builder()
        .add_source(config::File::from_str(toml, config::FileFormat::Toml))
        .build()?
        .try_deserialize::<Config>()?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{AppliedPrice, MagicNumber};
    use rust_decimal_macros::dec;

    const MINIMAL: &str = r#"
        [instrument]
        symbol = "EURUSD"
        point = "0.00001"

        [strategy]
        id = "engulfing_stoch_rsi"
        magic = 4242
    "#;

    #[test]
    fn minimal_config_takes_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.strategy.magic, MagicNumber(4242));
        assert_eq!(config.strategy.id, StrategyId::EngulfingStochRsi);
        assert_eq!(config.pattern.body_window, 12);
        assert_eq!(config.oscillator.oversold, dec!(20));
        assert_eq!(config.oscillator.overbought, dec!(80));
        assert_eq!(config.oscillator.applied_price, AppliedPrice::Close);
        assert_eq!(config.instrument.period_secs, 3600);
        assert_eq!(config.stop_policy(), StopLossPolicy::None);
    }

    #[test]
    fn resolves_trailing_policy() {
        let toml = format!(
            "{}\n[stops]\npolicy = \"trailing\"\ntrailing_points = 150\ntrailing_trigger_points = 50\n",
            MINIMAL
        );
        let config = parse_config(&toml).unwrap();
        assert_eq!(
            config.stop_policy(),
            StopLossPolicy::Trailing {
                points: 150,
                trigger_points: 50
            }
        );
    }

    #[test]
    fn fixed_policy_reads_order_stop_distance() {
        let toml = format!(
            "{}\n[orders]\nstop_loss_points = 300\n[stops]\npolicy = \"fixed\"\n",
            MINIMAL
        );
        let config = parse_config(&toml).unwrap();
        assert_eq!(config.stop_policy(), StopLossPolicy::Fixed { points: 300 });
    }

    #[test]
    fn fixed_policy_without_distance_is_rejected() {
        let toml = format!("{}\n[stops]\npolicy = \"fixed\"\n", MINIMAL);
        assert!(matches!(
            parse_config(&toml),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn inverted_oscillator_zones_are_rejected() {
        let toml = format!(
            "{}\n[oscillator]\noversold = \"80\"\noverbought = \"20\"\n",
            MINIMAL
        );
        assert!(matches!(
            parse_config(&toml),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn max_loss_pct_must_be_below_100() {
        let toml = format!("{}\n[risk]\nmax_loss_pct = \"100\"\n", MINIMAL);
        assert!(parse_config(&toml).is_err());
    }
}
