pub mod breakout_retest;
pub mod coordinator;
pub mod level_bounce;
pub mod signals;
pub mod trend_following;
pub mod whale_flow;

pub use coordinator::StrategyCoordinator;
pub use signals::{AggregatedDecision, Signal, StrategyMarketData};

use thiserror::Error;

use crate::config::{Config, ConfigError};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StrategyError {
    #[error("strategy disabled")]
    Disabled,
    #[error("insufficient data: need {needed} candles, have {available}")]
    InsufficientData { needed: usize, available: usize },
    #[error("invalid signal {field}: {value}")]
    InvalidSignal { field: &'static str, value: f64 },
    #[error("missing indicator: {0}")]
    MissingIndicator(&'static str),
    #[error("{0}")]
    Failed(String),
}

/// Anything that can turn a market snapshot into an opinion.
///
/// `Ok(None)` means "nothing to say this cycle"; `Err` marks the strategy as
/// broken for this cycle only and the coordinator drops it from the vote.
pub trait Strategy: Send {
    fn name(&self) -> &str;

    /// 1 is evaluated first.
    fn priority(&self) -> u8;

    /// Strategies that only make sense on live order flow.
    fn is_realtime_only(&self) -> bool {
        false
    }

    /// Drops any state carried between evaluations.
    fn reset(&mut self) {}

    fn evaluate(&mut self, data: &StrategyMarketData) -> Result<Option<Signal>, StrategyError>;
}

/// The stock strategy set, registered on a fresh coordinator.
pub fn build_default_coordinator(cfg: &Config) -> Result<StrategyCoordinator, ConfigError> {
    let mut coordinator = StrategyCoordinator::new(cfg.coordinator.clone())?;
    coordinator.register_strategy(Box::new(breakout_retest::BreakoutRetestStrategy::new(
        cfg.daily_levels.clone(),
        cfg.strategies.retest_weight,
    )?));
    coordinator.register_strategy(Box::new(level_bounce::LevelBounceStrategy::new(
        cfg.strategies.clone(),
        cfg.weights.clone(),
    )?));
    coordinator.register_strategy(Box::new(trend_following::TrendFollowingStrategy::new(
        cfg.strategies.clone(),
    )?));
    coordinator.register_strategy(Box::new(whale_flow::WhaleFlowStrategy::new(
        cfg.strategies.clone(),
    )?));
    Ok(coordinator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::default_test_config;

    #[test]
    fn default_set_is_priority_ordered() {
        let coordinator = build_default_coordinator(&default_test_config()).unwrap();
        assert_eq!(
            coordinator.strategy_names(),
            vec!["BreakoutRetest", "LevelBounce", "TrendFollowing", "WhaleFlow"]
        );
    }

    #[test]
    fn invalid_settings_refuse_to_build() {
        let mut cfg = default_test_config();
        cfg.strategies.level_weight = 2.0;
        assert!(build_default_coordinator(&cfg).is_err());
    }
}
