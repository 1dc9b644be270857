use crate::config::{ConfigError, StrategySettings};
use crate::models::SignalDirection;
use crate::strategies::signals::{Signal, StrategyMarketData};
use crate::strategies::{Strategy, StrategyError};

const NAME: &str = "TrendFollowing";
const PRIORITY: u8 = 3;
const FLAT_CONFIDENCE: f64 = 50.0;
const BASE_CONFIDENCE: f64 = 55.0;
const CONFIDENCE_PER_SPREAD_PCT: f64 = 50.0;
const MAX_CONFIDENCE: f64 = 85.0;

/// Fast/slow EMA spread. Votes HOLD while the averages are knotted together.
pub struct TrendFollowingStrategy {
    settings: StrategySettings,
}

impl TrendFollowingStrategy {
    pub fn new(settings: StrategySettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self { settings })
    }
}

impl Strategy for TrendFollowingStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn priority(&self) -> u8 {
        PRIORITY
    }

    fn evaluate(&mut self, data: &StrategyMarketData) -> Result<Option<Signal>, StrategyError> {
        let fast = data
            .indicators
            .ema_fast
            .ok_or(StrategyError::MissingIndicator("ema_fast"))?;
        let slow = data
            .indicators
            .ema_slow
            .ok_or(StrategyError::MissingIndicator("ema_slow"))?;
        if slow <= 0.0 {
            return Err(StrategyError::Failed(format!("non-positive slow EMA {}", slow)));
        }

        let spread = (fast - slow) / slow * 100.0;
        let weight = self.settings.trend_weight;

        if spread.abs() < self.settings.trend_min_spread_percent {
            let s = Signal::new(NAME, SignalDirection::Hold, FLAT_CONFIDENCE, weight, PRIORITY)?
                .with_reason(format!("EMA spread {:.3}% too flat", spread));
            return Ok(Some(s));
        }

        let direction = if spread > 0.0 {
            SignalDirection::Long
        } else {
            SignalDirection::Short
        };
        let confidence =
            (BASE_CONFIDENCE + spread.abs() * CONFIDENCE_PER_SPREAD_PCT).min(MAX_CONFIDENCE);

        let s = Signal::new(NAME, direction, confidence, weight, PRIORITY)?
            .with_reason(format!("EMA spread {:+.3}%", spread));
        Ok(Some(s))
    }
}
