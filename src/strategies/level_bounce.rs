use tracing::trace;

use crate::config::{ConfigError, StrategySettings, WeightSystemConfig};
use crate::core::indicators::{SwingPoint, SwingType};
use crate::core::weights::{WeightCalculator, WeightParams};
use crate::models::{Direction, SignalDirection};
use crate::strategies::signals::{Signal, StrategyMarketData};
use crate::strategies::{Strategy, StrategyError};

const NAME: &str = "LevelBounce";
const PRIORITY: u8 = 2;
const BASE_CONFIDENCE: f64 = 60.0;

/// A horizontal level built from clustered swing points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Level {
    pub price: f64,
    pub touches: u32,
}

/// Groups same-type swings lying within `tolerance_percent` of each other.
pub fn cluster_levels(swings: &[SwingPoint], kind: SwingType, tolerance_percent: f64) -> Vec<Level> {
    let mut prices: Vec<f64> = swings
        .iter()
        .filter(|s| s.swing_type == kind)
        .map(|s| s.price)
        .collect();
    prices.sort_by(|a, b| a.total_cmp(b));

    let mut levels: Vec<Level> = Vec::new();
    let mut sum = 0.0;
    for p in prices {
        match levels.last_mut() {
            Some(l) if (p - l.price).abs() / l.price * 100.0 <= tolerance_percent => {
                sum += p;
                l.touches += 1;
                l.price = sum / l.touches as f64;
            }
            _ => {
                sum = p;
                levels.push(Level {
                    price: p,
                    touches: 1,
                });
            }
        }
    }
    levels
}

/// Bounce off support or rejection from resistance, weighted by market context.
pub struct LevelBounceStrategy {
    settings: StrategySettings,
    weights: WeightCalculator,
}

impl LevelBounceStrategy {
    pub fn new(settings: StrategySettings, weights: WeightSystemConfig) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self {
            settings,
            weights: WeightCalculator::new(weights)?,
        })
    }

    fn nearest(&self, levels: &[Level], price: f64) -> Option<(Level, f64)> {
        levels
            .iter()
            .map(|l| (*l, (price - l.price).abs() / l.price * 100.0))
            .filter(|(_, d)| *d <= self.settings.level_proximity_percent)
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}

impl Strategy for LevelBounceStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn priority(&self) -> u8 {
        PRIORITY
    }

    fn evaluate(&mut self, data: &StrategyMarketData) -> Result<Option<Signal>, StrategyError> {
        let Some(last) = data.candles.last() else {
            return Err(StrategyError::InsufficientData {
                needed: 1,
                available: 0,
            });
        };
        if data.swing_points.is_empty() {
            return Ok(None);
        }

        let tol = self.settings.level_touch_tolerance_percent;
        let price = data.current_price;

        let support = self
            .nearest(&cluster_levels(&data.swing_points, SwingType::Low, tol), price)
            .filter(|(l, _)| last.is_bullish() && last.close >= l.price);
        let resistance = self
            .nearest(&cluster_levels(&data.swing_points, SwingType::High, tol), price)
            .filter(|(l, _)| last.is_bearish() && last.close <= l.price);

        let (direction, level) = match (support, resistance) {
            (Some(s), Some(r)) if r.1 < s.1 => (Direction::Short, r.0),
            (Some(s), _) => (Direction::Long, s.0),
            (None, Some(r)) => (Direction::Short, r.0),
            (None, None) => return Ok(None),
        };

        let ind = &data.indicators;
        let params = WeightParams {
            direction,
            rsi: ind.rsi,
            volume_ratio: ind.volume_ratio,
            level_touches: Some(level.touches),
            percent_b: ind.percent_b,
            is_squeeze: ind.is_squeeze,
            stoch_k: ind.stoch_k,
        };
        let confidence = self.weights.apply_weights(BASE_CONFIDENCE, &params);
        trace!(
            "{} {} level {:.2} x{} -> {:.1}",
            NAME,
            direction,
            level.price,
            level.touches,
            confidence
        );

        let stop = level.price * (1.0 - direction.sign() * self.settings.level_proximity_percent / 100.0);
        let signal = Signal::new(
            NAME,
            SignalDirection::from(direction),
            confidence,
            self.settings.level_weight,
            PRIORITY,
        )?
        .with_reason(format!(
            "{} at {:.2} ({} touches)",
            if direction == Direction::Long { "bounce" } else { "rejection" },
            level.price,
            level.touches
        ))
        .with_key_level(level.price)
        .with_stop_loss(stop);

        Ok(Some(signal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CandleSeries;
    use crate::test_helpers::{candle_at, ts};

    fn swing(kind: SwingType, price: f64) -> SwingPoint {
        SwingPoint {
            swing_type: kind,
            price,
            timestamp: ts(0),
            index: 0,
        }
    }

    fn strategy() -> LevelBounceStrategy {
        LevelBounceStrategy::new(StrategySettings::default(), WeightSystemConfig::default()).unwrap()
    }

    fn data_with(swings: Vec<SwingPoint>, open: f64, close: f64) -> StrategyMarketData {
        let mut c = candle_at(0, close);
        c.open = open;
        StrategyMarketData {
            symbol: "BTCUSDT".into(),
            current_price: close,
            candles: CandleSeries::new(vec![c]),
            swing_points: swings,
            ..Default::default()
        }
    }

    #[test]
    fn clusters_nearby_swings() {
        let swings = vec![
            swing(SwingType::Low, 100.0),
            swing(SwingType::Low, 100.1),
            swing(SwingType::Low, 105.0),
            swing(SwingType::High, 110.0),
        ];
        let levels = cluster_levels(&swings, SwingType::Low, 0.15);
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].touches, 2);
        assert!((levels[0].price - 100.05).abs() < 1e-9);
    }

    #[test]
    fn bullish_close_at_support_is_long() {
        let mut s = strategy();
        let swings = vec![
            swing(SwingType::Low, 100.0),
            swing(SwingType::Low, 100.05),
            swing(SwingType::Low, 99.98),
        ];
        let sig = s.evaluate(&data_with(swings, 99.9, 100.2)).unwrap().unwrap();
        assert_eq!(sig.direction, SignalDirection::Long);
        // three touches: strong level bonus
        assert!((sig.confidence - 72.0).abs() < 1e-9);
        assert!(sig.stop_loss.unwrap() < sig.key_level.unwrap());
    }

    #[test]
    fn bearish_close_at_resistance_is_short() {
        let mut s = strategy();
        let swings = vec![swing(SwingType::High, 100.0)];
        let sig = s.evaluate(&data_with(swings, 100.1, 99.8)).unwrap().unwrap();
        assert_eq!(sig.direction, SignalDirection::Short);
        assert!((sig.confidence - 54.0).abs() < 1e-9);
    }

    #[test]
    fn far_from_levels_is_silent() {
        let mut s = strategy();
        let swings = vec![swing(SwingType::Low, 90.0)];
        assert!(s.evaluate(&data_with(swings, 99.0, 100.0)).unwrap().is_none());
    }
}
