use crate::config::{ConfigError, StrategySettings};
use crate::core::indicators::volume_ratio;
use crate::models::SignalDirection;
use crate::strategies::signals::{Signal, StrategyMarketData};
use crate::strategies::{Strategy, StrategyError};

const NAME: &str = "WhaleFlow";
const PRIORITY: u8 = 4;
const VOLUME_PERIOD: usize = 20;
const BASE_CONFIDENCE: f64 = 50.0;
const CONFIDENCE_PER_EXCESS: f64 = 10.0;
const MAX_CONFIDENCE: f64 = 80.0;

/// Volume spikes on the finest candles, read as one-sided aggressive flow.
/// Only meaningful on a live feed.
pub struct WhaleFlowStrategy {
    settings: StrategySettings,
}

impl WhaleFlowStrategy {
    pub fn new(settings: StrategySettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self { settings })
    }
}

impl Strategy for WhaleFlowStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn priority(&self) -> u8 {
        PRIORITY
    }

    fn is_realtime_only(&self) -> bool {
        true
    }

    fn evaluate(&mut self, data: &StrategyMarketData) -> Result<Option<Signal>, StrategyError> {
        let candles = data.fine_candles();
        let Some(ratio) = volume_ratio(candles.as_slice(), VOLUME_PERIOD) else {
            return Err(StrategyError::InsufficientData {
                needed: VOLUME_PERIOD + 1,
                available: candles.len(),
            });
        };

        let threshold = self.settings.whale_volume_multiplier;
        if ratio < threshold {
            return Ok(None);
        }
        let Some(last) = candles.last() else {
            return Ok(None);
        };
        let direction = if last.is_bullish() {
            SignalDirection::Long
        } else if last.is_bearish() {
            SignalDirection::Short
        } else {
            return Ok(None);
        };

        let confidence =
            (BASE_CONFIDENCE + (ratio - threshold) * CONFIDENCE_PER_EXCESS).min(MAX_CONFIDENCE);
        let s = Signal::new(NAME, direction, confidence, self.settings.whale_weight, PRIORITY)?
            .with_reason(format!("volume {:.1}x average", ratio));
        Ok(Some(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Candle, CandleSeries};
    use crate::test_helpers::candle_at;

    fn with_spike(volume: f64, open: f64, close: f64) -> StrategyMarketData {
        let mut candles: Vec<Candle> = (0..20).map(|i| candle_at(i * 60, 100.0)).collect();
        let mut last = candle_at(20 * 60, close);
        last.open = open;
        last.volume = volume;
        candles.push(last);
        StrategyMarketData {
            candles_1m: Some(CandleSeries::new(candles)),
            ..Default::default()
        }
    }

    #[test]
    fn spike_follows_candle_colour() {
        let mut s = WhaleFlowStrategy::new(StrategySettings::default()).unwrap();
        let sig = s.evaluate(&with_spike(400.0, 100.0, 101.0)).unwrap().unwrap();
        assert_eq!(sig.direction, SignalDirection::Long);
        assert!((sig.confidence - 60.0).abs() < 1e-9);

        let sig = s.evaluate(&with_spike(1000.0, 101.0, 100.0)).unwrap().unwrap();
        assert_eq!(sig.direction, SignalDirection::Short);
        assert!((sig.confidence - MAX_CONFIDENCE).abs() < 1e-9);
    }

    #[test]
    fn normal_volume_is_silent() {
        let mut s = WhaleFlowStrategy::new(StrategySettings::default()).unwrap();
        assert!(s.evaluate(&with_spike(150.0, 100.0, 101.0)).unwrap().is_none());
    }

    #[test]
    fn flagged_realtime_only() {
        let s = WhaleFlowStrategy::new(StrategySettings::default()).unwrap();
        assert!(s.is_realtime_only());
    }
}
