use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::indicators::{IndicatorSnapshot, SwingPoint};
use crate::models::{CandleSeries, SignalDirection};
use crate::strategies::StrategyError;

/// One strategy's opinion for the current evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub source: String,
    pub direction: SignalDirection,
    /// 0-100
    pub confidence: f64,
    /// 0.0-1.0
    pub weight: f64,
    /// 1 (highest) to 10
    pub priority: u8,
    #[serde(default)]
    pub reason: String,
    /// Price level the opinion is anchored to (support, resistance, broken daily level).
    #[serde(default)]
    pub key_level: Option<f64>,
    #[serde(default)]
    pub stop_loss: Option<f64>,
}

impl Signal {
    pub fn new(
        source: impl Into<String>,
        direction: SignalDirection,
        confidence: f64,
        weight: f64,
        priority: u8,
    ) -> Result<Self, StrategyError> {
        let signal = Self {
            source: source.into(),
            direction,
            confidence,
            weight,
            priority,
            reason: String::new(),
            key_level: None,
            stop_loss: None,
        };
        signal.validate()?;
        Ok(signal)
    }

    /// Range checks on confidence, weight and priority. The fields are public,
    /// so signals built as literals are re-checked before they vote.
    pub fn validate(&self) -> Result<(), StrategyError> {
        if !self.confidence.is_finite() || !(0.0..=100.0).contains(&self.confidence) {
            return Err(StrategyError::InvalidSignal {
                field: "confidence",
                value: self.confidence,
            });
        }
        if !self.weight.is_finite() || !(0.0..=1.0).contains(&self.weight) {
            return Err(StrategyError::InvalidSignal {
                field: "weight",
                value: self.weight,
            });
        }
        if !(1..=10).contains(&self.priority) {
            return Err(StrategyError::InvalidSignal {
                field: "priority",
                value: self.priority as f64,
            });
        }
        Ok(())
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_key_level(mut self, level: f64) -> Self {
        self.key_level = Some(level);
        self
    }

    pub fn with_stop_loss(mut self, stop: f64) -> Self {
        self.stop_loss = Some(stop);
        self
    }

    /// `confidence/100 * weight`, the unit summed across signals.
    pub fn score(&self) -> f64 {
        self.confidence / 100.0 * self.weight
    }
}

/// Coordinator output for one evaluation cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedDecision {
    pub valid: bool,
    pub strategy_name: String,
    pub signal: Option<Signal>,
    pub reason: String,
    pub long_score: f64,
    pub short_score: f64,
    pub hold_score: f64,
    pub supporting_signals: usize,
    pub key_level: Option<f64>,
    pub stop_loss: Option<f64>,
}

impl AggregatedDecision {
    pub fn confidence(&self) -> f64 {
        self.signal.as_ref().map_or(0.0, |s| s.confidence)
    }

    pub fn direction(&self) -> Option<SignalDirection> {
        self.signal.as_ref().map(|s| s.direction)
    }
}

/// Snapshot handed to every strategy on each evaluation.
#[derive(Debug, Clone, Default)]
pub struct StrategyMarketData {
    pub symbol: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub current_price: f64,
    /// Entry-timeframe candles, oldest first, last one just closed.
    pub candles: CandleSeries,
    /// One-minute candles when the feed provides them.
    pub candles_1m: Option<CandleSeries>,
    pub indicators: IndicatorSnapshot,
    pub swing_points: Vec<SwingPoint>,
}

impl StrategyMarketData {
    /// Finest-grained candles available.
    pub fn fine_candles(&self) -> &CandleSeries {
        self.candles_1m.as_ref().unwrap_or(&self.candles)
    }
}
