use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{Candle, CandleSeries};
use crate::strategies::signals::StrategyMarketData;
use crate::strategies::StrategyError;

const RSI_PERIOD: usize = 14;
const EMA_FAST: usize = 9;
const EMA_SLOW: usize = 21;
const BB_PERIOD: usize = 20;
const BB_STD_DEV: f64 = 2.0;
const STOCH_PERIOD: usize = 14;
const VOLUME_PERIOD: usize = 20;
const SWING_LOOKBACK: usize = 3;
/// Band width (as a fraction of the middle band) under which the bands count as squeezed.
const SQUEEZE_BANDWIDTH: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwingType {
    High,
    Low,
}

impl fmt::Display for SwingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwingType::High => write!(f, "high"),
            SwingType::Low => write!(f, "low"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwingPoint {
    pub swing_type: SwingType,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    pub percent_b: f64,
    pub bandwidth: f64,
}

/// Precomputed indicator values for the last closed candle. A field is `None`
/// when the window is too short for it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub rsi: Option<f64>,
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,
    pub volume_ratio: Option<f64>,
    pub percent_b: Option<f64>,
    pub is_squeeze: bool,
    pub stoch_k: Option<f64>,
}

impl IndicatorSnapshot {
    pub fn compute(candles: &CandleSeries) -> Self {
        let closes = candles.closes();
        let bands = bollinger(&closes, BB_PERIOD, BB_STD_DEV);
        Self {
            rsi: rsi(&closes, RSI_PERIOD),
            ema_fast: ema(&closes, EMA_FAST),
            ema_slow: ema(&closes, EMA_SLOW),
            volume_ratio: volume_ratio(candles.as_slice(), VOLUME_PERIOD),
            percent_b: bands.map(|b| b.percent_b),
            is_squeeze: bands.is_some_and(|b| b.bandwidth < SQUEEZE_BANDWIDTH),
            stoch_k: stochastic_k(candles.as_slice(), STOCH_PERIOD),
        }
    }
}

/// Wilder RSI over the whole series.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() <= period {
        return None;
    }

    let mut gain = 0.0;
    let mut loss = 0.0;
    for w in closes[..=period].windows(2) {
        let change = w[1] - w[0];
        if change > 0.0 {
            gain += change;
        } else {
            loss -= change;
        }
    }
    let mut avg_gain = gain / period as f64;
    let mut avg_loss = loss / period as f64;

    for w in closes[period..].windows(2) {
        let change = w[1] - w[0];
        let (g, l) = if change > 0.0 { (change, 0.0) } else { (0.0, -change) };
        avg_gain = (avg_gain * (period as f64 - 1.0) + g) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + l) / period as f64;
    }

    if avg_loss == 0.0 {
        return Some(if avg_gain == 0.0 { 50.0 } else { 100.0 });
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// EMA seeded with the SMA of the first `period` values.
pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let k = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;
    Some(
        values[period..]
            .iter()
            .fold(seed, |prev, &v| v * k + prev * (1.0 - k)),
    )
}

pub fn bollinger(closes: &[f64], period: usize, std_devs: f64) -> Option<BollingerBands> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let window = &closes[closes.len() - period..];
    let middle = window.iter().sum::<f64>() / period as f64;
    let variance = window.iter().map(|c| (c - middle).powi(2)).sum::<f64>() / period as f64;
    let sd = variance.sqrt();
    let upper = middle + std_devs * sd;
    let lower = middle - std_devs * sd;
    let last = *window.last()?;

    let percent_b = if upper > lower {
        (last - lower) / (upper - lower)
    } else {
        0.5
    };
    let bandwidth = if middle != 0.0 {
        (upper - lower) / middle
    } else {
        0.0
    };

    Some(BollingerBands {
        upper,
        middle,
        lower,
        percent_b,
        bandwidth,
    })
}

/// Fast %K of the last candle.
pub fn stochastic_k(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period {
        return None;
    }
    let window = &candles[candles.len() - period..];
    let high = window.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let low = window.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
    let close = window.last()?.close;
    if high > low {
        Some((close - low) / (high - low) * 100.0)
    } else {
        Some(50.0)
    }
}

/// Last candle's volume relative to the average of the `period` candles before it.
pub fn volume_ratio(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() <= period {
        return None;
    }
    let last = candles.last()?;
    let prior = &candles[candles.len() - 1 - period..candles.len() - 1];
    let avg = prior.iter().map(|c| c.volume).sum::<f64>() / period as f64;
    if avg > 0.0 {
        Some(last.volume / avg)
    } else {
        None
    }
}

/// Fractal swings: a high (low) strictly above (below) `lookback` candles on each side.
pub fn find_swing_points(candles: &CandleSeries, lookback: usize) -> Vec<SwingPoint> {
    let c = candles.as_slice();
    let mut swings = Vec::new();
    if lookback == 0 || c.len() < lookback * 2 + 1 {
        return swings;
    }

    for i in lookback..c.len() - lookback {
        let neighbours = (i - lookback..=i + lookback).filter(|&j| j != i);

        if neighbours.clone().all(|j| c[i].high > c[j].high) {
            swings.push(SwingPoint {
                swing_type: SwingType::High,
                price: c[i].high,
                timestamp: c[i].timestamp,
                index: i,
            });
        }
        if neighbours.clone().all(|j| c[i].low < c[j].low) {
            swings.push(SwingPoint {
                swing_type: SwingType::Low,
                price: c[i].low,
                timestamp: c[i].timestamp,
                index: i,
            });
        }
    }
    swings
}

/// Builds the strategy snapshot for a trailing window whose last candle just closed.
pub fn build_market_data(
    symbol: &str,
    window: CandleSeries,
    candles_1m: Option<CandleSeries>,
) -> Result<StrategyMarketData, StrategyError> {
    let last = window
        .last()
        .cloned()
        .ok_or(StrategyError::InsufficientData {
            needed: 1,
            available: 0,
        })?;
    if !last.close.is_finite() || last.close <= 0.0 {
        return Err(StrategyError::Failed(format!(
            "bad close {} at {}",
            last.close, last.timestamp
        )));
    }

    Ok(StrategyMarketData {
        symbol: symbol.to_string(),
        timestamp: Some(last.timestamp),
        current_price: last.close,
        indicators: IndicatorSnapshot::compute(&window),
        swing_points: find_swing_points(&window, SWING_LOOKBACK),
        candles: window,
        candles_1m,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{make_bearish_trend, make_bullish_trend, make_candles};

    #[test]
    fn rsi_extremes_on_monotonic_series() {
        let up: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let down: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        assert!((rsi(&up, 14).unwrap() - 100.0).abs() < 1e-9);
        assert!(rsi(&down, 14).unwrap() < 1e-9);
        assert!(rsi(&up[..10], 14).is_none());
    }

    #[test]
    fn ema_of_constant_is_constant() {
        let v = vec![42.0; 30];
        assert!((ema(&v, 9).unwrap() - 42.0).abs() < 1e-9);
    }

    #[test]
    fn ema_fast_above_slow_in_uptrend() {
        let s = make_bullish_trend(60, 100.0);
        let snap = IndicatorSnapshot::compute(&s);
        assert!(snap.ema_fast.unwrap() > snap.ema_slow.unwrap());

        let s = make_bearish_trend(60, 1000.0);
        let snap = IndicatorSnapshot::compute(&s);
        assert!(snap.ema_fast.unwrap() < snap.ema_slow.unwrap());
    }

    #[test]
    fn bollinger_flat_series_is_squeezed() {
        let closes = vec![100.0; 25];
        let b = bollinger(&closes, 20, 2.0).unwrap();
        assert!((b.percent_b - 0.5).abs() < 1e-9);
        assert!(b.bandwidth < SQUEEZE_BANDWIDTH);
    }

    #[test]
    fn stochastic_at_range_top() {
        let s = make_bullish_trend(20, 100.0);
        let k = stochastic_k(s.as_slice(), 14).unwrap();
        assert!(k > 80.0);
    }

    #[test]
    fn swing_points_detected() {
        let s = make_candles(&[
            (100.0, 101.0, 99.0, 100.0),
            (100.0, 102.0, 99.5, 101.0),
            (101.0, 103.0, 100.0, 102.0),
            (102.0, 110.0, 101.0, 104.0), // swing high
            (104.0, 104.5, 98.0, 99.0),
            (99.0, 100.0, 95.0, 96.0),
            (96.0, 97.0, 90.0, 92.0), // swing low
            (92.0, 99.0, 91.0, 98.0),
            (98.0, 100.0, 94.0, 99.0),
            (99.0, 101.0, 96.0, 100.0),
        ]);
        let swings = find_swing_points(&s, 3);
        assert!(swings
            .iter()
            .any(|p| p.swing_type == SwingType::High && (p.price - 110.0).abs() < 1e-9));
        assert!(swings
            .iter()
            .any(|p| p.swing_type == SwingType::Low && (p.price - 90.0).abs() < 1e-9));
    }

    #[test]
    fn market_data_requires_candles() {
        assert!(build_market_data("BTCUSDT", CandleSeries::default(), None).is_err());
        let data = build_market_data("BTCUSDT", make_bullish_trend(5, 100.0), None).unwrap();
        assert!((data.current_price - 148.0).abs() < 1e-9);
        assert_eq!(data.candles.len(), 5);
    }
}
