use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV bar; `timestamp` is the bar open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// High/low bracket open and close. False for any NaN.
    pub fn is_consistent(&self) -> bool {
        self.low <= self.open.min(self.close) && self.high >= self.open.max(self.close)
    }
}

/// Ordered (oldest-first) run of candles with the window helpers the
/// indicator layer and the strategies need.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(candles: Vec<Candle>) -> Self {
        Self { candles }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn tail(&self, n: usize) -> CandleSeries {
        let start = self.candles.len().saturating_sub(n);
        CandleSeries::new(self.candles[start..].to_vec())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candle> {
        self.candles.iter()
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }

    /// `-inf` when empty.
    pub fn highs_max(&self) -> f64 {
        self.candles.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max)
    }

    /// `+inf` when empty.
    pub fn lows_min(&self) -> f64 {
        self.candles.iter().map(|c| c.low).fold(f64::INFINITY, f64::min)
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    /// Candles opened on one UTC calendar day.
    pub fn filter_by_date(&self, date: NaiveDate) -> CandleSeries {
        CandleSeries::new(
            self.candles
                .iter()
                .filter(|c| c.timestamp.date_naive() == date)
                .cloned()
                .collect(),
        )
    }

    pub fn push(&mut self, candle: Candle) {
        self.candles.push(candle);
    }

    /// Drop the oldest candles so at most `max_len` remain.
    pub fn truncate_front(&mut self, max_len: usize) {
        if self.candles.len() > max_len {
            let excess = self.candles.len() - max_len;
            self.candles.drain(..excess);
        }
    }
}

impl std::ops::Index<usize> for CandleSeries {
    type Output = Candle;
    fn index(&self, index: usize) -> &Self::Output {
        &self.candles[index]
    }
}
