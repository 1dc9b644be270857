use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, DailyLevelConfig};
use crate::models::{Candle, CandleSeries, Direction};

const BAR_SECONDS: i64 = 300;

/// Previous UTC day's extremes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyLevel {
    pub high: f64,
    pub low: f64,
}

impl DailyLevel {
    /// The side of the range a breakout in `direction` went through.
    pub fn level_for(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Long => self.high,
            Direction::Short => self.low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breakout {
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocalHighLow {
    pub high: f64,
    pub low: f64,
    pub bars: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetestInfo {
    pub entry_price: f64,
    pub timestamp: DateTime<Utc>,
    pub touch_count: u32,
    pub is_second_touch: bool,
    pub local_high_low: LocalHighLow,
}

/// A broken daily level waiting for price to come back and test it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakoutSetup {
    pub direction: Direction,
    pub daily_level: DailyLevel,
    pub breakout: Breakout,
    pub retest: Option<RetestInfo>,
}

impl BreakoutSetup {
    pub fn new(direction: Direction, daily_level: DailyLevel, breakout: Breakout) -> Self {
        Self {
            direction,
            daily_level,
            breakout,
            retest: None,
        }
    }

    pub fn key_level(&self) -> f64 {
        self.daily_level.level_for(self.direction)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetestUpdate {
    pub in_retest_zone: bool,
    pub retest: Option<RetestInfo>,
}

pub struct RetestPhaseAnalyzer {
    cfg: DailyLevelConfig,
}

impl RetestPhaseAnalyzer {
    pub fn new(cfg: DailyLevelConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    pub fn config(&self) -> &DailyLevelConfig {
        &self.cfg
    }

    /// Close far enough beyond the daily range to count as a breakout.
    pub fn detect_breakout(&self, level: &DailyLevel, candle: &Candle) -> Option<Direction> {
        let margin = self.cfg.breakout_percent / 100.0;
        if candle.close > level.high * (1.0 + margin) {
            Some(Direction::Long)
        } else if candle.close < level.low * (1.0 - margin) {
            Some(Direction::Short)
        } else {
            None
        }
    }

    /// LONG: `[high * threshold, high]`. SHORT: `[low, low * (2 - threshold)]`.
    pub fn is_in_retest_zone(&self, price: f64, level: &DailyLevel, direction: Direction) -> bool {
        let t = self.cfg.retest_threshold;
        match direction {
            Direction::Long => price >= level.high * t && price <= level.high,
            Direction::Short => price >= level.low && price <= level.low * (2.0 - t),
        }
    }

    fn local_high_low(&self, candle: &Candle, candles_1m: &CandleSeries) -> LocalHighLow {
        let window = candles_1m.tail(self.cfg.local_extreme_lookback);
        if window.is_empty() {
            return LocalHighLow {
                high: candle.high,
                low: candle.low,
                bars: 1,
            };
        }
        LocalHighLow {
            high: window.highs_max(),
            low: window.lows_min(),
            bars: window.len(),
        }
    }

    /// Advances the setup's touch tracking by one evaluation.
    pub fn update_retest_info(
        &self,
        setup: &mut BreakoutSetup,
        candle: &Candle,
        candles_1m: &CandleSeries,
    ) -> RetestUpdate {
        let in_zone = self.is_in_retest_zone(candle.close, &setup.daily_level, setup.direction);
        if !in_zone {
            return RetestUpdate {
                in_retest_zone: false,
                retest: setup.retest.clone(),
            };
        }

        let local = self.local_high_low(candle, candles_1m);
        let info = match setup.retest.take() {
            None => RetestInfo {
                entry_price: candle.close,
                timestamp: candle.timestamp,
                touch_count: 1,
                is_second_touch: false,
                local_high_low: local,
            },
            Some(mut info) => {
                info.touch_count += 1;
                info.is_second_touch = info.touch_count >= 2;
                info.local_high_low = local;
                info
            }
        };
        setup.retest = Some(info.clone());

        RetestUpdate {
            in_retest_zone: true,
            retest: Some(info),
        }
    }

    /// More than `retest_timeout_bars` 5m bars since the breakout.
    pub fn is_retest_timeout(&self, setup: &BreakoutSetup, now: DateTime<Utc>) -> bool {
        let elapsed = (now - setup.breakout.timestamp).num_seconds();
        elapsed / BAR_SECONDS > self.cfg.retest_timeout_bars
    }

    pub fn calculate_tight_stop_loss(
        &self,
        local: &LocalHighLow,
        direction: Direction,
        buffer_percent: f64,
    ) -> f64 {
        let buffer = buffer_percent / 100.0;
        match direction {
            Direction::Long => local.low * (1.0 - buffer),
            Direction::Short => local.high * (1.0 + buffer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{candle_at, ts};

    fn analyzer() -> RetestPhaseAnalyzer {
        RetestPhaseAnalyzer::new(DailyLevelConfig::default()).unwrap()
    }

    fn long_setup() -> BreakoutSetup {
        BreakoutSetup::new(
            Direction::Long,
            DailyLevel {
                high: 100.0,
                low: 90.0,
            },
            Breakout {
                price: 101.0,
                timestamp: ts(0),
            },
        )
    }

    #[test]
    fn zone_bounds() {
        let a = analyzer();
        let lvl = DailyLevel {
            high: 100.0,
            low: 90.0,
        };
        assert!(a.is_in_retest_zone(99.6, &lvl, Direction::Long));
        assert!(a.is_in_retest_zone(100.0, &lvl, Direction::Long));
        assert!(!a.is_in_retest_zone(100.5, &lvl, Direction::Long));
        assert!(!a.is_in_retest_zone(99.0, &lvl, Direction::Long));

        assert!(a.is_in_retest_zone(90.3, &lvl, Direction::Short));
        assert!(!a.is_in_retest_zone(89.9, &lvl, Direction::Short));
        assert!(!a.is_in_retest_zone(90.6, &lvl, Direction::Short));
    }

    #[test]
    fn touches_only_increase_and_second_touch_at_two() {
        let a = analyzer();
        let mut setup = long_setup();
        let none = CandleSeries::default();

        let u = a.update_retest_info(&mut setup, &candle_at(300, 99.8), &none);
        assert!(u.in_retest_zone);
        let first = u.retest.unwrap();
        assert_eq!(first.touch_count, 1);
        assert!(!first.is_second_touch);

        // leaving the zone keeps the count
        let u = a.update_retest_info(&mut setup, &candle_at(600, 101.5), &none);
        assert!(!u.in_retest_zone);
        assert_eq!(u.retest.unwrap().touch_count, 1);

        let u = a.update_retest_info(&mut setup, &candle_at(900, 99.9), &none);
        let second = u.retest.unwrap();
        assert_eq!(second.touch_count, 2);
        assert!(second.is_second_touch);
        assert_eq!(second.timestamp, first.timestamp);

        let u = a.update_retest_info(&mut setup, &candle_at(1200, 99.7), &none);
        assert_eq!(u.retest.unwrap().touch_count, 3);
    }

    #[test]
    fn outside_without_history_reports_nothing() {
        let a = analyzer();
        let mut setup = long_setup();
        let u = a.update_retest_info(&mut setup, &candle_at(300, 102.0), &CandleSeries::default());
        assert!(!u.in_retest_zone);
        assert!(u.retest.is_none());
    }

    #[test]
    fn local_extremes_from_one_minute_window() {
        let a = analyzer();
        let mut setup = long_setup();
        let fine: Vec<Candle> = (0..15)
            .map(|i| {
                let mut c = candle_at(i * 60, 99.8);
                c.high = 100.0 + i as f64 * 0.01;
                c.low = 99.0 + i as f64 * 0.01;
                c
            })
            .collect();
        let fine = CandleSeries::new(fine);

        let info = a
            .update_retest_info(&mut setup, &candle_at(900, 99.8), &fine)
            .retest
            .unwrap();
        assert_eq!(info.local_high_low.bars, 10);
        assert!((info.local_high_low.low - 99.05).abs() < 1e-9);
        assert!((info.local_high_low.high - 100.14).abs() < 1e-9);
    }

    #[test]
    fn timeout_after_window() {
        let a = analyzer();
        let setup = long_setup();
        assert!(!a.is_retest_timeout(&setup, ts(12 * 300)));
        assert!(!a.is_retest_timeout(&setup, ts(12 * 300 + 299)));
        assert!(a.is_retest_timeout(&setup, ts(13 * 300)));
    }

    #[test]
    fn tight_stop_uses_percent_buffer() {
        let a = analyzer();
        let local = LocalHighLow {
            high: 101.0,
            low: 99.0,
            bars: 10,
        };
        let long = a.calculate_tight_stop_loss(&local, Direction::Long, 0.1);
        let short = a.calculate_tight_stop_loss(&local, Direction::Short, 0.1);
        assert!((long - 98.901).abs() < 1e-9);
        assert!((short - 101.101).abs() < 1e-9);
    }

    #[test]
    fn breakout_needs_margin() {
        let a = analyzer();
        let lvl = DailyLevel {
            high: 100.0,
            low: 90.0,
        };
        assert_eq!(a.detect_breakout(&lvl, &candle_at(0, 100.05)), None);
        assert_eq!(a.detect_breakout(&lvl, &candle_at(0, 100.2)), Some(Direction::Long));
        assert_eq!(a.detect_breakout(&lvl, &candle_at(0, 89.8)), Some(Direction::Short));
    }
}
