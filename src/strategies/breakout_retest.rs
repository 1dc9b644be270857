use chrono::NaiveDate;
use tracing::debug;

use crate::config::{ConfigError, DailyLevelConfig};
use crate::core::retest::{Breakout, BreakoutSetup, DailyLevel, RetestPhaseAnalyzer};
use crate::models::{Direction, SignalDirection};
use crate::strategies::signals::{Signal, StrategyMarketData};
use crate::strategies::{Strategy, StrategyError};

const NAME: &str = "BreakoutRetest";
const PRIORITY: u8 = 1;
const BASE_CONFIDENCE: f64 = 70.0;
const PER_TOUCH_BONUS: f64 = 5.0;
const MAX_CONFIDENCE: f64 = 90.0;

/// Running extremes of one UTC day.
#[derive(Debug, Clone, Copy)]
struct DayRange {
    date: NaiveDate,
    high: f64,
    low: f64,
}

/// Trades the retest of a broken previous-day high or low.
pub struct BreakoutRetestStrategy {
    analyzer: RetestPhaseAnalyzer,
    weight: f64,
    today: Option<DayRange>,
    daily_level: Option<(NaiveDate, DailyLevel)>,
    setup: Option<BreakoutSetup>,
    /// One breakout per side per day.
    used: Vec<(NaiveDate, Direction)>,
}

impl BreakoutRetestStrategy {
    pub fn new(cfg: DailyLevelConfig, weight: f64) -> Result<Self, ConfigError> {
        if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
            return Err(ConfigError::Invalid {
                field: "retest_weight",
                expected: "0.0-1.0",
            });
        }
        Ok(Self {
            analyzer: RetestPhaseAnalyzer::new(cfg)?,
            weight,
            today: None,
            daily_level: None,
            setup: None,
            used: Vec::new(),
        })
    }

    pub fn active_setup(&self) -> Option<&BreakoutSetup> {
        self.setup.as_ref()
    }

    /// Rolls the day accumulator and returns the previous day's level, if known.
    fn track_daily_level(&mut self, data: &StrategyMarketData) -> Option<DailyLevel> {
        let last = data.candles.last()?;
        let date = last.timestamp.date_naive();

        match self.today {
            Some(ref mut d) if d.date == date => {
                d.high = d.high.max(last.high);
                d.low = d.low.min(last.low);
            }
            prev => {
                if let Some(p) = prev.filter(|p| Some(p.date) == date.pred_opt()) {
                    self.daily_level = Some((
                        date,
                        DailyLevel {
                            high: p.high,
                            low: p.low,
                        },
                    ));
                }
                self.today = Some(DayRange {
                    date,
                    high: last.high,
                    low: last.low,
                });
                self.setup = None;
                self.used.retain(|(d, _)| *d == date);
            }
        }

        if !matches!(self.daily_level, Some((d, _)) if d == date) {
            let prev_day = data.candles.filter_by_date(date.pred_opt()?);
            if prev_day.is_empty() {
                return None;
            }
            self.daily_level = Some((
                date,
                DailyLevel {
                    high: prev_day.highs_max(),
                    low: prev_day.lows_min(),
                },
            ));
        }
        self.daily_level.map(|(_, l)| l)
    }
}

impl Strategy for BreakoutRetestStrategy {
    fn name(&self) -> &str {
        NAME
    }

    fn priority(&self) -> u8 {
        PRIORITY
    }

    fn reset(&mut self) {
        self.today = None;
        self.daily_level = None;
        self.setup = None;
        self.used.clear();
    }

    fn evaluate(&mut self, data: &StrategyMarketData) -> Result<Option<Signal>, StrategyError> {
        let Some(last) = data.candles.last().cloned() else {
            return Err(StrategyError::InsufficientData {
                needed: 1,
                available: 0,
            });
        };
        let Some(level) = self.track_daily_level(data) else {
            return Ok(None);
        };
        let date = last.timestamp.date_naive();

        let Some(mut setup) = self.setup.take() else {
            if let Some(direction) = self.analyzer.detect_breakout(&level, &last) {
                if !self.used.contains(&(date, direction)) {
                    debug!(
                        "{} breakout {} through {:.2} at {:.2}",
                        NAME,
                        direction,
                        level.level_for(direction),
                        last.close
                    );
                    self.used.push((date, direction));
                    self.setup = Some(BreakoutSetup::new(
                        direction,
                        level,
                        Breakout {
                            price: last.close,
                            timestamp: last.timestamp,
                        },
                    ));
                }
            }
            return Ok(None);
        };

        if self.analyzer.is_retest_timeout(&setup, last.timestamp) {
            debug!("{} retest of {:.2} timed out", NAME, setup.key_level());
            return Ok(None);
        }

        let update = self
            .analyzer
            .update_retest_info(&mut setup, &last, data.fine_candles());
        let ready = match (&update.retest, update.in_retest_zone) {
            (Some(info), true) => {
                !self.analyzer.config().require_second_touch || info.is_second_touch
            }
            _ => false,
        };
        if !ready {
            self.setup = Some(setup);
            return Ok(None);
        }

        let Some(info) = update.retest else {
            return Ok(None);
        };
        let stop = self.analyzer.calculate_tight_stop_loss(
            &info.local_high_low,
            setup.direction,
            self.analyzer.config().tight_stop_buffer_percent,
        );
        let confidence = (BASE_CONFIDENCE + PER_TOUCH_BONUS * (info.touch_count as f64 - 1.0))
            .min(MAX_CONFIDENCE);

        let signal = Signal::new(
            NAME,
            SignalDirection::from(setup.direction),
            confidence,
            self.weight,
            PRIORITY,
        )?
        .with_reason(format!(
            "retest #{} of broken daily {} {:.2}",
            info.touch_count,
            if setup.direction == Direction::Long { "high" } else { "low" },
            setup.key_level()
        ))
        .with_key_level(setup.key_level())
        .with_stop_loss(stop);

        Ok(Some(signal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::indicators::build_market_data;
    use crate::models::{Candle, CandleSeries};
    use crate::test_helpers::candle_at;

    const DAY: i64 = 86_400;

    fn day_one() -> Vec<Candle> {
        // previous day ranges 95-100
        (0..12)
            .map(|i| {
                let mut c = candle_at(i * 300, 97.0 + (i % 3) as f64);
                c.high = if i == 5 { 100.0 } else { 99.5 };
                c.low = if i == 7 { 95.0 } else { 96.0 };
                c
            })
            .collect()
    }

    fn feed(s: &mut BreakoutRetestStrategy, history: &mut Vec<Candle>, c: Candle) -> Option<Signal> {
        history.push(c);
        let data = build_market_data("BTCUSDT", CandleSeries::new(history.clone()), None).unwrap();
        s.evaluate(&data).unwrap()
    }

    #[test]
    fn second_touch_after_breakout_signals_long() {
        let mut s = BreakoutRetestStrategy::new(DailyLevelConfig::default(), 1.0).unwrap();
        let mut history = day_one();

        assert!(feed(&mut s, &mut history, candle_at(DAY, 100.5)).is_none());
        assert!(s.active_setup().is_some());

        assert!(feed(&mut s, &mut history, candle_at(DAY + 300, 99.8)).is_none());
        let sig = feed(&mut s, &mut history, candle_at(DAY + 600, 99.7)).unwrap();

        assert_eq!(sig.direction, SignalDirection::Long);
        assert!((sig.key_level.unwrap() - 100.0).abs() < 1e-9);
        assert!(sig.stop_loss.unwrap() < 99.7);
        assert!((sig.confidence - 75.0).abs() < 1e-9);
        assert!(s.active_setup().is_none());
    }

    #[test]
    fn breakout_fires_once_per_day() {
        let mut s = BreakoutRetestStrategy::new(DailyLevelConfig::default(), 1.0).unwrap();
        let mut history = day_one();
        feed(&mut s, &mut history, candle_at(DAY, 100.5));
        feed(&mut s, &mut history, candle_at(DAY + 300, 99.8));
        assert!(feed(&mut s, &mut history, candle_at(DAY + 600, 99.7)).is_some());

        feed(&mut s, &mut history, candle_at(DAY + 900, 100.6));
        assert!(s.active_setup().is_none());
    }

    #[test]
    fn stale_setup_is_dropped() {
        let mut s = BreakoutRetestStrategy::new(DailyLevelConfig::default(), 1.0).unwrap();
        let mut history = day_one();
        feed(&mut s, &mut history, candle_at(DAY, 94.0));
        assert_eq!(s.active_setup().unwrap().direction, Direction::Short);

        let late = candle_at(DAY + 14 * 300, 95.1);
        assert!(feed(&mut s, &mut history, late).is_none());
        assert!(s.active_setup().is_none());
    }

    #[test]
    fn no_previous_day_no_opinion() {
        let mut s = BreakoutRetestStrategy::new(DailyLevelConfig::default(), 1.0).unwrap();
        let mut history = Vec::new();
        assert!(feed(&mut s, &mut history, candle_at(0, 100.0)).is_none());
    }

    #[test]
    fn gap_day_does_not_promote_stale_range() {
        let mut s = BreakoutRetestStrategy::new(DailyLevelConfig::default(), 1.0).unwrap();
        let mut history = day_one();
        feed(&mut s, &mut history, candle_at(11 * 300, 98.0));

        // day three follows day one directly; day two is missing
        let mut window = Vec::new();
        assert!(feed(&mut s, &mut window, candle_at(2 * DAY, 100.5)).is_none());
        assert!(s.active_setup().is_none());
    }

    #[test]
    fn reset_forgets_previous_run() {
        let mut s = BreakoutRetestStrategy::new(DailyLevelConfig::default(), 1.0).unwrap();
        let mut history = day_one();
        feed(&mut s, &mut history, candle_at(DAY, 100.5));
        assert!(s.active_setup().is_some());

        s.reset();
        assert!(s.active_setup().is_none());

        // replaying day one alone has no previous day to break
        let mut replay = Vec::new();
        for c in day_one() {
            assert!(feed(&mut s, &mut replay, c).is_none());
        }
        assert!(s.active_setup().is_none());
    }

    #[test]
    fn bad_weight_rejected() {
        assert!(BreakoutRetestStrategy::new(DailyLevelConfig::default(), 1.5).is_err());
    }
}
