#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use futures_signal_bot::config::{
    BacktestConfig, Config, CoordinatorConfig, DailyLevelConfig, EntryConfirmationConfig,
    StrategySettings, WeightSystemConfig,
};
use futures_signal_bot::models::{Candle, Timeframe};

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()
}

/// Five-minute triangle wave: `leg` bars up by `step`, `leg` bars back down.
/// Each bar opens where the previous one closed.
pub fn zigzag_candles(count: usize, start_price: f64, step: f64, leg: usize) -> Vec<Candle> {
    let path = |i: usize| {
        let k = i % (2 * leg);
        let offset = if k < leg { k } else { 2 * leg - k };
        start_price + offset as f64 * step
    };
    (0..count)
        .map(|i| {
            let open = path(i);
            let close = path(i + 1);
            Candle {
                timestamp: base_time() + Duration::minutes(5 * i as i64),
                open,
                high: open.max(close) + step * 0.25,
                low: open.min(close) - step * 0.25,
                close,
                volume: 100.0 + (i % 7) as f64 * 10.0,
            }
        })
        .collect()
}

/// Steady rise, every bar bullish.
pub fn rising_candles(count: usize, start_price: f64, step: f64) -> Vec<Candle> {
    (0..count)
        .map(|i| {
            let open = start_price + i as f64 * step;
            let close = open + step * 0.8;
            Candle {
                timestamp: base_time() + Duration::minutes(5 * i as i64),
                open,
                high: close + step * 0.2,
                low: open - step * 0.1,
                close,
                volume: 100.0,
            }
        })
        .collect()
}

pub fn test_config() -> Config {
    Config {
        symbol: "BTCUSDT".into(),
        timeframe: Timeframe::M5,
        candles_file: "data/candles.json".into(),
        coordinator: CoordinatorConfig::default(),
        weights: WeightSystemConfig::default(),
        entry_confirmation: EntryConfirmationConfig::default(),
        daily_levels: DailyLevelConfig::default(),
        strategies: StrategySettings::default(),
        backtest: BacktestConfig {
            symbol: "BTCUSDT".into(),
            timeframe: Timeframe::M5,
            ..BacktestConfig::default()
        },
        log_dir: std::env::temp_dir()
            .join("futures_signal_bot_it_logs")
            .to_string_lossy()
            .into_owned(),
        log_level: "ERROR".into(),
    }
}
