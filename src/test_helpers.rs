use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::config::{
    BacktestConfig, Config, CoordinatorConfig, DailyLevelConfig, EntryConfirmationConfig,
    StrategySettings, WeightSystemConfig,
};
use crate::exchange::order::{ExchangeOrder, OrderSide, OrderStatus, OrderType, StopOrderType};
use crate::models::{Candle, CandleSeries, SignalDirection, Timeframe};
use crate::strategies::{AggregatedDecision, Signal};

/// Midnight UTC plus `secs`.
pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap() + Duration::seconds(secs)
}

/// Flat candle at `close` with a 0.1% wick each side.
pub fn candle_at(secs: i64, close: f64) -> Candle {
    Candle {
        timestamp: ts(secs),
        open: close,
        high: close * 1.001,
        low: close * 0.999,
        close,
        volume: 100.0,
    }
}

/// Create candles from (open, high, low, close) tuples with auto-incrementing 1m timestamps.
pub fn make_candles(data: &[(f64, f64, f64, f64)]) -> CandleSeries {
    let candles: Vec<Candle> = data
        .iter()
        .enumerate()
        .map(|(i, &(o, h, l, c))| Candle {
            timestamp: ts(i as i64 * 60),
            open: o,
            high: h,
            low: l,
            close: c,
            volume: 100.0,
        })
        .collect();

    CandleSeries::new(candles)
}

/// Create n rising (bullish) candles starting from `start` price.
pub fn make_bullish_trend(n: usize, start: f64) -> CandleSeries {
    let candles: Vec<Candle> = (0..n)
        .map(|i| {
            let open = start + i as f64 * 10.0;
            let close = open + 8.0;
            Candle {
                timestamp: ts(i as i64 * 60),
                open,
                high: close + 2.0,
                low: open - 1.0,
                close,
                volume: 100.0,
            }
        })
        .collect();

    CandleSeries::new(candles)
}

/// Create n falling (bearish) candles starting from `start` price.
pub fn make_bearish_trend(n: usize, start: f64) -> CandleSeries {
    let candles: Vec<Candle> = (0..n)
        .map(|i| {
            let open = start - i as f64 * 10.0;
            let close = open - 8.0;
            Candle {
                timestamp: ts(i as i64 * 60),
                open,
                high: open + 1.0,
                low: close - 2.0,
                close,
                volume: 100.0,
            }
        })
        .collect();

    CandleSeries::new(candles)
}

/// A valid LONG decision at 75% from a single strategy.
pub fn sample_decision() -> AggregatedDecision {
    let signal = Signal::new("Sample", SignalDirection::Long, 75.0, 1.0, 1).unwrap();
    AggregatedDecision {
        valid: true,
        strategy_name: "Sample".into(),
        signal: Some(signal),
        reason: "sample".into(),
        long_score: 75.0,
        short_score: 0.0,
        hold_score: 0.0,
        supporting_signals: 1,
        key_level: None,
        stop_loss: None,
    }
}

/// A filled order as order history would report it.
pub fn filled_order(
    symbol: &str,
    order_type: OrderType,
    stop_order_type: Option<StopOrderType>,
    reduce_only: bool,
    price: f64,
    updated_time: i64,
) -> ExchangeOrder {
    ExchangeOrder {
        order_id: format!("test-{}", updated_time),
        symbol: symbol.to_string(),
        side: OrderSide::Sell,
        order_status: OrderStatus::Filled,
        order_type,
        stop_order_type,
        reduce_only,
        price,
        avg_price: Some(price),
        qty: 1.0,
        created_time: updated_time,
        updated_time,
    }
}

/// Defaults with quiet logging and a temp log dir; ignores the environment.
pub fn default_test_config() -> Config {
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
            .join("futures_signal_bot_test_logs")
            .to_string_lossy()
            .into_owned(),
        log_level: "ERROR".into(),
    }
}
