use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Timeframe;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Missing or invalid: {field} ({expected})")]
    Invalid {
        field: &'static str,
        expected: &'static str,
    },
}

fn require(ok: bool, field: &'static str, expected: &'static str) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::Invalid { field, expected })
    }
}

fn in_range(v: f64, lo: f64, hi: f64) -> bool {
    v.is_finite() && v >= lo && v <= hi
}

fn positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

// ─── Coordinator ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Winning score share of the total score needed to act (0.0-1.0).
    pub min_score_ratio: f64,
    /// Minimum confidence after penalties (0-100).
    pub min_avg_confidence: f64,
    /// Fewer corroborating signals than this triggers the blind-zone penalty.
    pub blind_zone_min_signals: usize,
    pub blind_zone_penalty: f64,
    pub confidence_penalty_floor: f64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            min_score_ratio: 0.6,
            min_avg_confidence: 60.0,
            blind_zone_min_signals: 3,
            blind_zone_penalty: 0.85,
            confidence_penalty_floor: 10.0,
        }
    }
}

impl CoordinatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require(
            in_range(self.min_score_ratio, 0.0, 1.0),
            "min_score_ratio",
            "0.0-1.0",
        )?;
        require(
            in_range(self.min_avg_confidence, 0.0, 100.0),
            "min_avg_confidence",
            "0-100",
        )?;
        require(
            self.blind_zone_penalty.is_finite()
                && self.blind_zone_penalty > 0.0
                && self.blind_zone_penalty <= 1.0,
            "blind_zone_penalty",
            "0.0 < penalty <= 1.0",
        )?;
        require(
            in_range(self.confidence_penalty_floor, 0.0, 100.0),
            "confidence_penalty_floor",
            "0-100",
        )
    }
}

// ─── Weight system ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RsiModifierConfig {
    pub enabled: bool,
    pub extreme_oversold: f64,
    pub oversold: f64,
    pub overbought: f64,
    pub extreme_overbought: f64,
    pub bonus: f64,
    pub extreme_bonus: f64,
    pub penalty: f64,
    pub extreme_penalty: f64,
}

impl Default for RsiModifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            extreme_oversold: 20.0,
            oversold: 30.0,
            overbought: 70.0,
            extreme_overbought: 80.0,
            bonus: 1.15,
            extreme_bonus: 1.3,
            penalty: 0.85,
            extreme_penalty: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeModifierConfig {
    pub enabled: bool,
    pub high_ratio: f64,
    pub low_ratio: f64,
    pub high_bonus: f64,
    pub low_penalty: f64,
}

impl Default for VolumeModifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            high_ratio: 1.5,
            low_ratio: 0.5,
            high_bonus: 1.15,
            low_penalty: 0.85,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelStrengthConfig {
    pub enabled: bool,
    pub medium_touches: u32,
    pub strong_touches: u32,
    pub medium_bonus: f64,
    pub strong_bonus: f64,
    pub weak_penalty: f64,
}

impl Default for LevelStrengthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            medium_touches: 2,
            strong_touches: 3,
            medium_bonus: 1.1,
            strong_bonus: 1.2,
            weak_penalty: 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BollingerModifierConfig {
    pub enabled: bool,
    pub lower_zone: f64,
    pub upper_zone: f64,
    pub band_bonus: f64,
    pub band_penalty: f64,
    pub squeeze_multiplier: f64,
}

impl Default for BollingerModifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lower_zone: 0.2,
            upper_zone: 0.8,
            band_bonus: 1.15,
            band_penalty: 0.85,
            squeeze_multiplier: 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StochasticModifierConfig {
    pub enabled: bool,
    pub oversold: f64,
    pub overbought: f64,
    pub bonus: f64,
    pub double_confirmation_bonus: f64,
    pub penalty: f64,
}

impl Default for StochasticModifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            oversold: 20.0,
            overbought: 80.0,
            bonus: 1.1,
            double_confirmation_bonus: 1.2,
            penalty: 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightSystemConfig {
    pub enabled: bool,
    pub rsi: RsiModifierConfig,
    pub volume: VolumeModifierConfig,
    pub level_strength: LevelStrengthConfig,
    pub bollinger: BollingerModifierConfig,
    pub stochastic: StochasticModifierConfig,
}

impl Default for WeightSystemConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rsi: RsiModifierConfig::default(),
            volume: VolumeModifierConfig::default(),
            level_strength: LevelStrengthConfig::default(),
            bollinger: BollingerModifierConfig::default(),
            stochastic: StochasticModifierConfig::default(),
        }
    }
}

impl WeightSystemConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.rsi;
        require(
            in_range(r.extreme_oversold, 0.0, 100.0)
                && r.extreme_oversold <= r.oversold
                && r.oversold < r.overbought
                && r.overbought <= r.extreme_overbought
                && r.extreme_overbought <= 100.0,
            "rsi thresholds",
            "0 <= extreme_oversold <= oversold < overbought <= extreme_overbought <= 100",
        )?;
        for (v, field) in [
            (r.bonus, "rsi.bonus"),
            (r.extreme_bonus, "rsi.extreme_bonus"),
            (r.penalty, "rsi.penalty"),
            (r.extreme_penalty, "rsi.extreme_penalty"),
        ] {
            require(positive(v), field, "multiplier > 0")?;
        }

        let v = &self.volume;
        require(
            positive(v.low_ratio) && v.low_ratio < v.high_ratio,
            "volume ratios",
            "0 < low_ratio < high_ratio",
        )?;
        require(positive(v.high_bonus), "volume.high_bonus", "multiplier > 0")?;
        require(positive(v.low_penalty), "volume.low_penalty", "multiplier > 0")?;

        let l = &self.level_strength;
        require(
            l.medium_touches >= 1 && l.medium_touches <= l.strong_touches,
            "level_strength touches",
            "1 <= medium_touches <= strong_touches",
        )?;
        for (m, field) in [
            (l.medium_bonus, "level_strength.medium_bonus"),
            (l.strong_bonus, "level_strength.strong_bonus"),
            (l.weak_penalty, "level_strength.weak_penalty"),
        ] {
            require(positive(m), field, "multiplier > 0")?;
        }

        let b = &self.bollinger;
        require(
            b.lower_zone.is_finite() && b.upper_zone.is_finite() && b.lower_zone < b.upper_zone,
            "bollinger zones",
            "lower_zone < upper_zone",
        )?;
        for (m, field) in [
            (b.band_bonus, "bollinger.band_bonus"),
            (b.band_penalty, "bollinger.band_penalty"),
            (b.squeeze_multiplier, "bollinger.squeeze_multiplier"),
        ] {
            require(positive(m), field, "multiplier > 0")?;
        }

        let s = &self.stochastic;
        require(
            in_range(s.oversold, 0.0, 100.0)
                && in_range(s.overbought, 0.0, 100.0)
                && s.oversold < s.overbought,
            "stochastic thresholds",
            "0 <= oversold < overbought <= 100",
        )?;
        for (m, field) in [
            (s.bonus, "stochastic.bonus"),
            (s.double_confirmation_bonus, "stochastic.double_confirmation_bonus"),
            (s.penalty, "stochastic.penalty"),
        ] {
            require(positive(m), field, "multiplier > 0")?;
        }
        Ok(())
    }
}

// ─── Entry confirmation ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryConfirmationConfig {
    pub enabled: bool,
    pub long_expiry_seconds: i64,
    pub short_expiry_seconds: i64,
    pub long_tolerance_percent: f64,
    pub short_tolerance_percent: f64,
    /// Minimum bounce/rejection away from the key level, percent.
    pub min_bounce_percent: Option<f64>,
}

impl Default for EntryConfirmationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            long_expiry_seconds: 600,
            short_expiry_seconds: 600,
            long_tolerance_percent: 0.5,
            short_tolerance_percent: 0.5,
            min_bounce_percent: None,
        }
    }
}

impl EntryConfirmationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require(
            self.long_expiry_seconds > 0,
            "long_expiry_seconds",
            "seconds > 0",
        )?;
        require(
            self.short_expiry_seconds > 0,
            "short_expiry_seconds",
            "seconds > 0",
        )?;
        require(
            in_range(self.long_tolerance_percent, 0.0, 100.0),
            "long_tolerance_percent",
            "0-100",
        )?;
        require(
            in_range(self.short_tolerance_percent, 0.0, 100.0),
            "short_tolerance_percent",
            "0-100",
        )?;
        if let Some(b) = self.min_bounce_percent {
            require(b.is_finite(), "min_bounce_percent", "finite percent")?;
        }
        Ok(())
    }
}

// ─── Daily levels / retest ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyLevelConfig {
    /// Fraction of the level that bounds the retest zone, e.g. 0.995.
    pub retest_threshold: f64,
    /// Retest window after a breakout, in 5-minute bars.
    pub retest_timeout_bars: i64,
    pub local_extreme_lookback: usize,
    pub tight_stop_buffer_percent: f64,
    /// Close beyond the level by this percent to count as a breakout.
    pub breakout_percent: f64,
    pub require_second_touch: bool,
}

impl Default for DailyLevelConfig {
    fn default() -> Self {
        Self {
            retest_threshold: 0.995,
            retest_timeout_bars: 12,
            local_extreme_lookback: 10,
            tight_stop_buffer_percent: 0.1,
            breakout_percent: 0.1,
            require_second_touch: true,
        }
    }
}

impl DailyLevelConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require(
            self.retest_threshold.is_finite()
                && self.retest_threshold > 0.0
                && self.retest_threshold <= 1.0,
            "retest_threshold",
            "0.0 < threshold <= 1.0",
        )?;
        require(
            self.retest_timeout_bars > 0,
            "retest_timeout_bars",
            "bars > 0",
        )?;
        require(
            self.local_extreme_lookback > 0,
            "local_extreme_lookback",
            "candles > 0",
        )?;
        require(
            in_range(self.tight_stop_buffer_percent, 0.0, 100.0),
            "tight_stop_buffer_percent",
            "0-100",
        )?;
        require(
            in_range(self.breakout_percent, 0.0, 100.0),
            "breakout_percent",
            "0-100",
        )
    }
}

// ─── Reference strategies ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySettings {
    /// Max distance from a swing level to treat price as testing it, percent.
    pub level_proximity_percent: f64,
    /// Swing points within this percent count as touches of the same level.
    pub level_touch_tolerance_percent: f64,
    pub level_weight: f64,
    pub trend_min_spread_percent: f64,
    pub trend_weight: f64,
    pub retest_weight: f64,
    pub whale_volume_multiplier: f64,
    pub whale_weight: f64,
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            level_proximity_percent: 0.3,
            level_touch_tolerance_percent: 0.15,
            level_weight: 0.9,
            trend_min_spread_percent: 0.05,
            trend_weight: 0.7,
            retest_weight: 1.0,
            whale_volume_multiplier: 3.0,
            whale_weight: 0.6,
        }
    }
}

impl StrategySettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require(
            positive(self.level_proximity_percent),
            "level_proximity_percent",
            "percent > 0",
        )?;
        require(
            positive(self.level_touch_tolerance_percent),
            "level_touch_tolerance_percent",
            "percent > 0",
        )?;
        require(
            in_range(self.trend_min_spread_percent, 0.0, 100.0),
            "trend_min_spread_percent",
            "0-100",
        )?;
        require(
            positive(self.whale_volume_multiplier),
            "whale_volume_multiplier",
            "multiplier > 0",
        )?;
        for (w, field) in [
            (self.level_weight, "level_weight"),
            (self.trend_weight, "trend_weight"),
            (self.retest_weight, "retest_weight"),
            (self.whale_weight, "whale_weight"),
        ] {
            require(in_range(w, 0.0, 1.0), field, "0.0-1.0")?;
        }
        Ok(())
    }
}

// ─── Backtest ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub initial_balance: f64,
    /// Notional per trade, quote currency.
    pub position_size_usd: f64,
    /// Taker fee as a fraction (0.00055 = 0.055%).
    pub fee_rate: f64,
    pub stop_loss_percent: f64,
    pub take_profit_percents: [f64; 3],
    pub min_confidence: f64,
    pub lookback_candles: usize,
    pub warmup_candles: usize,
    pub use_signal_stop_loss: bool,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            timeframe: Timeframe::M5,
            initial_balance: 1000.0,
            position_size_usd: 100.0,
            fee_rate: 0.00055,
            stop_loss_percent: 1.0,
            take_profit_percents: [1.0, 2.0, 3.0],
            min_confidence: 60.0,
            lookback_candles: 100,
            warmup_candles: 50,
            use_signal_stop_loss: false,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require(!self.symbol.is_empty(), "symbol", "non-empty")?;
        require(
            positive(self.initial_balance),
            "initial_balance",
            "amount > 0",
        )?;
        require(
            positive(self.position_size_usd),
            "position_size_usd",
            "amount > 0",
        )?;
        require(
            self.fee_rate.is_finite() && self.fee_rate >= 0.0 && self.fee_rate < 1.0,
            "fee_rate",
            "0.0 <= rate < 1.0",
        )?;
        require(
            positive(self.stop_loss_percent) && self.stop_loss_percent < 100.0,
            "stop_loss_percent",
            "0 < percent < 100",
        )?;
        let tps = self.take_profit_percents;
        require(
            tps.iter().all(|&t| positive(t)) && tps[0] <= tps[1] && tps[1] <= tps[2],
            "take_profit_percents",
            "positive and ascending TP1 <= TP2 <= TP3",
        )?;
        require(
            in_range(self.min_confidence, 0.0, 100.0),
            "min_confidence",
            "0-100",
        )?;
        require(
            self.lookback_candles >= 2,
            "lookback_candles",
            "candles >= 2",
        )?;
        require(
            self.warmup_candles >= 1 && self.warmup_candles <= self.lookback_candles,
            "warmup_candles",
            "1 <= warmup <= lookback_candles",
        )
    }
}

// ─── Top level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub candles_file: String,
    pub coordinator: CoordinatorConfig,
    pub weights: WeightSystemConfig,
    pub entry_confirmation: EntryConfirmationConfig,
    pub daily_levels: DailyLevelConfig,
    pub strategies: StrategySettings,
    pub backtest: BacktestConfig,
    pub log_dir: String,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let env = |key: &str, default: &str| -> String {
            std::env::var(key).unwrap_or_else(|_| default.to_string())
        };

        let symbol = env("SYMBOL", "BTCUSDT");
        let timeframe = Timeframe::from_str_loose(&env("TIMEFRAME", "5m")).unwrap_or(Timeframe::M5);

        let coordinator = CoordinatorConfig {
            min_score_ratio: env("MIN_SCORE_RATIO", "0.6").parse().unwrap_or(0.6),
            min_avg_confidence: env("MIN_AVG_CONFIDENCE", "60").parse().unwrap_or(60.0),
            blind_zone_min_signals: env("BLIND_ZONE_MIN_SIGNALS", "3").parse().unwrap_or(3),
            ..CoordinatorConfig::default()
        };

        let entry_confirmation = EntryConfirmationConfig {
            enabled: env("ENTRY_CONFIRMATION", "true").to_lowercase() == "true",
            min_bounce_percent: std::env::var("MIN_BOUNCE_PERCENT")
                .ok()
                .and_then(|s| s.parse().ok()),
            ..EntryConfirmationConfig::default()
        };

        let backtest = BacktestConfig {
            symbol: symbol.clone(),
            timeframe,
            initial_balance: env("INITIAL_BALANCE", "1000").parse().unwrap_or(1000.0),
            position_size_usd: env("POSITION_SIZE_USD", "100").parse().unwrap_or(100.0),
            fee_rate: env("FEE_RATE", "0.00055").parse().unwrap_or(0.00055), // Bybit taker
            stop_loss_percent: env("STOP_LOSS_PERCENT", "1.0").parse().unwrap_or(1.0),
            min_confidence: env("MIN_CONFIDENCE", "60").parse().unwrap_or(60.0),
            use_signal_stop_loss: env("USE_SIGNAL_STOP_LOSS", "false").to_lowercase() == "true",
            ..BacktestConfig::default()
        };

        Config {
            symbol,
            timeframe,
            candles_file: env("CANDLES_FILE", "data/candles.json"),
            coordinator,
            weights: WeightSystemConfig {
                enabled: env("WEIGHT_SYSTEM", "true").to_lowercase() == "true",
                ..WeightSystemConfig::default()
            },
            entry_confirmation,
            daily_levels: DailyLevelConfig::default(),
            strategies: StrategySettings::default(),
            backtest,
            log_dir: env("LOG_DIR", "logs"),
            log_level: env("LOG_LEVEL", "info"),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.coordinator.validate()?;
        self.weights.validate()?;
        self.entry_confirmation.validate()?;
        self.daily_levels.validate()?;
        self.strategies.validate()?;
        self.backtest.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(CoordinatorConfig::default().validate().is_ok());
        assert!(WeightSystemConfig::default().validate().is_ok());
        assert!(EntryConfirmationConfig::default().validate().is_ok());
        assert!(DailyLevelConfig::default().validate().is_ok());
        assert!(StrategySettings::default().validate().is_ok());
        assert!(BacktestConfig::default().validate().is_ok());
    }

    #[test]
    fn invalid_weight_names_the_field() {
        let s = StrategySettings {
            trend_weight: 1.5,
            ..StrategySettings::default()
        };
        let err = s.validate().unwrap_err();
        assert_eq!(err.to_string(), "Missing or invalid: trend_weight (0.0-1.0)");
    }

    #[test]
    fn descending_take_profits_rejected() {
        let cfg = BacktestConfig {
            take_profit_percents: [2.0, 1.0, 3.0],
            ..BacktestConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid {
                field: "take_profit_percents",
                ..
            })
        ));
    }

    #[test]
    fn retest_threshold_above_one_rejected() {
        let cfg = DailyLevelConfig {
            retest_threshold: 1.2,
            ..DailyLevelConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unordered_rsi_thresholds_rejected() {
        let mut cfg = WeightSystemConfig::default();
        cfg.rsi.oversold = 75.0;
        assert!(cfg.validate().is_err());
    }
}
