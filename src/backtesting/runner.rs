use tracing::{debug, info, warn};

use crate::config::{BacktestConfig, ConfigError, EntryConfirmationConfig};
use crate::core::entry_confirmation::EntryConfirmationManager;
use crate::core::indicators::build_market_data;
use crate::models::{Candle, CandleSeries, Direction, ExitReason};
use crate::strategies::{AggregatedDecision, StrategyCoordinator, StrategyError};
use crate::trading::{Position, Trade};

use super::report::{BacktestResult, BacktestSummary, RunCounters};

/// Stop and targets for a fresh entry at `entry`.
pub fn entry_levels(
    cfg: &BacktestConfig,
    direction: Direction,
    entry: f64,
    stop_hint: Option<f64>,
) -> (f64, [f64; 3]) {
    let s = direction.sign();
    let default_stop = entry * (1.0 - s * cfg.stop_loss_percent / 100.0);
    let stop = match stop_hint {
        Some(h) if cfg.use_signal_stop_loss && h.is_finite() && (entry - h) * s > 0.0 => h,
        _ => default_stop,
    };
    let tps = cfg
        .take_profit_percents
        .map(|pct| entry * (1.0 + s * pct / 100.0));
    (stop, tps)
}

/// Replays candles through coordinator, confirmation gate and a single
/// position, bar by bar. The replay clock is the candle timestamp, so two
/// runs over the same input produce the same result.
pub struct BacktestEngine {
    config: BacktestConfig,
    coordinator: StrategyCoordinator,
    confirmations: EntryConfirmationManager,

    balance: f64,
    position: Option<Position>,
    pending: Option<String>,
    trades: Vec<Trade>,
    next_id: u64,
    counters: RunCounters,
}

impl BacktestEngine {
    pub fn new(
        config: BacktestConfig,
        confirmation: EntryConfirmationConfig,
        coordinator: StrategyCoordinator,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            balance: config.initial_balance,
            config,
            coordinator,
            confirmations: EntryConfirmationManager::new(confirmation)?,
            position: None,
            pending: None,
            trades: Vec::new(),
            next_id: 1,
            counters: RunCounters::default(),
        })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &StrategyCoordinator {
        &self.coordinator
    }

    fn reset(&mut self) {
        self.balance = self.config.initial_balance;
        self.position = None;
        if let Some(id) = self.pending.take() {
            self.confirmations.cancel(&id);
        }
        self.trades.clear();
        self.next_id = 1;
        self.counters = RunCounters::default();
        self.coordinator.reset();
    }

    pub fn run(&mut self, candles: &[Candle]) -> BacktestResult {
        self.reset();
        let total = candles.len();
        let log_interval = total / 20; // ~20 progress lines

        info!("=== BACKTEST START ===");
        info!(
            "{} {} | {} candles | balance ${:.2}",
            self.config.symbol, self.config.timeframe, total, self.config.initial_balance
        );

        for (i, candle) in candles.iter().enumerate() {
            self.confirmations.sim_time = Some(candle.timestamp);
            self.counters.bars_processed += 1;

            if log_interval > 0 && (i + 1) % log_interval == 0 {
                info!(
                    "  Progress: {:.0}% | {} | Balance: ${:.2} | Trades: {} | Signals: {}",
                    (i + 1) as f64 / total as f64 * 100.0,
                    candle.timestamp.format("%Y-%m-%d %H:%M"),
                    self.balance,
                    self.trades.len(),
                    self.counters.total_signals,
                );
            }

            self.check_exit(candle);
            if self.position.is_some() {
                continue;
            }

            if let Err(e) = self.evaluate_entry(candles, i) {
                warn!("Bar {} ({}): {}", i, candle.timestamp, e);
                self.counters.bar_errors += 1;
            }
        }

        if let Some(last) = candles.last() {
            if let Some(pos) = self.position.take() {
                self.record(pos.close(last.close, last.timestamp, ExitReason::EndOfBacktest, self.config.fee_rate));
            }
        }
        if let Some(id) = self.pending.take() {
            self.confirmations.cancel(&id);
        }

        let summary = BacktestSummary::from_trades(
            &self.trades,
            self.config.initial_balance,
            candles.first().map(|c| c.timestamp),
            candles.last().map(|c| c.timestamp),
            self.counters,
        );
        info!(
            "=== BACKTEST COMPLETE === {} trades | PnL ${:+.2} | {} bar errors",
            summary.total_trades, summary.total_pnl, summary.bar_errors
        );

        BacktestResult {
            summary,
            trades: self.trades.clone(),
            config: self.config.clone(),
        }
    }

    fn check_exit(&mut self, candle: &Candle) {
        let Some(pos) = self.position.as_mut() else {
            return;
        };
        if let Some((price, reason)) = pos.check_exit(candle) {
            if let Some(pos) = self.position.take() {
                self.record(pos.close(price, candle.timestamp, reason, self.config.fee_rate));
            }
        }
    }

    fn record(&mut self, trade: Trade) {
        self.balance += trade.pnl;
        debug!(
            "Closed #{} {} {:.2} -> {:.2} ({}) pnl ${:+.2}",
            trade.id, trade.side, trade.entry_price, trade.exit_price, trade.exit_reason, trade.pnl
        );
        self.trades.push(trade);
    }

    fn evaluate_entry(&mut self, candles: &[Candle], i: usize) -> Result<(), StrategyError> {
        let candle = &candles[i];

        if let Some(id) = self.pending.take() {
            let res = self.confirmations.check_confirmation(&id, candle.close);
            match (res.confirmed(), res.entry) {
                (true, Some(entry)) => {
                    return self.open(entry.direction, &entry.signal_data, candle);
                }
                _ => self.counters.signals_filtered += 1,
            }
        }

        if i + 1 < self.config.warmup_candles {
            return Ok(());
        }

        let start = (i + 1).saturating_sub(self.config.lookback_candles);
        let window = CandleSeries::new(candles[start..=i].to_vec());
        let data = build_market_data(&self.config.symbol, window, None)?;

        let Some(decision) = self.coordinator.evaluate_strategies(&data, true) else {
            return Ok(());
        };
        self.counters.total_signals += 1;

        let Some(direction) = decision.direction().and_then(|d| d.to_direction()) else {
            return Ok(());
        };
        if decision.confidence() < self.config.min_confidence {
            debug!(
                "Filtered {} @ {:.1} < {:.1}",
                direction,
                decision.confidence(),
                self.config.min_confidence
            );
            self.counters.signals_filtered += 1;
            return Ok(());
        }

        if self.confirmations.config().enabled {
            let key = decision.key_level.unwrap_or(candle.close);
            let id = self
                .confirmations
                .add_pending(&self.config.symbol, direction, key, decision);
            self.pending = Some(id);
            Ok(())
        } else {
            self.open(direction, &decision, candle)
        }
    }

    fn open(
        &mut self,
        direction: Direction,
        decision: &AggregatedDecision,
        candle: &Candle,
    ) -> Result<(), StrategyError> {
        let entry = candle.close;
        if !entry.is_finite() || entry <= 0.0 {
            return Err(StrategyError::Failed(format!("bad entry price {}", entry)));
        }
        let (stop, tps) = entry_levels(&self.config, direction, entry, decision.stop_loss);
        let quantity = self.config.position_size_usd / entry;

        let pos = Position::new(
            self.next_id,
            &self.config.symbol,
            direction,
            entry,
            candle.timestamp,
            quantity,
            stop,
            &tps,
        );
        self.next_id += 1;
        debug!(
            "Open #{} {} @ {:.2} SL {:.2} TP {:.2}/{:.2}/{:.2} ({})",
            pos.id, direction, entry, stop, tps[0], tps[1], tps[2], decision.strategy_name
        );
        self.position = Some(pos);
        Ok(())
    }
}
