use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use futures_signal_bot::backtesting::runner::entry_levels;
use futures_signal_bot::config::Config;
use futures_signal_bot::core::entry_confirmation::EntryConfirmationManager;
use futures_signal_bot::core::indicators::build_market_data;
use futures_signal_bot::exchange::{CandleEvent, CloseRequest, Exchange};
use futures_signal_bot::models::{Candle, CandleSeries, Direction, ExitReason};
use futures_signal_bot::strategies::{build_default_coordinator, AggregatedDecision, StrategyCoordinator};
use futures_signal_bot::trading::{determine_exit_type_from_history, pnl, ExitType, Position, Trade};

const ORDER_HISTORY_LIMIT: usize = 50;

/// A booked close together with how the venue says it happened.
#[derive(Debug, Clone)]
pub struct ClosedTrade {
    pub trade: Trade,
    pub exit_type: ExitType,
}

pub struct SignalBot {
    config: Config,
    market: Box<dyn Exchange>,
    coordinator: StrategyCoordinator,
    confirmations: EntryConfirmationManager,

    history: CandleSeries,
    position: Option<Position>,
    pending: Option<String>,
    closed: Vec<ClosedTrade>,
    balance: f64,
    next_id: u64,
    last_candle: Option<Candle>,
}

impl SignalBot {
    pub fn new(config: Config, market: Box<dyn Exchange>) -> Result<Self> {
        let coordinator = build_default_coordinator(&config).context("building strategy set")?;
        Self::with_coordinator(config, market, coordinator)
    }

    pub fn with_coordinator(
        config: Config,
        market: Box<dyn Exchange>,
        coordinator: StrategyCoordinator,
    ) -> Result<Self> {
        let confirmations = EntryConfirmationManager::new(config.entry_confirmation.clone())
            .context("entry confirmation config")?;

        info!("{}", "=".repeat(60));
        info!("Futures signal bot starting up");
        info!("Symbol: {} | Timeframe: {}", config.symbol, config.timeframe);
        info!("Strategies: {}", coordinator.strategy_names().join(", "));
        info!(
            "Entry confirmation: {}",
            if confirmations.config().enabled {
                "ON"
            } else {
                "OFF"
            }
        );
        info!("{}", "=".repeat(60));

        Ok(Self {
            balance: config.backtest.initial_balance,
            config,
            market,
            coordinator,
            confirmations,
            history: CandleSeries::default(),
            position: None,
            pending: None,
            closed: Vec::new(),
            next_id: 1,
            last_candle: None,
        })
    }

    pub fn closed_trades(&self) -> &[ClosedTrade] {
        &self.closed
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    /// Runs until the feed ends or ctrl-c.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    self.shutdown().await;
                    return Ok(());
                }
                event = self.market.next_closed_candle() => {
                    match event {
                        Ok(Some(ev)) => self.on_candle(ev).await,
                        Ok(None) => {
                            info!("Candle feed ended");
                            self.shutdown().await;
                            return Ok(());
                        }
                        Err(e) => {
                            error!("Candle feed error: {:#}", e);
                            self.shutdown().await;
                            return Err(e.context("candle feed"));
                        }
                    }
                }
            }
        }
    }

    async fn on_candle(&mut self, ev: CandleEvent) {
        let candle = ev.candle;
        self.history.push(candle.clone());
        self.history.truncate_front(self.config.backtest.lookback_candles);
        self.last_candle = Some(candle.clone());

        if let Some(pos) = self.position.as_mut() {
            if let Some((price, reason)) = pos.check_exit(&candle) {
                if let Err(e) = self.close_position(price, candle.timestamp, reason).await {
                    error!("Close failed: {:#}", e);
                }
            }
            if self.position.is_some() {
                return;
            }
        }

        if let Some(id) = self.pending.take() {
            let res = self.confirmations.check_confirmation(&id, candle.close);
            info!("Confirmation {}: {} ({})", id, res.outcome, res.reason);
            if let (true, Some(entry)) = (res.confirmed(), res.entry) {
                self.open(entry.direction, &entry.signal_data, &candle);
                return;
            }
        }

        let expired = self.confirmations.cleanup_expired();
        if expired > 0 {
            debug!("Dropped {} expired pending entries", expired);
        }

        if self.history.len() < self.config.backtest.warmup_candles {
            debug!(
                "Warming up: {}/{}",
                self.history.len(),
                self.config.backtest.warmup_candles
            );
            return;
        }

        let data = match build_market_data(&self.config.symbol, self.history.clone(), ev.candles_1m) {
            Ok(d) => d,
            Err(e) => {
                warn!("Skipping {}: {}", candle.timestamp, e);
                return;
            }
        };

        let Some(decision) = self.coordinator.evaluate_strategies(&data, false) else {
            for f in self.coordinator.last_failures() {
                debug!("{} failed: {}", f.strategy, f.error);
            }
            return;
        };
        let Some(direction) = decision.direction().and_then(|d| d.to_direction()) else {
            return;
        };

        if decision.confidence() < self.config.backtest.min_confidence {
            debug!(
                "Signal {} @ {:.1} below min confidence {:.1}",
                direction,
                decision.confidence(),
                self.config.backtest.min_confidence
            );
            return;
        }

        info!(
            "Signal: {} {} ({:.1}%, {} supporting) - {}",
            direction,
            decision.strategy_name,
            decision.confidence(),
            decision.supporting_signals,
            decision.reason
        );

        if self.confirmations.config().enabled {
            let key = decision.key_level.unwrap_or(candle.close);
            let id = self
                .confirmations
                .add_pending(&self.config.symbol, direction, key, decision);
            info!("Awaiting confirmation for {} at key level {:.2}", id, key);
            self.pending = Some(id);
        } else {
            self.open(direction, &decision, &candle);
        }
    }

    fn open(&mut self, direction: Direction, decision: &AggregatedDecision, candle: &Candle) {
        let bt = &self.config.backtest;
        let entry = candle.close;
        if !entry.is_finite() || entry <= 0.0 {
            warn!("Refusing entry at {}", entry);
            return;
        }
        let (stop, tps) = entry_levels(bt, direction, entry, decision.stop_loss);
        let quantity = bt.position_size_usd / entry;

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

        let breakeven = pnl::calculate_breakeven(direction, entry, bt.fee_rate)
            .map_or_else(|| "n/a".to_string(), |p| format!("{:.2}", p));
        info!(
            "OPEN #{} {} {} @ {:.2} | qty {:.6} | SL {:.2} | TP {:.2}/{:.2}/{:.2} | BE {}",
            pos.id, direction, pos.symbol, entry, quantity, stop, tps[0], tps[1], tps[2], breakeven
        );
        self.position = Some(pos);
    }

    async fn close_position(
        &mut self,
        price: f64,
        time: chrono::DateTime<chrono::Utc>,
        reason: ExitReason,
    ) -> Result<()> {
        let Some(pos) = self.position.take() else {
            return Ok(());
        };
        let req = CloseRequest {
            symbol: pos.symbol.clone(),
            side: pos.side,
            quantity: pos.quantity,
            price,
            reason,
        };

        let fill = match self.market.close_position(&req).await {
            Ok(o) => o,
            Err(e) => {
                self.position = Some(pos);
                return Err(e.context("submitting close"));
            }
        };
        let fill_price = fill.fill_price();

        let exit_type = match self
            .market
            .fetch_order_history(&pos.symbol, ORDER_HISTORY_LIMIT)
            .await
        {
            Ok(orders) => determine_exit_type_from_history(&orders, &pos),
            Err(e) => {
                warn!("Order history unavailable: {:#}", e);
                ExitType::Manual
            }
        };

        let fee_rate = self.config.backtest.fee_rate;
        let breakdown = pnl::calculate(pos.side, pos.entry_price, fill_price, pos.quantity, fee_rate);
        let trade = pos.close(fill_price, time, reason, fee_rate);
        self.balance += trade.pnl;

        info!(
            "CLOSE #{} {} @ {:.2} [{}] | gross ${:+.4} fees ${:.4} net ${:+.4} ({:+.2}%) | balance ${:.2}",
            trade.id,
            trade.side,
            fill_price,
            exit_type,
            breakdown.pnl_gross,
            breakdown.fees,
            breakdown.pnl_net,
            breakdown.pnl_percent,
            self.balance
        );
        self.closed.push(ClosedTrade { trade, exit_type });
        Ok(())
    }

    async fn shutdown(&mut self) {
        info!("Shutting down...");
        if let Some(id) = self.pending.take() {
            self.confirmations.cancel(&id);
        }
        if self.position.is_some() {
            match self.last_candle.clone() {
                Some(last) => {
                    if let Err(e) = self.close_position(last.close, last.timestamp, ExitReason::Manual).await {
                        error!("Could not flatten on shutdown: {:#}", e);
                    }
                }
                None => warn!("Open position but no price to close at"),
            }
        }
        self.print_status();
        info!("Bot stopped.");
    }

    fn print_status(&self) {
        let total = self.closed.len();
        let wins = self.closed.iter().filter(|c| c.trade.is_win()).count();
        let pnl: f64 = self.closed.iter().map(|c| c.trade.pnl).sum();
        info!("Balance: ${:.2}", self.balance);
        info!(
            "Trades: {} | Win Rate: {:.1}%",
            total,
            if total > 0 {
                wins as f64 / total as f64 * 100.0
            } else {
                0.0
            }
        );
        info!("PnL: ${:+.2}", pnl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use futures_signal_bot::config::CoordinatorConfig;
    use futures_signal_bot::exchange::HistoricalExchange;
    use futures_signal_bot::models::{SignalDirection, Timeframe};
    use futures_signal_bot::strategies::{Signal, Strategy, StrategyError, StrategyMarketData};

    struct Always(SignalDirection);

    impl Strategy for Always {
        fn name(&self) -> &str {
            "Always"
        }
        fn priority(&self) -> u8 {
            1
        }
        fn evaluate(&mut self, _: &StrategyMarketData) -> Result<Option<Signal>, StrategyError> {
            Ok(Some(Signal::new("Always", self.0, 80.0, 1.0, 1)?))
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()
    }

    fn bar(i: i64, close: f64) -> Candle {
        Candle {
            timestamp: t0() + Duration::minutes(5 * i),
            open: close,
            high: close * 1.001,
            low: close * 0.999,
            volume: 100.0,
            close,
        }
    }

    fn bot(closes: &[f64], confirm: bool) -> SignalBot {
        let mut cfg = Config::from_env();
        cfg.symbol = "BTCUSDT".into();
        cfg.backtest.symbol = "BTCUSDT".into();
        cfg.backtest.warmup_candles = 1;
        cfg.backtest.fee_rate = 0.0;
        cfg.backtest.min_confidence = 60.0;
        cfg.entry_confirmation.enabled = confirm;

        let candles = closes.iter().enumerate().map(|(i, &c)| bar(i as i64, c)).collect();
        let market = HistoricalExchange::new("BTCUSDT", Timeframe::M5, candles);

        let mut coord_cfg = CoordinatorConfig::default();
        coord_cfg.blind_zone_min_signals = 1;
        let mut coordinator = StrategyCoordinator::new(coord_cfg).unwrap();
        coordinator.register_strategy(Box::new(Always(SignalDirection::Long)));
        SignalBot::with_coordinator(cfg, Box::new(market), coordinator).unwrap()
    }

    #[tokio::test]
    async fn stop_out_is_classified_from_order_history() {
        let mut b = bot(&[100.0, 98.0], false);
        b.run().await.unwrap();
        let c = &b.closed_trades()[0];
        assert_eq!(c.trade.exit_reason, ExitReason::StopLoss);
        assert_eq!(c.exit_type, ExitType::StopLoss);
        assert!((c.trade.exit_price - 99.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn final_target_fill_maps_to_take_profit_three() {
        let mut b = bot(&[100.0, 103.5], false);
        b.run().await.unwrap();
        let c = &b.closed_trades()[0];
        assert_eq!(c.trade.exit_reason, ExitReason::TakeProfit);
        assert_eq!(c.exit_type, ExitType::TakeProfit3);
    }

    #[tokio::test]
    async fn shutdown_flattens_open_position() {
        let mut b = bot(&[100.0, 100.2, 100.1], false);
        b.run().await.unwrap();
        assert!(b.position.is_none());
        let last = b.closed_trades().last().unwrap();
        assert_eq!(last.trade.exit_reason, ExitReason::Manual);
        assert!(last.trade.exit_time >= last.trade.entry_time);
        let sum: f64 = b.closed_trades().iter().map(|c| c.trade.pnl).sum();
        assert!((b.balance() - b.config.backtest.initial_balance - sum).abs() < 1e-9);
    }

    #[tokio::test]
    async fn confirmation_defers_entry_to_next_close() {
        let mut b = bot(&[100.0, 100.3, 100.4], true);
        b.run().await.unwrap();
        let t = &b.closed_trades()[0].trade;
        assert_eq!(t.entry_time, bar(1, 0.0).timestamp);
    }

    #[tokio::test]
    async fn re_enters_on_the_bar_that_closed_the_trade() {
        let mut b = bot(&[100.0, 98.0], false);
        b.run().await.unwrap();
        let closed = b.closed_trades();
        assert_eq!(closed.len(), 2);
        assert_eq!(closed[0].trade.exit_reason, ExitReason::StopLoss);
        assert_eq!(closed[1].trade.entry_time, bar(1, 0.0).timestamp);
        assert!((closed[1].trade.entry_price - 98.0).abs() < 1e-9);
        assert_eq!(closed[1].trade.exit_reason, ExitReason::Manual);
    }
}
