use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::BacktestConfig;
use crate::trading::Trade;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityPoint {
    pub time: DateTime<Utc>,
    pub balance: f64,
}

/// Counters the engine keeps while replaying.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RunCounters {
    pub total_signals: usize,
    pub signals_filtered: usize,
    pub bars_processed: usize,
    pub bar_errors: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,

    pub initial_balance: f64,
    pub final_balance: f64,
    pub total_pnl: f64,
    pub total_return_pct: f64,
    pub total_fees: f64,

    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub avg_win: f64,
    /// Magnitude.
    pub avg_loss: f64,
    /// Gross win over gross loss. `None` when there are wins and no losses.
    pub profit_factor: Option<f64>,
    pub best_trade: f64,
    pub worst_trade: f64,

    /// Percent, from the running peak of post-trade balances.
    pub max_drawdown: f64,

    pub total_signals: usize,
    pub signals_filtered: usize,
    pub bars_processed: usize,
    pub bar_errors: usize,

    pub equity_curve: Vec<EquityPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub summary: BacktestSummary,
    pub trades: Vec<Trade>,
    pub config: BacktestConfig,
}

/// Largest peak-to-trough fall, in percent of the peak.
pub fn max_drawdown_percent(initial_balance: f64, balances: impl IntoIterator<Item = f64>) -> f64 {
    let mut peak = initial_balance;
    let mut worst = 0.0f64;
    for b in balances {
        peak = peak.max(b);
        if peak > 0.0 {
            worst = worst.max((peak - b) / peak * 100.0);
        }
    }
    worst
}

impl BacktestSummary {
    pub fn from_trades(
        trades: &[Trade],
        initial_balance: f64,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        counters: RunCounters,
    ) -> Self {
        let total_pnl: f64 = trades.iter().map(|t| t.pnl).sum();
        let final_balance = initial_balance + total_pnl;
        let total_trades = trades.len();

        let wins: Vec<f64> = trades.iter().filter(|t| t.is_win()).map(|t| t.pnl).collect();
        let losses: Vec<f64> = trades.iter().filter(|t| !t.is_win()).map(|t| t.pnl).collect();

        let win_sum: f64 = wins.iter().sum();
        let loss_sum: f64 = losses.iter().sum::<f64>().abs();

        let avg_win = if !wins.is_empty() {
            win_sum / wins.len() as f64
        } else {
            0.0
        };
        let avg_loss = if !losses.is_empty() {
            loss_sum / losses.len() as f64
        } else {
            0.0
        };

        let profit_factor = if loss_sum > 0.0 {
            Some(win_sum / loss_sum)
        } else if !wins.is_empty() {
            None
        } else {
            Some(0.0)
        };

        let mut balance = initial_balance;
        let mut equity_curve = Vec::with_capacity(total_trades + 1);
        if let Some(s) = start {
            equity_curve.push(EquityPoint {
                time: s,
                balance,
            });
        }
        for t in trades {
            balance += t.pnl;
            equity_curve.push(EquityPoint {
                time: t.exit_time,
                balance,
            });
        }
        let max_drawdown = max_drawdown_percent(
            initial_balance,
            trades.iter().scan(initial_balance, |b, t| {
                *b += t.pnl;
                Some(*b)
            }),
        );

        BacktestSummary {
            start,
            end,
            initial_balance,
            final_balance,
            total_pnl,
            total_return_pct: if initial_balance > 0.0 {
                total_pnl / initial_balance * 100.0
            } else {
                0.0
            },
            total_fees: trades.iter().map(|t| t.fees).sum(),
            total_trades,
            winning_trades: wins.len(),
            losing_trades: losses.len(),
            win_rate: if total_trades > 0 {
                wins.len() as f64 / total_trades as f64 * 100.0
            } else {
                0.0
            },
            avg_win,
            avg_loss,
            profit_factor,
            best_trade: trades.iter().map(|t| t.pnl).reduce(f64::max).unwrap_or(0.0),
            worst_trade: trades.iter().map(|t| t.pnl).reduce(f64::min).unwrap_or(0.0),
            max_drawdown,
            total_signals: counters.total_signals,
            signals_filtered: counters.signals_filtered,
            bars_processed: counters.bars_processed,
            bar_errors: counters.bar_errors,
            equity_curve,
        }
    }

    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(70));
        println!("  BACKTEST REPORT");
        println!("{}", "=".repeat(70));
        if let (Some(s), Some(e)) = (self.start, self.end) {
            println!(
                "  Period:      {} to {}",
                s.format("%Y-%m-%d %H:%M"),
                e.format("%Y-%m-%d %H:%M")
            );
        }
        println!("  Bars:        {} ({} errors)", self.bars_processed, self.bar_errors);
        println!();
        println!("  PERFORMANCE");
        println!("  ───────────────────────────────────");
        println!("  Initial:     ${:.2}", self.initial_balance);
        println!("  Final:       ${:.2}", self.final_balance);
        println!("  PnL:         ${:+.2}", self.total_pnl);
        println!("  Return:      {:+.1}%", self.total_return_pct);
        println!("  Fees:        ${:.2}", self.total_fees);
        println!();
        println!("  TRADES");
        println!("  ───────────────────────────────────");
        println!("  Total:       {}", self.total_trades);
        println!(
            "  Win/Loss:    {} / {}",
            self.winning_trades, self.losing_trades
        );
        println!("  Win Rate:    {:.1}%", self.win_rate);
        println!("  Avg Win:     ${:+.2}", self.avg_win);
        println!("  Avg Loss:    ${:.2}", self.avg_loss);
        println!("  Best:        ${:+.2}", self.best_trade);
        println!("  Worst:       ${:+.2}", self.worst_trade);
        match self.profit_factor {
            Some(pf) => println!("  Profit Factor: {:.2}", pf),
            None => println!("  Profit Factor: n/a (no losses)"),
        }
        println!();
        println!("  RISK");
        println!("  ───────────────────────────────────");
        println!("  Max DD:      {:.2}%", self.max_drawdown);
        println!();
        println!("  SIGNALS");
        println!("  ───────────────────────────────────");
        println!("  Generated:   {}", self.total_signals);
        println!("  Filtered:    {}", self.signals_filtered);
        println!(
            "  Conversion:  {:.1}%",
            if self.total_signals > 0 {
                self.total_trades as f64 / self.total_signals as f64 * 100.0
            } else {
                0.0
            }
        );
        println!("{}", "=".repeat(70));
    }
}
