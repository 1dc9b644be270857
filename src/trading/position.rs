use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Candle, Direction, ExitReason};
use crate::trading::pnl;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TakeProfitTarget {
    pub price: f64,
    pub hit: bool,
}

/// The single open position for a symbol. Closing consumes it into a [`Trade`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: u64,
    pub symbol: String,
    pub side: Direction,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub quantity: f64,
    pub stop_loss: f64,
    /// TP1 first.
    pub take_profits: Vec<TakeProfitTarget>,
}

impl Position {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u64,
        symbol: &str,
        side: Direction,
        entry_price: f64,
        entry_time: DateTime<Utc>,
        quantity: f64,
        stop_loss: f64,
        take_profits: &[f64],
    ) -> Self {
        Self {
            id,
            symbol: symbol.to_string(),
            side,
            entry_price,
            entry_time,
            quantity,
            stop_loss,
            take_profits: take_profits
                .iter()
                .map(|&price| TakeProfitTarget { price, hit: false })
                .collect(),
        }
    }

    /// Whether TP`n` (1-based) has been reached.
    pub fn tp_hit(&self, n: usize) -> bool {
        n >= 1 && self.take_profits.get(n - 1).is_some_and(|t| t.hit)
    }

    pub fn tp_prices(&self) -> Vec<f64> {
        self.take_profits.iter().map(|t| t.price).collect()
    }

    /// Walks one bar's range. Stop first; the final target closes, earlier ones are only marked.
    pub fn check_exit(&mut self, candle: &Candle) -> Option<(f64, ExitReason)> {
        let stopped = match self.side {
            Direction::Long => candle.low <= self.stop_loss,
            Direction::Short => candle.high >= self.stop_loss,
        };
        if stopped {
            return Some((self.stop_loss, ExitReason::StopLoss));
        }

        let side = self.side;
        for t in self.take_profits.iter_mut().filter(|t| !t.hit) {
            t.hit = match side {
                Direction::Long => candle.high >= t.price,
                Direction::Short => candle.low <= t.price,
            };
        }

        match self.take_profits.last() {
            Some(last) if last.hit => Some((last.price, ExitReason::TakeProfit)),
            _ => None,
        }
    }

    pub fn close(
        self,
        exit_price: f64,
        exit_time: DateTime<Utc>,
        reason: ExitReason,
        fee_rate: f64,
    ) -> Trade {
        let r = pnl::calculate(self.side, self.entry_price, exit_price, self.quantity, fee_rate);
        Trade {
            tp1_hit: self.tp_hit(1),
            tp2_hit: self.tp_hit(2),
            id: self.id,
            symbol: self.symbol,
            side: self.side,
            entry_price: self.entry_price,
            exit_price,
            quantity: self.quantity,
            entry_time: self.entry_time,
            exit_time,
            pnl: r.pnl_net,
            pnl_percent: r.pnl_percent,
            fees: r.fees,
            exit_reason: reason,
        }
    }
}

/// A closed position. `pnl` is net of fees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: u64,
    pub symbol: String,
    pub side: Direction,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub pnl: f64,
    pub pnl_percent: f64,
    pub fees: f64,
    pub exit_reason: ExitReason,
    pub tp1_hit: bool,
    pub tp2_hit: bool,
}

impl Trade {
    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }
}
