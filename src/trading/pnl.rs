use serde::{Deserialize, Serialize};

use crate::models::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PnlBreakdown {
    pub pnl_gross: f64,
    pub fees: f64,
    pub pnl_net: f64,
    pub pnl_percent: f64,
}

/// One reduce fill of a position closed in pieces.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartialFill {
    pub price: f64,
    pub quantity: f64,
}

/// Taker fees charged on both legs.
pub fn calculate(side: Direction, entry: f64, exit: f64, quantity: f64, fee_rate: f64) -> PnlBreakdown {
    let s = side.sign();
    let pnl_gross = (exit - entry) * quantity * s;
    let fees = (entry * quantity + exit * quantity) * fee_rate;
    let pnl_percent = if entry != 0.0 {
        (exit - entry) / entry * 100.0 * s
    } else {
        0.0
    };
    PnlBreakdown {
        pnl_gross,
        fees,
        pnl_net: pnl_gross - fees,
        pnl_percent,
    }
}

/// Sums the fills; the percent figure uses the volume-weighted exit price.
pub fn calculate_partial_closes(
    side: Direction,
    entry: f64,
    fills: &[PartialFill],
    fee_rate: f64,
) -> PnlBreakdown {
    let total_qty: f64 = fills.iter().map(|f| f.quantity).sum();
    let (pnl_gross, fees) = fills.iter().fold((0.0, 0.0), |(g, fe), f| {
        let leg = calculate(side, entry, f.price, f.quantity, fee_rate);
        (g + leg.pnl_gross, fe + leg.fees)
    });

    let pnl_percent = if total_qty > 0.0 && entry != 0.0 {
        let vwap = fills.iter().map(|f| f.price * f.quantity).sum::<f64>() / total_qty;
        (vwap - entry) / entry * 100.0 * side.sign()
    } else {
        0.0
    };

    PnlBreakdown {
        pnl_gross,
        fees,
        pnl_net: pnl_gross - fees,
        pnl_percent,
    }
}

/// Exit price at which net PnL is zero.
pub fn calculate_breakeven(side: Direction, entry: f64, fee_rate: f64) -> Option<f64> {
    if !(0.0..1.0).contains(&fee_rate) {
        return None;
    }
    Some(match side {
        Direction::Long => entry * (1.0 + fee_rate) / (1.0 - fee_rate),
        Direction::Short => entry * (1.0 - fee_rate) / (1.0 + fee_rate),
    })
}
