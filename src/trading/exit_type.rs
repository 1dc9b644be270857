use serde::{Deserialize, Serialize};
use std::fmt;

use crate::exchange::order::{ExchangeOrder, OrderType, StopOrderType};
use crate::trading::position::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitType {
    StopLoss,
    TrailingStop,
    #[serde(rename = "TAKE_PROFIT_1")]
    TakeProfit1,
    #[serde(rename = "TAKE_PROFIT_2")]
    TakeProfit2,
    #[serde(rename = "TAKE_PROFIT_3")]
    TakeProfit3,
    Manual,
}

impl ExitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitType::StopLoss => "STOP_LOSS",
            ExitType::TrailingStop => "TRAILING_STOP",
            ExitType::TakeProfit1 => "TAKE_PROFIT_1",
            ExitType::TakeProfit2 => "TAKE_PROFIT_2",
            ExitType::TakeProfit3 => "TAKE_PROFIT_3",
            ExitType::Manual => "MANUAL",
        }
    }

    fn take_profit(level: usize) -> Self {
        match level {
            2 => ExitType::TakeProfit2,
            3 => ExitType::TakeProfit3,
            _ => ExitType::TakeProfit1,
        }
    }
}

impl fmt::Display for ExitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 1-based index of the TP closest to `price`; ties go to the earlier
/// target, and a position without targets reports 1.
pub fn identify_tp_level(price: f64, position: &Position) -> usize {
    position
        .take_profits
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, t)| {
            let d = (price - t.price).abs();
            match best {
                Some((_, bd)) if bd <= d => best,
                _ => Some((i, d)),
            }
        })
        .map_or(1, |(i, _)| i + 1)
}

/// Classifies how a position left the book from the most recent filled order
/// on its symbol. Anything unrecognised is `Manual`.
pub fn determine_exit_type_from_history(orders: &[ExchangeOrder], position: &Position) -> ExitType {
    let latest = orders
        .iter()
        .filter(|o| o.symbol == position.symbol && o.is_filled())
        .max_by_key(|o| o.updated_time);
    let Some(order) = latest else {
        return ExitType::Manual;
    };

    match order.stop_order_type {
        Some(StopOrderType::Stop | StopOrderType::StopLoss | StopOrderType::PartialStopLoss) => {
            ExitType::StopLoss
        }
        Some(StopOrderType::TrailingStop) => ExitType::TrailingStop,
        Some(StopOrderType::TakeProfit | StopOrderType::PartialTakeProfit) => {
            ExitType::take_profit(identify_tp_level(order.fill_price(), position))
        }
        _ if order.order_type == OrderType::Limit && order.reduce_only => {
            ExitType::take_profit(identify_tp_level(order.fill_price(), position))
        }
        _ => ExitType::Manual,
    }
}
