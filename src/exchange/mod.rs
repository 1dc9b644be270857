pub mod historical;
pub mod order;

pub use historical::HistoricalExchange;
pub use order::{ExchangeOrder, OrderSide, OrderStatus, OrderType, StopOrderType};

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Candle, CandleSeries, Direction, ExitReason};

/// A closed entry-timeframe candle plus whatever finer data the feed has.
#[derive(Debug, Clone)]
pub struct CandleEvent {
    pub candle: Candle,
    pub candles_1m: Option<CandleSeries>,
}

/// Reduce-only close of the open position.
#[derive(Debug, Clone)]
pub struct CloseRequest {
    pub symbol: String,
    /// Side of the position being closed.
    pub side: Direction,
    pub quantity: f64,
    pub price: f64,
    pub reason: ExitReason,
}

#[async_trait]
pub trait Exchange: Send + Sync {
    /// Next candle-close event; `None` once the feed is exhausted.
    async fn next_closed_candle(&mut self) -> Result<Option<CandleEvent>>;
    async fn close_position(&mut self, req: &CloseRequest) -> Result<ExchangeOrder>;
    /// Newest orders for `symbol`, at most `limit`.
    async fn fetch_order_history(&mut self, symbol: &str, limit: usize) -> Result<Vec<ExchangeOrder>>;
}
