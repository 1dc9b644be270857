use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::exchange::order::{ExchangeOrder, OrderSide, OrderStatus, OrderType, StopOrderType};
use crate::exchange::{CandleEvent, CloseRequest, Exchange};
use crate::models::{Candle, CandleSeries, Direction, ExitReason, Timeframe};

const FINE_CANDLE_LIMIT: usize = 60;

/// Paper exchange that replays pre-loaded candles as close events.
/// The clock (`now`) sits at the close time of the last emitted candle;
/// only one-minute candles that closed by then are visible. Closes are
/// recorded as filled reduce-only orders so order-history consumers see
/// the same shape a venue would return.
pub struct HistoricalExchange {
    symbol: String,
    timeframe: Timeframe,
    candles: Vec<Candle>,
    candles_1m: Vec<Candle>,
    cursor: usize,
    now: DateTime<Utc>,
    orders: Vec<ExchangeOrder>,
}

impl HistoricalExchange {
    /// Candles must be sorted oldest-first.
    pub fn new(symbol: &str, timeframe: Timeframe, candles: Vec<Candle>) -> Self {
        let now = candles.first().map_or_else(Utc::now, |c| c.timestamp);
        Self {
            symbol: symbol.to_string(),
            timeframe,
            candles,
            candles_1m: Vec::new(),
            cursor: 0,
            now,
            orders: Vec::new(),
        }
    }

    pub fn with_one_minute(mut self, candles_1m: Vec<Candle>) -> Self {
        self.candles_1m = candles_1m;
        self
    }

    pub fn current_time(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn remaining(&self) -> usize {
        self.candles.len() - self.cursor
    }

    pub fn orders(&self) -> &[ExchangeOrder] {
        &self.orders
    }

    /// One-minute candles closed by `now`, capped at `limit`.
    fn visible_fine(&self, limit: usize) -> CandleSeries {
        let minute = Duration::minutes(1);
        let end = self
            .candles_1m
            .partition_point(|c| c.timestamp + minute <= self.now);
        let start = end.saturating_sub(limit);
        CandleSeries::new(self.candles_1m[start..end].to_vec())
    }
}

#[async_trait]
impl Exchange for HistoricalExchange {
    async fn next_closed_candle(&mut self) -> Result<Option<CandleEvent>> {
        let Some(candle) = self.candles.get(self.cursor).cloned() else {
            return Ok(None);
        };
        self.cursor += 1;
        self.now = candle.timestamp + Duration::seconds(self.timeframe.as_seconds());

        let candles_1m = if self.candles_1m.is_empty() {
            None
        } else {
            Some(self.visible_fine(FINE_CANDLE_LIMIT))
        };
        Ok(Some(CandleEvent { candle, candles_1m }))
    }

    async fn close_position(&mut self, req: &CloseRequest) -> Result<ExchangeOrder> {
        if req.symbol != self.symbol {
            bail!("paper exchange trades {} only, got {}", self.symbol, req.symbol);
        }
        if !req.quantity.is_finite() || req.quantity <= 0.0 || !req.price.is_finite() || req.price <= 0.0 {
            bail!("invalid close: qty {} @ {}", req.quantity, req.price);
        }

        let (order_type, stop_order_type) = match req.reason {
            ExitReason::StopLoss => (OrderType::Market, Some(StopOrderType::StopLoss)),
            ExitReason::TakeProfit => (OrderType::Limit, None),
            ExitReason::EndOfBacktest | ExitReason::Manual => (OrderType::Market, None),
        };
        let seq = self.orders.len() as i64;
        let ts = self.now.timestamp_millis() + seq;

        let order = ExchangeOrder {
            order_id: format!("paper-{}", seq + 1),
            symbol: req.symbol.clone(),
            side: match req.side {
                Direction::Long => OrderSide::Sell,
                Direction::Short => OrderSide::Buy,
            },
            order_status: OrderStatus::Filled,
            order_type,
            stop_order_type,
            reduce_only: true,
            price: req.price,
            avg_price: Some(req.price),
            qty: req.quantity,
            created_time: ts,
            updated_time: ts,
        };
        debug!(
            "Paper fill {} {:?} {} @ {:.2}",
            order.order_id, order.side, order.qty, order.price
        );
        self.orders.push(order.clone());
        Ok(order)
    }

    async fn fetch_order_history(&mut self, symbol: &str, limit: usize) -> Result<Vec<ExchangeOrder>> {
        Ok(self
            .orders
            .iter()
            .rev()
            .filter(|o| o.symbol == symbol)
            .take(limit)
            .cloned()
            .collect())
    }
}
