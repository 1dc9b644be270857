use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    PartiallyFilledCanceled,
    Filled,
    Cancelled,
    Rejected,
    Untriggered,
    Triggered,
    Deactivated,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    #[serde(other)]
    Unknown,
}

/// Conditional-order flavour; absent for plain orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopOrderType {
    TakeProfit,
    StopLoss,
    TrailingStop,
    Stop,
    PartialTakeProfit,
    PartialStopLoss,
    #[serde(other)]
    Other,
}

/// One row of a Bybit v5 order-history response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeOrder {
    #[serde(default)]
    pub order_id: String,
    pub symbol: String,
    #[serde(default = "unknown_side")]
    pub side: OrderSide,
    pub order_status: OrderStatus,
    pub order_type: OrderType,
    #[serde(default, deserialize_with = "de_stop_order_type")]
    pub stop_order_type: Option<StopOrderType>,
    #[serde(default)]
    pub reduce_only: bool,
    #[serde(deserialize_with = "de_f64")]
    pub price: f64,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub avg_price: Option<f64>,
    #[serde(default, deserialize_with = "de_f64")]
    pub qty: f64,
    #[serde(default, deserialize_with = "de_i64")]
    pub created_time: i64,
    #[serde(deserialize_with = "de_i64")]
    pub updated_time: i64,
}

impl ExchangeOrder {
    /// Fill price when the venue reports one, otherwise the order price.
    pub fn fill_price(&self) -> f64 {
        self.avg_price.filter(|p| *p > 0.0).unwrap_or(self.price)
    }

    pub fn is_filled(&self) -> bool {
        self.order_status == OrderStatus::Filled
    }
}

fn unknown_side() -> OrderSide {
    OrderSide::Unknown
}

fn number_from(v: &Value) -> Option<Result<f64, String>> {
    match v {
        Value::Null => None,
        Value::Number(n) => n.as_f64().map(Ok),
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.trim().parse::<f64>().map_err(|e| format!("{}: {:?}", e, s))),
        other => Some(Err(format!("expected number or numeric string, got {}", other))),
    }
}

/// Bybit sends most numbers as strings, sometimes empty.
fn de_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    number_from(&v).transpose().map_err(de::Error::custom)
}

fn de_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(de_opt_f64(deserializer)?.unwrap_or(0.0))
}

fn de_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    match &v {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| de::Error::custom(format!("not an integer: {}", n))),
        Value::String(s) if s.trim().is_empty() => Ok(0),
        Value::String(s) => s.trim().parse::<i64>().map_err(de::Error::custom),
        Value::Null => Ok(0),
        other => Err(de::Error::custom(format!("expected timestamp, got {}", other))),
    }
}

fn de_stop_order_type<'de, D>(deserializer: D) -> Result<Option<StopOrderType>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    match opt.as_deref().map(str::trim) {
        None | Some("") | Some("UNKNOWN") => Ok(None),
        Some(s) => serde_json::from_value(Value::String(s.to_string())).map_err(de::Error::custom),
    }
}
