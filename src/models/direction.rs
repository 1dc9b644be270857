use serde::{Deserialize, Serialize};
use std::fmt;

/// Side of a position or pending entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }

    /// +1 for long, -1 for short.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

/// Opinion carried by a strategy signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalDirection {
    Long,
    Short,
    Hold,
}

impl fmt::Display for SignalDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalDirection::Long => write!(f, "LONG"),
            SignalDirection::Short => write!(f, "SHORT"),
            SignalDirection::Hold => write!(f, "HOLD"),
        }
    }
}

impl SignalDirection {
    pub fn to_direction(self) -> Option<Direction> {
        match self {
            SignalDirection::Long => Some(Direction::Long),
            SignalDirection::Short => Some(Direction::Short),
            SignalDirection::Hold => None,
        }
    }
}

impl From<Direction> for SignalDirection {
    fn from(d: Direction) -> Self {
        match d {
            Direction::Long => SignalDirection::Long,
            Direction::Short => SignalDirection::Short,
        }
    }
}

/// Why a position left the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    EndOfBacktest,
    Manual,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "stop-loss"),
            ExitReason::TakeProfit => write!(f, "take-profit"),
            ExitReason::EndOfBacktest => write!(f, "end-of-backtest"),
            ExitReason::Manual => write!(f, "manual"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hold_has_no_trade_direction() {
        assert_eq!(SignalDirection::Hold.to_direction(), None);
        assert_eq!(
            SignalDirection::Short.to_direction(),
            Some(Direction::Short)
        );
    }

    #[test]
    fn serde_uses_uppercase_names() {
        let json = serde_json::to_string(&SignalDirection::Long).unwrap();
        assert_eq!(json, "\"LONG\"");
        let d: Direction = serde_json::from_str("\"SHORT\"").unwrap();
        assert_eq!(d, Direction::Short);
        let r = serde_json::to_string(&ExitReason::EndOfBacktest).unwrap();
        assert_eq!(r, "\"end-of-backtest\"");
    }
}
