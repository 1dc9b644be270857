use serde::{Deserialize, Serialize};
use std::fmt;

/// Candle interval of the entry feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    pub fn as_seconds(&self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::M30 => 1_800,
            Timeframe::H1 => 3_600,
            Timeframe::H4 => 14_400,
            Timeframe::D1 => 86_400,
        }
    }

    /// Accepts `5m`/`1h` style and venue kline codes (`5`, `60`, `D`).
    pub fn from_str_loose(s: &str) -> Option<Timeframe> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1m" | "1" => Some(Timeframe::M1),
            "5m" | "5" => Some(Timeframe::M5),
            "15m" | "15" => Some(Timeframe::M15),
            "30m" | "30" => Some(Timeframe::M30),
            "1h" | "60" => Some(Timeframe::H1),
            "4h" | "240" => Some(Timeframe::H4),
            "1d" | "d" => Some(Timeframe::D1),
            _ => None,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_spellings() {
        assert_eq!(Timeframe::from_str_loose("5m"), Some(Timeframe::M5));
        assert_eq!(Timeframe::from_str_loose(" 240 "), Some(Timeframe::H4));
        assert_eq!(Timeframe::from_str_loose("D"), Some(Timeframe::D1));
        assert_eq!(Timeframe::from_str_loose("2h"), None);
    }

    #[test]
    fn serde_uses_short_names() {
        assert_eq!(serde_json::to_string(&Timeframe::M30).unwrap(), "\"30m\"");
        assert_eq!(Timeframe::H1.as_seconds(), 3_600);
        assert_eq!(Timeframe::M15.to_string(), "15m");
    }
}
