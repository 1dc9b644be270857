use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::info;

use crate::models::Candle;

/// Reads a JSON array of candles, sorted and de-duplicated by timestamp.
pub fn load_candles(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading candles from {}", path.display()))?;
    let mut candles: Vec<Candle> = serde_json::from_str(&content)
        .with_context(|| format!("parsing candles in {}", path.display()))?;

    candles.sort_by_key(|c| c.timestamp);
    candles.dedup_by_key(|c| c.timestamp);

    if let Some(bad) = candles.iter().find(|c| !c.is_consistent()) {
        bail!("inconsistent candle at {} in {}", bad.timestamp, path.display());
    }

    info!("Loaded {} candles from {}", candles.len(), path.display());
    Ok(candles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::candle_at;

    fn temp_file(name: &str, body: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("futures_signal_bot_test");
        std::fs::create_dir_all(&dir).unwrap();
        let p = dir.join(name);
        std::fs::write(&p, body).unwrap();
        p
    }

    #[test]
    fn loads_sorted_unique() {
        let candles = vec![candle_at(600, 101.0), candle_at(0, 100.0), candle_at(600, 101.0)];
        let p = temp_file("sorted.json", &serde_json::to_string(&candles).unwrap());
        let loaded = load_candles(&p).unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded[0].timestamp < loaded[1].timestamp);
    }

    #[test]
    fn errors_carry_path() {
        let err = load_candles("/nonexistent/candles.json").unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/candles.json"));

        let p = temp_file("garbage.json", "not json");
        assert!(load_candles(&p).is_err());

        let mut c = candle_at(0, 100.0);
        c.high = 90.0;
        let p = temp_file("inconsistent.json", &serde_json::to_string(&vec![c]).unwrap());
        assert!(load_candles(&p).is_err());
    }
}
