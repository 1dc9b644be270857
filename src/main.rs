mod bot;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use futures_signal_bot::backtesting::load_candles;
use futures_signal_bot::config::Config;
use futures_signal_bot::exchange::HistoricalExchange;

use crate::bot::SignalBot;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    cfg.validate().context("invalid configuration")?;

    // Paper feed: replays the configured candle file as close events.
    let candles = load_candles(&cfg.candles_file)?;
    info!("Paper feed: {} candles from {}", candles.len(), cfg.candles_file);
    let market = Box::new(HistoricalExchange::new(&cfg.symbol, cfg.timeframe, candles));

    let mut bot = SignalBot::new(cfg, market)?;
    bot.run().await?;
    info!(
        "Session done: {} trades, balance ${:.2}",
        bot.closed_trades().len(),
        bot.balance()
    );

    Ok(())
}
