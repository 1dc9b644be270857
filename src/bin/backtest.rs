use anyhow::{Context, Result};
use tracing_subscriber::{fmt, EnvFilter};

use futures_signal_bot::backtesting::{load_candles, BacktestEngine, BacktestResult};
use futures_signal_bot::config::Config;
use futures_signal_bot::strategies::build_default_coordinator;

fn main() -> Result<()> {
    let cfg = Config::from_env();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    cfg.validate().context("invalid configuration")?;

    // backtest [candles.json] [result.json]
    let args: Vec<String> = std::env::args().collect();
    let candles_path = args.get(1).cloned().unwrap_or_else(|| cfg.candles_file.clone());
    let output_path = args.get(2).cloned();

    let bt = &cfg.backtest;
    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║          FUTURES SIGNAL BOT · BACKTESTER                 ║");
    println!("╠══════════════════════════════════════════════════════════╣");
    println!("║  Symbol:     {:<44}║", bt.symbol);
    println!("║  Timeframe:  {:<44}║", bt.timeframe.to_string());
    println!("║  Balance:    {:<44}║", format!("${:.2}", bt.initial_balance));
    println!("║  Data:       {:<44}║", candles_path);
    println!("╚══════════════════════════════════════════════════════════╝");
    println!();

    let candles = load_candles(&candles_path)?;
    if candles.len() < bt.warmup_candles {
        println!(
            "ERROR: {} candles loaded, warmup needs {}",
            candles.len(),
            bt.warmup_candles
        );
        return Ok(());
    }

    let coordinator = build_default_coordinator(&cfg).context("building strategy set")?;
    let mut engine = BacktestEngine::new(bt.clone(), cfg.entry_confirmation.clone(), coordinator)
        .context("backtest config")?;
    let result = engine.run(&candles);

    result.summary.print_summary();

    let path = match output_path {
        Some(p) => p,
        None => {
            let stamp = |t: Option<chrono::DateTime<chrono::Utc>>| {
                t.map_or_else(|| "na".to_string(), |t| t.format("%Y%m%d").to_string())
            };
            format!(
                "data/backtest_{}_{}_{}.json",
                bt.symbol,
                stamp(result.summary.start),
                stamp(result.summary.end)
            )
        }
    };
    save_result(&result, &path)?;
    println!("\nResult saved to: {}", path);

    Ok(())
}

fn save_result(result: &BacktestResult, path: &str) -> Result<()> {
    if let Some(dir) = std::path::Path::new(path).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(result).context("serialising backtest result")?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path))?;
    Ok(())
}
