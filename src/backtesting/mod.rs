pub mod data;
pub mod report;
pub mod runner;

pub use data::load_candles;
pub use report::{BacktestResult, BacktestSummary};
pub use runner::BacktestEngine;
