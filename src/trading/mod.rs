pub mod exit_type;
pub mod pnl;
pub mod position;

pub use exit_type::{determine_exit_type_from_history, identify_tp_level, ExitType};
pub use pnl::{PartialFill, PnlBreakdown};
pub use position::{Position, TakeProfitTarget, Trade};
