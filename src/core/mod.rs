pub mod entry_confirmation;
pub mod indicators;
pub mod retest;
pub mod weights;
