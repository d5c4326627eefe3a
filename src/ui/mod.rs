//! Terminal output: progress bars and result tables.

pub mod display;
pub mod progress;
