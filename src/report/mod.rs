//! Report Module
//!
//! Ensemble statistics and human-readable value±error strings.

mod aggregate;
mod format;

pub use aggregate::{aggregate, AggregatedResult, KeyStatistics, RunResult};
pub use format::{error_decimals, format_value, format_value_with_error, ValueWithError};
