//! Selectivity and cost estimates for query planning.

pub mod histogram;
pub mod stats;

pub use histogram::{IntHistogram, StringHistogram};
pub use stats::{ColumnHistogram, StatsRegistry, TableStats};
