//! Run-level analysis state shared across worker threads.

pub mod metrics;

pub use metrics::{AnalysisMetrics, AnalysisStats};
