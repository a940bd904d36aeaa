// consensus-bench/src/logs/mod.rs
// Reconstruction of run-level performance from per-process logs.

pub mod aggregator;
pub mod parser;
pub mod summary;

pub use aggregator::{aggregate, LogAggregator};
pub use parser::{LogEvent, LogParser, ParsedLog};
pub use summary::ResultSummary;
