// consensus-bench/src/lib.rs
// Benchmark harness for a primary/worker consensus cluster: committee and parameter
// generation for a sweep, and reconstruction of throughput and latency from the logs.

pub mod config;
pub mod data_structures;
pub mod error;
pub mod keys;
pub mod logs;
pub mod orchestrator;
pub mod topology;

pub mod test_utils; // Shared by unit and scenario tests

pub use config::{BenchParameters, NodeParameters};
pub use data_structures::{LogRole, RawLogBundle, RunDescriptor};
pub use error::{BenchError, ConfigError, ExecutionError, ParseError, TopologyError};
pub use logs::ResultSummary;
pub use orchestrator::{SweepOrchestrator, SweepReport};
pub use topology::Committee;
