// consensus-bench/src/orchestrator/executor.rs

use async_trait::async_trait;
use std::time::Duration;

use crate::config::NodeParameters;
use crate::data_structures::{RawLogBundle, RunDescriptor};
use crate::error::ExecutionError;
use crate::topology::Committee;

/// Everything the execution collaborator needs to deploy and run one sweep point.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub descriptor: RunDescriptor,
    /// The first `descriptor.nodes` authorities of the sweep committee.
    pub committee: Committee,
    pub node_parameters: NodeParameters,
    pub workers: usize,
    pub collocate: bool,
    pub rate: u64,
    pub tx_size: u64,
    pub duration: Duration,
    /// Zero on the first try.
    pub attempt: usize,
}

/// Deploys a cluster, runs the load, and fetches the logs back.
///
/// Implementations drive remote machines (SSH, cloud APIs); the harness only needs the
/// resulting bundle or a typed failure. Calls may take minutes and are time-bounded by
/// the orchestrator.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, request: &RunRequest) -> Result<RawLogBundle, ExecutionError>;
}
