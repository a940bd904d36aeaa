// consensus-bench/src/orchestrator/config.rs

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Knobs of the sweep orchestrator itself (not of the benchmarked system).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Extra attempts after a failed execution before the run is recorded as failed.
    pub max_retries: usize,
    /// Added to the run duration to bound deployment and log retrieval.
    #[serde(with = "humantime_serde")]
    pub retrieval_grace: Duration,
    /// Upper bound on concurrently executing runs. Runs sharing a host never overlap.
    pub max_parallel: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            max_retries: 1,
            retrieval_grace: Duration::from_secs(60),
            max_parallel: 1,
        }
    }
}
