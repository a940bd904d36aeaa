// consensus-bench/src/orchestrator/report.rs

use crate::data_structures::RunDescriptor;
use crate::error::BenchError;
use crate::logs::ResultSummary;

/// Outcome of a sweep: every summary (possibly marked invalid) and every hard failure,
/// both in sweep order. Owned and appended to by the orchestrator only.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub summaries: Vec<(RunDescriptor, ResultSummary)>,
    pub failures: Vec<(RunDescriptor, BenchError)>,
}

impl SweepReport {
    pub fn record(&mut self, run: RunDescriptor, outcome: Result<ResultSummary, BenchError>) {
        match outcome {
            Ok(summary) => self.summaries.push((run, summary)),
            Err(e) => {
                log::warn!("Run [{}] failed: {}", run, e);
                self.failures.push((run, e));
            }
        }
    }

    pub fn summary(&self, run: &RunDescriptor) -> Option<&ResultSummary> {
        self.summaries.iter().find(|(r, _)| r == run).map(|(_, s)| s)
    }

    pub fn failure(&self, run: &RunDescriptor) -> Option<&BenchError> {
        self.failures.iter().find(|(r, _)| r == run).map(|(_, e)| e)
    }

    /// Summaries computed on complete enough data.
    pub fn valid(&self) -> impl Iterator<Item = &(RunDescriptor, ResultSummary)> {
        self.summaries.iter().filter(|(_, s)| s.valid)
    }

    pub fn total_runs(&self) -> usize {
        self.summaries.len() + self.failures.len()
    }

    /// Puts summaries and failures back in the order of `runs`.
    pub fn sort_by_sweep_order(&mut self, runs: &[RunDescriptor]) {
        let position = |run: &RunDescriptor| runs.iter().position(|r| r == run).unwrap_or(usize::MAX);
        self.summaries.sort_by_key(|(run, _)| position(run));
        self.failures.sort_by_key(|(run, _)| position(run));
    }

    /// Appends another report, e.g. the next fault count of a campaign.
    pub fn extend(&mut self, other: SweepReport) {
        self.summaries.extend(other.summaries);
        self.failures.extend(other.failures);
    }
}
