// consensus-bench/src/orchestrator/mod.rs

pub mod config;
pub mod executor;
pub mod report;

pub use config::OrchestratorConfig;
pub use executor::{Executor, RunRequest};
pub use report::SweepReport;

use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::watch;

use crate::config::{BenchParameters, NodeParameters};
use crate::data_structures::{expected_roles, RunDescriptor};
use crate::error::{BenchError, ConfigError, ExecutionError, TopologyError};
use crate::keys::Identity;
use crate::logs::{LogAggregator, ResultSummary};
use crate::topology::{self, Committee};

/// Expands one sweep into concrete runs: nodes (as given), then rate (as given), then
/// repetitions innermost. `faults` is fixed for the whole expansion.
pub fn expand(bench: &BenchParameters) -> Vec<RunDescriptor> {
    let mut runs = Vec::with_capacity(bench.nodes.len() * bench.rate.len() * bench.runs);
    for &nodes in &bench.nodes {
        for &rate in &bench.rate {
            for repetition in 0..bench.runs {
                runs.push(RunDescriptor { nodes, faults: bench.faults, rate, repetition });
            }
        }
    }
    runs
}

/// Expansion of a campaign looping over several fault counts (outer loop).
pub fn expand_campaign(bench: &BenchParameters, faults: &[usize]) -> Result<Vec<RunDescriptor>, ConfigError> {
    let mut runs = Vec::new();
    for &f in faults {
        runs.extend(expand(&bench.with_faults(f)?));
    }
    Ok(runs)
}

/// Builds the sweep committee over the whole host pool; each run deploys a prefix of it.
pub fn committee_for(
    bench: &BenchParameters,
    hosts: &[String],
    identities: &[Identity],
    base_port: u16,
) -> Result<Committee, TopologyError> {
    topology::build(hosts, identities, bench.collocate, bench.workers, base_port)
}

/// Groups consecutive items into waves of at most `max_parallel` whose host sets are
/// pairwise disjoint. Order is preserved; an item sharing a host with the current wave
/// starts the next one.
pub fn plan_waves<T>(items: Vec<(T, BTreeSet<String>)>, max_parallel: usize) -> Vec<Vec<T>> {
    let max_parallel = max_parallel.max(1);
    let mut waves = Vec::new();
    let mut wave = Vec::new();
    let mut busy: BTreeSet<String> = BTreeSet::new();
    for (item, hosts) in items {
        if !wave.is_empty() && (wave.len() >= max_parallel || !hosts.is_disjoint(&busy)) {
            waves.push(std::mem::take(&mut wave));
            busy.clear();
        }
        busy.extend(hosts);
        wave.push(item);
    }
    if !wave.is_empty() {
        waves.push(wave);
    }
    waves
}

/// Drives every run of a sweep through an [`Executor`] and aggregates the logs.
pub struct SweepOrchestrator<E: Executor + ?Sized> {
    executor: Arc<E>,
    committee: Arc<Committee>,
    node_parameters: Arc<NodeParameters>,
    aggregator: Arc<LogAggregator>,
    config: OrchestratorConfig,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<E: Executor + ?Sized> SweepOrchestrator<E> {
    pub fn new(
        executor: Arc<E>,
        committee: Committee,
        node_parameters: NodeParameters,
        config: OrchestratorConfig,
    ) -> Self {
        SweepOrchestrator {
            executor,
            committee: Arc::new(committee),
            node_parameters: Arc::new(node_parameters),
            aggregator: Arc::new(LogAggregator::new()),
            config,
            shutdown: None,
        }
    }

    /// Cancels the sweep between runs once `true` is sent. Runs already dispatched
    /// are not interrupted; if they return after the signal they are recorded as
    /// cancelled.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    fn cancelled(&self) -> bool {
        self.shutdown.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Runs every point of `bench`. A failing run never aborts its siblings.
    pub async fn run(&self, bench: &BenchParameters) -> SweepReport {
        let runs = expand(bench);
        log::info!(
            "Starting sweep of {} runs ({} faults, {} workers, collocate={})",
            runs.len(),
            bench.faults,
            bench.workers,
            bench.collocate
        );

        let mut report = SweepReport::default();
        let mut planned = Vec::with_capacity(runs.len());
        for &run in &runs {
            // Topology problems fail the run before anything is deployed.
            match self.committee.slice(run.nodes) {
                Ok(committee) => {
                    let hosts: BTreeSet<String> = committee.hosts().into_iter().map(str::to_string).collect();
                    planned.push(((run, committee), hosts));
                }
                Err(e) => report.record(run, Err(e.into())),
            }
        }

        let mut waves = plan_waves(planned, self.config.max_parallel).into_iter();
        while let Some(wave) = waves.next() {
            if self.cancelled() {
                log::info!("Sweep cancelled; skipping remaining runs");
                for (run, _) in wave.into_iter().chain(waves.by_ref().flatten()) {
                    report.record(run, Err(ExecutionError::Cancelled.into()));
                }
                break;
            }
            let outcomes = join_all(
                wave.into_iter()
                    .map(|(run, committee)| async move { (run, self.execute_run(run, committee, bench).await) }),
            )
            .await;
            for (run, outcome) in outcomes {
                report.record(run, outcome);
            }
        }

        report.sort_by_sweep_order(&runs);
        log::info!(
            "Sweep finished: {} summaries ({} valid), {} failures",
            report.summaries.len(),
            report.valid().count(),
            report.failures.len()
        );
        report
    }

    /// Runs the sweep once per fault count. Every fault count is validated before any
    /// run is dispatched.
    pub async fn run_campaign(&self, bench: &BenchParameters, faults: &[usize]) -> Result<SweepReport, ConfigError> {
        let sweeps = faults
            .iter()
            .map(|&f| bench.with_faults(f))
            .collect::<Result<Vec<_>, _>>()?;
        let mut report = SweepReport::default();
        for sweep in &sweeps {
            report.extend(self.run(sweep).await);
        }
        Ok(report)
    }

    async fn execute_run(
        &self,
        run: RunDescriptor,
        committee: Committee,
        bench: &BenchParameters,
    ) -> Result<ResultSummary, BenchError> {
        let mut request = RunRequest {
            descriptor: run,
            committee,
            node_parameters: (*self.node_parameters).clone(),
            workers: bench.workers,
            collocate: bench.collocate,
            rate: run.rate,
            tx_size: bench.tx_size,
            duration: bench.duration(),
            attempt: 0,
        };
        let bound = bench.duration() + self.config.retrieval_grace;

        let bundle = loop {
            log::info!("Running [{}] (attempt {})", run, request.attempt + 1);
            let result = match tokio::time::timeout(bound, self.executor.execute(&request)).await {
                Ok(result) => result,
                Err(_) => Err(ExecutionError::Timeout(bound)),
            };
            match result {
                Ok(bundle) => break bundle,
                Err(e) if request.attempt < self.config.max_retries && !self.cancelled() => {
                    log::warn!("Run [{}] attempt {} failed: {}; retrying", run, request.attempt + 1, e);
                    request.attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        };

        if self.cancelled() {
            return Err(ExecutionError::Cancelled.into());
        }

        let expected = expected_roles(run.nodes, bench.workers);
        match self.aggregator.aggregate(&bundle, &expected, run.faults, bench.duration()) {
            Ok(summary) => Ok(summary),
            Err(e) => {
                log::warn!("Run [{}] logs unusable: {}", run, e);
                let missing = expected.iter().filter(|r| bundle.get(r).is_none()).count();
                Ok(ResultSummary::invalid(run.faults, missing, e.to_string()))
            }
        }
    }
}
