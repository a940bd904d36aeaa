// consensus-bench/tests/sweep_execution_scenarios.rs

use consensus_bench::{
    config::{BenchParameters, NodeParameters},
    orchestrator::{committee_for, OrchestratorConfig, SweepOrchestrator},
    test_utils::{test_hosts, test_identities, EmptyLogsExecutor, FlakyExecutor, HangingExecutor, SyntheticExecutor},
    topology::{Committee, DEFAULT_BASE_PORT},
    BenchError, ExecutionError, RunDescriptor, TopologyError,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn bench(nodes: Vec<usize>, rate: Vec<u64>, faults: usize, runs: usize) -> BenchParameters {
    BenchParameters { nodes, rate, faults, runs, ..BenchParameters::default() }
}

fn committee(size: usize) -> Committee {
    committee_for(&BenchParameters::default(), &test_hosts(size), &test_identities(size), DEFAULT_BASE_PORT).unwrap()
}

fn orchestrator<E: consensus_bench::orchestrator::Executor>(
    executor: Arc<E>,
    size: usize,
    config: OrchestratorConfig,
) -> SweepOrchestrator<E> {
    SweepOrchestrator::new(executor, committee(size), NodeParameters::default(), config)
}

#[tokio::test]
async fn sweep_produces_one_summary_per_run_in_order() {
    let _ = env_logger::try_init();
    println!("--- Sweep: nodes [4, 7] x rate [1000, 2000] x 2 runs, 1 fault ---");
    let executor = Arc::new(SyntheticExecutor::default());
    let sweep = orchestrator(executor.clone(), 7, OrchestratorConfig::default());

    let report = sweep.run(&bench(vec![4, 7], vec![1_000, 2_000], 1, 2)).await;

    assert!(report.failures.is_empty());
    assert_eq!(report.summaries.len(), 8);
    assert_eq!(report.valid().count(), 8);
    let order: Vec<(usize, u64, usize)> = report
        .summaries
        .iter()
        .map(|(run, _)| (run.nodes, run.rate, run.repetition))
        .collect();
    assert_eq!(order[0], (4, 1_000, 0));
    assert_eq!(order[1], (4, 1_000, 1));
    assert_eq!(order[2], (4, 2_000, 0));
    assert_eq!(order[7], (7, 2_000, 1));

    // Each run deployed exactly the first `nodes` authorities.
    for (run, committee_size) in executor.seen() {
        assert_eq!(run.nodes, committee_size);
    }
    for (run, summary) in &report.summaries {
        assert_eq!(summary.faults_tolerated, 1);
        assert_eq!(summary.input_rate, Some(run.rate * (run.nodes as u64 - 1)));
    }
}

#[tokio::test]
async fn failed_attempt_is_retried_once() {
    let executor = Arc::new(FlakyExecutor::new(1, None));
    let sweep = orchestrator(executor.clone(), 4, OrchestratorConfig::default());
    let bench = bench(vec![4], vec![1_000], 0, 2);

    let report = sweep.run(&bench).await;

    assert!(report.failures.is_empty());
    assert_eq!(report.valid().count(), 2);
    for (run, _) in &report.summaries {
        assert_eq!(executor.attempts(run), 2);
    }
}

#[tokio::test]
async fn broken_run_does_not_abort_its_siblings() {
    let executor = Arc::new(FlakyExecutor::new(0, Some(7)));
    let sweep = orchestrator(executor.clone(), 10, OrchestratorConfig::default());

    let report = sweep.run(&bench(vec![4, 7, 10], vec![1_000], 0, 1)).await;

    assert_eq!(report.total_runs(), 3);
    assert_eq!(report.summaries.len(), 2);
    let (broken, error) = &report.failures[0];
    assert_eq!(broken.nodes, 7);
    assert!(matches!(error, BenchError::Execution(ExecutionError::Crashed(_))));
    assert_eq!(executor.attempts(broken), 2);
    assert!(report.summaries.iter().all(|(run, s)| run.nodes != 7 && s.valid));
}

#[tokio::test]
async fn hung_execution_is_bounded_by_duration_and_grace() {
    println!("--- Sweep: execution collaborator never answers ---");
    let executor = Arc::new(HangingExecutor::default());
    let config = OrchestratorConfig { max_retries: 0, retrieval_grace: Duration::ZERO, max_parallel: 1 };
    let sweep = orchestrator(executor.clone(), 4, config);
    let bench = BenchParameters { duration: 1, ..bench(vec![4], vec![1_000], 0, 1) };

    let report = sweep.run(&bench).await;

    assert!(report.summaries.is_empty());
    assert!(matches!(
        report.failures[0].1,
        BenchError::Execution(ExecutionError::Timeout(bound)) if bound == Duration::from_secs(1)
    ));
    assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn run_larger_than_committee_fails_without_deploying() {
    let executor = Arc::new(SyntheticExecutor::default());
    let sweep = orchestrator(executor.clone(), 4, OrchestratorConfig::default());

    let report = sweep.run(&bench(vec![4, 6], vec![1_000], 0, 1)).await;

    assert_eq!(report.summaries.len(), 1);
    let (run, error) = &report.failures[0];
    assert_eq!(run.nodes, 6);
    assert!(matches!(
        error,
        BenchError::Topology(TopologyError::NotEnoughNodes { available: 4, requested: 6 })
    ));
    assert_eq!(executor.seen().len(), 1);
}

#[tokio::test]
async fn unusable_logs_yield_an_invalid_summary() {
    let sweep = orchestrator(Arc::new(EmptyLogsExecutor), 4, OrchestratorConfig::default());

    let report = sweep.run(&bench(vec![4], vec![1_000], 0, 1)).await;

    assert!(report.failures.is_empty());
    let (_, summary) = &report.summaries[0];
    assert!(!summary.valid);
    // Every primary, worker and client log of the 4 nodes.
    assert_eq!(summary.logs_missing, 12);
    assert!(summary.diagnostics[0].contains("primary"));
}

#[tokio::test]
async fn shutdown_before_start_skips_every_run() {
    let executor = Arc::new(SyntheticExecutor::default());
    let (tx, rx) = watch::channel(true);
    let sweep = orchestrator(executor.clone(), 4, OrchestratorConfig::default()).with_shutdown(rx);

    let report = sweep.run(&bench(vec![4], vec![1_000, 2_000], 0, 1)).await;
    drop(tx);

    assert!(report.summaries.is_empty());
    assert_eq!(report.failures.len(), 2);
    assert!(report
        .failures
        .iter()
        .all(|(_, e)| matches!(e, BenchError::Execution(ExecutionError::Cancelled))));
    assert!(executor.seen().is_empty());
}

#[tokio::test]
async fn shutdown_mid_sweep_cancels_in_flight_and_remaining_runs() {
    println!("--- Sweep: shutdown signal while the first run executes ---");
    let executor = Arc::new(SyntheticExecutor::with_delay(Duration::from_millis(300)));
    let (tx, rx) = watch::channel(false);
    let sweep = orchestrator(executor.clone(), 4, OrchestratorConfig::default()).with_shutdown(rx);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = tx.send(true);
    });

    let report = sweep.run(&bench(vec![4], vec![1_000], 0, 3)).await;

    assert_eq!(executor.seen().len(), 1);
    assert_eq!(report.failures.len(), 3);
    let repetitions: Vec<usize> = report.failures.iter().map(|(run, _)| run.repetition).collect();
    assert_eq!(repetitions, vec![0, 1, 2]);
}

#[tokio::test]
async fn runs_sharing_hosts_never_overlap() {
    let executor = Arc::new(SyntheticExecutor::with_delay(Duration::from_millis(20)));
    let config = OrchestratorConfig { max_parallel: 4, ..OrchestratorConfig::default() };
    let sweep = orchestrator(executor.clone(), 4, config);

    let report = sweep.run(&bench(vec![2, 3, 4], vec![1_000], 0, 2)).await;

    assert_eq!(report.valid().count(), 6);
    assert_eq!(executor.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn campaign_runs_one_sweep_per_fault_count() {
    let executor = Arc::new(SyntheticExecutor::default());
    let sweep = orchestrator(executor.clone(), 4, OrchestratorConfig::default());
    let base = bench(vec![4], vec![1_000], 0, 1);

    let report = sweep.run_campaign(&base, &[0, 1]).await.unwrap();
    let faults: Vec<usize> = report.summaries.iter().map(|(run, _)| run.faults).collect();
    assert_eq!(faults, vec![0, 1]);
    assert_eq!(report.valid().count(), 2);
    let expected = RunDescriptor { nodes: 4, faults: 1, rate: 1_000, repetition: 0 };
    assert_eq!(report.summary(&expected).map(|s| s.logs_missing), Some(3));

    // An impossible fault count rejects the whole campaign up front.
    let err = sweep.run_campaign(&base, &[0, 4]).await.unwrap_err();
    assert!(err.mentions("faults"));
    assert_eq!(executor.seen().len(), 2);
}
