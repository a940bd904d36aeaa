// consensus-bench/src/test_utils.rs
// Synthetic logs and scripted executors shared by unit and scenario tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::data_structures::{LogRole, RawLogBundle, RunDescriptor};
use crate::error::ExecutionError;
use crate::keys::{generate_identities, Identity, SeededKeys};
use crate::orchestrator::{Executor, RunRequest};

/// Deterministic identities for tests.
pub fn test_identities(count: usize) -> Vec<Identity> {
    generate_identities(&mut SeededKeys { seed: 42 }, count)
}

pub fn test_hosts(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("10.0.{}.{}", i / 250, i % 250 + 1)).collect()
}

/// Content-derived batch digest, shortened for readability.
pub fn batch_digest(node: usize, round: usize) -> String {
    let digest = Sha256::digest(format!("batch-{}-{}", node, round).as_bytes());
    hex::encode(&digest[..8])
}

/// Shape of a synthetic run.
#[derive(Debug, Clone)]
pub struct SyntheticRun {
    pub nodes: usize,
    pub workers: usize,
    /// The last `crashed` nodes leave no logs at all.
    pub crashed: usize,
    pub rounds: usize,
    /// The last `uncommitted_rounds` rounds are created but never committed.
    pub uncommitted_rounds: usize,
    pub tx_per_batch: u64,
    pub tx_size: u64,
    pub rate: u64,
    /// Time between rounds.
    pub round_interval: Duration,
    /// Batch creation to commit.
    pub commit_delay: Duration,
}

impl Default for SyntheticRun {
    fn default() -> Self {
        SyntheticRun {
            nodes: 4,
            workers: 1,
            crashed: 0,
            rounds: 10,
            uncommitted_rounds: 0,
            tx_per_batch: 100,
            tx_size: 512,
            rate: 1_000,
            round_interval: Duration::from_millis(100),
            commit_delay: Duration::from_millis(500),
        }
    }
}

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).single().unwrap_or_default()
}

fn log_line(at: DateTime<Utc>, target: &str, msg: &str) -> String {
    format!("[{} INFO  {}] {}\n", at.format("%Y-%m-%dT%H:%M:%S%.3fZ"), target, msg)
}

fn offset(d: Duration) -> ChronoDuration {
    ChronoDuration::milliseconds(d.as_millis() as i64)
}

impl SyntheticRun {
    pub fn sample_id(node: usize, round: usize) -> u64 {
        (node * 1_000_000 + round) as u64
    }

    /// Every live node's client sends one sample per round; worker 0 of that node seals
    /// it in a batch; every live primary commits the round's batches `commit_delay` later.
    pub fn bundle(&self) -> RawLogBundle {
        let t0 = start_time();
        let live = self.nodes.saturating_sub(self.crashed);
        let committed_rounds = self.rounds.saturating_sub(self.uncommitted_rounds);
        let mut bundle = RawLogBundle::new();

        let mut primary_log = String::new();
        for round in 0..self.rounds {
            let created = t0 + offset(self.round_interval * round as u32) + ChronoDuration::milliseconds(50);
            for node in 0..live {
                primary_log += &log_line(created, "primary", &format!("Batch {} delivered", batch_digest(node, round)));
            }
            if round < committed_rounds {
                let batches: Vec<String> = (0..live).map(|node| batch_digest(node, round)).collect();
                primary_log += &log_line(
                    created + offset(self.commit_delay),
                    "primary",
                    &format!("Committed block B{} -> [{}]", round, batches.join(", ")),
                );
            }
        }

        for node in 0..self.nodes {
            if node >= live {
                bundle.mark_missing(LogRole::Primary(node));
                bundle.mark_missing(LogRole::Client(node));
                for worker in 0..self.workers {
                    bundle.mark_missing(LogRole::Worker(node, worker));
                }
                continue;
            }

            let mut client = String::new();
            client += &log_line(t0, "client", &format!("Transactions size: {} B", self.tx_size));
            client += &log_line(t0, "client", &format!("Transactions rate: {} tx/s", self.rate));
            client += &log_line(t0, "client", "Start sending transactions");
            let mut worker = String::new();
            for round in 0..self.rounds {
                let sent = t0 + offset(self.round_interval * round as u32) + ChronoDuration::milliseconds(10);
                let created = sent + ChronoDuration::milliseconds(40);
                let tx = Self::sample_id(node, round);
                let batch = batch_digest(node, round);
                client += &log_line(sent, "client", &format!("Sending sample transaction {}", tx));
                worker += &log_line(created, "worker", &format!("Batch {} created with {} tx", batch, self.tx_per_batch));
                worker += &log_line(created, "worker", &format!("Batch {} contains sample tx {}", batch, tx));
            }

            bundle.insert(LogRole::Primary(node), primary_log.clone());
            bundle.insert(LogRole::Client(node), client);
            bundle.insert(LogRole::Worker(node, 0), worker);
            for extra in 1..self.workers {
                bundle.insert(LogRole::Worker(node, extra), String::new());
            }
        }
        bundle
    }

    pub fn from_request(request: &RunRequest) -> Self {
        SyntheticRun {
            nodes: request.descriptor.nodes,
            workers: request.workers,
            crashed: request.descriptor.faults,
            tx_size: request.tx_size,
            rate: request.rate,
            ..SyntheticRun::default()
        }
    }
}

/// Answers every request with a synthetic bundle in which the `faults` last nodes
/// crashed, the way the deployment scripts only boot `nodes - faults` machines.
#[derive(Debug, Default)]
pub struct SyntheticExecutor {
    pub requests: Mutex<Vec<(RunDescriptor, usize)>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    /// Simulated run time.
    pub delay: Duration,
}

impl SyntheticExecutor {
    pub fn with_delay(delay: Duration) -> Self {
        SyntheticExecutor { delay, ..Default::default() }
    }

    pub fn seen(&self) -> Vec<(RunDescriptor, usize)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Executor for SyntheticExecutor {
    async fn execute(&self, request: &RunRequest) -> Result<RawLogBundle, ExecutionError> {
        self.requests.lock().unwrap().push((request.descriptor, request.committee.size()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(SyntheticRun::from_request(request).bundle())
    }
}

/// Fails the first `fail_first` attempts of every run, and every attempt of runs with
/// `broken_nodes` nodes.
#[derive(Debug, Default)]
pub struct FlakyExecutor {
    pub fail_first: usize,
    pub broken_nodes: Option<usize>,
    attempts: Mutex<HashMap<RunDescriptor, usize>>,
}

impl FlakyExecutor {
    pub fn new(fail_first: usize, broken_nodes: Option<usize>) -> Self {
        FlakyExecutor { fail_first, broken_nodes, ..Default::default() }
    }

    pub fn attempts(&self, run: &RunDescriptor) -> usize {
        self.attempts.lock().unwrap().get(run).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Executor for FlakyExecutor {
    async fn execute(&self, request: &RunRequest) -> Result<RawLogBundle, ExecutionError> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(request.descriptor).or_insert(0);
            *count += 1;
            *count
        };
        if Some(request.descriptor.nodes) == self.broken_nodes {
            return Err(ExecutionError::Crashed(format!("primary-0 of run {}", request.descriptor)));
        }
        if attempt <= self.fail_first {
            let host = request.committee.hosts().into_iter().next().unwrap_or_default().to_string();
            return Err(ExecutionError::Unreachable(host));
        }
        Ok(SyntheticRun::from_request(request).bundle())
    }
}

/// Never returns; exercises the orchestrator's time bound.
#[derive(Debug, Default)]
pub struct HangingExecutor {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Executor for HangingExecutor {
    async fn execute(&self, _request: &RunRequest) -> Result<RawLogBundle, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

/// Returns bundles with no usable logs at all.
#[derive(Debug, Default)]
pub struct EmptyLogsExecutor;

#[async_trait]
impl Executor for EmptyLogsExecutor {
    async fn execute(&self, request: &RunRequest) -> Result<RawLogBundle, ExecutionError> {
        let mut bundle = RawLogBundle::new();
        for node in 0..request.descriptor.nodes {
            bundle.mark_missing(LogRole::Primary(node));
        }
        Ok(bundle)
    }
}
