// consensus-bench/src/logs/aggregator.rs

use chrono::Duration as ChronoDuration;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::data_structures::{LogRole, RawLogBundle, RoleKind};
use crate::error::ParseError;
use crate::logs::parser::{LogEvent, LogParser, ParsedLog, Timestamp};
use crate::logs::summary::ResultSummary;

/// Role kinds without which no summary can be computed.
const REQUIRED_KINDS: [RoleKind; 2] = [RoleKind::Primary, RoleKind::Client];

/// Builds one [`ResultSummary`] out of the logs of one run.
///
/// Timestamps are taken at face value from each host; clocks are not synchronized and
/// skew is not corrected.
pub struct LogAggregator {
    parser: LogParser,
}

impl Default for LogAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Events of every log merged by join key, earliest timestamp wins.
#[derive(Default)]
struct Merged {
    created: BTreeMap<String, (Timestamp, u64)>,
    delivered: BTreeMap<String, BTreeSet<LogRole>>,
    blocks: BTreeMap<String, Timestamp>,
    batch_commits: BTreeMap<String, Timestamp>,
    samples_sent: BTreeMap<u64, Timestamp>,
    sample_batches: BTreeMap<u64, String>,
    malformed: usize,
    tx_size: Option<u64>,
    rate: Option<u64>,
    diagnostics: Vec<String>,
}

impl Merged {
    fn absorb(&mut self, log: ParsedLog) {
        self.malformed += log.malformed;
        if let Some(size) = log.tx_size {
            self.tx_size.get_or_insert(size);
        }
        if let Some(rate) = log.rate {
            let total = self.rate.get_or_insert(0);
            *total = total.saturating_add(rate);
        }
        if !log.errors.is_empty() {
            self.diagnostics.push(format!("{} logged {} error(s): {}", log.role, log.errors.len(), log.errors[0]));
        }

        for event in log.events {
            match event {
                LogEvent::BatchCreated { batch, tx_count, at } => {
                    let entry = self.created.entry(batch).or_insert((at, tx_count));
                    if at < entry.0 {
                        *entry = (at, tx_count);
                    }
                }
                LogEvent::BatchDelivered { batch, .. } => {
                    self.delivered.entry(batch).or_default().insert(log.role);
                }
                LogEvent::BlockCommitted { block, batches, at } => {
                    keep_earliest(&mut self.blocks, block, at);
                    for batch in batches {
                        keep_earliest(&mut self.batch_commits, batch, at);
                    }
                }
                LogEvent::SampleSent { tx, at } => {
                    keep_earliest(&mut self.samples_sent, tx, at);
                }
                LogEvent::SampleInBatch { tx, batch, .. } => {
                    self.sample_batches.entry(tx).or_insert(batch);
                }
            }
        }
    }
}

fn keep_earliest<K: Ord>(map: &mut BTreeMap<K, Timestamp>, key: K, at: Timestamp) {
    map.entry(key).and_modify(|t| *t = (*t).min(at)).or_insert(at);
}

/// `later - earlier`, saturating at zero when the clocks disagree.
fn elapsed(earlier: Timestamp, later: Timestamp) -> Duration {
    (later - earlier).to_std().unwrap_or(Duration::ZERO)
}

impl LogAggregator {
    pub fn new() -> Self {
        LogAggregator { parser: LogParser::new() }
    }

    /// Aggregates `bundle` against the roles the run was expected to produce.
    ///
    /// More than `fault_tolerance` nodes with any missing log yields `valid = false`, but
    /// the summary is still computed from what is present. Only when a required role kind
    /// (primary, client) has no log at all and no faults are tolerated does this fail.
    /// The log window closes `duration` after the first batch; later commits count as
    /// undelivered and stay out of the throughput.
    pub fn aggregate(
        &self,
        bundle: &RawLogBundle,
        expected_roles: &BTreeSet<LogRole>,
        fault_tolerance: usize,
        duration: Duration,
    ) -> Result<ResultSummary, ParseError> {
        let missing: Vec<&LogRole> = expected_roles.iter().filter(|r| bundle.get(r).is_none()).collect();
        let logs_missing = missing.len();

        let expected_kinds: BTreeSet<RoleKind> = expected_roles.iter().map(LogRole::kind).collect();
        for kind in REQUIRED_KINDS {
            let any_present = bundle.present().any(|(role, _)| role.kind() == kind);
            if expected_kinds.contains(&kind) && !any_present && fault_tolerance == 0 {
                return Err(ParseError::NoLogs(kind.to_string()));
            }
        }

        let mut merged = Merged::default();
        for (role, content) in bundle.present() {
            merged.absorb(self.parser.parse(*role, content));
        }

        // Tolerance counts failed nodes: one crashed node takes its primary, its workers and
        // its client down together.
        let failed_nodes: BTreeSet<usize> = missing.iter().map(|role| role.node()).collect();
        let valid = failed_nodes.len() <= fault_tolerance;
        if !missing.is_empty() {
            let names: Vec<String> = missing.iter().map(|r| r.to_string()).collect();
            merged.diagnostics.insert(0, format!("missing logs: {}", names.join(", ")));
        }
        if !valid {
            log::warn!(
                "{} logs missing ({} nodes) but only {} faults tolerated; summary marked invalid",
                logs_missing,
                failed_nodes.len(),
                fault_tolerance
            );
        }

        let mut created: Vec<(Timestamp, &String, u64)> =
            merged.created.iter().map(|(b, (at, n))| (*at, b, *n)).collect();
        created.sort();

        // The log window opens at the first batch and closes `duration` later; commits
        // after it are treated as never having happened.
        let first_created = created.first().map(|(at, _, _)| *at);
        let close = first_created.and_then(|start| {
            ChronoDuration::from_std(duration)
                .ok()
                .and_then(|d| start.checked_add_signed(d))
        });
        let commit_in_window = |batch: &String| {
            merged
                .batch_commits
                .get(batch)
                .filter(|at| close.map_or(true, |close| **at <= close))
                .copied()
        };

        // End-to-end latency of sampled transactions.
        let mut sends: Vec<(Timestamp, u64)> = merged.samples_sent.iter().map(|(tx, at)| (*at, *tx)).collect();
        sends.sort();
        let mut latency_samples = Vec::with_capacity(sends.len());
        let mut undelivered = 0;
        for (sent, tx) in sends {
            match merged.sample_batches.get(&tx).and_then(|batch| commit_in_window(batch)) {
                Some(committed) => latency_samples.push(elapsed(sent, committed)),
                None => undelivered += 1,
            }
        }

        // Batch-level consensus latency, and the committed transaction count.
        let mut consensus_latency_samples = Vec::new();
        let mut committed_tx = 0u64;
        let mut last_commit: Option<Timestamp> = None;
        for (at, batch, tx_count) in &created {
            if let Some(committed) = commit_in_window(batch) {
                consensus_latency_samples.push(elapsed(*at, committed));
                committed_tx = committed_tx.saturating_add(*tx_count);
                last_commit = Some(last_commit.map_or(committed, |last| last.max(committed)));
            }
        }
        let unknown_size = merged
            .batch_commits
            .keys()
            .filter(|b| !merged.created.contains_key(*b))
            .count();
        if unknown_size > 0 {
            merged.diagnostics.push(format!("{} committed batch(es) of unknown size", unknown_size));
        }
        let late = merged
            .batch_commits
            .iter()
            .filter(|(b, at)| merged.created.contains_key(*b) && close.map_or(false, |close| **at > close))
            .count();
        if late > 0 {
            merged.diagnostics.push(format!("{} batch(es) committed after the log window closed", late));
        }

        let window = match (first_created, last_commit) {
            (Some(start), Some(end)) => elapsed(start, end).min(duration),
            _ => Duration::ZERO,
        };
        let throughput_tx_per_sec = if window.is_zero() {
            0.0
        } else {
            committed_tx as f64 / window.as_secs_f64()
        };

        let undelivered_batches = merged
            .batch_commits
            .keys()
            .filter(|b| !merged.delivered.contains_key(*b))
            .count();
        log::debug!(
            "Aggregated {} logs: {} blocks, {} committed tx, {} committed batches without delivery record",
            bundle.present().count(),
            merged.blocks.len(),
            committed_tx,
            undelivered_batches
        );

        Ok(ResultSummary {
            throughput_tx_per_sec,
            throughput_bytes_per_sec: merged.tx_size.map(|size| throughput_tx_per_sec * size as f64),
            latency_samples,
            consensus_latency_samples,
            committed_tx,
            undelivered,
            window,
            faults_tolerated: fault_tolerance,
            logs_missing,
            malformed_lines: merged.malformed,
            tx_size: merged.tx_size,
            input_rate: merged.rate,
            valid,
            diagnostics: merged.diagnostics,
        })
    }
}

/// Convenience wrapper around [`LogAggregator::aggregate`].
pub fn aggregate(
    bundle: &RawLogBundle,
    expected_roles: &BTreeSet<LogRole>,
    fault_tolerance: usize,
    duration: Duration,
) -> Result<ResultSummary, ParseError> {
    LogAggregator::new().aggregate(bundle, expected_roles, fault_tolerance, duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(ms: u64, target: &str, msg: &str) -> String {
        let secs = ms / 1000;
        let millis = ms % 1000;
        format!("[2024-05-01T10:00:{:02}.{:03}Z INFO  {}] {}\n", secs, millis, target, msg)
    }

    fn primaries(n: usize) -> BTreeSet<LogRole> {
        (0..n).map(LogRole::Primary).collect()
    }

    /// Primary `i` logs creation of its own batch and the commits every primary sees.
    fn primary_log(i: usize) -> String {
        let mut log = String::new();
        log += &line(100 * i as u64, "primary", &format!("Batch b{} created with 100 tx", i));
        for j in 0..4 {
            log += &line(500, "primary", &format!("Batch b{} delivered", j));
        }
        log += &line(1_000, "primary", "Committed block B1 -> [b0, b1, b2, b3]");
        log
    }

    #[test]
    fn full_bundle_is_valid() {
        let mut bundle = RawLogBundle::new();
        for i in 0..4 {
            bundle.insert(LogRole::Primary(i), primary_log(i));
        }
        let summary = aggregate(&bundle, &primaries(4), 0, Duration::from_secs(60)).unwrap();
        assert!(summary.valid);
        assert_eq!(summary.logs_missing, 0);
        assert_eq!(summary.committed_tx, 400);
        assert_eq!(summary.window, Duration::from_millis(1_000));
        assert!((summary.throughput_tx_per_sec - 400.0).abs() < 1e-9);
        assert_eq!(summary.consensus_latency_samples.len(), 4);
        assert_eq!(summary.consensus_latency_samples[0], Duration::from_millis(1_000));
    }

    #[test]
    fn one_missing_primary_within_tolerance() {
        let mut bundle = RawLogBundle::new();
        for i in 0..3 {
            bundle.insert(LogRole::Primary(i), primary_log(i));
        }
        bundle.mark_missing(LogRole::Primary(3));
        let summary = aggregate(&bundle, &primaries(4), 1, Duration::from_secs(60)).unwrap();
        assert!(summary.valid);
        assert_eq!(summary.logs_missing, 1);
        assert_eq!(summary.committed_tx, 300);
        assert!(summary.diagnostics[0].contains("primary-3"));
        assert!(summary.diagnostics.iter().any(|d| d.contains("unknown size")));
    }

    #[test]
    fn two_missing_primaries_beyond_tolerance() {
        let mut bundle = RawLogBundle::new();
        bundle.insert(LogRole::Primary(0), primary_log(0));
        bundle.insert(LogRole::Primary(1), primary_log(1));
        let summary = aggregate(&bundle, &primaries(4), 1, Duration::from_secs(60)).unwrap();
        assert!(!summary.valid);
        assert_eq!(summary.logs_missing, 2);
        assert_eq!(summary.committed_tx, 200);
        assert!(summary.throughput_tx_per_sec > 0.0);
    }

    #[test]
    fn tolerance_counts_crashed_nodes_not_files() {
        let expected = crate::data_structures::expected_roles(4, 2);
        let mut bundle = RawLogBundle::new();
        for i in 0..3 {
            bundle.insert(LogRole::Primary(i), primary_log(i));
            bundle.insert(LogRole::Client(i), "");
            bundle.insert(LogRole::Worker(i, 0), "");
            bundle.insert(LogRole::Worker(i, 1), "");
        }
        let summary = aggregate(&bundle, &expected, 1, Duration::from_secs(60)).unwrap();
        assert_eq!(summary.logs_missing, 4);
        assert!(summary.valid);

        bundle.mark_missing(LogRole::Worker(2, 1));
        let summary = aggregate(&bundle, &expected, 1, Duration::from_secs(60)).unwrap();
        assert!(!summary.valid);
    }

    #[test]
    fn no_primary_logs_without_tolerance_fails() {
        let bundle = RawLogBundle::new();
        let err = aggregate(&bundle, &primaries(4), 0, Duration::from_secs(60)).unwrap_err();
        assert_eq!(err, ParseError::NoLogs("primary".into()));

        // With tolerance the caller still gets a (invalid) summary.
        let summary = aggregate(&bundle, &primaries(4), 1, Duration::from_secs(60)).unwrap();
        assert!(!summary.valid);
        assert_eq!(summary.throughput_tx_per_sec, 0.0);
    }

    #[test]
    fn sampled_latency_and_undelivered() {
        let mut client = String::new();
        client += &line(0, "client", "Transactions size: 512 B");
        client += &line(0, "client", "Transactions rate: 1000 tx/s");
        client += &line(0, "client", "Start sending transactions");
        client += &line(100, "client", "Sending sample transaction 1");
        client += &line(200, "client", "Sending sample transaction 2");

        let mut worker = String::new();
        worker += &line(150, "worker", "Batch b1 created with 10 tx");
        worker += &line(150, "worker", "Batch b1 contains sample tx 1");
        worker += &line(250, "worker", "Batch b2 created with 20 tx");
        worker += &line(250, "worker", "Batch b2 contains sample tx 2");

        let primary = line(900, "primary", "Committed block B1 -> [b1]");

        let mut bundle = RawLogBundle::new();
        bundle.insert(LogRole::Client(0), client);
        bundle.insert(LogRole::Worker(0, 0), worker);
        bundle.insert(LogRole::Primary(0), primary);

        let expected: BTreeSet<LogRole> =
            [LogRole::Client(0), LogRole::Worker(0, 0), LogRole::Primary(0)].into_iter().collect();
        let summary = aggregate(&bundle, &expected, 0, Duration::from_secs(60)).unwrap();

        assert_eq!(summary.latency_samples, vec![Duration::from_millis(800)]);
        assert_eq!(summary.undelivered, 1);
        // b2 never committed, so its 20 tx stay out of the numerator.
        assert_eq!(summary.committed_tx, 10);
        assert_eq!(summary.tx_size, Some(512));
        assert_eq!(summary.input_rate, Some(1000));
        let bps = summary.throughput_bytes_per_sec.unwrap();
        assert!((bps - summary.throughput_tx_per_sec * 512.0).abs() < 1e-6);
    }

    #[test]
    fn commits_after_the_window_are_excluded() {
        let mut worker = String::new();
        worker += &line(0, "worker", "Batch b1 created with 1000 tx");
        worker += &line(1_000, "worker", "Batch b2 created with 500 tx");
        worker += &line(1_000, "worker", "Batch b2 contains sample tx 9");
        let mut primary = String::new();
        primary += &line(4_000, "primary", "Committed block B1 -> [b1]");
        primary += &line(50_000, "primary", "Committed block B2 -> [b2]");
        let client = line(900, "client", "Sending sample transaction 9");

        let mut bundle = RawLogBundle::new();
        bundle.insert(LogRole::Worker(0, 0), worker);
        bundle.insert(LogRole::Primary(0), primary);
        bundle.insert(LogRole::Client(0), client);
        let expected: BTreeSet<LogRole> =
            [LogRole::Client(0), LogRole::Worker(0, 0), LogRole::Primary(0)].into_iter().collect();

        let summary = aggregate(&bundle, &expected, 0, Duration::from_secs(10)).unwrap();
        assert_eq!(summary.committed_tx, 1000);
        assert_eq!(summary.window, Duration::from_secs(4));
        assert!((summary.throughput_tx_per_sec - 250.0).abs() < 1e-9);
        assert_eq!(summary.undelivered, 1);
        assert!(summary.latency_samples.is_empty());
        assert_eq!(summary.consensus_latency_samples, vec![Duration::from_secs(4)]);
        assert!(summary.diagnostics.iter().any(|d| d.contains("after the log window")));

        // Without a bound every commit counts.
        let unbounded = aggregate(&bundle, &expected, 0, Duration::MAX).unwrap();
        assert_eq!(unbounded.committed_tx, 1500);
        assert_eq!(unbounded.undelivered, 0);
    }

    #[test]
    fn missing_logs_on_different_nodes_add_up() {
        let expected = crate::data_structures::expected_roles(4, 1);
        let full = crate::test_utils::SyntheticRun::default().bundle();
        let mut bundle = RawLogBundle::new();
        for (role, text) in full.present() {
            bundle.insert(*role, text);
        }
        bundle.mark_missing(LogRole::Primary(0));
        bundle.mark_missing(LogRole::Client(1));
        bundle.mark_missing(LogRole::Worker(2, 0));

        let summary = aggregate(&bundle, &expected, 1, Duration::from_secs(60)).unwrap();
        assert_eq!(summary.logs_missing, 3);
        assert!(!summary.valid);
        assert!(aggregate(&bundle, &expected, 3, Duration::from_secs(60)).unwrap().valid);
    }

    #[test]
    fn huge_counts_saturate_instead_of_panicking() {
        let max = u64::MAX;
        let mut primary = String::new();
        primary += &line(0, "worker", &format!("Batch b1 created with {} tx", max));
        primary += &line(0, "worker", &format!("Batch b2 created with {} tx", max));
        primary += &line(500, "primary", "Committed block B1 -> [b1, b2]");
        let client = |i: u64| line(0, "client", &format!("Transactions rate: {} tx/s", max - i));

        let mut bundle = RawLogBundle::new();
        bundle.insert(LogRole::Primary(0), primary);
        bundle.insert(LogRole::Client(0), client(0));
        bundle.insert(LogRole::Client(1), client(1));
        let expected: BTreeSet<LogRole> =
            [LogRole::Primary(0), LogRole::Client(0), LogRole::Client(1)].into_iter().collect();

        let summary = aggregate(&bundle, &expected, 0, Duration::from_secs(60)).unwrap();
        assert_eq!(summary.committed_tx, u64::MAX);
        assert_eq!(summary.input_rate, Some(u64::MAX));
        assert!(summary.throughput_tx_per_sec.is_finite());
    }

    #[test]
    fn earliest_commit_wins_across_primaries() {
        let mut bundle = RawLogBundle::new();
        bundle.insert(
            LogRole::Primary(0),
            line(0, "primary", "Batch b1 created with 5 tx") + &line(700, "primary", "Committed block B1 -> [b1]"),
        );
        bundle.insert(LogRole::Primary(1), line(400, "primary", "Committed block B1 -> [b1]"));
        let summary = aggregate(&bundle, &primaries(2), 0, Duration::from_secs(10)).unwrap();
        assert_eq!(summary.consensus_latency_samples, vec![Duration::from_millis(400)]);
        assert_eq!(summary.committed_tx, 5);
    }

    #[test]
    fn aggregation_is_idempotent() {
        let mut bundle = RawLogBundle::new();
        for i in 0..3 {
            bundle.insert(LogRole::Primary(i), primary_log(i));
        }
        bundle.insert(LogRole::Primary(3), "garbage\n[2024-05-01T10:00:00.000Z ERROR primary] boom\n");
        let a = aggregate(&bundle, &primaries(4), 1, Duration::from_secs(60)).unwrap();
        let b = aggregate(&bundle, &primaries(4), 1, Duration::from_secs(60)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.malformed_lines, 1);
        assert!(a.diagnostics.iter().any(|d| d.contains("primary-3") && d.contains("boom")));
    }
}
