// consensus-bench/src/logs/summary.rs

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Duration;

/// Aggregated performance of one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    /// Committed transactions per second over the measured window.
    pub throughput_tx_per_sec: f64,
    /// Committed bytes per second, when clients reported their transaction size.
    pub throughput_bytes_per_sec: Option<f64>,
    /// End-to-end latency of sampled transactions (client send to commit),
    /// in send order.
    pub latency_samples: Vec<Duration>,
    /// Batch creation to commit, in creation order.
    pub consensus_latency_samples: Vec<Duration>,
    pub committed_tx: u64,
    /// Sampled transactions whose batch never committed within the logs.
    pub undelivered: usize,
    /// Span the throughput was computed over, clamped to the run duration.
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    pub faults_tolerated: usize,
    pub logs_missing: usize,
    pub malformed_lines: usize,
    pub tx_size: Option<u64>,
    pub input_rate: Option<u64>,
    /// False when more logs were missing than the declared fault tolerance, or when
    /// no summary could be computed at all.
    pub valid: bool,
    pub diagnostics: Vec<String>,
}

impl ResultSummary {
    /// Placeholder summary for a run whose logs could not be interpreted.
    pub fn invalid(faults_tolerated: usize, logs_missing: usize, diagnostic: impl Into<String>) -> Self {
        ResultSummary {
            throughput_tx_per_sec: 0.0,
            throughput_bytes_per_sec: None,
            latency_samples: Vec::new(),
            consensus_latency_samples: Vec::new(),
            committed_tx: 0,
            undelivered: 0,
            window: Duration::ZERO,
            faults_tolerated,
            logs_missing,
            malformed_lines: 0,
            tx_size: None,
            input_rate: None,
            valid: false,
            diagnostics: vec![diagnostic.into()],
        }
    }

    pub fn mean_latency(&self) -> Option<Duration> {
        mean(&self.latency_samples)
    }

    pub fn mean_consensus_latency(&self) -> Option<Duration> {
        mean(&self.consensus_latency_samples)
    }

    /// Nearest-rank percentile of the end-to-end latency, `p` in `0..=100`.
    pub fn latency_percentile(&self, p: f64) -> Option<Duration> {
        if self.latency_samples.is_empty() {
            return None;
        }
        let mut sorted = self.latency_samples.clone();
        sorted.sort();
        let rank = ((p.clamp(0.0, 100.0) / 100.0) * sorted.len() as f64).ceil() as usize;
        Some(sorted[rank.saturating_sub(1).min(sorted.len() - 1)])
    }

    /// Human-readable report in the layout the deployment scripts print.
    pub fn render(&self) -> String {
        let ms = |d: Option<Duration>| d.map(|d| d.as_millis()).unwrap_or(0);
        let mut out = String::new();
        let _ = writeln!(out, "-----------------------------------------");
        let _ = writeln!(out, " SUMMARY:");
        let _ = writeln!(out, "-----------------------------------------");
        let _ = writeln!(out, " + CONFIG:");
        let _ = writeln!(out, " Faults: {} node(s)", self.faults_tolerated);
        if let Some(rate) = self.input_rate {
            let _ = writeln!(out, " Input rate: {} tx/s", rate);
        }
        if let Some(size) = self.tx_size {
            let _ = writeln!(out, " Transaction size: {} B", size);
        }
        let _ = writeln!(out, " Execution time: {} s", self.window.as_secs());
        let _ = writeln!(out);
        let _ = writeln!(out, " + RESULTS:");
        let _ = writeln!(out, " Consensus latency: {} ms", ms(self.mean_consensus_latency()));
        let _ = writeln!(out, " End-to-end TPS: {:.0} tx/s", self.throughput_tx_per_sec);
        if let Some(bps) = self.throughput_bytes_per_sec {
            let _ = writeln!(out, " End-to-end BPS: {:.0} B/s", bps);
        }
        let _ = writeln!(out, " End-to-end latency: {} ms", ms(self.mean_latency()));
        let _ = writeln!(out, " Undelivered samples: {}", self.undelivered);
        let _ = writeln!(out, " Missing logs: {}", self.logs_missing);
        if !self.valid {
            let _ = writeln!(out, " WARNING: summary computed on incomplete data");
        }
        for diagnostic in &self.diagnostics {
            let _ = writeln!(out, " ! {}", diagnostic);
        }
        let _ = writeln!(out, "-----------------------------------------");
        out
    }
}

fn mean(samples: &[Duration]) -> Option<Duration> {
    if samples.is_empty() {
        return None;
    }
    let total: Duration = samples.iter().sum();
    Some(total / samples.len() as u32)
}
