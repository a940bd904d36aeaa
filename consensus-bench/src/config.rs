// consensus-bench/src/config.rs

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;

use crate::error::{BenchError, ConfigError, FieldViolation};

/// A collocated node needs one port per worker plus one for its primary.
pub const MAX_WORKERS: u64 = u16::MAX as u64 - 1;

/// Sweep-level parameters of a benchmark campaign.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchParameters {
    pub faults: usize,
    pub nodes: Vec<usize>,
    pub workers: usize,
    pub collocate: bool,
    pub rate: Vec<u64>,
    pub tx_size: u64,
    /// Seconds.
    pub duration: u64,
    pub runs: usize,
}

impl BenchParameters {
    /// Validates an arbitrary key/value mapping. Every violated field is reported.
    ///
    /// `nodes` and `rate` may be given as a single number or a list. `collocate`
    /// defaults to true and `runs` to 1.
    pub fn validate(raw: &Value) -> Result<Self, ConfigError> {
        let mut fields = Fields::new(raw)?;

        let faults = fields.integer("faults", 0);
        let nodes = fields.integer_list("nodes");
        let workers = fields.integer("workers", 1);
        let collocate = fields.flag("collocate", Some(true));
        let rate = fields.integer_list("rate");
        let tx_size = fields.integer("tx_size", 1);
        let duration = fields.integer("duration", 1);
        let runs = fields.optional_integer("runs", 1, 1);

        if let Some(workers) = workers {
            if workers > MAX_WORKERS {
                fields.violation("workers", format!("must be at most {}", MAX_WORKERS));
            }
        }
        if let (Some(faults), Some(nodes)) = (faults, nodes.as_ref()) {
            if let Some(&smallest) = nodes.iter().min() {
                if smallest <= faults {
                    fields.violation("faults", "there should be more nodes than faults");
                }
            }
        }

        fields.finish()?;
        match (faults, nodes, workers, collocate, rate, tx_size, duration, runs) {
            (
                Some(faults),
                Some(nodes),
                Some(workers),
                Some(collocate),
                Some(rate),
                Some(tx_size),
                Some(duration),
                Some(runs),
            ) => Ok(BenchParameters {
                faults: faults as usize,
                nodes: nodes.into_iter().map(|n| n as usize).collect(),
                workers: workers as usize,
                collocate,
                rate,
                tx_size,
                duration,
                runs: runs as usize,
            }),
            // `finish` already reported whatever is missing.
            _ => Err(ConfigError::single("bench", "incomplete parameters")),
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration)
    }

    /// The same sweep with a different fault count, re-validated.
    pub fn with_faults(&self, faults: usize) -> Result<Self, ConfigError> {
        let mut raw = serde_json::to_value(self)
            .map_err(|e| ConfigError::single("bench", e.to_string()))?;
        raw["faults"] = Value::from(faults);
        BenchParameters::validate(&raw)
    }
}

impl Default for BenchParameters {
    fn default() -> Self {
        BenchParameters {
            faults: 0,
            nodes: vec![4],
            workers: 1,
            collocate: true,
            rate: vec![50_000],
            tx_size: 512,
            duration: 20,
            runs: 1,
        }
    }
}

/// Protocol tuning shared read-only by every node of a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeParameters {
    /// Bytes.
    pub header_size: u64,
    /// Milliseconds.
    pub max_header_delay: u64,
    /// Rounds.
    pub gc_depth: u64,
    /// Milliseconds.
    pub sync_retry_delay: u64,
    /// Number of nodes.
    pub sync_retry_nodes: u64,
    /// Bytes.
    pub batch_size: u64,
    /// Milliseconds.
    pub max_batch_delay: u64,
    pub enable_verification: bool,
}

impl NodeParameters {
    /// Validates an arbitrary key/value mapping. `enable_verification` defaults to false
    /// for parameter files written before the flag existed.
    pub fn validate(raw: &Value) -> Result<Self, ConfigError> {
        let mut fields = Fields::new(raw)?;

        let header_size = fields.integer("header_size", 1);
        let max_header_delay = fields.integer("max_header_delay", 1);
        let gc_depth = fields.integer("gc_depth", 1);
        let sync_retry_delay = fields.integer("sync_retry_delay", 1);
        let sync_retry_nodes = fields.integer("sync_retry_nodes", 1);
        let batch_size = fields.integer("batch_size", 1);
        let max_batch_delay = fields.integer("max_batch_delay", 1);
        let enable_verification = fields.flag("enable_verification", Some(false));

        fields.finish()?;
        match (
            header_size,
            max_header_delay,
            gc_depth,
            sync_retry_delay,
            sync_retry_nodes,
            batch_size,
            max_batch_delay,
            enable_verification,
        ) {
            (
                Some(header_size),
                Some(max_header_delay),
                Some(gc_depth),
                Some(sync_retry_delay),
                Some(sync_retry_nodes),
                Some(batch_size),
                Some(max_batch_delay),
                Some(enable_verification),
            ) => Ok(NodeParameters {
                header_size,
                max_header_delay,
                gc_depth,
                sync_retry_delay,
                sync_retry_nodes,
                batch_size,
                max_batch_delay,
                enable_verification,
            }),
            _ => Err(ConfigError::single("node", "incomplete parameters")),
        }
    }

    pub fn to_json(&self) -> Result<String, BenchError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), BenchError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Loads and re-validates a parameters file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BenchError> {
        let data = std::fs::read_to_string(path)?;
        let raw: Value = serde_json::from_str(&data)?;
        Ok(NodeParameters::validate(&raw)?)
    }
}

impl Default for NodeParameters {
    fn default() -> Self {
        NodeParameters {
            header_size: 50,
            max_header_delay: 5_000,
            gc_depth: 50,
            sync_retry_delay: 10_000,
            sync_retry_nodes: 3,
            batch_size: 500_000,
            max_batch_delay: 200,
            enable_verification: false,
        }
    }
}

/// Collects typed fields out of a JSON object, remembering every problem it meets.
struct Fields<'a> {
    raw: &'a Map<String, Value>,
    violations: Vec<FieldViolation>,
}

impl<'a> Fields<'a> {
    fn new(raw: &'a Value) -> Result<Self, ConfigError> {
        match raw.as_object() {
            Some(raw) => Ok(Fields { raw, violations: Vec::new() }),
            None => Err(ConfigError::single("<root>", "expected a key/value mapping")),
        }
    }

    fn violation(&mut self, field: &str, reason: impl Into<String>) {
        self.violations.push(FieldViolation::new(field, reason));
    }

    fn check_integer(&mut self, field: &str, value: &Value, min: u64) -> Option<u64> {
        match value {
            Value::Number(n) if n.is_u64() => {
                let v = n.as_u64().unwrap_or_default();
                if v < min {
                    self.violation(field, format!("must be at least {}", min));
                    None
                } else {
                    Some(v)
                }
            }
            Value::Number(n) if n.is_i64() => {
                self.violation(field, format!("must be at least {}", min));
                None
            }
            _ => {
                self.violation(field, "expected an integer");
                None
            }
        }
    }

    fn integer(&mut self, field: &str, min: u64) -> Option<u64> {
        match self.raw.get(field) {
            Some(value) => self.check_integer(field, value, min),
            None => {
                self.violation(field, "missing");
                None
            }
        }
    }

    fn optional_integer(&mut self, field: &str, min: u64, default: u64) -> Option<u64> {
        match self.raw.get(field) {
            Some(value) => self.check_integer(field, value, min),
            None => Some(default),
        }
    }

    /// A positive integer or a non-empty list of positive integers.
    fn integer_list(&mut self, field: &str) -> Option<Vec<u64>> {
        match self.raw.get(field) {
            None => {
                self.violation(field, "missing");
                None
            }
            Some(Value::Array(items)) if items.is_empty() => {
                self.violation(field, "must not be empty");
                None
            }
            Some(Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                let mut ok = true;
                for (i, item) in items.iter().enumerate() {
                    match self.check_integer(&format!("{}[{}]", field, i), item, 1) {
                        Some(v) => out.push(v),
                        None => ok = false,
                    }
                }
                ok.then_some(out)
            }
            Some(value) => self.check_integer(field, value, 1).map(|v| vec![v]),
        }
    }

    fn flag(&mut self, field: &str, default: Option<bool>) -> Option<bool> {
        match (self.raw.get(field), default) {
            (Some(Value::Bool(b)), _) => Some(*b),
            (Some(_), _) => {
                self.violation(field, "expected a boolean");
                None
            }
            (None, Some(default)) => Some(default),
            (None, None) => {
                self.violation(field, "missing");
                None
            }
        }
    }

    fn finish(self) -> Result<(), ConfigError> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(ConfigError { violations: self.violations })
        }
    }
}
