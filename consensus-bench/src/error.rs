// consensus-bench/src/error.rs

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// A single field that failed validation, with the reason it was rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub reason: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        FieldViolation { field: field.into(), reason: reason.into() }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Malformed or contradictory bench/node parameters, or an inconsistent committee file.
/// Carries every violation found, not just the first one.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub struct ConfigError {
    pub violations: Vec<FieldViolation>,
}

impl ConfigError {
    pub fn single(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError { violations: vec![FieldViolation::new(field, reason)] }
    }

    /// True if any violation concerns `field`.
    pub fn mentions(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listed: Vec<String> = self.violations.iter().map(|v| v.to_string()).collect();
        write!(f, "invalid parameters: {}", listed.join("; "))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("{hosts} hosts for {identities} identities")]
    CardinalityMismatch { hosts: usize, identities: usize },

    #[error("collocation needs at least one worker per node")]
    NoWorkers,

    #[error("identity {0} appears more than once")]
    DuplicateName(String),

    #[error("endpoint {0} is assigned twice")]
    PortCollision(String),

    #[error("port for node {node} overflows the u16 range")]
    PortOverflow { node: usize },

    #[error("committee has {available} authorities, run needs {requested}")]
    NotEnoughNodes { available: usize, requested: usize },
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("run timed out after {0:?}")]
    Timeout(Duration),

    #[error("host {0} is unreachable")]
    Unreachable(String),

    #[error("process {0} crashed")]
    Crashed(String),

    #[error("sweep cancelled before the run returned")]
    Cancelled,

    #[error("execution failed: {0}")]
    Other(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no {0} logs present and no faults tolerated")]
    NoLogs(String),

    #[error("no role logs found in {0}")]
    NoRoleLogs(String),

    #[error("failed to read log {path}: {reason}")]
    Unreadable { path: String, reason: String },
}

/// Umbrella error for everything the harness can surface to a caller.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("invalid key file: {0}")]
    KeyFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
