// consensus-bench/src/data_structures.rs

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::ParseError;

/// One concrete point of a sweep.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunDescriptor {
    pub nodes: usize,
    pub faults: usize,
    pub rate: u64,
    pub repetition: usize,
}

impl fmt::Display for RunDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} nodes, {} faults, {} tx/s, run {}",
            self.nodes, self.faults, self.rate, self.repetition
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoleKind {
    Primary,
    Worker,
    Client,
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoleKind::Primary => "primary",
            RoleKind::Worker => "worker",
            RoleKind::Client => "client",
        };
        f.write_str(name)
    }
}

/// Which process a log came from. Node indices follow committee order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogRole {
    Primary(usize),
    /// (node, worker)
    Worker(usize, usize),
    Client(usize),
}

impl LogRole {
    pub fn kind(&self) -> RoleKind {
        match self {
            LogRole::Primary(_) => RoleKind::Primary,
            LogRole::Worker(..) => RoleKind::Worker,
            LogRole::Client(_) => RoleKind::Client,
        }
    }

    pub fn node(&self) -> usize {
        match *self {
            LogRole::Primary(i) | LogRole::Worker(i, _) | LogRole::Client(i) => i,
        }
    }
}

impl fmt::Display for LogRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogRole::Primary(i) => write!(f, "primary-{}", i),
            LogRole::Worker(i, j) => write!(f, "worker-{}-{}", i, j),
            LogRole::Client(i) => write!(f, "client-{}", i),
        }
    }
}

impl FromStr for LogRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || format!("unknown log role '{}'", s);
        let mut parts = s.split('-');
        let kind = parts.next().ok_or_else(bad)?;
        let indices = parts
            .map(|p| p.parse::<usize>().map_err(|_| bad()))
            .collect::<Result<Vec<_>, _>>()?;
        match (kind, indices.as_slice()) {
            ("primary", [i]) => Ok(LogRole::Primary(*i)),
            ("worker", [i, j]) => Ok(LogRole::Worker(*i, *j)),
            ("client", [i]) => Ok(LogRole::Client(*i)),
            _ => Err(bad()),
        }
    }
}

/// Every log a run of `nodes` nodes with `workers` workers each is expected to leave.
pub fn expected_roles(nodes: usize, workers: usize) -> BTreeSet<LogRole> {
    let mut roles = BTreeSet::new();
    for i in 0..nodes {
        roles.insert(LogRole::Primary(i));
        roles.insert(LogRole::Client(i));
        for j in 0..workers {
            roles.insert(LogRole::Worker(i, j));
        }
    }
    roles
}

/// Log texts retrieved after one run. `None` marks a process whose log could not be
/// fetched (unreachable host, crashed process).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawLogBundle {
    logs: BTreeMap<LogRole, Option<String>>,
}

impl RawLogBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, role: LogRole, content: impl Into<String>) {
        self.logs.insert(role, Some(content.into()));
    }

    pub fn mark_missing(&mut self, role: LogRole) {
        self.logs.insert(role, None);
    }

    /// Present log text for `role`, if any.
    pub fn get(&self, role: &LogRole) -> Option<&str> {
        self.logs.get(role).and_then(|c| c.as_deref())
    }

    pub fn present(&self) -> impl Iterator<Item = (&LogRole, &str)> {
        self.logs.iter().filter_map(|(role, c)| c.as_deref().map(|c| (role, c)))
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    /// Reads every `<role>.log` file of a directory. Other files are ignored; a
    /// directory without any role log is an error.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, ParseError> {
        let dir = dir.as_ref();
        let unreadable = |reason: String| ParseError::Unreadable {
            path: dir.display().to_string(),
            reason,
        };
        let mut bundle = RawLogBundle::new();
        for entry in std::fs::read_dir(dir).map_err(|e| unreadable(e.to_string()))? {
            let path = entry.map_err(|e| unreadable(e.to_string()))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("log") {
                continue;
            }
            let Some(role) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<LogRole>().ok())
            else {
                log::debug!("Skipping {} (not a role log)", path.display());
                continue;
            };
            let content = std::fs::read_to_string(&path).map_err(|e| ParseError::Unreadable {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            bundle.insert(role, content);
        }
        if bundle.is_empty() {
            return Err(ParseError::NoRoleLogs(dir.display().to_string()));
        }
        Ok(bundle)
    }
}
