// consensus-bench/src/topology.rs

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::Path;

use crate::error::{BenchError, ConfigError, FieldViolation, TopologyError};
use crate::keys::{public_key_from_name, Identity};

/// Port the original deployment scripts used for the first authority.
pub const DEFAULT_BASE_PORT: u16 = 3000;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Where an authority's processes listen.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Addresses {
    /// One endpoint; workers live elsewhere.
    Single(Endpoint),
    /// Index 0 is the primary, 1..=workers are its workers, all on the same host.
    Collocated(Vec<Endpoint>),
}

impl Addresses {
    pub fn endpoints(&self) -> &[Endpoint] {
        match self {
            Addresses::Single(endpoint) => std::slice::from_ref(endpoint),
            Addresses::Collocated(endpoints) => endpoints,
        }
    }

    /// `None` only for a hand-edited committee with an empty endpoint list.
    pub fn primary(&self) -> Option<&Endpoint> {
        self.endpoints().first()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authority {
    pub name: String,
    pub stake: u32,
    pub addresses: Addresses,
}

/// Name → endpoint(s) for every node of one deployment, in node-index order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Committee {
    pub base_port: u16,
    pub authorities: Vec<Authority>,
}

impl Committee {
    pub fn size(&self) -> usize {
        self.authorities.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.authorities.iter().map(|a| a.name.as_str())
    }

    /// Distinct hosts used by this committee.
    pub fn hosts(&self) -> BTreeSet<&str> {
        self.authorities
            .iter()
            .filter_map(|a| a.addresses.primary().map(|e| e.host.as_str()))
            .collect()
    }

    /// The first `count` authorities. Membership is a stable prefix, never resampled,
    /// so repeated runs at the same size always see the same nodes.
    pub fn slice(&self, count: usize) -> Result<Committee, TopologyError> {
        if count > self.authorities.len() {
            return Err(TopologyError::NotEnoughNodes {
                available: self.authorities.len(),
                requested: count,
            });
        }
        Ok(Committee {
            base_port: self.base_port,
            authorities: self.authorities[..count].to_vec(),
        })
    }

    pub fn to_json(&self) -> Result<String, BenchError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), BenchError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Loads a committee file and re-checks it with [`Committee::verify`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BenchError> {
        let data = std::fs::read_to_string(path)?;
        let committee: Committee = serde_json::from_str(&data)?;
        committee.verify()?;
        Ok(committee)
    }

    /// Checks a committee that did not come out of [`build`]: every name decodes to a
    /// public key and appears once, every authority has an endpoint, and no endpoint
    /// is shared.
    pub fn verify(&self) -> Result<(), ConfigError> {
        let mut violations = Vec::new();
        let mut names = HashSet::new();
        let mut endpoints = HashSet::new();
        for (i, authority) in self.authorities.iter().enumerate() {
            let name_field = format!("authorities[{}].name", i);
            let addresses_field = format!("authorities[{}].addresses", i);
            if public_key_from_name(&authority.name).is_none() {
                violations.push(FieldViolation::new(&name_field, "not a hex-encoded public key"));
            }
            if !names.insert(authority.name.as_str()) {
                violations.push(FieldViolation::new(&name_field, "appears more than once"));
            }
            if authority.addresses.endpoints().is_empty() {
                violations.push(FieldViolation::new(&addresses_field, "no endpoints"));
            }
            for endpoint in authority.addresses.endpoints() {
                if !endpoints.insert(endpoint) {
                    violations.push(FieldViolation::new(&addresses_field, format!("{} is assigned twice", endpoint)));
                }
            }
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ConfigError { violations })
        }
    }
}

/// Builds the committee for `hosts` and `identities`, zipped in input order.
///
/// Under collocation node `i` gets `workers + 1` endpoints on its own host with ports
/// `base_port + i * (workers + 1) + role` (role 0 is the primary). Without collocation
/// every node gets a single endpoint at `base_port`. Port uniqueness is verified on the
/// result, so a host listed twice is reported instead of silently clashing.
pub fn build(
    hosts: &[String],
    identities: &[Identity],
    collocate: bool,
    workers: usize,
    base_port: u16,
) -> Result<Committee, TopologyError> {
    if hosts.len() != identities.len() {
        return Err(TopologyError::CardinalityMismatch {
            hosts: hosts.len(),
            identities: identities.len(),
        });
    }
    if collocate && workers < 1 {
        return Err(TopologyError::NoWorkers);
    }

    let mut names = HashSet::new();
    for identity in identities {
        if !names.insert(identity.name.as_str()) {
            return Err(TopologyError::DuplicateName(identity.name.clone()));
        }
    }

    let mut authorities = Vec::with_capacity(identities.len());
    for (index, (identity, host)) in identities.iter().zip(hosts).enumerate() {
        let addresses = if collocate {
            let overflow = TopologyError::PortOverflow { node: index };
            let stride = workers.checked_add(1).ok_or_else(|| overflow.clone())?;
            let first = index.checked_mul(stride).ok_or_else(|| overflow.clone())?;
            let endpoints = (0..stride)
                .map(|role| {
                    first
                        .checked_add(role)
                        .and_then(|offset| port_at(base_port, offset))
                        .map(|port| Endpoint { host: host.clone(), port })
                        .ok_or_else(|| overflow.clone())
                })
                .collect::<Result<Vec<_>, _>>()?;
            Addresses::Collocated(endpoints)
        } else {
            Addresses::Single(Endpoint { host: host.clone(), port: base_port })
        };
        authorities.push(Authority { name: identity.name.clone(), stake: 1, addresses });
    }

    let committee = Committee { base_port, authorities };
    check_unique_endpoints(&committee)?;
    log::debug!(
        "Built committee of {} authorities over {} hosts (collocate={})",
        committee.size(),
        committee.hosts().len(),
        collocate
    );
    Ok(committee)
}

fn port_at(base_port: u16, offset: usize) -> Option<u16> {
    let offset = u16::try_from(offset).ok()?;
    base_port.checked_add(offset)
}

fn check_unique_endpoints(committee: &Committee) -> Result<(), TopologyError> {
    let mut seen = HashSet::new();
    for authority in &committee.authorities {
        for endpoint in authority.addresses.endpoints() {
            if !seen.insert(endpoint) {
                return Err(TopologyError::PortCollision(endpoint.to_string()));
            }
        }
    }
    Ok(())
}

/// Reads a host pool: one address per line, blank lines ignored.
pub fn parse_hosts(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
