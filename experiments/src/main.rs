// experiments/src/main.rs
// Driver for the benchmark harness: generates the files a local testbed needs and
// summarizes the logs a run left behind.

use consensus_bench::{
    config::{BenchParameters, NodeParameters},
    data_structures::{expected_roles, LogRole, RawLogBundle},
    keys::{generate_identities, RandomKeys},
    logs::aggregate,
    orchestrator::committee_for,
    topology::{parse_hosts, DEFAULT_BASE_PORT},
    BenchError,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

const USAGE: &str = "\
usage:
  experiments config <hosts-file> [out-dir]
  experiments logs <log-dir> [faults]";

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let result = match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["config", hosts] => generate_config(Path::new(hosts), Path::new(".")),
        ["config", hosts, out] => generate_config(Path::new(hosts), Path::new(out)),
        ["logs", dir] => summarize_logs(Path::new(dir), 0),
        ["logs", dir, faults] => match faults.parse() {
            Ok(faults) => summarize_logs(Path::new(dir), faults),
            Err(_) => {
                eprintln!("faults must be a non-negative integer, got {:?}", faults);
                return ExitCode::FAILURE;
            }
        },
        _ => {
            eprintln!("{}", USAGE);
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// One fresh identity per host, the committee over all hosts and default node
/// parameters, written next to each other in `out`.
fn generate_config(hosts_file: &Path, out: &Path) -> Result<(), BenchError> {
    let hosts = parse_hosts(&std::fs::read_to_string(hosts_file)?);
    let bench = BenchParameters { nodes: vec![hosts.len().max(1)], ..BenchParameters::default() };
    let identities = generate_identities(&mut RandomKeys, hosts.len());
    let committee = committee_for(&bench, &hosts, &identities, DEFAULT_BASE_PORT)?;

    std::fs::create_dir_all(out)?;
    let key_files: Vec<PathBuf> = (0..identities.len()).map(|i| out.join(format!(".node-{}.json", i))).collect();
    for (identity, path) in identities.iter().zip(&key_files) {
        identity.save(path)?;
    }
    committee.save(out.join(".committee.json"))?;
    NodeParameters::default().save(out.join(".parameters.json"))?;

    log::info!(
        "Wrote {} key files, committee ({} hosts) and parameters to {}",
        key_files.len(),
        committee.hosts().len(),
        out.display()
    );
    Ok(())
}

/// Aggregates every `<role>.log` of `dir`. The expected roles are inferred from the
/// highest node and worker indices present.
fn summarize_logs(dir: &Path, faults: usize) -> Result<(), BenchError> {
    let bundle = RawLogBundle::from_dir(dir)?;
    let mut nodes = 0;
    let mut workers = 1;
    for (role, _) in bundle.present() {
        nodes = nodes.max(role.node() + 1);
        if let LogRole::Worker(_, j) = role {
            workers = workers.max(j + 1);
        }
    }
    log::info!("Found {} logs for {} nodes in {}", bundle.len(), nodes, dir.display());

    // Logs on disk carry no run duration, so the window never closes.
    let summary = aggregate(&bundle, &expected_roles(nodes, workers), faults, Duration::MAX)?;
    print!("{}", summary.render());
    Ok(())
}
