// consensus-bench/src/logs/parser.rs

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::data_structures::LogRole;

pub type Timestamp = DateTime<Utc>;

/// A structured event found in a node or client log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogEvent {
    /// A worker sealed a batch.
    BatchCreated { batch: String, tx_count: u64, at: Timestamp },
    /// A node received a batch (logged by every receiver).
    BatchDelivered { batch: String, at: Timestamp },
    /// A primary committed a block referencing these batches.
    BlockCommitted { block: String, batches: Vec<String>, at: Timestamp },
    /// A client sent a sample transaction.
    SampleSent { tx: u64, at: Timestamp },
    /// A worker put a sample transaction in a batch.
    SampleInBatch { tx: u64, batch: String, at: Timestamp },
}

/// Everything extracted from one log text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedLog {
    pub role: LogRole,
    pub events: Vec<LogEvent>,
    /// Lines that are not valid log entries (truncated writes, garbage).
    pub malformed: usize,
    /// ERROR lines and panics.
    pub errors: Vec<String>,
    pub tx_size: Option<u64>,
    pub rate: Option<u64>,
    pub start: Option<Timestamp>,
}

/// Line-oriented scanner for the harness log format:
/// `[<rfc3339> <LEVEL> <target>] <message>`.
pub struct LogParser {
    header: Regex,
    batch_created: Regex,
    batch_delivered: Regex,
    block_committed: Regex,
    sample_sent: Regex,
    sample_in_batch: Regex,
    tx_size: Regex,
    tx_rate: Regex,
}

impl Default for LogParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LogParser {
    pub fn new() -> Self {
        let re = |pattern: &str| Regex::new(pattern).expect("log pattern is a valid regex");
        LogParser {
            header: re(r"^\[(?P<ts>\S+)\s+(?P<level>[A-Z]+)\s+(?P<target>[^\]]*)\]\s?(?P<msg>.*)$"),
            batch_created: re(r"^Batch (?P<id>\S+) created with (?P<n>\d+) tx"),
            batch_delivered: re(r"^Batch (?P<id>\S+) delivered"),
            block_committed: re(r"^Committed block (?P<id>\S+) -> \[(?P<batches>[^\]]*)\]"),
            sample_sent: re(r"^Sending sample transaction (?P<tx>\d+)"),
            sample_in_batch: re(r"^Batch (?P<id>\S+) contains sample tx (?P<tx>\d+)"),
            tx_size: re(r"^Transactions size: (?P<n>\d+) B"),
            tx_rate: re(r"^Transactions rate: (?P<n>\d+) tx/s"),
        }
    }

    pub fn parse(&self, role: LogRole, content: &str) -> ParsedLog {
        let mut parsed = ParsedLog {
            role,
            events: Vec::new(),
            malformed: 0,
            errors: Vec::new(),
            tx_size: None,
            rate: None,
            start: None,
        };

        for line in content.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            match self.parse_line(line, &mut parsed) {
                Ok(()) => {}
                Err(()) => parsed.malformed += 1,
            }
        }

        if parsed.malformed > 0 {
            log::debug!("{}: skipped {} malformed lines", role, parsed.malformed);
        }
        parsed
    }

    fn parse_line(&self, line: &str, parsed: &mut ParsedLog) -> Result<(), ()> {
        let caps = self.header.captures(line).ok_or(())?;
        let at = DateTime::parse_from_rfc3339(&caps["ts"]).map_err(|_| ())?.with_timezone(&Utc);
        let level = &caps["level"];
        let msg = &caps["msg"];

        if level == "ERROR" || msg.contains("panicked") {
            parsed.errors.push(msg.to_string());
        }

        if let Some(c) = self.sample_in_batch.captures(msg) {
            let tx = c["tx"].parse().map_err(|_| ())?;
            parsed.events.push(LogEvent::SampleInBatch { tx, batch: c["id"].to_string(), at });
        } else if let Some(c) = self.batch_created.captures(msg) {
            let tx_count = c["n"].parse().map_err(|_| ())?;
            parsed.events.push(LogEvent::BatchCreated { batch: c["id"].to_string(), tx_count, at });
        } else if let Some(c) = self.batch_delivered.captures(msg) {
            parsed.events.push(LogEvent::BatchDelivered { batch: c["id"].to_string(), at });
        } else if let Some(c) = self.block_committed.captures(msg) {
            let batches = c["batches"]
                .split(',')
                .map(str::trim)
                .filter(|b| !b.is_empty())
                .map(str::to_string)
                .collect();
            parsed.events.push(LogEvent::BlockCommitted { block: c["id"].to_string(), batches, at });
        } else if let Some(c) = self.sample_sent.captures(msg) {
            let tx = c["tx"].parse().map_err(|_| ())?;
            parsed.events.push(LogEvent::SampleSent { tx, at });
        } else if let Some(c) = self.tx_size.captures(msg) {
            parsed.tx_size = Some(c["n"].parse().map_err(|_| ())?);
        } else if let Some(c) = self.tx_rate.captures(msg) {
            parsed.rate = Some(c["n"].parse().map_err(|_| ())?);
        } else if msg.starts_with("Start sending transactions") {
            parsed.start.get_or_insert(at);
        }
        Ok(())
    }
}
