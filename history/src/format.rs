//! Codec for the dashboard history document (`data.js`).
//!
//! The document keeps free text `range` and `extra` strings per benchmark.
//! They are parsed into typed fields once when a document is read and are only
//! rendered back to text when a document is written.

use crate::model::{Commit, EpochMillis, Latency, Measurement, Person, Run};
use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Assignment the dashboard expects in front of the JSON payload
pub const JS_PREFIX: &str = "window.BENCHMARK_DATA = ";
const JS_VARIABLE: &str = "window.BENCHMARK_DATA";

pub const DEFAULT_SUITE: &str = "Benchmark";

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Failed to (de)serialize history record: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Benchmark {name}: field `{field}` is malformed ({value:?})")]
    Field {
        name: String,
        field: &'static str,
        value: String,
    },
    #[error("Commit {commit}: timestamp {value:?} is not ISO-8601")]
    Timestamp {
        commit: String,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("Run for commit {commit} records {name} more than once")]
    DuplicateMeasurement { commit: String, name: String },
    #[error("Suite {suite} records commit {commit} more than once")]
    DuplicateCommit { suite: String, commit: String },
}

#[derive(Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    last_update: EpochMillis,
    repo_url: String,
    entries: BTreeMap<String, serde_json::Value>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
struct RawEntry {
    commit: RawCommit,
    date: EpochMillis,
    tool: String,
    benches: Vec<RawBench>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
struct RawCommit {
    author: Person,
    committer: Person,
    distinct: bool,
    id: String,
    message: String,
    timestamp: String,
    tree_id: String,
    url: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
struct RawBench {
    name: String,
    value: f64,
    unit: String,
    range: String,
    extra: String,
}

impl TryFrom<RawCommit> for Commit {
    type Error = FormatError;

    fn try_from(raw: RawCommit) -> Result<Self, Self::Error> {
        let timestamp = DateTime::parse_from_rfc3339(&raw.timestamp).map_err(|source| {
            FormatError::Timestamp {
                commit: raw.id.clone(),
                value: raw.timestamp.clone(),
                source,
            }
        })?;

        Ok(Self {
            id: raw.id,
            message: raw.message,
            author: raw.author,
            committer: raw.committer,
            timestamp,
            distinct: raw.distinct,
            tree_id: raw.tree_id,
            url: raw.url,
        })
    }
}

impl From<&Commit> for RawCommit {
    fn from(commit: &Commit) -> Self {
        Self {
            author: commit.author.clone(),
            committer: commit.committer.clone(),
            distinct: commit.distinct,
            id: commit.id.clone(),
            message: commit.message.clone(),
            timestamp: render_timestamp(commit),
            tree_id: commit.tree_id.clone(),
            url: commit.url.clone(),
        }
    }
}

/// ISO-8601 rendering used in documents and SQLite rows, UTC is written as `Z`
pub fn render_timestamp(commit: &Commit) -> String {
    commit.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn malformed(name: &str, field: &'static str, value: &str) -> FormatError {
    FormatError::Field {
        name: name.to_owned(),
        field,
        value: value.to_owned(),
    }
}

/// parse `stddev: <float>`
pub fn parse_range(name: &str, range: &str) -> Result<f64, FormatError> {
    range
        .trim()
        .strip_prefix("stddev:")
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|stddev| stddev.is_finite() && *stddev >= 0.0)
        .ok_or_else(|| malformed(name, "range", range))
}

/// parse `mean: <float> <unit>\nrounds: <int>`
pub fn parse_extra(name: &str, extra: &str) -> Result<(Latency, u64), FormatError> {
    let mut mean = None;
    let mut rounds = None;

    for line in extra.lines().map(str::trim).filter(|line| !line.is_empty()) {
        match line.split_once(':') {
            Some(("mean", value)) => {
                let (magnitude, unit) = value
                    .trim()
                    .split_once(' ')
                    .ok_or_else(|| malformed(name, "extra.mean", value))?;

                mean = Some(Latency::new(
                    magnitude
                        .parse::<f64>()
                        .ok()
                        .filter(|mean| mean.is_finite() && *mean >= 0.0)
                        .ok_or_else(|| malformed(name, "extra.mean", magnitude))?,
                    unit.trim()
                        .parse()
                        .map_err(|_| malformed(name, "extra.mean", unit))?,
                ));
            }
            Some(("rounds", value)) => {
                rounds = Some(
                    value
                        .trim()
                        .parse()
                        .map_err(|_| malformed(name, "extra.rounds", value))?,
                );
            }
            _ => return Err(malformed(name, "extra", line)),
        }
    }

    match (mean, rounds) {
        (Some(mean), Some(rounds)) => Ok((mean, rounds)),
        _ => Err(malformed(name, "extra", extra)),
    }
}

impl TryFrom<RawBench> for Measurement {
    type Error = FormatError;

    fn try_from(raw: RawBench) -> Result<Self, Self::Error> {
        let stddev = parse_range(&raw.name, &raw.range)?;
        let (mean_latency, sample_count) = parse_extra(&raw.name, &raw.extra)?;

        Ok(Self {
            name: raw.name,
            value: raw.value,
            unit: raw.unit,
            stddev,
            mean_latency,
            sample_count,
        })
    }
}

impl From<&Measurement> for RawBench {
    fn from(measurement: &Measurement) -> Self {
        Self {
            name: measurement.name.clone(),
            value: measurement.value,
            unit: measurement.unit.clone(),
            range: format!("stddev: {}", measurement.stddev),
            extra: format!(
                "mean: {}\nrounds: {}",
                measurement.mean_latency, measurement.sample_count
            ),
        }
    }
}

impl TryFrom<RawEntry> for Run {
    type Error = FormatError;

    fn try_from(raw: RawEntry) -> Result<Self, Self::Error> {
        let run = Self {
            commit: raw.commit.try_into()?,
            recorded_at: raw.date,
            tool: raw.tool,
            measurements: raw
                .benches
                .into_iter()
                .map(Measurement::try_from)
                .collect::<Result<_, _>>()?,
        };

        match run.duplicate_measurement() {
            Some(name) => Err(FormatError::DuplicateMeasurement {
                commit: run.commit.id.clone(),
                name: name.to_owned(),
            }),
            None => Ok(run),
        }
    }
}

impl From<&Run> for RawEntry {
    fn from(run: &Run) -> Self {
        Self {
            commit: (&run.commit).into(),
            date: run.recorded_at,
            tool: run.tool.clone(),
            benches: run.measurements.iter().map(RawBench::from).collect(),
        }
    }
}

/// Parse a commit object as found in a push event (`head_commit`)
pub fn parse_commit(text: &str) -> Result<Commit, FormatError> {
    serde_json::from_str::<RawCommit>(text)?.try_into()
}

/// Split off the dashboard assignment, if any
pub fn strip_js_prefix(text: &str) -> (&str, bool) {
    let trimmed = text.trim();

    match trimmed
        .strip_prefix(JS_VARIABLE)
        .and_then(|rest| rest.trim_start().strip_prefix('='))
    {
        Some(payload) => (payload.trim().trim_end_matches(';').trim_end(), true),
        None => (trimmed, false),
    }
}

/// In-memory form of a history document, one suite is typed, the rest is kept
/// as it was read
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub last_update: EpochMillis,
    pub repo_url: String,
    pub suite: String,
    pub runs: Vec<Run>,
    pub other_suites: BTreeMap<String, serde_json::Value>,
}

impl Document {
    pub fn new(suite: &str, repo_url: &str) -> Self {
        Self {
            last_update: 0,
            repo_url: repo_url.to_owned(),
            suite: suite.to_owned(),
            runs: Vec::new(),
            other_suites: BTreeMap::new(),
        }
    }

    /// Parse a document and type the runs of `suite`, rejecting the whole
    /// document if any of its records is malformed
    pub fn parse(text: &str, suite: &str) -> Result<Self, FormatError> {
        let (payload, _) = strip_js_prefix(text);
        let mut raw: RawDocument = serde_json::from_str(payload)?;

        let runs = match raw.entries.remove(suite) {
            Some(value) => serde_json::from_value::<Vec<RawEntry>>(value)?
                .into_iter()
                .map(Run::try_from)
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let mut seen = BTreeSet::new();
        if let Some(run) = runs.iter().find(|run| !seen.insert(run.commit_id())) {
            return Err(FormatError::DuplicateCommit {
                suite: suite.to_owned(),
                commit: run.commit_id().to_owned(),
            });
        }

        Ok(Self {
            last_update: raw.last_update,
            repo_url: raw.repo_url,
            suite: suite.to_owned(),
            runs,
            other_suites: raw.entries,
        })
    }

    /// Render the document, optionally as the dashboard's `data.js`
    pub fn render(&self, js_prefix: bool) -> Result<String, FormatError> {
        let mut entries = self.other_suites.clone();
        entries.insert(
            self.suite.clone(),
            serde_json::to_value(self.runs.iter().map(RawEntry::from).collect::<Vec<_>>())?,
        );

        let payload = serde_json::to_string_pretty(&RawDocument {
            last_update: self.last_update,
            repo_url: self.repo_url.clone(),
            entries,
        })?;

        Ok(if js_prefix {
            format!("{JS_PREFIX}{payload}")
        } else {
            payload
        })
    }
}
