use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// epoch timestamp in milliseconds, as written by the benchmark job
pub type EpochMillis = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Provenance of a run, mirrors the commit object of a push event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    pub message: String,
    pub author: Person,
    pub committer: Person,
    pub timestamp: DateTime<FixedOffset>,
    pub distinct: bool,
    pub tree_id: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyUnit {
    Nsec,
    Usec,
    Msec,
    Sec,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown latency unit {0:?}")]
pub struct UnknownUnit(pub String);

impl LatencyUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nsec => "nsec",
            Self::Usec => "usec",
            Self::Msec => "msec",
            Self::Sec => "sec",
        }
    }

    /// number of units in one second
    pub fn per_second(&self) -> f64 {
        match self {
            Self::Nsec => 1.0e9,
            Self::Usec => 1.0e6,
            Self::Msec => 1.0e3,
            Self::Sec => 1.0,
        }
    }
}

impl FromStr for LatencyUnit {
    type Err = UnknownUnit;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "nsec" => Ok(Self::Nsec),
            "usec" => Ok(Self::Usec),
            "msec" => Ok(Self::Msec),
            "sec" => Ok(Self::Sec),
            other => Err(UnknownUnit(other.to_owned())),
        }
    }
}

impl fmt::Display for LatencyUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mean latency as reported by the harness, magnitude and unit are kept apart
/// so the value written back is exactly the value read
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Latency {
    pub value: f64,
    pub unit: LatencyUnit,
}

impl Latency {
    pub fn new(value: f64, unit: LatencyUnit) -> Self {
        Self { value, unit }
    }

    /// Pick the human readable unit for a duration given in seconds
    pub fn from_secs_f64(seconds: f64) -> Self {
        let unit = if seconds < 1.0e-6 {
            LatencyUnit::Nsec
        } else if seconds < 1.0e-3 {
            LatencyUnit::Usec
        } else if seconds < 1.0 {
            LatencyUnit::Msec
        } else {
            LatencyUnit::Sec
        };

        Self {
            value: seconds * unit.per_second(),
            unit,
        }
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.value / self.unit.per_second()
    }
}

impl fmt::Display for Latency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

/// One named statistic within a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub stddev: f64,
    pub mean_latency: Latency,
    pub sample_count: u64,
}

impl Measurement {
    /// first statistic that is not a finite, non-negative number, these can't
    /// be written to the history document and read back
    pub fn invalid_statistic(&self) -> Option<(&'static str, f64)> {
        [
            ("value", self.value),
            ("stddev", self.stddev),
            ("mean_latency", self.mean_latency.value),
        ]
        .into_iter()
        .find(|(_, statistic)| !statistic.is_finite() || *statistic < 0.0)
    }
}

/// One execution of the benchmark suite at a specific commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub commit: Commit,
    pub recorded_at: EpochMillis,
    pub tool: String,
    pub measurements: Vec<Measurement>,
}

impl Run {
    pub fn commit_id(&self) -> &str {
        &self.commit.id
    }

    pub fn measurement(&self, name: &str) -> Option<&Measurement> {
        self.measurements
            .iter()
            .find(|measurement| measurement.name == name)
    }

    /// first measurement name that occurs more than once
    pub fn duplicate_measurement(&self) -> Option<&str> {
        self.measurements
            .iter()
            .enumerate()
            .find(|(index, measurement)| {
                self.measurements[..*index]
                    .iter()
                    .any(|earlier| earlier.name == measurement.name)
            })
            .map(|(_, measurement)| measurement.name.as_str())
    }
}

/// A single point of a measurement series
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint<'a> {
    pub commit_id: &'a str,
    pub recorded_at: EpochMillis,
    pub value: f64,
    pub stddev: f64,
}

/// Half open window `[since, until)` over commit timestamps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitWindow {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl CommitWindow {
    pub fn new(since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        Self { since, until }
    }

    pub fn contains(&self, timestamp: &DateTime<FixedOffset>) -> bool {
        let timestamp = timestamp.with_timezone(&Utc);

        self.since.map_or(true, |since| since <= timestamp)
            && self.until.map_or(true, |until| timestamp < until)
    }
}
