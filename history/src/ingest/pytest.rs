//! pytest-benchmark reports, converted the way the dashboard's action does:
//! throughput is `ops` in `iter/sec`, the mean is shown in a readable unit.

use super::IngestorError;
use crate::model::{Latency, Measurement};
use serde::Deserialize;
use tracing::debug;

pub const UNIT: &str = "iter/sec";

#[derive(Deserialize, Debug)]
struct Report {
    benchmarks: Vec<Benchmark>,
}

#[derive(Deserialize, Debug)]
struct Benchmark {
    fullname: String,
    stats: Stats,
}

#[derive(Deserialize, Debug)]
struct Stats {
    mean: f64,
    stddev: f64,
    rounds: u64,
    ops: f64,
}

fn validate(benchmark: &Benchmark) -> Result<(), IngestorError> {
    let reason = if benchmark.fullname.is_empty() {
        "fullname is empty"
    } else if !benchmark.stats.ops.is_finite() || benchmark.stats.ops < 0.0 {
        "ops is not a finite, non-negative number"
    } else if !benchmark.stats.mean.is_finite() || benchmark.stats.mean < 0.0 {
        "mean is not a finite, non-negative number"
    } else if !benchmark.stats.stddev.is_finite() || benchmark.stats.stddev < 0.0 {
        "stddev is not a finite, non-negative number"
    } else {
        return Ok(());
    };

    Err(IngestorError::InvalidBenchmark {
        name: benchmark.fullname.clone(),
        reason,
    })
}

pub fn ingest(output: &str) -> Result<Vec<Measurement>, IngestorError> {
    let report: Report = serde_json::from_str(output)?;
    debug!("pytest report with {} benchmarks", report.benchmarks.len());

    report
        .benchmarks
        .into_iter()
        .map(|benchmark| {
            validate(&benchmark)?;

            Ok(Measurement {
                name: benchmark.fullname,
                value: benchmark.stats.ops,
                unit: UNIT.to_owned(),
                stddev: benchmark.stats.stddev,
                mean_latency: Latency::from_secs_f64(benchmark.stats.mean),
                sample_count: benchmark.stats.rounds,
            })
        })
        .collect()
}
