pub mod pytest;


use crate::model::Measurement;
use clap::ValueEnum;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum IngestorError {
    #[error("Failed to deserialize pytest-benchmark report")]
    DeserializePytest(#[from] serde_json::Error),
    #[error("Failed to deserialize measurements")]
    DeserializeNative(#[from] serde_yaml::Error),
    #[error("Benchmark {name}: {reason}")]
    InvalidBenchmark { name: String, reason: &'static str },
    #[error("Tool output contains no benchmarks")]
    Empty,
}

/// Harness output formats that can be turned into measurements
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Ingestors {
    /// pytest-benchmark `--benchmark-json` report
    Pytest,
    /// list of measurements in the store's own shape, YAML or JSON
    Native,
}

impl Ingestors {
    /// tool name recorded with runs produced by this ingestor
    pub fn tool(&self) -> &'static str {
        match self {
            Self::Pytest => "pytest",
            Self::Native => "native",
        }
    }

    #[tracing::instrument(level = "debug", skip(output))]
    pub fn ingest(&self, output: &str) -> Result<Vec<Measurement>, IngestorError> {
        let measurements = match self {
            Self::Pytest => pytest::ingest(output)?,
            Self::Native => match serde_yaml::from_str::<Vec<Measurement>>(output) {
                Ok(measurements) => measurements,
                Err(error) => {
                    error!(error = ?error, "Failed to deserialize measurements for native ingestor");

                    return Err(IngestorError::DeserializeNative(error));
                }
            },
        };

        if measurements.is_empty() {
            return Err(IngestorError::Empty);
        }

        for measurement in &measurements {
            if let Some((field, _)) = measurement.invalid_statistic() {
                return Err(IngestorError::InvalidBenchmark {
                    name: measurement.name.clone(),
                    reason: match field {
                        "value" => "value is not a finite, non-negative number",
                        "stddev" => "stddev is not a finite, non-negative number",
                        _ => "mean latency is not a finite, non-negative number",
                    },
                });
            }
        }

        Ok(measurements)
    }
}
