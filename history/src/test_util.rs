use crate::model::{Commit, Latency, LatencyUnit, Measurement, Person, Run};
use chrono::DateTime;

pub const DATA_JS: &str = include_str!("../tests/fixtures/data.js");
pub const CORE: &str = "tests/performance/test_benchmark.py::test_core_operations";
pub const DATA: &str = "tests/performance/test_benchmark.py::test_data_processing";
pub const MEMORY: &str = "tests/performance/test_benchmark.py::test_memory_operations";

pub fn person(name: &str) -> Person {
    Person {
        name: name.to_owned(),
        email: format!("{name}@users.noreply.github.com"),
        username: Some(name.to_owned()),
    }
}

pub fn commit(id: &str, timestamp: &str) -> Commit {
    Commit {
        id: id.to_owned(),
        message: format!("change {id}"),
        author: person("flip555"),
        committer: person("flip555"),
        timestamp: DateTime::parse_from_rfc3339(timestamp).unwrap(),
        distinct: true,
        tree_id: format!("tree-{id}"),
        url: format!("https://github.com/flip555/home_energy_hub/commit/{id}"),
    }
}

pub fn measurement(name: &str, value: f64) -> Measurement {
    Measurement {
        name: name.to_owned(),
        value,
        unit: "iter/sec".to_owned(),
        stddev: 0.0000024741600946328004,
        mean_latency: Latency::new(1.0e6 / value, LatencyUnit::Usec),
        sample_count: 1000,
    }
}

pub fn run(id: &str, recorded_at: i64, measurements: Vec<Measurement>) -> Run {
    Run {
        commit: commit(id, "2025-02-26T20:10:23Z"),
        recorded_at,
        tool: "pytest".to_owned(),
        measurements,
    }
}
