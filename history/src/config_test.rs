use crate::config::{HistoryConfig, StorageConfig};
use crate::format::DEFAULT_SUITE;
use pretty_assertions::assert_eq;
use std::path::PathBuf;

#[test]
fn parses_yaml_config() {
    let config: HistoryConfig = serde_yaml::from_str(
        "repo_url: https://github.com/flip555/home_energy_hub
storage:
  kind: json
  path: dev/bench/data.js
  js_prefix: true
",
    )
    .unwrap();

    assert_eq!(config.suite, DEFAULT_SUITE);
    assert_eq!(
        config.storage,
        StorageConfig::Json {
            path: PathBuf::from("dev/bench/data.js"),
            js_prefix: true
        }
    );
}

#[test]
fn accepts_db_alias_and_sqlite() {
    let config: HistoryConfig = serde_yaml::from_str(
        "suite: Nightly
db:
  kind: sqlite
  path: bench.db
",
    )
    .unwrap();

    assert_eq!(config.suite, "Nightly");
    assert_eq!(
        config.storage,
        StorageConfig::SQLite {
            path: PathBuf::from("bench.db")
        }
    );
}

#[test]
fn rejects_unknown_fields() {
    assert!(serde_yaml::from_str::<HistoryConfig>(
        "storage:
  kind: memory
retention: 30
"
    )
    .is_err());
}

#[test]
fn infers_storage_from_extension() {
    assert!(matches!(
        StorageConfig::infer(PathBuf::from("history.sqlite")),
        StorageConfig::SQLite { .. }
    ));
    assert!(matches!(
        StorageConfig::infer(PathBuf::from("dev/bench/data.js")),
        StorageConfig::Json {
            js_prefix: true,
            ..
        }
    ));
    assert!(matches!(
        StorageConfig::infer(PathBuf::from("history.json")),
        StorageConfig::Json {
            js_prefix: false,
            ..
        }
    ));
}

#[test]
fn preflight_reports_fatal_problems() {
    let mut config = HistoryConfig::for_store(PathBuf::from("data.json"));
    config.suite = "  Benchmark ".to_owned();
    assert!(!config.preflight_checks());
    assert_eq!(config.suite, "Benchmark");

    config.suite = "   ".to_owned();
    assert!(config.preflight_checks());

    let mut directory = HistoryConfig::for_store(std::env::temp_dir());
    assert!(directory.preflight_checks());

    let mut missing_parent =
        HistoryConfig::for_store(PathBuf::from("/definitely/not/here/bench.db"));
    assert!(missing_parent.preflight_checks());
}
