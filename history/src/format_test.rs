use crate::format::{
    parse_commit, parse_extra, parse_range, render_timestamp, strip_js_prefix, Document,
    FormatError, DEFAULT_SUITE, JS_PREFIX,
};
use crate::model::{Latency, LatencyUnit};
use crate::test_util::{measurement, run, CORE, DATA, DATA_JS, MEMORY};
use pretty_assertions::assert_eq;

const NIGHTLY: &str = r#"{
  "lastUpdate": 2000,
  "repoUrl": "https://github.com/flip555/home_energy_hub",
  "entries": {
    "Nightly": [
      { "commit": { "id": "not even a full record" }, "date": 5 }
    ]
  }
}"#;

fn document_with_bench(bench: &str) -> String {
    format!(
        r#"{{
  "lastUpdate": 1,
  "repoUrl": "https://example.com/repo",
  "entries": {{
    "Benchmark": [
      {{
        "commit": {{
          "author": {{ "email": "a@example.com", "name": "a" }},
          "committer": {{ "email": "a@example.com", "name": "a" }},
          "distinct": true,
          "id": "abc123",
          "message": "m",
          "timestamp": "2025-02-26T20:10:23Z",
          "tree_id": "t",
          "url": "u"
        }},
        "date": 1,
        "tool": "pytest",
        "benches": [{bench}]
      }}
    ]
  }}
}}"#
    )
}

#[test]
fn parses_dashboard_document() {
    let document = Document::parse(DATA_JS, DEFAULT_SUITE).unwrap();

    assert_eq!(document.last_update, 1740600683706);
    assert_eq!(
        document.repo_url,
        "https://github.com/flip555/home_energy_hub"
    );
    assert_eq!(document.runs.len(), 1);

    let run = &document.runs[0];
    assert_eq!(run.commit_id(), "9ebeabb9936eefb60c99b600ac2dd698599fc800");
    assert_eq!(run.recorded_at, 1740600683506);
    assert_eq!(run.tool, "pytest");
    assert_eq!(run.commit.author.username.as_deref(), Some("flip555"));
    assert_eq!(run.commit.message, "Update test-and-scan.yml");

    let core = run.measurement(CORE).unwrap();
    assert_eq!(core.value, 24990.978411560332);
    assert_eq!(core.unit, "iter/sec");
    assert_eq!(core.stddev, 0.0000024741600946328004);
    assert_eq!(
        core.mean_latency,
        Latency::new(40.01443975228356, LatencyUnit::Usec)
    );
    assert_eq!(core.sample_count, 23420);

    let memory = run.measurement(MEMORY).unwrap();
    assert_eq!(memory.mean_latency.unit, LatencyUnit::Msec);
    assert_eq!(memory.sample_count, 418);

    assert!(run.measurement(DATA).is_some());
}

#[test]
fn renders_document_as_it_was_read() {
    let document = Document::parse(DATA_JS, DEFAULT_SUITE).unwrap();

    assert_eq!(document.render(true).unwrap(), DATA_JS);
}

#[test]
fn round_trip_keeps_runs() {
    let mut document = Document::new(DEFAULT_SUITE, "https://example.com/repo");
    document.runs.push(run("abc123", 1000, vec![measurement(CORE, 24990.97)]));
    document.runs.push(run(
        "def456",
        2000,
        vec![measurement(CORE, 25100.5), measurement(MEMORY, 543.45)],
    ));
    document.last_update = 2000;

    for js_prefix in [false, true] {
        let text = document.render(js_prefix).unwrap();
        assert_eq!(text.starts_with(JS_PREFIX), js_prefix);
        assert_eq!(Document::parse(&text, DEFAULT_SUITE).unwrap(), document);
    }
}

#[test]
fn free_text_fields_are_typed() {
    assert_eq!(parse_range("x", "stddev: 0.5").unwrap(), 0.5);
    assert_eq!(
        parse_extra("x", "mean: 576.1992982926084 usec\nrounds: 1113").unwrap(),
        (Latency::new(576.1992982926084, LatencyUnit::Usec), 1113)
    );

    assert!(matches!(
        parse_range("x", "± 0.5"),
        Err(FormatError::Field { field: "range", .. })
    ));
    assert!(matches!(
        parse_extra("x", "mean: 1.0 usec"),
        Err(FormatError::Field { field: "extra", .. })
    ));
    assert!(matches!(
        parse_extra("x", "mean: 1.0 fortnights\nrounds: 3"),
        Err(FormatError::Field { field: "extra.mean", .. })
    ));
    assert!(matches!(
        parse_extra("x", "mean: 1.0 usec\nrounds: -3"),
        Err(FormatError::Field { field: "extra.rounds", .. })
    ));
    assert!(matches!(
        parse_extra("x", "mean: 1.0 usec\nrounds: 3\nmedian: 1.0 usec"),
        Err(FormatError::Field { field: "extra", .. })
    ));
}

#[test]
fn non_finite_text_is_rejected() {
    for range in ["stddev: inf", "stddev: NaN", "stddev: -0.5"] {
        assert!(matches!(
            parse_range("x", range),
            Err(FormatError::Field { field: "range", .. })
        ));
    }

    assert!(matches!(
        parse_extra("x", "mean: inf usec\nrounds: 3"),
        Err(FormatError::Field { field: "extra.mean", .. })
    ));
}

#[test]
fn malformed_records_reject_the_document() {
    let valid = r#"{ "name": "t", "value": 1.0, "unit": "iter/sec",
                     "range": "stddev: 0.1", "extra": "mean: 1.0 msec\nrounds: 3" }"#;
    assert!(Document::parse(&document_with_bench(valid), DEFAULT_SUITE).is_ok());

    let missing_extra = r#"{ "name": "t", "value": 1.0, "unit": "iter/sec", "range": "stddev: 0.1" }"#;
    assert!(matches!(
        Document::parse(&document_with_bench(missing_extra), DEFAULT_SUITE),
        Err(FormatError::Json(_))
    ));

    let wrong_type = r#"{ "name": "t", "value": "fast", "unit": "iter/sec",
                          "range": "stddev: 0.1", "extra": "mean: 1.0 msec\nrounds: 3" }"#;
    assert!(matches!(
        Document::parse(&document_with_bench(wrong_type), DEFAULT_SUITE),
        Err(FormatError::Json(_))
    ));

    let bad_range = r#"{ "name": "t", "value": 1.0, "unit": "iter/sec",
                         "range": "stddev: n/a", "extra": "mean: 1.0 msec\nrounds: 3" }"#;
    assert!(matches!(
        Document::parse(&document_with_bench(bad_range), DEFAULT_SUITE),
        Err(FormatError::Field { field: "range", .. })
    ));

    let repeated = format!("{valid}, {valid}");
    assert!(matches!(
        Document::parse(&document_with_bench(&repeated), DEFAULT_SUITE),
        Err(FormatError::DuplicateMeasurement { .. })
    ));

    let bad_timestamp = document_with_bench(valid).replace("2025-02-26T20:10:23Z", "yesterday");
    assert!(matches!(
        Document::parse(&bad_timestamp, DEFAULT_SUITE),
        Err(FormatError::Timestamp { .. })
    ));
}

#[test]
fn duplicate_commit_in_suite_is_rejected() {
    let mut document = Document::new(DEFAULT_SUITE, "");
    document.runs.push(run("abc123", 1, vec![measurement(CORE, 1.0)]));
    document.runs.push(run("abc123", 2, vec![measurement(CORE, 2.0)]));
    let text = document.render(false).unwrap();

    assert!(matches!(
        Document::parse(&text, DEFAULT_SUITE),
        Err(FormatError::DuplicateCommit { .. })
    ));
}

#[test]
fn other_suites_are_kept_verbatim() {
    let document = Document::parse(NIGHTLY, DEFAULT_SUITE).unwrap();

    assert!(document.runs.is_empty());
    assert_eq!(document.last_update, 2000);
    assert!(document.other_suites.contains_key("Nightly"));

    let reparsed = Document::parse(&document.render(false).unwrap(), DEFAULT_SUITE).unwrap();
    assert_eq!(reparsed.other_suites, document.other_suites);

    // the untyped suite itself is malformed once it has to be read
    assert!(Document::parse(NIGHTLY, "Nightly").is_err());
}

#[test]
fn strips_dashboard_assignment() {
    assert_eq!(strip_js_prefix("{}"), ("{}", false));
    assert_eq!(
        strip_js_prefix("window.BENCHMARK_DATA = {\"a\": 1};\n"),
        ("{\"a\": 1}", true)
    );
    assert_eq!(
        strip_js_prefix("  window.BENCHMARK_DATA={}"),
        ("{}", true)
    );
}

#[test]
fn parses_push_event_commit() {
    let commit = parse_commit(include_str!("../tests/fixtures/head_commit.json")).unwrap();

    assert_eq!(commit.id, "4f1c2a7d0e9b8c6a5f3e2d1c0b9a8f7e6d5c4b3a");
    assert_eq!(commit.committer.username.as_deref(), Some("web-flow"));
    assert_eq!(render_timestamp(&commit), "2025-02-27T09:15:00+01:00");
    assert!(commit.message.starts_with("Speed up tariff lookups"));
}
