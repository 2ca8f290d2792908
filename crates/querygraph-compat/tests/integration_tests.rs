//! Runs the round-trip suite over the shared fixture corpus

use pretty_assertions::assert_eq;
use querygraph_compat::{CompatReport, CorpusHarness, QueryOutcome};
use querygraph_core::Config;
use std::path::Path;

const CORPUS: &str = "../../fixtures/corpus";

#[test]
fn fixture_corpus_is_clean() {
    let harness = CorpusHarness::new(Path::new(CORPUS), Config::default());
    let metrics = harness.run().unwrap();

    assert!(metrics.total_queries > 0);
    assert_eq!(metrics.failures, 0, "{:#?}", metrics.failure_samples);
    assert_eq!(metrics.unexpected_successes, 0);
    assert_eq!(metrics.idempotent, metrics.round_tripped);
    assert!(metrics.is_clean());
}

#[test]
fn unsupported_fixtures_fail_with_codes() {
    let harness = CorpusHarness::new(Path::new(CORPUS), Config::default());
    let metrics = harness.run().unwrap();

    let expected: Vec<(&str, &str)> = metrics
        .query_results
        .iter()
        .filter_map(|r| match &r.outcome {
            QueryOutcome::ExpectedFailure { code } => Some((r.query_name.as_str(), code.as_str())),
            _ => None,
        })
        .collect();

    assert_eq!(expected.len(), 4);
    assert!(expected.contains(&("create_table", "UNSUPPORTED_CONSTRUCT")));
    assert!(expected.contains(&("syntax_error", "SYNTAX_ERROR")));
}

#[test]
fn report_summarizes_corpus() {
    let harness = CorpusHarness::new(Path::new(CORPUS), Config::default());
    let report = CompatReport::new(vec![harness.run().unwrap()]);

    assert!(report.passed());
    assert_eq!(report.aggregate.overall_round_trip_rate, 1.0);
    assert_eq!(report.aggregate.total_expected_failures, 4);

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["corpora"][0]["corpus_name"], "corpus");
}
