//! Round-trip metrics collection

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Samples kept per failure code
const MAX_SAMPLES: usize = 3;

/// Aggregate metrics for one corpus directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusMetrics {
    /// Corpus name (directory name)
    pub corpus_name: String,

    /// Dialect the corpus was parsed with
    pub dialect: String,

    pub total_queries: usize,

    /// Queries that parsed and regenerated
    pub round_tripped: usize,

    /// Regenerated SQL identical after normalization
    pub exact_matches: usize,

    /// Exact or structurally equivalent
    pub equivalent: usize,

    /// Re-parsing the regenerated SQL gave the same model shape
    pub idempotent: usize,

    /// Supported queries the transpiler could not handle
    pub failures: usize,

    /// Queries under `unsupported/` that were rejected as expected
    pub expected_failures: usize,

    /// Queries under `unsupported/` that parsed anyway
    pub unexpected_successes: usize,

    /// Sum of similarity scores over round-tripped queries
    pub similarity_total: f64,

    pub query_results: Vec<QueryResult>,

    /// Failure codes with counts
    pub failure_codes: HashMap<String, usize>,

    /// Failure samples (code -> example messages)
    pub failure_samples: HashMap<String, Vec<String>>,
}

impl CorpusMetrics {
    pub fn new(corpus_name: impl Into<String>, dialect: impl Into<String>) -> Self {
        Self {
            corpus_name: corpus_name.into(),
            dialect: dialect.into(),
            total_queries: 0,
            round_tripped: 0,
            exact_matches: 0,
            equivalent: 0,
            idempotent: 0,
            failures: 0,
            expected_failures: 0,
            unexpected_successes: 0,
            similarity_total: 0.0,
            query_results: Vec::new(),
            failure_codes: HashMap::new(),
            failure_samples: HashMap::new(),
        }
    }

    /// Queries expected to round-trip
    pub fn supported_queries(&self) -> usize {
        self.total_queries - self.expected_failures - self.unexpected_successes
    }

    /// Round-tripped share of supported queries (0.0 to 1.0)
    pub fn round_trip_rate(&self) -> f64 {
        ratio(self.round_tripped, self.supported_queries())
    }

    /// Equivalent share of round-tripped queries (0.0 to 1.0)
    pub fn equivalence_rate(&self) -> f64 {
        ratio(self.equivalent, self.round_tripped)
    }

    /// Idempotent share of round-tripped queries (0.0 to 1.0)
    pub fn idempotence_rate(&self) -> f64 {
        ratio(self.idempotent, self.round_tripped)
    }

    pub fn average_similarity(&self) -> f64 {
        if self.round_tripped == 0 {
            return 0.0;
        }
        self.similarity_total / self.round_tripped as f64
    }

    /// Top N failure codes by frequency, ties broken by code
    pub fn top_failure_codes(&self, n: usize) -> Vec<(String, usize)> {
        let mut codes: Vec<(String, usize)> = self
            .failure_codes
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        codes.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        codes.into_iter().take(n).collect()
    }

    /// No supported query failed and no unsupported query slipped through
    pub fn is_clean(&self) -> bool {
        self.failures == 0 && self.unexpected_successes == 0
    }

    /// Add a query result and update aggregate metrics
    pub fn add_query_result(&mut self, result: QueryResult) {
        self.total_queries += 1;

        match &result.outcome {
            QueryOutcome::RoundTrip {
                exact,
                equivalent,
                idempotent,
                similarity,
                ..
            } => {
                self.round_tripped += 1;
                self.similarity_total += similarity;
                if *exact {
                    self.exact_matches += 1;
                }
                if *equivalent {
                    self.equivalent += 1;
                }
                if *idempotent {
                    self.idempotent += 1;
                }
            }
            QueryOutcome::ParseFailure(detail) | QueryOutcome::GenerationFailure(detail) => {
                self.failures += 1;
                self.record_failure(detail);
            }
            QueryOutcome::ExpectedFailure { .. } => {
                self.expected_failures += 1;
            }
            QueryOutcome::UnexpectedSuccess => {
                self.unexpected_successes += 1;
            }
        }

        self.query_results.push(result);
    }

    fn record_failure(&mut self, detail: &FailureDetail) {
        *self.failure_codes.entry(detail.code.clone()).or_insert(0) += 1;

        let samples = self.failure_samples.entry(detail.code.clone()).or_default();
        if samples.len() < MAX_SAMPLES {
            samples.push(detail.message.clone());
        }
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64
}

/// Result for a single corpus file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    /// File stem (e.g., "03_inner_join")
    pub query_name: String,

    /// Path relative to the corpus root
    pub file_path: String,

    pub outcome: QueryOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryOutcome {
    /// Parsed, regenerated and compared
    RoundTrip {
        exact: bool,
        equivalent: bool,
        idempotent: bool,
        similarity: f64,
        strategy: String,
        differences: Vec<String>,
    },

    /// No model could be extracted
    ParseFailure(FailureDetail),

    /// A model was extracted but SQL could not be regenerated
    GenerationFailure(FailureDetail),

    /// Rejected, as its location in the corpus says it should be
    ExpectedFailure { code: String },

    /// Parsed although it lives under `unsupported/`
    UnexpectedSuccess,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureDetail {
    /// Diagnostic code (e.g., "SYNTAX_ERROR")
    pub code: String,

    pub message: String,

    /// SQL preview
    pub context: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn round_trip(exact: bool, idempotent: bool, similarity: f64) -> QueryOutcome {
        QueryOutcome::RoundTrip {
            exact,
            equivalent: exact || similarity >= 0.8,
            idempotent,
            similarity,
            strategy: "ast".to_string(),
            differences: Vec::new(),
        }
    }

    fn result(name: &str, outcome: QueryOutcome) -> QueryResult {
        QueryResult {
            query_name: name.to_string(),
            file_path: format!("{}.sql", name),
            outcome,
        }
    }

    fn failure(code: &str, message: &str) -> QueryOutcome {
        QueryOutcome::ParseFailure(FailureDetail {
            code: code.to_string(),
            message: message.to_string(),
            context: None,
        })
    }

    #[test]
    fn rates_count_only_supported_queries() {
        let mut metrics = CorpusMetrics::new("corpus", "ansi");
        metrics.add_query_result(result("a", round_trip(true, true, 1.0)));
        metrics.add_query_result(result("b", round_trip(false, false, 0.5)));
        metrics.add_query_result(result("c", failure("SYNTAX_ERROR", "bad")));
        metrics.add_query_result(result(
            "d",
            QueryOutcome::ExpectedFailure {
                code: "UNSUPPORTED_CONSTRUCT".to_string(),
            },
        ));

        assert_eq!(metrics.total_queries, 4);
        assert_eq!(metrics.supported_queries(), 3);
        assert_eq!(metrics.round_tripped, 2);
        assert_eq!(metrics.exact_matches, 1);
        assert_eq!(metrics.equivalent, 1);
        assert_eq!(metrics.idempotence_rate(), 0.5);
        assert_eq!(metrics.average_similarity(), 0.75);
        assert!(!metrics.is_clean());
    }

    #[test]
    fn failure_samples_are_capped() {
        let mut metrics = CorpusMetrics::new("corpus", "ansi");
        for i in 0..5 {
            metrics.add_query_result(result(&format!("q{}", i), failure("SYNTAX_ERROR", "bad")));
        }
        metrics.add_query_result(result("x", failure("GENERATION_ERROR", "empty")));

        assert_eq!(metrics.failure_samples["SYNTAX_ERROR"].len(), MAX_SAMPLES);
        assert_eq!(
            metrics.top_failure_codes(1),
            vec![("SYNTAX_ERROR".to_string(), 5)]
        );
    }

    #[test]
    fn empty_corpus_has_zero_rates() {
        let metrics = CorpusMetrics::new("empty", "ansi");
        assert_eq!(metrics.round_trip_rate(), 0.0);
        assert_eq!(metrics.average_similarity(), 0.0);
        assert!(metrics.is_clean());
    }
}
