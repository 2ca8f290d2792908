//! Corpus harness: round-trips every SQL file under a directory

use crate::metrics::{CorpusMetrics, FailureDetail, QueryOutcome, QueryResult};

use querygraph_core::Config;
use querygraph_sql::{compare_models, Transpiler};

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Directory whose queries are expected to be rejected
const UNSUPPORTED_DIR: &str = "unsupported";

const PREVIEW_LEN: usize = 200;

pub struct CorpusHarness {
    /// Root directory of the corpus
    corpus_root: PathBuf,

    transpiler: Transpiler,
}

impl CorpusHarness {
    pub fn new(corpus_root: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            corpus_root: corpus_root.into(),
            transpiler: Transpiler::new(config),
        }
    }

    /// Round-trip every discovered query and collect metrics
    pub fn run(&self) -> Result<CorpusMetrics> {
        let mut metrics = CorpusMetrics::new(
            self.corpus_root
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("corpus"),
            self.transpiler.config().dialect.as_str(),
        );

        let files = self.discover_queries()?;
        info!(corpus = %self.corpus_root.display(), files = files.len(), "running corpus");

        for path in files {
            let result = self.check_file(&path);
            debug!(file = %result.file_path, outcome = ?result.outcome, "checked query");
            metrics.add_query_result(result);
        }

        Ok(metrics)
    }

    /// All `.sql` files below the corpus root, sorted by path
    pub fn discover_queries(&self) -> Result<Vec<PathBuf>> {
        if !self.corpus_root.is_dir() {
            bail!("corpus directory {} does not exist", self.corpus_root.display());
        }

        let mut sql_files = Vec::new();
        for entry in WalkDir::new(&self.corpus_root).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to walk {}", self.corpus_root.display()))?;
            if entry.file_type().is_file() && entry.path().extension().is_some_and(|ext| ext == "sql") {
                sql_files.push(entry.into_path());
            }
        }

        Ok(sql_files)
    }

    /// Check one corpus file
    pub fn check_file(&self, path: &Path) -> QueryResult {
        let query_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();

        let relative = path.strip_prefix(&self.corpus_root).unwrap_or(path);
        let file_path = relative.display().to_string();
        let expect_failure = relative
            .components()
            .any(|c| c.as_os_str() == UNSUPPORTED_DIR);

        let outcome = match std::fs::read_to_string(path) {
            Ok(sql) => self.check_query(&sql, expect_failure),
            Err(err) => QueryOutcome::ParseFailure(FailureDetail {
                code: "IO_ERROR".to_string(),
                message: format!("Failed to read SQL file: {}", err),
                context: None,
            }),
        };

        QueryResult {
            query_name,
            file_path,
            outcome,
        }
    }

    /// Round-trip a query and re-parse the regenerated SQL
    pub fn check_query(&self, sql: &str, expect_failure: bool) -> QueryOutcome {
        let parsed = self.transpiler.parse(sql);

        if expect_failure {
            return match parsed.errors.first() {
                Some(error) if !parsed.success => QueryOutcome::ExpectedFailure {
                    code: error.code.as_str().to_string(),
                },
                _ => QueryOutcome::UnexpectedSuccess,
            };
        }

        let Some(first) = parsed.model() else {
            return QueryOutcome::ParseFailure(failure_detail(&parsed.errors, sql));
        };

        let round_trip = self.transpiler.validate_round_trip(sql);
        let (Some(new_sql), Some(analysis)) = (&round_trip.new_sql, &round_trip.analysis) else {
            return QueryOutcome::GenerationFailure(failure_detail(&round_trip.errors, sql));
        };

        let reparsed = self.transpiler.parse(new_sql);
        let idempotent = reparsed
            .model()
            .is_some_and(|second| compare_models(first, second).is_empty());

        QueryOutcome::RoundTrip {
            exact: analysis.exact_match,
            equivalent: round_trip.is_equivalent,
            idempotent,
            similarity: analysis.similarity,
            strategy: parsed.strategy.to_string(),
            differences: round_trip.differences,
        }
    }
}

fn failure_detail(errors: &[querygraph_core::Diagnostic], sql: &str) -> FailureDetail {
    match errors.first() {
        Some(error) => FailureDetail {
            code: error.code.as_str().to_string(),
            message: error.message.clone(),
            context: Some(preview(sql)),
        },
        None => FailureDetail {
            code: "UNKNOWN".to_string(),
            message: "no diagnostic reported".to_string(),
            context: Some(preview(sql)),
        },
    }
}

/// First characters of the query, cut on a char boundary
fn preview(sql: &str) -> String {
    match sql.char_indices().nth(PREVIEW_LEN) {
        Some((end, _)) => format!("{}...", &sql[..end]),
        None => sql.to_string(),
    }
}
