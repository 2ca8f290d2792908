//! Round-trip report generation

use crate::metrics::CorpusMetrics;
use colored::Colorize;
use serde::{Deserialize, Serialize};

/// Round-trip report over one or more corpora
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatReport {
    pub corpora: Vec<CorpusMetrics>,

    pub aggregate: AggregateStats,
}

/// Aggregate statistics across all corpora
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total_corpora: usize,
    pub total_queries: usize,
    pub overall_round_trip_rate: f64,
    pub overall_equivalence_rate: f64,
    pub overall_idempotence_rate: f64,
    pub total_failures: usize,
    pub total_expected_failures: usize,
}

impl CompatReport {
    pub fn new(corpora: Vec<CorpusMetrics>) -> Self {
        let aggregate = Self::compute_aggregate(&corpora);
        Self { corpora, aggregate }
    }

    fn compute_aggregate(corpora: &[CorpusMetrics]) -> AggregateStats {
        let sum = |f: fn(&CorpusMetrics) -> usize| corpora.iter().map(f).sum::<usize>();

        let supported = sum(CorpusMetrics::supported_queries);
        let round_tripped = sum(|c| c.round_tripped);

        AggregateStats {
            total_corpora: corpora.len(),
            total_queries: sum(|c| c.total_queries),
            overall_round_trip_rate: rate(round_tripped, supported),
            overall_equivalence_rate: rate(sum(|c| c.equivalent), round_tripped),
            overall_idempotence_rate: rate(sum(|c| c.idempotent), round_tripped),
            total_failures: sum(|c| c.failures + c.unexpected_successes),
            total_expected_failures: sum(|c| c.expected_failures),
        }
    }

    /// All corpora clean
    pub fn passed(&self) -> bool {
        self.corpora.iter().all(CorpusMetrics::is_clean)
    }

    /// Human-readable terminal report
    pub fn print_terminal_report(&self) {
        println!("\n{}", "╔══════════════════════════════════════════════════════════════════╗".cyan());
        println!("{}", "║       QueryGraph Round-Trip Report                               ║".cyan().bold());
        println!("{}", "╚══════════════════════════════════════════════════════════════════╝".cyan());

        println!("\n{}", "Aggregate Statistics:".bold());
        println!("  Total Corpora:               {}", self.aggregate.total_corpora);
        println!("  Total Queries:               {}", self.aggregate.total_queries);
        println!("  Round-Trip Rate:             {:.1}%", self.aggregate.overall_round_trip_rate * 100.0);
        println!("  Equivalence Rate:            {:.1}%", self.aggregate.overall_equivalence_rate * 100.0);
        println!("  Idempotence Rate:            {:.1}%", self.aggregate.overall_idempotence_rate * 100.0);
        println!("  Expected Failures:           {}", self.aggregate.total_expected_failures);

        println!("\n{}", "Per-Corpus Breakdown:".bold());
        for metrics in &self.corpora {
            println!("\n  {} ({})", metrics.corpus_name.green(), metrics.dialect.yellow());
            println!("    Total Queries:           {}", metrics.total_queries);
            println!(
                "    Round-Tripped:           {} ({:.1}%)",
                metrics.round_tripped,
                metrics.round_trip_rate() * 100.0
            );
            println!("    Exact Matches:           {}", metrics.exact_matches);
            println!(
                "    Equivalent:              {} ({:.1}%)",
                metrics.equivalent,
                metrics.equivalence_rate() * 100.0
            );
            println!(
                "    Idempotent:              {} ({:.1}%)",
                metrics.idempotent,
                metrics.idempotence_rate() * 100.0
            );
            println!("    Average Similarity:      {:.2}", metrics.average_similarity());
            println!("    Failures:                {}", metrics.failures);
            println!("    Unexpected Successes:    {}", metrics.unexpected_successes);

            let top_failures = metrics.top_failure_codes(5);
            if !top_failures.is_empty() {
                println!("    Top Failure Codes:");
                for (code, count) in top_failures {
                    println!("      {} - {} occurrences", code.red(), count);

                    if let Some(samples) = metrics.failure_samples.get(&code) {
                        for (i, sample) in samples.iter().enumerate() {
                            println!("        Sample {}: {}", i + 1, truncate(sample, 80).dimmed());
                        }
                    }
                }
            }
        }

        println!("\n{}", "Summary:".bold());
        if self.passed() {
            println!("  {} Every supported query round-tripped", "✓".green());
        } else {
            println!("  {} {} queries need attention", "✗".red(), self.aggregate.total_failures);
        }

        if self.aggregate.overall_equivalence_rate >= 0.95 {
            println!("  {} Excellent equivalence rate (≥95%)", "✓".green());
        } else if self.aggregate.overall_equivalence_rate >= 0.85 {
            println!("  {} Good equivalence rate (≥85%)", "!".yellow());
        } else {
            println!("  {} Equivalence rate needs improvement (<85%)", "✗".red());
        }

        println!();
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn save_json(&self, path: impl AsRef<std::path::Path>) -> std::io::Result<()> {
        let json = self.to_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

fn rate(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max - 3) {
        Some((end, _)) if text.chars().count() > max => format!("{}...", &text[..end]),
        _ => text.to_string(),
    }
}
