//! Round-trip validation
//!
//! Parses SQL, regenerates it from the model and compares the two texts,
//! first exactly (after normalization) and then by a structural heuristic.

use crate::generator::{GeneratorOptions, SqlGenerator};
use crate::result::ParseResult;
use querygraph_core::{Diagnostic, QueryModel};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::debug;

/// Matching feature ratio at which two queries count as structurally equal
pub const STRUCTURAL_THRESHOLD: f64 = 0.8;

/// Ratio below which a difference is considered a high impact change
const MEDIUM_IMPACT_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceImpact {
    None,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundTripAnalysis {
    pub exact_match: bool,
    pub structural_equivalence: bool,

    /// Fraction of structural features that match, 0.0 to 1.0
    pub similarity: f64,

    pub performance_impact: PerformanceImpact,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundTripResult {
    pub success: bool,
    pub is_equivalent: bool,
    pub original_sql: String,
    pub new_sql: Option<String>,
    pub differences: Vec<String>,
    pub analysis: Option<RoundTripAnalysis>,
    pub warnings: Vec<Diagnostic>,
    pub errors: Vec<Diagnostic>,
}

/// Lowercase, collapse whitespace, strip identifier quotes
pub fn normalize_sql(sql: &str) -> String {
    sql.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '"' | '`' | '[' | ']'))
        .collect()
}

/// The features compared by the structural heuristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructuralFeatures {
    pub has_select: bool,
    pub has_from: bool,
    pub has_where: bool,
    pub has_group_by: bool,
    pub has_order_by: bool,
    pub has_limit: bool,
    pub joins: usize,
    pub table_refs: usize,
}

pub const FEATURE_COUNT: usize = 8;

fn keyword(pattern: &'static str, cell: &'static OnceLock<Regex>) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("valid regex"))
}

impl StructuralFeatures {
    /// Features of already-normalized SQL
    pub fn of(normalized: &str) -> Self {
        static SELECT: OnceLock<Regex> = OnceLock::new();
        static FROM: OnceLock<Regex> = OnceLock::new();
        static WHERE: OnceLock<Regex> = OnceLock::new();
        static GROUP_BY: OnceLock<Regex> = OnceLock::new();
        static ORDER_BY: OnceLock<Regex> = OnceLock::new();
        static LIMIT: OnceLock<Regex> = OnceLock::new();
        static JOIN: OnceLock<Regex> = OnceLock::new();

        let from = keyword(r"\bfrom\b", &FROM).find_iter(normalized).count();
        let joins = keyword(r"\bjoin\b", &JOIN).find_iter(normalized).count();

        Self {
            has_select: keyword(r"\bselect\b", &SELECT).is_match(normalized),
            has_from: from > 0,
            has_where: keyword(r"\bwhere\b", &WHERE).is_match(normalized),
            has_group_by: keyword(r"\bgroup\s+by\b", &GROUP_BY).is_match(normalized),
            has_order_by: keyword(r"\border\s+by\b", &ORDER_BY).is_match(normalized),
            has_limit: keyword(r"\blimit\b", &LIMIT).is_match(normalized),
            joins,
            table_refs: from + joins,
        }
    }

    /// Human-readable description of every mismatching feature
    pub fn differences(&self, other: &Self) -> Vec<String> {
        let mut differences = Vec::new();
        let mut presence = |name: &str, a: bool, b: bool| {
            if a != b {
                let (before, after) = if a { ("present", "missing") } else { ("missing", "present") };
                differences.push(format!("{} clause {} in original, {} in regenerated SQL", name, before, after));
            }
        };

        presence("SELECT", self.has_select, other.has_select);
        presence("FROM", self.has_from, other.has_from);
        presence("WHERE", self.has_where, other.has_where);
        presence("GROUP BY", self.has_group_by, other.has_group_by);
        presence("ORDER BY", self.has_order_by, other.has_order_by);
        presence("LIMIT", self.has_limit, other.has_limit);

        if self.joins != other.joins {
            differences.push(format!(
                "JOIN count differs: {} in original, {} in regenerated SQL",
                self.joins, other.joins
            ));
        }
        if self.table_refs != other.table_refs {
            differences.push(format!(
                "table reference count differs: {} in original, {} in regenerated SQL",
                self.table_refs, other.table_refs
            ));
        }
        differences
    }
}

/// Outcome of comparing two SQL texts
#[derive(Debug, Clone, PartialEq)]
pub struct SqlComparison {
    pub analysis: RoundTripAnalysis,
    pub differences: Vec<String>,
}

/// Compare two SQL texts for equivalence
pub fn compare_sql(original: &str, regenerated: &str) -> SqlComparison {
    let a = normalize_sql(original);
    let b = normalize_sql(regenerated);

    if a == b {
        return SqlComparison {
            analysis: RoundTripAnalysis {
                exact_match: true,
                structural_equivalence: true,
                similarity: 1.0,
                performance_impact: PerformanceImpact::None,
            },
            differences: Vec::new(),
        };
    }

    let differences = StructuralFeatures::of(&a).differences(&StructuralFeatures::of(&b));
    let matching = FEATURE_COUNT - differences.len();
    let similarity = matching as f64 / FEATURE_COUNT as f64;
    let structural_equivalence = similarity >= STRUCTURAL_THRESHOLD;

    let performance_impact = if structural_equivalence {
        PerformanceImpact::Low
    } else if similarity >= MEDIUM_IMPACT_THRESHOLD {
        PerformanceImpact::Medium
    } else {
        PerformanceImpact::High
    };

    SqlComparison {
        analysis: RoundTripAnalysis {
            exact_match: false,
            structural_equivalence,
            similarity,
            performance_impact,
        },
        differences,
    }
}

/// Structural differences between two models, ignoring ids, aliases and layout
pub fn compare_models(a: &QueryModel, b: &QueryModel) -> Vec<String> {
    let (a, b) = (a.shape(), b.shape());
    let mut differences = Vec::new();

    if a.tables != b.tables {
        differences.push(format!("tables differ: {:?} vs {:?}", a.tables, b.tables));
    }
    if a.joins != b.joins {
        differences.push(format!("joins differ: {:?} vs {:?}", a.joins, b.joins));
    }

    let counts = [
        ("select column", a.select_columns, b.select_columns),
        ("filter", a.filters, b.filters),
        ("aggregation", a.aggregations, b.aggregations),
        ("group by", a.group_by, b.group_by),
        ("order by", a.order_by, b.order_by),
    ];
    for (name, x, y) in counts {
        if x != y {
            differences.push(format!("{} count differs: {} vs {}", name, x, y));
        }
    }

    if a.limit != b.limit {
        differences.push(format!("limit differs: {:?} vs {:?}", a.limit, b.limit));
    }
    differences
}

/// Parse → generate → compare
#[derive(Debug, Clone)]
pub struct RoundTripValidator {
    generator: SqlGenerator,
}

impl Default for RoundTripValidator {
    fn default() -> Self {
        Self::new(GeneratorOptions::default().with_format(false))
    }
}

impl RoundTripValidator {
    pub fn new(options: GeneratorOptions) -> Self {
        Self {
            generator: SqlGenerator::new(options),
        }
    }

    /// Regenerate SQL from an existing parse of `sql` and compare
    #[tracing::instrument(skip_all)]
    pub fn validate(&self, sql: &str, parsed: ParseResult) -> RoundTripResult {
        let mut result = RoundTripResult {
            success: false,
            is_equivalent: false,
            original_sql: sql.to_string(),
            new_sql: None,
            differences: Vec::new(),
            analysis: None,
            warnings: parsed.warnings.clone(),
            errors: parsed.errors.clone(),
        };

        let Some(model) = parsed.model() else {
            result.differences.push("query could not be parsed into a model".to_string());
            return result;
        };

        let generated = match self.generator.generate(model) {
            Ok(generated) => generated,
            Err(error) => {
                result.errors.push(error.to_diagnostic());
                result.differences.push("SQL could not be regenerated from the model".to_string());
                return result;
            }
        };

        let comparison = compare_sql(sql, &generated.sql);
        debug!(
            exact = comparison.analysis.exact_match,
            similarity = comparison.analysis.similarity,
            "round trip compared"
        );

        result.success = true;
        result.is_equivalent = comparison.analysis.exact_match || comparison.analysis.structural_equivalence;
        result.new_sql = Some(generated.sql);
        result.differences = comparison.differences;
        result.analysis = Some(comparison.analysis);
        result.warnings.extend(generated.warnings);
        result
    }
}
