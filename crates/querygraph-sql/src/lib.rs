//! Bidirectional SQL transpiler
//!
//! This crate handles:
//! - Parsing SQL using datafusion-sqlparser-rs
//! - Extracting the canonical query model from the AST
//! - Regenerating dialect-specific SQL from a model
//! - Falling back to pattern matching when the grammar rejects a query
//! - Validating parse/generate round trips
//!
//! The free functions below use a default [`Transpiler`] per call. Callers
//! that parse repeatedly should keep a `Transpiler` to benefit from its cache.

pub mod cache;
pub mod extractor;
pub mod fallback;
pub mod generator;
pub mod parser;
pub mod pattern;
pub mod result;
pub mod roundtrip;
pub mod scope;
pub mod transpiler;

pub use cache::{CacheStats, ParseCache};
pub use extractor::{AstExtractor, Extraction};
pub use fallback::{AstStrategy, FallbackOrchestrator, ParseStrategy, PatternStrategy};
pub use generator::{Complexity, GeneratedSql, GeneratorOptions, SqlGenerator};
pub use parser::{ParsedSql, SqlParser};
pub use pattern::PatternMatcher;
pub use result::{GenerateResult, ParseResult, StrategyKind};
pub use roundtrip::{
    compare_models, compare_sql, normalize_sql, PerformanceImpact, RoundTripAnalysis,
    RoundTripResult, RoundTripValidator,
};
pub use transpiler::Transpiler;

use querygraph_core::QueryModel;

/// Parse SQL into a query model
pub fn parse(sql: &str) -> ParseResult {
    Transpiler::default().parse(sql)
}

/// Render a query model as SQL
pub fn generate(model: &QueryModel, options: &GeneratorOptions) -> GenerateResult {
    Transpiler::default().generate(model, options)
}

/// Parse, regenerate and compare
pub fn validate_round_trip(sql: &str) -> RoundTripResult {
    Transpiler::default().validate_round_trip(sql)
}
