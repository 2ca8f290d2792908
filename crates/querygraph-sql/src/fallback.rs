//! Fallback orchestration
//!
//! Parsing is a chain of strategies tried in a fixed order: the grammar-based
//! AST extractor, then the pattern matcher, then a degraded result that keeps
//! the text but no structure. The chain never returns an error; every outcome
//! is a [`ParseResult`].

use crate::extractor::{AstExtractor, Extraction};
use crate::parser::{check_input, SqlParser};
use crate::pattern::PatternMatcher;
use crate::result::{ParseResult, StrategyKind};
use querygraph_core::{Diagnostic, DiagnosticCode, DialectConfig, LimitsConfig, TranspileError};
use tracing::{debug, info, warn};

/// One way of turning SQL text into a query model
pub trait ParseStrategy: Send + Sync {
    fn name(&self) -> StrategyKind;

    /// Extract a model; input guards have already run
    fn parse(&self, sql: &str) -> Result<Extraction, TranspileError>;
}

/// Grammar library plus AST extraction
pub struct AstStrategy {
    parser: SqlParser,
    extractor: AstExtractor,
}

impl AstStrategy {
    pub fn new(dialect: &DialectConfig) -> Self {
        Self {
            parser: SqlParser::from_dialect(dialect),
            extractor: AstExtractor::new(),
        }
    }
}

impl ParseStrategy for AstStrategy {
    fn name(&self) -> StrategyKind {
        StrategyKind::Ast
    }

    fn parse(&self, sql: &str) -> Result<Extraction, TranspileError> {
        let parsed = self.parser.parse_unguarded(sql)?;
        self.extractor.extract(&parsed)
    }
}

/// Regex matcher for simple SELECT/JOIN queries
#[derive(Default)]
pub struct PatternStrategy {
    matcher: PatternMatcher,
}

impl PatternStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ParseStrategy for PatternStrategy {
    fn name(&self) -> StrategyKind {
        StrategyKind::Pattern
    }

    fn parse(&self, sql: &str) -> Result<Extraction, TranspileError> {
        self.matcher.extract(sql)
    }
}

/// Runs the strategy chain
pub struct FallbackOrchestrator {
    limits: LimitsConfig,
    strategies: Vec<Box<dyn ParseStrategy>>,
}

impl FallbackOrchestrator {
    /// The standard chain: AST, then pattern
    pub fn new(dialect: DialectConfig, limits: LimitsConfig) -> Self {
        Self::with_strategies(
            limits,
            vec![Box::new(AstStrategy::new(&dialect)), Box::new(PatternStrategy::new())],
        )
    }

    /// A custom chain, tried in order
    pub fn with_strategies(limits: LimitsConfig, strategies: Vec<Box<dyn ParseStrategy>>) -> Self {
        Self { limits, strategies }
    }

    pub fn strategies(&self) -> impl Iterator<Item = StrategyKind> + '_ {
        self.strategies.iter().map(|s| s.name())
    }

    /// Parse `sql` with the first strategy that yields a model with tables
    #[tracing::instrument(skip(self, sql), fields(length = sql.len()))]
    pub fn parse(&self, sql: &str) -> ParseResult {
        if let Err(error) = check_input(sql, &self.limits) {
            warn!(%error, "input rejected before parsing");
            return ParseResult::degraded(sql, &error, Vec::new());
        }

        let mut primary_error: Option<TranspileError> = None;
        let mut warnings: Vec<Diagnostic> = Vec::new();

        for strategy in &self.strategies {
            let kind = strategy.name();

            let error = match strategy.parse(sql) {
                Ok(extraction) if !extraction.model.tables.is_empty() => {
                    warnings.extend(extraction.warnings);
                    if let Some(error) = &primary_error {
                        warnings.push(Diagnostic::warning(
                            DiagnosticCode::FallbackUsed,
                            format!("parsed by the {} strategy after: {}", kind, error),
                        ));
                    }
                    info!(strategy = %kind, warnings = warnings.len(), "query parsed");
                    return ParseResult::parsed(extraction.model, warnings, kind);
                }
                Ok(_) => TranspileError::UnsupportedConstruct("query references no tables".to_string()),
                Err(error) => error,
            };

            debug!(strategy = %kind, %error, "strategy failed");
            if primary_error.is_none() {
                primary_error = Some(error);
            }
        }

        let error = primary_error
            .unwrap_or_else(|| TranspileError::InputValidation("no parsing strategy configured".to_string()));
        warn!(%error, "falling back to degraded result");
        ParseResult::degraded(sql, &error, warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use querygraph_core::QueryModel;

    fn orchestrator() -> FallbackOrchestrator {
        FallbackOrchestrator::new(DialectConfig::Ansi, LimitsConfig::default())
    }

    struct Failing;

    impl ParseStrategy for Failing {
        fn name(&self) -> StrategyKind {
            StrategyKind::Ast
        }

        fn parse(&self, _sql: &str) -> Result<Extraction, TranspileError> {
            Err(TranspileError::syntax("grammar gave up"))
        }
    }

    #[test]
    fn ast_strategy_handles_standard_sql() {
        let result = orchestrator().parse("SELECT id FROM users WHERE active = true");

        assert!(result.success);
        assert_eq!(result.strategy, StrategyKind::Ast);
        assert_eq!(result.model().map(|m| m.tables.len()), Some(1));
    }

    #[test]
    fn pattern_strategy_recovers_primary_failure() {
        let orchestrator = FallbackOrchestrator::with_strategies(
            LimitsConfig::default(),
            vec![Box::new(Failing), Box::new(PatternStrategy::new())],
        );

        let result = orchestrator.parse("SELECT o.id FROM orders o JOIN customers c ON o.cid = c.id");

        assert!(result.success);
        assert_eq!(result.strategy, StrategyKind::Pattern);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.code == DiagnosticCode::FallbackUsed));
    }

    #[test]
    fn syntax_error_degrades() {
        let result = orchestrator().parse("SELECT FROM WHERE");

        assert!(!result.success);
        assert_eq!(result.strategy, StrategyKind::Degraded);
        assert_eq!(result.errors[0].code, DiagnosticCode::SyntaxError);
        assert_eq!(
            result.data.and_then(|m| m.unparsed),
            Some("SELECT FROM WHERE".to_string())
        );
    }

    #[test]
    fn malformed_where_after_join_is_not_recovered() {
        let result = orchestrator().parse("SELECT * FROM a JOIN b ON a.id = b.id WHERE b.x = = 1");

        assert!(!result.success);
        assert_eq!(result.strategy, StrategyKind::Degraded);
        assert_eq!(result.errors[0].code, DiagnosticCode::SyntaxError);
        assert!(result.model().is_none());
    }

    #[test]
    fn ddl_degrades_with_unsupported_construct() {
        let result = orchestrator().parse("CREATE TABLE t (id INT)");

        assert!(!result.success);
        assert_eq!(result.errors[0].code, DiagnosticCode::UnsupportedConstruct);
    }

    #[test]
    fn guard_failure_skips_strategies() {
        let result = orchestrator().parse("   ");

        assert!(!result.success);
        assert_eq!(result.errors[0].code, DiagnosticCode::InputValidationError);
    }

    #[test]
    fn tableless_query_is_not_a_success() {
        let result = orchestrator().parse("SELECT 1");
        assert!(!result.success);
        assert_eq!(result.strategy, StrategyKind::Degraded);
    }

    #[test]
    fn empty_chain_degrades() {
        let orchestrator = FallbackOrchestrator::with_strategies(LimitsConfig::default(), Vec::new());
        let result = orchestrator.parse("SELECT * FROM t");

        assert!(!result.success);
        assert_eq!(result.data, Some(QueryModel::unparsed("SELECT * FROM t")));
    }
}
