//! Diagnostic codes and error reporting
//!
//! IMPORTANT: Diagnostic codes are versioned and stable.
//! The visual canvas keys its messages on them, so never rename or remove a
//! code. Add new codes with new names only.

use serde::{Deserialize, Serialize};

/// Diagnostic code registry (v1)
///
/// These codes are STABLE and VERSIONED.
/// Do NOT rename or remove codes - only add new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    // Errors (1xxx)
    /// Empty or oversized input rejected before parsing
    InputValidationError,

    /// The grammar library rejected the SQL text
    SyntaxError,

    /// DDL/DML, recursive CTE, set operation or other construct outside the model
    UnsupportedConstruct,

    /// The model references a table that does not exist
    ReferentialIntegrityError,

    /// The model cannot be rendered to SQL
    GenerationError,

    // Extraction approximations (2xxx)
    /// A CTE body was inlined into the outer query
    CteFlattened,

    /// A FROM subquery was turned into a virtual table
    SubqueryFlattened,

    /// A join condition could not be represented as a single column equality
    JoinConditionDropped,

    /// A join type outside INNER/LEFT/RIGHT/FULL was encountered
    JoinTypeUnsupported,

    /// The WHERE/HAVING clause is not a pure conjunction
    FilterApproximated,

    /// A predicate could not be represented as a filter condition
    FilterSkipped,

    /// A column-to-column WHERE predicate was turned into a join
    ImplicitJoin,

    /// A select item was kept as verbatim SQL
    ExpressionPreserved,

    /// A column reference could not be attributed to a single table
    AmbiguousColumn,

    // Orchestration and generation (3xxx)
    /// A later strategy of the fallback chain produced the result
    FallbackUsed,

    /// The generator had to rewrite part of the model to render it
    GenerationAdjusted,

    // General warnings (9xxx)
    /// General informational message
    Info,

    /// General warning message
    Warning,
}

impl DiagnosticCode {
    /// Get the diagnostic code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InputValidationError => "INPUT_VALIDATION_ERROR",
            Self::SyntaxError => "SYNTAX_ERROR",
            Self::UnsupportedConstruct => "UNSUPPORTED_CONSTRUCT",
            Self::ReferentialIntegrityError => "REFERENTIAL_INTEGRITY_ERROR",
            Self::GenerationError => "GENERATION_ERROR",
            Self::CteFlattened => "CTE_FLATTENED",
            Self::SubqueryFlattened => "SUBQUERY_FLATTENED",
            Self::JoinConditionDropped => "JOIN_CONDITION_DROPPED",
            Self::JoinTypeUnsupported => "JOIN_TYPE_UNSUPPORTED",
            Self::FilterApproximated => "FILTER_APPROXIMATED",
            Self::FilterSkipped => "FILTER_SKIPPED",
            Self::ImplicitJoin => "IMPLICIT_JOIN",
            Self::ExpressionPreserved => "EXPRESSION_PRESERVED",
            Self::AmbiguousColumn => "AMBIGUOUS_COLUMN",
            Self::FallbackUsed => "FALLBACK_USED",
            Self::GenerationAdjusted => "GENERATION_ADJUSTED",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,

    /// Warning - the result is usable but approximated
    Warn,

    /// Error - the operation failed
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Position in the SQL text (1-indexed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// A diagnostic message with structured metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic code
    pub code: DiagnosticCode,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Position in the SQL text (best-effort)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl Diagnostic {
    /// Create a new diagnostic with minimal fields
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            location: None,
        }
    }

    /// Shorthand for a warning-level diagnostic
    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Warn, message)
    }

    /// Set the location
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(loc) = &self.location {
            write!(f, " (line {}, column {})", loc.line, loc.column)?;
        }
        Ok(())
    }
}
