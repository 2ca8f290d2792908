//! Results returned across the public boundary
//!
//! Failures are carried as diagnostics inside these values; nothing in the
//! facade returns `Err` or panics.

use crate::generator::{Complexity, GeneratedSql};
use querygraph_core::{Diagnostic, QueryModel, TranspileError};
use serde::{Deserialize, Serialize};

/// Which strategy of the fallback chain produced a parse result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Ast,
    Pattern,
    Degraded,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ast => "ast",
            Self::Pattern => "pattern",
            Self::Degraded => "degraded",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    pub success: bool,

    /// The model; a degraded result carries an empty model holding the text
    pub data: Option<QueryModel>,

    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub strategy: StrategyKind,
}

impl ParseResult {
    pub fn parsed(model: QueryModel, warnings: Vec<Diagnostic>, strategy: StrategyKind) -> Self {
        Self {
            success: true,
            data: Some(model),
            errors: Vec::new(),
            warnings,
            strategy,
        }
    }

    /// Result of the last resort: no structure, the text kept as a marker
    pub fn degraded(sql: &str, error: &TranspileError, warnings: Vec<Diagnostic>) -> Self {
        Self {
            success: false,
            data: Some(QueryModel::unparsed(sql)),
            errors: vec![error.to_diagnostic()],
            warnings,
            strategy: StrategyKind::Degraded,
        }
    }

    /// The model, when parsing produced real structure
    pub fn model(&self) -> Option<&QueryModel> {
        self.data.as_ref().filter(|m| self.success && !m.is_unparsed())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResult {
    pub success: bool,
    pub sql: Option<String>,
    pub warnings: Vec<Diagnostic>,
    pub errors: Vec<Diagnostic>,
    pub complexity: Option<Complexity>,
}

impl From<Result<GeneratedSql, TranspileError>> for GenerateResult {
    fn from(result: Result<GeneratedSql, TranspileError>) -> Self {
        match result {
            Ok(generated) => Self {
                success: true,
                sql: Some(generated.sql),
                warnings: generated.warnings,
                errors: Vec::new(),
                complexity: Some(generated.complexity),
            },
            Err(error) => Self {
                success: false,
                sql: None,
                warnings: Vec::new(),
                errors: vec![error.to_diagnostic()],
                complexity: None,
            },
        }
    }
}
