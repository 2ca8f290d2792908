//! Transpiler error taxonomy

use crate::diagnostic::{Diagnostic, DiagnosticCode, Location, Severity};

/// Errors raised by any stage of the transpiler
///
/// Every variant maps onto a stable [`DiagnosticCode`] so callers can turn a
/// failure into a structured result without matching on message text.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TranspileError {
    #[error("Invalid input: {0}")]
    InputValidation(String),

    #[error("SQL syntax error: {message}")]
    Syntax {
        message: String,
        location: Option<Location>,
    },

    #[error("Unsupported SQL construct: {0}")]
    UnsupportedConstruct(String),

    #[error("Referential integrity violation: {0}")]
    ReferentialIntegrity(String),

    #[error("Cannot generate SQL: {0}")]
    Generation(String),
}

impl TranspileError {
    /// Create a syntax error without a known position
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::Syntax {
            message: message.into(),
            location: None,
        }
    }

    /// The stable diagnostic code for this error
    pub fn code(&self) -> DiagnosticCode {
        match self {
            Self::InputValidation(_) => DiagnosticCode::InputValidationError,
            Self::Syntax { .. } => DiagnosticCode::SyntaxError,
            Self::UnsupportedConstruct(_) => DiagnosticCode::UnsupportedConstruct,
            Self::ReferentialIntegrity(_) => DiagnosticCode::ReferentialIntegrityError,
            Self::Generation(_) => DiagnosticCode::GenerationError,
        }
    }

    /// Convert to an error-level diagnostic
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::new(self.code(), Severity::Error, self.to_string());
        match self {
            Self::Syntax {
                location: Some(loc),
                ..
            } => diag.with_location(*loc),
            _ => diag,
        }
    }
}
