//! Structured diagnostics produced by the lexer, parser and lowering.

use core::fmt;

use crate::error::CoreError;
use crate::span::Span;

/// How bad a diagnostic is.
///
/// Fatal diagnostics abort the compilation run. Recoverable ones are
/// collected on the artifact and reported alongside the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Fatal,
    Recoverable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
    pub code: Option<&'static str>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, span: Span) -> Self {
        Diagnostic {
            severity: Severity::Fatal,
            message: message.into(),
            span,
            code: None,
        }
    }

    pub fn warning(message: impl Into<String>, span: Span) -> Self {
        Diagnostic {
            severity: Severity::Recoverable,
            message: message.into(),
            span,
            code: None,
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }

    /// Render as `path:line:column: error[CODE]: message`.
    pub fn render(&self, path: &str) -> String {
        format!("{path}:{}: {self}", self.span)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            Severity::Fatal => "error",
            Severity::Recoverable => "warning",
        };
        match self.code {
            Some(code) => write!(f, "{label}[{code}]: {}", self.message),
            None => write!(f, "{label}: {}", self.message),
        }
    }
}

impl From<&CoreError> for Diagnostic {
    fn from(err: &CoreError) -> Self {
        Diagnostic::error(err.to_string(), err.span().unwrap_or_default()).with_code(err.code())
    }
}
