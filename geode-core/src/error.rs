use core::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::ast::Capability;
use crate::span::Span;

/// What kind of name failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Type,
    Function,
    Field,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SymbolKind::Variable => "variable",
            SymbolKind::Type => "type",
            SymbolKind::Function => "function",
            SymbolKind::Field => "field",
        })
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read source: {0}")]
    SourceIo(#[from] std::io::Error),
    #[error("no geode sources were found at {0}")]
    MissingSources(PathBuf),
    #[error("{message}")]
    Lex { message: String, span: Span },
    #[error("expected {expected}, found {found}")]
    Syntax {
        expected: String,
        found: String,
        span: Span,
    },
    #[error("unterminated {construct}: missing `{delimiter}`")]
    Unterminated {
        construct: &'static str,
        delimiter: &'static str,
        span: Span,
    },
    #[error("could not parse {production}: {last}")]
    AmbiguityExhausted {
        production: &'static str,
        last: Box<CoreError>,
        span: Span,
    },
    #[error("unresolved {kind} `{name}`")]
    UnresolvedSymbol {
        kind: SymbolKind,
        name: String,
        span: Span,
    },
    #[error("type mismatch: {message}")]
    TypeMismatch { message: String, span: Span },
    #[error("expected {expected} expression, found {found}")]
    CapabilityMismatch {
        expected: Capability,
        found: &'static str,
        span: Span,
    },
}

impl CoreError {
    pub fn syntax(expected: impl Into<String>, found: impl Into<String>, span: Span) -> Self {
        CoreError::Syntax {
            expected: expected.into(),
            found: found.into(),
            span,
        }
    }

    pub fn unresolved(kind: SymbolKind, name: impl Into<String>, span: Span) -> Self {
        CoreError::UnresolvedSymbol {
            kind,
            name: name.into(),
            span,
        }
    }

    pub fn type_mismatch(message: impl Into<String>, span: Span) -> Self {
        CoreError::TypeMismatch {
            message: message.into(),
            span,
        }
    }

    /// Source position of the error, if it has one.
    pub fn span(&self) -> Option<Span> {
        match self {
            CoreError::SourceIo(_) | CoreError::MissingSources(_) => None,
            CoreError::Lex { span, .. }
            | CoreError::Syntax { span, .. }
            | CoreError::Unterminated { span, .. }
            | CoreError::AmbiguityExhausted { span, .. }
            | CoreError::UnresolvedSymbol { span, .. }
            | CoreError::TypeMismatch { span, .. }
            | CoreError::CapabilityMismatch { span, .. } => Some(*span),
        }
    }

    /// Stable diagnostic code.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::SourceIo(_) | CoreError::MissingSources(_) => "E0000",
            CoreError::Lex { .. } => "E0001",
            CoreError::Syntax { .. } => "E0100",
            CoreError::Unterminated { .. } => "E0101",
            CoreError::AmbiguityExhausted { .. } => "E0102",
            CoreError::UnresolvedSymbol { .. } => "E0200",
            CoreError::TypeMismatch { .. } => "E0300",
            CoreError::CapabilityMismatch { .. } => "E0301",
        }
    }

    /// Replace a placeholder span with `span`.
    ///
    /// Engines below the AST (casts, function table) do not know where
    /// they were called from and report `Span::default()`.
    pub fn or_span(mut self, at: Span) -> Self {
        let slot = match &mut self {
            CoreError::Lex { span, .. }
            | CoreError::Syntax { span, .. }
            | CoreError::Unterminated { span, .. }
            | CoreError::AmbiguityExhausted { span, .. }
            | CoreError::UnresolvedSymbol { span, .. }
            | CoreError::TypeMismatch { span, .. }
            | CoreError::CapabilityMismatch { span, .. } => span,
            CoreError::SourceIo(_) | CoreError::MissingSources(_) => return self,
        };
        if *slot == Span::default() {
            *slot = at;
        }
        self
    }
}
