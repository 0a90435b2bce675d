use thiserror::Error;

use crate::diagnostic::Diagnostic;
use crate::span::Span;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read source: {0}")]
    SourceIo(#[from] std::io::Error),
    #[error("lex error: {message}")]
    Lex { span: Span, message: String },
    #[error("syntax error: {message}")]
    Syntax { span: Span, message: String },
    #[error("redeclaration of symbol `{name}`")]
    Redeclaration { span: Span, name: String },
    #[error("undefined identifier `{name}`")]
    UndefinedIdentifier { span: Span, name: String },
    #[error("unknown type `{name}`")]
    UnknownType { span: Span, name: String },
    #[error("type `{expected}` and `{found}` don't match")]
    TypeMismatch {
        span: Span,
        expected: String,
        found: String,
    },
    #[error("incorrect number of passed arguments, wanted {expected}, got {found}")]
    Arity {
        span: Span,
        expected: usize,
        found: usize,
    },
    #[error("operand of function call has type `{found}`, which is not a function")]
    NotCallable { span: Span, found: String },
    #[error("no matching scope start for scope end")]
    ScopeUnderflow { span: Span },
    #[error("scopes nested deeper than {limit} levels")]
    ScopeOverflow { span: Span, limit: usize },
    #[error("unsupported: {message}")]
    Unsupported { span: Span, message: String },
    #[error("internal compiler error: {message}")]
    Internal { span: Option<Span>, message: String },
}

impl CoreError {
    pub fn lex(span: Span, message: impl Into<String>) -> Self {
        CoreError::Lex {
            span,
            message: message.into(),
        }
    }

    pub fn syntax(span: Span, message: impl Into<String>) -> Self {
        CoreError::Syntax {
            span,
            message: message.into(),
        }
    }

    pub fn unsupported(span: Span, message: impl Into<String>) -> Self {
        CoreError::Unsupported {
            span,
            message: message.into(),
        }
    }

    pub fn internal(span: Option<Span>, message: impl Into<String>) -> Self {
        CoreError::Internal {
            span,
            message: message.into(),
        }
    }

    /// Location the error points at, if it has one.
    pub fn span(&self) -> Option<Span> {
        match self {
            CoreError::SourceIo(_) => None,
            CoreError::Lex { span, .. }
            | CoreError::Syntax { span, .. }
            | CoreError::Redeclaration { span, .. }
            | CoreError::UndefinedIdentifier { span, .. }
            | CoreError::UnknownType { span, .. }
            | CoreError::TypeMismatch { span, .. }
            | CoreError::Arity { span, .. }
            | CoreError::NotCallable { span, .. }
            | CoreError::ScopeUnderflow { span }
            | CoreError::ScopeOverflow { span, .. }
            | CoreError::Unsupported { span, .. } => Some(*span),
            CoreError::Internal { span, .. } => *span,
        }
    }

    /// Stable diagnostic code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::SourceIo(_) => "E0001",
            CoreError::Lex { .. } => "E0101",
            CoreError::Syntax { .. } => "E0201",
            CoreError::Redeclaration { .. } => "E0301",
            CoreError::UndefinedIdentifier { .. } => "E0302",
            CoreError::UnknownType { .. } => "E0303",
            CoreError::TypeMismatch { .. } => "E0401",
            CoreError::Arity { .. } => "E0402",
            CoreError::NotCallable { .. } => "E0403",
            CoreError::ScopeUnderflow { .. } => "E0501",
            CoreError::ScopeOverflow { .. } => "E0502",
            CoreError::Unsupported { .. } => "E0601",
            CoreError::Internal { .. } => "E0901",
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(self.to_string(), self.span()).with_code(self.code())
    }
}
