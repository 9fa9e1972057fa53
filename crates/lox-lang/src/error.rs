use lox_core::diagnostics::{Diagnostic, Stage};
use lox_core::span::Span;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// A Lox program did something the language does not allow.
    #[error("[line {}] {message}", .span.line)]
    Error { span: Span, message: String },

    #[error("[line {}] Stack overflow.", .span.line)]
    StackOverflow { span: Span },

    /// The interpreter found itself in a state the resolver rules out.
    #[error("[line {}] Internal error: {message}", .span.line)]
    Internal { span: Span, message: String },
}

impl RuntimeError {
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        RuntimeError::Error {
            span,
            message: message.into(),
        }
    }

    pub fn internal(span: Span, message: impl Into<String>) -> Self {
        RuntimeError::Internal {
            span,
            message: message.into(),
        }
    }

    pub fn span(&self) -> Span {
        match self {
            RuntimeError::Error { span, .. }
            | RuntimeError::StackOverflow { span }
            | RuntimeError::Internal { span, .. } => *span,
        }
    }

    pub fn message(&self) -> String {
        match self {
            RuntimeError::Error { message, .. } => message.clone(),
            RuntimeError::StackOverflow { .. } => "Stack overflow.".to_string(),
            RuntimeError::Internal { message, .. } => format!("Internal error: {}", message),
        }
    }

    pub fn is_fatal(&self) -> bool {
        !matches!(self, RuntimeError::Error { .. })
    }

    pub fn diagnostic(&self) -> Diagnostic {
        let stage = if self.is_fatal() {
            Stage::Fatal
        } else {
            Stage::Runtime
        };
        Diagnostic::new(stage, self.span(), self.message())
    }
}
