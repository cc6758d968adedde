//! Diagnostics for the compile pass.
//!
//! Only [`CompileError::DuplicateTypeConflict`] aborts a pass. Every other
//! condition (unclassifiable field type, unresolved type variable, tag
//! collision, ambiguous accessor) degrades gracefully: the field is dropped
//! or the later match wins, and a [`Diagnostic`] is reported to the sink.
//! The sink itself never fails.

use std::fmt;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// Identifies which condition produced the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A type reference could not be mapped to a wire model; the field is dropped.
    ClassificationFailure,
    /// A type variable had no matching slot in the supertype's parameter list; the field is dropped.
    UnresolvedTypeVariable,
    /// Two fields claimed the same tag; the last write wins.
    TagCollision,
    /// An explicit tag of zero; wire tags are positive. The field or
    /// constant is dropped.
    InvalidTag,
    /// Two accessors matched the same field; the later match wins.
    AccessorAmbiguity,
}

/// A single diagnostic produced during a compile pass.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Diagnostic { severity: Severity::Warning, kind, message: message.into() }
    }

    pub fn error(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Diagnostic { severity: Severity::Error, kind, message: message.into() }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sev = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{}: {:?}: {}", sev, self.kind, self.message)
    }
}

/// Where diagnostics go. Reporting never fails.
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

/// Collects every diagnostic in order; the default sink for callers and tests.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub diagnostics: Vec<Diagnostic>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count_of(&self, kind: DiagnosticKind) -> usize {
        self.diagnostics.iter().filter(|d| d.kind == kind).count()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }
}

impl DiagnosticSink for CollectingSink {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}

/// Fatal compile pass failure. Everything else is a [`Diagnostic`].
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("duplicate conflicting types at name '{0}'")]
    DuplicateTypeConflict(String),
}
