//! Diagnostics produced while parsing test definitions
//!
//! Parsing never fails outright: problems are collected as [`Diagnostic`]s next to the best-effort result.
//! [`Diagnostic::to_report`] turns one into a `miette` report for terminal rendering.

use std::fmt;

use miette::{LabeledSpan, NamedSource, SourceSpan};
use thiserror::Error;

use crate::position::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// What went wrong, independent of the message wording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// The document is not valid TOML; nothing could be extracted.
    Syntax,
    /// A required section (`config` or `tests`) is absent.
    MissingSection(String),
    /// A required `[config]` key is absent.
    MissingConfigKey(String),
    UnknownConfigKey(String),
    /// An unrecognized key inside `[tests.<name>]`.
    UnknownTestKey { test: String, key: String },
    /// A recognized key holding a value of the wrong shape.
    InvalidValue { key: String, expected: &'static str },
    /// A test entry that cannot become a record (not a table, empty name).
    InvalidTest(String),
    /// A test defined more than once; the later definition is kept.
    DuplicateTest(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Option<Span>,
}

impl Diagnostic {
    pub fn error(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            message: message.into(),
            span: None,
        }
    }

    pub fn warning(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            kind,
            message: message.into(),
            span: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Attach the source so the diagnostic can be rendered with a labelled snippet.
    pub fn to_report(&self, file_name: &str, source: &str) -> DiagnosticReport {
        DiagnosticReport {
            message: self.message.clone(),
            severity: self.severity,
            source_code: NamedSource::new(file_name, source.to_string()),
            label: self.span.map(|span| SourceSpan::new(span.start.into(), span.len())),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}

/// A diagnostic bundled with its source document, renderable by `miette`.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DiagnosticReport {
    message: String,
    severity: Severity,
    source_code: NamedSource<String>,
    label: Option<SourceSpan>,
}

impl miette::Diagnostic for DiagnosticReport {
    fn severity(&self) -> Option<miette::Severity> {
        Some(match self.severity {
            Severity::Error => miette::Severity::Error,
            Severity::Warning => miette::Severity::Warning,
        })
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.source_code)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let span = self.label?;
        Some(Box::new(std::iter::once(LabeledSpan::new_with_span(
            Some("here".to_string()),
            span,
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_severity() {
        let diag = Diagnostic::warning(
            DiagnosticKind::UnknownConfigKey("color".into()),
            "unknown [config] variable: color",
        );
        assert_eq!(diag.to_string(), "warning: unknown [config] variable: color");
    }

    #[test]
    fn test_is_error() {
        let diag = Diagnostic::error(DiagnosticKind::Syntax, "bad");
        assert!(diag.is_error());
        let diag = Diagnostic::warning(DiagnosticKind::Syntax, "meh");
        assert!(!diag.is_error());
    }

    #[test]
    fn test_report_carries_label() {
        let diag = Diagnostic::error(DiagnosticKind::Syntax, "unexpected `]`").with_span(Span::new(3, 4));
        let report = diag.to_report("tests.toml", "[a]]");
        assert_eq!(report.label, Some(SourceSpan::new(3.into(), 1)));
        assert_eq!(report.to_string(), "unexpected `]`");
    }
}
