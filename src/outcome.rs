//! Case outcomes
//!
//! Per-case failures are plain data: a [`FailureKind`] naming the stage that failed plus the message shown to
//! the user. Nothing here is an error type; a failing test is an expected result.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Which verification stage produced a failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "file", rename_all = "snake_case")]
pub enum FailureKind {
    /// The batch build failed; only ever attached to the synthetic compilation case.
    BuildFailure,
    /// The artifact ran and did not exit 0.
    RuntimeFailure,
    Timeout,
    /// Stdout differs from the golden file.
    OutputMismatch,
    StdoutMismatch,
    StderrMismatch,
    /// A declared output file differs from the reference run's.
    OutputFileMismatch(String),
    MemoryCheckFailure,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::BuildFailure => write!(f, "build failure"),
            FailureKind::RuntimeFailure => write!(f, "runtime failure"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::OutputMismatch => write!(f, "output mismatch"),
            FailureKind::StdoutMismatch => write!(f, "stdout mismatch"),
            FailureKind::StderrMismatch => write!(f, "stderr mismatch"),
            FailureKind::OutputFileMismatch(name) => write!(f, "output file mismatch: {name}"),
            FailureKind::MemoryCheckFailure => write!(f, "memory check failure"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureDetail {
    pub kind: FailureKind,
    pub message: String,
}

impl FailureDetail {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    #[default]
    Unknown,
    Passed,
    Failed,
    Skipped,
}

/// Run state stored on a catalog case.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CaseRunState {
    pub status: CaseStatus,
    pub last_duration: Option<Duration>,
    pub failure: Option<FailureDetail>,
}

impl CaseRunState {
    pub fn passed(duration: Duration) -> Self {
        Self {
            status: CaseStatus::Passed,
            last_duration: Some(duration),
            failure: None,
        }
    }

    pub fn failed(duration: Duration, failure: FailureDetail) -> Self {
        Self {
            status: CaseStatus::Failed,
            last_duration: Some(duration),
            failure: Some(failure),
        }
    }

    pub fn skipped() -> Self {
        Self {
            status: CaseStatus::Skipped,
            ..Self::default()
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, CaseStatus::Passed | CaseStatus::Failed | CaseStatus::Skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind_display_names_file() {
        let kind = FailureKind::OutputFileMismatch("out.txt".into());
        assert_eq!(kind.to_string(), "output file mismatch: out.txt");
    }

    #[test]
    fn test_state_constructors() {
        let passed = CaseRunState::passed(Duration::from_millis(5));
        assert_eq!(passed.status, CaseStatus::Passed);
        assert!(passed.failure.is_none());

        let failed = CaseRunState::failed(Duration::ZERO, FailureDetail::new(FailureKind::Timeout, "slow"));
        assert_eq!(failed.failure.as_ref().map(|f| &f.kind), Some(&FailureKind::Timeout));

        assert!(CaseRunState::skipped().is_terminal());
        assert!(!CaseRunState::default().is_terminal());
    }

    #[test]
    fn test_failure_kind_json() {
        let json = serde_json::to_string(&FailureKind::OutputFileMismatch("a.txt".into())).unwrap();
        assert_eq!(json, r#"{"kind":"output_file_mismatch","file":"a.txt"}"#);
        let json = serde_json::to_string(&FailureKind::Timeout).unwrap();
        assert_eq!(json, r#"{"kind":"timeout"}"#);
    }
}
