//! Batch reporting
//!
//! The engine announces progress through the [`TestReporter`] trait and never prints by itself. Three reporters
//! ship with the crate:
//! - [`ConsoleReporter`]: pytest-style progress and a failure section (the default);
//! - [`JsonReporter`]: one JSON summary object once the batch completes;
//! - [`RecordingReporter`]: keeps every event in memory, for tests and embedding hosts.

use std::io::{self, IsTerminal, Write};
use std::time::Duration;

use serde::Serialize;

use super::BatchReport;
use crate::catalog::{CaseId, QueuedCase};
use crate::outcome::{CaseStatus, FailureDetail};

/// Receives batch events in the order they happen.
pub trait TestReporter {
    /// Called once the selection is resolved, before the build.
    fn on_enqueued(&mut self, _cases: &[QueuedCase]) {}

    /// Free-form progress text (build commands, cleanup).
    fn on_output(&mut self, _line: &str) {}

    fn on_started(&mut self, _case: &CaseId) {}

    fn on_skipped(&mut self, _case: &CaseId) {}

    fn on_passed(&mut self, _case: &CaseId, _duration: Duration) {}

    fn on_failed(&mut self, _case: &CaseId, _failure: &FailureDetail, _duration: Option<Duration>) {}

    /// Called exactly once per batch, including batches stopped by a build failure.
    fn on_batch_complete(&mut self, report: &BatchReport);
}

// ============================================================================
// Console
// ============================================================================

/// Default console reporter (pytest-style)
pub struct ConsoleReporter<W: Write = io::Stderr> {
    out: W,
    verbose: bool,
    color: bool,
    failures: Vec<(CaseId, FailureDetail)>,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self {
            color: io::stderr().is_terminal(),
            out: io::stderr(),
            verbose,
            failures: Vec::new(),
        }
    }
}

impl<W: Write> ConsoleReporter<W> {
    /// Write to `out` without ANSI colours.
    pub fn with_writer(out: W, verbose: bool) -> Self {
        Self {
            out,
            verbose,
            color: false,
            failures: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }
}

const GREEN: &str = "32";
const RED: &str = "31";
const YELLOW: &str = "33";

impl<W: Write> TestReporter for ConsoleReporter<W> {
    fn on_enqueued(&mut self, cases: &[QueuedCase]) {
        if cases.is_empty() {
            let _ = writeln!(self.out, "No tests collected");
        } else if self.verbose {
            let _ = writeln!(self.out, "collected {} cases", cases.len());
        }
    }

    fn on_output(&mut self, line: &str) {
        if self.verbose {
            let _ = writeln!(self.out, "{line}");
        }
    }

    fn on_started(&mut self, case: &CaseId) {
        if self.verbose {
            let _ = write!(self.out, "{case} ... ");
        }
    }

    fn on_skipped(&mut self, case: &CaseId) {
        let status = if self.verbose {
            format!("{case} ... {}\n", self.paint(YELLOW, "SKIPPED"))
        } else {
            self.paint(YELLOW, "s")
        };
        let _ = write!(self.out, "{status}");
    }

    fn on_passed(&mut self, _case: &CaseId, duration: Duration) {
        let status = if self.verbose {
            format!("{} ({}ms)\n", self.paint(GREEN, "PASSED"), duration.as_millis())
        } else {
            self.paint(GREEN, ".")
        };
        let _ = write!(self.out, "{status}");
    }

    fn on_failed(&mut self, case: &CaseId, failure: &FailureDetail, duration: Option<Duration>) {
        let status = if self.verbose {
            match duration {
                Some(duration) => format!("{} ({}ms)\n", self.paint(RED, "FAILED"), duration.as_millis()),
                None => format!("{}\n", self.paint(RED, "FAILED")),
            }
        } else {
            self.paint(RED, "F")
        };
        let _ = write!(self.out, "{status}");
        self.failures.push((case.clone(), failure.clone()));
    }

    fn on_batch_complete(&mut self, report: &BatchReport) {
        if !self.verbose && report.total() > 0 {
            let _ = writeln!(self.out);
        }

        if !self.failures.is_empty() {
            let _ = writeln!(self.out, "\n{}", "=".repeat(20) + " FAILURES " + &"=".repeat(20));
            for (case, failure) in &self.failures {
                let _ = writeln!(self.out, "{}", self.paint(RED, &format!("___ {case} ___")));
                let _ = writeln!(self.out, "[{}]", failure.kind);
                let _ = writeln!(self.out, "{}", failure.message);
            }
        }

        let mut parts = Vec::new();
        if report.passed() > 0 {
            parts.push(self.paint(GREEN, &format!("{} passed", report.passed())));
        }
        if report.failed() > 0 {
            parts.push(self.paint(RED, &format!("{} failed", report.failed())));
        }
        if report.skipped() > 0 {
            parts.push(self.paint(YELLOW, &format!("{} skipped", report.skipped())));
        }
        if parts.is_empty() {
            parts.push("no cases ran".to_string());
        }
        if report.cancelled {
            parts.push(self.paint(YELLOW, "cancelled"));
        }
        let _ = writeln!(
            self.out,
            "\n====== {} in {:.2}s ======",
            parts.join(", "),
            report.duration.as_secs_f64()
        );
    }
}

// ============================================================================
// JSON
// ============================================================================

#[derive(Serialize)]
struct JsonCase<'a> {
    id: String,
    status: CaseStatus,
    duration_ms: Option<u128>,
    failure: Option<&'a FailureDetail>,
}

#[derive(Serialize)]
struct JsonSummary<'a> {
    total: usize,
    passed: usize,
    failed: usize,
    skipped: usize,
    build_failed: bool,
    cancelled: bool,
    duration_ms: u128,
    cases: Vec<JsonCase<'a>>,
}

/// Writes a single JSON summary when the batch completes.
pub struct JsonReporter<W: Write = io::Stdout> {
    out: W,
}

impl JsonReporter {
    pub fn new() -> Self {
        Self { out: io::stdout() }
    }
}

impl Default for JsonReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> JsonReporter<W> {
    pub fn with_writer(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> TestReporter for JsonReporter<W> {
    fn on_batch_complete(&mut self, report: &BatchReport) {
        let summary = JsonSummary {
            total: report.total(),
            passed: report.passed(),
            failed: report.failed(),
            skipped: report.skipped(),
            build_failed: report.build_failed,
            cancelled: report.cancelled,
            duration_ms: report.duration.as_millis(),
            cases: report
                .cases
                .iter()
                .map(|case| JsonCase {
                    id: case.id.to_string(),
                    status: case.status,
                    duration_ms: case.duration.map(|d| d.as_millis()),
                    failure: case.failure.as_ref(),
                })
                .collect(),
        };
        if let Err(err) = serde_json::to_writer_pretty(&mut self.out, &summary) {
            tracing::warn!(error = %err, "failed to write JSON report");
            return;
        }
        let _ = writeln!(self.out);
    }
}

// ============================================================================
// Recording
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEvent {
    Enqueued(Vec<CaseId>),
    Output(String),
    Started(CaseId),
    Skipped(CaseId),
    Passed(CaseId),
    Failed(CaseId, FailureDetail),
    BatchComplete { passed: usize, failed: usize, skipped: usize },
}

/// Keeps every event, in order.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    pub events: Vec<ReportEvent>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of the cases that started, in order.
    pub fn started(&self) -> Vec<&CaseId> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ReportEvent::Started(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn failures(&self) -> Vec<(&CaseId, &FailureDetail)> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ReportEvent::Failed(id, failure) => Some((id, failure)),
                _ => None,
            })
            .collect()
    }
}

impl TestReporter for RecordingReporter {
    fn on_enqueued(&mut self, cases: &[QueuedCase]) {
        self.events
            .push(ReportEvent::Enqueued(cases.iter().map(|case| case.id.clone()).collect()));
    }

    fn on_output(&mut self, line: &str) {
        self.events.push(ReportEvent::Output(line.to_string()));
    }

    fn on_started(&mut self, case: &CaseId) {
        self.events.push(ReportEvent::Started(case.clone()));
    }

    fn on_skipped(&mut self, case: &CaseId) {
        self.events.push(ReportEvent::Skipped(case.clone()));
    }

    fn on_passed(&mut self, case: &CaseId, _duration: Duration) {
        self.events.push(ReportEvent::Passed(case.clone()));
    }

    fn on_failed(&mut self, case: &CaseId, failure: &FailureDetail, _duration: Option<Duration>) {
        self.events.push(ReportEvent::Failed(case.clone(), failure.clone()));
    }

    fn on_batch_complete(&mut self, report: &BatchReport) {
        self.events.push(ReportEvent::BatchComplete {
            passed: report.passed(),
            failed: report.failed(),
            skipped: report.skipped(),
        });
    }
}
