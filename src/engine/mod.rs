//! Execution engine
//!
//! One batch moves through four phases, strictly in sequence:
//!
//! - **Discovering**: parse any unresolved files, snapshot the selected cases in catalog order and reset their
//!   run state.
//! - **Building**: regenerate the driver for embedded-signature files, then run exactly one build. A failing build
//!   becomes a single synthetic `compilation` failure and no case runs.
//! - **Running**: verify each case in order. Cancellation is checked before each case starts; a cancelled case is
//!   skipped, never reordered.
//! - **Finished**: report the batch, then clean up.
//!
//! No two cases ever run at once. They share one artifact, one working directory and fixed output-file paths.

pub mod cancel;
pub mod cleanup;
pub mod pipeline;
pub mod reporter;
#[cfg(test)]
pub(crate) mod testing;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;
use verdict_syntax::DefinitionStyle;

pub use cancel::CancellationFlag;
pub use pipeline::{CasePlan, Pipeline};
pub use reporter::{ConsoleReporter, JsonReporter, RecordingReporter, ReportEvent, TestReporter};

use crate::catalog::{CaseId, Catalog, QueuedCase, Selection};
use crate::driver::{self, DriverError};
use crate::outcome::{CaseRunState, CaseStatus, FailureDetail, FailureKind};
use crate::process::{CommandSpec, ExitStatus, Executor};
use crate::settings::Settings;

/// Name of the synthetic case reported when the build fails.
pub const COMPILATION_CASE: &str = "compilation";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Driver(#[from] DriverError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    Discovering,
    Building,
    Running,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseReport {
    pub id: CaseId,
    pub status: CaseStatus,
    pub duration: Option<Duration>,
    pub failure: Option<FailureDetail>,
}

impl CaseReport {
    fn from_state(id: CaseId, state: &CaseRunState) -> Self {
        Self {
            id,
            status: state.status,
            duration: state.last_duration,
            failure: state.failure.clone(),
        }
    }
}

/// Outcome of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub cases: Vec<CaseReport>,
    /// Set when the build failed; `cases` then holds only the synthetic compilation case.
    pub build_failed: bool,
    /// Set when at least one case was skipped because of cancellation.
    pub cancelled: bool,
    pub duration: Duration,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.cases.len()
    }

    pub fn passed(&self) -> usize {
        self.count(CaseStatus::Passed)
    }

    pub fn failed(&self) -> usize {
        self.count(CaseStatus::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(CaseStatus::Skipped)
    }

    /// True when the build succeeded and no case failed.
    pub fn success(&self) -> bool {
        !self.build_failed && self.failed() == 0
    }

    fn count(&self, status: CaseStatus) -> usize {
        self.cases.iter().filter(|case| case.status == status).count()
    }
}

pub struct Engine<'a, E> {
    executor: &'a E,
    settings: &'a Settings,
    workdir: PathBuf,
    cancel: CancellationFlag,
}

impl<'a, E: Executor> Engine<'a, E> {
    pub fn new(executor: &'a E, settings: &'a Settings, workdir: impl Into<PathBuf>) -> Self {
        Self {
            executor,
            settings,
            workdir: workdir.into(),
            cancel: CancellationFlag::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle that requests cooperative cancellation of the running batch.
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    #[tracing::instrument(skip_all, fields(workdir = %self.workdir.display()))]
    pub async fn run_batch(
        &self,
        catalog: &mut Catalog,
        selection: &Selection,
        reporter: &mut dyn TestReporter,
    ) -> Result<BatchReport, EngineError> {
        let started = Instant::now();
        let mut report = BatchReport::default();

        enter(BatchPhase::Discovering);
        for err in catalog.resolve_pending() {
            tracing::warn!(error = %err, "definition file could not be loaded");
        }
        for file in catalog.files() {
            if file.is_ready() && !file.config_usable() {
                tracing::warn!(file = %file.path.display(), "[config] has errors; using default executable names");
            }
        }
        let queue = catalog.snapshot(selection);
        let ids: Vec<CaseId> = queue.iter().map(|case| case.id.clone()).collect();
        catalog.reset_states(&ids);
        reporter.on_enqueued(&queue);
        tracing::info!(cases = queue.len(), "selection resolved");

        if queue.is_empty() {
            enter(BatchPhase::Finished);
            report.duration = started.elapsed();
            reporter.on_batch_complete(&report);
            return Ok(report);
        }

        enter(BatchPhase::Building);
        let driver = self.prepare_driver(catalog, &queue)?;
        if let Err(failure) = self.build(&queue, reporter).await {
            let id = CaseId::new(&queue[0].id.file, COMPILATION_CASE);
            tracing::info!(case = %id, "build failed; no cases will run");
            reporter.on_started(&id);
            reporter.on_failed(&id, &failure, None);
            report.cases.push(CaseReport {
                id,
                status: CaseStatus::Failed,
                duration: None,
                failure: Some(failure),
            });
            report.build_failed = true;
            return Ok(self.finish(report, started, driver.as_deref(), reporter).await);
        }

        enter(BatchPhase::Running);
        let pipeline = Pipeline::new(self.executor, self.settings, &self.workdir);
        for case in &queue {
            if self.cancel.is_cancelled() {
                tracing::debug!(case = %case.id, "cancelled before start");
                reporter.on_skipped(&case.id);
                let state = CaseRunState::skipped();
                report.cases.push(CaseReport::from_state(case.id.clone(), &state));
                report.cancelled = true;
                catalog.apply_result(&case.id, case.generation, state);
                continue;
            }

            reporter.on_started(&case.id);
            let plan = self.plan(case);
            let case_started = Instant::now();
            let outcome = pipeline.verify(&plan).await;
            let duration = case_started.elapsed();

            let state = match outcome {
                Ok(()) => {
                    reporter.on_passed(&case.id, duration);
                    CaseRunState::passed(duration)
                }
                Err(failure) => {
                    tracing::debug!(case = %case.id, kind = %failure.kind, "case failed");
                    reporter.on_failed(&case.id, &failure, Some(duration));
                    CaseRunState::failed(duration, failure)
                }
            };
            report.cases.push(CaseReport::from_state(case.id.clone(), &state));
            if !catalog.apply_result(&case.id, case.generation, state) {
                tracing::debug!(case = %case.id, "result not stored; file changed during the batch");
            }
        }

        Ok(self.finish(report, started, driver.as_deref(), reporter).await)
    }

    async fn finish(
        &self,
        mut report: BatchReport,
        started: Instant,
        driver: Option<&Path>,
        reporter: &mut dyn TestReporter,
    ) -> BatchReport {
        enter(BatchPhase::Finished);
        report.duration = started.elapsed();
        tracing::info!(
            passed = report.passed(),
            failed = report.failed(),
            skipped = report.skipped(),
            build_failed = report.build_failed,
            "batch complete"
        );
        reporter.on_batch_complete(&report);
        cleanup::run_cleanup(self.executor, self.settings, &self.workdir, driver, reporter).await;
        report
    }

    /// Write the driver for the first embedded-signature file in the queue, if any.
    fn prepare_driver(&self, catalog: &Catalog, queue: &[QueuedCase]) -> Result<Option<PathBuf>, EngineError> {
        let mut headers: Vec<&Path> = Vec::new();
        for case in queue.iter().filter(|case| case.style == DefinitionStyle::Signature) {
            if !headers.contains(&case.id.file.as_path()) {
                headers.push(&case.id.file);
            }
        }
        let Some(header) = headers.first() else {
            return Ok(None);
        };
        if headers.len() > 1 {
            tracing::warn!(
                used = %header.display(),
                ignored = headers.len() - 1,
                "only one embedded-signature file can be driven per batch"
            );
        }

        // Every test in the file goes into the driver, selected or not, so the build stays the same
        let names: Vec<String> = catalog
            .file(header)
            .map(|file| file.cases().into_iter().map(|(_, case)| case.name().to_string()).collect())
            .unwrap_or_default();
        let out = self.workdir.join(&self.settings.project.driver_file);
        driver::write(header, &names, &out)?;
        Ok(Some(out))
    }

    async fn build(&self, queue: &[QueuedCase], reporter: &mut dyn TestReporter) -> Result<(), FailureDetail> {
        let mut spec = CommandSpec::new(&self.settings.build.tool).cwd(&self.workdir);
        if let Some(target) = self.build_target(queue) {
            spec = spec.arg(target);
        }
        reporter.on_output(&spec.to_string());
        tracing::info!(command = %spec, "building");

        let result = self.executor.run(&spec).await;
        if result.passed {
            return Ok(());
        }
        let message = match &result.exit {
            ExitStatus::SpawnFailed(reason) => reason.clone(),
            _ if result.stderr.is_empty() => format!("`{spec}` failed with {}", result.exit),
            _ => result.stderr.clone(),
        };
        Err(FailureDetail::new(FailureKind::BuildFailure, message))
    }

    /// The first target named by a selected document, else the configured default.
    fn build_target(&self, queue: &[QueuedCase]) -> Option<String> {
        let mut targets = queue
            .iter()
            .filter_map(|case| case.config.as_ref().and_then(|config| config.build_target.as_deref()));
        let Some(first) = targets.next() else {
            return self.settings.build.target.clone();
        };
        if let Some(other) = targets.find(|target| *target != first) {
            tracing::warn!(used = first, ignored = other, "selected documents name different build targets");
        }
        Some(first.to_string())
    }

    fn plan(&self, case: &QueuedCase) -> CasePlan {
        let config = case.config.as_ref();
        let executable = config
            .and_then(|config| config.executable.clone())
            .unwrap_or_else(|| self.settings.project.executable.clone());
        let reference = config
            .and_then(|config| config.reference.clone())
            .or_else(|| self.settings.project.reference.clone())
            .filter(|reference| !reference.is_empty());

        // A driver dispatches on its first argument
        let mut args = match case.style {
            DefinitionStyle::Signature => vec![case.record.name.clone()],
            DefinitionStyle::Table => Vec::new(),
        };
        args.extend(case.record.argv.iter().cloned());

        CasePlan {
            name: case.record.name.clone(),
            program: PathBuf::from(executable),
            args,
            stdin_file: case.record.stdin_file.clone(),
            reference: reference.map(PathBuf::from),
            created_files: case.record.created_files.clone(),
        }
    }
}

fn enter(phase: BatchPhase) {
    tracing::info!(?phase, "batch phase");
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::engine::testing::{Scripted, exited, ok};

    const DOC: &str = r#"
[config]
exec = "prog"
ref_exec = "ref"
build_target = "all"

[tests.first]
argv = ["1"]

[tests.second]
argv = ["2"]
"#;

    fn settings() -> Settings {
        Settings::default().with_memcheck(false)
    }

    fn catalog_with(path: &str, text: &str) -> Catalog {
        let mut catalog = Catalog::new();
        catalog.build_or_update(Path::new(path), text);
        catalog
    }

    #[tokio::test]
    async fn test_builds_once_then_runs_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = catalog_with("tests.toml", DOC);
        let exec = Scripted::new(vec![ok("", ""), ok("a", ""), ok("a", ""), ok("b", ""), ok("b", "")]);
        let settings = settings();
        let mut reporter = RecordingReporter::new();

        let report = Engine::new(&exec, &settings, dir.path())
            .run_batch(&mut catalog, &Selection::all(), &mut reporter)
            .await
            .unwrap();

        assert!(report.success());
        assert_eq!(report.passed(), 2);
        assert_eq!(exec.programs(), ["make", "prog", "ref", "prog", "ref"]);
        assert_eq!(exec.seen.borrow()[0].to_string(), "make all");
        let names: Vec<_> = reporter.started().iter().map(|id| id.name.as_str()).collect();
        assert_eq!(names, ["first", "second"]);

        let first = catalog.case(&CaseId::new("tests.toml", "first")).unwrap();
        assert_eq!(first.state.status, CaseStatus::Passed);
        assert!(first.state.last_duration.is_some());
    }

    #[tokio::test]
    async fn test_build_failure_stops_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = catalog_with("tests.toml", DOC);
        let exec = Scripted::new(vec![exited(2, "main.cpp:3: error: expected ';'")]);
        let settings = settings();
        let mut reporter = RecordingReporter::new();

        let report = Engine::new(&exec, &settings, dir.path())
            .run_batch(&mut catalog, &Selection::all(), &mut reporter)
            .await
            .unwrap();

        assert!(report.build_failed);
        assert!(!report.success());
        assert_eq!(report.cases.len(), 1);
        assert_eq!(report.cases[0].id.name, COMPILATION_CASE);
        let failure = report.cases[0].failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::BuildFailure);
        assert_eq!(failure.message, "main.cpp:3: error: expected ';'");
        assert_eq!(exec.programs(), ["make"]);
        let first = catalog.case(&CaseId::new("tests.toml", "first")).unwrap();
        assert_eq!(first.state.status, CaseStatus::Unknown);
    }

    #[tokio::test]
    async fn test_empty_selection_skips_build() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = catalog_with("tests.toml", DOC);
        let exec = Scripted::default();
        let settings = settings();
        let mut reporter = RecordingReporter::new();
        let report = Engine::new(&exec, &settings, dir.path())
            .run_batch(&mut catalog, &Selection::all().with_filter("nothing"), &mut reporter)
            .await
            .unwrap();
        assert_eq!(report.total(), 0);
        assert!(report.success());
        assert!(exec.seen.borrow().is_empty());
        assert!(matches!(reporter.events.last(), Some(ReportEvent::BatchComplete { .. })));
    }

    #[tokio::test]
    async fn test_cancelled_cases_are_skipped_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = catalog_with("tests.toml", DOC);
        let exec = Scripted::new(vec![ok("", "")]);
        let settings = settings();
        let engine = Engine::new(&exec, &settings, dir.path());
        engine.cancellation().cancel();
        let mut reporter = RecordingReporter::new();
        let report = engine
            .run_batch(&mut catalog, &Selection::all(), &mut reporter)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.skipped(), 2);
        assert_eq!(report.passed() + report.failed(), 0);
        let skipped: Vec<_> = reporter
            .events
            .iter()
            .filter_map(|event| match event {
                ReportEvent::Skipped(id) => Some(id.name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(skipped, ["first", "second"]);
        assert_eq!(exec.programs(), ["make"]);
    }

    #[tokio::test]
    async fn test_cancel_during_case_lets_it_finish() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings();

        for (test_run, expected) in [(ok("a", ""), CaseStatus::Passed), (exited(1, "crash"), CaseStatus::Failed)] {
            let cancel = CancellationFlag::new();
            let mut catalog = catalog_with("tests.toml", DOC);
            let results = if expected == CaseStatus::Passed {
                vec![ok("", ""), test_run, ok("a", "")]
            } else {
                vec![ok("", ""), test_run]
            };
            let exec = Scripted::new(results).cancel_during("prog", cancel.clone());
            let mut reporter = RecordingReporter::new();
            let report = Engine::new(&exec, &settings, dir.path())
                .with_cancellation(cancel.clone())
                .run_batch(&mut catalog, &Selection::all(), &mut reporter)
                .await
                .unwrap();

            let statuses: Vec<_> = report.cases.iter().map(|case| (case.id.name.as_str(), case.status)).collect();
            assert_eq!(statuses, [("first", expected), ("second", CaseStatus::Skipped)]);
            assert!(report.cancelled);
            let started: Vec<_> = reporter.started().iter().map(|id| id.name.as_str()).collect();
            assert_eq!(started, ["first"]);
            assert_eq!(
                catalog.case(&CaseId::new("tests.toml", "first")).unwrap().state.status,
                expected
            );
        }
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_later_cases() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = catalog_with("tests.toml", DOC);
        let exec = Scripted::new(vec![ok("", ""), exited(1, "crash"), ok("b", ""), ok("b", "")]);
        let settings = settings();
        let mut reporter = RecordingReporter::new();
        let report = Engine::new(&exec, &settings, dir.path())
            .run_batch(&mut catalog, &Selection::all(), &mut reporter)
            .await
            .unwrap();
        assert_eq!(report.failed(), 1);
        assert_eq!(report.passed(), 1);
        assert_eq!(report.cases[0].failure.as_ref().unwrap().kind, FailureKind::RuntimeFailure);
    }

    #[tokio::test]
    async fn test_signature_file_writes_driver_and_dispatches_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let header = dir.path().join("unit_tests.h");
        let source = "void alpha() {}\nvoid beta() {}\n";
        fs::write(&header, source).unwrap();
        let mut catalog = Catalog::new();
        catalog.build_or_update(&header, source);

        let mut settings = settings();
        settings.build.delete_artifacts = false;
        let exec = Scripted::new(vec![ok("", ""), ok("", "")]);
        let mut reporter = RecordingReporter::new();
        let only_beta = Selection::all().with_filter("beta");
        let report = Engine::new(&exec, &settings, dir.path())
            .run_batch(&mut catalog, &only_beta, &mut reporter)
            .await
            .unwrap();
        assert!(report.success());

        let driver = fs::read_to_string(dir.path().join("unit_test_driver.cpp")).unwrap();
        assert!(driver.contains("{ \"alpha\", alpha },"));
        assert!(driver.contains("{ \"beta\", beta },"));

        let seen = exec.seen.borrow();
        assert_eq!(seen[0].to_string(), "make");
        assert!(seen[1].program.ends_with("a.out"));
        assert_eq!(seen[1].args, ["beta"]);
    }

    #[tokio::test]
    async fn test_config_errors_fall_back_to_settings() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = catalog_with("tests.toml", "[config]\nexec = \"custom\"\n[tests.only]\n");
        let mut settings = settings();
        settings.build.target = Some("tests".into());
        let exec = Scripted::new(vec![ok("", ""), ok("", "")]);
        let mut reporter = RecordingReporter::new();
        Engine::new(&exec, &settings, dir.path())
            .run_batch(&mut catalog, &Selection::all(), &mut reporter)
            .await
            .unwrap();
        assert_eq!(exec.programs(), ["make", "a.out"]);
        assert_eq!(exec.seen.borrow()[0].args, ["tests"]);
    }

    #[test]
    fn test_first_document_target_wins() {
        let settings = settings();
        let exec = Scripted::default();
        let engine = Engine::new(&exec, &settings, "/tmp");
        let mut catalog = catalog_with("a.toml", DOC);
        catalog.build_or_update(Path::new("b.toml"), &DOC.replace("\"all\"", "\"other\""));
        let queue = catalog.snapshot(&Selection::all());
        assert_eq!(engine.build_target(&queue).as_deref(), Some("all"));
    }
}
