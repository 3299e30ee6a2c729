//! Per-case verification pipeline
//!
//! Stages run in a fixed order and stop at the first failure:
//!
//! 1. run the artifact under test (`RuntimeFailure` / `Timeout`);
//! 2. compare against a golden stdout file, or against a reference executable (stdout, then stderr, then each
//!    declared output file);
//! 3. re-run under the memory checker when enabled (`MemoryCheckFailure`).
//!
//! Declared output files are cleared before the test run, then read and deleted right after every run, so the
//! reference run cannot overwrite what the test wrote and nothing a case leaves behind is seen by the next one.
//! All comparisons are on raw bytes; text is decoded only to render diffs.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use difference::{Changeset, Difference};

use crate::outcome::{FailureDetail, FailureKind};
use crate::process::{CommandSpec, ExitStatus, Executor, RunResult};
use crate::settings::Settings;

/// Everything needed to verify one case, resolved against settings and the document's `[config]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CasePlan {
    pub name: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Relative to the working directory.
    pub stdin_file: Option<String>,
    /// Reference executable; `None` selects golden-file comparison.
    pub reference: Option<PathBuf>,
    pub created_files: Vec<String>,
}

/// Contents of one declared output file, `None` if it was not created.
type CapturedFile = (String, Option<Vec<u8>>);

pub struct Pipeline<'a, E> {
    executor: &'a E,
    settings: &'a Settings,
    workdir: &'a Path,
}

impl<'a, E: Executor> Pipeline<'a, E> {
    pub fn new(executor: &'a E, settings: &'a Settings, workdir: &'a Path) -> Self {
        Self {
            executor,
            settings,
            workdir,
        }
    }

    #[tracing::instrument(skip_all, fields(case = %plan.name))]
    pub async fn verify(&self, plan: &CasePlan) -> Result<(), FailureDetail> {
        let stdin = self.read_stdin(plan)?;

        // Leftovers from an earlier case must not count as this run's output
        self.take_created_files(plan);
        let run = self
            .executor
            .run(&self.command(&plan.program, plan, stdin.clone()))
            .await;
        let produced = self.take_created_files(plan);
        if !run.passed {
            let kind = if run.timed_out() {
                FailureKind::Timeout
            } else {
                FailureKind::RuntimeFailure
            };
            return Err(FailureDetail::new(kind, failure_message(&run, self.settings.run.timeout_secs)));
        }

        match &plan.reference {
            Some(reference) => {
                self.compare_reference(plan, reference, stdin.clone(), &run, produced)
                    .await?
            }
            None => self.compare_golden(plan, &run)?,
        }

        if self.settings.memcheck.enabled {
            self.memcheck(plan, stdin).await?;
        }
        Ok(())
    }

    fn read_stdin(&self, plan: &CasePlan) -> Result<Option<Vec<u8>>, FailureDetail> {
        let Some(file) = &plan.stdin_file else {
            return Ok(None);
        };
        fs::read(self.workdir.join(file)).map(Some).map_err(|err| {
            FailureDetail::new(FailureKind::RuntimeFailure, format!("cannot read stdin file {file}: {err}"))
        })
    }

    fn command(&self, program: &Path, plan: &CasePlan, stdin: Option<Vec<u8>>) -> CommandSpec {
        let spec = CommandSpec::new(self.workdir.join(program))
            .args(plan.args.iter().cloned())
            .cwd(self.workdir)
            .timeout(self.settings.run_timeout());
        match stdin {
            Some(input) => spec.stdin(input),
            None => spec,
        }
    }

    fn compare_golden(&self, plan: &CasePlan, run: &RunResult) -> Result<(), FailureDetail> {
        let golden = self.workdir.join(&self.settings.run.golden_dir).join(&plan.name);
        let expected = match fs::read(&golden) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(FailureDetail::new(
                    FailureKind::OutputMismatch,
                    format!("cannot read golden file {}: {err}", golden.display()),
                ));
            }
        };
        if expected == run.stdout_bytes {
            return Ok(());
        }
        Err(FailureDetail::new(
            FailureKind::OutputMismatch,
            format!(
                "stdout does not match {}\n{}",
                golden.display(),
                byte_diff(&expected, &run.stdout_bytes)
            ),
        ))
    }

    async fn compare_reference(
        &self,
        plan: &CasePlan,
        reference: &Path,
        stdin: Option<Vec<u8>>,
        run: &RunResult,
        produced: Vec<CapturedFile>,
    ) -> Result<(), FailureDetail> {
        let expected_run = self.executor.run(&self.command(reference, plan, stdin)).await;
        let expected_files = self.take_created_files(plan);

        if !expected_run.passed {
            return Err(FailureDetail::new(
                FailureKind::RuntimeFailure,
                format!(
                    "reference executable {} did not pass\n{}",
                    reference.display(),
                    failure_message(&expected_run, self.settings.run.timeout_secs)
                ),
            ));
        }

        if run.stdout_bytes != expected_run.stdout_bytes {
            return Err(FailureDetail::new(
                FailureKind::StdoutMismatch,
                format!(
                    "stdout differs from the reference\n{}",
                    byte_diff(&expected_run.stdout_bytes, &run.stdout_bytes)
                ),
            ));
        }
        if self.settings.run.diff_stderr && run.stderr_bytes != expected_run.stderr_bytes {
            return Err(FailureDetail::new(
                FailureKind::StderrMismatch,
                format!(
                    "stderr differs from the reference\n{}",
                    byte_diff(&expected_run.stderr_bytes, &run.stderr_bytes)
                ),
            ));
        }
        for ((name, actual), (_, expected)) in produced.iter().zip(&expected_files) {
            let message = match (actual, expected) {
                (Some(actual), Some(expected)) if actual != expected => {
                    format!("{name} differs from the reference\n{}", byte_diff(expected, actual))
                }
                (None, Some(_)) => format!("{name} was not created by the test"),
                (Some(_), None) => format!("{name} was not created by the reference executable"),
                _ => continue,
            };
            return Err(FailureDetail::new(FailureKind::OutputFileMismatch(name.clone()), message));
        }
        Ok(())
    }

    /// Read every declared output file and delete it.
    fn take_created_files(&self, plan: &CasePlan) -> Vec<CapturedFile> {
        plan.created_files
            .iter()
            .map(|name| {
                let path = self.workdir.join(name);
                let contents = fs::read(&path).ok();
                if contents.is_some() {
                    if let Err(err) = fs::remove_file(&path) {
                        tracing::warn!(path = %path.display(), error = %err, "could not remove output file");
                    }
                }
                (name.clone(), contents)
            })
            .collect()
    }

    async fn memcheck(&self, plan: &CasePlan, stdin: Option<Vec<u8>>) -> Result<(), FailureDetail> {
        let memcheck = &self.settings.memcheck;
        let mut spec = CommandSpec::new(&memcheck.tool)
            .args(memcheck.flag_list())
            .arg(format!("--error-exitcode={}", memcheck.error_exitcode))
            .arg(self.workdir.join(&plan.program).display().to_string())
            .args(plan.args.iter().cloned())
            .cwd(self.workdir)
            .timeout(self.settings.memcheck_timeout());
        if let Some(input) = stdin {
            spec = spec.stdin(input);
        }

        let result = self.executor.run(&spec).await;
        // The memory check may rewrite declared outputs; they were already compared
        self.take_created_files(plan);
        if result.passed {
            return Ok(());
        }
        Err(FailureDetail::new(
            FailureKind::MemoryCheckFailure,
            failure_message(&result, memcheck.timeout_secs),
        ))
    }
}

/// `stdout\n------\n<stdout>\nstderr\n------\n<stderr>`, with the stderr part replaced on timeout.
pub fn failure_message(run: &RunResult, timeout_secs: u64) -> String {
    let stderr = match &run.exit {
        ExitStatus::TimedOut => format!("test timed out - (took >{timeout_secs} seconds)"),
        ExitStatus::SpawnFailed(reason) => reason.clone(),
        ExitStatus::Code(_) | ExitStatus::Signal(_) => run.stderr.clone(),
    };
    format!("stdout\n------\n{}\nstderr\n------\n{}", run.stdout, stderr)
}

/// Line diff of two byte strings, noting when they only differ in bytes that are not valid UTF-8.
fn byte_diff(expected: &[u8], actual: &[u8]) -> String {
    let expected = String::from_utf8_lossy(expected);
    let actual = String::from_utf8_lossy(actual);
    let diff = line_diff(&expected, &actual);
    if expected == actual {
        format!("(outputs differ only in bytes that are not valid UTF-8)\n{diff}")
    } else {
        diff
    }
}

/// Line diff of `expected` against `actual`: `-` lines only in expected, `+` lines only in actual.
pub fn line_diff(expected: &str, actual: &str) -> String {
    let changeset = Changeset::new(expected, actual, "\n");
    let mut out = String::new();
    for diff in &changeset.diffs {
        let (marker, text) = match diff {
            Difference::Same(text) => (' ', text),
            Difference::Rem(text) => ('-', text),
            Difference::Add(text) => ('+', text),
        };
        for line in text.split('\n') {
            out.push(marker);
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{Scripted, exited, ok};
    use crate::process::TIMEOUT_EXIT_CODE;

    fn plan(reference: Option<&str>) -> CasePlan {
        CasePlan {
            name: "t1".into(),
            program: "a.out".into(),
            args: vec!["x".into()],
            stdin_file: None,
            reference: reference.map(PathBuf::from),
            created_files: Vec::new(),
        }
    }

    fn settings(memcheck: bool) -> Settings {
        Settings::default().with_memcheck(memcheck)
    }

    #[tokio::test]
    async fn test_reference_match_passes() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Scripted::new(vec![ok("hi\n", ""), ok("hi\n", "")]);
        let settings = settings(false);
        let result = Pipeline::new(&exec, &settings, dir.path()).verify(&plan(Some("ref"))).await;
        assert_eq!(result, Ok(()));
        assert_eq!(exec.programs(), ["a.out", "ref"]);
        let seen = exec.seen.borrow();
        assert_eq!(seen[0].args, ["x"]);
        assert_eq!(seen[1].args, ["x"]);
        assert_eq!(seen[0].timeout, settings.run_timeout());
    }

    #[tokio::test]
    async fn test_timeout_stops_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Scripted::new(vec![RunResult::from_exit(ExitStatus::TimedOut, "partial".into(), String::new())]);
        let settings = settings(true).with_run_timeout_secs(2);
        let err = Pipeline::new(&exec, &settings, dir.path())
            .verify(&plan(Some("ref")))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::Timeout);
        assert_eq!(err.message, "stdout\n------\npartial\nstderr\n------\ntest timed out - (took >2 seconds)");
        assert_eq!(exec.programs(), ["a.out"]);
    }

    #[tokio::test]
    async fn test_exit_124_is_runtime_failure() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Scripted::new(vec![exited(TIMEOUT_EXIT_CODE, "boom")]);
        let settings = settings(false);
        let err = Pipeline::new(&exec, &settings, dir.path())
            .verify(&plan(None))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::RuntimeFailure);
        assert!(err.message.ends_with("stderr\n------\nboom"));
    }

    #[tokio::test]
    async fn test_stdout_checked_before_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Scripted::new(vec![ok("a\n", "e1"), ok("b\n", "e2")]);
        let settings = settings(false);
        let err = Pipeline::new(&exec, &settings, dir.path())
            .verify(&plan(Some("ref")))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::StdoutMismatch);
        assert!(err.message.contains("-b"));
        assert!(err.message.contains("+a"));
    }

    #[tokio::test]
    async fn test_stderr_mismatch_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Scripted::new(vec![ok("same", "e1"), ok("same", "e2")]);
        let settings = settings(false);
        let err = Pipeline::new(&exec, &settings, dir.path())
            .verify(&plan(Some("ref")))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::StderrMismatch);

        let exec = Scripted::new(vec![ok("same", "e1"), ok("same", "e2")]);
        let mut settings = settings;
        settings.run.diff_stderr = false;
        let result = Pipeline::new(&exec, &settings, dir.path()).verify(&plan(Some("ref"))).await;
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn test_failing_reference_is_runtime_failure() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Scripted::new(vec![ok("", ""), RunResult::spawn_failed("ref: not found")]);
        let settings = settings(false);
        let err = Pipeline::new(&exec, &settings, dir.path())
            .verify(&plan(Some("ref")))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::RuntimeFailure);
        assert!(err.message.starts_with("reference executable ref did not pass"));
        assert!(err.message.ends_with("ref: not found"));
    }

    #[tokio::test]
    async fn test_golden_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("stdout")).unwrap();
        fs::write(dir.path().join("stdout/t1"), "expected\n").unwrap();
        let settings = settings(false);

        let exec = Scripted::new(vec![ok("expected\n", "noise")]);
        assert_eq!(Pipeline::new(&exec, &settings, dir.path()).verify(&plan(None)).await, Ok(()));

        let exec = Scripted::new(vec![ok("actual\n", "")]);
        let err = Pipeline::new(&exec, &settings, dir.path())
            .verify(&plan(None))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::OutputMismatch);
        assert!(err.message.contains("-expected"));
        assert!(err.message.contains("+actual"));
    }

    #[tokio::test]
    async fn test_missing_golden_file_passes() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Scripted::new(vec![ok("whatever", "")]);
        let settings = settings(false);
        assert_eq!(Pipeline::new(&exec, &settings, dir.path()).verify(&plan(None)).await, Ok(()));
    }

    #[tokio::test]
    async fn test_golden_compares_raw_bytes() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("stdout")).unwrap();
        fs::write(dir.path().join("stdout/t1"), b"\xff\n").unwrap();
        let settings = settings(false);

        let exec = Scripted::new(vec![RunResult::from_bytes(ExitStatus::Code(0), b"\xff\n".to_vec(), Vec::new())]);
        assert_eq!(Pipeline::new(&exec, &settings, dir.path()).verify(&plan(None)).await, Ok(()));

        let exec = Scripted::new(vec![RunResult::from_bytes(ExitStatus::Code(0), b"\xfe\n".to_vec(), Vec::new())]);
        let err = Pipeline::new(&exec, &settings, dir.path())
            .verify(&plan(None))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::OutputMismatch);
        assert!(err.message.contains("differ only in bytes that are not valid UTF-8"));
    }

    #[tokio::test]
    async fn test_reference_compares_raw_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Scripted::new(vec![
            RunResult::from_bytes(ExitStatus::Code(0), b"\xff".to_vec(), Vec::new()),
            RunResult::from_bytes(ExitStatus::Code(0), b"\xfe".to_vec(), Vec::new()),
        ]);
        let settings = settings(false);
        let err = Pipeline::new(&exec, &settings, dir.path())
            .verify(&plan(Some("ref")))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::StdoutMismatch);
    }

    #[tokio::test]
    async fn test_leftover_output_file_is_not_the_test_output() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("out.txt"), "stale").unwrap();
        let exec = Scripted::new(vec![ok("", ""), ok("", "")]);
        let settings = settings(false);
        let mut plan = plan(Some("ref"));
        plan.created_files = vec!["out.txt".into()];

        assert_eq!(Pipeline::new(&exec, &settings, dir.path()).verify(&plan).await, Ok(()));
        assert!(!dir.path().join("out.txt").exists());
    }

    #[tokio::test]
    async fn test_output_files_removed_when_run_fails() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("out.txt"), "partial").unwrap();
        let exec = Scripted::new(vec![exited(1, "crash")]);
        let settings = settings(false);
        let mut plan = plan(None);
        plan.created_files = vec!["out.txt".into()];

        let err = Pipeline::new(&exec, &settings, dir.path()).verify(&plan).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::RuntimeFailure);
        assert!(!dir.path().join("out.txt").exists());
    }

    #[test]
    fn test_byte_diff_plain_text_has_no_note() {
        let diff = byte_diff(b"a\n", b"b\n");
        assert!(!diff.contains("UTF-8"));
        assert!(diff.contains("-a\n"));
    }

    #[tokio::test]
    async fn test_memcheck_runs_last_with_its_own_flags() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Scripted::new(vec![
            ok("", ""),
            ok("", ""),
            exited(1, "definitely lost"),
        ]);
        let settings = settings(true);
        let err = Pipeline::new(&exec, &settings, dir.path())
            .verify(&plan(Some("ref")))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::MemoryCheckFailure);
        assert!(err.message.ends_with("definitely lost"));

        let seen = exec.seen.borrow();
        let memcheck = &seen[2];
        assert_eq!(memcheck.program, PathBuf::from("valgrind"));
        assert_eq!(memcheck.args[0], "--leak-check=full");
        assert_eq!(memcheck.args[1], "--error-exitcode=1");
        assert!(memcheck.args[2].ends_with("a.out"));
        assert_eq!(memcheck.args[3], "x");
        assert_eq!(memcheck.timeout, settings.memcheck_timeout());
    }

    #[tokio::test]
    async fn test_missing_stdin_file() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Scripted::default();
        let settings = settings(false);
        let mut plan = plan(None);
        plan.stdin_file = Some("absent.txt".into());
        let err = Pipeline::new(&exec, &settings, dir.path()).verify(&plan).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::RuntimeFailure);
        assert!(err.message.starts_with("cannot read stdin file absent.txt"));
        assert!(exec.seen.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_stdin_forwarded_to_every_run() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("in.txt"), "input").unwrap();
        let exec = Scripted::new(vec![ok("", ""), ok("", ""), ok("", "")]);
        let settings = settings(true);
        let mut plan = plan(Some("ref"));
        plan.stdin_file = Some("in.txt".into());
        assert_eq!(Pipeline::new(&exec, &settings, dir.path()).verify(&plan).await, Ok(()));
        assert!(exec.seen.borrow().iter().all(|spec| spec.stdin.as_deref() == Some(b"input".as_slice())));
    }

    #[test]
    fn test_failure_message_layout() {
        let run = RunResult::from_exit(ExitStatus::Code(2), "out".into(), "err".into());
        assert_eq!(failure_message(&run, 10), "stdout\n------\nout\nstderr\n------\nerr");
    }

    #[test]
    fn test_line_diff_marks_changes() {
        let diff = line_diff("a\nb\nc", "a\nx\nc");
        assert!(diff.contains(" a\n"));
        assert!(diff.contains("-b\n"));
        assert!(diff.contains("+x\n"));
        assert!(diff.contains(" c\n"));
    }
}
