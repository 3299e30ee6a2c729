//! Scripted executor for engine and pipeline unit tests

use std::cell::RefCell;
use std::collections::VecDeque;

use super::CancellationFlag;
use crate::process::{CommandSpec, ExitStatus, Executor, RunResult};

/// Replays canned results in order and records every command it was asked to run.
#[derive(Default)]
pub(crate) struct Scripted {
    results: RefCell<VecDeque<RunResult>>,
    pub(crate) seen: RefCell<Vec<CommandSpec>>,
    /// Program whose first run requests cancellation while it is "running".
    cancel_on: Option<(String, CancellationFlag)>,
}

impl Scripted {
    pub(crate) fn new(results: Vec<RunResult>) -> Self {
        Self {
            results: RefCell::new(results.into()),
            seen: RefCell::default(),
            cancel_on: None,
        }
    }

    pub(crate) fn cancel_during(mut self, program: &str, flag: CancellationFlag) -> Self {
        self.cancel_on = Some((program.to_string(), flag));
        self
    }

    /// File names of the programs run so far.
    pub(crate) fn programs(&self) -> Vec<String> {
        self.seen
            .borrow()
            .iter()
            .map(|spec| {
                spec.program
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default()
            })
            .collect()
    }
}

impl Executor for Scripted {
    async fn run(&self, spec: &CommandSpec) -> RunResult {
        self.seen.borrow_mut().push(spec.clone());
        if let Some((program, flag)) = &self.cancel_on {
            if spec.program.file_name().is_some_and(|name| name == program.as_str()) {
                flag.cancel();
            }
        }
        self.results
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected command {spec}"))
    }
}

pub(crate) fn ok(stdout: &str, stderr: &str) -> RunResult {
    RunResult::from_exit(ExitStatus::Code(0), stdout.into(), stderr.into())
}

pub(crate) fn exited(code: i32, stderr: &str) -> RunResult {
    RunResult::from_exit(ExitStatus::Code(code), String::new(), stderr.into())
}
