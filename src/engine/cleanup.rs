//! Post-batch cleanup
//!
//! Runs after every batch that built something, including one stopped by a build failure. Failures here are
//! logged and never change the batch result.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use super::reporter::TestReporter;
use crate::process::{CommandSpec, Executor};
use crate::settings::Settings;

pub async fn run_cleanup<E: Executor>(
    executor: &E,
    settings: &Settings,
    workdir: &Path,
    driver: Option<&Path>,
    reporter: &mut dyn TestReporter,
) {
    if settings.build.delete_artifacts {
        if let Some(driver) = driver {
            match fs::remove_file(driver) {
                Ok(()) => tracing::debug!(path = %driver.display(), "removed driver"),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => tracing::warn!(path = %driver.display(), error = %err, "could not remove driver"),
            }
        }
    }

    if settings.build.clean_on_exit {
        let spec = CommandSpec::new(&settings.build.tool).arg("clean").cwd(workdir);
        reporter.on_output(&spec.to_string());
        let result = executor.run(&spec).await;
        if !result.passed {
            tracing::warn!(command = %spec, exit = %result.exit, stderr = %result.stderr, "clean step failed");
        }
    }
}
