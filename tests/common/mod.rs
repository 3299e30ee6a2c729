//! Sandboxed working directories with shell-script stand-ins for the programs under test

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tempfile::TempDir;
use verdict::engine::RecordingReporter;
use verdict::{BatchReport, Catalog, Engine, ProcessRunner, Selection, Settings};
use verdict_syntax::DefinitionStyle;

/// Writing an executable while another test thread forks can make exec fail with ETXTBSY; run one at a time.
static SERIAL: Mutex<()> = Mutex::new(());

pub struct Sandbox {
    dir: TempDir,
    _serial: MutexGuard<'static, ()>,
}

impl Sandbox {
    pub fn new() -> Self {
        let serial = SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Self {
            dir: tempfile::tempdir().unwrap(),
            _serial: serial,
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write an executable `/bin/sh` script.
    pub fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.path().join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    pub fn file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path().join(name).exists()
    }

    /// Settings whose build step always succeeds and that skip the memory checker.
    pub fn settings(&self) -> Settings {
        Settings::default()
            .with_build_tool("true")
            .with_memcheck(false)
            .with_run_timeout_secs(5)
    }

    /// Write `doc` as `tests.toml` and run every case in it.
    pub async fn run(&self, doc: &str, settings: &Settings) -> (BatchReport, RecordingReporter, Catalog) {
        let definition = self.file("tests.toml", doc);
        let mut catalog = Catalog::new();
        catalog.add_file(&definition, DefinitionStyle::Table);
        let runner = ProcessRunner::new();
        let mut reporter = RecordingReporter::new();
        let report = Engine::new(&runner, settings, self.path())
            .run_batch(&mut catalog, &Selection::all(), &mut reporter)
            .await
            .unwrap();
        (report, reporter, catalog)
    }
}

/// A `[config]` table naming `prog` and `ref` as the executables.
pub fn document(tests: &str) -> String {
    format!("[config]\nexec = \"prog\"\nref_exec = \"ref\"\nbuild_target = \"all\"\n\n{tests}")
}
