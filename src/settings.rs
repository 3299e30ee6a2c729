//! Runner settings
//!
//! Plain key/value configuration consumed by the engine: timeouts, memory-check flags, build command, default
//! executable names. Every key has a default, so an empty (or missing) settings file is valid.
//!
//! Settings come from three layers, later ones winning:
//! 1. built-in defaults;
//! 2. an optional TOML file (`verdict.toml`);
//! 3. `--set key=value` overrides from the command line.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Settings file looked up in the working directory when none is given explicitly.
pub const DEFAULT_SETTINGS_FILE: &str = "verdict.toml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings file {}: {message}", path.display())]
    Toml { path: PathBuf, message: String },

    #[error("unknown setting `{0}`")]
    UnknownKey(String),

    #[error("invalid value `{value}` for `{key}`: expected {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },

    #[error("override `{0}` is not of the form key=value")]
    MalformedOverride(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub run: RunSettings,
    pub memcheck: MemcheckSettings,
    pub build: BuildSettings,
    pub project: ProjectSettings,
    pub discovery: DiscoverySettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Wall-clock timeout for artifact and reference runs; 0 disables it.
    pub timeout_secs: u64,
    /// Directory holding golden stdout files, one per case name.
    pub golden_dir: String,
    pub diff_stderr: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            golden_dir: "stdout".to_string(),
            diff_stderr: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemcheckSettings {
    pub enabled: bool,
    pub tool: String,
    /// Whitespace-separated flags passed before `--error-exitcode`.
    pub flags: String,
    pub error_exitcode: i32,
    pub timeout_secs: u64,
}

impl Default for MemcheckSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            tool: "valgrind".to_string(),
            flags: "--leak-check=full".to_string(),
            error_exitcode: 1,
            timeout_secs: 30,
        }
    }
}

impl MemcheckSettings {
    pub fn flag_list(&self) -> Vec<String> {
        self.flags.split_whitespace().map(str::to_string).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    pub tool: String,
    /// Target used when no selected document names one.
    pub target: Option<String>,
    pub clean_on_exit: bool,
    pub delete_artifacts: bool,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            tool: "make".to_string(),
            target: None,
            clean_on_exit: false,
            delete_artifacts: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    pub executable: String,
    pub reference: Option<String>,
    pub driver_file: String,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            executable: "a.out".to_string(),
            reference: None,
            driver_file: "unit_test_driver.cpp".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    pub signature_files: Vec<String>,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            signature_files: vec!["unit_tests.h".to_string()],
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse settings from TOML text. Unknown keys are ignored.
    pub fn from_toml(text: &str, path: &Path) -> Result<Self, SettingsError> {
        toml::from_str(text).map_err(|err| SettingsError::Toml {
            path: path.to_path_buf(),
            message: err.message().to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text, path)
    }

    /// Load `path` if given, else `verdict.toml` under `dir` if it exists, else defaults.
    pub fn discover(path: Option<&Path>, dir: &Path) -> Result<Self, SettingsError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let implicit = dir.join(DEFAULT_SETTINGS_FILE);
        if implicit.is_file() {
            tracing::debug!(path = %implicit.display(), "loading settings");
            Self::load(&implicit)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply one `key=value` override.
    pub fn apply_assignment(&mut self, assignment: &str) -> Result<(), SettingsError> {
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| SettingsError::MalformedOverride(assignment.to_string()))?;
        self.apply_override(key.trim(), value.trim())
    }

    /// Set a single dotted key (for example `memcheck.enabled`) from its string form.
    pub fn apply_override(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        match key {
            "run.timeout_secs" => self.run.timeout_secs = parse_value(key, value, "a non-negative integer")?,
            "run.golden_dir" => self.run.golden_dir = value.to_string(),
            "run.diff_stderr" => self.run.diff_stderr = parse_value(key, value, "true or false")?,
            "memcheck.enabled" => self.memcheck.enabled = parse_value(key, value, "true or false")?,
            "memcheck.tool" => self.memcheck.tool = value.to_string(),
            "memcheck.flags" => self.memcheck.flags = value.to_string(),
            "memcheck.error_exitcode" => self.memcheck.error_exitcode = parse_value(key, value, "an integer")?,
            "memcheck.timeout_secs" => {
                self.memcheck.timeout_secs = parse_value(key, value, "a non-negative integer")?
            }
            "build.tool" => self.build.tool = value.to_string(),
            "build.target" => self.build.target = non_empty(value),
            "build.clean_on_exit" => self.build.clean_on_exit = parse_value(key, value, "true or false")?,
            "build.delete_artifacts" => self.build.delete_artifacts = parse_value(key, value, "true or false")?,
            "project.executable" => self.project.executable = value.to_string(),
            "project.reference" => self.project.reference = non_empty(value),
            "project.driver_file" => self.project.driver_file = value.to_string(),
            "discovery.signature_files" => {
                self.discovery.signature_files = value
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect()
            }
            _ => return Err(SettingsError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        seconds(self.run.timeout_secs)
    }

    pub fn memcheck_timeout(&self) -> Option<Duration> {
        seconds(self.memcheck.timeout_secs)
    }

    pub fn with_run_timeout_secs(mut self, secs: u64) -> Self {
        self.run.timeout_secs = secs;
        self
    }

    pub fn with_memcheck(mut self, enabled: bool) -> Self {
        self.memcheck.enabled = enabled;
        self
    }

    pub fn with_build_tool(mut self, tool: impl Into<String>) -> Self {
        self.build.tool = tool.into();
        self
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str, expected: &'static str) -> Result<T, SettingsError> {
    value.parse().map_err(|_| SettingsError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        expected,
    })
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn seconds(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
