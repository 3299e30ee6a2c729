#![forbid(unsafe_code)]
//! verdict: test discovery and execution for native programs
//!
//! Test definitions (declarative TOML tables, or plain `void name()` functions in a C/C++ header) are parsed by
//! [`verdict_syntax`] into a [`catalog::Catalog`]. The [`engine::Engine`] runs one build, then verifies each
//! selected case against golden files or a reference executable, optionally under a memory checker, and reports
//! the results.
//!
//! ## Panic Policy
//!
//! This codebase follows explicit error handling:
//!
//! - **Production code**: Use `Result` or `Option` with `?` / `ok_or` / `map_err`. The `cli` module enforces
//!   `#![deny(clippy::unwrap_used)]`.
//!
//! - **Test code**: `.unwrap()` and `.expect()` are acceptable in tests.
//!
//! - **Test failures are data**: a failing, crashing or hanging program under test is a
//!   [`outcome::FailureDetail`], never an `Err` or a panic.
//!
//! - **True invariants**: If a panic represents a bug (logic error), use `.expect("INVARIANT: reason")` with a
//!   clear explanation.

pub mod catalog;
pub mod cli;
pub mod discovery;
pub mod driver;
pub mod engine;
pub mod outcome;
pub mod process;
pub mod settings;
pub mod version;

pub use catalog::{CaseId, Catalog, Generation, NodeId, QueuedCase, Selection};
pub use engine::{BatchReport, CancellationFlag, Engine, TestReporter};
pub use outcome::{CaseRunState, CaseStatus, FailureDetail, FailureKind};
pub use process::{CommandSpec, ExitStatus, Executor, ProcessRunner, RunResult};
pub use settings::Settings;
