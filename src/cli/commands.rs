//! CLI command implementations
//!
//! All command functions return `CliResult<ExitCode>` instead of calling
//! `process::exit`. Error handling and exits happen in the top-level `run()`.

use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use verdict_syntax::DefinitionStyle;

use super::{CliError, CliResult, ExitCode, ReportFormat, SettingsArgs};
use crate::catalog::{Catalog, CatalogNode, FileState, NodeId, NodeRef, Selection};
use crate::discovery;
use crate::driver;
use crate::engine::{ConsoleReporter, Engine, JsonReporter, TestReporter};
use crate::process::ProcessRunner;
use crate::settings::Settings;

/// Arguments of `verdict run`.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub path: PathBuf,
    pub filter: Option<String>,
    pub only: Vec<NodeId>,
    pub exclude: Vec<NodeId>,
    pub format: ReportFormat,
    pub verbose: bool,
    pub settings: SettingsArgs,
}

// ============================================================================
// Shared setup
// ============================================================================

fn working_dir() -> CliResult<PathBuf> {
    env::current_dir().map_err(|e| CliError::failure(format!("Error: cannot determine working directory: {e}")))
}

/// Defaults, then the settings file, then `--set` overrides.
pub fn load_settings(args: &SettingsArgs, workdir: &Path) -> CliResult<Settings> {
    let mut settings = Settings::discover(args.settings_file.as_deref(), workdir)
        .map_err(|e| CliError::failure(format!("Error: {e}")))?;
    for assignment in &args.overrides {
        settings
            .apply_assignment(assignment)
            .map_err(|e| CliError::failure(format!("Error: {e}")))?;
    }
    Ok(settings)
}

fn discover_catalog(path: &Path, settings: &Settings) -> CliResult<Catalog> {
    let files = discovery::find_definition_files(path, settings);
    if files.is_empty() {
        return Err(CliError::failure(format!(
            "Error: no test definition files found under {}",
            path.display()
        )));
    }
    let mut catalog = Catalog::new();
    for (file, style) in files {
        catalog.add_file(file, style);
    }
    Ok(catalog)
}

// ============================================================================
// run
// ============================================================================

/// Discover, build and verify. Exits 1 on any failure, including a failed build.
pub fn run_tests(options: RunOptions) -> CliResult<ExitCode> {
    let workdir = working_dir()?;
    let settings = load_settings(&options.settings, &workdir)?;
    let mut catalog = discover_catalog(&options.path, &settings)?;

    let selection = Selection {
        include: (!options.only.is_empty()).then_some(options.only),
        exclude: options.exclude,
        filter: options.filter,
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::failure(format!("Error: failed to start runtime: {e}")))?;

    let executor = ProcessRunner::new();
    let engine = Engine::new(&executor, &settings, &workdir);
    let cancel = engine.cancellation();
    let mut reporter: Box<dyn TestReporter> = match options.format {
        ReportFormat::Console => Box::new(ConsoleReporter::new(options.verbose)),
        ReportFormat::Json => Box::new(JsonReporter::new()),
    };

    let report = runtime
        .block_on(async {
            let interrupt = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupted; remaining cases will be skipped");
                    cancel.cancel();
                }
            });
            let report = engine.run_batch(&mut catalog, &selection, reporter.as_mut()).await;
            interrupt.abort();
            report
        })
        .map_err(|e| CliError::failure(format!("Error: {e}")))?;

    Ok(if report.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

// ============================================================================
// list
// ============================================================================

pub fn list_tests(path: &Path, args: &SettingsArgs) -> CliResult<ExitCode> {
    let workdir = working_dir()?;
    let settings = load_settings(args, &workdir)?;
    let mut catalog = discover_catalog(path, &settings)?;
    for err in catalog.resolve_pending() {
        tracing::warn!(error = %err, "definition file could not be loaded");
    }
    print!("{}", render_tree(&catalog));
    Ok(ExitCode::SUCCESS)
}

/// Indented tree of files, groups and cases, with diagnostic counts per file.
pub fn render_tree(catalog: &Catalog) -> String {
    let mut out = String::new();
    for file in catalog.files() {
        let _ = write!(out, "{}", file.path.display());
        match &file.state {
            FileState::Failed(reason) => {
                let _ = writeln!(out, " (unreadable: {reason})");
                continue;
            }
            FileState::Unresolved => {
                let _ = writeln!(out, " (not parsed)");
                continue;
            }
            FileState::Ready => {}
        }
        let cases = file.cases().len();
        let _ = write!(out, " ({cases} {})", if cases == 1 { "case" } else { "cases" });
        let (errors, warnings) = (file.error_count(), file.warning_count());
        if errors > 0 {
            let _ = write!(out, " [{errors} errors]");
        }
        if warnings > 0 {
            let _ = write!(out, " [{warnings} warnings]");
        }
        out.push('\n');
        render_children(file.node_ref(), 1, &mut out);
    }
    out
}

fn render_children(node: NodeRef<'_>, depth: usize, out: &mut String) {
    for child in node.children().unwrap_or_default() {
        let _ = writeln!(out, "{}{}", "  ".repeat(depth), child.node_ref().name());
        if let CatalogNode::Group(_) = child {
            render_children(child.node_ref(), depth + 1, out);
        }
    }
}

// ============================================================================
// check
// ============================================================================

pub fn check_file(file: &Path) -> CliResult<ExitCode> {
    let source = fs::read_to_string(file)
        .map_err(|e| CliError::failure(format!("Error reading {}: {e}", file.display())))?;
    let output = verdict_syntax::parse(&source, DefinitionStyle::from_path(file));
    let name = file.display().to_string();

    for diagnostic in &output.diagnostics {
        eprintln!("{:?}", miette::Report::new(diagnostic.to_report(&name, &source)));
    }
    let tests = output.records().count();
    eprintln!(
        "{name}: {tests} tests, {} errors, {} warnings",
        output.diagnostics.iter().filter(|d| d.is_error()).count(),
        output.diagnostics.iter().filter(|d| !d.is_error()).count()
    );

    Ok(if output.has_errors() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

// ============================================================================
// driver
// ============================================================================

pub fn write_driver(file: &Path, output: Option<&Path>, args: &SettingsArgs) -> CliResult<ExitCode> {
    let workdir = working_dir()?;
    let settings = load_settings(args, &workdir)?;
    let source = fs::read_to_string(file)
        .map_err(|e| CliError::failure(format!("Error reading {}: {e}", file.display())))?;
    let parsed = verdict_syntax::parse(&source, DefinitionStyle::Signature);
    let names: Vec<String> = parsed.records().map(|record| record.name.clone()).collect();

    let out = output.map_or_else(|| workdir.join(&settings.project.driver_file), Path::to_path_buf);
    driver::write(file, &names, &out).map_err(|e| CliError::failure(format!("Error: {e}")))?;
    eprintln!("wrote {} ({} tests)", out.display(), names.len());
    Ok(ExitCode::SUCCESS)
}
