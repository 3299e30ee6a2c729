//! Driver generation for embedded-signature test files
//!
//! Signature-style tests are plain functions in a header. The generated driver includes that header, maps each
//! test name to its function, and runs the one named by its first argument. Any other exit path returns 1.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::version::VERDICT_VERSION;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("failed to write driver {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot include {}: not a file name", .0.display())]
    BadHeader(PathBuf),
}

/// Render driver source that includes `header` and dispatches to `names`.
pub fn render(header: &str, names: &[String]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "// Generated by verdict {VERDICT_VERSION}. Do not edit; it is rewritten before each build.");
    let _ = writeln!(out, "#include <iostream>\n#include <map>\n#include <string>\n");
    let _ = writeln!(out, "#include \"{header}\"\n");
    let _ = writeln!(out, "typedef void (*FnPtr)();\n");
    let _ = writeln!(out, "int main(int argc, char **argv) {{");
    let _ = writeln!(out, "    std::map<std::string, FnPtr> tests {{");
    for name in names {
        let _ = writeln!(out, "        {{ \"{name}\", {name} }},");
    }
    let _ = writeln!(out, "    }};\n");
    let _ = writeln!(out, "    if (argc <= 1) {{");
    let _ = writeln!(out, "        std::cout << \"No test function specified. Quitting\" << std::endl;");
    let _ = writeln!(out, "        return 1;");
    let _ = writeln!(out, "    }}\n");
    let _ = writeln!(out, "    auto found = tests.find(argv[1]);");
    let _ = writeln!(out, "    if (found == tests.end()) {{");
    let _ = writeln!(out, "        std::cerr << \"Unknown test function: \" << argv[1] << std::endl;");
    let _ = writeln!(out, "        return 1;");
    let _ = writeln!(out, "    }}");
    let _ = writeln!(out, "    found->second();");
    let _ = writeln!(out, "    return 0;");
    let _ = writeln!(out, "}}");
    out
}

/// Write the driver for the signature file `header` to `out`.
///
/// The header is included by file name, so `out` is expected to sit next to it.
#[tracing::instrument(skip(names), fields(tests = names.len()))]
pub fn write(header: &Path, names: &[String], out: &Path) -> Result<(), DriverError> {
    let include = header
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| DriverError::BadHeader(header.to_path_buf()))?;
    fs::write(out, render(include, names)).map_err(|source| DriverError::Write {
        path: out.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %out.display(), "wrote driver");
    Ok(())
}
