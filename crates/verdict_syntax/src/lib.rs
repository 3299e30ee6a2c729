//! Test-definition parsing for the verdict test runner.
//!
//! Two document styles are understood:
//! - **declarative tables** (`table`): TOML with a `[config]` table and one `[tests.<name>]` table per case;
//! - **embedded signatures** (`signature`): C/C++ source where each no-argument `void` function is a case and
//!   `// # Title` comments open display groups.
//!
//! Both produce a [`ParseOutput`]. Parsing never returns an error: malformed input yields diagnostics and a
//! best-effort list of records.
//!
//! ## Notes
//! - This crate is syntax-only. It never reads files or runs processes; the runner crate owns both.
//!
//! ## Examples
//! ```rust
//! use verdict_syntax::{parse, DefinitionStyle};
//!
//! let out = parse("[config]\nexec='a.out'\nref_exec='ref'\nbuild_target='all'\n[tests.t1]\nargv=['x']\n", DefinitionStyle::Table);
//! assert_eq!(out.records().count(), 1);
//! assert!(out.diagnostics.is_empty());
//! ```

pub mod comments;
pub mod diagnostics;
pub mod document;
pub mod position;
pub mod signature;
pub mod table;

pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticReport, Severity};
pub use document::{DefinitionStyle, DocumentConfig, Heading, Item, ParseOutput, TestRecord};
pub use position::{LineIndex, Position, SourceRange, Span};

/// Parse a document in the given style.
pub fn parse(text: &str, style: DefinitionStyle) -> ParseOutput {
    match style {
        DefinitionStyle::Table => table::parse_table(text),
        DefinitionStyle::Signature => signature::parse_signatures(text),
    }
}
