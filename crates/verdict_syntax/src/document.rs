//! Parsed test-definition documents
//!
//! Both definition styles produce the same [`ParseOutput`]: document-level configuration, an ordered list of
//! items (tests and, for the embedded style, headings), and the diagnostics collected on the way.

use std::path::Path;

use crate::diagnostics::Diagnostic;
use crate::position::SourceRange;

/// How a document declares its tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefinitionStyle {
    /// TOML with a `[config]` table and `[tests.<name>]` tables.
    Table,
    /// C/C++ source where each no-argument `void` function is a test.
    Signature,
}

impl DefinitionStyle {
    /// Guess the style from a file name: `.toml` documents are tables, everything else is source.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => DefinitionStyle::Table,
            _ => DefinitionStyle::Signature,
        }
    }
}

/// One test case as written in its document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRecord {
    /// Unique within the defining document; never empty.
    pub name: String,
    pub argv: Vec<String>,
    /// File fed to the program's standard input, relative to the working directory.
    pub stdin_file: Option<String>,
    /// Files the program is expected to write, relative to the working directory.
    pub created_files: Vec<String>,
    pub range: SourceRange,
}

impl TestRecord {
    pub fn new(name: impl Into<String>, range: SourceRange) -> Self {
        Self {
            name: name.into(),
            argv: Vec::new(),
            stdin_file: None,
            created_files: Vec::new(),
            range,
        }
    }
}

/// A `// # Title` line opening a display group in embedded-style sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub name: String,
    /// Number of `#` marks; 1 is outermost.
    pub depth: usize,
    pub range: SourceRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Heading(Heading),
    Test(TestRecord),
}

/// The `[config]` table of a declarative document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentConfig {
    /// Artifact under test (`exec`).
    pub executable: Option<String>,
    /// Known-good program to compare against (`ref_exec`).
    pub reference: Option<String>,
    pub build_target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOutput {
    pub style: DefinitionStyle,
    pub config: DocumentConfig,
    pub items: Vec<Item>,
    pub diagnostics: Vec<Diagnostic>,
    /// Set when nothing could be extracted from the document at all.
    pub unreadable: bool,
}

impl ParseOutput {
    pub fn new(style: DefinitionStyle) -> Self {
        Self {
            style,
            config: DocumentConfig::default(),
            items: Vec::new(),
            diagnostics: Vec::new(),
            unreadable: false,
        }
    }

    pub fn records(&self) -> impl Iterator<Item = &TestRecord> {
        self.items.iter().filter_map(|item| match item {
            Item::Test(record) => Some(record),
            Item::Heading(_) => None,
        })
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub(crate) fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Add a test, replacing an earlier one with the same name.
    pub(crate) fn push_test(&mut self, record: TestRecord) -> bool {
        let before = self.items.len();
        self.items
            .retain(|item| !matches!(item, Item::Test(existing) if existing.name == record.name));
        let replaced = self.items.len() != before;
        self.items.push(Item::Test(record));
        replaced
    }
}
