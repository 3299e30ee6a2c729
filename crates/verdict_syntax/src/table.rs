//! Declarative (TOML) test definitions
//!
//! ```toml
//! [config]
//! exec = "a.out"
//! ref_exec = "ref"
//! build_target = "all"
//!
//! [tests.reads_stdin]
//! argv = ["input.txt", "out.txt"]
//! stdin_file = "stdin/words.txt"
//! created_files = ["out.txt"]
//! ```
//!
//! The TOML itself is decoded with the `toml` crate (in document order). Source ranges are recovered separately by
//! scanning lines for `[tests.<name>]` headers, since the decoded tables carry no positions.
//!
//! TOML rejects a table defined twice. A repeated `[tests.<name>]` is instead resolved before decoding: earlier
//! definitions are blanked out (offsets preserved) with a warning, so the later one wins.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use toml::{Table, Value};

use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::document::{DefinitionStyle, ParseOutput, TestRecord};
use crate::position::{LineIndex, SourceRange, Span};

pub const CONFIG_SECTION: &str = "config";
pub const TESTS_SECTION: &str = "tests";

pub const CONFIG_KEYS: [&str; 3] = ["exec", "ref_exec", "build_target"];

static TEST_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^[ \t]*(?P<header>\[[ \t]*tests[ \t]*\.[ \t]*(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)'|(?P<bare>[A-Za-z0-9_-]+))[ \t]*\])"#,
    )
    .expect("INVARIANT: test header pattern is valid")
});

/// Any table or array-of-tables header line.
static ANY_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[ \t]*\[\[?[ \t]*[A-Za-z0-9_"'-][^\]]*\]\]?[ \t]*(?:#.*)?$"#)
        .expect("INVARIANT: header pattern is valid")
});

static SECTION_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*\[[ \t]*(?P<name>[A-Za-z0-9_-]+)[ \t]*\]").expect("INVARIANT: section pattern is valid")
});

/// Parse a declarative document. Never fails; see [`ParseOutput::diagnostics`].
#[tracing::instrument(skip_all, fields(source_len = text.len()))]
pub fn parse_table(text: &str) -> ParseOutput {
    let mut out = ParseOutput::new(DefinitionStyle::Table);
    let deduplicated = drop_redefined_tests(text, &mut out);
    let text = deduplicated.as_deref().unwrap_or(text);
    let index = LineIndex::new(text);

    let data: Table = match toml::from_str(text) {
        Ok(data) => data,
        Err(err) => {
            let mut diag = Diagnostic::error(DiagnosticKind::Syntax, format!("invalid TOML: {}", err.message()));
            if let Some(span) = err.span() {
                diag = diag.with_span(span.into());
            }
            out.push(diag);
            out.unreadable = true;
            return out;
        }
    };

    let headers = Headers::scan(text);
    read_config(&data, &headers, text, &mut out);
    read_tests(&data, &headers, &index, text, &mut out);

    tracing::debug!(
        tests = out.items.len(),
        diagnostics = out.diagnostics.len(),
        "parsed declarative document"
    );
    out
}

fn read_config(data: &Table, headers: &Headers, text: &str, out: &mut ParseOutput) {
    let Some(section) = data.get(CONFIG_SECTION) else {
        out.push(Diagnostic::error(
            DiagnosticKind::MissingSection(CONFIG_SECTION.into()),
            "missing [config] section",
        ));
        return;
    };
    let section_span = headers.sections.get(CONFIG_SECTION).copied();
    let Some(config) = section.as_table() else {
        out.push(with_optional_span(
            Diagnostic::error(
                DiagnosticKind::InvalidValue {
                    key: CONFIG_SECTION.into(),
                    expected: "a table",
                },
                "[config] must be a table",
            ),
            section_span,
        ));
        return;
    };

    for key in CONFIG_KEYS {
        if !config.contains_key(key) {
            out.push(with_optional_span(
                Diagnostic::error(
                    DiagnosticKind::MissingConfigKey(key.into()),
                    format!("missing [config] variable: {key}"),
                ),
                section_span,
            ));
        }
    }

    let after = section_span.map_or(0, |span| span.end);
    for (key, value) in config {
        let key_span = locate_key(text, key, after);
        match key.as_str() {
            "exec" | "ref_exec" | "build_target" => {
                let Some(value) = value.as_str() else {
                    out.push(with_optional_span(invalid_value(key, "a string"), key_span));
                    continue;
                };
                let slot = match key.as_str() {
                    "exec" => &mut out.config.executable,
                    "ref_exec" => &mut out.config.reference,
                    _ => &mut out.config.build_target,
                };
                *slot = Some(value.to_string());
            }
            _ => out.push(with_optional_span(
                Diagnostic::warning(
                    DiagnosticKind::UnknownConfigKey(key.clone()),
                    format!("unknown [config] variable: {key}"),
                ),
                key_span,
            )),
        }
    }
}

fn read_tests(data: &Table, headers: &Headers, index: &LineIndex<'_>, text: &str, out: &mut ParseOutput) {
    let Some(section) = data.get(TESTS_SECTION) else {
        out.push(Diagnostic::error(
            DiagnosticKind::MissingSection(TESTS_SECTION.into()),
            "missing section [tests.testname]",
        ));
        return;
    };
    let Some(tests) = section.as_table() else {
        out.push(invalid_value(TESTS_SECTION, "a table of tests"));
        return;
    };

    for (name, value) in tests {
        let header = headers.tests.get(name.as_str()).copied();
        let range = header.map(|span| index.range(span)).unwrap_or_default();

        if name.trim().is_empty() {
            out.push(with_optional_span(
                Diagnostic::error(DiagnosticKind::InvalidTest(name.clone()), "test names must not be empty"),
                header,
            ));
            continue;
        }
        let Some(entry) = value.as_table() else {
            out.push(with_optional_span(
                Diagnostic::error(
                    DiagnosticKind::InvalidTest(name.clone()),
                    format!("[tests.{name}] must be a table"),
                ),
                header,
            ));
            continue;
        };

        let after = header.map_or(0, |span| span.end);
        let mut record = TestRecord::new(name.clone(), range);
        for (key, value) in entry {
            let key_span = locate_key(text, key, after);
            match key.as_str() {
                "argv" => match string_list(value) {
                    Some(argv) => record.argv = argv,
                    None => out.push(with_optional_span(invalid_value(key, "a list of strings"), key_span)),
                },
                "stdin_file" => match value.as_str() {
                    Some("") => record.stdin_file = None,
                    Some(path) => record.stdin_file = Some(path.to_string()),
                    None => out.push(with_optional_span(invalid_value(key, "a string"), key_span)),
                },
                "created_files" => match string_list(value) {
                    Some(files) => record.created_files = files,
                    None => out.push(with_optional_span(invalid_value(key, "a list of strings"), key_span)),
                },
                _ => out.push(with_optional_span(
                    Diagnostic::warning(
                        DiagnosticKind::UnknownTestKey {
                            test: name.clone(),
                            key: key.clone(),
                        },
                        format!("unknown variable in [tests.{name}]: {key}"),
                    ),
                    key_span,
                )),
            }
        }
        out.push_test(record);
    }
}

/// One `[tests.<name>]` table: its header token and the byte range up to the next header.
struct TestBlock<'a> {
    name: &'a str,
    header: Span,
    body: std::ops::Range<usize>,
}

fn test_blocks(text: &str) -> Vec<TestBlock<'_>> {
    let mut blocks: Vec<TestBlock<'_>> = Vec::new();
    for (offset, line) in lines_with_offsets(text) {
        if !ANY_HEADER.is_match(line) {
            continue;
        }
        if let Some(open) = blocks.last_mut() {
            if open.body.end == text.len() {
                open.body.end = offset;
            }
        }
        let Some(caps) = TEST_HEADER.captures(line) else { continue };
        let (Some(header), Some(name)) = (
            caps.name("header"),
            caps.name("dq").or_else(|| caps.name("sq")).or_else(|| caps.name("bare")),
        ) else {
            continue;
        };
        blocks.push(TestBlock {
            name: name.as_str(),
            header: Span::new(offset + header.start(), offset + header.end()),
            body: offset..text.len(),
        });
    }
    blocks
}

/// Blank every earlier definition of a test whose header appears again, keeping byte offsets and line numbers.
///
/// Returns `None` when no test is defined twice.
fn drop_redefined_tests(text: &str, out: &mut ParseOutput) -> Option<String> {
    let blocks = test_blocks(text);
    let mut last: HashMap<&str, usize> = HashMap::new();
    for (i, block) in blocks.iter().enumerate() {
        last.insert(block.name, i);
    }

    let mut dropped = Vec::new();
    for (i, block) in blocks.iter().enumerate() {
        if last.get(block.name) == Some(&i) {
            continue;
        }
        out.push(
            Diagnostic::warning(
                DiagnosticKind::DuplicateTest(block.name.to_string()),
                format!("test `{}` is defined more than once; the later definition is used", block.name),
            )
            .with_span(block.header),
        );
        dropped.push(block.body.clone());
    }
    if dropped.is_empty() {
        return None;
    }

    let mut kept = String::with_capacity(text.len());
    for (at, ch) in text.char_indices() {
        if ch != '\n' && dropped.iter().any(|range| range.contains(&at)) {
            kept.extend(std::iter::repeat_n(' ', ch.len_utf8()));
        } else {
            kept.push(ch);
        }
    }
    Some(kept)
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

fn invalid_value(key: &str, expected: &'static str) -> Diagnostic {
    Diagnostic::error(
        DiagnosticKind::InvalidValue {
            key: key.to_string(),
            expected,
        },
        format!("`{key}` must be {expected}"),
    )
}

fn with_optional_span(diag: Diagnostic, span: Option<Span>) -> Diagnostic {
    match span {
        Some(span) => diag.with_span(span),
        None => diag,
    }
}

/// Header locations found by a line scan.
#[derive(Debug, Default)]
struct Headers {
    /// `[tests.<name>]` header token per test name; a repeated header keeps the later one.
    tests: HashMap<String, Span>,
    /// Plain `[section]` headers.
    sections: HashMap<String, Span>,
}

impl Headers {
    fn scan(text: &str) -> Self {
        let mut headers = Headers::default();
        for (offset, line) in lines_with_offsets(text) {
            if let Some(caps) = TEST_HEADER.captures(line) {
                let Some(header) = caps.name("header") else { continue };
                let name = caps
                    .name("dq")
                    .or_else(|| caps.name("sq"))
                    .or_else(|| caps.name("bare"))
                    .map_or("", |m| m.as_str());
                headers
                    .tests
                    .insert(name.to_string(), Span::new(offset + header.start(), offset + header.end()));
            } else if let Some(caps) = SECTION_HEADER.captures(line) {
                if let (Some(whole), Some(name)) = (caps.get(0), caps.name("name")) {
                    let start = offset + (whole.as_str().len() - whole.as_str().trim_start().len());
                    headers
                        .sections
                        .insert(name.as_str().to_string(), Span::new(start, offset + whole.end()));
                }
            }
        }
        headers
    }
}

fn lines_with_offsets(text: &str) -> impl Iterator<Item = (usize, &str)> {
    let mut offset = 0;
    text.split_inclusive('\n').map(move |line| {
        let start = offset;
        offset += line.len();
        (start, line.trim_end_matches(['\n', '\r']))
    })
}

/// Span of the first `key =` line at or after `after`.
fn locate_key(text: &str, key: &str, after: usize) -> Option<Span> {
    lines_with_offsets(text)
        .filter(|(offset, _)| *offset >= after)
        .find_map(|(offset, line)| {
            let trimmed = line.trim_start();
            let rest = trimmed
                .strip_prefix(key)
                .or_else(|| trimmed.strip_prefix(&format!("\"{key}\"")))?;
            if !rest.trim_start().starts_with('=') {
                return None;
            }
            let start = offset + (line.len() - trimmed.len());
            Some(Span::new(start, start + (trimmed.len() - rest.len())))
        })
}

/// Range for a test header, if the document has one for `name`.
pub fn locate_test(text: &str, name: &str) -> Option<SourceRange> {
    let span = Headers::scan(text).tests.get(name).copied()?;
    Some(LineIndex::new(text).range(span))
}
