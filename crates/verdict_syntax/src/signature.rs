//! Embedded-signature test definitions
//!
//! Tests live directly in C/C++ source: every no-argument `void` function is a test, and line comments of the
//! form `// # Title` (one `#` per nesting level) open display groups.
//!
//! ```cpp
//! // # Lists
//! void push_back_grows() { ... }
//! // ## Edge cases
//! void pop_empty() { ... }
//! ```
//!
//! Comments are stripped before looking for functions, so commented-out tests are not discovered.

use std::sync::LazyLock;

use regex::Regex;

use crate::comments::strip_comments;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::document::{DefinitionStyle, Heading, Item, ParseOutput, TestRecord};
use crate::position::{LineIndex, Span};

static TEST_FN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[ \t]*(?:(?:static|inline)[ \t]+)*void[ \t]+(?P<name>[A-Za-z_][A-Za-z0-9_]*)[ \t]*\([ \t]*(?:void)?[ \t]*\)",
    )
    .expect("INVARIANT: test function pattern is valid")
});

static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*(?P<comment>//+[ \t]*(?P<marks>#{1,6})[ \t]+(?P<title>\S(?:.*\S)?))[ \t]*$")
        .expect("INVARIANT: heading pattern is valid")
});

/// Scan source text for test functions and group headings. Never fails.
#[tracing::instrument(skip_all, fields(source_len = text.len()))]
pub fn parse_signatures(text: &str) -> ParseOutput {
    let mut out = ParseOutput::new(DefinitionStyle::Signature);
    let index = LineIndex::new(text);
    let stripped = strip_comments(text);

    let mut offset = 0;
    for (raw, code) in text.split_inclusive('\n').zip(stripped.split_inclusive('\n')) {
        let line_start = offset;
        offset += raw.len();
        let raw = raw.trim_end_matches(['\n', '\r']);
        let code = code.trim_end_matches(['\n', '\r']);

        if code.trim().is_empty() {
            // Only a comment (or nothing) on this line; it may be a heading
            if let Some(caps) = HEADING.captures(raw) {
                let (Some(comment), Some(marks), Some(title)) = (caps.name("comment"), caps.name("marks"), caps.name("title"))
                else {
                    continue;
                };
                let span = Span::new(line_start + comment.start(), line_start + comment.end());
                out.items.push(Item::Heading(Heading {
                    name: title.as_str().to_string(),
                    depth: marks.as_str().len(),
                    range: index.range(span),
                }));
            }
            continue;
        }

        if let Some(name) = TEST_FN.captures(code).and_then(|caps| caps.name("name")) {
            let span = Span::new(line_start + name.start(), line_start + name.end());
            let record = TestRecord::new(name.as_str(), index.range(span));
            if out.push_test(record) {
                out.push(
                    Diagnostic::warning(
                        DiagnosticKind::DuplicateTest(name.as_str().to_string()),
                        format!("test `{}` is defined more than once; the later definition is used", name.as_str()),
                    )
                    .with_span(span),
                );
            }
        }
    }

    tracing::debug!(items = out.items.len(), "scanned embedded-signature source");
    out
}
