//! Property-based tests for definition parsing
//!
//! These check invariants over generated documents rather than hand-picked ones.

use proptest::prelude::*;
use verdict_syntax::{DefinitionStyle, DiagnosticKind, Item, parse};

fn test_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,12}"
}

fn table_document() -> impl Strategy<Value = String> {
    (
        proptest::collection::btree_set(test_name(), 0..6),
        proptest::collection::vec("[a-z.]{1,6}", 0..4),
    )
        .prop_map(|(names, argv)| {
            let mut doc = String::from("[config]\nexec = \"a.out\"\nref_exec = \"ref\"\nbuild_target = \"all\"\n");
            for name in names {
                let args: Vec<String> = argv.iter().map(|a| format!("\"{a}\"")).collect();
                doc.push_str(&format!("\n[tests.{name}]\nargv = [{}]\n", args.join(", ")));
            }
            doc
        })
}

proptest! {
    /// Parsing the same document twice yields identical records
    #[test]
    fn table_parse_is_idempotent(doc in table_document()) {
        let first = parse(&doc, DefinitionStyle::Table);
        let second = parse(&doc, DefinitionStyle::Table);
        prop_assert_eq!(first, second);
    }

    /// Every generated `[tests.<name>]` header becomes exactly one record, anchored on its header line
    #[test]
    fn table_headers_become_records(doc in table_document()) {
        let out = parse(&doc, DefinitionStyle::Table);
        let headers = doc.lines().filter(|l| l.starts_with("[tests.")).count();
        prop_assert_eq!(out.records().count(), headers);
        for record in out.records() {
            let line = doc.lines().nth(record.range.start.line).unwrap_or_default();
            prop_assert_eq!(line, format!("[tests.{}]", record.name));
        }
    }

    /// Arbitrary text never panics either parser
    #[test]
    fn parsers_never_panic(text in "\\PC{0,200}") {
        let _ = parse(&text, DefinitionStyle::Table);
        let _ = parse(&text, DefinitionStyle::Signature);
    }

    /// Without a `tests` section there are no records and at least one error
    #[test]
    fn missing_tests_section_is_an_error(exec in "[a-z]{1,8}") {
        let doc = format!("[config]\nexec = \"{exec}\"\nref_exec = \"r\"\nbuild_target = \"all\"\n");
        let out = parse(&doc, DefinitionStyle::Table);
        prop_assert_eq!(out.records().count(), 0);
        prop_assert!(out.diagnostics.iter().any(|d| d.is_error()));
        prop_assert!(out.diagnostics.iter().any(|d| d.kind == DiagnosticKind::MissingSection("tests".into())));
    }

    /// Signature scanning is idempotent and keeps names unique
    #[test]
    fn signature_names_unique(names in proptest::collection::vec(test_name(), 0..10)) {
        let source: String = names.iter().map(|n| format!("void {n}() {{}}\n")).collect();
        let first = parse(&source, DefinitionStyle::Signature);
        let second = parse(&source, DefinitionStyle::Signature);
        prop_assert_eq!(&first, &second);

        let mut seen = std::collections::HashSet::new();
        for item in &first.items {
            if let Item::Test(record) = item {
                prop_assert!(seen.insert(record.name.clone()), "duplicate record {}", record.name);
            }
        }
        let distinct: std::collections::HashSet<_> = names.iter().collect();
        prop_assert_eq!(seen.len(), distinct.len());
    }
}

#[test]
fn diagnostics_for_sloppy_document() {
    let doc = r#"
[config]
exec = "a.out"
colour = "blue"

[tests.first]
argv = ["1"]
diff_stderr = true
"#;
    let out = parse(doc, DefinitionStyle::Table);
    let rendered: Vec<String> = out.diagnostics.iter().map(ToString::to_string).collect();
    insta::assert_snapshot!(rendered.join("\n"), @r"
    error: missing [config] variable: ref_exec
    error: missing [config] variable: build_target
    warning: unknown [config] variable: colour
    warning: unknown variable in [tests.first]: diff_stderr
    ");
    assert_eq!(out.records().count(), 1);
}

proptest! {
    /// A test defined several times yields one record, carrying the last definition's arguments
    #[test]
    fn redefined_table_test_keeps_last(name in test_name(), argvs in proptest::collection::vec("[a-z]{1,6}", 1..4)) {
        let mut doc = String::from("[config]\nexec = \"a.out\"\nref_exec = \"ref\"\nbuild_target = \"all\"\n");
        for arg in &argvs {
            doc.push_str(&format!("\n[tests.{name}]\nargv = [\"{arg}\"]\n"));
        }
        let out = parse(&doc, DefinitionStyle::Table);
        prop_assert!(!out.unreadable);
        let records: Vec<_> = out.records().collect();
        prop_assert_eq!(records.len(), 1);
        prop_assert_eq!(&records[0].argv, &vec![argvs[argvs.len() - 1].clone()]);
        let duplicates = out
            .diagnostics
            .iter()
            .filter(|d| matches!(d.kind, DiagnosticKind::DuplicateTest(_)))
            .count();
        prop_assert_eq!(duplicates, argvs.len() - 1);
    }
}
