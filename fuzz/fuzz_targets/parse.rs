#![no_main]

use libfuzzer_sys::fuzz_target;
use verdict_syntax::{DefinitionStyle, LineIndex, Span, parse};

fuzz_target!(|data: &[u8]| {
    // Convert bytes to UTF-8 string (ignore invalid UTF-8)
    if let Ok(s) = std::str::from_utf8(data) {
        let index = LineIndex::new(s);
        for style in [DefinitionStyle::Table, DefinitionStyle::Signature] {
            let out = parse(s, style);
            // Every reported span must stay inside the document
            for diagnostic in &out.diagnostics {
                if let Some(Span { start, end }) = diagnostic.span {
                    assert!(start <= end && end <= s.len());
                    let _ = index.range(Span::new(start, end));
                }
            }
        }
    }
});
