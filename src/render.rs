//! Render results and the multi-file concatenation wrapper.

pub mod rust;
pub mod schema;

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Zero-based position in rendered output.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Span {
    pub start: Location,
    pub end: Location,
}

impl Span {
    pub fn line(line: usize, columns: usize) -> Self {
        Span {
            start: Location { line, column: 0 },
            end: Location { line, column: columns },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Annotation {
    pub annotation: String,
    pub span: Span,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderResult {
    pub lines: Vec<String>,
    pub annotations: Vec<Annotation>,
}

/// Pretty-print with four-space indentation, the way the schema passthrough
/// emits its input.
pub fn pretty_json(value: &serde_json::Value) -> Result<String> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    serde::Serialize::serialize(value, &mut ser)?;
    String::from_utf8(out).map_err(|e| Error::Render(e.to_string()))
}

/// Concatenate per-file results into one, prefixing each file with a
/// `// <filename>` comment and an empty line. Annotation spans shift by the
/// cumulative offset; the header counts as two lines.
pub fn concatenate(results: &BTreeMap<String, RenderResult>) -> RenderResult {
    let mut out = RenderResult::default();
    for (filename, result) in results {
        let base = out.lines.len() + 2;
        out.lines.push(format!("// {filename}"));
        out.lines.push(String::new());
        out.lines.extend(result.lines.iter().cloned());
        out.annotations.extend(result.annotations.iter().map(|a| Annotation {
            annotation: a.annotation.clone(),
            span: Span {
                start: Location { line: a.span.start.line + base, column: a.span.start.column },
                end: Location { line: a.span.end.line + base, column: a.span.end.column },
            },
        }));
    }
    out
}
