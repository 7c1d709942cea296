//! Optional jq pre-filter for sample ingestion.

use jaq_core::{compile::Undefined, load, Compiler, Ctx, RcIter};
use jaq_json::Val;
use serde_json::Value;

use crate::error::{Error, Result};

/// Run a jq filter over one document, yielding zero or more documents.
pub fn apply_filter(filter_src: &str, input: &Value) -> Result<Vec<Value>> {
    let loader = load::Loader::new(jaq_std::defs().chain(jaq_json::defs()));
    let arena = load::Arena::default();
    let program = load::File { code: filter_src, path: () };

    let modules = loader.load(&arena, program).map_err(format_parse_errors)?;

    let filter = Compiler::default()
        .with_funs(jaq_std::funs().chain(jaq_json::funs()))
        .compile(modules)
        .map_err(format_undefined_errors)?;

    let inputs = RcIter::new(core::iter::empty());
    let mut outputs = Vec::new();
    for item in filter.run((Ctx::new([], &inputs), Val::from(input.clone()))) {
        let val = item.map_err(|e| Error::Input(format!("jq filter failed: {e:?}")))?;
        // Val displays as JSON text; round-trip through serde_json.
        let parsed: Value = serde_json::from_str(&format!("{val}"))?;
        outputs.push(parsed);
    }
    Ok(outputs)
}

fn format_parse_errors(errs: Vec<(load::File<&str, ()>, load::Error<&str>)>) -> Error {
    let mut s = String::from("jq parse error:");
    for (file, err) in errs {
        s.push_str(&format!(" {err:?} in `{}`", file.code));
    }
    Error::Input(s)
}

fn format_undefined_errors(errs: Vec<(load::File<&str, ()>, Vec<(&str, Undefined)>)>) -> Error {
    let mut s = String::from("jq compile error:");
    for (file, list) in errs {
        for (name, undef) in list {
            s.push_str(&format!(" undefined `{name}` ({undef:?}) in `{}`", file.code));
        }
    }
    Error::Input(s)
}
