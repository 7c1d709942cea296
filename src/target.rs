//! Target-language capability descriptors.
//!
//! The pipeline is data-driven: a target is a record of booleans plus its
//! string-type mapping, not a trait object. Renderer selection is a plain
//! enum consumed after the pipeline finishes.

use crate::error::{Error, Result};
use crate::graph::StringTypeMapping;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Renderer {
    /// Emit a JSON Schema document describing the final graph.
    JsonSchema,
    /// Emit a strict Rust data model with serde derives.
    RustModel,
}

#[derive(Clone, Debug)]
pub struct TargetLanguage {
    pub name: &'static str,
    /// Aliases accepted by `--lang` / option lookup.
    pub names: &'static [&'static str],
    pub string_type_mapping: StringTypeMapping,
    pub supports_unions_with_both_number_types: bool,
    pub supports_full_object_type: bool,
    pub supports_optional_class_properties: bool,
    pub renderer: Renderer,
}

impl TargetLanguage {
    /// The JSON Schema target doubles as the passthrough: a single schema
    /// input short-circuits the whole pipeline.
    pub fn is_schema_passthrough(&self) -> bool {
        self.names.contains(&"schema")
    }
}

pub fn json_schema_target() -> TargetLanguage {
    TargetLanguage {
        name: "json-schema",
        names: &["schema", "json-schema"],
        string_type_mapping: StringTypeMapping::all(),
        supports_unions_with_both_number_types: true,
        supports_full_object_type: true,
        supports_optional_class_properties: true,
        renderer: Renderer::JsonSchema,
    }
}

pub fn rust_target() -> TargetLanguage {
    TargetLanguage {
        name: "rust",
        names: &["rust", "rs"],
        // The generated model keeps dates and friends as plain strings.
        string_type_mapping: StringTypeMapping::none(),
        supports_unions_with_both_number_types: true,
        supports_full_object_type: false,
        supports_optional_class_properties: true,
        renderer: Renderer::RustModel,
    }
}

pub fn lookup(name: &str) -> Result<TargetLanguage> {
    let needle = name.to_ascii_lowercase();
    for target in [json_schema_target(), rust_target()] {
        if target.names.contains(&needle.as_str()) {
            return Ok(target);
        }
    }
    Err(Error::UnknownOutputLanguage(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_resolves_aliases_case_insensitively() {
        assert_eq!(lookup("Schema").unwrap().name, "json-schema");
        assert_eq!(lookup("rs").unwrap().name, "rust");
    }

    #[test]
    fn unknown_language_is_a_configuration_error() {
        assert!(matches!(
            lookup("cobol"),
            Err(Error::UnknownOutputLanguage(_))
        ));
    }
}
