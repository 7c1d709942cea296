//! Input collaborators: JSON samples and JSON Schema documents.

pub mod samples;
pub mod schema;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::builder::TypeBuilder;
use crate::error::{Error, Result};
use crate::input::samples::Evidence;

/// Build-time inference switches.
#[derive(Copy, Clone, Debug)]
pub struct InferenceFlags {
    pub infer_enums: bool,
    pub infer_dates: bool,
    pub infer_integer_strings: bool,
    pub all_properties_optional: bool,
}

impl Default for InferenceFlags {
    fn default() -> Self {
        InferenceFlags {
            infer_enums: true,
            infer_dates: true,
            infer_integer_strings: true,
            all_properties_optional: false,
        }
    }
}

enum InputSource {
    Samples { name: String, documents: Vec<Value> },
    Schema { name: String, document: Value },
}

/// Collects raw inputs and lowers them into a type builder.
pub struct InputBundle {
    sources: Vec<InputSource>,
    finished: bool,
}

impl InputBundle {
    pub fn new() -> Self {
        InputBundle { sources: Vec::new(), finished: false }
    }

    /// Add one sample document for the named top level. Several documents for
    /// the same name accumulate into one evidence summary.
    pub fn add_sample(&mut self, name: &str, document: Value) {
        for source in &mut self.sources {
            if let InputSource::Samples { name: existing, documents } = source {
                if existing == name {
                    documents.push(document);
                    return;
                }
            }
        }
        self.sources.push(InputSource::Samples { name: name.to_string(), documents: vec![document] });
    }

    pub fn add_schema(&mut self, name: &str, document: Value) {
        self.sources.push(InputSource::Schema { name: name.to_string(), document });
    }

    pub fn finish_adding_inputs(&mut self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(Error::Input("no inputs given".into()));
        }
        self.finished = true;
        Ok(())
    }

    pub fn need_ir(&self) -> bool {
        !self.sources.is_empty()
    }

    /// True when any input originated from JSON Schema.
    pub fn need_schema_processing(&self) -> bool {
        self.sources.iter().any(|s| matches!(s, InputSource::Schema { .. }))
    }

    /// The pretty-printed schema when the whole input is one schema document;
    /// enables the passthrough fast path.
    pub fn single_string_schema_source(&self) -> Option<String> {
        match self.sources.as_slice() {
            [InputSource::Schema { document, .. }] => crate::render::pretty_json(document).ok(),
            _ => None,
        }
    }

    /// Lower every input into the builder, one provenance ordinal per source.
    pub fn add_types(&self, builder: &mut TypeBuilder, flags: &InferenceFlags) -> Result<()> {
        if !self.finished {
            return Err(Error::Input("inputs were not finished before the pipeline".into()));
        }
        for (index, source) in self.sources.iter().enumerate() {
            let provenance = index as u32;
            match source {
                InputSource::Samples { name, documents } => {
                    let mut evidence = Evidence::default();
                    for document in documents {
                        evidence = Evidence::join(&evidence, &samples::observe(document, flags));
                    }
                    let top = samples::build(builder, &evidence, flags, provenance)?;
                    builder.add_top_level(name, top);
                }
                InputSource::Schema { name, document } => {
                    schema::add_schema_types(builder, name, document, flags, provenance)?;
                }
            }
        }
        Ok(())
    }
}

impl Default for InputBundle {
    fn default() -> Self {
        Self::new()
    }
}

/// Deserialize with JSON-path context in error messages.
pub fn parse_json_with_path<T: DeserializeOwned>(src: &str) -> Result<T> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, T>(de).map_err(|err| {
        let path = err.path().to_string();
        Error::Input(format!("at JSON path {path}: {}", err.into_inner()))
    })
}
