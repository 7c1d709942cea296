//! Emits a JSON Schema document describing the final graph.
//!
//! Named types (classes, enums, unions) go into `$defs` and are referenced
//! by name, which also keeps recursive graphs finite on the way out.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::error::Result;
use crate::graph::{PrimitiveKind, Type, TypeGraph, TypeRef};
use crate::render::{pretty_json, RenderResult};

pub fn render(graph: &TypeGraph, names: &BTreeMap<TypeRef, String>) -> Result<RenderResult> {
    let mut defs = Map::new();
    for r in graph.reachable() {
        if let Some(name) = names.get(&r) {
            defs.insert(name.clone(), definition(graph, names, r));
        }
    }

    let mut document = Map::new();
    let tops: Vec<Value> = graph
        .top_levels()
        .values()
        .map(|&r| reference(graph, names, r))
        .collect();
    match tops.as_slice() {
        [single] => {
            if let Value::Object(top) = single {
                document.extend(top.clone());
            }
        }
        _ => {
            document.insert("oneOf".into(), Value::Array(tops));
        }
    }
    if !defs.is_empty() {
        document.insert("$defs".into(), Value::Object(defs));
    }

    let text = pretty_json(&Value::Object(document))?;
    let mut lines: Vec<String> = text.lines().map(String::from).collect();
    lines.push(String::new());
    Ok(RenderResult { lines, annotations: Vec::new() })
}

/// Use site: named types become `$ref`s, everything else is inlined.
fn reference(graph: &TypeGraph, names: &BTreeMap<TypeRef, String>, r: TypeRef) -> Value {
    match names.get(&r) {
        Some(name) => json!({ "$ref": format!("#/$defs/{name}") }),
        None => definition(graph, names, r),
    }
}

fn definition(graph: &TypeGraph, names: &BTreeMap<TypeRef, String>, r: TypeRef) -> Value {
    let mut schema = shape(graph, names, r);
    if let Value::Object(map) = &mut schema {
        if let Some(description) = graph.attrs(r).descriptions.iter().next() {
            map.insert("description".into(), Value::from(description.clone()));
        }
    }
    schema
}

fn shape(graph: &TypeGraph, names: &BTreeMap<TypeRef, String>, r: TypeRef) -> Value {
    match graph.get(r) {
        Type::Primitive(kind) => primitive(*kind),
        Type::TransformedString { kind } => primitive(*kind),
        Type::Enum { cases } => json!({
            "type": "string",
            "enum": cases.iter().cloned().collect::<Vec<_>>(),
        }),
        Type::Class { properties, .. } => {
            let mut props = Map::new();
            let mut required = Vec::new();
            for (name, prop) in properties {
                props.insert(name.clone(), reference(graph, names, prop.ty));
                if !prop.optional {
                    required.push(Value::from(name.clone()));
                }
            }
            let mut out = Map::new();
            out.insert("type".into(), "object".into());
            out.insert("properties".into(), Value::Object(props));
            if !required.is_empty() {
                out.insert("required".into(), Value::Array(required));
            }
            out.insert("additionalProperties".into(), Value::Bool(false));
            Value::Object(out)
        }
        Type::Object { properties, additional } => {
            let mut props = Map::new();
            let mut required = Vec::new();
            for (name, prop) in properties {
                props.insert(name.clone(), reference(graph, names, prop.ty));
                if !prop.optional {
                    required.push(Value::from(name.clone()));
                }
            }
            let mut out = Map::new();
            out.insert("type".into(), "object".into());
            out.insert("properties".into(), Value::Object(props));
            if !required.is_empty() {
                out.insert("required".into(), Value::Array(required));
            }
            let extra = match additional {
                Some(extra) => reference(graph, names, *extra),
                None => Value::Bool(true),
            };
            out.insert("additionalProperties".into(), extra);
            Value::Object(out)
        }
        Type::Map { values } => json!({
            "type": "object",
            "additionalProperties": reference(graph, names, *values),
        }),
        Type::Array { items } => json!({
            "type": "array",
            "items": reference(graph, names, *items),
        }),
        Type::Union { members } => json!({
            "oneOf": members.iter().map(|&m| reference(graph, names, m)).collect::<Vec<_>>(),
        }),
        Type::Intersection { members } => json!({
            "allOf": members.iter().map(|&m| reference(graph, names, m)).collect::<Vec<_>>(),
        }),
        Type::Reserved => Value::Bool(false),
    }
}

fn primitive(kind: PrimitiveKind) -> Value {
    match kind {
        PrimitiveKind::None => json!({ "not": {} }),
        PrimitiveKind::Any => json!({}),
        PrimitiveKind::Null => json!({ "type": "null" }),
        PrimitiveKind::Bool => json!({ "type": "boolean" }),
        PrimitiveKind::Integer => json!({ "type": "integer" }),
        PrimitiveKind::Double => json!({ "type": "number" }),
        PrimitiveKind::String => json!({ "type": "string" }),
        PrimitiveKind::Date => json!({ "type": "string", "format": "date" }),
        PrimitiveKind::Time => json!({ "type": "string", "format": "time" }),
        PrimitiveKind::DateTime => json!({ "type": "string", "format": "date-time" }),
        PrimitiveKind::IntegerString => json!({ "type": "string", "format": "integer" }),
        PrimitiveKind::BoolString => json!({ "type": "string", "format": "boolean" }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Attributes;
    use crate::builder::TypeBuilder;
    use crate::graph::{ClassProperty, StringTypeMapping};

    #[test]
    fn named_class_lands_in_defs_with_a_ref() {
        let mut b = TypeBuilder::new(StringTypeMapping::all(), false);
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let c = b
            .add_class(
                vec![("id".to_string(), ClassProperty { ty: int, optional: false })],
                true,
                Attributes::default(),
            )
            .unwrap();
        b.add_top_level("Thing", c);
        let graph = b.finish().unwrap();

        let mut names = BTreeMap::new();
        names.insert(c, "Thing".to_string());
        let result = render(&graph, &names).unwrap();
        let text = result.lines.join("\n");
        assert!(text.contains("\"$ref\": \"#/$defs/Thing\""));
        assert!(text.contains("\"$defs\""));
        assert!(text.contains("\"required\""));
        assert_eq!(result.lines.last().map(String::as_str), Some(""));
    }
}
