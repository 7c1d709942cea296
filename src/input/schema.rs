//! JSON Schema reader.
//!
//! Converts the subset of JSON Schema the pipeline cares about: `type`
//! (including type arrays), `properties`/`required`/`additionalProperties`,
//! `items`, string `enum` and `format`, `oneOf`/`anyOf` as unions, `allOf` as
//! intersections, and local `$ref`s. Definitions may be mutually recursive;
//! a `$ref` to a definition still under construction goes through a
//! forwarding intersection that the driver resolves first thing.

use std::collections::BTreeSet;

use hashbrown::HashMap;
use serde_json::{Map, Value};

use crate::attributes::{Attributes, StringCases};
use crate::builder::TypeBuilder;
use crate::error::{Error, Result};
use crate::graph::{ClassProperty, PrimitiveKind, Type, TypeRef};
use crate::input::InferenceFlags;

pub fn add_schema_types(
    builder: &mut TypeBuilder,
    top_level_name: &str,
    document: &Value,
    flags: &InferenceFlags,
    provenance: u32,
) -> Result<()> {
    let mut reader = SchemaReader {
        builder,
        root: document,
        resolved: HashMap::new(),
        in_flight: HashMap::new(),
        flags: *flags,
        provenance,
    };
    let top = reader.convert_pointer("#", document)?;
    reader.builder.add_top_level(top_level_name, top);
    Ok(())
}

struct SchemaReader<'a> {
    builder: &'a mut TypeBuilder,
    root: &'a Value,
    /// JSON pointer -> finished type.
    resolved: HashMap<String, TypeRef>,
    /// JSON pointer -> reserved slot, while its schema is being converted.
    in_flight: HashMap<String, TypeRef>,
    flags: InferenceFlags,
    provenance: u32,
}

impl<'a> SchemaReader<'a> {
    fn base_attrs(&self, schema: &Value) -> Attributes {
        let mut attrs = Attributes::with_provenance(self.provenance);
        if let Some(title) = schema.get("title").and_then(Value::as_str) {
            attrs.names.insert(title.to_string());
        }
        if let Some(desc) = schema.get("description").and_then(Value::as_str) {
            attrs.descriptions.insert(desc.to_string());
        }
        attrs
    }

    /// Convert the schema living at `pointer`, registering the slot so
    /// recursive references terminate.
    fn convert_pointer(&mut self, pointer: &str, schema: &Value) -> Result<TypeRef> {
        if let Some(&done) = self.resolved.get(pointer) {
            return Ok(done);
        }
        if let Some(&slot) = self.in_flight.get(pointer) {
            return Ok(slot);
        }
        let slot = self.builder.reserve();
        self.in_flight.insert(pointer.to_string(), slot);
        let converted = self.convert(schema)?;
        // The reserved slot stands in for the converted type; forward it.
        // Direct self-references already hold the slot, so the slot must
        // stay meaningful rather than dangle.
        let attrs = self.base_attrs(schema);
        let mut members = crate::graph::MemberSet::new();
        members.push(converted);
        self.builder.fill(slot, Type::Intersection { members }, attrs)?;
        self.note_forwarder();
        self.in_flight.remove(pointer);
        self.resolved.insert(pointer.to_string(), converted);
        Ok(converted)
    }

    fn note_forwarder(&mut self) {
        // Filling an intersection shell around a finished type is the same
        // indirection `add_forwarding_intersection` creates; make sure the
        // driver knows to clean it up.
        self.builder.mark_forwarding_intersection();
    }

    fn convert(&mut self, schema: &Value) -> Result<TypeRef> {
        let attrs = self.base_attrs(schema);
        match schema {
            Value::Bool(true) => Ok(self.builder.add_primitive(PrimitiveKind::Any, attrs)),
            Value::Bool(false) => Ok(self.builder.add_primitive(PrimitiveKind::None, attrs)),
            Value::Object(map) => self.convert_object_form(map, attrs),
            other => Err(Error::Input(format!(
                "schema must be an object or boolean, got {other}"
            ))),
        }
    }

    fn convert_object_form(&mut self, map: &Map<String, Value>, attrs: Attributes) -> Result<TypeRef> {
        if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
            let target = self.convert_ref(reference)?;
            // Sibling attributes at the reference site must not disturb the
            // shared target; wrap them in an indirection.
            if attrs.names.is_empty() && attrs.descriptions.is_empty() {
                return Ok(target);
            }
            return Ok(self.builder.add_forwarding_intersection(target, attrs));
        }

        if let Some(all_of) = map.get("allOf").and_then(Value::as_array) {
            let members = self.convert_list(all_of)?;
            return self.builder.add_intersection(members, attrs);
        }
        if let Some(alternatives) = map
            .get("oneOf")
            .or_else(|| map.get("anyOf"))
            .and_then(Value::as_array)
        {
            let members = self.convert_list(alternatives)?;
            return self.builder.add_union(members, attrs);
        }

        if let Some(values) = map.get("enum").and_then(Value::as_array) {
            return self.convert_enum(values, attrs);
        }

        match map.get("type") {
            Some(Value::String(ty)) => self.convert_typed(ty, map, attrs),
            Some(Value::Array(types)) => {
                let mut members = Vec::with_capacity(types.len());
                for ty in types {
                    let ty = ty.as_str().ok_or_else(|| {
                        Error::Input(format!("non-string entry in type array: {ty}"))
                    })?;
                    members.push(self.convert_typed(ty, map, Attributes::with_provenance(self.provenance))?);
                }
                self.builder.add_union(members, attrs)
            }
            Some(other) => Err(Error::Input(format!("invalid `type` keyword: {other}"))),
            // No constraining keywords at all: anything goes.
            None => Ok(self.builder.add_primitive(PrimitiveKind::Any, attrs)),
        }
    }

    fn convert_list(&mut self, schemas: &[Value]) -> Result<Vec<TypeRef>> {
        let mut out = Vec::with_capacity(schemas.len());
        for schema in schemas {
            out.push(self.convert(schema)?);
        }
        Ok(out)
    }

    /// String enums become strings carrying their case set; the expansion
    /// pass turns them into enum types per policy. Non-string cases widen
    /// to `any`.
    fn convert_enum(&mut self, values: &[Value], mut attrs: Attributes) -> Result<TypeRef> {
        let mut cases = BTreeSet::new();
        for value in values {
            match value.as_str() {
                Some(s) => {
                    cases.insert(s.to_string());
                }
                None => return Ok(self.builder.add_primitive(PrimitiveKind::Any, attrs)),
            }
        }
        if cases.is_empty() {
            return Err(Error::Input("empty enum in schema".into()));
        }
        attrs.string_cases = StringCases::Finite(cases);
        attrs.cases_from_schema = true;
        Ok(self.builder.add_primitive(PrimitiveKind::String, attrs))
    }

    fn convert_typed(
        &mut self,
        ty: &str,
        map: &Map<String, Value>,
        attrs: Attributes,
    ) -> Result<TypeRef> {
        match ty {
            "null" => Ok(self.builder.add_primitive(PrimitiveKind::Null, attrs)),
            "boolean" => Ok(self.builder.add_primitive(PrimitiveKind::Bool, attrs)),
            "integer" => Ok(self.builder.add_primitive(PrimitiveKind::Integer, attrs)),
            "number" => Ok(self.builder.add_primitive(PrimitiveKind::Double, attrs)),
            "string" => {
                let kind = self.string_kind(map.get("format").and_then(Value::as_str));
                Ok(self.builder.get_primitive_string_type(kind, attrs))
            }
            "array" => {
                let items = match map.get("items") {
                    Some(items) => self.convert(items)?,
                    None => self.builder.add_primitive(PrimitiveKind::Any, Attributes::default()),
                };
                Ok(self.builder.add_array(items, attrs))
            }
            "object" => self.convert_record(map, attrs),
            other => Err(Error::Input(format!("unknown schema type `{other}`"))),
        }
    }

    fn string_kind(&self, format: Option<&str>) -> PrimitiveKind {
        match format {
            Some("date") if self.flags.infer_dates => PrimitiveKind::Date,
            Some("time") if self.flags.infer_dates => PrimitiveKind::Time,
            Some("date-time") if self.flags.infer_dates => PrimitiveKind::DateTime,
            Some("integer") if self.flags.infer_integer_strings => PrimitiveKind::IntegerString,
            Some("boolean") if self.flags.infer_integer_strings => PrimitiveKind::BoolString,
            _ => PrimitiveKind::String,
        }
    }

    fn convert_record(&mut self, map: &Map<String, Value>, mut attrs: Attributes) -> Result<TypeRef> {
        let required: BTreeSet<&str> = map
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let additional = match map.get("additionalProperties") {
            Some(schema @ Value::Object(_)) => Some(self.convert(schema)?),
            Some(Value::Bool(true)) => {
                Some(self.builder.add_primitive(PrimitiveKind::Any, Attributes::default()))
            }
            _ => None,
        };

        let mut properties = Vec::new();
        if let Some(props) = map.get("properties").and_then(Value::as_object) {
            for (name, prop_schema) in props {
                let ty = self.convert(prop_schema)?;
                let optional = if self.flags.all_properties_optional {
                    true
                } else {
                    !required.contains(name.as_str())
                };
                properties.push((name.clone(), ClassProperty { ty, optional }));
            }
        }

        if properties.is_empty() {
            let values = match additional {
                Some(extra) => extra,
                None => self.builder.add_primitive(PrimitiveKind::Any, Attributes::default()),
            };
            return Ok(self.builder.add_map(values, attrs));
        }

        attrs.schema_fixed = true;
        match additional {
            Some(extra) => self.builder.add_object(properties, Some(extra), attrs),
            None => self.builder.add_class(properties, true, attrs),
        }
    }

    /// Resolve a local `$ref`: the document root, `#/definitions/...` or
    /// `#/$defs/...`.
    fn convert_ref(&mut self, reference: &str) -> Result<TypeRef> {
        let pointer = reference
            .strip_prefix('#')
            .ok_or_else(|| Error::Input(format!("only local $refs are supported: {reference}")))?;
        let target = if pointer.is_empty() {
            self.root
        } else {
            self.root
                .pointer(pointer)
                .ok_or_else(|| Error::Input(format!("dangling $ref: {reference}")))?
        };
        let target = target.clone();
        self.convert_pointer(reference, &target)
    }
}
