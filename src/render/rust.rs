//! Emits a strict Rust data model for the final graph.
//!
//! One `struct` per class, one fieldless `enum` per string enum, one
//! untagged `enum` per union. Nullability renders as `Option<T>`; cyclic
//! references are boxed.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::Result;
use crate::graph::{PrimitiveKind, Type, TypeGraph, TypeRef};
use crate::names::pascal_case;
use crate::render::{Annotation, RenderResult, Span};

const RUST_KEYWORDS: &[&str] = &[
    "as", "async", "await", "box", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
    "mut", "pub", "ref", "return", "self", "static", "struct", "super", "trait", "true", "type",
    "union", "unsafe", "use", "where", "while",
];

#[derive(Clone, Debug)]
pub struct RustOptions {
    pub extra_derives: Vec<String>,
    pub leading_comments: Vec<String>,
    pub indent: String,
}

impl Default for RustOptions {
    fn default() -> Self {
        RustOptions {
            extra_derives: Vec::new(),
            leading_comments: Vec::new(),
            indent: "    ".to_string(),
        }
    }
}

pub fn render(
    graph: &TypeGraph,
    names: &BTreeMap<TypeRef, String>,
    options: &RustOptions,
) -> Result<RenderResult> {
    let emitter = Emitter {
        graph,
        names,
        cyclic: graph.cyclic_refs(),
        indent: options.indent.clone(),
    };

    let mut body: Vec<String> = Vec::new();
    let mut annotations: Vec<Annotation> = Vec::new();
    let top_level_refs: BTreeSet<TypeRef> = graph.top_levels().values().copied().collect();
    let derive = derive_line(&options.extra_derives);

    let uses_maps = graph.any_reachable(|t| matches!(t, Type::Map { .. } | Type::Object { .. }));
    for r in graph.reachable() {
        let Some(name) = names.get(&r) else { continue };
        let def = match graph.get(r) {
            Type::Class { properties, .. } => {
                Some(emitter.emit_struct(name, properties, None, &derive))
            }
            Type::Object { properties, additional } => {
                Some(emitter.emit_struct(name, properties, Some(*additional), &derive))
            }
            Type::Enum { cases } => Some(emitter.emit_enum(name, cases, &derive)),
            Type::Union { members } => Some(emitter.emit_union(name, members, &derive)),
            _ => None,
        };
        let Some(def) = def else { continue };
        if !body.is_empty() {
            body.push(String::new());
        }
        if top_level_refs.contains(&r) {
            // The header line is the one after the derive attribute(s).
            let header_offset = def
                .iter()
                .position(|l| l.starts_with("pub "))
                .unwrap_or(0);
            annotations.push(Annotation {
                annotation: format!("top-level type {name}"),
                span: Span::line(body.len() + header_offset, def[header_offset].len()),
            });
        }
        body.extend(def);
    }

    let mut lines: Vec<String> = Vec::new();
    for comment in &options.leading_comments {
        lines.push(format!("// {comment}"));
    }
    if !options.leading_comments.is_empty() {
        lines.push(String::new());
    }
    lines.push("use serde::{Deserialize, Serialize};".to_string());
    if uses_maps {
        lines.push("use std::collections::HashMap;".to_string());
    }
    lines.push(String::new());

    let offset = lines.len();
    for annotation in &mut annotations {
        annotation.span.start.line += offset;
        annotation.span.end.line += offset;
    }
    lines.extend(body);

    Ok(RenderResult { lines, annotations })
}

fn derive_line(extra: &[String]) -> String {
    let mut derives = vec!["Debug", "Clone", "Serialize", "Deserialize"];
    derives.extend(extra.iter().map(String::as_str));
    format!("#[derive({})]", derives.join(", "))
}

struct Emitter<'g> {
    graph: &'g TypeGraph,
    names: &'g BTreeMap<TypeRef, String>,
    cyclic: BTreeSet<TypeRef>,
    indent: String,
}

impl<'g> Emitter<'g> {
    fn emit_struct(
        &self,
        name: &str,
        properties: &[(String, crate::graph::ClassProperty)],
        additional: Option<Option<TypeRef>>,
        derive: &str,
    ) -> Vec<String> {
        let mut lines = vec![derive.to_string(), format!("pub struct {name} {{")];
        let mut used: BTreeSet<String> = BTreeSet::new();
        for (json_name, prop) in properties {
            let field = field_ident(json_name, &mut used);
            if field != *json_name {
                lines.push(format!("{}#[serde(rename = \"{json_name}\")]", self.indent));
            }
            let mut expr = self.type_expr(prop.ty);
            if prop.optional {
                expr = format!("Option<{expr}>");
            }
            lines.push(format!("{}pub {field}: {expr},", self.indent));
        }
        if let Some(extra) = additional {
            let value_expr = match extra {
                Some(extra) => self.type_expr(extra),
                None => "serde_json::Value".to_string(),
            };
            lines.push(format!("{}#[serde(flatten)]", self.indent));
            lines.push(format!(
                "{}pub additional_properties: HashMap<String, {value_expr}>,",
                self.indent
            ));
        }
        lines.push("}".to_string());
        lines
    }

    fn emit_enum(&self, name: &str, cases: &BTreeSet<String>, derive: &str) -> Vec<String> {
        let mut lines = vec![derive.to_string(), format!("pub enum {name} {{")];
        let mut used: BTreeSet<String> = BTreeSet::new();
        for case in cases {
            let variant = variant_ident(case, &mut used);
            lines.push(format!("{}#[serde(rename = \"{case}\")]", self.indent));
            lines.push(format!("{}{variant},", self.indent));
        }
        lines.push("}".to_string());
        lines
    }

    fn emit_union(&self, name: &str, members: &[TypeRef], derive: &str) -> Vec<String> {
        let mut lines = vec![
            derive.to_string(),
            "#[serde(untagged)]".to_string(),
            format!("pub enum {name} {{"),
        ];
        let mut used: BTreeSet<String> = BTreeSet::new();
        for &member in members {
            // Null renders as Option at the use site, not as a variant.
            if matches!(self.graph.get(member), Type::Primitive(PrimitiveKind::Null)) {
                continue;
            }
            let label = variant_ident(&self.member_label(member), &mut used);
            lines.push(format!(
                "{}{label}({}),",
                self.indent,
                self.type_expr(member)
            ));
        }
        lines.push("}".to_string());
        lines
    }

    fn member_label(&self, r: TypeRef) -> String {
        if let Some(name) = self.names.get(&r) {
            return name.clone();
        }
        match self.graph.get(r) {
            Type::Primitive(kind) => pascal_case(kind.name()),
            Type::TransformedString { kind } => pascal_case(kind.name()),
            Type::Map { .. } => "Map".to_string(),
            Type::Array { .. } => "Array".to_string(),
            other => pascal_case(other.kind_name()),
        }
    }

    fn type_expr(&self, r: TypeRef) -> String {
        match self.graph.get(r) {
            Type::Primitive(kind) => primitive_expr(*kind).to_string(),
            Type::TransformedString { .. } => "String".to_string(),
            Type::Enum { .. } | Type::Class { .. } | Type::Object { .. } => self.named_expr(r),
            Type::Map { values } => format!("HashMap<String, {}>", self.type_expr(*values)),
            Type::Array { items } => format!("Vec<{}>", self.type_expr(*items)),
            Type::Union { members } => {
                let non_null: Vec<TypeRef> = members
                    .iter()
                    .copied()
                    .filter(|&m| !matches!(self.graph.get(m), Type::Primitive(PrimitiveKind::Null)))
                    .collect();
                let has_null = non_null.len() != members.len();
                let inner = match non_null.as_slice() {
                    [] => "serde_json::Value".to_string(),
                    [single] => self.type_expr(*single),
                    _ => self.named_expr(r),
                };
                if has_null {
                    format!("Option<{inner}>")
                } else {
                    inner
                }
            }
            Type::Intersection { .. } | Type::Reserved => "serde_json::Value".to_string(),
        }
    }

    fn named_expr(&self, r: TypeRef) -> String {
        let name = self
            .names
            .get(&r)
            .cloned()
            .unwrap_or_else(|| "serde_json::Value".to_string());
        if self.cyclic.contains(&r) {
            format!("Box<{name}>")
        } else {
            name
        }
    }

}

fn primitive_expr(kind: PrimitiveKind) -> &'static str {
    match kind {
        PrimitiveKind::None | PrimitiveKind::Any => "serde_json::Value",
        PrimitiveKind::Null => "Option<serde_json::Value>",
        PrimitiveKind::Bool => "bool",
        PrimitiveKind::Integer => "i64",
        PrimitiveKind::Double => "f64",
        PrimitiveKind::String
        | PrimitiveKind::Date
        | PrimitiveKind::Time
        | PrimitiveKind::DateTime
        | PrimitiveKind::IntegerString
        | PrimitiveKind::BoolString => "String",
    }
}

fn field_ident(json_name: &str, used: &mut BTreeSet<String>) -> String {
    let mut out = String::new();
    let mut prev_lower = false;
    for c in json_name.chars() {
        if c.is_ascii_alphanumeric() {
            if c.is_ascii_uppercase() {
                if prev_lower {
                    out.push('_');
                }
                out.extend(c.to_lowercase());
                prev_lower = false;
            } else {
                out.push(c);
                prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
            }
        } else if !out.ends_with('_') && !out.is_empty() {
            out.push('_');
            prev_lower = false;
        }
    }
    let mut out = out.trim_matches('_').to_string();
    if out.is_empty() {
        out = "field".to_string();
    }
    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    if RUST_KEYWORDS.contains(&out.as_str()) {
        out = match out.as_str() {
            "self" | "super" | "crate" => format!("{out}_"),
            _ => format!("r#{out}"),
        };
    }
    dedupe(out, used)
}

fn variant_ident(label: &str, used: &mut BTreeSet<String>) -> String {
    let mut out = pascal_case(label);
    if out.is_empty() {
        out = "Empty".to_string();
    }
    dedupe(out, used)
}

fn dedupe(base: String, used: &mut BTreeSet<String>) -> String {
    if used.insert(base.clone()) {
        return base;
    }
    let mut n = 1;
    loop {
        n += 1;
        let candidate = format!("{base}{n}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
    }
}
