//! Sample-driven inference.
//!
//! Streams JSON documents in and keeps one evidence summary per location:
//! one arm per JSON kind plus presence counts. The join is associative,
//! commutative and idempotent, so sample order never matters and there is no
//! history beyond sufficient statistics. [`build`] lowers the summary into
//! graph types; over-approximation (union of everything observed) is fine
//! because the pipeline normalizes afterwards.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::attributes::{Attributes, StringCases};
use crate::builder::TypeBuilder;
use crate::error::Result;
use crate::graph::{ClassProperty, PrimitiveKind, TypeRef};
use crate::input::InferenceFlags;

#[derive(Clone, Debug, Default)]
pub struct Evidence {
    pub nullable: bool,
    pub has_bool: bool,
    pub num: Option<NumEvidence>,
    pub str_: Option<StrEvidence>,
    pub arr: Option<ArrEvidence>,
    pub obj: Option<ObjEvidence>,
}

#[derive(Clone, Debug, Default)]
pub struct NumEvidence {
    pub saw_int: bool,
    pub saw_double: bool,
}

#[derive(Clone, Debug)]
pub struct StrEvidence {
    pub cases: StringCases,
    pub shape: StringShape,
}

/// Lattice over string classifications: all observed strings share a shape,
/// or the slot degrades to plain string.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StringShape {
    Uniform(PrimitiveKind),
    Plain,
}

#[derive(Clone, Debug, Default)]
pub struct ArrEvidence {
    /// Pooled evidence over all elements of all observed arrays.
    pub item: Box<Evidence>,
}

#[derive(Clone, Debug, Default)]
pub struct ObjEvidence {
    /// First-observed insertion order; alphabetization is a pipeline concern.
    pub fields: Vec<(String, FieldEvidence)>,
    pub seen: u64,
}

#[derive(Clone, Debug, Default)]
pub struct FieldEvidence {
    pub evidence: Evidence,
    pub present_in: u64,
}

// ------------------------------ Observe ---------------------------------- //

pub fn observe(value: &Value, flags: &InferenceFlags) -> Evidence {
    match value {
        Value::Null => Evidence { nullable: true, ..Evidence::default() },
        Value::Bool(_) => Evidence { has_bool: true, ..Evidence::default() },
        Value::Number(n) => {
            let saw_int = n.is_i64() || n.is_u64();
            Evidence {
                num: Some(NumEvidence { saw_int, saw_double: !saw_int }),
                ..Evidence::default()
            }
        }
        Value::String(s) => {
            let mut cases = BTreeSet::new();
            cases.insert(s.clone());
            Evidence {
                str_: Some(StrEvidence {
                    cases: StringCases::Finite(cases),
                    shape: StringShape::Uniform(classify_string(s, flags)),
                }),
                ..Evidence::default()
            }
        }
        Value::Array(elements) => observe_array(elements, flags),
        Value::Object(map) => observe_object(map, flags),
    }
}

fn observe_array(elements: &[Value], flags: &InferenceFlags) -> Evidence {
    let mut item = Evidence::default();
    for element in elements {
        item = Evidence::join(&item, &observe(element, flags));
    }
    Evidence { arr: Some(ArrEvidence { item: Box::new(item) }), ..Evidence::default() }
}

fn observe_object(map: &Map<String, Value>, flags: &InferenceFlags) -> Evidence {
    let mut obj = ObjEvidence { fields: Vec::with_capacity(map.len()), seen: 1 };
    for (key, value) in map {
        obj.fields.push((
            key.clone(),
            FieldEvidence { evidence: observe(value, flags), present_in: 1 },
        ));
    }
    Evidence { obj: Some(obj), ..Evidence::default() }
}

// -------------------------------- Join ----------------------------------- //

impl Evidence {
    pub fn join(a: &Self, b: &Self) -> Self {
        Evidence {
            nullable: a.nullable || b.nullable,
            has_bool: a.has_bool || b.has_bool,
            num: join_option(&a.num, &b.num, NumEvidence::join),
            str_: join_option(&a.str_, &b.str_, StrEvidence::join),
            arr: join_option(&a.arr, &b.arr, ArrEvidence::join),
            obj: join_option(&a.obj, &b.obj, ObjEvidence::join),
        }
    }

    pub fn is_bottom(&self) -> bool {
        !self.nullable
            && !self.has_bool
            && self.num.is_none()
            && self.str_.is_none()
            && self.arr.is_none()
            && self.obj.is_none()
    }
}

fn join_option<T: Clone>(a: &Option<T>, b: &Option<T>, join: impl Fn(&T, &T) -> T) -> Option<T> {
    match (a, b) {
        (None, None) => None,
        (Some(x), None) | (None, Some(x)) => Some(x.clone()),
        (Some(x), Some(y)) => Some(join(x, y)),
    }
}

impl NumEvidence {
    fn join(a: &Self, b: &Self) -> Self {
        NumEvidence {
            saw_int: a.saw_int || b.saw_int,
            saw_double: a.saw_double || b.saw_double,
        }
    }
}

impl StrEvidence {
    fn join(a: &Self, b: &Self) -> Self {
        StrEvidence {
            cases: StringCases::union(&a.cases, &b.cases),
            shape: match (a.shape, b.shape) {
                (StringShape::Uniform(x), StringShape::Uniform(y)) if x == y => {
                    StringShape::Uniform(x)
                }
                _ => StringShape::Plain,
            },
        }
    }
}

impl ArrEvidence {
    fn join(a: &Self, b: &Self) -> Self {
        ArrEvidence { item: Box::new(Evidence::join(&a.item, &b.item)) }
    }
}

impl ObjEvidence {
    fn join(a: &Self, b: &Self) -> Self {
        let mut out = ObjEvidence { fields: Vec::new(), seen: a.seen + b.seen };
        for (key, fa) in &a.fields {
            match b.fields.iter().find(|(k, _)| k == key) {
                None => out.fields.push((key.clone(), fa.clone())),
                Some((_, fb)) => out.fields.push((
                    key.clone(),
                    FieldEvidence {
                        evidence: Evidence::join(&fa.evidence, &fb.evidence),
                        present_in: fa.present_in + fb.present_in,
                    },
                )),
            }
        }
        for (key, fb) in &b.fields {
            if !out.fields.iter().any(|(k, _)| k == key) {
                out.fields.push((key.clone(), fb.clone()));
            }
        }
        out
    }
}

// ---------------------------- Classification ----------------------------- //

static DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date regex"));
static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2}:\d{2}:\d{2}(\.\d+)?$").expect("time regex"));
static DATE_TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}[Tt ]\d{2}:\d{2}:\d{2}(\.\d+)?([Zz]|[+-]\d{2}:\d{2})?$")
        .expect("date-time regex")
});
static INTEGER_STRING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d{1,18}$").expect("integer-string regex"));

fn classify_string(s: &str, flags: &InferenceFlags) -> PrimitiveKind {
    if flags.infer_dates {
        if DATE_TIME_RE.is_match(s) {
            return PrimitiveKind::DateTime;
        }
        if DATE_RE.is_match(s) {
            return PrimitiveKind::Date;
        }
        if TIME_RE.is_match(s) {
            return PrimitiveKind::Time;
        }
    }
    if flags.infer_integer_strings {
        if INTEGER_STRING_RE.is_match(s) {
            return PrimitiveKind::IntegerString;
        }
        if s == "true" || s == "false" {
            return PrimitiveKind::BoolString;
        }
    }
    PrimitiveKind::String
}

// -------------------------------- Build ---------------------------------- //

/// Lower an evidence summary into graph types. One arm per observed kind;
/// multiple arms become a union the pipeline flattens.
pub fn build(
    builder: &mut TypeBuilder,
    evidence: &Evidence,
    flags: &InferenceFlags,
    provenance: u32,
) -> Result<TypeRef> {
    let base = Attributes::with_provenance(provenance);

    // Nothing observed at all: absence of evidence, not evidence of absence.
    if evidence.is_bottom() {
        return Ok(builder.add_primitive(PrimitiveKind::None, base));
    }

    let mut arms: Vec<TypeRef> = Vec::new();

    if let Some(arr) = &evidence.arr {
        let items = build(builder, &arr.item, flags, provenance)?;
        arms.push(builder.add_array(items, base.clone()));
    }

    if let Some(obj) = &evidence.obj {
        let mut properties = Vec::with_capacity(obj.fields.len());
        for (name, field) in &obj.fields {
            let ty = build(builder, &field.evidence, flags, provenance)?;
            let optional = flags.all_properties_optional || field.present_in < obj.seen;
            properties.push((name.clone(), ClassProperty { ty, optional }));
        }
        arms.push(builder.add_class(properties, false, base.clone())?);
    }

    if let Some(num) = &evidence.num {
        let kind = if num.saw_double { PrimitiveKind::Double } else { PrimitiveKind::Integer };
        arms.push(builder.add_primitive(kind, base.clone()));
    }

    if let Some(str_) = &evidence.str_ {
        let kind = match str_.shape {
            StringShape::Uniform(kind) => kind,
            StringShape::Plain => PrimitiveKind::String,
        };
        // Case evidence counts only for slots that held nothing but strings
        // (null aside); a string sharing its slot with other kinds is not
        // enum material.
        let mixed = evidence.num.is_some()
            || evidence.has_bool
            || evidence.arr.is_some()
            || evidence.obj.is_some();
        let mut attrs = base.clone();
        if builder.string_mapping().map(kind) == PrimitiveKind::String {
            attrs.string_cases =
                if mixed { StringCases::Unbounded } else { str_.cases.clone() };
        }
        arms.push(builder.get_primitive_string_type(kind, attrs));
    }

    if evidence.has_bool {
        arms.push(builder.add_primitive(PrimitiveKind::Bool, base.clone()));
    }

    if evidence.nullable {
        arms.push(builder.add_primitive(PrimitiveKind::Null, base.clone()));
    }

    match arms.len() {
        1 => Ok(arms.remove(0)),
        _ => builder.add_union(arms, base),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{StringTypeMapping, Type};
    use serde_json::json;

    fn flags() -> InferenceFlags {
        InferenceFlags::default()
    }

    fn build_one(value: Value) -> (crate::graph::TypeGraph, TypeRef) {
        let mut b = TypeBuilder::new(StringTypeMapping::all(), false);
        let ev = observe(&value, &flags());
        let top = build(&mut b, &ev, &flags(), 0).unwrap();
        b.add_top_level("Root", top);
        let graph = b.finish().unwrap();
        let root = graph.top_levels()["Root"];
        (graph, root)
    }

    #[test]
    fn join_is_order_independent() {
        let values = [json!(1), json!("x"), json!(null), json!([1, 2])];
        let forward = values
            .iter()
            .fold(Evidence::default(), |acc, v| Evidence::join(&acc, &observe(v, &flags())));
        let backward = values
            .iter()
            .rev()
            .fold(Evidence::default(), |acc, v| Evidence::join(&acc, &observe(v, &flags())));
        assert_eq!(format!("{forward:?}"), format!("{backward:?}"));
    }

    #[test]
    fn empty_array_infers_none_element() {
        let (graph, root) = build_one(json!([]));
        let Type::Array { items } = graph.get(root) else { panic!("expected array") };
        assert!(matches!(graph.get(*items), Type::Primitive(PrimitiveKind::None)));
    }

    #[test]
    fn mixed_scalars_build_a_union() {
        let (graph, root) = build_one(json!([1, "x", 2, "y", null]));
        let Type::Array { items } = graph.get(root) else { panic!("expected array") };
        let Type::Union { members } = graph.get(*items) else { panic!("expected union") };
        assert_eq!(members.len(), 3);
    }

    #[test]
    fn missing_field_is_optional() {
        let mut b = TypeBuilder::new(StringTypeMapping::all(), false);
        let ev = [json!({"a": 1}), json!({})]
            .iter()
            .fold(Evidence::default(), |acc, v| Evidence::join(&acc, &observe(v, &flags())));
        let top = build(&mut b, &ev, &flags(), 0).unwrap();
        b.add_top_level("Root", top);
        let graph = b.finish().unwrap();
        let root = graph.top_levels()["Root"];
        let Type::Class { properties, .. } = graph.get(root) else { panic!("expected class") };
        assert!(properties[0].1.optional);
    }

    #[test]
    fn date_strings_classify_uniformly() {
        let ev = [json!("2021-01-01"), json!("2022-06-15")]
            .iter()
            .fold(Evidence::default(), |acc, v| Evidence::join(&acc, &observe(v, &flags())));
        let str_ = ev.str_.clone().expect("string evidence");
        assert_eq!(str_.shape, StringShape::Uniform(PrimitiveKind::Date));

        let ev = Evidence::join(&ev, &observe(&json!("not a date"), &flags()));
        assert_eq!(ev.str_.expect("string evidence").shape, StringShape::Plain);
    }

    #[test]
    fn integer_strings_gate_on_the_flag() {
        let off = InferenceFlags { infer_integer_strings: false, ..flags() };
        let ev = observe(&json!("12345"), &off);
        assert_eq!(
            ev.str_.expect("string evidence").shape,
            StringShape::Uniform(PrimitiveKind::String)
        );
    }
}
