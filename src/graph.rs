//! The intermediate representation: an interned, possibly-cyclic type graph.
//!
//! A [`TypeGraph`] owns a vector of [`Type`] nodes indexed by [`TypeRef`],
//! a parallel vector of attribute bundles, and the named top-level entries.
//! Graphs are immutable once finished; every rewrite produces a fresh graph.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use smallvec::SmallVec;

use crate::attributes::Attributes;

/// Stable identity of a type within one graph. Copyable handle; all child
/// links in the IR are `TypeRef`s into the owning graph's arena.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeRef(pub(crate) u32);

impl TypeRef {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Member list of a union or intersection. Kept sorted and deduplicated so
/// structurally equal sets intern to the same node.
pub type MemberSet = SmallVec<[TypeRef; 4]>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveKind {
    None,
    Any,
    Null,
    Bool,
    Integer,
    Double,
    String,
    Date,
    Time,
    DateTime,
    IntegerString,
    BoolString,
}

impl PrimitiveKind {
    /// True for the string kinds that carry a transformer identity.
    pub fn is_transformed_string(self) -> bool {
        matches!(
            self,
            PrimitiveKind::Date
                | PrimitiveKind::Time
                | PrimitiveKind::DateTime
                | PrimitiveKind::IntegerString
                | PrimitiveKind::BoolString
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::None => "none",
            PrimitiveKind::Any => "any",
            PrimitiveKind::Null => "null",
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::Integer => "integer",
            PrimitiveKind::Double => "double",
            PrimitiveKind::String => "string",
            PrimitiveKind::Date => "date",
            PrimitiveKind::Time => "time",
            PrimitiveKind::DateTime => "date-time",
            PrimitiveKind::IntegerString => "integer-string",
            PrimitiveKind::BoolString => "bool-string",
        }
    }
}

/// Which transformed-string kinds a target can represent. Each slot maps the
/// inferred kind either to itself or down to plain `String`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StringTypeMapping {
    pub date: PrimitiveKind,
    pub time: PrimitiveKind,
    pub date_time: PrimitiveKind,
    pub integer_string: PrimitiveKind,
    pub bool_string: PrimitiveKind,
}

impl StringTypeMapping {
    /// Every transformed kind survives as itself.
    pub fn all() -> Self {
        StringTypeMapping {
            date: PrimitiveKind::Date,
            time: PrimitiveKind::Time,
            date_time: PrimitiveKind::DateTime,
            integer_string: PrimitiveKind::IntegerString,
            bool_string: PrimitiveKind::BoolString,
        }
    }

    /// Every transformed kind collapses to plain `String`.
    pub fn none() -> Self {
        StringTypeMapping {
            date: PrimitiveKind::String,
            time: PrimitiveKind::String,
            date_time: PrimitiveKind::String,
            integer_string: PrimitiveKind::String,
            bool_string: PrimitiveKind::String,
        }
    }

    /// Resolve an inferred string kind to what this target can hold.
    pub fn map(&self, kind: PrimitiveKind) -> PrimitiveKind {
        match kind {
            PrimitiveKind::Date => self.date,
            PrimitiveKind::Time => self.time,
            PrimitiveKind::DateTime => self.date_time,
            PrimitiveKind::IntegerString => self.integer_string,
            PrimitiveKind::BoolString => self.bool_string,
            other => other,
        }
    }

    /// True when the target keeps `kind` distinct from plain `String`.
    pub fn supports(&self, kind: PrimitiveKind) -> bool {
        self.map(kind) == kind && kind.is_transformed_string()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClassProperty {
    pub ty: TypeRef,
    pub optional: bool,
}

/// One node of the type graph.
///
/// Classes and objects have nominal identity; everything else is interned
/// structurally together with its attributes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Primitive(PrimitiveKind),
    Enum {
        cases: BTreeSet<String>,
    },
    Class {
        properties: Vec<(String, ClassProperty)>,
        nominal: bool,
    },
    Map {
        values: TypeRef,
    },
    Array {
        items: TypeRef,
    },
    Union {
        members: MemberSet,
    },
    Intersection {
        members: MemberSet,
    },
    /// Open record: class-like properties plus an additional-properties type.
    /// Only survives the pipeline when the target supports it.
    Object {
        properties: Vec<(String, ClassProperty)>,
        additional: Option<TypeRef>,
    },
    /// A string specialized with a transformer identity, inserted late in the
    /// pipeline for targets whose string-type mapping keeps the kind.
    TransformedString {
        kind: PrimitiveKind,
    },
    /// Placeholder slot during cyclic construction. Must never survive
    /// `TypeBuilder::finish`.
    Reserved,
}

impl Type {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Type::Primitive(kind) => kind.name(),
            Type::Enum { .. } => "enum",
            Type::Class { .. } => "class",
            Type::Map { .. } => "map",
            Type::Array { .. } => "array",
            Type::Union { .. } => "union",
            Type::Intersection { .. } => "intersection",
            Type::Object { .. } => "object",
            Type::TransformedString { .. } => "transformed-string",
            Type::Reserved => "reserved",
        }
    }

    /// Direct children, in a deterministic order.
    pub fn children(&self) -> Vec<TypeRef> {
        match self {
            Type::Primitive(_) | Type::Enum { .. } | Type::TransformedString { .. } | Type::Reserved => {
                Vec::new()
            }
            Type::Class { properties, .. } => properties.iter().map(|(_, p)| p.ty).collect(),
            Type::Object { properties, additional } => {
                let mut out: Vec<TypeRef> = properties.iter().map(|(_, p)| p.ty).collect();
                if let Some(extra) = additional {
                    out.push(*extra);
                }
                out
            }
            Type::Map { values } => vec![*values],
            Type::Array { items } => vec![*items],
            Type::Union { members } | Type::Intersection { members } => members.to_vec(),
        }
    }
}

/// An immutable graph of types reachable from named top-level entries.
#[derive(Clone, Debug)]
pub struct TypeGraph {
    pub(crate) types: Vec<Type>,
    pub(crate) attributes: Vec<Attributes>,
    pub(crate) top_levels: BTreeMap<String, TypeRef>,
    pub(crate) string_mapping: StringTypeMapping,
    pub(crate) fixed_top_levels: bool,
}

impl TypeGraph {
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn get(&self, r: TypeRef) -> &Type {
        &self.types[r.index()]
    }

    pub fn attrs(&self, r: TypeRef) -> &Attributes {
        &self.attributes[r.index()]
    }

    pub fn top_levels(&self) -> &BTreeMap<String, TypeRef> {
        &self.top_levels
    }

    pub fn string_mapping(&self) -> &StringTypeMapping {
        &self.string_mapping
    }

    pub fn fixed_top_levels(&self) -> bool {
        self.fixed_top_levels
    }

    pub fn refs(&self) -> impl Iterator<Item = TypeRef> {
        (0..self.types.len() as u32).map(TypeRef)
    }

    /// All refs reachable from the top levels, in deterministic preorder
    /// (top levels by name, children in declaration order).
    pub fn reachable(&self) -> Vec<TypeRef> {
        let mut seen = vec![false; self.types.len()];
        let mut order = Vec::new();
        let mut stack: Vec<TypeRef> = self.top_levels.values().rev().copied().collect();
        while let Some(r) = stack.pop() {
            if seen[r.index()] {
                continue;
            }
            seen[r.index()] = true;
            order.push(r);
            let children = self.get(r).children();
            for child in children.into_iter().rev() {
                stack.push(child);
            }
        }
        order
    }

    /// Does any reachable type satisfy `pred`?
    pub fn any_reachable(&self, mut pred: impl FnMut(&Type) -> bool) -> bool {
        self.reachable().into_iter().any(|r| pred(self.get(r)))
    }

    /// Refs of reachable types that are part of a cycle. Used by renderers to
    /// decide where indirection is needed.
    pub fn cyclic_refs(&self) -> BTreeSet<TypeRef> {
        #[derive(Copy, Clone, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }
        let mut color = vec![Color::White; self.types.len()];
        let mut cyclic = BTreeSet::new();
        // Iterative DFS with an explicit enter/exit stack.
        for &root in self.top_levels.values() {
            let mut stack = vec![(root, false)];
            while let Some((r, exiting)) = stack.pop() {
                if exiting {
                    color[r.index()] = Color::Black;
                    continue;
                }
                match color[r.index()] {
                    Color::Black => continue,
                    Color::Gray => {
                        cyclic.insert(r);
                        continue;
                    }
                    Color::White => {}
                }
                color[r.index()] = Color::Gray;
                stack.push((r, true));
                for child in self.get(r).children() {
                    match color[child.index()] {
                        Color::Gray => {
                            cyclic.insert(child);
                        }
                        Color::White => stack.push((child, false)),
                        Color::Black => {}
                    }
                }
            }
        }
        cyclic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_mapping_collapses_unsupported_kinds() {
        let mapping = StringTypeMapping::none();
        assert_eq!(mapping.map(PrimitiveKind::Date), PrimitiveKind::String);
        assert!(!mapping.supports(PrimitiveKind::Date));

        let mapping = StringTypeMapping::all();
        assert_eq!(mapping.map(PrimitiveKind::DateTime), PrimitiveKind::DateTime);
        assert!(mapping.supports(PrimitiveKind::DateTime));
        // Plain string is never "transformed".
        assert!(!mapping.supports(PrimitiveKind::String));
    }
}
