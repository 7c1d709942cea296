//! Constructs type graphs, interning structurally equal types as it goes.
//!
//! Every `add_*` call returns a stable [`TypeRef`]. Non-nominal types are
//! deduplicated on `(shape, attributes)`; classes and objects keep nominal
//! identity unless explicitly flagged for structural interning. Cyclic shapes
//! are built with [`TypeBuilder::reserve`] / [`TypeBuilder::fill`].

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use hashbrown::HashMap;

use crate::attributes::Attributes;
use crate::error::{Error, Result};
use crate::graph::{
    ClassProperty, MemberSet, PrimitiveKind, StringTypeMapping, Type, TypeGraph, TypeRef,
};

pub struct TypeBuilder {
    types: Vec<Type>,
    attributes: Vec<Attributes>,
    interned: HashMap<(Type, Attributes), TypeRef>,
    top_levels: BTreeMap<String, TypeRef>,
    string_mapping: StringTypeMapping,
    fixed_top_levels: bool,
    forwarding_intersections: bool,
}

impl TypeBuilder {
    pub fn new(string_mapping: StringTypeMapping, fixed_top_levels: bool) -> Self {
        TypeBuilder {
            types: Vec::new(),
            attributes: Vec::new(),
            interned: HashMap::new(),
            top_levels: BTreeMap::new(),
            string_mapping,
            fixed_top_levels,
            forwarding_intersections: false,
        }
    }

    pub fn string_mapping(&self) -> &StringTypeMapping {
        &self.string_mapping
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Set when a forwarding intersection was created; the driver must run the
    /// indirection-removal pass before anything else touches the graph.
    pub fn did_add_forwarding_intersection(&self) -> bool {
        self.forwarding_intersections
    }

    fn push(&mut self, ty: Type, attrs: Attributes) -> TypeRef {
        let r = TypeRef(self.types.len() as u32);
        self.types.push(ty);
        self.attributes.push(attrs);
        r
    }

    fn intern(&mut self, ty: Type, attrs: Attributes) -> TypeRef {
        let key = (ty, attrs);
        if let Some(&existing) = self.interned.get(&key) {
            return existing;
        }
        let (ty, attrs) = key;
        let r = self.push(ty.clone(), attrs.clone());
        self.interned.insert((ty, attrs), r);
        r
    }

    /// Inspect an already-built node. Used by the reconstitutor to flatten
    /// as it rebuilds.
    pub fn get(&self, r: TypeRef) -> &Type {
        &self.types[r.index()]
    }

    pub fn add_primitive(&mut self, kind: PrimitiveKind, attrs: Attributes) -> TypeRef {
        self.intern(Type::Primitive(kind), attrs)
    }

    pub fn intern_transformed_string(&mut self, kind: PrimitiveKind, attrs: Attributes) -> TypeRef {
        self.intern(Type::TransformedString { kind }, attrs)
    }

    /// Add a string-family primitive, collapsing kinds the target's
    /// string-type mapping does not keep.
    pub fn get_primitive_string_type(&mut self, kind: PrimitiveKind, attrs: Attributes) -> TypeRef {
        let mapped = self.string_mapping.map(kind);
        self.add_primitive(mapped, attrs)
    }

    pub fn add_enum(&mut self, cases: BTreeSet<String>, attrs: Attributes) -> Result<TypeRef> {
        if cases.is_empty() {
            return Err(Error::Invariant("enum with no cases".into()));
        }
        Ok(self.intern(Type::Enum { cases }, attrs))
    }

    pub fn add_class(
        &mut self,
        properties: Vec<(String, ClassProperty)>,
        nominal: bool,
        attrs: Attributes,
    ) -> Result<TypeRef> {
        check_distinct_properties(&properties)?;
        let ty = Type::Class { properties, nominal };
        if nominal {
            Ok(self.push(ty, attrs))
        } else {
            Ok(self.intern(ty, attrs))
        }
    }

    pub fn add_object(
        &mut self,
        properties: Vec<(String, ClassProperty)>,
        additional: Option<TypeRef>,
        attrs: Attributes,
    ) -> Result<TypeRef> {
        check_distinct_properties(&properties)?;
        Ok(self.push(Type::Object { properties, additional }, attrs))
    }

    pub fn add_map(&mut self, values: TypeRef, attrs: Attributes) -> TypeRef {
        self.intern(Type::Map { values }, attrs)
    }

    pub fn add_array(&mut self, items: TypeRef, attrs: Attributes) -> TypeRef {
        self.intern(Type::Array { items }, attrs)
    }

    pub fn add_union(
        &mut self,
        members: impl IntoIterator<Item = TypeRef>,
        attrs: Attributes,
    ) -> Result<TypeRef> {
        let members = canonical_members(members);
        match members.len() {
            0 => Err(Error::Invariant("union with no members".into())),
            1 => Ok(members[0]),
            _ => Ok(self.intern(Type::Union { members }, attrs)),
        }
    }

    pub fn add_intersection(
        &mut self,
        members: impl IntoIterator<Item = TypeRef>,
        attrs: Attributes,
    ) -> Result<TypeRef> {
        let members = canonical_members(members);
        match members.len() {
            0 => Err(Error::Invariant("intersection with no members".into())),
            1 => Ok(members[0]),
            _ => Ok(self.intern(Type::Intersection { members }, attrs)),
        }
    }

    /// Placeholder indirection to a type that is still under construction.
    /// Resolved by the indirection-removal pass before any other rewrite runs.
    pub fn add_forwarding_intersection(&mut self, target: TypeRef, attrs: Attributes) -> TypeRef {
        self.forwarding_intersections = true;
        let mut members = MemberSet::new();
        members.push(target);
        self.push(Type::Intersection { members }, attrs)
    }

    /// Record that a forwarding intersection was produced through `fill`.
    pub fn mark_forwarding_intersection(&mut self) {
        self.forwarding_intersections = true;
    }

    /// Reserve a slot for a type whose children are not materialized yet.
    pub fn reserve(&mut self) -> TypeRef {
        self.push(Type::Reserved, Attributes::default())
    }

    /// Fill a reserved slot. Filled types keep nominal identity.
    pub fn fill(&mut self, r: TypeRef, ty: Type, attrs: Attributes) -> Result<()> {
        if !matches!(self.types[r.index()], Type::Reserved) {
            return Err(Error::Invariant(format!(
                "fill of non-reserved slot {r:?} ({})",
                self.types[r.index()].kind_name()
            )));
        }
        if let Type::Class { properties, .. } | Type::Object { properties, .. } = &ty {
            check_distinct_properties(properties)?;
        }
        self.types[r.index()] = ty;
        self.attributes[r.index()] = attrs;
        Ok(())
    }

    pub fn add_top_level(&mut self, name: &str, r: TypeRef) {
        self.top_levels.insert(name.to_string(), r);
    }

    pub fn finish(self) -> Result<TypeGraph> {
        for (i, ty) in self.types.iter().enumerate() {
            if matches!(ty, Type::Reserved) {
                return Err(Error::Invariant(format!("reserved slot t{i} never filled")));
            }
            for child in ty.children() {
                if child.index() >= self.types.len() {
                    return Err(Error::Invariant(format!(
                        "t{i} references out-of-range {child:?}"
                    )));
                }
            }
        }
        Ok(TypeGraph {
            types: self.types,
            attributes: self.attributes,
            top_levels: self.top_levels,
            string_mapping: self.string_mapping,
            fixed_top_levels: self.fixed_top_levels,
        })
    }
}

fn canonical_members(members: impl IntoIterator<Item = TypeRef>) -> MemberSet {
    let mut out: MemberSet = members.into_iter().collect();
    out.sort_unstable();
    out.dedup();
    out
}

fn check_distinct_properties(properties: &[(String, ClassProperty)]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for (name, _) in properties {
        if !seen.insert(name.as_str()) {
            return Err(Error::Invariant(format!("duplicate class property `{name}`")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> TypeBuilder {
        TypeBuilder::new(StringTypeMapping::all(), false)
    }

    #[test]
    fn structurally_equal_types_intern_to_one_node() {
        let mut b = builder();
        let a1 = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let a2 = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        assert_eq!(a1, a2);

        let arr1 = b.add_array(a1, Attributes::default());
        let arr2 = b.add_array(a2, Attributes::default());
        assert_eq!(arr1, arr2);
    }

    #[test]
    fn distinct_attributes_keep_distinct_nodes() {
        let mut b = builder();
        let plain = b.add_primitive(PrimitiveKind::String, Attributes::default());
        let named = b.add_primitive(PrimitiveKind::String, Attributes::with_name("Color"));
        assert_ne!(plain, named);
    }

    #[test]
    fn nominal_classes_do_not_intern() {
        let mut b = builder();
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let props = vec![("a".to_string(), ClassProperty { ty: int, optional: false })];
        let c1 = b.add_class(props.clone(), true, Attributes::default()).unwrap();
        let c2 = b.add_class(props.clone(), true, Attributes::default()).unwrap();
        assert_ne!(c1, c2);

        let s1 = b.add_class(props.clone(), false, Attributes::default()).unwrap();
        let s2 = b.add_class(props, false, Attributes::default()).unwrap();
        assert_eq!(s1, s2);
    }

    #[test]
    fn singleton_union_collapses_to_member() {
        let mut b = builder();
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let u = b.add_union([int, int], Attributes::default()).unwrap();
        assert_eq!(u, int);
    }

    #[test]
    fn empty_union_is_rejected() {
        let mut b = builder();
        assert!(matches!(
            b.add_union([], Attributes::default()),
            Err(Error::Invariant(_))
        ));
    }

    #[test]
    fn duplicate_property_is_rejected() {
        let mut b = builder();
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let props = vec![
            ("x".to_string(), ClassProperty { ty: int, optional: false }),
            ("x".to_string(), ClassProperty { ty: int, optional: true }),
        ];
        assert!(matches!(
            b.add_class(props, true, Attributes::default()),
            Err(Error::Invariant(_))
        ));
    }

    #[test]
    fn unfilled_reservation_fails_finish() {
        let mut b = builder();
        let slot = b.reserve();
        b.add_top_level("Root", slot);
        assert!(matches!(b.finish(), Err(Error::Invariant(_))));
    }

    #[test]
    fn string_mapping_applies_at_build() {
        let mut b = TypeBuilder::new(StringTypeMapping::none(), false);
        let r = b.get_primitive_string_type(PrimitiveKind::Date, Attributes::default());
        b.add_top_level("Root", r);
        let g = b.finish().unwrap();
        assert!(matches!(g.get(r), Type::Primitive(PrimitiveKind::String)));
    }
}
