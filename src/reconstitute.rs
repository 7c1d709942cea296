//! Copies a graph into a fresh builder through a rewrite plan.
//!
//! A pass analyzes the source graph and produces a [`Plan`]: a map from source
//! refs to the shape that should replace them, expressed over source refs.
//! The [`Reconstitutor`] then walks the graph once, memoized on source
//! identity, materializing planned shapes and structurally copying everything
//! else. An empty plan is a plain canonicalizing copy (used by the garbage
//! collector).
//!
//! Cycles are legal only through class and object types; those are emitted
//! with reserve/fill and memoized before their children are visited. A cycle
//! that avoids every nominal type is a structural-invariant violation.

use std::collections::BTreeSet;

use hashbrown::{HashMap, HashSet};

use crate::attributes::{Attributes, StringCases};
use crate::builder::TypeBuilder;
use crate::error::{Error, Result};
use crate::graph::{ClassProperty, PrimitiveKind, Type, TypeGraph, TypeRef};

/// Where a planned child type comes from.
#[derive(Clone, Debug)]
pub enum PlannedRef {
    /// The rewrite of this source type (plan entry or structural copy).
    Src(TypeRef),
    /// A shape with no source identity of its own.
    Inline(Box<PlannedType>),
}

#[derive(Clone, Debug)]
pub struct PlannedProperty {
    pub ty: PlannedRef,
    pub optional: bool,
}

/// Replacement shape for one node.
#[derive(Clone, Debug)]
pub enum PlannedShape {
    /// Stand in for another planned ref entirely.
    Ref(PlannedRef),
    Primitive(PrimitiveKind),
    TransformedString(PrimitiveKind),
    Enum(BTreeSet<String>),
    Map(PlannedRef),
    Array(PlannedRef),
    Union(Vec<PlannedRef>),
    /// `union { inner, null }`, flattened when `inner` lands as a union.
    Nullable(PlannedRef),
    Class {
        properties: Vec<(String, PlannedProperty)>,
        nominal: bool,
    },
    Object {
        properties: Vec<(String, PlannedProperty)>,
        additional: Option<PlannedRef>,
    },
    /// Several same-kind members collapsed into one primitive of `kind`.
    /// Attributes of all listed refs are united; enum sources fold their
    /// cases into the string-case evidence.
    MergedPrimitive(PrimitiveKind, Vec<TypeRef>),
    /// Several enum members collapsed into one enum with united cases.
    MergedEnum(Vec<TypeRef>),
}

#[derive(Clone, Debug)]
pub struct PlannedType {
    pub shape: PlannedShape,
    /// Extra attributes united into the materialized node.
    pub extra: Attributes,
}

impl PlannedType {
    pub fn of(shape: PlannedShape) -> Self {
        PlannedType { shape, extra: Attributes::default() }
    }
}

pub type Plan = HashMap<TypeRef, PlannedType>;

pub struct Reconstitutor<'g> {
    source: &'g TypeGraph,
    builder: TypeBuilder,
    plan: Plan,
    memo: HashMap<TypeRef, TypeRef>,
    in_progress: HashSet<TypeRef>,
    alphabetize: bool,
}

impl<'g> Reconstitutor<'g> {
    pub fn new(source: &'g TypeGraph, plan: Plan, alphabetize: bool) -> Self {
        Reconstitutor {
            source,
            builder: TypeBuilder::new(*source.string_mapping(), source.fixed_top_levels()),
            plan,
            memo: HashMap::new(),
            in_progress: HashSet::new(),
            alphabetize,
        }
    }

    /// Reconstitute every top level and finish the destination graph.
    pub fn run(mut self) -> Result<TypeGraph> {
        let tops: Vec<(String, TypeRef)> = self
            .source
            .top_levels()
            .iter()
            .map(|(name, &r)| (name.clone(), r))
            .collect();
        for (name, r) in tops {
            let dest = self.reconstitute(r)?;
            self.builder.add_top_level(&name, dest);
        }
        self.builder.finish()
    }

    pub fn reconstitute(&mut self, r: TypeRef) -> Result<TypeRef> {
        if let Some(&dest) = self.memo.get(&r) {
            return Ok(dest);
        }
        if !self.in_progress.insert(r) {
            return Err(Error::Invariant(format!(
                "cycle through non-nominal type {r:?} ({})",
                self.source.get(r).kind_name()
            )));
        }
        let dest = if let Some(planned) = self.plan.get(&r).cloned() {
            let attrs = Attributes::union(self.source.attrs(r), &planned.extra);
            self.materialize(&planned.shape, attrs, Some(r))?
        } else {
            self.copy(r)?
        };
        self.in_progress.remove(&r);
        self.memo.insert(r, dest);
        Ok(dest)
    }

    fn resolve(&mut self, planned: &PlannedRef) -> Result<TypeRef> {
        match planned {
            PlannedRef::Src(r) => self.reconstitute(*r),
            PlannedRef::Inline(inner) => {
                self.materialize(&inner.shape, inner.extra.clone(), None)
            }
        }
    }

    fn materialize(
        &mut self,
        shape: &PlannedShape,
        attrs: Attributes,
        own: Option<TypeRef>,
    ) -> Result<TypeRef> {
        match shape {
            PlannedShape::Ref(target) => self.resolve(target),
            PlannedShape::Primitive(kind) => Ok(self.builder.add_primitive(*kind, attrs)),
            PlannedShape::TransformedString(kind) => {
                Ok(self.builder.intern_transformed_string(*kind, attrs))
            }
            PlannedShape::Enum(cases) => {
                let mut attrs = attrs;
                attrs.string_cases = StringCases::Finite(BTreeSet::new());
                self.builder.add_enum(cases.clone(), attrs)
            }
            PlannedShape::Map(values) => {
                let values = self.resolve(values)?;
                Ok(self.builder.add_map(values, attrs))
            }
            PlannedShape::Array(items) => {
                let items = self.resolve(items)?;
                Ok(self.builder.add_array(items, attrs))
            }
            PlannedShape::Union(members) => {
                let mut out = Vec::with_capacity(members.len());
                for member in members {
                    out.push(self.resolve(member)?);
                }
                self.builder.add_union(out, attrs)
            }
            PlannedShape::Nullable(inner) => {
                let inner = self.resolve(inner)?;
                let null = self.builder.add_primitive(PrimitiveKind::Null, Attributes::default());
                let members = match self.builder.get(inner) {
                    Type::Union { members } => {
                        let mut all = members.to_vec();
                        all.push(null);
                        all
                    }
                    _ => vec![inner, null],
                };
                self.builder.add_union(members, attrs)
            }
            PlannedShape::Class { properties, nominal } => {
                // Memoize before visiting children so recursion terminates.
                let slot = self.builder.reserve();
                if let Some(own) = own {
                    self.in_progress.remove(&own);
                    self.memo.insert(own, slot);
                }
                let props = self.planned_properties(properties)?;
                self.builder.fill(slot, Type::Class { properties: props, nominal: *nominal }, attrs)?;
                Ok(slot)
            }
            PlannedShape::Object { properties, additional } => {
                let slot = self.builder.reserve();
                if let Some(own) = own {
                    self.in_progress.remove(&own);
                    self.memo.insert(own, slot);
                }
                let props = self.planned_properties(properties)?;
                let additional = match additional {
                    Some(extra) => Some(self.resolve(extra)?),
                    None => None,
                };
                self.builder.fill(slot, Type::Object { properties: props, additional }, attrs)?;
                Ok(slot)
            }
            PlannedShape::MergedPrimitive(kind, sources) => {
                let mut attrs = attrs;
                for &s in sources {
                    if let Type::Enum { cases } = self.source.get(s) {
                        attrs.merge_from(&Attributes {
                            string_cases: StringCases::Finite(cases.clone()),
                            ..Attributes::default()
                        });
                    }
                    attrs.merge_from(self.source.attrs(s));
                }
                Ok(self.builder.add_primitive(*kind, attrs))
            }
            PlannedShape::MergedEnum(sources) => {
                let mut attrs = attrs;
                let mut cases = BTreeSet::new();
                for &s in sources {
                    if let Type::Enum { cases: member_cases } = self.source.get(s) {
                        cases.extend(member_cases.iter().cloned());
                    }
                    attrs.merge_from(self.source.attrs(s));
                }
                self.builder.add_enum(cases, attrs)
            }
        }
    }

    fn planned_properties(
        &mut self,
        properties: &[(String, PlannedProperty)],
    ) -> Result<Vec<(String, ClassProperty)>> {
        let mut out = Vec::with_capacity(properties.len());
        for (name, prop) in properties {
            let ty = self.resolve(&prop.ty)?;
            out.push((name.clone(), ClassProperty { ty, optional: prop.optional }));
        }
        if self.alphabetize {
            out.sort_by(|a, b| a.0.cmp(&b.0));
        }
        Ok(out)
    }

    /// Structural copy of an unplanned node.
    fn copy(&mut self, r: TypeRef) -> Result<TypeRef> {
        let attrs = self.source.attrs(r).clone();
        match self.source.get(r).clone() {
            Type::Primitive(kind) => Ok(self.builder.add_primitive(kind, attrs)),
            Type::TransformedString { kind } => {
                Ok(self.builder.intern_transformed_string(kind, attrs))
            }
            Type::Enum { cases } => self.builder.add_enum(cases, attrs),
            Type::Map { values } => {
                let values = self.reconstitute(values)?;
                Ok(self.builder.add_map(values, attrs))
            }
            Type::Array { items } => {
                let items = self.reconstitute(items)?;
                Ok(self.builder.add_array(items, attrs))
            }
            Type::Union { members } => {
                let mut out = Vec::with_capacity(members.len());
                for member in members {
                    out.push(self.reconstitute(member)?);
                }
                self.builder.add_union(out, attrs)
            }
            Type::Intersection { members } => {
                let mut out = Vec::with_capacity(members.len());
                for member in members {
                    out.push(self.reconstitute(member)?);
                }
                self.builder.add_intersection(out, attrs)
            }
            Type::Class { properties, nominal } => {
                let slot = self.builder.reserve();
                self.in_progress.remove(&r);
                self.memo.insert(r, slot);
                let props = self.copy_properties(&properties)?;
                self.builder.fill(slot, Type::Class { properties: props, nominal }, attrs)?;
                Ok(slot)
            }
            Type::Object { properties, additional } => {
                let slot = self.builder.reserve();
                self.in_progress.remove(&r);
                self.memo.insert(r, slot);
                let props = self.copy_properties(&properties)?;
                let additional = match additional {
                    Some(extra) => Some(self.reconstitute(extra)?),
                    None => None,
                };
                self.builder.fill(slot, Type::Object { properties: props, additional }, attrs)?;
                Ok(slot)
            }
            Type::Reserved => Err(Error::Invariant(format!(
                "reserved slot {r:?} escaped its builder"
            ))),
        }
    }

    fn copy_properties(
        &mut self,
        properties: &[(String, ClassProperty)],
    ) -> Result<Vec<(String, ClassProperty)>> {
        let mut out = Vec::with_capacity(properties.len());
        for (name, prop) in properties {
            let ty = self.reconstitute(prop.ty)?;
            out.push((name.clone(), ClassProperty { ty, optional: prop.optional }));
        }
        if self.alphabetize {
            out.sort_by(|a, b| a.0.cmp(&b.0));
        }
        Ok(out)
    }
}

/// Apply a rewrite plan, producing a fresh graph. An empty plan is a plain
/// canonicalizing sweep.
pub fn apply_plan(source: &TypeGraph, plan: Plan, alphabetize: bool) -> Result<TypeGraph> {
    Reconstitutor::new(source, plan, alphabetize).run()
}
