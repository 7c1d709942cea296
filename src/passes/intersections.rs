//! Intersection handling: indirection removal and resolution to the meet.
//!
//! Forwarding intersections are placeholders with a single member; they are
//! redirected away before any other pass runs. Real intersections come from
//! schema `allOf` and are replaced by the concrete meet of their members,
//! distributing over union members so the follow-up strict flatten sees only
//! plain unions.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use hashbrown::HashSet;

use crate::attributes::Attributes;
use crate::error::{Error, Result};
use crate::graph::{PrimitiveKind, Type, TypeGraph, TypeRef};
use crate::passes::PassResult;
use crate::reconstitute::{apply_plan, Plan, PlannedProperty, PlannedRef, PlannedShape, PlannedType};

/// Resolve single-member intersections introduced as indirections.
pub fn remove_indirection_intersections(graph: &TypeGraph, alphabetize: bool) -> Result<PassResult> {
    let mut plan = Plan::new();
    for r in graph.reachable() {
        if let Type::Intersection { members } = graph.get(r) {
            if members.len() == 1 {
                plan.insert(r, PlannedType::of(PlannedShape::Ref(PlannedRef::Src(members[0]))));
            }
        }
    }
    if plan.is_empty() {
        return Ok(PassResult::unchanged());
    }
    let rewritten = apply_plan(graph, plan, alphabetize)?;
    Ok(PassResult::rewritten(rewritten, false))
}

/// Replace every intersection by its concrete meet.
pub fn resolve_intersections(graph: &TypeGraph, alphabetize: bool) -> Result<PassResult> {
    let mut plan = Plan::new();
    for r in graph.reachable() {
        let Type::Intersection { members } = graph.get(r) else { continue };

        let mut flat = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(r);
        expand(graph, members, &mut visited, &mut flat);

        let mut guard = Vec::new();
        let shape = plan_meet(graph, &flat, &mut guard)?;
        let mut extra = Attributes::default();
        for &m in &flat {
            extra.merge_from(graph.attrs(m));
        }
        plan.insert(r, PlannedType { shape, extra });
    }
    if plan.is_empty() {
        return Ok(PassResult::unchanged());
    }
    let rewritten = apply_plan(graph, plan, alphabetize)?;
    Ok(PassResult::rewritten(rewritten, false))
}

fn expand(graph: &TypeGraph, members: &[TypeRef], visited: &mut HashSet<TypeRef>, out: &mut Vec<TypeRef>) {
    for &m in members {
        match graph.get(m) {
            Type::Intersection { members: inner } => {
                if visited.insert(m) {
                    expand(graph, inner, visited, out);
                }
            }
            _ => {
                if !out.contains(&m) {
                    out.push(m);
                }
            }
        }
    }
}

/// Compute the meet of `members` as a planned shape over source refs.
///
/// `guard` holds the member sets currently being met; re-entering one means
/// the intersection is cyclic and cannot be resolved.
fn plan_meet(graph: &TypeGraph, members: &[TypeRef], guard: &mut Vec<Vec<TypeRef>>) -> Result<PlannedShape> {
    // Operands may themselves be intersections (nested allOf); flatten first.
    let mut flat = Vec::new();
    let mut visited = HashSet::new();
    expand(graph, members, &mut visited, &mut flat);

    let mut key: Vec<TypeRef> = flat;
    key.sort_unstable();
    key.dedup();
    if guard.contains(&key) {
        return Err(Error::Invariant("cyclic intersection cannot be resolved".into()));
    }

    // Distribute over the first union member.
    if let Some(&u) = key.iter().find(|&&m| matches!(graph.get(m), Type::Union { .. })) {
        let Type::Union { members: alts } = graph.get(u) else { unreachable!() };
        let rest: Vec<TypeRef> = key.iter().copied().filter(|&m| m != u).collect();
        guard.push(key.clone());
        let mut arms = Vec::with_capacity(alts.len());
        for &alt in alts.iter() {
            let mut operands = rest.clone();
            operands.push(alt);
            let arm = plan_meet(graph, &operands, guard)?;
            arms.push(PlannedRef::Inline(Box::new(PlannedType::of(arm))));
        }
        guard.pop();
        return Ok(PlannedShape::Union(arms));
    }

    // `any` is the identity of the meet; `none` annihilates.
    let mut operands: Vec<TypeRef> = Vec::new();
    for &m in &key {
        match graph.get(m) {
            Type::Primitive(PrimitiveKind::Any) => {}
            Type::Primitive(PrimitiveKind::None) => {
                return Ok(PlannedShape::Primitive(PrimitiveKind::None));
            }
            _ => operands.push(m),
        }
    }
    match operands.len() {
        0 => return Ok(PlannedShape::Primitive(PrimitiveKind::Any)),
        1 => return Ok(PlannedShape::Ref(PlannedRef::Src(operands[0]))),
        _ => {}
    }

    guard.push(key);
    let result = meet_concrete(graph, &operands, guard);
    guard.pop();
    result
}

fn meet_concrete(graph: &TypeGraph, operands: &[TypeRef], guard: &mut Vec<Vec<TypeRef>>) -> Result<PlannedShape> {
    let mut classes: Vec<TypeRef> = Vec::new();
    let mut maps: Vec<TypeRef> = Vec::new();
    let mut arrays: Vec<TypeRef> = Vec::new();
    let mut enums: Vec<TypeRef> = Vec::new();
    let mut prims: Vec<(TypeRef, PrimitiveKind)> = Vec::new();

    for &m in operands {
        match graph.get(m) {
            Type::Class { .. } | Type::Object { .. } => classes.push(m),
            Type::Map { .. } => maps.push(m),
            Type::Array { .. } => arrays.push(m),
            Type::Enum { .. } => enums.push(m),
            Type::Primitive(kind) => prims.push((m, *kind)),
            Type::TransformedString { kind } => prims.push((m, *kind)),
            Type::Union { .. } | Type::Intersection { .. } | Type::Reserved => {
                return Err(Error::Invariant(format!(
                    "unexpected {} operand in meet",
                    graph.get(m).kind_name()
                )));
            }
        }
    }

    let string_family = !enums.is_empty()
        || prims.iter().any(|(_, k)| *k == PrimitiveKind::String || k.is_transformed_string());

    // Mixed structural families have no common value.
    let families = [
        !classes.is_empty() || !maps.is_empty(),
        !arrays.is_empty(),
        string_family,
        prims.iter().any(|(_, k)| {
            matches!(k, PrimitiveKind::Bool | PrimitiveKind::Null | PrimitiveKind::Integer | PrimitiveKind::Double)
        }),
    ];
    if families.iter().filter(|present| **present).count() != 1 {
        return Ok(PlannedShape::Primitive(PrimitiveKind::None));
    }

    if !arrays.is_empty() {
        if !classes.is_empty() || !maps.is_empty() || string_family {
            return Ok(PlannedShape::Primitive(PrimitiveKind::None));
        }
        let items: Vec<TypeRef> = arrays
            .iter()
            .map(|&a| match graph.get(a) {
                Type::Array { items } => *items,
                _ => unreachable!(),
            })
            .collect();
        let inner = plan_meet(graph, &items, guard)?;
        return Ok(PlannedShape::Array(PlannedRef::Inline(Box::new(PlannedType::of(inner)))));
    }

    if !classes.is_empty() || !maps.is_empty() {
        return meet_records(graph, &classes, &maps, guard);
    }

    if string_family {
        return Ok(meet_strings(graph, &enums, &prims));
    }

    // Scalar primitives: equal kinds meet to themselves, integer narrows double.
    let kinds: BTreeSet<PrimitiveKind> = prims.iter().map(|(_, k)| *k).collect();
    let merged: Vec<TypeRef> = prims.iter().map(|(r, _)| *r).collect();
    if kinds.len() == 1 {
        let kind = *kinds.iter().next().expect("one kind");
        return Ok(PlannedShape::MergedPrimitive(kind, merged));
    }
    if kinds == BTreeSet::from([PrimitiveKind::Integer, PrimitiveKind::Double]) {
        return Ok(PlannedShape::MergedPrimitive(PrimitiveKind::Integer, merged));
    }
    Ok(PlannedShape::Primitive(PrimitiveKind::None))
}

/// allOf over object schemas: properties merge, shared properties meet,
/// a property required anywhere stays required. Map operands constrain every
/// property value. Object operands contribute their properties.
fn meet_records(
    graph: &TypeGraph,
    classes: &[TypeRef],
    maps: &[TypeRef],
    guard: &mut Vec<Vec<TypeRef>>,
) -> Result<PlannedShape> {
    let map_values: Vec<TypeRef> = maps
        .iter()
        .map(|&m| match graph.get(m) {
            Type::Map { values } => *values,
            _ => unreachable!(),
        })
        .collect();

    if classes.is_empty() {
        let inner = plan_meet(graph, &map_values, guard)?;
        return Ok(PlannedShape::Map(PlannedRef::Inline(Box::new(PlannedType::of(inner)))));
    }

    // name -> (operand types, optional-in-all)
    let mut merged: BTreeMap<String, (Vec<TypeRef>, bool)> = BTreeMap::new();
    let mut schema_order: Vec<String> = Vec::new();
    for &c in classes {
        let properties = match graph.get(c) {
            Type::Class { properties, .. } => properties,
            Type::Object { properties, .. } => properties,
            _ => unreachable!(),
        };
        for (name, prop) in properties {
            let entry = merged.entry(name.clone()).or_insert_with(|| {
                schema_order.push(name.clone());
                (Vec::new(), true)
            });
            entry.0.push(prop.ty);
            entry.1 = entry.1 && prop.optional;
        }
    }

    let mut properties = Vec::with_capacity(schema_order.len());
    for name in schema_order {
        let (mut operand_types, optional) = merged.remove(&name).expect("planned property");
        operand_types.extend(map_values.iter().copied());
        let shape = plan_meet(graph, &operand_types, guard)?;
        properties.push((
            name,
            PlannedProperty {
                ty: PlannedRef::Inline(Box::new(PlannedType::of(shape))),
                optional,
            },
        ));
    }
    Ok(PlannedShape::Class { properties, nominal: true })
}

fn meet_strings(graph: &TypeGraph, enums: &[TypeRef], prims: &[(TypeRef, PrimitiveKind)]) -> PlannedShape {
    if !enums.is_empty() {
        // Any non-plain-string primitive alongside an enum has no common value.
        if prims.iter().any(|(_, k)| *k != PrimitiveKind::String) {
            return PlannedShape::Primitive(PrimitiveKind::None);
        }
        let mut cases: Option<BTreeSet<String>> = None;
        for &e in enums {
            let Type::Enum { cases: member } = graph.get(e) else { unreachable!() };
            cases = Some(match cases {
                None => member.clone(),
                Some(acc) => &acc & member,
            });
        }
        let cases = cases.expect("at least one enum");
        if cases.is_empty() {
            return PlannedShape::Primitive(PrimitiveKind::None);
        }
        return PlannedShape::Enum(cases);
    }

    // Transformed kinds narrow plain string; two distinct transforms clash.
    let transformed: BTreeSet<PrimitiveKind> = prims
        .iter()
        .filter(|(_, k)| k.is_transformed_string())
        .map(|(_, k)| *k)
        .collect();
    let merged: Vec<TypeRef> = prims.iter().map(|(r, _)| *r).collect();
    match transformed.len() {
        0 => PlannedShape::MergedPrimitive(PrimitiveKind::String, merged),
        1 => {
            let kind = *transformed.iter().next().expect("one transform");
            PlannedShape::MergedPrimitive(kind, merged)
        }
        _ => PlannedShape::Primitive(PrimitiveKind::None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TypeBuilder;
    use crate::graph::{ClassProperty, StringTypeMapping};

    fn builder() -> TypeBuilder {
        TypeBuilder::new(StringTypeMapping::all(), false)
    }

    #[test]
    fn forwarding_intersection_is_redirected() {
        let mut b = builder();
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let fwd = b.add_forwarding_intersection(int, Attributes::default());
        b.add_top_level("Root", fwd);
        assert!(b.did_add_forwarding_intersection());
        let graph = b.finish().unwrap();

        let result = remove_indirection_intersections(&graph, false).unwrap();
        let graph = result.graph.expect("graph changed");
        let root = graph.top_levels()["Root"];
        assert!(matches!(graph.get(root), Type::Primitive(PrimitiveKind::Integer)));
        assert!(!graph.any_reachable(|t| matches!(t, Type::Intersection { .. })));
    }

    #[test]
    fn meet_of_classes_merges_properties() {
        let mut b = builder();
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let s = b.add_primitive(PrimitiveKind::String, Attributes::default());
        let c1 = b
            .add_class(
                vec![("a".into(), ClassProperty { ty: int, optional: false })],
                true,
                Attributes::default(),
            )
            .unwrap();
        let c2 = b
            .add_class(
                vec![
                    ("a".into(), ClassProperty { ty: int, optional: true }),
                    ("b".into(), ClassProperty { ty: s, optional: true }),
                ],
                true,
                Attributes::default(),
            )
            .unwrap();
        let isect = b.add_intersection([c1, c2], Attributes::default()).unwrap();
        b.add_top_level("Root", isect);
        let graph = b.finish().unwrap();

        let result = resolve_intersections(&graph, false).unwrap();
        let graph = result.graph.expect("graph changed");
        assert!(!graph.any_reachable(|t| matches!(t, Type::Intersection { .. })));

        let root = graph.top_levels()["Root"];
        let Type::Class { properties, .. } = graph.get(root) else {
            panic!("expected class")
        };
        assert_eq!(properties.len(), 2);
        let a = properties.iter().find(|(n, _)| n == "a").unwrap();
        assert!(!a.1.optional, "required in one operand stays required");
        let b_prop = properties.iter().find(|(n, _)| n == "b").unwrap();
        assert!(b_prop.1.optional);
    }

    #[test]
    fn meet_of_incompatible_kinds_is_none() {
        let mut b = builder();
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let s = b.add_primitive(PrimitiveKind::String, Attributes::default());
        let isect = b.add_intersection([int, s], Attributes::default()).unwrap();
        b.add_top_level("Root", isect);
        let graph = b.finish().unwrap();

        let result = resolve_intersections(&graph, false).unwrap();
        let graph = result.graph.expect("graph changed");
        let root = graph.top_levels()["Root"];
        assert!(matches!(graph.get(root), Type::Primitive(PrimitiveKind::None)));
    }

    #[test]
    fn meet_distributes_over_unions() {
        let mut b = builder();
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let dbl = b.add_primitive(PrimitiveKind::Double, Attributes::default());
        let s = b.add_primitive(PrimitiveKind::String, Attributes::default());
        let u = b.add_union([int, s], Attributes::default()).unwrap();
        let isect = b.add_intersection([u, dbl], Attributes::default()).unwrap();
        b.add_top_level("Root", isect);
        let graph = b.finish().unwrap();

        let result = resolve_intersections(&graph, false).unwrap();
        let graph = result.graph.expect("graph changed");
        let root = graph.top_levels()["Root"];
        // meet(int|string, double) = integer | none; the none arm survives
        // until the strict flatten that follows in the driver.
        let Type::Union { members } = graph.get(root) else {
            panic!("expected union before flatten")
        };
        let kinds: Vec<&str> = members.iter().map(|&m| graph.get(m).kind_name()).collect();
        assert!(kinds.contains(&"integer"));
        assert!(kinds.contains(&"none"));
    }
}
