//! Union normalization: flat, non-singleton, member-deduplicated.
//!
//! Nested unions are expanded transitively, `none` members vanish (they are
//! the identity of union membership), same-kind primitive members merge with
//! united attributes, and a member of kind `any` absorbs the whole union.
//! With `strict`, integer and double members unify into double for targets
//! that cannot hold both number kinds in one union.

use std::collections::BTreeMap;

use hashbrown::HashSet;

use crate::error::Result;
use crate::graph::{PrimitiveKind, Type, TypeGraph, TypeRef};
use crate::passes::PassResult;
use crate::reconstitute::{apply_plan, Plan, PlannedRef, PlannedShape, PlannedType};

pub fn flatten_unions(
    graph: &TypeGraph,
    strict: bool,
    supports_both_number_types: bool,
    alphabetize: bool,
) -> Result<PassResult> {
    let mut plan = Plan::new();

    for r in graph.reachable() {
        let Type::Union { members } = graph.get(r) else { continue };

        let mut flat = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(r);
        expand(graph, members, &mut visited, &mut flat);

        if let Some(planned) = replan_members(graph, members, &flat, strict, supports_both_number_types) {
            plan.insert(r, planned);
        }
    }

    if plan.is_empty() {
        return Ok(PassResult::unchanged());
    }
    let rewritten = apply_plan(graph, plan, alphabetize)?;
    Ok(PassResult::rewritten(rewritten, false))
}

/// Transitive member expansion. Nested unions are inlined; a self reference
/// contributes nothing.
fn expand(graph: &TypeGraph, members: &[TypeRef], visited: &mut HashSet<TypeRef>, out: &mut Vec<TypeRef>) {
    for &m in members {
        match graph.get(m) {
            Type::Union { members: inner } => {
                if visited.insert(m) {
                    expand(graph, inner, visited, out);
                }
            }
            _ => out.push(m),
        }
    }
}

fn replan_members(
    graph: &TypeGraph,
    original: &[TypeRef],
    flat: &[TypeRef],
    strict: bool,
    supports_both_number_types: bool,
) -> Option<PlannedType> {
    let mut prims: BTreeMap<PrimitiveKind, Vec<TypeRef>> = BTreeMap::new();
    let mut enums: Vec<TypeRef> = Vec::new();
    let mut others: Vec<TypeRef> = Vec::new();

    for &m in flat {
        match graph.get(m) {
            Type::Primitive(PrimitiveKind::None) => {}
            Type::Primitive(kind) => prims.entry(*kind).or_default().push(m),
            Type::Enum { .. } => enums.push(m),
            _ => {
                if !others.contains(&m) {
                    others.push(m);
                }
            }
        }
    }

    // `any` absorbs every other member.
    if let Some(any_members) = prims.get(&PrimitiveKind::Any) {
        return Some(PlannedType::of(PlannedShape::MergedPrimitive(
            PrimitiveKind::Any,
            any_members.clone(),
        )));
    }

    if strict && !supports_both_number_types {
        if let (Some(_), Some(_)) = (prims.get(&PrimitiveKind::Integer), prims.get(&PrimitiveKind::Double)) {
            let ints = prims.remove(&PrimitiveKind::Integer).unwrap_or_default();
            prims.entry(PrimitiveKind::Double).or_default().extend(ints);
        }
    }

    let mut members: Vec<PlannedRef> = Vec::new();
    for (kind, group) in &prims {
        if group.len() == 1 {
            if *kind == kind_of(graph, group[0]) {
                members.push(PlannedRef::Src(group[0]));
            } else {
                // Strict unification demoted a lone integer to double.
                members.push(inline(PlannedShape::MergedPrimitive(*kind, group.clone())));
            }
        } else {
            members.push(inline(PlannedShape::MergedPrimitive(*kind, group.clone())));
        }
    }
    match enums.len() {
        0 => {}
        1 => members.push(PlannedRef::Src(enums[0])),
        _ => members.push(inline(PlannedShape::MergedEnum(enums.clone()))),
    }
    members.extend(others.iter().map(|&m| PlannedRef::Src(m)));

    match members.len() {
        0 => return Some(PlannedType::of(PlannedShape::Primitive(PrimitiveKind::None))),
        1 => {
            let single = members.into_iter().next().expect("one member");
            return Some(PlannedType::of(PlannedShape::Ref(single)));
        }
        _ => {}
    }

    // No plan entry when the flat member set matches the original exactly.
    let all_src: Option<Vec<TypeRef>> = members
        .iter()
        .map(|m| match m {
            PlannedRef::Src(r) => Some(*r),
            PlannedRef::Inline(_) => None,
        })
        .collect();
    if let Some(mut srcs) = all_src {
        srcs.sort_unstable();
        srcs.dedup();
        let mut orig: Vec<TypeRef> = original.to_vec();
        orig.sort_unstable();
        orig.dedup();
        if srcs == orig {
            return None;
        }
    }
    Some(PlannedType::of(PlannedShape::Union(members)))
}

fn inline(shape: PlannedShape) -> PlannedRef {
    PlannedRef::Inline(Box::new(PlannedType::of(shape)))
}

fn kind_of(graph: &TypeGraph, r: TypeRef) -> PrimitiveKind {
    match graph.get(r) {
        Type::Primitive(kind) => *kind,
        _ => PrimitiveKind::Any,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Attributes;
    use crate::builder::TypeBuilder;
    use crate::graph::StringTypeMapping;

    fn graph_with_nested_union() -> TypeGraph {
        let mut b = TypeBuilder::new(StringTypeMapping::all(), false);
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let s = b.add_primitive(PrimitiveKind::String, Attributes::default());
        let null = b.add_primitive(PrimitiveKind::Null, Attributes::default());
        let inner = b.add_union([s, null], Attributes::default()).unwrap();
        let outer = b.add_union([int, inner], Attributes::default()).unwrap();
        b.add_top_level("Root", outer);
        b.finish().unwrap()
    }

    #[test]
    fn nested_unions_flatten_to_one_level() {
        let graph = graph_with_nested_union();
        let result = flatten_unions(&graph, false, true, false).unwrap();
        let graph = result.graph.expect("graph changed");

        let root = graph.top_levels()["Root"];
        let Type::Union { members } = graph.get(root) else {
            panic!("expected union at top level")
        };
        assert_eq!(members.len(), 3);
        for &m in members.iter() {
            assert!(!matches!(graph.get(m), Type::Union { .. }), "member is a union");
        }

        // Second application is a no-op.
        let again = flatten_unions(&graph, false, true, false).unwrap();
        assert!(again.done);
        assert!(again.graph.is_none());
    }

    #[test]
    fn strict_flatten_unifies_number_kinds() {
        let mut b = TypeBuilder::new(StringTypeMapping::all(), false);
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let dbl = b.add_primitive(PrimitiveKind::Double, Attributes::default());
        let u = b.add_union([int, dbl], Attributes::default()).unwrap();
        b.add_top_level("Root", u);
        let graph = b.finish().unwrap();

        let result = flatten_unions(&graph, true, false, false).unwrap();
        let graph = result.graph.expect("graph changed");
        let root = graph.top_levels()["Root"];
        assert!(matches!(graph.get(root), Type::Primitive(PrimitiveKind::Double)));
    }

    #[test]
    fn none_members_are_dropped() {
        let mut b = TypeBuilder::new(StringTypeMapping::all(), false);
        let none = b.add_primitive(PrimitiveKind::None, Attributes::default());
        let s = b.add_primitive(PrimitiveKind::String, Attributes::default());
        let u = b.add_union([none, s], Attributes::default()).unwrap();
        b.add_top_level("Root", u);
        let graph = b.finish().unwrap();

        let result = flatten_unions(&graph, false, true, false).unwrap();
        let graph = result.graph.expect("graph changed");
        let root = graph.top_levels()["Root"];
        assert!(matches!(graph.get(root), Type::Primitive(PrimitiveKind::String)));
    }

    #[test]
    fn any_member_absorbs_the_union() {
        let mut b = TypeBuilder::new(StringTypeMapping::all(), false);
        let any = b.add_primitive(PrimitiveKind::Any, Attributes::default());
        let s = b.add_primitive(PrimitiveKind::String, Attributes::default());
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let u = b.add_union([any, s, int], Attributes::default()).unwrap();
        b.add_top_level("Root", u);
        let graph = b.finish().unwrap();

        let result = flatten_unions(&graph, false, true, false).unwrap();
        let graph = result.graph.expect("graph changed");
        let root = graph.top_levels()["Root"];
        assert!(matches!(graph.get(root), Type::Primitive(PrimitiveKind::Any)));
    }
}
