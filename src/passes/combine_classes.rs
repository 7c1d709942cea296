//! Merges structurally similar classes.
//!
//! Two classes combine when they expose the same property names and every
//! property's type agrees canonically: primitives by kind, enums by case set,
//! classes modulo the merge relation itself (a union-find closed under
//! grouping), anything else by identity. Optionality is OR-merged.
//!
//! The driver runs this in two sub-phases. Both run the same merge; the
//! second catches classes whose property types only became identical through
//! the first phase's rewrites (e.g. arrays of freshly-merged classes).

use std::collections::{BTreeMap, BTreeSet};

use petgraph::unionfind::UnionFind;

use crate::attributes::Attributes;
use crate::error::Result;
use crate::graph::{PrimitiveKind, Type, TypeGraph, TypeRef};
use crate::passes::PassResult;
use crate::reconstitute::{apply_plan, Plan, PlannedProperty, PlannedRef, PlannedShape, PlannedType};

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord)]
enum CanonKey {
    Prim(PrimitiveKind),
    Enum(BTreeSet<String>),
    Node(usize),
}

type Signature = Vec<(String, CanonKey)>;

pub fn combine_classes(
    graph: &TypeGraph,
    alphabetize: bool,
    first_pass: bool,
    final_pass: bool,
) -> Result<PassResult> {
    log::debug!("combine_classes first_pass={first_pass} final_pass={final_pass}");

    let fixed_tops: BTreeSet<TypeRef> = if graph.fixed_top_levels() {
        graph.top_levels().values().copied().collect()
    } else {
        BTreeSet::new()
    };
    let candidates: Vec<TypeRef> = graph
        .reachable()
        .into_iter()
        .filter(|r| matches!(graph.get(*r), Type::Class { .. }))
        .filter(|r| !fixed_tops.contains(r))
        .collect();

    let mut uf: UnionFind<usize> = UnionFind::new(graph.len());
    loop {
        let mut groups: BTreeMap<Signature, Vec<TypeRef>> = BTreeMap::new();
        for &c in &candidates {
            groups.entry(signature(graph, c, &mut uf)).or_default().push(c);
        }
        let mut merged = false;
        for group in groups.values() {
            for pair in group.windows(2) {
                if uf.union(pair[0].index(), pair[1].index()) {
                    merged = true;
                }
            }
        }
        if !merged {
            break;
        }
    }

    // Collect final groups keyed by representative root.
    let mut final_groups: BTreeMap<usize, Vec<TypeRef>> = BTreeMap::new();
    for &c in &candidates {
        final_groups.entry(uf.find(c.index())).or_default().push(c);
    }

    let mut plan = Plan::new();
    for group in final_groups.values() {
        if group.len() < 2 {
            continue;
        }
        let rep = *group.iter().min().expect("non-empty group");
        let mut extra = Attributes::default();
        for &other in group {
            if other != rep {
                extra.merge_from(graph.attrs(other));
                plan.insert(other, PlannedType::of(PlannedShape::Ref(PlannedRef::Src(rep))));
            }
        }
        plan.insert(rep, PlannedType { shape: merged_class(graph, group, rep), extra });
    }

    if plan.is_empty() {
        return Ok(PassResult::unchanged());
    }
    let rewritten = apply_plan(graph, plan, alphabetize)?;
    Ok(PassResult::rewritten(rewritten, false))
}

fn signature(graph: &TypeGraph, class: TypeRef, uf: &mut UnionFind<usize>) -> Signature {
    let Type::Class { properties, .. } = graph.get(class) else {
        unreachable!("candidates are classes")
    };
    let mut sig: Signature = properties
        .iter()
        .map(|(name, prop)| (name.clone(), canon_key(graph, prop.ty, uf)))
        .collect();
    sig.sort_by(|a, b| a.0.cmp(&b.0));
    sig
}

fn canon_key(graph: &TypeGraph, r: TypeRef, uf: &mut UnionFind<usize>) -> CanonKey {
    match graph.get(r) {
        Type::Primitive(kind) => CanonKey::Prim(*kind),
        Type::Enum { cases } => CanonKey::Enum(cases.clone()),
        _ => CanonKey::Node(uf.find(r.index())),
    }
}

fn merged_class(graph: &TypeGraph, group: &[TypeRef], rep: TypeRef) -> PlannedShape {
    let Type::Class { properties: rep_props, nominal } = graph.get(rep) else {
        unreachable!("representative is a class")
    };

    let mut properties = Vec::with_capacity(rep_props.len());
    for (name, rep_prop) in rep_props {
        let mut optional = false;
        let mut versions: Vec<TypeRef> = Vec::new();
        for &member in group {
            let Type::Class { properties: member_props, .. } = graph.get(member) else {
                unreachable!()
            };
            let (_, prop) = member_props
                .iter()
                .find(|(n, _)| n == name)
                .expect("grouped classes share property names");
            optional = optional || prop.optional;
            if !versions.contains(&prop.ty) {
                versions.push(prop.ty);
            }
        }
        let ty = merged_property_type(graph, rep_prop.ty, versions);
        properties.push((name.clone(), PlannedProperty { ty, optional }));
    }
    PlannedShape::Class { properties, nominal: *nominal }
}

/// Property versions agree canonically; fold attribute-distinct primitives
/// and enums into one node, otherwise keep the representative's reference.
fn merged_property_type(graph: &TypeGraph, rep_ty: TypeRef, versions: Vec<TypeRef>) -> PlannedRef {
    if versions.len() == 1 {
        return PlannedRef::Src(versions[0]);
    }
    match graph.get(rep_ty) {
        Type::Primitive(kind) => PlannedRef::Inline(Box::new(PlannedType::of(
            PlannedShape::MergedPrimitive(*kind, versions),
        ))),
        Type::Enum { .. } => {
            PlannedRef::Inline(Box::new(PlannedType::of(PlannedShape::MergedEnum(versions))))
        }
        _ => PlannedRef::Src(rep_ty),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TypeBuilder;
    use crate::graph::{ClassProperty, StringTypeMapping};

    #[test]
    fn identical_classes_merge_into_one() {
        let mut b = TypeBuilder::new(StringTypeMapping::all(), false);
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let props = vec![("id".to_string(), ClassProperty { ty: int, optional: false })];
        let c1 = b.add_class(props.clone(), true, Attributes::with_name("A")).unwrap();
        let c2 = b.add_class(props, true, Attributes::with_name("B")).unwrap();
        let u = b.add_union([c1, c2], Attributes::default()).unwrap();
        b.add_top_level("Root", u);
        let graph = b.finish().unwrap();

        let result = combine_classes(&graph, false, true, false).unwrap();
        let graph = result.graph.expect("graph changed");
        let classes: Vec<TypeRef> = graph
            .reachable()
            .into_iter()
            .filter(|r| matches!(graph.get(*r), Type::Class { .. }))
            .collect();
        assert_eq!(classes.len(), 1);
        // The merged class carries both origin names.
        let attrs = graph.attrs(classes[0]);
        assert!(attrs.names.contains("A") && attrs.names.contains("B"));
        // The union collapsed to its single surviving member.
        let root = graph.top_levels()["Root"];
        assert!(matches!(graph.get(root), Type::Class { .. }));
    }

    #[test]
    fn optionality_is_or_merged() {
        let mut b = TypeBuilder::new(StringTypeMapping::all(), false);
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let c1 = b
            .add_class(
                vec![("id".to_string(), ClassProperty { ty: int, optional: false })],
                true,
                Attributes::default(),
            )
            .unwrap();
        let c2 = b
            .add_class(
                vec![("id".to_string(), ClassProperty { ty: int, optional: true })],
                true,
                Attributes::default(),
            )
            .unwrap();
        let u = b.add_union([c1, c2], Attributes::default()).unwrap();
        b.add_top_level("Root", u);
        let graph = b.finish().unwrap();

        let result = combine_classes(&graph, false, true, false).unwrap();
        let graph = result.graph.expect("graph changed");
        let root = graph.top_levels()["Root"];
        let Type::Class { properties, .. } = graph.get(root) else {
            panic!("expected merged class")
        };
        assert!(properties[0].1.optional);
    }

    #[test]
    fn different_property_names_do_not_merge() {
        let mut b = TypeBuilder::new(StringTypeMapping::all(), false);
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let c1 = b
            .add_class(
                vec![("a".to_string(), ClassProperty { ty: int, optional: false })],
                true,
                Attributes::default(),
            )
            .unwrap();
        let c2 = b
            .add_class(
                vec![("b".to_string(), ClassProperty { ty: int, optional: false })],
                true,
                Attributes::default(),
            )
            .unwrap();
        let u = b.add_union([c1, c2], Attributes::default()).unwrap();
        b.add_top_level("Root", u);
        let graph = b.finish().unwrap();

        let result = combine_classes(&graph, false, true, false).unwrap();
        assert!(result.graph.is_none());
    }
}
