//! Scalar cleanups: `none` elimination and optional-property lowering.

use crate::error::Result;
use crate::graph::{PrimitiveKind, Type, TypeGraph};
use crate::passes::PassResult;
use crate::reconstitute::{apply_plan, Plan, PlannedProperty, PlannedRef, PlannedShape, PlannedType};

/// Replaces every `none` (absence of evidence) by `any`.
pub fn none_to_any(graph: &TypeGraph, alphabetize: bool) -> Result<PassResult> {
    let mut plan = Plan::new();
    for r in graph.reachable() {
        if matches!(graph.get(r), Type::Primitive(PrimitiveKind::None)) {
            plan.insert(r, PlannedType::of(PlannedShape::Primitive(PrimitiveKind::Any)));
        }
    }
    if plan.is_empty() {
        return Ok(PassResult::unchanged());
    }
    let rewritten = apply_plan(graph, plan, alphabetize)?;
    Ok(PassResult::rewritten(rewritten, false))
}

/// For targets without optional-property syntax: every optional property
/// becomes a required property of `union { T, null }`.
pub fn optional_to_nullable(graph: &TypeGraph, alphabetize: bool) -> Result<PassResult> {
    let mut plan = Plan::new();
    for r in graph.reachable() {
        let Type::Class { properties, nominal } = graph.get(r) else { continue };
        if properties.iter().all(|(_, p)| !p.optional) {
            continue;
        }
        let planned_props = properties
            .iter()
            .map(|(name, p)| {
                let ty = if p.optional {
                    PlannedRef::Inline(Box::new(PlannedType::of(PlannedShape::Nullable(
                        PlannedRef::Src(p.ty),
                    ))))
                } else {
                    PlannedRef::Src(p.ty)
                };
                (name.clone(), PlannedProperty { ty, optional: false })
            })
            .collect();
        plan.insert(
            r,
            PlannedType::of(PlannedShape::Class { properties: planned_props, nominal: *nominal }),
        );
    }
    if plan.is_empty() {
        return Ok(PassResult::unchanged());
    }
    let rewritten = apply_plan(graph, plan, alphabetize)?;
    Ok(PassResult::rewritten(rewritten, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Attributes;
    use crate::builder::TypeBuilder;
    use crate::graph::{ClassProperty, StringTypeMapping};

    #[test]
    fn none_becomes_any_everywhere() {
        let mut b = TypeBuilder::new(StringTypeMapping::all(), false);
        let none = b.add_primitive(PrimitiveKind::None, Attributes::default());
        let arr = b.add_array(none, Attributes::default());
        b.add_top_level("Root", arr);
        let graph = b.finish().unwrap();

        let result = none_to_any(&graph, false).unwrap();
        let graph = result.graph.expect("graph changed");
        assert!(!graph.any_reachable(|t| matches!(t, Type::Primitive(PrimitiveKind::None))));
        let root = graph.top_levels()["Root"];
        let Type::Array { items } = graph.get(root) else { panic!("expected array") };
        assert!(matches!(graph.get(*items), Type::Primitive(PrimitiveKind::Any)));

        let again = none_to_any(&graph, false).unwrap();
        assert!(again.graph.is_none());
    }

    #[test]
    fn optional_property_becomes_required_nullable_union() {
        let mut b = TypeBuilder::new(StringTypeMapping::all(), false);
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let c = b
            .add_class(
                vec![("a".to_string(), ClassProperty { ty: int, optional: true })],
                true,
                Attributes::default(),
            )
            .unwrap();
        b.add_top_level("Root", c);
        let graph = b.finish().unwrap();

        let result = optional_to_nullable(&graph, false).unwrap();
        let graph = result.graph.expect("graph changed");
        let root = graph.top_levels()["Root"];
        let Type::Class { properties, .. } = graph.get(root) else { panic!("expected class") };
        let (_, prop) = &properties[0];
        assert!(!prop.optional);
        let Type::Union { members } = graph.get(prop.ty) else {
            panic!("expected union property")
        };
        assert_eq!(members.len(), 2);
        let kinds: Vec<&str> = members.iter().map(|&m| graph.get(m).kind_name()).collect();
        assert!(kinds.contains(&"integer") && kinds.contains(&"null"));
    }

    #[test]
    fn optional_union_with_null_stays_flat() {
        let mut b = TypeBuilder::new(StringTypeMapping::all(), false);
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let null = b.add_primitive(PrimitiveKind::Null, Attributes::default());
        let u = b.add_union([int, null], Attributes::default()).unwrap();
        let c = b
            .add_class(
                vec![("a".to_string(), ClassProperty { ty: u, optional: true })],
                true,
                Attributes::default(),
            )
            .unwrap();
        b.add_top_level("Root", c);
        let graph = b.finish().unwrap();

        let result = optional_to_nullable(&graph, false).unwrap();
        let graph = result.graph.expect("graph changed");
        let root = graph.top_levels()["Root"];
        let Type::Class { properties, .. } = graph.get(root) else { panic!("expected class") };
        let Type::Union { members } = graph.get(properties[0].1.ty) else {
            panic!("expected union property")
        };
        // Still {integer, null}; no nested union, no duplicate null.
        assert_eq!(members.len(), 2);
        for &m in members.iter() {
            assert!(!matches!(graph.get(m), Type::Union { .. }));
        }
    }
}
