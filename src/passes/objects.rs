//! Lowers open records for targets without a full object type.
//!
//! An `object` with no additional-properties type is just a class; one with
//! only additional properties is a map; one with both becomes the union of
//! the two readings.

use crate::error::Result;
use crate::graph::{Type, TypeGraph};
use crate::passes::PassResult;
use crate::reconstitute::{apply_plan, Plan, PlannedProperty, PlannedRef, PlannedShape, PlannedType};

pub fn replace_object_type(
    graph: &TypeGraph,
    supports_full_object_type: bool,
    alphabetize: bool,
) -> Result<PassResult> {
    if supports_full_object_type {
        return Ok(PassResult::unchanged());
    }

    let mut plan = Plan::new();
    for r in graph.reachable() {
        let Type::Object { properties, additional } = graph.get(r) else { continue };
        let props: Vec<(String, PlannedProperty)> = properties
            .iter()
            .map(|(name, p)| {
                (name.clone(), PlannedProperty { ty: PlannedRef::Src(p.ty), optional: p.optional })
            })
            .collect();
        let shape = match (props.is_empty(), additional) {
            (_, None) => PlannedShape::Class { properties: props, nominal: true },
            (true, Some(extra)) => PlannedShape::Map(PlannedRef::Src(*extra)),
            (false, Some(extra)) => PlannedShape::Union(vec![
                PlannedRef::Inline(Box::new(PlannedType::of(PlannedShape::Class {
                    properties: props,
                    nominal: true,
                }))),
                PlannedRef::Inline(Box::new(PlannedType::of(PlannedShape::Map(PlannedRef::Src(
                    *extra,
                ))))),
            ]),
        };
        plan.insert(r, PlannedType::of(shape));
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
    use crate::graph::{ClassProperty, PrimitiveKind, StringTypeMapping};

    #[test]
    fn object_without_additional_becomes_class() {
        let mut b = TypeBuilder::new(StringTypeMapping::all(), false);
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let o = b
            .add_object(
                vec![("n".to_string(), ClassProperty { ty: int, optional: false })],
                None,
                Attributes::default(),
            )
            .unwrap();
        b.add_top_level("Root", o);
        let graph = b.finish().unwrap();

        let result = replace_object_type(&graph, false, false).unwrap();
        let graph = result.graph.expect("graph changed");
        let root = graph.top_levels()["Root"];
        assert!(matches!(graph.get(root), Type::Class { .. }));
    }

    #[test]
    fn object_with_only_additional_becomes_map() {
        let mut b = TypeBuilder::new(StringTypeMapping::all(), false);
        let any = b.add_primitive(PrimitiveKind::Any, Attributes::default());
        let o = b.add_object(Vec::new(), Some(any), Attributes::default()).unwrap();
        b.add_top_level("Root", o);
        let graph = b.finish().unwrap();

        let result = replace_object_type(&graph, false, false).unwrap();
        let graph = result.graph.expect("graph changed");
        let root = graph.top_levels()["Root"];
        assert!(matches!(graph.get(root), Type::Map { .. }));
    }

    #[test]
    fn supporting_target_keeps_objects() {
        let mut b = TypeBuilder::new(StringTypeMapping::all(), false);
        let any = b.add_primitive(PrimitiveKind::Any, Attributes::default());
        let o = b.add_object(Vec::new(), Some(any), Attributes::default()).unwrap();
        b.add_top_level("Root", o);
        let graph = b.finish().unwrap();

        let result = replace_object_type(&graph, true, false).unwrap();
        assert!(result.graph.is_none() && result.done);
    }
}
