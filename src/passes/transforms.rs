//! Late-pipeline transformation wrappers and the local-rewrite fixed point.

use crate::error::{Error, Result};
use crate::graph::{PrimitiveKind, Type, TypeGraph};
use crate::passes::flatten_unions::flatten_unions;
use crate::passes::PassResult;
use crate::reconstitute::{apply_plan, Plan, PlannedShape, PlannedType};

/// Bound on local-rewrite sweeps; hitting it means a rewrite oscillates.
const FIXED_POINT_LIMIT: usize = 64;

/// Wraps transformed-string primitives the target keeps (per its string-type
/// mapping) into transformation nodes a renderer can emit parse/serialize
/// code for. Kinds the mapping collapses fall back to plain string.
pub fn make_transformations(graph: &TypeGraph, alphabetize: bool) -> Result<PassResult> {
    let mapping = *graph.string_mapping();
    let mut plan = Plan::new();
    for r in graph.reachable() {
        let Type::Primitive(kind) = graph.get(r) else { continue };
        if !kind.is_transformed_string() {
            continue;
        }
        let shape = if mapping.supports(*kind) {
            PlannedShape::TransformedString(*kind)
        } else {
            PlannedShape::Primitive(PrimitiveKind::String)
        };
        plan.insert(r, PlannedType::of(shape));
    }
    if plan.is_empty() {
        return Ok(PassResult::unchanged());
    }
    let rewritten = apply_plan(graph, plan, alphabetize)?;
    Ok(PassResult::rewritten(rewritten, false))
}

/// Runs the registered per-type local rewrites until none of them changes
/// the graph. Currently the only local rewrite is union normalization; the
/// registry shape keeps the loop open for more.
pub fn rewrite_fixed_point(graph: &TypeGraph, alphabetize: bool) -> Result<PassResult> {
    type LocalRewrite = fn(&TypeGraph, bool) -> Result<PassResult>;
    let rewrites: &[(&str, LocalRewrite)] =
        &[("flatten-unions", |g, alpha| flatten_unions(g, false, true, alpha))];

    let mut current: Option<TypeGraph> = None;
    for _ in 0..FIXED_POINT_LIMIT {
        let mut sweep_changed = false;
        for (name, rewrite) in rewrites {
            let input = current.as_ref().unwrap_or(graph);
            let result = rewrite(input, alphabetize)?;
            if let Some(next) = result.graph {
                log::debug!("local rewrite {name} changed the graph");
                current = Some(next);
                sweep_changed = true;
            }
        }
        if !sweep_changed {
            return Ok(PassResult { graph: current, done: true });
        }
    }
    Err(Error::Invariant("local rewrites did not reach a fixed point".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Attributes;
    use crate::builder::TypeBuilder;
    use crate::graph::StringTypeMapping;

    #[test]
    fn supported_date_kind_becomes_transformation() {
        let mut b = TypeBuilder::new(StringTypeMapping::all(), false);
        let d = b.get_primitive_string_type(PrimitiveKind::DateTime, Attributes::default());
        b.add_top_level("Root", d);
        let graph = b.finish().unwrap();

        let result = make_transformations(&graph, false).unwrap();
        let graph = result.graph.expect("graph changed");
        let root = graph.top_levels()["Root"];
        assert!(matches!(
            graph.get(root),
            Type::TransformedString { kind: PrimitiveKind::DateTime }
        ));

        let again = make_transformations(&graph, false).unwrap();
        assert!(again.graph.is_none());
    }

    #[test]
    fn fixed_point_flattens_leftover_nesting() {
        let mut b = TypeBuilder::new(StringTypeMapping::all(), false);
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let s = b.add_primitive(PrimitiveKind::String, Attributes::default());
        let null = b.add_primitive(PrimitiveKind::Null, Attributes::default());
        let inner = b.add_union([s, null], Attributes::default()).unwrap();
        let outer = b.add_union([int, inner], Attributes::default()).unwrap();
        b.add_top_level("Root", outer);
        let graph = b.finish().unwrap();

        let result = rewrite_fixed_point(&graph, false).unwrap();
        assert!(result.done);
        let graph = result.graph.expect("graph changed");
        let root = graph.top_levels()["Root"];
        let Type::Union { members } = graph.get(root) else { panic!("expected union") };
        assert_eq!(members.len(), 3);
    }
}
