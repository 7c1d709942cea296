//! Rewrites classes that look like homogeneous string-keyed maps.
//!
//! A class becomes `map<V>` when it has enough properties, all required, all
//! of the same value type, and its property names were not mandated by a
//! schema. The driver repeats the pass until a fixed point, so classes whose
//! value types only become uniform through an earlier conversion get picked
//! up on the next round.

use std::collections::BTreeSet;

use crate::error::Result;
use crate::graph::{Type, TypeGraph, TypeRef};
use crate::passes::PassResult;
use crate::reconstitute::{apply_plan, Plan, PlannedRef, PlannedShape, PlannedType};

/// Minimum number of same-typed properties before a class reads as a map.
pub const MAP_MIN_PROPERTIES: usize = 4;

pub fn infer_maps(graph: &TypeGraph, alphabetize: bool) -> Result<PassResult> {
    let fixed_tops: BTreeSet<TypeRef> = if graph.fixed_top_levels() {
        graph.top_levels().values().copied().collect()
    } else {
        BTreeSet::new()
    };

    let mut plan = Plan::new();
    for r in graph.reachable() {
        let Type::Class { properties, .. } = graph.get(r) else { continue };
        if fixed_tops.contains(&r) || graph.attrs(r).schema_fixed {
            continue;
        }
        if properties.len() < MAP_MIN_PROPERTIES {
            continue;
        }
        if properties.iter().any(|(_, p)| p.optional) {
            continue;
        }
        let value = properties[0].1.ty;
        if properties.iter().any(|(_, p)| p.ty != value) {
            continue;
        }
        plan.insert(r, PlannedType::of(PlannedShape::Map(PlannedRef::Src(value))));
    }

    if plan.is_empty() {
        return Ok(PassResult::unchanged());
    }
    let rewritten = apply_plan(graph, plan, alphabetize)?;
    Ok(PassResult::rewritten(rewritten, false))
}
