//! String-type refinement: enum expansion and string flattening.

use crate::error::Result;
use crate::graph::{PrimitiveKind, Type, TypeGraph, TypeRef};
use crate::passes::PassResult;
use crate::reconstitute::{apply_plan, Plan, PlannedRef, PlannedShape, PlannedType};

/// Ceiling on distinct cases for inferred (as opposed to schema-given) enums.
pub const ENUM_MAX_CASES: usize = 16;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExpandPolicy {
    /// Expand every finite case set, even schema-provided ones.
    All,
    /// Expand only inferred case sets, up to [`ENUM_MAX_CASES`].
    Infer,
    /// Never expand.
    None,
}

/// Turns strings with known case sets into enums, per policy.
pub fn expand_strings(graph: &TypeGraph, policy: ExpandPolicy, alphabetize: bool) -> Result<PassResult> {
    if policy == ExpandPolicy::None {
        return Ok(PassResult::unchanged());
    }

    let mut plan = Plan::new();
    for r in graph.reachable() {
        if !matches!(graph.get(r), Type::Primitive(PrimitiveKind::String)) {
            continue;
        }
        let attrs = graph.attrs(r);
        let Some(cases) = attrs.string_cases.as_finite() else { continue };
        if cases.is_empty() {
            continue;
        }
        let expand = match policy {
            ExpandPolicy::All => true,
            ExpandPolicy::Infer => !attrs.cases_from_schema && cases.len() <= ENUM_MAX_CASES,
            ExpandPolicy::None => unreachable!(),
        };
        if expand {
            plan.insert(r, PlannedType::of(PlannedShape::Enum(cases.clone())));
        }
    }

    if plan.is_empty() {
        return Ok(PassResult::unchanged());
    }
    let rewritten = apply_plan(graph, plan, alphabetize)?;
    Ok(PassResult::rewritten(rewritten, false))
}

/// Collapses unions of string subtypes where a plain string already covers
/// them: enum members and extra string members fold into the one string,
/// uniting case evidence. Runs on schema input after expansion.
pub fn flatten_strings(graph: &TypeGraph, alphabetize: bool) -> Result<PassResult> {
    let mut plan = Plan::new();
    for r in graph.reachable() {
        let Type::Union { members } = graph.get(r) else { continue };

        let mut strings: Vec<TypeRef> = Vec::new();
        let mut foldable: Vec<TypeRef> = Vec::new();
        let mut rest: Vec<TypeRef> = Vec::new();
        for &m in members.iter() {
            match graph.get(m) {
                Type::Primitive(PrimitiveKind::String) => strings.push(m),
                Type::Enum { .. } => foldable.push(m),
                _ => rest.push(m),
            }
        }
        if strings.is_empty() || (foldable.is_empty() && strings.len() == 1) {
            continue;
        }

        let mut merged = strings;
        merged.extend(foldable);
        let mut planned: Vec<PlannedRef> = vec![PlannedRef::Inline(Box::new(PlannedType::of(
            PlannedShape::MergedPrimitive(PrimitiveKind::String, merged),
        )))];
        planned.extend(rest.into_iter().map(PlannedRef::Src));

        let shape = if planned.len() == 1 {
            PlannedShape::Ref(planned.remove(0))
        } else {
            PlannedShape::Union(planned)
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
    use crate::attributes::{Attributes, StringCases};
    use crate::builder::TypeBuilder;
    use crate::graph::StringTypeMapping;
    use std::collections::BTreeSet;

    fn string_with_cases(cases: &[&str], from_schema: bool) -> TypeGraph {
        let mut b = TypeBuilder::new(StringTypeMapping::all(), false);
        let mut attrs = Attributes::default();
        attrs.string_cases = StringCases::Finite(cases.iter().map(|s| s.to_string()).collect());
        attrs.cases_from_schema = from_schema;
        let s = b.add_primitive(PrimitiveKind::String, attrs);
        b.add_top_level("Root", s);
        b.finish().unwrap()
    }

    #[test]
    fn inferred_cases_expand_under_infer_policy() {
        let graph = string_with_cases(&["r", "g", "b"], false);
        let result = expand_strings(&graph, ExpandPolicy::Infer, false).unwrap();
        let graph = result.graph.expect("graph changed");
        let root = graph.top_levels()["Root"];
        let Type::Enum { cases } = graph.get(root) else { panic!("expected enum") };
        let expected: BTreeSet<String> = ["b", "g", "r"].iter().map(|s| s.to_string()).collect();
        assert_eq!(cases, &expected);

        // Expansion consumed the case evidence; a second run is a no-op.
        let again = expand_strings(&graph, ExpandPolicy::Infer, false).unwrap();
        assert!(again.graph.is_none());
    }

    #[test]
    fn schema_cases_need_the_all_policy() {
        let graph = string_with_cases(&["on", "off"], true);
        let result = expand_strings(&graph, ExpandPolicy::Infer, false).unwrap();
        assert!(result.graph.is_none());

        let result = expand_strings(&graph, ExpandPolicy::All, false).unwrap();
        let graph = result.graph.expect("graph changed");
        let root = graph.top_levels()["Root"];
        assert!(matches!(graph.get(root), Type::Enum { .. }));
    }

    #[test]
    fn none_policy_never_expands() {
        let graph = string_with_cases(&["r"], false);
        let result = expand_strings(&graph, ExpandPolicy::None, false).unwrap();
        assert!(result.graph.is_none() && result.done);
    }

    #[test]
    fn enum_beside_string_folds_into_it() {
        let mut b = TypeBuilder::new(StringTypeMapping::all(), false);
        let s = b.add_primitive(PrimitiveKind::String, Attributes::default());
        let e = b
            .add_enum(["x".to_string()].into_iter().collect(), Attributes::default())
            .unwrap();
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let u = b.add_union([s, e, int], Attributes::default()).unwrap();
        b.add_top_level("Root", u);
        let graph = b.finish().unwrap();

        let result = flatten_strings(&graph, false).unwrap();
        let graph = result.graph.expect("graph changed");
        let root = graph.top_levels()["Root"];
        let Type::Union { members } = graph.get(root) else { panic!("expected union") };
        assert_eq!(members.len(), 2);
        let has_enum = members.iter().any(|&m| matches!(graph.get(m), Type::Enum { .. }));
        assert!(!has_enum, "enum folded into the string member");
    }
}
