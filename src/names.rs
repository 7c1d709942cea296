//! Name assignment for the final graph.
//!
//! The registry is scoped to one run and passed through the pipeline context,
//! so concurrent runs in one process cannot trample each other's counters.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::graph::{Type, TypeGraph, TypeRef};

/// Per-run source of unique type names.
pub struct NameRegistry {
    taken: BTreeSet<String>,
    counter: u32,
}

impl NameRegistry {
    pub fn new() -> Self {
        NameRegistry { taken: BTreeSet::new(), counter: 0 }
    }

    /// Claim `base`, suffixing a counter on collision.
    pub fn claim(&mut self, base: &str) -> String {
        let base = if base.is_empty() { "Type".to_string() } else { base.to_string() };
        if self.taken.insert(base.clone()) {
            return base;
        }
        loop {
            self.counter += 1;
            let candidate = format!("{base}{}", self.counter);
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

impl Default for NameRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Assigns a unique human-readable name to every reachable type a renderer
/// declares (classes, objects, enums, unions).
///
/// With `assume_names_from_samples`, names derived from property paths are
/// trusted over schema-provided ones; otherwise schema titles win.
pub fn gather_names(
    graph: &TypeGraph,
    registry: &mut NameRegistry,
    assume_names_from_samples: bool,
) -> BTreeMap<TypeRef, String> {
    // Propose names along a deterministic preorder walk so that the type
    // behind `"items"` is seen with that hint before any deeper alias.
    let mut proposals: BTreeMap<TypeRef, String> = BTreeMap::new();
    let mut seen: BTreeSet<TypeRef> = BTreeSet::new();
    let mut queue: Vec<(TypeRef, String)> = graph
        .top_levels()
        .iter()
        .map(|(name, &r)| (r, name.clone()))
        .collect();

    while let Some((r, hint)) = queue.pop() {
        if !seen.insert(r) {
            continue;
        }
        let attr_name = graph.attrs(r).names.iter().next().cloned();
        let proposed = if assume_names_from_samples {
            hint.clone()
        } else {
            attr_name.clone().unwrap_or_else(|| hint.clone())
        };
        proposals.insert(r, proposed);

        match graph.get(r) {
            Type::Class { properties, .. } | Type::Object { properties, .. } => {
                for (name, prop) in properties {
                    queue.push((prop.ty, name.clone()));
                }
                if let Type::Object { additional: Some(extra), .. } = graph.get(r) {
                    queue.push((*extra, format!("{hint} value")));
                }
            }
            Type::Map { values } => queue.push((*values, format!("{hint} value"))),
            Type::Array { items } => queue.push((*items, format!("{hint} element"))),
            Type::Union { members } | Type::Intersection { members } => {
                for &m in members.iter() {
                    queue.push((m, hint.clone()));
                }
            }
            _ => {}
        }
    }

    let mut names = BTreeMap::new();
    for r in graph.reachable() {
        if !needs_name(graph.get(r)) {
            continue;
        }
        let base = proposals
            .get(&r)
            .map(|p| pascal_case(p))
            .unwrap_or_default();
        names.insert(r, registry.claim(&base));
    }
    names
}

fn needs_name(ty: &Type) -> bool {
    matches!(
        ty,
        Type::Class { .. } | Type::Object { .. } | Type::Enum { .. } | Type::Union { .. }
    )
}

/// `"user_id"` / `"user id"` / `"userId"` -> `"UserId"`.
pub fn pascal_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut upper_next = true;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if upper_next {
                out.extend(c.to_uppercase());
                upper_next = false;
            } else {
                out.push(c);
            }
        } else {
            upper_next = true;
        }
    }
    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.insert_str(0, "The");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Attributes;
    use crate::builder::TypeBuilder;
    use crate::graph::{ClassProperty, PrimitiveKind, StringTypeMapping};

    #[test]
    fn pascal_case_handles_separators_and_digits() {
        assert_eq!(pascal_case("user_id"), "UserId");
        assert_eq!(pascal_case("top level"), "TopLevel");
        assert_eq!(pascal_case("3d"), "The3d");
        assert_eq!(pascal_case(""), "");
    }

    #[test]
    fn registry_uniquifies_collisions() {
        let mut reg = NameRegistry::new();
        assert_eq!(reg.claim("Thing"), "Thing");
        assert_eq!(reg.claim("Thing"), "Thing1");
        assert_eq!(reg.claim("Thing"), "Thing2");
    }

    #[test]
    fn nested_class_is_named_after_its_property() {
        let mut b = TypeBuilder::new(StringTypeMapping::all(), false);
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let inner = b
            .add_class(
                vec![("n".to_string(), ClassProperty { ty: int, optional: false })],
                true,
                Attributes::default(),
            )
            .unwrap();
        let outer = b
            .add_class(
                vec![("shipping_address".to_string(), ClassProperty { ty: inner, optional: false })],
                true,
                Attributes::default(),
            )
            .unwrap();
        b.add_top_level("Order", outer);
        let graph = b.finish().unwrap();

        let mut reg = NameRegistry::new();
        let names = gather_names(&graph, &mut reg, true);
        assert_eq!(names[&outer], "Order");
        assert_eq!(names[&inner], "ShippingAddress");
    }
}
