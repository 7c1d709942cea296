//! Canonical reachability sweep.

use crate::error::{Error, Result};
use crate::graph::TypeGraph;
use crate::reconstitute::{apply_plan, Plan};

/// Returns a graph containing exactly the types reachable from the top
/// levels, re-interned, in canonical preorder. Property order is
/// alphabetized on request.
pub fn garbage_collect(graph: &TypeGraph, alphabetize: bool) -> Result<TypeGraph> {
    let swept = apply_plan(graph, Plan::new(), alphabetize)?;
    // Every slot of the destination came from a top-level walk, so full
    // reachability is structural; verify anyway, cheaply.
    let reachable = swept.reachable().len();
    if reachable != swept.len() {
        return Err(Error::Invariant(format!(
            "garbage collection left {} unreachable types",
            swept.len() - reachable
        )));
    }
    Ok(swept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Attributes;
    use crate::builder::TypeBuilder;
    use crate::graph::{PrimitiveKind, StringTypeMapping, Type};

    #[test]
    fn unreachable_types_are_dropped() {
        let mut b = TypeBuilder::new(StringTypeMapping::all(), false);
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let _orphan = b.add_primitive(PrimitiveKind::String, Attributes::with_name("Orphan"));
        let arr = b.add_array(int, Attributes::default());
        b.add_top_level("Root", arr);
        let graph = b.finish().unwrap();
        assert_eq!(graph.len(), 3);

        let swept = garbage_collect(&graph, false).unwrap();
        assert_eq!(swept.len(), 2);
        assert!(!swept.any_reachable(|t| matches!(t, Type::Primitive(PrimitiveKind::String))));
    }

    #[test]
    fn alphabetize_orders_class_properties() {
        use crate::graph::ClassProperty;
        let mut b = TypeBuilder::new(StringTypeMapping::all(), false);
        let int = b.add_primitive(PrimitiveKind::Integer, Attributes::default());
        let props = vec![
            ("zeta".to_string(), ClassProperty { ty: int, optional: false }),
            ("alpha".to_string(), ClassProperty { ty: int, optional: false }),
        ];
        let c = b.add_class(props, true, Attributes::default()).unwrap();
        b.add_top_level("Root", c);
        let graph = b.finish().unwrap();

        let swept = garbage_collect(&graph, true).unwrap();
        let root = swept.top_levels()["Root"];
        let Type::Class { properties, .. } = swept.get(root) else { panic!("expected class") };
        assert_eq!(properties[0].0, "alpha");
        assert_eq!(properties[1].0, "zeta");

        // Without the flag, insertion order is preserved.
        let swept = garbage_collect(&graph, false).unwrap();
        let root = swept.top_levels()["Root"];
        let Type::Class { properties, .. } = swept.get(root) else { panic!("expected class") };
        assert_eq!(properties[0].0, "zeta");
    }
}
