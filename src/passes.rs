//! Graph-to-graph rewrite passes.
//!
//! Every pass is a pure function over an immutable [`TypeGraph`]: it analyzes
//! the source, produces a rewrite [`Plan`](crate::reconstitute::Plan), and
//! applies it through the reconstitutor. A pass that finds nothing to do
//! returns `graph: None`, the strong no-change signal the driver keys its
//! fixed-point loops on. Passes are idempotent under their own postcondition.

pub mod combine_classes;
pub mod flatten_unions;
pub mod infer_maps;
pub mod intersections;
pub mod objects;
pub mod scalars;
pub mod strings;
pub mod transforms;

use crate::graph::TypeGraph;

/// Outcome of one pass application.
#[derive(Debug)]
pub struct PassResult {
    /// `Some` iff the pass changed anything; `None` means the caller keeps
    /// the input graph.
    pub graph: Option<TypeGraph>,
    /// True iff another application of the same pass would be a no-op.
    pub done: bool,
}

impl PassResult {
    pub fn unchanged() -> Self {
        PassResult { graph: None, done: true }
    }

    pub fn rewritten(graph: TypeGraph, done: bool) -> Self {
        PassResult { graph: Some(graph), done }
    }

    pub fn changed(&self) -> bool {
        self.graph.is_some()
    }
}
