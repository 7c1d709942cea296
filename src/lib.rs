//! schemalift: infers statically-typed schemas from loosely-typed JSON
//! samples and JSON Schema documents, lowers them into a canonical type
//! graph, and renders the result for a target language.
//!
//! The heart of the crate is the type-graph pipeline: an interned, possibly
//! cyclic IR ([`graph`]), a builder ([`builder`]) and reconstitutor
//! ([`reconstitute`]), a set of idempotent rewrite passes ([`passes`]), and
//! the driver that sequences them ([`pipeline`]).

pub mod attributes;
pub mod builder;
pub mod cli;
pub mod error;
pub mod gc;
pub mod graph;
pub mod input;
pub mod jq;
pub mod names;
pub mod passes;
pub mod pipeline;
pub mod reconstitute;
pub mod render;
pub mod target;

pub use error::{Error, Result};
pub use graph::{Type, TypeGraph, TypeRef};
pub use pipeline::{run, run_concatenated, Options};
