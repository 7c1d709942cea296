//! The driver: orders the rewrite passes, runs the fixed points, honors
//! target capabilities and user flags, and hands the canonical graph to a
//! renderer.

use std::collections::BTreeMap;
use std::time::Instant;

use crate::builder::TypeBuilder;
use crate::error::{Error, Result};
use crate::gc::garbage_collect;
use crate::graph::TypeGraph;
use crate::input::{InferenceFlags, InputBundle};
use crate::names::{gather_names, NameRegistry};
use crate::passes::combine_classes::combine_classes;
use crate::passes::flatten_unions::flatten_unions;
use crate::passes::infer_maps::infer_maps;
use crate::passes::intersections::{remove_indirection_intersections, resolve_intersections};
use crate::passes::objects::replace_object_type;
use crate::passes::scalars::{none_to_any, optional_to_nullable};
use crate::passes::strings::{expand_strings, flatten_strings, ExpandPolicy};
use crate::passes::transforms::{make_transformations, rewrite_fixed_point};
use crate::passes::PassResult;
use crate::render::rust::RustOptions;
use crate::render::{self, RenderResult};
use crate::target::{self, Renderer, TargetLanguage};

#[derive(Clone, Debug)]
pub struct Options {
    pub lang: String,
    pub combine_classes: bool,
    pub infer_maps: bool,
    pub infer_enums: bool,
    pub infer_dates: bool,
    pub infer_integer_strings: bool,
    pub alphabetize_properties: bool,
    pub all_properties_optional: bool,
    pub fixed_top_levels: bool,
    pub no_render: bool,
    pub output_filename: String,
    pub leading_comments: Vec<String>,
    pub renderer_options: BTreeMap<String, String>,
    pub indentation: Option<String>,
    pub debug_print_graph: bool,
    pub debug_print_times: bool,
    pub check_provenance: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            lang: "schema".to_string(),
            combine_classes: true,
            infer_maps: true,
            infer_enums: true,
            infer_dates: true,
            infer_integer_strings: true,
            alphabetize_properties: false,
            all_properties_optional: false,
            fixed_top_levels: false,
            no_render: false,
            output_filename: "stdout".to_string(),
            leading_comments: Vec::new(),
            renderer_options: BTreeMap::new(),
            indentation: None,
            debug_print_graph: false,
            debug_print_times: false,
            check_provenance: false,
        }
    }
}

/// Run the whole pipeline: ingest inputs, rewrite to the canonical graph,
/// render for the target. Returns a mapping from output filename to result.
pub fn run(options: &Options, inputs: &mut InputBundle) -> Result<BTreeMap<String, RenderResult>> {
    let target = target::lookup(&options.lang)?;
    validate_renderer_options(&target, options)?;

    inputs.finish_adding_inputs()?;

    // Fast path: the schema target fed a single schema document just
    // pretty-prints it, no pipeline at all.
    if target.is_schema_passthrough() {
        if let Some(source) = inputs.single_string_schema_source() {
            let mut lines: Vec<String> = source.lines().map(String::from).collect();
            lines.push(String::new());
            let mut out = BTreeMap::new();
            out.insert(
                options.output_filename.clone(),
                RenderResult { lines, annotations: Vec::new() },
            );
            return Ok(out);
        }
    }

    let graph = build_canonical_graph(options, inputs, &target)?;

    if options.debug_print_graph {
        log::debug!("final graph: {graph:#?}");
    }
    if options.check_provenance {
        for r in graph.reachable() {
            if graph.attrs(r).provenance.is_empty() {
                log::warn!("type {r:?} ({}) lost its provenance", graph.get(r).kind_name());
            }
        }
    }

    let mut registry = NameRegistry::new();
    let schema_mode = inputs.need_schema_processing();
    let names = gather_names(&graph, &mut registry, !schema_mode);

    let result = if options.no_render {
        RenderResult {
            lines: vec!["// rendering skipped".to_string()],
            annotations: Vec::new(),
        }
    } else {
        match target.renderer {
            Renderer::JsonSchema => render::schema::render(&graph, &names)?,
            Renderer::RustModel => {
                let rust_options = RustOptions {
                    extra_derives: options
                        .renderer_options
                        .get("derives")
                        .map(|d| d.split(',').map(|s| s.trim().to_string()).collect())
                        .unwrap_or_default(),
                    leading_comments: options.leading_comments.clone(),
                    indent: options.indentation.clone().unwrap_or_else(|| "    ".to_string()),
                };
                render::rust::render(&graph, &names, &rust_options)?
            }
        }
    };

    let mut out = BTreeMap::new();
    out.insert(options.output_filename.clone(), result);
    Ok(out)
}

/// Convenience wrapper: concatenate a multi-file result into one.
pub fn run_concatenated(options: &Options, inputs: &mut InputBundle) -> Result<RenderResult> {
    let results = run(options, inputs)?;
    Ok(render::concatenate(&results))
}

/// Run the pipeline up to the canonical graph, without rendering.
pub fn canonical_graph(options: &Options, inputs: &mut InputBundle) -> Result<TypeGraph> {
    let target = target::lookup(&options.lang)?;
    canonical_graph_for_target(options, inputs, &target)
}

/// Same, against an explicit capability descriptor (not just the registry).
pub fn canonical_graph_for_target(
    options: &Options,
    inputs: &mut InputBundle,
    target: &TargetLanguage,
) -> Result<TypeGraph> {
    inputs.finish_adding_inputs()?;
    build_canonical_graph(options, inputs, target)
}

/// Steps 1-16 of the pass program; everything between input ingestion and
/// name gathering.
fn build_canonical_graph(
    options: &Options,
    inputs: &InputBundle,
    target: &TargetLanguage,
) -> Result<TypeGraph> {
    let flags = InferenceFlags {
        infer_enums: options.infer_enums,
        infer_dates: options.infer_dates,
        infer_integer_strings: options.infer_integer_strings,
        all_properties_optional: options.all_properties_optional,
    };
    let schema_mode = inputs.need_schema_processing();
    let alpha = options.alphabetize_properties;
    let both_numbers = target.supports_unions_with_both_number_types;
    let times = options.debug_print_times;

    let mut builder = TypeBuilder::new(target.string_type_mapping, options.fixed_top_levels);
    inputs.add_types(&mut builder, &flags)?;
    let has_forwarders = builder.did_add_forwarding_intersection();
    let mut graph = builder.finish()?;
    log::debug!("initial graph: {} types, schema_mode={schema_mode}", graph.len());

    if has_forwarders {
        let result = timed(times, "remove-indirection-intersections", || {
            remove_indirection_intersections(&graph, alpha)
        })?;
        advance(&mut graph, result);
    }

    if schema_mode {
        let mut intersections_done = false;
        let mut unions_done = false;
        while !(intersections_done && unions_done) {
            let mut changed = false;
            if !intersections_done {
                let result = timed(times, "resolve-intersections", || {
                    resolve_intersections(&graph, alpha)
                })?;
                intersections_done = result.done;
                changed |= advance(&mut graph, result);
            }
            if !unions_done {
                let result = timed(times, "flatten-unions(strict)", || {
                    flatten_unions(&graph, true, both_numbers, alpha)
                })?;
                unions_done = result.done;
                changed |= advance(&mut graph, result);
            }
            // Progress guarantee: a stalled iteration must mean both passes
            // already reported done.
            if !changed && !(intersections_done && unions_done) {
                return Err(Error::Invariant(
                    "intersection/union fixed point made no progress".into(),
                ));
            }
        }
    }

    let result = timed(times, "replace-object-type", || {
        replace_object_type(&graph, target.supports_full_object_type, alpha)
    })?;
    advance(&mut graph, result);

    loop {
        let result = timed(times, "flatten-unions", || {
            flatten_unions(&graph, false, both_numbers, alpha)
        })?;
        let done = result.done;
        advance(&mut graph, result);
        if done {
            break;
        }
    }

    if options.combine_classes {
        let result = timed(times, "combine-classes(first)", || {
            combine_classes(&graph, alpha, true, false)
        })?;
        if advance(&mut graph, result) {
            let cleanup = timed(times, "combine-classes(final)", || {
                combine_classes(&graph, alpha, false, true)
            })?;
            advance(&mut graph, cleanup);
        }
    }

    if options.infer_maps {
        loop {
            let result = timed(times, "infer-maps", || infer_maps(&graph, alpha))?;
            if !advance(&mut graph, result) {
                break;
            }
        }
    }

    let policy = if schema_mode {
        ExpandPolicy::All
    } else if options.infer_enums {
        ExpandPolicy::Infer
    } else {
        ExpandPolicy::None
    };
    let result = timed(times, "expand-strings", || expand_strings(&graph, policy, alpha))?;
    advance(&mut graph, result);

    // Self-check: expansion never re-creates union nesting.
    let result = timed(times, "flatten-unions(check)", || {
        flatten_unions(&graph, false, both_numbers, alpha)
    })?;
    if !result.done {
        return Err(Error::Invariant("string expansion left unions unflattened".into()));
    }

    if schema_mode {
        let result = timed(times, "flatten-strings", || flatten_strings(&graph, alpha))?;
        advance(&mut graph, result);
    }

    let result = timed(times, "none-to-any", || none_to_any(&graph, alpha))?;
    advance(&mut graph, result);

    if !target.supports_optional_class_properties {
        let result = timed(times, "optional-to-nullable", || optional_to_nullable(&graph, alpha))?;
        advance(&mut graph, result);
    }

    let result = timed(times, "rewrite-fixed-point", || rewrite_fixed_point(&graph, alpha))?;
    advance(&mut graph, result);

    let result = timed(times, "make-transformations", || make_transformations(&graph, alpha))?;
    advance(&mut graph, result);

    // Self-check: transformations do not disturb union shape.
    let result = timed(times, "flatten-unions(final-check)", || {
        flatten_unions(&graph, false, both_numbers, alpha)
    })?;
    if !result.done {
        return Err(Error::Invariant("transformation insertion left unions unflattened".into()));
    }

    let start = Instant::now();
    let graph = garbage_collect(&graph, alpha)?;
    if times {
        log::debug!("garbage-collect: {:?}", start.elapsed());
    }
    Ok(graph)
}

fn advance(graph: &mut TypeGraph, result: PassResult) -> bool {
    match result.graph {
        Some(next) => {
            *graph = next;
            true
        }
        None => false,
    }
}

fn timed(enabled: bool, name: &str, f: impl FnOnce() -> Result<PassResult>) -> Result<PassResult> {
    let start = Instant::now();
    let result = f()?;
    if enabled {
        log::debug!(
            "{name}: {:?} ({})",
            start.elapsed(),
            if result.changed() { "changed" } else { "unchanged" }
        );
    }
    Ok(result)
}

fn validate_renderer_options(target: &TargetLanguage, options: &Options) -> Result<()> {
    let known: &[&str] = match target.renderer {
        Renderer::JsonSchema => &[],
        Renderer::RustModel => &["derives"],
    };
    for key in options.renderer_options.keys() {
        if !known.contains(&key.as_str()) {
            return Err(Error::UnknownRendererOption {
                lang: target.name.to_string(),
                option: key.clone(),
            });
        }
    }
    Ok(())
}
