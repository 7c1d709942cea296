//! Command-line interface: infer from JSON or JSON Schema, emit a schema
//! view or a strict Rust model.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};
use rayon::prelude::*;
use serde_json::Value;

use crate::input::InputBundle;
use crate::pipeline::{self, Options};

#[derive(Parser, Debug)]
#[command(name = "schemalift", version, about)]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// infer and emit a JSON Schema document
    Schema(SchemaOut),
    /// infer and emit a strict Rust data model
    Rust(RustOut),
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// treat inputs as JSON Schema documents instead of samples
    #[arg(long, default_value_t = false)]
    schema: bool,

    /// treat input as newline-delimited JSON (one sample per line)
    #[arg(long, default_value_t = false)]
    ndjson: bool,

    /// JSON Pointer selecting a subnode in each document (e.g. /data/items)
    #[arg(long)]
    json_pointer: Option<String>,

    /// jq pre-process filter applied to each document
    #[arg(long)]
    jq_expr: Option<String>,

    /// name of the top-level type
    #[arg(long, default_value = "TopLevel")]
    top_level: String,

    /// one or more inputs: literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(Args, Debug, Clone)]
struct PipelineSettings {
    /// keep structurally similar classes separate
    #[arg(long)]
    no_combine_classes: bool,

    /// never turn homogeneous classes into maps
    #[arg(long)]
    no_infer_maps: bool,

    /// never expand strings with known cases into enums
    #[arg(long)]
    no_enums: bool,

    /// never specialize date/time-looking strings
    #[arg(long)]
    no_dates: bool,

    /// never specialize stringified integers and booleans
    #[arg(long)]
    no_integer_strings: bool,

    /// alphabetize class properties
    #[arg(long)]
    alphabetize: bool,

    /// make every class property optional
    #[arg(long)]
    all_optional: bool,

    /// keep top-level types from unifying with each other
    #[arg(long)]
    fixed_top_levels: bool,

    /// run the pipeline but skip emission
    #[arg(long)]
    no_render: bool,
}

#[derive(Args, Debug, Clone)]
struct CommonSettings {
    /// debugging: print resolved settings and inputs, then stop
    #[arg(long)]
    no_op: bool,

    /// print elapsed time when finished
    #[arg(long)]
    track_time: bool,

    /// debugging: disable parallel ingestion
    #[arg(long)]
    no_parallel: bool,
}

#[derive(Args, Debug)]
struct SchemaOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,

    #[command(flatten)]
    pipeline_settings: PipelineSettings,

    #[command(flatten)]
    common_settings: CommonSettings,
}

#[derive(Args, Debug)]
struct RustOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// extra derives for generated types, comma separated
    #[arg(long)]
    derives: Option<String>,

    /// output .rs file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,

    #[command(flatten)]
    pipeline_settings: PipelineSettings,

    #[command(flatten)]
    common_settings: CommonSettings,
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn run(&self) -> anyhow::Result<()> {
        let start = std::time::Instant::now();
        let (input_settings, pipeline_settings, common_settings, out, lang, derives) =
            match &self.cmd {
                Command::Schema(target) => (
                    &target.input_settings,
                    &target.pipeline_settings,
                    &target.common_settings,
                    &target.out,
                    "schema",
                    None,
                ),
                Command::Rust(target) => (
                    &target.input_settings,
                    &target.pipeline_settings,
                    &target.common_settings,
                    &target.out,
                    "rust",
                    target.derives.clone(),
                ),
            };

        if common_settings.no_op {
            let sources = resolve_file_path_patterns(&input_settings.input)?;
            eprintln!("{self:#?}");
            eprintln!("RESOLVED SOURCES:");
            for source in sources {
                eprintln!("\t- {}", source.to_string_lossy());
            }
            return Ok(());
        }

        let mut inputs = load_inputs(input_settings, common_settings)?;
        let mut options = Options {
            lang: lang.to_string(),
            combine_classes: !pipeline_settings.no_combine_classes,
            infer_maps: !pipeline_settings.no_infer_maps,
            infer_enums: !pipeline_settings.no_enums,
            infer_dates: !pipeline_settings.no_dates,
            infer_integer_strings: !pipeline_settings.no_integer_strings,
            alphabetize_properties: pipeline_settings.alphabetize,
            all_properties_optional: pipeline_settings.all_optional,
            fixed_top_levels: pipeline_settings.fixed_top_levels,
            no_render: pipeline_settings.no_render,
            debug_print_times: common_settings.track_time,
            ..Options::default()
        };
        if let Some(derives) = derives {
            options.renderer_options.insert("derives".to_string(), derives);
        }

        let result = pipeline::run_concatenated(&options, &mut inputs).map_err(|e| anyhow!("{e}"))?;
        let text = result.lines.join("\n");

        match out {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("creating {}", parent.display()))?;
                }
                std::fs::write(path, &text)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
            None => println!("{text}"),
        }

        if common_settings.track_time {
            eprintln!("inference took {}", format_duration(start.elapsed()));
        }
        Ok(())
    }
}

fn load_inputs(settings: &InputSettings, common: &CommonSettings) -> anyhow::Result<InputBundle> {
    let source_paths = resolve_file_path_patterns(&settings.input)?;
    let mut bundle = InputBundle::new();

    // MAP (parallel): read and pre-process each file. The bundle is fed in
    // path order afterwards so results stay deterministic.
    let documents: Vec<(PathBuf, Vec<Value>)> = if common.no_parallel {
        source_paths
            .iter()
            .map(|path| load_one(path, settings).map(|docs| (path.clone(), docs)))
            .collect::<anyhow::Result<_>>()?
    } else {
        source_paths
            .par_iter()
            .map(|path| load_one(path, settings).map(|docs| (path.clone(), docs)))
            .collect::<anyhow::Result<_>>()?
    };

    for (path, docs) in documents {
        if settings.schema {
            let name = schema_top_level_name(&path, settings, source_paths.len());
            for doc in docs {
                bundle.add_schema(&name, doc);
            }
        } else {
            for doc in docs {
                bundle.add_sample(&settings.top_level, doc);
            }
        }
    }
    Ok(bundle)
}

fn schema_top_level_name(path: &Path, settings: &InputSettings, source_count: usize) -> String {
    if source_count == 1 {
        return settings.top_level.clone();
    }
    path.file_stem()
        .map(|stem| crate::names::pascal_case(&stem.to_string_lossy()))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| settings.top_level.clone())
}

fn load_one(path: &Path, settings: &InputSettings) -> anyhow::Result<Vec<Value>> {
    let path_str = path.to_string_lossy().to_string();
    let source = std::fs::read_to_string(path).with_context(|| format!("reading {path_str}"))?;

    let mut parsed: Vec<Value> = if settings.ndjson {
        let mut docs = Vec::new();
        for (i, line) in source.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let doc = crate::input::parse_json_with_path::<Value>(line)
                .map_err(|e| anyhow!("NDJSON parse error {path_str}:{}: {e}", i + 1))?;
            docs.push(doc);
        }
        docs
    } else {
        vec![crate::input::parse_json_with_path::<Value>(&source)
            .map_err(|e| anyhow!("JSON parse error ({path_str}): {e}"))?]
    };

    if let Some(expr) = &settings.jq_expr {
        let mut filtered = Vec::new();
        for doc in &parsed {
            let out = crate::jq::apply_filter(expr, doc)
                .map_err(|e| anyhow!("jq failed ({path_str}): {e}"))?;
            filtered.extend(out);
        }
        parsed = filtered;
    }

    if let Some(pointer) = &settings.json_pointer {
        let mut selected = Vec::new();
        for doc in &parsed {
            match doc.pointer(pointer) {
                None => {}
                Some(Value::Array(elements)) => selected.extend(elements.iter().cloned()),
                Some(node) => selected.push(node.clone()),
            }
        }
        parsed = selected;
    }

    Ok(parsed)
}

fn resolve_file_path_patterns<I>(patterns: I) -> anyhow::Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();
    for raw in patterns {
        let pattern = raw.as_ref();
        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern)? {
                out.push(entry?);
                matched_any = true;
            }
            if !matched_any {
                return Err(anyhow!("glob pattern matched no files: {pattern}"));
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }
    Ok(out)
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
