use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use field_schema_core::{BuildOutput, build};
use field_schema_loader::{BuildConfig, InputBuilder};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Output format of the printed view.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum CliOutputFormat {
    #[default]
    Json,
    Yaml,
}

/// Which view of the resolved model to print.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum CliView {
    /// Flat name to field definition.
    #[default]
    Flat,
    /// Field set to metadata and field tree.
    Nested,
}

#[derive(Debug, Parser)]
#[command(name = "schema-build")]
#[command(about = "Resolve field-set schema definitions into flat and nested views")]
struct Cli {
    /// Log pipeline stages to stderr (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Resolve the schemas and print a view on stdout.
    Build(BuildArgs),
    /// Resolve the schemas and report success or the first error.
    Check(InputArgs),
}

#[derive(Debug, Args)]
struct InputArgs {
    /// YAML build configuration; paths in it are relative to the file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Schema file or directory (repeatable).
    #[arg(long = "schemas")]
    schemas: Vec<PathBuf>,
    /// Extension schema file or directory merged on top (repeatable).
    #[arg(long)]
    include: Vec<PathBuf>,
    /// Subset definition file (repeatable; subsets are unioned).
    #[arg(long)]
    subset: Vec<PathBuf>,
    /// Exclude definition file (repeatable).
    #[arg(long)]
    exclude: Vec<PathBuf>,
    /// Treat authoring warnings as errors.
    #[arg(long)]
    strict: bool,
    /// Fail when extensions conflict with the base schemas.
    #[arg(long)]
    validate_merge: bool,
    /// Replace types that are not universally available.
    #[arg(long)]
    oss: bool,
}

#[derive(Debug, Args)]
struct BuildArgs {
    #[command(flatten)]
    input: InputArgs,
    /// View to print.
    #[arg(long, value_enum, default_value_t)]
    view: CliView,
    /// Output format.
    #[arg(long, value_enum, default_value_t)]
    format: CliOutputFormat,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Build(args) => run_build(args),
        Command::Check(args) => run_check(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_build(args: BuildArgs) -> Result<(), String> {
    let output = resolve(&args.input)?;
    let rendered = match (args.view, args.format) {
        (CliView::Flat, CliOutputFormat::Json) => serde_json::to_string_pretty(&output.flat)
            .map_err(|err| format!("Failed to serialize flat view: {err}"))?,
        (CliView::Flat, CliOutputFormat::Yaml) => serde_yaml::to_string(&output.flat)
            .map_err(|err| format!("Failed to serialize flat view: {err}"))?,
        (CliView::Nested, CliOutputFormat::Json) => serde_json::to_string_pretty(&output.nested)
            .map_err(|err| format!("Failed to serialize nested view: {err}"))?,
        (CliView::Nested, CliOutputFormat::Yaml) => serde_yaml::to_string(&output.nested)
            .map_err(|err| format!("Failed to serialize nested view: {err}"))?,
    };
    println!("{}", rendered.trim_end());
    Ok(())
}

fn run_check(args: InputArgs) -> Result<(), String> {
    let output = resolve(&args)?;
    println!(
        "Resolved {} field set(s) into {} field(s).",
        output.nested.len(),
        output.flat.len()
    );
    Ok(())
}

fn resolve(args: &InputArgs) -> Result<BuildOutput, String> {
    let config = build_config(args)?;
    let input = InputBuilder::from_config(&config)
        .build()
        .map_err(|e| e.to_string())?;
    info!(groups = input.sources.len(), "resolving schemas");
    build(input, &config.pipeline_options()).map_err(|e| e.to_string())
}

/// Combines the configuration file, if any, with command-line overrides.
fn build_config(args: &InputArgs) -> Result<BuildConfig, String> {
    let mut config = match &args.config {
        Some(path) => BuildConfig::load(path).map_err(|e| e.to_string())?,
        None => BuildConfig::default(),
    };
    config.schemas.extend(args.schemas.iter().cloned());
    config.include.extend(args.include.iter().cloned());
    config.subset.extend(args.subset.iter().cloned());
    config.exclude.extend(args.exclude.iter().cloned());
    config.strict |= args.strict;
    config.merge.validate |= args.validate_merge;
    config.oss |= args.oss;

    if config.schemas.is_empty() {
        return Err("no schemas given; pass --schemas or --config".to_string());
    }
    Ok(config)
}
