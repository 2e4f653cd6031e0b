use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use simbridge_host::config::DEFAULT_RECORD_FILE;
use simbridge_host::{
    CancelToken, ConfiguredInput, EngineLibrary, EntryPoints, HostConfig, ModelVariant, ObserverSet, Pacing,
    SampleRecorder, Simulation, TracingObserver, VariantKind,
};
use simbridge_sys::{Crash, Distance, Telemetry};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => execute_run(args),
        Commands::Schema(args) => execute_schema(args),
    }
}

#[derive(Parser)]
#[command(author, version, about = "Drive a native simulation engine through the simbridge ABI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load an engine library and step it until cancelled or the time limit.
    Run(RunArgs),
    /// Print the input and output field order of a model variant.
    Schema(SchemaArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Engine shared library. Overrides `library` in the config file.
    #[arg(long)]
    library: Option<PathBuf>,
    /// Model variant the library was built for.
    #[arg(long, value_enum)]
    variant: Option<VariantArg>,
    /// Prefix of the exported `_new`, `_free` and `_update` symbols.
    #[arg(long)]
    symbol_prefix: Option<String>,
    /// JSON host configuration.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Simulated seconds per step.
    #[arg(long)]
    timestep: Option<f64>,
    /// Wall-clock milliseconds between steps.
    #[arg(long)]
    interval_ms: Option<u64>,
    /// Stop once simulated time passes this many seconds.
    #[arg(long)]
    max_time: Option<f64>,
    #[arg(long, value_enum)]
    pacing: Option<PacingArg>,
    /// Seed for random inputs.
    #[arg(long)]
    seed: Option<u64>,
    /// Record every step as CSV. Without a value writes to the run path.
    #[arg(long, num_args = 0..=1, default_missing_value = DEFAULT_RECORD_FILE)]
    record: Option<PathBuf>,
    /// Rows per simulated second in the recording; 0 records every step.
    #[arg(long)]
    record_rate_hz: Option<f64>,
    /// Count non-finite engine outputs as failed steps.
    #[arg(long)]
    reject_non_finite: bool,
    /// Do not log every output sample.
    #[arg(long)]
    quiet: bool,
}

#[derive(Args)]
struct SchemaArgs {
    #[arg(long, value_enum)]
    variant: VariantArg,
    /// Print JSON instead of a table.
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum VariantArg {
    Distance,
    Crash,
    Telemetry,
}

impl From<VariantArg> for VariantKind {
    fn from(variant: VariantArg) -> Self {
        match variant {
            VariantArg::Distance => VariantKind::Distance,
            VariantArg::Crash => VariantKind::Crash,
            VariantArg::Telemetry => VariantKind::Telemetry,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PacingArg {
    Fixed,
    Realtime,
    Simulated,
}

impl From<PacingArg> for Pacing {
    fn from(pacing: PacingArg) -> Self {
        match pacing {
            PacingArg::Fixed => Pacing::Fixed,
            PacingArg::Realtime => Pacing::Realtime,
            PacingArg::Simulated => Pacing::Simulated,
        }
    }
}

fn resolve_config(args: &RunArgs) -> Result<HostConfig> {
    let mut config = match &args.config {
        Some(path) => HostConfig::load(path)
            .with_context(|| format!("failed to load configuration {}", path.display()))?,
        None => HostConfig::default(),
    };
    config
        .apply_env()
        .context("invalid SIMBRIDGE_* environment override")?;

    if let Some(library) = &args.library {
        config.library = Some(library.clone());
    }
    if let Some(variant) = args.variant {
        config.variant = variant.into();
    }
    if let Some(prefix) = &args.symbol_prefix {
        config.symbol_prefix = prefix.clone();
    }
    if let Some(timestep) = args.timestep {
        config.loop_config.timestep_s = timestep;
    }
    if let Some(interval_ms) = args.interval_ms {
        config.loop_config.interval_ms = interval_ms;
    }
    if args.max_time.is_some() {
        config.loop_config.max_time_s = args.max_time;
    }
    if let Some(pacing) = args.pacing {
        config.loop_config.pacing = pacing.into();
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if let Some(record) = &args.record {
        config.record = Some(record.clone());
    }
    if let Some(rate) = args.record_rate_hz {
        config.record_rate_hz = rate;
    }
    if args.reject_non_finite {
        config.loop_config.reject_non_finite = true;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn execute_run(args: RunArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    install_panic_dump(config.error_dump_path());

    match config.variant {
        VariantKind::Distance => run_variant::<Distance>(&config, args.quiet),
        VariantKind::Crash => run_variant::<Crash>(&config, args.quiet),
        VariantKind::Telemetry => run_variant::<Telemetry>(&config, args.quiet),
    }
}

fn run_variant<V: ModelVariant>(config: &HostConfig, quiet: bool) -> Result<()> {
    let token = CancelToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .context("failed to install Ctrl-C handler")?;

    let library = config
        .library
        .as_ref()
        .context("no engine library given; pass --library or set `library` in the config")?;
    let entry = EntryPoints::with_prefix(&config.symbol_prefix);
    // The library is trusted to export `entry` for variant `V`.
    let engine = unsafe { EngineLibrary::<V>::load(library, &entry) }
        .with_context(|| format!("failed to load {} engine", V::NAME))?;

    let source = ConfiguredInput::<V::Input>::from_config(V::NAME, &config.input, config.seed)
        .context("invalid input configuration")?;

    let mut observers = ObserverSet::<V>::new();
    if !quiet {
        observers.push(TracingObserver);
    }
    if let Some(path) = config.record_path() {
        let recorder = SampleRecorder::<V, _>::create(&path, config.record_rate_hz)
            .with_context(|| format!("failed to create recording {}", path.display()))?;
        observers.push(recorder);
    }

    let mut simulation = Simulation::start_with_token(
        engine,
        config.loop_config.clone(),
        source,
        observers,
        token,
    )
    .with_context(|| format!("failed to start {} engine", V::NAME))?;

    let report = simulation.wait().context("update loop failed")?;
    println!(
        "Stopped {} engine ({:?}): {} steps, {} failed, t={}s",
        V::NAME,
        report.reason,
        report.steps,
        report.failed_steps,
        report.final_time_s
    );
    if let Some(path) = config.record_path() {
        println!("  Recording: {}", path.display());
    }
    Ok(())
}

#[derive(Serialize)]
struct ErrorDump {
    err_type: &'static str,
    message: String,
}

fn write_error_dump(path: &Path, message: String) -> std::io::Result<()> {
    let dump = ErrorDump {
        err_type: "unhandled",
        message,
    };
    let json = serde_json::to_string(&dump).map_err(std::io::Error::from)?;
    fs::write(path, json)
}

fn install_panic_dump(path: PathBuf) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::warn!(path = %path.display(), "unhandled panic, writing error dump");
        if let Err(err) = write_error_dump(&path, info.to_string()) {
            tracing::error!(?err, "failed to write error dump");
        }
        previous(info);
    }));
}

#[derive(Serialize)]
struct Schema {
    variant: &'static str,
    inputs: &'static [&'static str],
    outputs: &'static [&'static str],
}

fn execute_schema(args: SchemaArgs) -> Result<()> {
    let variant = VariantKind::from(args.variant);
    let schema = Schema {
        variant: variant.name(),
        inputs: variant.input_fields(),
        outputs: variant.output_fields(),
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }
    println!("{} ({} inputs, {} outputs)", schema.variant, schema.inputs.len(), schema.outputs.len());
    println!("  Inputs:");
    for (index, name) in schema.inputs.iter().enumerate() {
        println!("    {index:>2} {name}");
    }
    println!("  Outputs:");
    for (index, name) in schema.outputs.iter().enumerate() {
        println!("    {index:>2} {name}");
    }
    Ok(())
}
