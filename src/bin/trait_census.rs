use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use trait_census::api::fetch_batch;
use trait_census::config::{Config, ConfigLoader, RangeEntry, ResolvedConfig, range_tasks};
use trait_census::coordinator::Batch;
use trait_census::domain::HttpMethod;
use trait_census::error::CensusError;
use trait_census::output::{JsonOutput, OutputFormat, TextOutput};

#[derive(Parser)]
#[command(name = "trait-census")]
#[command(about = "Fetch JSON metadata in parallel and count trait occurrences and rarity")]
#[command(version, author)]
struct Cli {
    #[command(flatten)]
    batch: BatchArgs,

    #[arg(long, global = true, value_enum, default_value = "json")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct BatchArgs {
    /// Config file (defaults to ./trait-census.json)
    #[arg(long, global = true)]
    config: Option<Utf8PathBuf>,

    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    workers: Option<u64>,

    /// Per-request timeout in seconds
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Seconds between progress reports, 0 disables them
    #[arg(long, global = true)]
    monitor_interval: Option<u64>,

    #[arg(long, global = true, value_enum)]
    method: Option<HttpMethod>,

    /// Fetch `{base-url}{id}{suffix}` for every id in first..=last
    #[arg(long, global = true, requires = "last")]
    base_url: Option<String>,

    #[arg(long, global = true, default_value_t = 1)]
    first: u64,

    #[arg(long, global = true)]
    last: Option<u64>,

    #[arg(long, global = true, default_value = ".json")]
    suffix: String,

    /// Query parameter appended to generated URLs (KEY=VALUE)
    #[arg(long = "query", global = true, value_parser = parse_key_value)]
    query: Vec<(String, String)>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Print the attribute list of every fetched document")]
    Attributes,
    #[command(about = "Count occurrences of each trait/value pair")]
    Occurrence,
    #[command(about = "Score each document as collection size / attribute count")]
    Rarity(RarityArgs),
    #[command(about = "Score each document by how uncommon its trait values are")]
    TraitRarity,
    #[command(about = "Print the batch report (successes and failures)")]
    Report,
}

#[derive(Args)]
struct RarityArgs {
    #[arg(long)]
    collection_size: Option<u64>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(census) = report.downcast_ref::<CensusError>() {
            return ExitCode::from(map_exit_code(census));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CensusError) -> u8 {
    match error {
        CensusError::MissingConfig
        | CensusError::ConfigRead(_)
        | CensusError::ConfigParse(_)
        | CensusError::InvalidConfig(_)
        | CensusError::InvalidUrl { .. }
        | CensusError::InvalidTaskId(_)
        | CensusError::DuplicateTaskId(_)
        | CensusError::UnsupportedMethod(_)
        | CensusError::NoTasks => 2,
        CensusError::ClientBuild(_) => 3,
        CensusError::Output(_) => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let resolved = resolve(&cli.batch)?;
    if resolved.tasks.is_empty() {
        return Err(CensusError::NoTasks.into());
    }

    let collection_size = match &cli.command {
        Commands::Rarity(args) => Some(
            args.collection_size
                .or(resolved.collection_size)
                .ok_or_else(|| {
                    miette::Report::msg(
                        "collection size required (--collection-size or `collection_size` in config)",
                    )
                })?,
        ),
        _ => None,
    };

    let batch = fetch_batch(resolved.tasks, &resolved.settings)?;
    warn_on_failures(&batch);

    let printed = match (cli.command, cli.format) {
        (Commands::Attributes, OutputFormat::Json) => JsonOutput::print_attributes(&batch.responses()),
        (Commands::Attributes, OutputFormat::Text) => TextOutput::print_attributes(&batch.responses()),
        (Commands::Occurrence, OutputFormat::Json) => JsonOutput::print_occurrence(&batch.occurrence()),
        (Commands::Occurrence, OutputFormat::Text) => TextOutput::print_occurrence(&batch.occurrence()),
        (Commands::Rarity(_), format) => {
            let rarity = batch.rarity(collection_size.unwrap_or_default());
            match format {
                OutputFormat::Json => JsonOutput::print_rarity(&rarity),
                OutputFormat::Text => TextOutput::print_rarity(&rarity),
            }
        }
        (Commands::TraitRarity, OutputFormat::Json) => JsonOutput::print_rarity(&batch.trait_rarity()),
        (Commands::TraitRarity, OutputFormat::Text) => TextOutput::print_rarity(&batch.trait_rarity()),
        (Commands::Report, OutputFormat::Json) => JsonOutput::print_report(batch.report()),
        (Commands::Report, OutputFormat::Text) => TextOutput::print_report(batch.report()),
    };
    Ok(printed?)
}

/// Config file first, then command line overrides on top.
fn resolve(args: &BatchArgs) -> Result<ResolvedConfig, CensusError> {
    let mut resolved = match (&args.config, &args.base_url) {
        (Some(path), _) => ConfigLoader::resolve(Some(path.as_path()))?,
        (None, Some(_)) => match ConfigLoader::resolve(None) {
            Err(CensusError::MissingConfig) => ConfigLoader::resolve_config(Config::default())?,
            other => other?,
        },
        (None, None) => ConfigLoader::resolve(None)?,
    };

    if let Some(workers) = args.workers {
        resolved.settings.worker_count = workers as usize;
    }
    if let Some(timeout) = args.timeout {
        resolved.settings.timeout = std::time::Duration::from_secs(timeout);
    }
    if let Some(interval) = args.monitor_interval {
        resolved.settings.monitor_interval =
            (interval > 0).then(|| std::time::Duration::from_secs(interval));
    }
    if let Some(method) = args.method {
        resolved.settings.method = method;
    }
    if let (Some(base_url), Some(last)) = (&args.base_url, args.last) {
        resolved.tasks = range_tasks(&RangeEntry {
            base_url: base_url.clone(),
            first: args.first,
            last,
            suffix: Some(args.suffix.clone()),
            query: args.query.iter().cloned().collect(),
        })?;
    }
    Ok(resolved)
}

fn warn_on_failures(batch: &Batch) {
    let report = batch.report();
    if report.failure_count() > 0 {
        tracing::warn!(
            "{} of {} tasks failed (run `trait-census report` for details)",
            report.failure_count(),
            report.submitted
        );
    }
}

fn parse_key_value(input: &str) -> Result<(String, String), String> {
    input
        .split_once('=')
        .map(|(key, value)| (key.trim().to_string(), value.to_string()))
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| format!("expected KEY=VALUE, got `{input}`"))
}
