use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use getpapers::config::{find_config_file, load_config};
use getpapers::harvest::{HarvestOutcome, Harvester};
use getpapers::models::{AssetKind, HarvestQuery};
use getpapers::sources::SourceRegistry;
use getpapers::ui::{self, format_number, Status};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// getpapers - harvest search results and fulltext from academic literature APIs
#[derive(Parser, Debug)]
#[command(name = "getpapers")]
#[command(version = getpapers::VERSION)]
#[command(about = "Get metadata, fulltexts or fulltext URLs of papers matching a search query", long_about = None)]
struct Cli {
    /// Search query (see the documentation of the chosen API for its syntax)
    #[arg(short, long)]
    query: String,

    /// Output directory (created if it does not exist)
    #[arg(short, long = "outdir", value_name = "DIR")]
    outdir: PathBuf,

    /// API to search
    #[arg(long, value_enum, default_value_t = Api::Eupmc)]
    api: Api,

    /// Download fulltext XML if available
    #[arg(short = 'x', long)]
    xml: bool,

    /// Download fulltext PDF if available
    #[arg(short = 'p', long)]
    pdf: bool,

    /// Download supplementary files if available
    #[arg(short = 's', long)]
    supp: bool,

    /// Download text-mined terms if available
    #[arg(short = 't', long)]
    minedterms: bool,

    /// Search all papers, not just open access
    #[arg(short = 'a', long)]
    all: bool,

    /// Report how many results match the query, but don't download anything
    #[arg(short = 'n', long)]
    noexecute: bool,

    /// Limit the number of hits and downloads
    #[arg(short = 'k', long, value_name = "N")]
    limit: Option<usize>,

    /// Reuse the results file in the output directory and go straight to downloads
    #[arg(short = 'r', long)]
    restart: bool,

    /// Filter by key:value pairs separated by commas (CrossRef only)
    #[arg(short = 'f', long, value_name = "FILTERS")]
    filter: Option<String>,

    /// Amount of information to log
    #[arg(short = 'l', long, value_enum, default_value_t = LogLevel::Info)]
    loglevel: LogLevel,

    /// Also write JSON log lines to this file
    #[arg(long, value_name = "PATH")]
    logfile: Option<PathBuf>,

    /// Configuration file path
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Available APIs
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Api {
    #[value(name = "eupmc")]
    Eupmc,
    #[value(name = "arxiv")]
    Arxiv,
    #[value(name = "crossref")]
    Crossref,
    #[value(name = "ieee")]
    Ieee,
}

impl Api {
    fn id(self) -> &'static str {
        match self {
            Api::Eupmc => "eupmc",
            Api::Arxiv => "arxiv",
            Api::Crossref => "crossref",
            Api::Ieee => "ieee",
        }
    }
}

/// Log levels accepted by `--loglevel`
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogLevel {
    Silent,
    Error,
    Warn,
    Info,
    #[value(alias = "verbose")]
    Debug,
    Trace,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Silent => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn init_tracing(cli: &Cli) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG")
            .unwrap_or_else(|_| format!("getpapers={}", cli.loglevel.directive())),
    );

    let json_layer = match &cli.logfile {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::sync::Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(json_layer)
        .init();
    Ok(())
}

fn build_query(cli: &Cli) -> HarvestQuery {
    let mut query = HarvestQuery::new(&cli.query)
        .all(cli.all)
        .no_execute(cli.noexecute)
        .restart(cli.restart);
    if let Some(limit) = cli.limit {
        query = query.hit_limit(limit);
    }
    if let Some(filter) = &cli.filter {
        if cli.api != Api::Crossref {
            tracing::warn!("--filter is only used by the crossref API and will be ignored");
        }
        query = query.filters_from_str(filter);
    }
    for (wanted, kind) in [
        (cli.xml, AssetKind::Xml),
        (cli.pdf, AssetKind::Pdf),
        (cli.supp, AssetKind::Supplementary),
        (cli.minedterms, AssetKind::MinedTerms),
    ] {
        if wanted {
            query = query.asset(kind);
        }
    }
    query
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().or_else(find_config_file);
    if let Some(path) = &config_path {
        tracing::info!("Using config file: {}", path.display());
    }
    let config = load_config(config_path.as_deref())?;

    tokio::fs::create_dir_all(&cli.outdir)
        .await
        .with_context(|| format!("cannot create output directory {}", cli.outdir.display()))?;

    let client = config.http_client()?;
    let registry = SourceRegistry::from_config(&client, &config);
    let source = Arc::clone(registry.get_required(cli.api.id())?);

    let query = build_query(&cli);
    let quiet = cli.loglevel == LogLevel::Silent;
    let harvester = Harvester::new(source, Arc::new(client), &cli.outdir)
        .with_config(&config)
        .with_progress(ui::progress_visible(quiet));

    match harvester.run(&query).await? {
        HarvestOutcome::NoHits => {
            if !quiet {
                ui::print_status(Status::Info, "No results to download");
            }
        }
        HarvestOutcome::CountOnly(total) => {
            let total = usize::try_from(total).unwrap_or(usize::MAX);
            ui::print_status(
                Status::Search,
                &format!("Found {} results", format_number(total)),
            );
        }
        HarvestOutcome::Completed { results, partial } => {
            if !quiet {
                let (status, note) = if partial {
                    (Status::Warning, " (metadata collection did not finish)")
                } else {
                    (Status::Success, "")
                };
                ui::print_status(
                    status,
                    &format!(
                        "Done: {} results in {}{}",
                        format_number(results),
                        cli.outdir.display(),
                        note
                    ),
                );
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    ExitCode::SUCCESS
                }
                _ => ExitCode::FAILURE,
            };
        }
    };

    if let Err(e) = init_tracing(&cli) {
        eprintln!("getpapers: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
