mod display;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vigie_core::colors::PaletteExt;
use vigie_core::output::{get_formatter, OutputFormat, OutputFormatter};
use vigie_core::{
    lint, registry, sources, ConsolidationEngine, Kindness, Partial, ProbeConfig, Selection,
};

use display::{ProbeProgress, ProgressWriterFactory};

#[derive(Parser)]
#[command(name = "vigie")]
#[command(about = "Probe and consolidate a registry of public domain names")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (human or json)
    #[arg(short, long, global = true, default_value = "human")]
    format: String,

    /// Registry CSV file
    #[arg(long, global = true, default_value = "domains.csv")]
    registry: PathBuf,

    /// No colors, and single-line JSON
    #[arg(long, global = true)]
    plain: bool,

    /// More logs: -v for info, -vv for debug (RUST_LOG takes precedence)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge candidate lists into the registry and probe it
    Check(CheckArgs),
    /// Show registry entries whose name matches a regex
    Show {
        /// Regular expression matched against names
        pattern: String,
    },
    /// Rewrite the registry, and the given candidate lists, in registry order
    Sort {
        /// Candidate lists to sort in place
        files: Vec<PathBuf>,
    },
    /// Regenerate the URL list of live domains
    Urls {
        /// Where to write the URL list
        #[arg(short, long, default_value = "urls.txt")]
        output: PathBuf,
    },
    /// Check candidate lists and the registry for consistency
    Lint {
        /// Candidate lists (defaults to every .txt file of --sources)
        files: Vec<PathBuf>,
        /// Directory holding the candidate lists
        #[arg(long, default_value = "sources")]
        sources: PathBuf,
        /// Skip the registry orphan check
        #[arg(long)]
        no_registry: bool,
    },
}

#[derive(Args)]
struct CheckArgs {
    /// Candidate lists (defaults to every .txt file of --sources)
    files: Vec<PathBuf>,

    /// Directory holding the candidate lists
    #[arg(long, default_value = "sources")]
    sources: PathBuf,

    /// Where to write the URL list of live domains
    #[arg(long, default_value = "urls.txt")]
    urls: PathBuf,

    /// At most 10 probes at once
    #[arg(long, conflicts_with_all = ["slower", "slowest"])]
    slow: bool,

    /// At most 5 probes at once
    #[arg(long, conflicts_with = "slowest")]
    slower: bool,

    /// At most 2 probes at once
    #[arg(long)]
    slowest: bool,

    /// Hide the progress bar
    #[arg(short, long)]
    silent: bool,

    /// Probe at most this many domains
    #[arg(long)]
    limit: Option<usize>,

    /// Only probe names containing one of these substrings
    #[arg(long)]
    grep: Vec<String>,

    /// Only probe slice i of n of the registry, e.g. 2/4
    #[arg(long)]
    partial: Option<Partial>,

    /// Only probe names never probed
    #[arg(long)]
    new_only: bool,

    /// Append hosts discovered through redirections to this candidate list
    #[arg(long, value_name = "FILE")]
    record_redirects: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 20)]
    timeout: u64,

    /// Do not follow redirects between a name and its www. variant
    #[arg(long)]
    no_www_alias: bool,

    /// Probe in registry order instead of shuffling
    #[arg(long)]
    no_shuffle: bool,
}

impl CheckArgs {
    fn kindness(&self) -> Kindness {
        if self.slowest {
            Kindness::Slowest
        } else if self.slower {
            Kindness::Slower
        } else if self.slow {
            Kindness::Slow
        } else {
            Kindness::Normal
        }
    }

    fn selection(&self) -> Selection {
        let mut selection = Selection::all()
            .with_grep(self.grep.iter().cloned())
            .with_new_only(self.new_only);
        if let Some(partial) = self.partial {
            selection = selection.with_partial(partial);
        }
        if let Some(limit) = self.limit {
            selection = selection.with_limit(limit);
        }
        selection
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,vigie_core={0},vigie={0}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(ProgressWriterFactory::new())
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match execute_command(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".ko(), e);
            std::process::exit(1);
        }
    }
}

/// Runs one subcommand; `Ok(false)` means it completed but found problems.
async fn execute_command(cli: Cli) -> anyhow::Result<bool> {
    let output_format: OutputFormat = cli.format.parse().unwrap_or_default();
    let formatter = get_formatter(output_format, cli.plain);

    match cli.command {
        Commands::Check(args) => {
            check(args, &cli.registry, formatter.as_ref()).await?;
        }
        Commands::Show { pattern } => {
            let domains = registry::load(&cli.registry)?;
            let found = registry::find(&domains, &pattern)?;
            match output_format {
                OutputFormat::Json if cli.plain => println!("{}", serde_json::to_string(&found)?),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&found)?),
                OutputFormat::Human => {
                    for domain in found {
                        println!("{}", formatter.format_domain(domain));
                    }
                }
            }
        }
        Commands::Sort { files } => {
            let domains = registry::load(&cli.registry)?;
            registry::write(&cli.registry, &domains)?;
            for file in &files {
                if sources::sort_file(file)? {
                    info!(file = %file.display(), "Sorted candidate list");
                }
            }
        }
        Commands::Urls { output } => {
            let domains = registry::load(&cli.registry)?;
            let count = registry::write_urls(&output, &domains)?;
            info!(count, path = %output.display(), "Wrote URL list");
        }
        Commands::Lint {
            files,
            sources: sources_dir,
            no_registry,
        } => {
            let files = candidate_files(files, &sources_dir)?;
            let domains = if no_registry {
                None
            } else {
                Some(registry::load(&cli.registry)?)
            };
            let report = lint::lint_files(&files, domains.as_ref())?;
            println!("{}", formatter.format_lint(&report));
            return Ok(report.is_clean());
        }
    }

    Ok(true)
}

/// Turns the first interrupt into a cancellation request; resolves to true
/// on the second one, when the caller should quit without waiting.
async fn relay_interrupts<F, Fut>(mut interrupt: F, cancel_tx: watch::Sender<bool>) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if interrupt().await.is_err() {
        return false;
    }
    warn!("Interrupted, waiting for probes in flight (interrupt again to quit)");
    let _ = cancel_tx.send(true);
    interrupt().await.is_ok()
}

fn candidate_files(files: Vec<PathBuf>, sources_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if !files.is_empty() {
        return Ok(files);
    }
    let files = sources::list_candidate_files(sources_dir)?;
    if files.is_empty() {
        anyhow::bail!("No candidate list found in {}", sources_dir.display());
    }
    Ok(files)
}

async fn check(
    args: CheckArgs,
    registry_path: &Path,
    formatter: &dyn OutputFormatter,
) -> anyhow::Result<()> {
    let selection = args.selection();
    let config = ProbeConfig::new()
        .with_timeout(Duration::from_secs(args.timeout))
        .with_www_alias(!args.no_www_alias)
        .with_kindness(args.kindness());
    let files = candidate_files(args.files, &args.sources)?;
    let engine = ConsolidationEngine::new(&config)?.with_shuffle(!args.no_shuffle);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let ctrl_c = tokio::spawn(async move {
        if relay_interrupts(tokio::signal::ctrl_c, cancel_tx).await {
            display::clear_progress();
            eprintln!("{}", "Aborted".ko());
            std::process::exit(130);
        }
    });

    let progress = (!args.silent).then(ProbeProgress::new);
    let callback = progress.as_ref().map(ProbeProgress::callback);

    let result = engine
        .run(&files, registry_path, &selection, callback, Some(cancel_rx))
        .await;

    ctrl_c.abort();
    if let Some(progress) = progress {
        progress.finish();
    }
    let report = result?;

    let domains = registry::load(registry_path)?;
    let count = registry::write_urls(&args.urls, &domains)?;
    info!(count, path = %args.urls.display(), "Wrote URL list");

    if let Some(path) = &args.record_redirects {
        let recorded = sources::append_lines(
            path,
            report.discoveries.iter().map(|d| d.to_candidate_line()),
        )?;
        info!(recorded, path = %path.display(), "Recorded redirect targets");
    }

    println!("{}", formatter.format_report(&report));
    Ok(())
}
