//! Dedalo CLI
//!
//! - `dedalo explain`: search a knowledge graph for paths that separate
//!   labeled entities, streaming scored explanations to a file
//! - `dedalo stats`: dictionary and triple counts of a graph file

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dedalo_kg::{load_rdf_file, KnowledgeGraph, PrefixMap};
use dedalo_search::{
    profiler, AnyPruner, Blacklist, Heuristic, LabelOptions, LabelSet, Outcome, PrunerConfig,
    Search, SearchConfig,
};

mod output;

use output::{OutputFormat, OutputRow};

#[derive(Parser)]
#[command(name = "dedalo")]
#[command(
    author,
    version,
    about = "Dedalo: explain labeled entities with knowledge-graph paths"
)]
struct Cli {
    /// Debug-level logging (overridden by DEDALO_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for explanations and write them to OUTPUT as they are found.
    Explain(ExplainArgs),

    /// Print term and triple counts of a graph file.
    Stats {
        /// N-Triples (.nt) or Turtle (.ttl) file
        graph: PathBuf,
    },
}

#[derive(Args)]
struct ExplainArgs {
    /// N-Triples (.nt) or Turtle (.ttl) file
    graph: PathBuf,
    /// Label file with rows `group,uri`
    labels: PathBuf,
    /// Output file (must not exist)
    output: PathBuf,

    /// Path selection heuristic: shortest-path-first (spf, bfs), longest-path-first (lpf), entropy
    #[arg(long, default_value = "bfs")]
    heuristic: Heuristic,

    /// Group id of the positive class (default: group of the first row)
    #[arg(long = "groupid")]
    group_id: Option<String>,

    /// Keep the first N examples per class (0 = all)
    #[arg(short, long, default_value_t = 0)]
    truncate: usize,

    /// Cut both classes down to the smaller one
    #[arg(short, long)]
    balance: bool,

    /// Explore every path up to this length, then stop (0 = off)
    #[arg(short, long, default_value_t = 0)]
    complete: usize,

    /// Wall-clock budget in seconds
    #[arg(long)]
    runtime: Option<f64>,

    /// Maximum number of rounds
    #[arg(long)]
    rounds: Option<usize>,

    /// Approximate byte budget for path indices and cached reachability
    #[arg(long, default_value_t = 1 << 35)]
    memlimit: u64,

    /// Prefix file (`abbrev prefix` per line) for shortening output URIs
    #[arg(long)]
    prefix: Option<PathBuf>,

    /// Predicates to never follow, one per line
    #[arg(long)]
    blacklist: Option<PathBuf>,

    /// Pruning level: 0 none, 1 per-path watermark, 2 plus global best
    #[arg(short, long, default_value_t = 0)]
    prune: u8,

    /// Prune only paths that cannot strictly beat the best score
    #[arg(long)]
    strict_prune: bool,

    /// Only write explanations scoring above this
    #[arg(long, default_value_t = -1.0, allow_hyphen_values = true)]
    minimum_score: f64,

    /// Maximum in-memory reachability entries before spilling to disk
    #[arg(long)]
    cache_size: Option<usize>,

    /// Directory for the reachability spill directory
    #[arg(long, default_value = ".")]
    spill_dir: PathBuf,

    /// Log memory usage every round
    #[arg(long)]
    mem_profile: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Column delimiter of the label file
    #[arg(long, default_value_t = ',')]
    delimiter: char,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Explain(args) => cmd_explain(args),
        Commands::Stats { graph } => cmd_stats(graph),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "dedalo=debug" } else { "dedalo=info" };
    let filter = EnvFilter::try_from_env("DEDALO_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// First SIGINT/SIGTERM cancels the search. A second one removes the spill
/// directory and exits without waiting for the current round.
fn spawn_signal_listener(cancel: Arc<AtomicBool>, spill_dir: PathBuf) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| anyhow!("failed to register SIGINT/SIGTERM: {e}"))?;
    thread::spawn(move || {
        for sig in signals.forever() {
            if !cancel.swap(true, Ordering::SeqCst) {
                warn!(signal = sig, "interrupted, finishing current round");
                continue;
            }
            if let Err(e) = fs::remove_dir_all(&spill_dir) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(dir = %spill_dir.display(), error = %e, "failed to remove spill directory");
                }
            }
            process::exit(128 + sig);
        }
    });
    Ok(())
}

fn search_config(args: &ExplainArgs) -> Result<SearchConfig> {
    let runtime = args
        .runtime
        .map(Duration::try_from_secs_f64)
        .transpose()
        .context("--runtime must be a non-negative number of seconds")?;
    let memlimit = usize::try_from(args.memlimit).context("--memlimit does not fit in memory")?;
    Ok(SearchConfig {
        heuristic: args.heuristic,
        runtime,
        rounds: args.rounds,
        memlimit: Some(memlimit),
        minimum_score: args.minimum_score,
        complete: args.complete,
        cache_capacity: args.cache_size,
        spill_parent: args.spill_dir.clone(),
    })
}

fn cmd_explain(args: ExplainArgs) -> Result<()> {
    if args.output.exists() {
        bail!("output file {} already exists", args.output.display());
    }
    let config = search_config(&args)?;

    let prefixes = match &args.prefix {
        Some(path) => PrefixMap::from_file(path)
            .with_context(|| format!("failed to load prefixes from {}", path.display()))?,
        None => PrefixMap::new(),
    };
    let blacklist = match &args.blacklist {
        Some(path) => Blacklist::from_file(path, &prefixes)
            .with_context(|| format!("failed to load blacklist from {}", path.display()))?,
        None => Blacklist::new(),
    };
    let graph = load_rdf_file(&args.graph)
        .with_context(|| format!("failed to load graph {}", args.graph.display()))?;
    let label_options = LabelOptions {
        group_id: args.group_id.clone(),
        delimiter: args.delimiter,
        truncate: args.truncate,
        balance: args.balance,
    };
    let labels = LabelSet::from_csv(&args.labels, &graph, &label_options)
        .with_context(|| format!("failed to load labels from {}", args.labels.display()))?;

    let pruner = AnyPruner::from_configs(&PrunerConfig::for_level(args.prune, args.strict_prune));
    let mut search = Search::new(
        &graph,
        &labels,
        &blacklist,
        Box::new(pruner),
        profiler(args.mem_profile),
        config,
    )?;
    spawn_signal_listener(search.cancel_handle(), search.spill_dir().to_path_buf())?;

    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&args.output)
        .with_context(|| format!("failed to create {}", args.output.display()))?;
    let mut out = BufWriter::new(file);

    let started = Instant::now();
    let mut written = 0usize;
    for found in search.by_ref() {
        OutputRow::new(&found, &graph, &prefixes).write_to(&mut out, args.format)?;
        out.flush()?;
        written += 1;
    }
    out.flush()?;

    if let Some(err) = search.take_error() {
        return Err(anyhow::Error::new(err).context("search failed"));
    }

    let stats = search.stats();
    info!(
        rounds = stats.rounds,
        paths = stats.paths_interned,
        created = stats.explanations_created,
        cache_hits = stats.cache.hits,
        cache_loads = stats.cache.loads,
        evictions = stats.cache.evictions,
        "search statistics"
    );

    let status = match search.outcome() {
        Some(Outcome::Done(reason)) => format!("done ({reason:?})").green().bold(),
        Some(Outcome::Aborted(reason)) => format!("aborted ({reason:?})").yellow().bold(),
        None => "stopped".yellow().bold(),
    };
    eprintln!(
        "{} {} explanations in {} rounds ({:.1}s) -> {}",
        status,
        written,
        stats.rounds,
        started.elapsed().as_secs_f64(),
        args.output.display()
    );
    Ok(())
}

fn cmd_stats(path: PathBuf) -> Result<()> {
    let graph =
        load_rdf_file(&path).with_context(|| format!("failed to load graph {}", path.display()))?;
    println!("{} {}", "graph".bold(), path.display());
    println!("  triples:    {}", graph.triple_count());
    println!("  subjects:   {}", graph.subject_count());
    println!("  predicates: {}", graph.predicate_count());
    println!("  objects:    {}", graph.object_count());
    Ok(())
}
