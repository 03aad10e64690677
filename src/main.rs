//! hostcrawl main entry point
//!
//! This is the command-line interface for the hostcrawl crawler backend.

use anyhow::{Context, Result};
use clap::Parser;
use hostcrawl::config::{load_config_with_hash, validate, validate_host_pattern, Config, HostEntry};
use hostcrawl::crawler::run_crawl;
use hostcrawl::url::{host_key, matches_wildcard};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use url::Url;

/// hostcrawl: a polite, resumable host-scoped crawler
///
/// hostcrawl fetches pages from a fixed set of hosts under a page budget,
/// respects robots.txt, deduplicates content by hash and records every
/// page state in a SQLite database so an interrupted crawl can resume.
#[derive(Parser, Debug)]
#[command(name = "hostcrawl")]
#[command(version)]
#[command(about = "A polite, resumable host-scoped crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Override the total page budget
    #[arg(long, value_name = "N", allow_hyphen_values = true)]
    budget: Option<i64>,

    /// Only crawl hosts matching this pattern (e.g. "example.com" or "*.example.com")
    #[arg(long, value_name = "PATTERN")]
    host_filter: Option<String>,

    /// Add a host to crawl, given by any URL on it (repeatable)
    #[arg(long = "seed", value_name = "URL")]
    seeds: Vec<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Show statistics from the database and exit
    #[arg(long)]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.stats {
        return handle_stats(&config);
    }

    apply_overrides(&mut config, &cli)?;
    handle_crawl(config).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("hostcrawl=info,warn"),
            1 => EnvFilter::new("hostcrawl=debug,info"),
            2 => EnvFilter::new("hostcrawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Applies --budget, --seed and --host-filter, then re-validates
fn apply_overrides(config: &mut Config, cli: &Cli) -> Result<()> {
    if let Some(budget) = cli.budget {
        tracing::info!("Page budget overridden: {}", budget);
        config.crawler.page_budget = budget;
    }

    for seed in &cli.seeds {
        let url = Url::parse(seed).with_context(|| format!("invalid seed URL {}", seed))?;
        let key = host_key(&url).with_context(|| format!("seed URL {} has no host", seed))?;
        let known = config.hosts.iter().any(|entry| {
            Url::parse(&entry.root)
                .ok()
                .and_then(|root| host_key(&root))
                .as_deref()
                == Some(key.as_str())
        });
        if !known {
            config.hosts.push(HostEntry { root: seed.clone() });
        }
    }

    if let Some(pattern) = &cli.host_filter {
        validate_host_pattern(pattern)?;
        config.hosts.retain(|entry| {
            Url::parse(&entry.root)
                .ok()
                .and_then(|root| host_key(&root))
                .is_some_and(|key| matches_wildcard(pattern, &key))
        });
        tracing::info!("Host filter {} keeps {} hosts", pattern, config.hosts.len());
    }

    validate(config)?;
    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> Result<()> {
    use hostcrawl::output::{load_statistics, print_statistics};
    use hostcrawl::storage::open_existing_storage;
    use std::path::Path;

    println!("Database: {}\n", config.storage.database_path);

    let storage = open_existing_storage(Path::new(&config.storage.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config) -> Result<()> {
    tracing::info!(
        "Hosts: {}, page budget: {}, database: {}",
        config.hosts.len(),
        config.crawler.page_budget,
        config.storage.database_path
    );

    let report = run_crawl(config).await.context("crawl failed")?;

    tracing::info!(
        "Crawl completed: {} results received, {} pages written, {} batches committed, {} failed",
        report.results_received,
        report.pages_written,
        report.committed_batches,
        report.failed_batches
    );

    Ok(())
}
