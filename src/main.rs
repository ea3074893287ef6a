//! Policy-Crawler main entry point
//!
//! This is the command-line interface for the policy crawler.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use policy_crawler::config::{load_or_default, to_toml_string, validate, Config};
use policy_crawler::crawler::Coordinator;
use policy_crawler::model::Category;
use policy_crawler::output::print_summary;
use policy_crawler::state::{CrawlState, Progress, StopHandle};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Policy-Crawler: a resilient crawler for paginated policy listings
///
/// Lists policy records category by category, fetches each record's detail
/// and attachments, and writes JSON and markdown documents for retrieval.
#[derive(Parser, Debug)]
#[command(name = "policy-crawler")]
#[command(version = "1.0.0")]
#[command(about = "A resilient policy document crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults are used if it is missing)
    #[arg(short, long, value_name = "CONFIG", default_value = "crawler.toml")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl every policy of the selected categories
    Batch {
        /// Comma separated category codes (1, 2, 3)
        #[arg(long, value_name = "CODES")]
        categories: Option<String>,

        /// Keep only the first N policies of each category
        #[arg(long, value_name = "N")]
        limit: Option<usize>,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Crawl the first policy of one category
    Crawl {
        /// Category code (1, 2, 3)
        #[arg(long, default_value_t = 1)]
        category: u8,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Validate and print the effective configuration
    Config,
}

/// Settings that override the configuration file
#[derive(Args, Debug)]
struct Overrides {
    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Route requests through proxies from the provider
    #[arg(long)]
    proxy: bool,

    /// Proxy provider endpoint (implies --proxy)
    #[arg(long, value_name = "URL")]
    proxy_url: Option<String>,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(output) = self.output {
            config.output.output_dir = output;
        }
        if self.proxy || self.proxy_url.is_some() {
            config.proxy.enabled = true;
        }
        if let Some(url) = self.proxy_url {
            config.proxy.provider_url = Some(url);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_or_default(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    match &config_hash {
        Some(hash) => tracing::info!("Configuration loaded successfully (hash: {})", hash),
        None => tracing::info!("No configuration file found, using defaults"),
    }

    match cli.command {
        Command::Batch {
            categories,
            limit,
            overrides,
        } => {
            overrides.apply(&mut config);
            if let Some(codes) = categories {
                config.crawl.categories = Category::parse_list(&codes)?;
            }
            if limit.is_some() {
                config.crawl.max_records_per_category = limit;
            }
            validate(&config).context("invalid configuration")?;
            handle_batch(config, cli.quiet).await
        }
        Command::Crawl {
            category,
            overrides,
        } => {
            overrides.apply(&mut config);
            let category = Category::try_from(category)?;
            validate(&config).context("invalid configuration")?;
            handle_single(config, category, cli.quiet).await
        }
        Command::Config => handle_show_config(&config, config_hash.as_deref()),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("policy_crawler=info,warn"),
            1 => EnvFilter::new("policy_crawler=debug,info"),
            2 => EnvFilter::new("policy_crawler=trace,debug"),
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

/// Handles the `config` command: shows the effective configuration
fn handle_show_config(config: &Config, hash: Option<&str>) -> anyhow::Result<()> {
    println!("=== Policy-Crawler Configuration ===\n");
    match hash {
        Some(hash) => println!("# hash: {}\n", hash),
        None => println!("# built-in defaults\n"),
    }
    println!("{}", to_toml_string(config)?);

    let categories: Vec<String> = config.crawl.categories.iter().map(|c| c.to_string()).collect();
    println!("✓ Configuration is valid");
    println!("✓ Would crawl: {}", categories.join(", "));
    Ok(())
}

/// Handles the `batch` command: crawls every configured category
async fn handle_batch(config: Config, quiet: bool) -> anyhow::Result<()> {
    tracing::info!(
        "Categories: {:?}, output: {}",
        config.crawl.categories,
        config.output.output_dir.display()
    );

    let mut coordinator = Coordinator::new(config).context("failed to set up the crawler")?;
    prepare(&mut coordinator, quiet);

    let progress = coordinator.run().await.context("crawl aborted")?;
    print_summary(&progress);
    Ok(())
}

/// Handles the `crawl` command: crawls the first policy of one category
async fn handle_single(config: Config, category: Category, quiet: bool) -> anyhow::Result<()> {
    tracing::info!("Crawling the first policy of {}", category);

    let mut coordinator = Coordinator::new(config).context("failed to set up the crawler")?;
    prepare(&mut coordinator, quiet);

    let progress = coordinator
        .run_single(category)
        .await
        .context("crawl aborted")?;
    print_summary(&progress);
    Ok(())
}

/// Wires Ctrl-C to the stop handle and installs the progress printer
fn prepare(coordinator: &mut Coordinator, quiet: bool) {
    spawn_ctrl_c_handler(coordinator.stop_handle());
    if !quiet {
        coordinator.add_observer(Arc::new(ProgressPrinter::default()));
    }
}

fn spawn_ctrl_c_handler(stop: StopHandle) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => stop.request_stop(),
            Err(e) => tracing::warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });
}

/// Prints one line per finished policy
#[derive(Default)]
struct ProgressPrinter {
    last_processed: AtomicUsize,
}

impl policy_crawler::state::ProgressObserver for ProgressPrinter {
    fn on_progress(&self, progress: &Progress) {
        let processed = progress.processed();
        if processed == 0 || self.last_processed.swap(processed, Ordering::Relaxed) == processed {
            return;
        }
        if matches!(progress.state, CrawlState::Crawling { .. }) {
            println!(
                "[{}/{}] {:.1}% done, {} ok, {} failed - {}",
                processed,
                progress.total,
                progress.progress_percentage(),
                progress.completed,
                progress.failed,
                progress.current_title
            );
        }
    }
}
