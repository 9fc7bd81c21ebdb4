use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use torznab_notify::config::{Config, DetailMode};
use torznab_notify::enricher::{AttributeEnricher, Enricher, PageAccess, PageEnricher};
use torznab_notify::fetcher::FeedFetcher;
use torznab_notify::notifier::TelegramNotifier;
use torznab_notify::scheduler::Scheduler;
use torznab_notify::state::{FileWatermarkStore, WatermarkStore};
use torznab_notify::sync::{CycleOutcome, FeedSync};

#[derive(Parser)]
#[command(name = "torznab-notify")]
#[command(about = "Posts new torznab feed releases to a Telegram chat", long_about = None)]
struct Cli {
    /// Overrides STATE_FILE
    #[arg(long, global = true)]
    state_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the feed on the configured interval
    Run {
        /// Also check once right away instead of waiting for the first tick
        #[arg(long)]
        now: bool,
    },
    /// Run a single feed check and exit
    Once,
    /// Show or edit the stored watermark
    Watermark {
        #[arg(long, conflicts_with = "clear")]
        set: Option<String>,
        #[arg(long)]
        clear: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run { now: false }) {
        Commands::Watermark { set, clear } => {
            // Only the state file is needed here, so don't demand the full config
            let path = cli.state_file.unwrap_or_else(Config::state_file_from_env);
            let store = FileWatermarkStore::new(path);

            if let Some(guid) = set {
                store.save(&guid)?;
                println!("Watermark set to {}", guid);
            } else if clear {
                store.clear()?;
                println!("Watermark cleared");
            } else {
                match store.load() {
                    Some(guid) => println!("{}", guid),
                    None => println!("No watermark stored ({})", store.path().display()),
                }
            }
        }
        Commands::Once => {
            let config = load_config(cli.state_file)?;
            let sync = build_sync(&config)?;
            match sync.run_cycle().await.context("Feed check failed")? {
                CycleOutcome::Delivered(report) => println!(
                    "Delivered {} item(s), {} rejected, watermark now {}",
                    report.delivered, report.rejected, report.watermark
                ),
                CycleOutcome::UpToDate => println!("No new items"),
                CycleOutcome::Skipped => {}
            }
        }
        Commands::Run { now } => {
            let config = load_config(cli.state_file)?;
            let sync = Arc::new(build_sync(&config)?);

            if now {
                sync.tick().await;
            }

            let scheduler = Scheduler::new(Arc::clone(&sync), config.poll_interval);
            tokio::select! {
                _ = scheduler.run() => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutting down");
                }
            }
        }
    }

    Ok(())
}

fn load_config(state_file: Option<PathBuf>) -> Result<Config> {
    let mut config = Config::from_env().context("Invalid configuration")?;
    if let Some(path) = state_file {
        config.state_file = path;
    }
    Ok(config)
}

/// Wires the components described by `config` into a FeedSync
fn build_sync(config: &Config) -> Result<FeedSync> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("torznab-notify/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;

    let enricher: Box<dyn Enricher> = match &config.detail_mode {
        DetailMode::Solver(endpoint) => Box::new(PageEnricher::new(
            client.clone(),
            PageAccess::Solver {
                endpoint: endpoint.clone(),
            },
        )),
        DetailMode::Direct => Box::new(PageEnricher::new(client.clone(), PageAccess::Direct)),
        DetailMode::FeedAttributes => Box::new(AttributeEnricher),
    };
    tracing::info!(mode = ?config.detail_mode, "Configured feed sync");

    Ok(FeedSync::new(
        Box::new(FeedFetcher::new(client.clone(), config.feed_url.clone())),
        enricher,
        Box::new(TelegramNotifier::new(
            client,
            config.telegram_api_url.clone(),
            config.telegram_bot_token.clone(),
            config.telegram_chat_id.clone(),
        )),
        Box::new(FileWatermarkStore::new(config.state_file.clone())),
    ))
}
