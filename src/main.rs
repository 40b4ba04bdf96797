use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use marketplace_watcher::config::Config;
use marketplace_watcher::constants;
use marketplace_watcher::dispatcher::Dispatcher;
use marketplace_watcher::extractor::MarketplaceExtractor;
use marketplace_watcher::logging;
use marketplace_watcher::notifier::WebhookNotifier;
use marketplace_watcher::rate_limiter::RateLimiter;
use marketplace_watcher::session::ProxiedSessionProvider;
use marketplace_watcher::store::ListingStore;
use marketplace_watcher::watcher::{shutdown_channel, CycleOutcome, Watcher};

#[derive(Parser)]
#[command(name = "marketplace_watcher")]
#[command(about = "Marketplace free-listings watcher")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the marketplace until interrupted
    Watch,
    /// Run a single poll cycle, then exit
    Tick,
}

fn build_watcher(config: &Config) -> Result<Watcher, Box<dyn std::error::Error>> {
    let limiter = RateLimiter::new(
        config.rate_limit.capacity,
        config.rate_limit.refill_tokens,
        config.rate_limit.refill_interval,
        config.rate_limit.queue_depth,
    );
    let notifier = Arc::new(WebhookNotifier::new(&config.webhook_url));
    let dispatcher = Dispatcher::new(limiter, notifier);

    let store = ListingStore::new(&config.store_path, config.retention_secs);

    let extractor = MarketplaceExtractor::new(
        &config.target_url,
        &config.listing_selector,
        constants::EXTRACTION_ATTEMPTS,
        Duration::from_secs(constants::EXTRACTION_RETRY_DELAY_SECS),
    )?;
    let sessions = ProxiedSessionProvider::new(config.proxy.clone(), constants::BROWSER_USER_AGENT);

    Ok(Watcher::new(
        Box::new(sessions),
        Box::new(extractor),
        store,
        dispatcher,
        config.poll_interval,
        Duration::from_secs(constants::SESSION_RETRY_DELAY_SECS),
    ))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let mut watcher = build_watcher(&config)?;

    let (shutdown_tx, shutdown) = shutdown_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    match cli.command.unwrap_or(Commands::Watch) {
        Commands::Watch => {
            println!("👀 Watching {} ...", config.target_url);
            if let Err(e) = watcher.run(shutdown).await {
                error!("Watcher terminated: {}", e);
                return Err(e.into());
            }
            println!("✅ Watcher stopped cleanly");
        }
        Commands::Tick => {
            println!("🔄 Running a single poll cycle...");
            match watcher.run_once(shutdown).await? {
                CycleOutcome::Processed(stats) => {
                    println!("\n📊 Cycle results:");
                    println!("   Extracted: {}", stats.extracted);
                    println!("   Announced: {}", stats.announced);
                    println!("   Duplicates: {}", stats.duplicates);
                    println!("   Delivery failures: {}", stats.delivery_failures.len());
                    for failure in &stats.delivery_failures {
                        println!("   - {failure}");
                    }
                }
                CycleOutcome::EmptyExtraction => {
                    println!("⚠️  No listings found; the session would be recycled");
                }
                CycleOutcome::Interrupted => {
                    println!("⚠️  Interrupted before the cycle finished");
                }
            }
        }
    }

    Ok(())
}
