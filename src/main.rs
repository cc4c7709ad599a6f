use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use epicfree::broadcast::BroadcastEvent;
use epicfree::catalog::{CatalogProvider, CatalogSource, PromotionCache};
use epicfree::config::Config;
use epicfree::scheduler::{current_games_digest, upcoming_games_digest};
use epicfree::service::NotifierService;

#[derive(Parser)]
#[command(
    name = "epicfree",
    version,
    about = "Epic Games Store free-game notifier with a throttled broadcast dispatcher",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML config file (defaults to EPICFREE_* environment variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the config file
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the notifier with its recurring check until Ctrl-C
    Run {
        /// Enable the recurring check regardless of config
        #[arg(long)]
        auto_check: bool,

        /// Override the check interval in hours (1-24)
        #[arg(long)]
        interval: Option<u32>,
    },

    /// Print current and upcoming free games
    Check {
        /// Print the snapshot as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Query every catalog endpoint and report what it returns
    Probe {
        /// Print the results as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Send one message to every live recipient
    Broadcast {
        /// Message text (HTML), used as caption when an image is given
        #[arg(short, long)]
        text: String,

        /// Image URL or Telegram file id
        #[arg(short, long)]
        image: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    if let Some(format) = &cli.log_format {
        config.logging.format = format.clone();
    }
    config.validate().context("Invalid configuration")?;

    // Initialize tracing/logging
    setup_tracing(&config.logging.format, &config.logging.level, cli.verbose)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "epicfree starting");

    match cli.command {
        Commands::Run {
            auto_check,
            interval,
        } => {
            if auto_check {
                config.scheduler.enabled = true;
            }
            if let Some(interval) = interval {
                config.scheduler.interval_hours = interval;
            }
            tracing::info!(
                auto_check = config.scheduler.enabled,
                interval_hours = config.scheduler.interval_hours,
                "Starting run command"
            );
            run(&config).await?;
        }

        Commands::Check { json } => {
            tracing::info!(json, "Starting check command");
            check(&config, json).await?;
        }

        Commands::Probe { json } => {
            tracing::info!(json, "Starting probe command");
            probe(&config, json).await?;
        }

        Commands::Broadcast { text, image } => {
            tracing::info!(with_image = image.is_some(), "Starting broadcast command");
            broadcast(&config, text, image).await?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            tracing_subscriber::EnvFilter::new("epicfree=debug,info")
        } else {
            tracing_subscriber::EnvFilter::new(format!("epicfree={level},warn"))
        }
    });

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

async fn run(config: &Config) -> Result<()> {
    let service = NotifierService::from_config(config)?;
    service
        .start(config)
        .await
        .context("Failed to configure the recurring check")?;

    println!("{}", service.status().await.display());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    tracing::info!("Shutdown signal received");
    service.shutdown().await;
    Ok(())
}

async fn check(config: &Config, json: bool) -> Result<()> {
    let source: Arc<dyn CatalogProvider> = Arc::new(CatalogSource::from_config(&config.catalog)?);
    let cache = PromotionCache::from_config(source, &config.cache);
    let snapshot = cache.get().await;

    if json {
        println!("{}", serde_json::to_string_pretty(snapshot.as_ref())?);
        return Ok(());
    }

    if snapshot.degraded {
        eprintln!("Catalog unavailable: {}", cache.status().await.last_error.unwrap_or_default());
        return Ok(());
    }

    println!("{}\n", current_games_digest(&snapshot.current_games));
    println!("{}", upcoming_games_digest(&snapshot.upcoming_games));
    Ok(())
}

async fn probe(config: &Config, json: bool) -> Result<()> {
    let source = CatalogSource::from_config(&config.catalog)?;
    let probes = source.probe().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&probes)?);
        return Ok(());
    }

    println!("Catalog Endpoints");
    println!("{:-<40}", "");
    for probe in &probes {
        match (&probe.element_count, &probe.error) {
            (Some(count), _) => println!(
                "OK    {} ({count} elements, {}ms)",
                probe.endpoint, probe.elapsed_ms
            ),
            (None, Some(error)) => println!(
                "FAIL  {} ({error}, {}ms)",
                probe.endpoint, probe.elapsed_ms
            ),
            (None, None) => println!("FAIL  {}", probe.endpoint),
        }
    }

    Ok(())
}

async fn broadcast(config: &Config, text: String, image: Option<String>) -> Result<()> {
    let service = NotifierService::from_config(config)?;
    let mut events = service.subscribe_broadcasts();

    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                BroadcastEvent::Started { total, .. } => {
                    println!("Broadcasting to {total} recipients...");
                }
                BroadcastEvent::Progress(stats) => {
                    println!(
                        "  {}% ({} sent, {} failed, {} blocked)",
                        stats.progress_percent(),
                        stats.sent,
                        stats.failed,
                        stats.blocked
                    );
                }
                BroadcastEvent::Completed(_) => break,
            }
        }
    });

    let result = match image {
        Some(image) => service.broadcast_image(image, text).await,
        None => service.broadcast_text(text).await,
    };
    let stats = result.context("Broadcast failed")?;

    let _ = printer.await;
    println!("{}", stats.display());
    Ok(())
}
