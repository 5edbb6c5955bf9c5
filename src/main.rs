//! composition-watcher - keeps composition resource trees published
//!
//! Watches CompositionReference objects, builds the status tree of each
//! referenced composition and pushes it to the resource tree service.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use composition_watcher::cli::{self, ConfigSubcommand};
use composition_watcher::config::{Config, ConfigLoader};
use composition_watcher::controller::{self, Reconciler};
use composition_watcher::kube::{KubeClusterReader, ResourceResolver, create_client};
use composition_watcher::{HttpPublisher, KubeEventSource, StatusTreeBuilder, WatchRegistry};

#[derive(Parser, Debug)]
#[command(name = "composition-watcher")]
#[command(about = "Publishes the managed-resource status tree of compositions", long_about = None)]
struct Args {
    /// Path to the config file
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short = 'd', global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the watcher (default)
    Run,
    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Some(Command::Config { subcommand }) => {
            cli::handle_config_command(subcommand, args.config.as_deref())
        }
        Some(Command::Version) => {
            cli::display_version();
            Ok(())
        }
        Some(Command::Run) | None => {
            let config =
                ConfigLoader::load(args.config.as_deref()).context("Failed to load configuration")?;
            ConfigLoader::validate(&config).context("Invalid configuration")?;
            cli::init_logging(&config.log_level, args.debug);
            run(config).await
        }
    }
}

async fn run(config: Config) -> Result<()> {
    let poll_interval = config.poll_interval()?;
    let request_timeout = config.request_timeout()?;

    let client = create_client().await?;

    let resolver = ResourceResolver::new(Arc::new(KubeClusterReader::new(client.clone())));
    let builder = StatusTreeBuilder::new(resolver.clone());
    let publisher = Arc::new(
        HttpPublisher::new(config.resource_tree_handler_url.as_deref(), request_timeout)
            .context("Failed to create resource tree publisher")?,
    );
    let registry = WatchRegistry::new(
        Arc::new(KubeEventSource::new(client.clone())),
        builder.clone(),
        publisher.clone(),
    );
    let reconciler = Reconciler::new(resolver, builder, publisher, registry, poll_interval);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        signal.cancel();
    });

    let events =
        controller::composition_reference_events(client, config.watch_namespace.as_deref());
    reconciler.run(events, shutdown).await;

    Ok(())
}
