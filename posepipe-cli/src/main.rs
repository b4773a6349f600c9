// posepipe command line interface
// Runs a pose-tracking pipeline or follows the signal it publishes

mod config;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::AppConfig;
use posepipe_bridge::{BridgeConfig, Publisher, Subscriber};
use posepipe_pipeline::{
    BuildContext, PipelineEditor, StreamDriver, StreamEvent, TransformerRegistry,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "posepipe")]
#[command(about = "Pose tracking pipelines that drive a game over TCP", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a tracking pipeline and publish its signal
    Track {
        /// Configuration file (TOML)
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Address the signal publisher listens on
        #[arg(long, short)]
        listen: Option<String>,
    },

    /// Follow a published signal, as the game does
    Subscribe {
        /// Publisher address
        #[arg(long, default_value = "127.0.0.1:9876")]
        connect: String,
    },

    /// List the registered transformer kinds and their parameters
    Kinds {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Track { config, listen } => track(config, listen).await,
        Commands::Subscribe { connect } => subscribe(connect).await,
        Commands::Kinds { json } => kinds(json),
    }
}

async fn track(config_path: Option<PathBuf>, listen: Option<String>) -> anyhow::Result<()> {
    let mut config = match &config_path {
        Some(path) => AppConfig::load(path)?,
        None => {
            info!("No config file given, running the demo pipeline");
            AppConfig::default()
        }
    };
    if let Some(addr) = listen {
        config.bridge.listen_addr = addr;
    }
    config.validate().map_err(anyhow::Error::msg)?;

    let publisher = Publisher::listen(config.bridge.clone())
        .await
        .with_context(|| format!("Cannot listen on {}", config.bridge.listen_addr))?;

    let registry = Arc::new(TransformerRegistry::with_builtins()?);
    let ctx = BuildContext::new(config.props()).with_publisher(publisher.clone());
    let mut editor = PipelineEditor::new(registry, ctx);
    editor.build(&config.pipeline_spec())?;

    let driver = StreamDriver::new(editor, config.stream.clone())?;
    debug!(
        "Pipeline: {}",
        serde_json::to_string(&driver.describe()?).unwrap_or_default()
    );
    driver.start()?;

    let events = driver.events().clone();
    let mut watcher = tokio::task::spawn_blocking(move || {
        while let Ok(event) = events.recv() {
            if event.is_final() {
                return Some(event);
            }
            debug!("Stream event: {:?}", event);
        }
        None
    });

    let outcome = tokio::select! {
        outcome = &mut watcher => outcome?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping the stream");
            tokio::task::block_in_place(|| driver.stop())?;
            watcher.await?
        }
    };

    tokio::task::block_in_place(|| driver.shutdown());
    info!(
        "Published {} records to {} peers",
        publisher.published_count(),
        publisher.peer_count()
    );
    publisher.shutdown();

    match outcome {
        Some(StreamEvent::Failed { error, passes }) => {
            error!("Stream failed after {} passes", passes);
            Err(error.into())
        }
        Some(StreamEvent::Completed { passes }) => {
            info!("Stream completed after {} passes", passes);
            Ok(())
        }
        Some(StreamEvent::Stopped { passes }) => {
            info!("Stream stopped after {} passes", passes);
            Ok(())
        }
        other => {
            warn!("Stream ended without a final status ({:?})", other);
            Ok(())
        }
    }
}

async fn subscribe(connect: String) -> anyhow::Result<()> {
    let config = BridgeConfig {
        listen_addr: connect.clone(),
        ..BridgeConfig::default()
    };
    let mut subscriber = Subscriber::connect(connect.as_str(), &config)?;
    info!("Following signal from {}", connect);

    loop {
        tokio::select! {
            record = subscriber.recv() => match record {
                Some(record) => info!(
                    sequence = record.sequence,
                    timestamp_ms = record.timestamp_ms,
                    "signal {:.3}",
                    record.value
                ),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let stats = subscriber.stats();
    info!(
        "Received {} records over {} connections ({} stale, {} malformed)",
        stats.received, stats.connections, stats.stale, stats.malformed
    );
    subscriber.shutdown().await;
    Ok(())
}

fn kinds(json: bool) -> anyhow::Result<()> {
    let registry = TransformerRegistry::with_builtins()?;
    let kinds = registry.kinds();

    if json {
        println!("{}", serde_json::to_string_pretty(&kinds)?);
        return Ok(());
    }

    for info in kinds {
        println!("{} ({:?})", info.kind, info.role);
        println!("    {}", info.description);
        for param in &info.parameters {
            let mut line = format!("    - {}: {}", param.name, param.kind);
            if let (Some(min), Some(max)) = (param.min, param.max) {
                line.push_str(&format!(" [{}, {}]", min, max));
            } else if let Some(min) = param.min {
                line.push_str(&format!(" [>= {}]", min));
            }
            if let Some(choices) = param.choices {
                line.push_str(&format!(" one of {}", choices.join("|")));
            }
            println!("{}  {}", line, param.description);
        }
    }
    Ok(())
}
