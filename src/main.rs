use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use nodewatch::api::{self, AppState};
use nodewatch::engine::{ConditionManager, ProblemDetector};
use nodewatch::exporters::{Exporter, MetricsExporter, RemoteExporter};
use nodewatch::metrics::MetricsRegistry;
use nodewatch::monitors::{JsonLinesMonitor, Monitor};
use nodewatch::storage::http::HttpBackend;
use nodewatch::storage::memory::InMemoryBackend;
use nodewatch::storage::{NodeStatusBackend, RemoteClient, RemoteStore};
use nodewatch::Config;

#[derive(Parser)]
#[command(name = "nodewatch")]
#[command(about = "Reports node health conditions to the cluster", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent
    Run {
        #[arg(long, help = "Path to a TOML config file")]
        config: Option<PathBuf>,
        #[arg(long, help = "Name of the node to report on")]
        node_name: Option<String>,
        #[arg(long, help = "Cluster API base URL")]
        api_server: Option<String>,
        #[arg(long, help = "Introspection server port")]
        port: Option<u16>,
        #[arg(
            long = "status-input",
            help = "Read JSON status lines from this file or FIFO ('-' for stdin)",
            default_value = "-"
        )]
        status_inputs: Vec<String>,
        #[arg(long, help = "Keep node status in memory instead of writing to the cluster")]
        dry_run: bool,
    },
    /// Load and validate configuration, then print it
    CheckConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            node_name,
            api_server,
            port,
            status_inputs,
            dry_run,
        } => {
            let mut config = Config::load(config.as_deref())?;
            if let Some(node_name) = node_name {
                config.node_name = node_name;
            }
            if let Some(api_server) = api_server {
                config.api_server = api_server;
            }
            if let Some(port) = port {
                config.port = port;
            }
            config.validate()?;
            run(config, status_inputs, dry_run).await?
        }
        Commands::CheckConfig { config } => {
            let config = Config::load(config.as_deref())?;
            config.validate()?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

/// Stdin statuses without a source are attributed to `stdin_source`.
async fn open_monitors(inputs: &[String], stdin_source: &str) -> Result<Vec<Box<dyn Monitor>>> {
    let mut monitors: Vec<Box<dyn Monitor>> = Vec::new();
    for input in inputs {
        let monitor = if input == "-" {
            JsonLinesMonitor::new(stdin_source, Box::new(BufReader::new(tokio::io::stdin())))
        } else {
            let file = tokio::fs::File::open(input)
                .await
                .with_context(|| format!("failed to open status input {}", input))?;
            JsonLinesMonitor::new(input.clone(), Box::new(BufReader::new(file)))
        };
        monitors.push(Box::new(monitor));
    }
    Ok(monitors)
}

async fn run(config: Config, status_inputs: Vec<String>, dry_run: bool) -> Result<()> {
    let backend: Arc<dyn NodeStatusBackend> = if dry_run {
        log::info!("Dry run: node status is kept in memory");
        Arc::new(InMemoryBackend::new(&config.node_name))
    } else {
        Arc::new(HttpBackend::new(
            config.api_server.clone(),
            config.bearer_token.clone(),
        )?)
    };
    let client: Arc<dyn RemoteStore> =
        Arc::new(RemoteClient::new(config.node_name.clone(), backend));
    let metrics = Arc::new(MetricsRegistry::new().context("failed to create metrics registry")?);
    let manager = Arc::new(ConditionManager::new(
        client.clone(),
        metrics.clone(),
        config.condition_manager(),
    ));

    let exporters: Vec<Arc<dyn Exporter>> = vec![
        Arc::new(RemoteExporter::new(client, manager.clone())),
        Arc::new(MetricsExporter::new(metrics.clone())),
    ];
    let monitors = open_monitors(&status_inputs, &config.event_source).await?;
    let detector = ProblemDetector::new(monitors, exporters);

    let shutdown = CancellationToken::new();
    let sync_task = manager.start(shutdown.child_token());
    let server = tokio::spawn(api::serve(
        AppState {
            manager: manager.clone(),
            metrics,
        },
        config.listen_addr(),
        shutdown.child_token(),
    ));

    log::info!("nodewatch reporting for node {}", config.node_name);

    let result = tokio::select! {
        result = detector.run(shutdown.child_token()) => result,
        _ = tokio::signal::ctrl_c() => {
            log::info!("Received Ctrl+C, shutting down");
            Ok(())
        }
    };

    shutdown.cancel();
    sync_task.await?;
    server.await??;
    result
}
