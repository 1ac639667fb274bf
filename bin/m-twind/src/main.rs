//! ---
//! mtwin_section: "01-core-runtime"
//! mtwin_subsection: "binary"
//! mtwin_type: "source"
//! mtwin_scope: "code"
//! mtwin_description: "Binary entrypoint for the M-TWIN daemon."
//! mtwin_version: "v0.1.0-prealpha"
//! mtwin_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::signal;
use tracing::{info, warn};

use m_twin_api::{spawn_api_server, ApiState};
use m_twin_bridge::{CommunicationBridge, InMemoryBridge, OpcUaBridge};
use m_twin_common::config::{AppConfig, BridgeKind, SessionMode};
use m_twin_common::logging::init_tracing;
use m_twin_graph::{compute_order, DependencyGraph};
use m_twin_model::ModelSnapshot;
use m_twin_session::SessionManager;

const CONFIG_CANDIDATES: &[&str] = &["configs/m-twind.toml", "m-twind.toml"];

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "M-TWIN daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_enum, help = "Override the default session mode")]
    mode: Option<CliMode>,

    #[arg(
        long,
        value_name = "FILE",
        help = "Model snapshot to load at startup, overriding the configured path"
    )]
    model: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMode {
    Pure,
    Hil,
}

impl From<CliMode> for SessionMode {
    fn from(value: CliMode) -> Self {
        match value {
            CliMode::Pure => SessionMode::Pure,
            CliMode::Hil => SessionMode::Hil,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the daemon")]
    Run,
    #[command(about = "Validate a model snapshot without running it")]
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load(&[path.as_path()])?,
        None => AppConfig::load(CONFIG_CANDIDATES).unwrap_or_else(|err| {
            eprintln!("{err:#}; continuing with built-in defaults");
            AppConfig::default()
        }),
    };
    if let Some(mode) = cli.mode {
        config.mode = mode.into();
    }
    if let Some(model) = &cli.model {
        config.model_path = Some(model.clone());
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Validate => validate(&config),
        Commands::Run => run(config).await,
    }
}

/// Build the dependency graph and evaluation order for the configured
/// snapshot, reporting configuration errors without starting anything.
fn validate(config: &AppConfig) -> Result<()> {
    let path = config
        .model_path
        .as_ref()
        .ok_or_else(|| anyhow!("no model snapshot configured; pass --model or set model_path"))?;
    let snapshot = ModelSnapshot::from_path(path)
        .with_context(|| format!("failed to load model snapshot {}", path.display()))?;
    let graph = DependencyGraph::build(
        &snapshot.components,
        &snapshot.connections,
        &snapshot.bindings,
    )?;
    let order = compute_order(&graph)?;
    println!(
        "model {} is valid: {} components, {} connections, {} bindings",
        path.display(),
        snapshot.components.len(),
        snapshot.connections.len(),
        snapshot.bindings.len()
    );
    println!("evaluation order: {}", order.join(" -> "));
    Ok(())
}

async fn run(config: AppConfig) -> Result<()> {
    init_tracing("m-twind", &config.logging)?;
    info!(
        mode = ?config.mode,
        bridge = ?config.bridge,
        version = env!("CARGO_PKG_VERSION"),
        "m-twind starting"
    );

    let bridge: Arc<dyn CommunicationBridge> = match config.bridge {
        BridgeKind::InMemory => Arc::new(InMemoryBridge::new(config.session.staleness_threshold)),
        BridgeKind::Opcua => Arc::new(OpcUaBridge),
    };
    let manager = Arc::new(SessionManager::new(config.session.clone()).with_bridge(bridge));

    if let Some(path) = &config.model_path {
        let snapshot = ModelSnapshot::from_path(path)
            .with_context(|| format!("failed to load model snapshot {}", path.display()))?;
        let session = manager.create(snapshot, config.mode, None);
        manager
            .start(session)
            .await
            .with_context(|| format!("failed to start session for {}", path.display()))?;
        info!(session = %session, model = %path.display(), "startup session running");
    } else {
        info!("no startup model configured; sessions arrive via the api");
    }

    let api = if config.api.enabled {
        let state = Arc::new(ApiState::new(
            Arc::clone(&manager),
            config.mode,
            env!("CARGO_PKG_VERSION").to_owned(),
        ));
        Some(spawn_api_server(state, config.api.listen)?)
    } else {
        warn!("api disabled; daemon is only reachable through signals");
        None
    };

    signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    manager.shutdown_all().await;
    if let Some(api) = api {
        api.shutdown().await?;
    }
    info!("m-twind shutdown complete");
    Ok(())
}
