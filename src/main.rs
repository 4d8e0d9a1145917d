//! shardview: inspect and plan changes to sharded schedules and scenes
//!
//! Reads a node registry dump (JSON array of node records) and:
//! - `merge` prints the merged schedules and scenes
//! - `drift` prints every out-of-sync field per entity and node
//! - `plan` runs an edit against a dry-run transport and prints the batch

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use shardview::{
    Client, Config, DryRunAutomationApi, DryRunTransport, NodeRegistry, SceneEdit, ScheduleEdit,
};

#[derive(Parser)]
#[command(name = "shardview")]
#[command(about = "Inspect and plan changes to schedules and scenes sharded across nodes")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "shardview.toml", env = "SHARDVIEW_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print merged schedules and scenes
    Merge {
        /// Node registry dump (JSON)
        #[arg(short, long)]
        registry: PathBuf,

        /// Merge only these nodes, in this order
        #[arg(long, value_delimiter = ',')]
        nodes: Option<Vec<String>>,
    },
    /// Print the out-of-sync report
    Drift {
        #[arg(short, long)]
        registry: PathBuf,
    },
    /// Print the batch an edit would send
    Plan {
        #[arg(short, long)]
        registry: PathBuf,

        /// Entity id
        #[arg(long)]
        id: String,

        /// Treat the id as a scene instead of a schedule
        #[arg(long)]
        scene: bool,

        /// Edit as JSON ({"name": ..., "action": {...}, ...})
        #[arg(long)]
        edit: PathBuf,
    },
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        Config::load(path).with_context(|| format!("loading {}", path.display()))
    } else {
        Ok(Config::default())
    }
}

fn init_tracing(config: &Config) -> anyhow::Result<()> {
    let filter = match &config.logging.filter {
        Some(directive) => EnvFilter::try_new(directive)?,
        None => EnvFilter::from_default_env().add_directive("shardview=info".parse()?),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    init_tracing(&config)?;

    info!("Config file: {}", cli.config.display());

    let transport = Arc::new(DryRunTransport::new());
    let client = Client::init(config, transport.clone(), Arc::new(DryRunAutomationApi));

    match cli.command {
        Command::Merge { registry, nodes } => {
            client.load_registry(load_registry(&registry)?);
            if let Some(nodes) = nodes {
                client.sync(Some(nodes.as_slice()));
            }
            let out = json!({
                "schedules": client.schedules().list(),
                "scenes": client.scenes().list(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Command::Drift { registry } => {
            client.load_registry(load_registry(&registry)?);
            let out = json!({
                "schedules": client.schedules().out_of_sync_report(),
                "scenes": client.scenes().out_of_sync_report(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Command::Plan { registry, id, scene, edit } => {
            client.load_registry(load_registry(&registry)?);
            let content = std::fs::read_to_string(&edit).with_context(|| format!("reading {}", edit.display()))?;

            let results = if scene {
                let edit: SceneEdit = serde_json::from_str(&content)?;
                client.scenes().handle(&id)?.edit(edit).await?
            } else {
                let edit: ScheduleEdit = serde_json::from_str(&content)?;
                client.schedules().handle(&id)?.edit(edit).await?
            };

            let out = json!({
                "batch": transport.last_batch().unwrap_or_default(),
                "results": results,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }

    Ok(())
}

fn load_registry(path: &Path) -> anyhow::Result<NodeRegistry> {
    NodeRegistry::load(path).with_context(|| format!("loading registry {}", path.display()))
}
