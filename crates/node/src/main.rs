// node/src/main.rs
use anyhow::Context;
use blockchain_core::{Block, Network, Transaction};
use clap::{Parser, Subcommand};
use node::runtime::{with_node, NodeHandle};
use node::{NodeConfig, TemplateSummary};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "stake-node")]
#[command(about = "Hybrid PoW/PoS chain bookkeeping node", version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "./data/config.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration and create the genesis block
    Init {
        /// Data directory
        #[arg(long, default_value = "./data")]
        data_dir: String,

        /// Network parameters to use
        #[arg(short, long, default_value = "simnet")]
        network: Network,

        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },

    /// Show the best chain and its ticket pool
    Status,

    /// Assemble a block template on the best tip
    Template {
        /// JSON array of candidate transactions
        #[arg(long)]
        candidates: Option<PathBuf>,

        /// Hex encoded payout script for the fees
        #[arg(long, default_value = "")]
        payout: String,
    },

    /// Submit a block read from a JSON file
    Submit {
        /// Block JSON, either a bare block or a template summary
        block: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Init {
            data_dir,
            network,
            force,
        } => init_node(&cli.config, data_dir, network, force),
        Commands::Status => {
            let config = NodeConfig::from_file(&cli.config)?;
            with_node(config, |node| print_json(&node.status()?))
        }
        Commands::Template { candidates, payout } => {
            let config = NodeConfig::from_file(&cli.config)?;
            let candidates = match candidates {
                Some(path) => read_json::<Vec<Transaction>>(&path)?,
                None => Vec::new(),
            };
            let payout = hex::decode(&payout).context("payout script is not valid hex")?;
            with_node(config, |node| build_template(node, candidates, &payout))
        }
        Commands::Submit { block } => {
            let config = NodeConfig::from_file(&cli.config)?;
            let block = read_block(&block)?;
            with_node(config, |node| {
                let acceptance = node.submit_block(block)?;
                print_json(&serde_json::json!({
                    "hash": acceptance.hash.to_hex(),
                    "height": acceptance.height,
                    "is_main_chain": acceptance.is_main_chain,
                    "reorganized": acceptance.reorganized,
                }))
            })
        }
    }
}

fn init_node(config_path: &Path, data_dir: String, network: Network, force: bool) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite it",
            config_path.display()
        );
    }

    tracing::info!("Initializing {} node at {}", network, data_dir);
    std::fs::create_dir_all(&data_dir)?;
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let config = NodeConfig {
        data_dir,
        network,
        ..NodeConfig::default()
    };
    config.to_file(config_path)?;
    tracing::info!("Wrote configuration to {}", config_path.display());

    with_node(config, |node| print_json(&node.status()?))
}

fn build_template(
    node: &dyn NodeHandle,
    candidates: Vec<Transaction>,
    payout: &[u8],
) -> anyhow::Result<()> {
    let offered = candidates.len();
    let template = node.build_template(candidates, payout)?;
    let summary = TemplateSummary::from(&template);
    tracing::info!(
        "Template at height {} selected {} of {} candidates",
        summary.height,
        summary.transactions.saturating_sub(1),
        offered
    );
    print_json(&summary)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
}

fn read_block(path: &Path) -> anyhow::Result<Block> {
    let value: serde_json::Value = read_json(path)?;
    let block = match value.get("block") {
        Some(inner) => inner.clone(),
        None => value,
    };
    Ok(serde_json::from_value(block)?)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
