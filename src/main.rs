use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use walrus_wallet::{WalletConfig, WalletEngine};

#[derive(Parser)]
#[command(author, version, about = "Wallet state engine for a UTXO chain")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a default wallet configuration file
    GenerateConfig {
        #[arg(short, long, default_value = "config/wallet.toml")]
        path: PathBuf,
    },
    /// Print the ledger position and balances
    Status {
        #[arg(short, long, default_value = "config/wallet.toml")]
        config: PathBuf,
    },
    /// Forget all chain-derived state so the wallet rescans from genesis
    Reset {
        #[arg(short, long, default_value = "config/wallet.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::GenerateConfig { path } => generate_config(path)?,
        Commands::Status { config } => status(&config)?,
        Commands::Reset { config } => reset(&config)?,
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<WalletConfig> {
    if path.exists() {
        WalletConfig::load(path)
    } else {
        info!(?path, "configuration file missing; using defaults");
        Ok(WalletConfig::default())
    }
}

fn open_engine(path: &Path) -> Result<WalletEngine> {
    let config = load_config(path)?;
    WalletEngine::from_config(&config.engine).with_context(|| {
        format!(
            "unable to open wallet ledger at {}",
            config.engine.data_dir.display()
        )
    })
}

fn generate_config(path: PathBuf) -> Result<()> {
    let config = WalletConfig::default();
    config.save(&path)?;
    info!(?path, "wrote default configuration");
    Ok(())
}

fn status(config_path: &Path) -> Result<()> {
    let engine = open_engine(config_path)?;
    let consensus = engine.consensus_info()?;
    let report = json!({
        "kind": engine.kind().as_str(),
        "cursor": consensus.cursor.to_string(),
        "height": consensus.height,
        "addresses": engine.addresses()?.len(),
        "balance": engine.balance(false)?.to_string(),
        "balance_with_limbo": engine.balance(true)?.to_string(),
        "limbo": engine.limbo()?.len(),
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("unable to encode status report")?
    );
    Ok(())
}

fn reset(config_path: &Path) -> Result<()> {
    let engine = open_engine(config_path)?;
    engine.reset()?;
    info!("wallet will rescan from the beginning of the chain");
    Ok(())
}
