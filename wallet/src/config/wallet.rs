use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::chain::Currency;
use crate::modes::WalletKind;

/// Blocks a miner payout stays locked on the Sia network.
pub const DEFAULT_MATURITY_DELAY: u64 = 144;
const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
const DEFAULT_BATCH_LIMIT: usize = 100;
const DEFAULT_BACKOFF_INITIAL_MS: u64 = 500;
const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;
const MAX_BATCH_LIMIT: usize = 10_000;
/// Ten hastings per byte.
const DEFAULT_FEE_PER_BYTE: u64 = 10;

/// Top-level configuration of a walrus wallet process.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WalletConfig {
    pub engine: WalletEngineConfig,
    pub feed: FeedConfig,
    pub fees: FeeConfig,
}

/// Where the ledger lives and which wallet variant owns it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WalletEngineConfig {
    /// Directory holding the ledger's write-ahead log and snapshots.
    pub data_dir: PathBuf,
    /// Variant the ledger is bound to on first open.
    pub kind: WalletKind,
    /// Blocks before a miner payout can be spent.
    pub maturity_delay: u64,
}

impl Default for WalletEngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/walrus"),
            kind: WalletKind::default(),
            maturity_delay: DEFAULT_MATURITY_DELAY,
        }
    }
}

/// Polling cadence of the consensus feed subscriber.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FeedConfig {
    /// Pause between polls once the subscriber has caught up.
    pub poll_interval_ms: u64,
    /// Most consensus changes requested per poll.
    pub batch_limit: usize,
    /// First retry delay after a feed failure.
    pub backoff_initial_ms: u64,
    /// Ceiling for the doubling retry delay.
    pub backoff_max_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            batch_limit: DEFAULT_BATCH_LIMIT,
            backoff_initial_ms: DEFAULT_BACKOFF_INITIAL_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
        }
    }
}

impl FeedConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn backoff_initial(&self) -> Duration {
        Duration::from_millis(self.backoff_initial_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FeeConfig {
    /// Fee rate in hastings per byte used when callers omit one.
    pub default_fee_per_byte: u64,
}

impl FeeConfig {
    pub fn fee_per_byte(&self) -> Currency {
        Currency::from(self.default_fee_per_byte)
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            default_fee_per_byte: DEFAULT_FEE_PER_BYTE,
        }
    }
}

impl WalletConfig {
    /// Load, strictly parse and validate a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("unable to read wallet config {}", path.display()))?;
        let config: Self = parse_strict_wallet_config(&content, path)?;
        config
            .validate()
            .map_err(|err| anyhow!("invalid wallet config {}: {err}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("unable to create {}", parent.display()))?;
        }
        let encoded = toml::to_string_pretty(self).context("unable to encode wallet config")?;
        fs::write(path, encoded)
            .with_context(|| format!("unable to write wallet config {}", path.display()))
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.engine.data_dir.as_os_str().is_empty() {
            return Err("engine.data_dir must not be empty".into());
        }
        if self.feed.poll_interval_ms == 0 {
            return Err("feed.poll_interval_ms must be greater than zero".into());
        }
        if self.feed.batch_limit == 0 || self.feed.batch_limit > MAX_BATCH_LIMIT {
            return Err(format!(
                "feed.batch_limit must be between 1 and {MAX_BATCH_LIMIT}"
            ));
        }
        if self.feed.backoff_initial_ms == 0 {
            return Err("feed.backoff_initial_ms must be greater than zero".into());
        }
        if self.feed.backoff_max_ms < self.feed.backoff_initial_ms {
            return Err("feed.backoff_max_ms must not be below feed.backoff_initial_ms".into());
        }
        Ok(())
    }
}

pub(crate) fn parse_strict_wallet_config<T: DeserializeOwned>(
    content: &str,
    path: &Path,
) -> Result<T> {
    let mut unknown_keys = Vec::new();
    let deserializer = toml::de::Deserializer::new(content);

    let value = serde_ignored::deserialize(deserializer, |path| {
        unknown_keys.push(path.to_string());
    })
    .with_context(|| format!("unable to parse wallet config {}", path.display()))?;

    if !unknown_keys.is_empty() {
        return Err(anyhow!(
            "invalid wallet config {}: unknown configuration key(s): {}",
            path.display(),
            unknown_keys.join(", ")
        ));
    }

    Ok(value)
}
