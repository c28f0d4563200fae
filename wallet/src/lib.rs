//! Lightweight wallet state engine.
//!
//! The engine tracks a set of addresses against a stream of consensus
//! changes, keeping a durable ledger of owned outputs, relevant transactions,
//! file contracts and miner payouts. Unconfirmed transactions the wallet
//! created or was handed sit in limbo until the chain confirms them.
//!
//! Two wallet variants sit on top of the engine: [`modes::SeedWallet`]
//! derives and signs for its own addresses, [`modes::WatchOnlyWallet`]
//! tracks externally supplied ones. [`wallet::Wallet`] pairs either variant
//! with a transaction pool, and [`rpc::WalletRpcRouter`] exposes the whole
//! surface as JSON-RPC.

pub mod chain;
pub mod config;
pub mod db;
pub mod engine;
pub mod feed;
pub mod modes;
pub mod pool;
pub mod rpc;
pub mod testing;
pub mod wallet;

pub use config::WalletConfig;
pub use engine::{EngineError, WalletEngine};
pub use modes::{SeedWallet, WalletKind, WatchOnlyWallet};
pub use wallet::{BroadcastOutcome, Wallet, WalletError};
