pub mod wallet;

pub use wallet::{FeeConfig, FeedConfig, WalletConfig, WalletEngineConfig};
