//! Upstream source of consensus changes and the task that follows it.

use anyhow::Error as AnyError;
use thiserror::Error;

use crate::chain::{ChangeId, ConsensusChange};

pub mod subscriber;

pub use subscriber::{FeedSubscriber, SubscriberError, SubscriberStatus};

#[derive(Debug, Error)]
pub enum FeedError {
    /// The node cannot serve changes right now, for example while syncing.
    #[error("consensus feed unavailable: {0}")]
    Unavailable(String),
    #[error("consensus feed transport error: {0}")]
    Transport(#[from] AnyError),
}

/// Ordered stream of consensus changes published by a full node.
pub trait ConsensusFeed: Send + Sync {
    /// Up to `limit` changes following `cursor`, oldest first. A cursor of
    /// [`ChangeId::BEGINNING`] starts from genesis.
    fn changes_since(&self, cursor: ChangeId, limit: usize) -> Result<Vec<ConsensusChange>, FeedError>;
}
