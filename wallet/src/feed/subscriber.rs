use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::chain::ChangeId;
use crate::config::wallet::FeedConfig;
use crate::engine::{ApplyOutcome, EngineError, WalletEngine};

use super::ConsensusFeed;

#[derive(Clone, Debug, thiserror::Error)]
pub enum SubscriberError {
    #[error("consensus change rejected: {0}")]
    Engine(Arc<EngineError>),
    #[error("feed subscriber stopped")]
    Stopped,
}

impl From<EngineError> for SubscriberError {
    fn from(error: EngineError) -> Self {
        SubscriberError::Engine(Arc::new(error))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubscriberStatus {
    /// Changes written to the ledger since the subscriber started.
    pub applied: u64,
    /// Changes the ledger had already seen.
    pub skipped: u64,
    /// Failed feed polls since the subscriber started.
    pub feed_failures: u64,
    pub cursor: Option<ChangeId>,
    /// Set once a fatal error stopped the loop.
    pub halted: bool,
}

#[derive(Default)]
struct StatusState {
    status: SubscriberStatus,
    last_error: Option<SubscriberError>,
}

/// Background task applying consensus changes from a feed, in order, to a
/// wallet engine.
pub struct FeedSubscriber {
    shutdown_tx: watch::Sender<bool>,
    task: AsyncMutex<Option<JoinHandle<()>>>,
    state: Arc<Mutex<StatusState>>,
}

impl FeedSubscriber {
    /// Spawn the polling loop. Must be called from within a tokio runtime.
    pub fn start(
        engine: Arc<WalletEngine>,
        feed: Arc<dyn ConsensusFeed>,
        config: FeedConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = Arc::new(Mutex::new(StatusState::default()));
        let task_state = Arc::clone(&state);
        let mut task_shutdown_rx = shutdown_rx.clone();
        let task = tokio::spawn(async move {
            run_loop(engine, feed, config, &mut task_shutdown_rx, task_state).await;
        });
        Self {
            shutdown_tx,
            task: AsyncMutex::new(Some(task)),
            state,
        }
    }

    pub fn status(&self) -> SubscriberStatus {
        lock_state(&self.state).status.clone()
    }

    pub fn last_error(&self) -> Option<SubscriberError> {
        lock_state(&self.state).last_error.clone()
    }

    pub fn is_halted(&self) -> bool {
        lock_state(&self.state).status.halted
    }

    /// Stop polling and wait for the loop to exit. A change being applied
    /// when the signal arrives is finished first.
    pub async fn shutdown(&self) -> Result<(), SubscriberError> {
        let _ = self.shutdown_tx.send(true);
        let mut task = self.task.lock().await;
        if let Some(handle) = task.take() {
            handle.await.map_err(|_| SubscriberError::Stopped)?;
        }
        Ok(())
    }
}

fn lock_state<'a>(state: &'a Arc<Mutex<StatusState>>) -> MutexGuard<'a, StatusState> {
    state
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

enum Poll {
    /// Fetched `count` changes, all applied or already known.
    Progress { count: usize },
    Retry,
    Halt,
}

async fn run_loop(
    engine: Arc<WalletEngine>,
    feed: Arc<dyn ConsensusFeed>,
    config: FeedConfig,
    shutdown_rx: &mut watch::Receiver<bool>,
    state: Arc<Mutex<StatusState>>,
) {
    let mut backoff = config.backoff_initial();
    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        let delay = match poll_once(&engine, feed.as_ref(), config.batch_limit, &state) {
            Poll::Progress { count } => {
                backoff = config.backoff_initial();
                if count >= config.batch_limit {
                    // More changes are likely waiting.
                    Duration::ZERO
                } else {
                    config.poll_interval()
                }
            }
            Poll::Retry => {
                let delay = backoff;
                backoff = (backoff * 2).min(config.backoff_max());
                delay
            }
            Poll::Halt => break,
        };

        tokio::select! {
            biased;
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = sleep(delay) => {}
        }
    }
    debug!("feed subscriber loop exited");
}

fn poll_once(
    engine: &WalletEngine,
    feed: &dyn ConsensusFeed,
    limit: usize,
    state: &Arc<Mutex<StatusState>>,
) -> Poll {
    let cursor = match engine.consensus_info() {
        Ok(info) => info.cursor,
        Err(error) => return record_engine_error(state, error),
    };

    let changes = match feed.changes_since(cursor, limit) {
        Ok(changes) => changes,
        Err(error) => {
            warn!(?error, %cursor, "consensus feed poll failed; retrying");
            lock_state(state).status.feed_failures += 1;
            return Poll::Retry;
        }
    };

    let count = changes.len();
    for change in &changes {
        match engine.apply_change(change) {
            Ok(ApplyOutcome::Applied(summary)) => {
                let mut guard = lock_state(state);
                guard.status.applied += 1;
                guard.status.cursor = Some(summary.cursor);
                guard.last_error = None;
            }
            Ok(ApplyOutcome::AlreadyApplied) => {
                let mut guard = lock_state(state);
                guard.status.skipped += 1;
                guard.status.cursor = Some(change.id);
            }
            Err(error) => return record_engine_error(state, error),
        }
    }
    Poll::Progress { count }
}

fn record_engine_error(state: &Arc<Mutex<StatusState>>, error: EngineError) -> Poll {
    let fatal = error.is_fatal();
    if fatal {
        error!(?error, "consensus processing halted");
    } else {
        warn!(?error, "consensus change not applied; retrying");
    }
    let mut guard = lock_state(state);
    guard.last_error = Some(SubscriberError::from(error));
    if fatal {
        guard.status.halted = true;
        Poll::Halt
    } else {
        Poll::Retry
    }
}
