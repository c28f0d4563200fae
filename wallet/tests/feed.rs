use std::sync::Arc;
use std::time::Duration;

use tempfile::{tempdir, TempDir};
use tokio::time::sleep;

use walrus_wallet::chain::{Address, SiacoinOutput, Transaction};
use walrus_wallet::config::FeedConfig;
use walrus_wallet::db::AddressPolicy;
use walrus_wallet::feed::{FeedSubscriber, SubscriberError};
use walrus_wallet::modes::WatchOnlyWallet;
use walrus_wallet::testing::{MemoryFeed, MockChain, RecordingPool};
use walrus_wallet::{EngineError, Wallet, WalletEngine, WalletKind};

fn fast_feed_config() -> FeedConfig {
    FeedConfig {
        poll_interval_ms: 5,
        batch_limit: 2,
        backoff_initial_ms: 5,
        backoff_max_ms: 20,
    }
}

fn watched_engine(owner: Address) -> (Arc<WalletEngine>, TempDir) {
    let dir = tempdir().expect("tempdir");
    let engine = Arc::new(
        WalletEngine::open(dir.path(), WalletKind::WatchOnly, 144).expect("engine"),
    );
    engine
        .add_address(owner, AddressPolicy::Watched { metadata: Vec::new() })
        .expect("watch");
    (engine, dir)
}

fn deposit(owner: Address, value: u128) -> Transaction {
    Transaction {
        siacoin_outputs: vec![SiacoinOutput {
            value,
            address: owner,
        }],
        ..Transaction::default()
    }
}

async fn wait_for(mut done: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if done() {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn subscriber_catches_up_with_the_feed() {
    let owner = Address::new([1u8; 32]);
    let (engine, _dir) = watched_engine(owner);
    let wallet = Wallet::new(
        Arc::new(WatchOnlyWallet::new(Arc::clone(&engine)).expect("watch wallet")),
        Arc::new(RecordingPool::new()),
    );
    let feed = Arc::new(MemoryFeed::new());
    let mut chain = MockChain::new();
    feed.publish(chain.genesis());
    for value in 1..=4u128 {
        feed.publish(chain.confirm(vec![deposit(owner, value)]));
    }

    let subscriber = wallet.subscribe(feed.clone(), fast_feed_config());
    let target = chain.cursor();
    wait_for(|| engine.consensus_info().map_or(false, |info| info.cursor == target)).await;
    assert_eq!(engine.balance(false).expect("balance"), 10);

    // Later changes are picked up on subsequent polls.
    feed.publish(chain.confirm(vec![deposit(owner, 5)]));
    let target = chain.cursor();
    wait_for(|| subscriber.status().cursor == Some(target)).await;
    assert_eq!(engine.balance(false).expect("balance"), 15);

    let status = subscriber.status();
    assert_eq!(status.applied, 6);
    assert_eq!(status.feed_failures, 0);
    assert!(!status.halted);
    subscriber.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn feed_failures_are_retried() {
    let owner = Address::new([2u8; 32]);
    let (engine, _dir) = watched_engine(owner);
    let feed = Arc::new(MemoryFeed::new());
    let mut chain = MockChain::new();
    feed.publish(chain.genesis());
    feed.publish(chain.confirm(vec![deposit(owner, 9)]));
    feed.fail_next(3);

    let subscriber = FeedSubscriber::start(Arc::clone(&engine), feed.clone(), fast_feed_config());
    let target = chain.cursor();
    wait_for(|| subscriber.status().cursor == Some(target)).await;

    let status = subscriber.status();
    assert_eq!(status.feed_failures, 3);
    assert_eq!(status.applied, 2);
    assert!(feed.polls() >= 4);
    assert!(subscriber.last_error().is_none());
    assert_eq!(engine.balance(false).expect("balance"), 9);
    subscriber.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn integrity_violations_halt_the_subscriber() {
    let owner = Address::new([3u8; 32]);
    let (engine, _dir) = watched_engine(owner);
    let feed = Arc::new(MemoryFeed::new());

    let mut chain = MockChain::new();
    let mut fork = MockChain::new();
    feed.publish(chain.genesis());
    feed.publish(chain.confirm(vec![deposit(owner, 4)]));
    fork.genesis();
    // Builds on the shared genesis, not on the tip the wallet reaches.
    feed.publish(fork.confirm(vec![deposit(owner, 8)]));

    let subscriber = FeedSubscriber::start(Arc::clone(&engine), feed.clone(), fast_feed_config());
    wait_for(|| subscriber.is_halted()).await;

    let status = subscriber.status();
    assert_eq!(status.applied, 2);
    assert_eq!(status.cursor, Some(chain.cursor()));
    match subscriber.last_error() {
        Some(SubscriberError::Engine(error)) => {
            assert!(matches!(error.as_ref(), EngineError::Integrity(_)));
        }
        other => panic!("expected an integrity error, got {other:?}"),
    }
    assert_eq!(engine.balance(false).expect("balance"), 4);

    // The loop has exited; polling stops for good.
    let polls = feed.polls();
    sleep(Duration::from_millis(30)).await;
    assert_eq!(feed.polls(), polls);
    subscriber.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn shutdown_stops_polling() {
    let owner = Address::new([4u8; 32]);
    let (engine, _dir) = watched_engine(owner);
    let feed = Arc::new(MemoryFeed::new());
    let mut chain = MockChain::new();
    feed.publish(chain.genesis());

    let subscriber = FeedSubscriber::start(Arc::clone(&engine), feed.clone(), fast_feed_config());
    wait_for(|| subscriber.status().applied == 1).await;
    subscriber.shutdown().await.expect("shutdown");

    feed.publish(chain.confirm(vec![deposit(owner, 1)]));
    sleep(Duration::from_millis(30)).await;
    assert_eq!(subscriber.status().applied, 1);
    assert_eq!(engine.balance(false).expect("balance"), 0);
    // A second shutdown is harmless.
    subscriber.shutdown().await.expect("second shutdown");
}
