use std::sync::Arc;

use tempfile::{tempdir, TempDir};

use walrus_wallet::chain::{
    Address, SiacoinInput, SiacoinOutput, Transaction, UnlockConditions,
};
use walrus_wallet::db::AddressPolicy;
use walrus_wallet::engine::{ApplyOutcome, EngineError, IntegrityError, LimboInsert, Limit};
use walrus_wallet::testing::MockChain;
use walrus_wallet::{WalletEngine, WalletKind};

struct Fixture {
    engine: Arc<WalletEngine>,
    chain: MockChain,
    conditions: UnlockConditions,
    _dir: TempDir,
}

impl Fixture {
    fn new(maturity_delay: u64) -> Self {
        let dir = tempdir().expect("tempdir");
        let engine = Arc::new(
            WalletEngine::open(dir.path(), WalletKind::WatchOnly, maturity_delay).expect("engine"),
        );
        let conditions = UnlockConditions::standard([7u8; 32]);
        engine
            .add_address(
                conditions.address(),
                AddressPolicy::Watched {
                    metadata: b"cold storage".to_vec(),
                },
            )
            .expect("watch");
        let mut chain = MockChain::new().with_maturity_delay(maturity_delay);
        engine.apply_change(&chain.genesis()).expect("genesis");
        Self {
            engine,
            chain,
            conditions,
            _dir: dir,
        }
    }

    fn address(&self) -> Address {
        self.conditions.address()
    }

    fn deposit(&mut self, value: u128) -> Transaction {
        let txn = Transaction {
            siacoin_outputs: vec![SiacoinOutput {
                value,
                address: self.address(),
            }],
            arbitrary_data: vec![value.to_le_bytes().to_vec()],
            ..Transaction::default()
        };
        self.engine
            .apply_change(&self.chain.confirm(vec![txn.clone()]))
            .expect("deposit");
        txn
    }

    /// Unconfirmed spend of the first output of `parent`.
    fn spend(&self, parent: &Transaction, value: u128, to: Address) -> Transaction {
        let (parent_id, _) = parent.outputs_with_ids()[0];
        Transaction {
            siacoin_inputs: vec![SiacoinInput {
                parent_id,
                unlock_conditions: self.conditions.clone(),
            }],
            siacoin_outputs: vec![SiacoinOutput { value, address: to }],
            ..Transaction::default()
        }
    }
}

#[test]
fn applying_then_reverting_restores_the_ledger() {
    let mut fixture = Fixture::new(2);
    let deposit = fixture.deposit(1_000);
    let root = fixture.engine.ledger_root().expect("root");
    let info = fixture.engine.consensus_info().expect("info");

    let spend = fixture.spend(&deposit, 600, Address::new([9u8; 32]));
    let payout = SiacoinOutput {
        value: 50,
        address: fixture.address(),
    };
    let change = fixture.chain.mine_block(vec![spend.clone()], vec![payout]);
    fixture.engine.apply_change(&change).expect("apply");
    assert_ne!(fixture.engine.ledger_root().expect("root"), root);
    assert!(fixture.engine.transaction(&spend.id()).expect("lookup").is_some());
    assert_eq!(fixture.engine.block_rewards(Limit::Unbounded).expect("rewards").len(), 1);

    fixture.engine.apply_change(&change.inverse()).expect("revert");
    assert_eq!(fixture.engine.ledger_root().expect("root"), root);
    assert_eq!(fixture.engine.consensus_info().expect("info"), info);
    assert_eq!(fixture.engine.balance(false).expect("balance"), 1_000);
    assert!(fixture.engine.transaction(&spend.id()).expect("lookup").is_none());
    assert!(fixture.engine.block_rewards(Limit::Unbounded).expect("rewards").is_empty());
}

#[test]
fn replaying_a_change_is_a_no_op() {
    let mut fixture = Fixture::new(2);
    fixture.deposit(10);
    let change = fixture.chain.confirm(Vec::new());
    assert!(matches!(
        fixture.engine.apply_change(&change).expect("apply"),
        ApplyOutcome::Applied(_)
    ));
    let root = fixture.engine.ledger_root().expect("root");
    assert_eq!(
        fixture.engine.apply_change(&change).expect("replay"),
        ApplyOutcome::AlreadyApplied
    );
    assert_eq!(fixture.engine.ledger_root().expect("root"), root);
}

#[test]
fn out_of_order_changes_are_integrity_violations() {
    let mut fixture = Fixture::new(2);
    let skipped = fixture.chain.confirm(Vec::new());
    let next = fixture.chain.confirm(Vec::new());
    let root = fixture.engine.ledger_root().expect("root");

    let error = fixture.engine.apply_change(&next).expect_err("gap");
    assert!(error.is_fatal());
    assert!(matches!(
        error,
        EngineError::Integrity(IntegrityError::CursorMismatch { expected, .. }) if expected == skipped.id
    ));
    assert_eq!(fixture.engine.ledger_root().expect("root"), root);
}

#[test]
fn confirmed_limbo_transactions_move_to_history_once() {
    let mut fixture = Fixture::new(2);
    let deposit = fixture.deposit(500);
    let spend = fixture.spend(&deposit, 500, Address::new([3u8; 32]));

    assert_eq!(
        fixture.engine.add_to_limbo(spend.clone()).expect("limbo"),
        LimboInsert::Inserted
    );
    assert_eq!(
        fixture.engine.add_to_limbo(spend.clone()).expect("limbo"),
        LimboInsert::Duplicate
    );
    assert_eq!(fixture.engine.balance(true).expect("balance"), 0);

    let confirm = fixture.chain.confirm(vec![spend.clone()]);
    fixture.engine.apply_change(&confirm).expect("confirm");
    assert!(fixture.engine.limbo().expect("limbo").is_empty());
    let history = fixture.engine.transactions(Limit::Unbounded).expect("history");
    assert_eq!(
        history.iter().filter(|entry| entry.txid == spend.id()).count(),
        1
    );
    // Once confirmed it cannot go back into limbo.
    assert_eq!(
        fixture.engine.add_to_limbo(spend.clone()).expect("limbo"),
        LimboInsert::Duplicate
    );

    // Reverting the block forgets the transaction without re-pinning it.
    fixture.engine.apply_change(&confirm.inverse()).expect("revert");
    assert!(fixture.engine.transaction(&spend.id()).expect("lookup").is_none());
    assert!(fixture.engine.limbo().expect("limbo").is_empty());
    assert_eq!(fixture.engine.balance(false).expect("balance"), 500);
}

#[test]
fn balance_is_deposits_minus_spent_inputs() {
    let mut fixture = Fixture::new(2);
    let deposits: Vec<Transaction> = [100u128, 250, 4_000]
        .into_iter()
        .map(|value| fixture.deposit(value))
        .collect();
    assert_eq!(fixture.engine.balance(false).expect("balance"), 4_350);

    // Spend the 250 deposit, returning 40 to ourselves.
    let mut spend = fixture.spend(&deposits[1], 210, Address::new([4u8; 32]));
    spend.siacoin_outputs.push(SiacoinOutput {
        value: 40,
        address: fixture.address(),
    });
    fixture
        .engine
        .apply_change(&fixture.chain.confirm(vec![spend.clone()]))
        .expect("spend");

    assert_eq!(fixture.engine.balance(false).expect("balance"), 4_350 - 250 + 40);
    let flow = fixture
        .engine
        .transaction_flow(&spend.id())
        .expect("flow")
        .expect("recorded");
    assert_eq!(flow.debit, 250);
    assert_eq!(flow.credit, 40);
    let by_address = fixture
        .engine
        .transactions_by_address(&fixture.address(), Limit::AtMost(2))
        .expect("history");
    assert_eq!(by_address.len(), 2);
    assert_eq!(by_address[0].txid, spend.id());
}

#[test]
fn payouts_become_spendable_exactly_at_maturity() {
    let mut fixture = Fixture::new(2);
    let payout = SiacoinOutput {
        value: 77,
        address: fixture.address(),
    };
    fixture
        .engine
        .apply_change(&fixture.chain.mine_block(Vec::new(), vec![payout]))
        .expect("payout");
    // Paid at height 1, spendable from height 3.
    assert_eq!(fixture.engine.tracked_outputs().expect("tracked").len(), 1);
    assert_eq!(fixture.engine.balance(false).expect("balance"), 0);

    let height_two = fixture.chain.confirm(Vec::new());
    fixture.engine.apply_change(&height_two).expect("height 2");
    assert_eq!(fixture.engine.balance(false).expect("balance"), 0);

    let height_three = fixture.chain.confirm(Vec::new());
    fixture.engine.apply_change(&height_three).expect("height 3");
    assert_eq!(fixture.engine.balance(false).expect("balance"), 77);
    let utxos = fixture.engine.unspent_outputs(false).expect("utxos");
    assert_eq!(utxos.len(), 1);
    assert_eq!(utxos[0].maturity_height, None);

    fixture
        .engine
        .apply_change(&height_three.inverse())
        .expect("revert height 3");
    assert_eq!(fixture.engine.balance(false).expect("balance"), 0);
    let tracked = fixture.engine.tracked_outputs().expect("tracked");
    assert_eq!(tracked.len(), 1);
    assert_eq!(tracked[0].maturity_height, Some(3));
}
