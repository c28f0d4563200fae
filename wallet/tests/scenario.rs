use std::sync::Arc;

use tempfile::tempdir;

use walrus_wallet::chain::{
    Address, FileContract, SiacoinOutput, Transaction, SIACOIN_PRECISION,
};
use walrus_wallet::engine::funding::estimate_fee;
use walrus_wallet::engine::signing::verify_signatures;
use walrus_wallet::engine::{LimboInsert, Limit, SeedKeys};
use walrus_wallet::testing::{MockChain, RecordingPool};
use walrus_wallet::{BroadcastOutcome, SeedWallet, Wallet, WalletEngine, WalletKind};

const HALF_SC: u128 = SIACOIN_PRECISION / 2;
const FEE_PER_BYTE: u128 = 10;
const MATURITY_DELAY: u64 = 3;

fn pay(address: Address, value: u128) -> SiacoinOutput {
    SiacoinOutput { value, address }
}

#[test]
fn seed_wallet_walkthrough() {
    let dir = tempdir().expect("tempdir");
    let engine = Arc::new(
        WalletEngine::open(dir.path(), WalletKind::Seed, MATURITY_DELAY).expect("engine"),
    );
    let handle = SeedWallet::new(Arc::clone(&engine), SeedKeys::new([11u8; 32])).expect("seed");
    let pool = Arc::new(RecordingPool::new());
    let wallet = Wallet::new(Arc::new(handle), pool.clone());
    let mut chain = MockChain::new().with_maturity_delay(MATURITY_DELAY);

    engine.apply_change(&chain.genesis()).expect("genesis");
    assert_eq!(engine.consensus_info().expect("info").height, Some(0));

    // Two half-coin deposits to a fresh address.
    let receive = wallet.next_address().expect("address");
    let deposit = Transaction {
        siacoin_outputs: vec![pay(receive, HALF_SC), pay(receive, HALF_SC)],
        ..Transaction::default()
    };
    engine
        .apply_change(&chain.confirm(vec![deposit.clone()]))
        .expect("deposit");
    assert_eq!(engine.balance(false).expect("balance"), SIACOIN_PRECISION);
    let flow = engine
        .transaction_flow(&deposit.id())
        .expect("flow")
        .expect("recorded");
    assert_eq!(flow.credit, SIACOIN_PRECISION);
    assert_eq!(flow.debit, 0);

    // Fund, sign and broadcast a payment of 0.3 SC to someone else.
    let payee = Address::new([0xEE; 32]);
    let amount = 3 * SIACOIN_PRECISION / 10;
    let plan = wallet.fund(amount, FEE_PER_BYTE).expect("fund");
    assert_eq!(plan.inputs.len(), 1);
    assert_eq!(plan.fee, estimate_fee(1, 2, FEE_PER_BYTE));
    assert_eq!(plan.change, HALF_SC - amount - plan.fee);
    let change_address = wallet.next_address().expect("change address");
    let change = plan.change;
    let mut payment = plan.into_transaction(pay(payee, amount), change_address);
    wallet.sign(&mut payment, &[]).expect("sign");
    assert_eq!(payment.signatures.len(), 1);
    verify_signatures(&payment).expect("signatures verify");
    assert!(payment.fee_per_byte() > 0);

    let outcome = wallet.broadcast(vec![payment.clone()]).expect("broadcast");
    assert_eq!(
        outcome,
        BroadcastOutcome::Submitted {
            transactions: vec![payment.id()],
            limbo: vec![LimboInsert::Inserted],
        }
    );
    assert_eq!(pool.submitted(), vec![vec![payment.clone()]]);

    // Limbo views: confirmed balance is untouched, the limbo view spends one
    // deposit and gains the change output.
    assert_eq!(engine.balance(false).expect("balance"), SIACOIN_PRECISION);
    assert_eq!(engine.balance(true).expect("balance"), HALF_SC + change);
    assert_eq!(engine.limbo().expect("limbo").len(), 1);
    let (change_id, _) = payment.outputs_with_ids()[1];
    let mut spend_change = payment.siacoin_inputs[0].clone();
    spend_change.parent_id = change_id;
    let child = Transaction {
        siacoin_inputs: vec![spend_change],
        ..Transaction::default()
    };
    let parents = engine.unconfirmed_parents(&child).expect("parents");
    assert_eq!(parents.len(), 1);
    assert_eq!(parents[0].id(), payment.id());

    // Removing the entry restores the confirmed view.
    let removed = engine.remove_from_limbo(&payment.id()).expect("remove");
    assert_eq!(removed.map(|entry| entry.id()), Some(payment.id()));
    assert_eq!(engine.balance(true).expect("balance"), SIACOIN_PRECISION);
    assert_eq!(
        engine.add_to_limbo(payment.clone()).expect("re-add"),
        LimboInsert::Inserted
    );

    // Confirmation reconciles limbo and records the flow.
    engine
        .apply_change(&chain.confirm(vec![payment.clone()]))
        .expect("confirm payment");
    assert!(engine.limbo().expect("limbo").is_empty());
    assert_eq!(engine.balance(false).expect("balance"), HALF_SC + change);
    assert_eq!(engine.balance(true).expect("balance"), HALF_SC + change);
    let flow = engine
        .transaction_flow(&payment.id())
        .expect("flow")
        .expect("recorded");
    assert_eq!(flow.debit, HALF_SC);
    assert_eq!(flow.credit, change);
    let history = engine.transactions(Limit::Unbounded).expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].txid, payment.id());

    // A miner payout stays out of the balance until it matures.
    let reward_value = 2 * SIACOIN_PRECISION;
    let before = engine.balance(false).expect("balance");
    engine
        .apply_change(&chain.mine_block(Vec::new(), vec![pay(receive, reward_value)]))
        .expect("reward block");
    let reward_height = chain.height().expect("height");
    let rewards = engine.block_rewards(Limit::Unbounded).expect("rewards");
    assert_eq!(rewards.len(), 1);
    assert_eq!(rewards[0].maturity_height, reward_height + MATURITY_DELAY);
    for change in chain.mine_to(reward_height + MATURITY_DELAY - 1) {
        engine.apply_change(&change).expect("empty block");
    }
    assert_eq!(engine.balance(false).expect("balance"), before);
    for change in chain.mine_to(reward_height + MATURITY_DELAY) {
        engine.apply_change(&change).expect("maturing block");
    }
    assert_eq!(engine.balance(false).expect("balance"), before + reward_value);

    // Contract formation, then a revision shrinking the file.
    let contract = FileContract {
        file_size: 4096,
        window_start: 100,
        window_end: 200,
        payout: HALF_SC,
        valid_proof_outputs: vec![pay(receive, HALF_SC)],
        missed_proof_outputs: vec![pay(payee, HALF_SC)],
        ..FileContract::default()
    };
    let formation = Transaction {
        file_contracts: vec![contract],
        ..Transaction::default()
    };
    let contract_id = formation.file_contract_id(0);
    engine
        .apply_change(&chain.confirm(vec![formation]))
        .expect("formation");
    let formed_at = chain.height().expect("height");

    let mut revision = chain.next_revision(&contract_id).expect("revision");
    revision.new_file_size = 2048;
    let revising = Transaction {
        file_contract_revisions: vec![revision],
        ..Transaction::default()
    };
    engine
        .apply_change(&chain.confirm(vec![revising]))
        .expect("revision");

    let contracts = engine.file_contracts(Limit::Unbounded).expect("contracts");
    assert_eq!(contracts.len(), 1);
    assert_eq!(contracts[0].contract.revision_number, 1);
    assert_eq!(contracts[0].contract.file_size, 2048);
    let history = engine.file_contract_history(&contract_id).expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].recorded_height, formed_at);
    assert_eq!(history[1].recorded_height, formed_at + 1);
}

#[test]
fn broadcasting_a_confirmed_set_is_a_no_op() {
    let dir = tempdir().expect("tempdir");
    let engine = Arc::new(WalletEngine::open(dir.path(), WalletKind::Seed, 144).expect("engine"));
    let handle = SeedWallet::new(Arc::clone(&engine), SeedKeys::new([12u8; 32])).expect("seed");
    let pool = Arc::new(RecordingPool::new());
    let wallet = Wallet::new(Arc::new(handle), pool.clone());
    let mut chain = MockChain::new();

    engine.apply_change(&chain.genesis()).expect("genesis");
    let address = wallet.next_address().expect("address");
    let deposit = Transaction {
        siacoin_outputs: vec![pay(address, 5)],
        ..Transaction::default()
    };
    engine
        .apply_change(&chain.confirm(vec![deposit.clone()]))
        .expect("deposit");

    assert_eq!(
        wallet.broadcast(vec![deposit]).expect("broadcast"),
        BroadcastOutcome::AlreadyConfirmed
    );
    assert!(pool.submitted().is_empty());
    assert!(engine.limbo().expect("limbo").is_empty());
}

#[test]
fn spending_both_deposits_into_one_output_pins_a_single_utxo() {
    let dir = tempdir().expect("tempdir");
    let engine = Arc::new(
        WalletEngine::open(dir.path(), WalletKind::Seed, MATURITY_DELAY).expect("engine"),
    );
    let handle = SeedWallet::new(Arc::clone(&engine), SeedKeys::new([13u8; 32])).expect("seed");
    let pool = Arc::new(RecordingPool::new());
    let wallet = Wallet::new(Arc::new(handle), pool.clone());
    let mut chain = MockChain::new().with_maturity_delay(MATURITY_DELAY);

    engine.apply_change(&chain.genesis()).expect("genesis");
    assert_eq!(engine.balance(false).expect("balance"), 0);
    assert!(engine.transactions(Limit::Unbounded).expect("history").is_empty());
    assert!(engine.addresses().expect("addresses").is_empty());

    let receive = wallet.next_address().expect("address");
    let deposit = Transaction {
        siacoin_outputs: vec![pay(receive, HALF_SC), pay(receive, HALF_SC)],
        ..Transaction::default()
    };
    engine
        .apply_change(&chain.confirm(vec![deposit]))
        .expect("deposit");
    assert_eq!(engine.unspent_outputs(false).expect("utxos").len(), 2);

    // Exactly what two inputs can cover, so neither can be trimmed and no
    // change is left over.
    let amount = SIACOIN_PRECISION - estimate_fee(2, 2, FEE_PER_BYTE);
    let plan = wallet.fund(amount, FEE_PER_BYTE).expect("fund");
    assert_eq!(plan.inputs.len(), 2);
    assert_eq!(plan.change, 0);
    let mut consolidate = plan.into_transaction(pay(receive, amount), receive);
    assert_eq!(consolidate.siacoin_outputs.len(), 1);
    wallet.sign(&mut consolidate, &[]).expect("sign");
    assert_eq!(consolidate.signatures.len(), 2);
    verify_signatures(&consolidate).expect("signatures verify");
    wallet
        .broadcast(vec![consolidate.clone()])
        .expect("broadcast");

    let pinned = engine.unspent_outputs(true).expect("utxos");
    assert_eq!(pinned.len(), 1);
    assert_eq!(pinned[0].value, amount);
    let limbo = engine.limbo().expect("limbo");
    assert_eq!(limbo.len(), 1);
    assert_eq!(limbo[0].transaction.siacoin_inputs.len(), 2);

    engine
        .remove_from_limbo(&consolidate.id())
        .expect("remove")
        .expect("pinned");
    assert_eq!(engine.unspent_outputs(true).expect("utxos").len(), 2);
    assert_eq!(engine.balance(true).expect("balance"), SIACOIN_PRECISION);
}
