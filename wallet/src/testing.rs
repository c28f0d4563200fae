//! In-memory stand-ins for the node a wallet talks to: a chain that emits
//! consensus changes, a feed serving them and a transaction pool that records
//! submissions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::chain::{
    Block, BlockId, ChangeId, ConsensusChange, ContractId, DelayedOutputDiff, DiffDirection,
    FileContract, FileContractDiff, FileContractRevision, OutputId, SiacoinOutput,
    SiacoinOutputDiff, Transaction, UnlockConditions,
};
use crate::config::wallet::DEFAULT_MATURITY_DELAY;
use crate::feed::{ConsensusFeed, FeedError};
use crate::pool::{FeeEstimate, PoolError, PoolResult, TransactionPool};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone, Default)]
struct ChainState {
    tip: BlockId,
    height: Option<u64>,
    cursor: ChangeId,
    outputs: HashMap<OutputId, SiacoinOutput>,
    immature: Vec<DelayedOutputDiff>,
    contracts: HashMap<ContractId, FileContract>,
}

/// Deterministic single-fork chain producing linked consensus changes.
///
/// Every mined block yields one change whose diffs mirror what a full node
/// would report: spent and created outputs, miner payouts entering the
/// delayed set, payouts maturing into the spendable set, and contract
/// formations and revisions.
pub struct MockChain {
    state: ChainState,
    undo: Vec<(ChainState, ConsensusChange)>,
    maturity_delay: u64,
    mined: u64,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            state: ChainState::default(),
            undo: Vec::new(),
            maturity_delay: DEFAULT_MATURITY_DELAY,
            mined: 0,
        }
    }

    pub fn with_maturity_delay(mut self, maturity_delay: u64) -> Self {
        self.maturity_delay = maturity_delay;
        self
    }

    /// Height of the tip, `None` before genesis.
    pub fn height(&self) -> Option<u64> {
        self.state.height
    }

    pub fn cursor(&self) -> ChangeId {
        self.state.cursor
    }

    pub fn tip(&self) -> BlockId {
        self.state.tip
    }

    pub fn contract(&self, id: &ContractId) -> Option<&FileContract> {
        self.state.contracts.get(id)
    }

    pub fn genesis(&mut self) -> ConsensusChange {
        self.mine_block(Vec::new(), Vec::new())
    }

    /// Mine a block holding `transactions` and no miner payouts.
    pub fn confirm(&mut self, transactions: Vec<Transaction>) -> ConsensusChange {
        self.mine_block(transactions, Vec::new())
    }

    /// Mine empty blocks until the tip reaches `height`.
    pub fn mine_to(&mut self, height: u64) -> Vec<ConsensusChange> {
        let mut changes = Vec::new();
        while self.state.height.map_or(true, |tip| tip < height) {
            changes.push(self.mine_block(Vec::new(), Vec::new()));
        }
        changes
    }

    pub fn mine_block(
        &mut self,
        transactions: Vec<Transaction>,
        miner_payouts: Vec<SiacoinOutput>,
    ) -> ConsensusChange {
        let snapshot = self.state.clone();
        let height = self.state.height.map_or(0, |tip| tip + 1);
        self.mined += 1;
        let block = Block {
            parent_id: self.state.tip,
            nonce: self.mined,
            timestamp: 1_600_000_000 + height * 600,
            miner_payouts,
            transactions,
        };

        let mut siacoin_output_diffs = Vec::new();
        let mut file_contract_diffs = Vec::new();
        for txn in &block.transactions {
            for input in &txn.siacoin_inputs {
                if let Some(output) = self.state.outputs.remove(&input.parent_id) {
                    siacoin_output_diffs.push(SiacoinOutputDiff {
                        direction: DiffDirection::Revert,
                        id: input.parent_id,
                        output,
                    });
                }
            }
            for (id, output) in txn.outputs_with_ids() {
                self.state.outputs.insert(id, output.clone());
                siacoin_output_diffs.push(SiacoinOutputDiff {
                    direction: DiffDirection::Apply,
                    id,
                    output: output.clone(),
                });
            }
            for (index, contract) in txn.file_contracts.iter().enumerate() {
                let id = txn.file_contract_id(index);
                self.state.contracts.insert(id, contract.clone());
                file_contract_diffs.push(FileContractDiff {
                    direction: DiffDirection::Apply,
                    id,
                    contract: contract.clone(),
                });
            }
            for revision in &txn.file_contract_revisions {
                let Some(previous) = self.state.contracts.get(&revision.parent_id).cloned() else {
                    continue;
                };
                let revised = revise(&previous, revision);
                file_contract_diffs.push(FileContractDiff {
                    direction: DiffDirection::Revert,
                    id: revision.parent_id,
                    contract: previous,
                });
                file_contract_diffs.push(FileContractDiff {
                    direction: DiffDirection::Apply,
                    id: revision.parent_id,
                    contract: revised.clone(),
                });
                self.state.contracts.insert(revision.parent_id, revised);
            }
        }

        let mut delayed_output_diffs = Vec::new();
        for (index, payout) in block.miner_payouts.iter().enumerate() {
            let diff = DelayedOutputDiff {
                direction: DiffDirection::Apply,
                id: block.miner_payout_id(index),
                output: payout.clone(),
                maturity_height: height + self.maturity_delay,
            };
            delayed_output_diffs.push(diff.clone());
            self.state.immature.push(diff);
        }
        let (matured, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.state.immature)
            .into_iter()
            .partition(|diff| diff.maturity_height <= height);
        self.state.immature = pending;
        for diff in matured {
            self.state.outputs.insert(diff.id, diff.output.clone());
            siacoin_output_diffs.push(SiacoinOutputDiff {
                direction: DiffDirection::Apply,
                id: diff.id,
                output: diff.output.clone(),
            });
            delayed_output_diffs.push(DelayedOutputDiff {
                direction: DiffDirection::Revert,
                ..diff
            });
        }

        let block_id = block.id();
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"mock change");
        hasher.update(self.state.cursor.as_bytes());
        hasher.update(block_id.as_bytes());
        hasher.update(&self.mined.to_le_bytes());
        let id = ChangeId::new(*hasher.finalize().as_bytes());

        let change = ConsensusChange {
            id,
            prior: self.state.cursor,
            reverted_blocks: Vec::new(),
            applied_blocks: vec![block],
            siacoin_output_diffs,
            delayed_output_diffs,
            file_contract_diffs,
        };
        self.state.tip = block_id;
        self.state.height = Some(height);
        self.state.cursor = id;
        self.undo.push((snapshot, change.clone()));
        change
    }

    /// Undo the most recent block, returning the change that reverts it.
    pub fn revert_tip(&mut self) -> Option<ConsensusChange> {
        let (snapshot, change) = self.undo.pop()?;
        self.state = snapshot;
        Some(change.inverse())
    }

    /// Next revision of contract `id`, ready to be edited and confirmed.
    pub fn next_revision(&self, id: &ContractId) -> Option<FileContractRevision> {
        let contract = self.state.contracts.get(id)?;
        Some(FileContractRevision {
            parent_id: *id,
            unlock_conditions: UnlockConditions::default(),
            new_revision_number: contract.revision_number + 1,
            new_file_size: contract.file_size,
            new_file_merkle_root: contract.file_merkle_root,
            new_window_start: contract.window_start,
            new_window_end: contract.window_end,
            new_valid_proof_outputs: contract.valid_proof_outputs.clone(),
            new_missed_proof_outputs: contract.missed_proof_outputs.clone(),
            new_unlock_hash: contract.unlock_hash,
        })
    }
}

fn revise(contract: &FileContract, revision: &FileContractRevision) -> FileContract {
    FileContract {
        file_size: revision.new_file_size,
        file_merkle_root: revision.new_file_merkle_root,
        window_start: revision.new_window_start,
        window_end: revision.new_window_end,
        payout: contract.payout,
        valid_proof_outputs: revision.new_valid_proof_outputs.clone(),
        missed_proof_outputs: revision.new_missed_proof_outputs.clone(),
        unlock_hash: revision.new_unlock_hash,
        revision_number: revision.new_revision_number,
    }
}

/// Consensus feed serving published changes from memory.
#[derive(Default)]
pub struct MemoryFeed {
    changes: Mutex<Vec<ConsensusChange>>,
    failures: Mutex<usize>,
    polls: AtomicUsize,
}

impl MemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, change: ConsensusChange) {
        lock(&self.changes).push(change);
    }

    pub fn publish_all(&self, changes: impl IntoIterator<Item = ConsensusChange>) {
        lock(&self.changes).extend(changes);
    }

    /// Make the next `count` polls fail.
    pub fn fail_next(&self, count: usize) {
        *lock(&self.failures) = count;
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

impl ConsensusFeed for MemoryFeed {
    fn changes_since(&self, cursor: ChangeId, limit: usize) -> Result<Vec<ConsensusChange>, FeedError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = lock(&self.failures);
            if *failures > 0 {
                *failures -= 1;
                return Err(FeedError::Unavailable("node is syncing".into()));
            }
        }

        let changes = lock(&self.changes);
        let start = match changes.iter().rposition(|change| change.id == cursor) {
            Some(index) => index + 1,
            None if cursor == ChangeId::BEGINNING => 0,
            None => {
                return Err(FeedError::Unavailable(format!(
                    "unknown consensus change {cursor}"
                )))
            }
        };
        Ok(changes.iter().skip(start).take(limit).cloned().collect())
    }
}

/// Transaction pool that records every submitted set.
pub struct RecordingPool {
    submitted: Mutex<Vec<Vec<Transaction>>>,
    outcome: PoolOutcome,
    fee_estimate: FeeEstimate,
}

#[derive(Clone)]
enum PoolOutcome {
    Accept,
    Duplicate,
    Reject(String),
}

impl Default for RecordingPool {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingPool {
    pub fn new() -> Self {
        Self {
            submitted: Mutex::new(Vec::new()),
            outcome: PoolOutcome::Accept,
            fee_estimate: FeeEstimate::new(1, 10),
        }
    }

    pub fn fail_with_duplicate(mut self) -> Self {
        self.outcome = PoolOutcome::Duplicate;
        self
    }

    pub fn reject_with(mut self, reason: impl Into<String>) -> Self {
        self.outcome = PoolOutcome::Reject(reason.into());
        self
    }

    pub fn with_fee_estimate(mut self, estimate: FeeEstimate) -> Self {
        self.fee_estimate = estimate;
        self
    }

    /// Sets the pool accepted, in submission order.
    pub fn submitted(&self) -> Vec<Vec<Transaction>> {
        lock(&self.submitted).clone()
    }
}

impl TransactionPool for RecordingPool {
    fn accept_transaction_set(&self, transactions: &[Transaction]) -> PoolResult<()> {
        match &self.outcome {
            PoolOutcome::Accept => {
                lock(&self.submitted).push(transactions.to_vec());
                Ok(())
            }
            PoolOutcome::Duplicate => Err(PoolError::Duplicate),
            PoolOutcome::Reject(reason) => Err(PoolError::rejected(reason.clone())),
        }
    }

    fn fee_estimate(&self) -> PoolResult<FeeEstimate> {
        Ok(self.fee_estimate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Address;

    fn pay(value: u128) -> Transaction {
        Transaction {
            siacoin_outputs: vec![SiacoinOutput {
                value,
                address: Address::new([1u8; 32]),
            }],
            ..Transaction::default()
        }
    }

    #[test]
    fn changes_link_through_their_cursors() {
        let mut chain = MockChain::new();
        let genesis = chain.genesis();
        assert_eq!(genesis.prior, ChangeId::BEGINNING);
        let next = chain.confirm(vec![pay(3)]);
        assert_eq!(next.prior, genesis.id);
        assert_eq!(next.applied_blocks[0].parent_id, genesis.applied_blocks[0].id());
        assert_eq!(chain.height(), Some(1));
        assert_eq!(next.siacoin_output_diffs.len(), 1);
    }

    #[test]
    fn payouts_mature_after_the_delay() {
        let mut chain = MockChain::new().with_maturity_delay(2);
        chain.genesis();
        let reward = chain.mine_block(
            Vec::new(),
            vec![SiacoinOutput {
                value: 9,
                address: Address::new([2u8; 32]),
            }],
        );
        assert_eq!(reward.delayed_output_diffs[0].maturity_height, 3);
        assert!(chain.confirm(Vec::new()).delayed_output_diffs.is_empty());
        let matured = chain.confirm(Vec::new());
        assert_eq!(matured.delayed_output_diffs.len(), 1);
        assert_eq!(matured.delayed_output_diffs[0].direction, DiffDirection::Revert);
        assert_eq!(matured.siacoin_output_diffs.len(), 1);
    }

    #[test]
    fn feed_serves_from_cursor_and_injects_failures() {
        let mut chain = MockChain::new();
        let feed = MemoryFeed::new();
        let first = chain.genesis();
        let second = chain.confirm(Vec::new());
        feed.publish_all([first.clone(), second.clone()]);

        assert_eq!(
            feed.changes_since(ChangeId::BEGINNING, 10).expect("poll"),
            vec![first.clone(), second.clone()]
        );
        assert_eq!(feed.changes_since(first.id, 10).expect("poll"), vec![second.clone()]);
        assert_eq!(feed.changes_since(ChangeId::BEGINNING, 1).expect("poll").len(), 1);

        feed.fail_next(1);
        assert!(feed.changes_since(second.id, 10).is_err());
        assert!(feed.changes_since(second.id, 10).expect("poll").is_empty());
        assert_eq!(feed.polls(), 5);
    }
}
