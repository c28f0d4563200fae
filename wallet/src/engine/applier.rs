use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, info};

use crate::chain::{
    Address, Block, ChangeId, ConsensusChange, ContractId, Currency, DiffDirection, OutputId,
    Transaction, TransactionId,
};
use crate::db::{
    BlockReward, ChainState, ContractRecord, HistoryEntry, InputValue, UtxoRecord, WalletStore,
    WalletStoreBatch,
};

use super::{limbo, EngineError, IntegrityError, WalletEngine};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The stored cursor already names this change; nothing was written.
    AlreadyApplied,
    Applied(ApplySummary),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplySummary {
    pub cursor: ChangeId,
    pub height: Option<u64>,
    /// Relevant transactions recorded in history by this change.
    pub confirmed: Vec<TransactionId>,
    /// History entries removed because their blocks were reverted.
    pub reverted: Vec<TransactionId>,
    /// Limbo entries dropped because they confirmed, in the same commit that
    /// recorded them.
    pub reconciled: usize,
    pub root: [u8; 32],
}

impl WalletEngine {
    /// Apply one consensus change. Changes must arrive in feed order: the
    /// change's `prior` has to match the stored cursor.
    pub fn apply_change(&self, change: &ConsensusChange) -> Result<ApplyOutcome, EngineError> {
        let mut store = self.write_ledger()?;
        let chain = store.view().chain_state()?;
        if chain.cursor == change.id {
            debug!(cursor = %change.id, "consensus change already applied");
            return Ok(ApplyOutcome::AlreadyApplied);
        }
        if chain.cursor != change.prior {
            return Err(IntegrityError::CursorMismatch {
                stored: chain.cursor,
                expected: change.prior,
            }
            .into());
        }

        let summary = apply_to_store(&mut store, chain, change, self.maturity_delay)?;
        limbo::reconcile_on_revert(&summary.reverted);

        info!(
            cursor = %summary.cursor,
            height = ?summary.height,
            reverted_blocks = change.reverted_blocks.len(),
            applied_blocks = change.applied_blocks.len(),
            confirmed = summary.confirmed.len(),
            reverted = summary.reverted.len(),
            reconciled = summary.reconciled,
            "applied consensus change"
        );
        Ok(ApplyOutcome::Applied(summary))
    }
}

fn apply_to_store(
    store: &mut WalletStore,
    chain: ChainState,
    change: &ConsensusChange,
    maturity_delay: u64,
) -> Result<ApplySummary, EngineError> {
    let (owned, pinned) = {
        let view = store.view();
        let owned: HashSet<Address> = view
            .addresses()?
            .into_iter()
            .map(|record| record.address)
            .collect();
        let pinned: HashSet<TransactionId> =
            view.limbo_entries()?.iter().map(|entry| entry.id()).collect();
        (owned, pinned)
    };

    let mut batch = store.batch();
    let mut height = chain.height;
    let mut reverted = Vec::new();
    for block in &change.reverted_blocks {
        let block_height = height.ok_or(IntegrityError::HeightUnderflow { block: block.id() })?;
        revert_block(&mut batch, block, block_height, &mut reverted)?;
        height = block_height.checked_sub(1);
    }

    let known_values = diff_values(change);
    let mut confirmed = Vec::new();
    let mut contract_heights = HashMap::new();
    for block in &change.applied_blocks {
        let block_height = height.map_or(0, |tip| tip + 1);
        height = Some(block_height);
        record_contract_heights(block, block_height, &mut contract_heights);
        apply_block(
            &mut batch,
            BlockContext {
                block,
                height: block_height,
                change,
                maturity_delay,
            },
            &owned,
            &pinned,
            &known_values,
            &mut confirmed,
        )?;
    }

    apply_delayed_diffs(&mut batch, change, &owned)?;
    apply_output_diffs(&mut batch, change, &owned)?;
    apply_contract_diffs(
        &mut batch,
        change,
        &owned,
        &contract_heights,
        height.unwrap_or(0),
    )?;
    let reconciled = limbo::stage_confirmed(&mut batch, &confirmed);

    batch.set_chain_state(&ChainState {
        cursor: change.id,
        height,
    })?;
    let root = batch.commit()?;

    Ok(ApplySummary {
        cursor: change.id,
        height,
        confirmed,
        reverted,
        reconciled,
        root,
    })
}

fn revert_block(
    batch: &mut WalletStoreBatch<'_>,
    block: &Block,
    block_height: u64,
    reverted: &mut Vec<TransactionId>,
) -> Result<(), EngineError> {
    for txn in &block.transactions {
        let txid = txn.id();
        let recorded = batch.view().history_entry(&txid)?;
        if let Some(entry) = recorded {
            let addresses: Vec<Address> = touched_addresses(txn).into_iter().collect();
            batch.delete_history_entry(&entry, &addresses);
            debug!(%txid, block_height, "history entry reverted");
            reverted.push(txid);
        }
    }
    for index in 0..block.miner_payouts.len() {
        batch.delete_block_reward(block_height, &block.miner_payout_id(index));
    }
    Ok(())
}

struct BlockContext<'a> {
    block: &'a Block,
    height: u64,
    change: &'a ConsensusChange,
    maturity_delay: u64,
}

fn apply_block(
    batch: &mut WalletStoreBatch<'_>,
    ctx: BlockContext<'_>,
    owned: &HashSet<Address>,
    pinned: &HashSet<TransactionId>,
    known_values: &HashMap<OutputId, (Address, Currency)>,
    confirmed: &mut Vec<TransactionId>,
) -> Result<(), EngineError> {
    let block_id = ctx.block.id();
    for (position, txn) in ctx.block.transactions.iter().enumerate() {
        let txid = txn.id();
        let owned_touched: Vec<Address> = touched_addresses(txn)
            .into_iter()
            .filter(|address| owned.contains(address))
            .collect();
        if owned_touched.is_empty() && !pinned.contains(&txid) {
            continue;
        }

        let mut input_values = Vec::with_capacity(txn.siacoin_inputs.len());
        for input in &txn.siacoin_inputs {
            let known = match known_values.get(&input.parent_id) {
                Some((owner, value)) => Some((*owner, *value)),
                None => batch
                    .view()
                    .utxo(&input.parent_id)?
                    .map(|utxo| (utxo.owner, utxo.value)),
            };
            if let Some((owner, value)) = known {
                input_values.push(InputValue {
                    parent_id: input.parent_id,
                    owner,
                    value,
                });
            }
        }

        let entry = HistoryEntry {
            txid,
            transaction: txn.clone(),
            block_id,
            block_height: ctx.height,
            block_position: position as u32,
            timestamp: ctx.block.timestamp,
            fee_per_byte: txn.fee_per_byte(),
            input_values,
        };
        batch.put_history_entry(&entry, &owned_touched)?;
        debug!(%txid, height = ctx.height, position, "history entry recorded");
        confirmed.push(txid);
    }

    for (index, payout) in ctx.block.miner_payouts.iter().enumerate() {
        if !owned.contains(&payout.address) {
            continue;
        }
        let id = ctx.block.miner_payout_id(index);
        let maturity_height = ctx
            .change
            .delayed_output_diffs
            .iter()
            .find(|diff| diff.id == id && diff.direction == DiffDirection::Apply)
            .map(|diff| diff.maturity_height)
            .unwrap_or(ctx.height + ctx.maturity_delay);
        batch.put_block_reward(&BlockReward {
            id,
            value: payout.value,
            address: payout.address,
            maturity_height,
            block_id,
            block_height: ctx.height,
        })?;
        debug!(output = %id, maturity_height, "block reward recorded");
    }
    Ok(())
}

fn apply_delayed_diffs(
    batch: &mut WalletStoreBatch<'_>,
    change: &ConsensusChange,
    owned: &HashSet<Address>,
) -> Result<(), EngineError> {
    for diff in &change.delayed_output_diffs {
        match diff.direction {
            DiffDirection::Apply => {
                if !owned.contains(&diff.output.address) {
                    continue;
                }
                batch.put_utxo(&UtxoRecord {
                    id: diff.id,
                    value: diff.output.value,
                    owner: diff.output.address,
                    maturity_height: Some(diff.maturity_height),
                })?;
                debug!(output = %diff.id, maturity = diff.maturity_height, "immature output added");
            }
            DiffDirection::Revert => {
                let still_immature = batch
                    .view()
                    .utxo(&diff.id)?
                    .map_or(false, |utxo| utxo.maturity_height.is_some());
                if still_immature {
                    batch.delete_utxo(&diff.id);
                    debug!(output = %diff.id, "immature output removed");
                }
            }
        }
    }
    Ok(())
}

fn apply_output_diffs(
    batch: &mut WalletStoreBatch<'_>,
    change: &ConsensusChange,
    owned: &HashSet<Address>,
) -> Result<(), EngineError> {
    for diff in &change.siacoin_output_diffs {
        match diff.direction {
            DiffDirection::Apply => {
                if !owned.contains(&diff.output.address) {
                    continue;
                }
                batch.put_utxo(&UtxoRecord {
                    id: diff.id,
                    value: diff.output.value,
                    owner: diff.output.address,
                    maturity_height: None,
                })?;
                debug!(output = %diff.id, value = %diff.output.value, "output added");
            }
            DiffDirection::Revert => {
                // An immature record belongs to the delayed set, which its own
                // diffs maintain.
                let spendable = batch
                    .view()
                    .utxo(&diff.id)?
                    .map_or(false, |utxo| utxo.maturity_height.is_none());
                if spendable {
                    batch.delete_utxo(&diff.id);
                    debug!(output = %diff.id, "output removed");
                }
            }
        }
    }
    Ok(())
}

/// Height of the block that carried each contract revision applied by
/// `block`, keyed by contract id and revision number.
fn record_contract_heights(
    block: &Block,
    block_height: u64,
    heights: &mut HashMap<(ContractId, u64), u64>,
) {
    for txn in &block.transactions {
        for (index, contract) in txn.file_contracts.iter().enumerate() {
            heights.insert(
                (txn.file_contract_id(index), contract.revision_number),
                block_height,
            );
        }
        for revision in &txn.file_contract_revisions {
            heights.insert(
                (revision.parent_id, revision.new_revision_number),
                block_height,
            );
        }
    }
}

fn apply_contract_diffs(
    batch: &mut WalletStoreBatch<'_>,
    change: &ConsensusChange,
    owned: &HashSet<Address>,
    heights: &HashMap<(ContractId, u64), u64>,
    tip_height: u64,
) -> Result<(), EngineError> {
    for diff in &change.file_contract_diffs {
        let revision = diff.contract.revision_number;
        match diff.direction {
            DiffDirection::Apply => {
                if !diff.contract.addresses().any(|address| owned.contains(address)) {
                    continue;
                }
                // A revision already on record keeps the height it was first seen at.
                if batch.view().contract_revision(&diff.id, revision)?.is_some() {
                    continue;
                }
                // Diffs without a carrying transaction land at the batch tip.
                let recorded_height = heights
                    .get(&(diff.id, revision))
                    .copied()
                    .unwrap_or(tip_height);
                batch.put_contract(&ContractRecord {
                    id: diff.id,
                    contract: diff.contract.clone(),
                    recorded_height,
                })?;
                debug!(contract = %diff.id, revision, "contract revision recorded");
            }
            DiffDirection::Revert => {
                let superseded = change.file_contract_diffs.iter().any(|other| {
                    other.direction == DiffDirection::Apply
                        && other.id == diff.id
                        && other.contract.revision_number > revision
                });
                if superseded {
                    continue;
                }
                if batch.view().contract_revision(&diff.id, revision)?.is_some() {
                    batch.delete_contract_revision(&diff.id, revision);
                    debug!(contract = %diff.id, revision, "contract revision removed");
                }
            }
        }
    }
    Ok(())
}

/// Output values announced by the change itself, used before the UTXO set
/// when caching input values.
fn diff_values(change: &ConsensusChange) -> HashMap<OutputId, (Address, Currency)> {
    let mut values = HashMap::new();
    for diff in &change.siacoin_output_diffs {
        values.insert(diff.id, (diff.output.address, diff.output.value));
    }
    for diff in &change.delayed_output_diffs {
        values.insert(diff.id, (diff.output.address, diff.output.value));
    }
    values
}

/// Every address a transaction spends from, pays, or names in a contract.
pub(crate) fn touched_addresses(txn: &Transaction) -> BTreeSet<Address> {
    let mut addresses = BTreeSet::new();
    for input in &txn.siacoin_inputs {
        addresses.insert(input.unlock_conditions.address());
    }
    for output in &txn.siacoin_outputs {
        addresses.insert(output.address);
    }
    for contract in &txn.file_contracts {
        addresses.extend(contract.addresses().copied());
    }
    for revision in &txn.file_contract_revisions {
        addresses.extend(revision.addresses().copied());
    }
    addresses
}
