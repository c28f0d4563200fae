use std::collections::{BTreeMap, HashSet};

use crate::chain::{
    Address, ChangeId, ContractId, Currency, OutputId, Transaction, TransactionId,
    UnlockConditions,
};
use crate::db::{
    AddressPolicy, BlockReward, ContractRecord, HistoryEntry, LedgerView, LimboEntry, UtxoRecord,
};

use super::{EngineError, WalletEngine};

/// Result-size bound taken from a signed `max` argument: negative means
/// unbounded and zero yields nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Limit {
    Unbounded,
    AtMost(usize),
}

impl Limit {
    pub fn from_max(max: i64) -> Self {
        if max < 0 {
            Limit::Unbounded
        } else {
            Limit::AtMost(usize::try_from(max).unwrap_or(usize::MAX))
        }
    }

    pub fn as_option(self) -> Option<usize> {
        match self {
            Limit::Unbounded => None,
            Limit::AtMost(count) => Some(count),
        }
    }

    fn apply<T>(self, mut items: Vec<T>) -> Vec<T> {
        if let Limit::AtMost(count) = self {
            items.truncate(count);
        }
        items
    }
}

/// Value moved by a transaction from the wallet's point of view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransactionFlow {
    /// Sum of outputs paying owned addresses.
    pub credit: Currency,
    /// Sum of owned input values cached at confirmation.
    pub debit: Currency,
    pub fee_per_byte: Currency,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConsensusInfo {
    pub cursor: ChangeId,
    pub height: Option<u64>,
}

fn owned_set(view: &LedgerView<'_>) -> Result<HashSet<Address>, EngineError> {
    Ok(view
        .addresses()?
        .into_iter()
        .map(|record| record.address)
        .collect())
}

fn sum(values: impl Iterator<Item = Currency>) -> Currency {
    values.fold(0, Currency::saturating_add)
}

/// Spendable outputs as seen from `view`, optionally overlaid with limbo.
pub(crate) fn spendable_outputs(
    view: &LedgerView<'_>,
    include_limbo: bool,
) -> Result<Vec<UtxoRecord>, EngineError> {
    let height = view.chain_state()?.height;
    let mut outputs: Vec<UtxoRecord> = view
        .utxos()?
        .into_iter()
        .filter(|utxo| utxo.is_mature(height))
        .collect();
    if !include_limbo {
        return Ok(outputs);
    }

    let limbo = view.limbo_entries()?;
    let spent: HashSet<OutputId> = limbo
        .iter()
        .flat_map(|entry| entry.transaction.siacoin_inputs.iter())
        .map(|input| input.parent_id)
        .collect();
    outputs.retain(|utxo| !spent.contains(&utxo.id));

    let owned = owned_set(view)?;
    for entry in &limbo {
        for (id, output) in entry.transaction.outputs_with_ids() {
            if owned.contains(&output.address) && !spent.contains(&id) {
                outputs.push(UtxoRecord {
                    id,
                    value: output.value,
                    owner: output.address,
                    maturity_height: None,
                });
            }
        }
    }
    Ok(outputs)
}

fn flow_of(entry: &HistoryEntry, owned: &HashSet<Address>) -> TransactionFlow {
    TransactionFlow {
        credit: sum(entry
            .transaction
            .siacoin_outputs
            .iter()
            .filter(|output| owned.contains(&output.address))
            .map(|output| output.value)),
        debit: sum(entry
            .input_values
            .iter()
            .filter(|input| owned.contains(&input.owner))
            .map(|input| input.value)),
        fee_per_byte: entry.fee_per_byte,
    }
}

impl WalletEngine {
    pub fn balance(&self, include_limbo: bool) -> Result<Currency, EngineError> {
        let store = self.read_ledger()?;
        let outputs = spendable_outputs(&store.view(), include_limbo)?;
        Ok(sum(outputs.into_iter().map(|utxo| utxo.value)))
    }

    /// Mature confirmed outputs; with `include_limbo`, minus outputs limbo
    /// spends and plus owned outputs limbo creates.
    pub fn unspent_outputs(&self, include_limbo: bool) -> Result<Vec<UtxoRecord>, EngineError> {
        let store = self.read_ledger()?;
        spendable_outputs(&store.view(), include_limbo)
    }

    /// Spendable outputs paired with the unlock conditions of their owning
    /// address, when the wallet derived it. Both come from one ledger state.
    pub fn unspent_outputs_with_conditions(
        &self,
        include_limbo: bool,
    ) -> Result<Vec<(UtxoRecord, Option<UnlockConditions>)>, EngineError> {
        let store = self.read_ledger()?;
        let view = store.view();
        let outputs = spendable_outputs(&view, include_limbo)?;
        let mut paired = Vec::with_capacity(outputs.len());
        for utxo in outputs {
            let conditions = match view.address_policy(&utxo.owner)? {
                Some(AddressPolicy::Derived {
                    unlock_conditions, ..
                }) => Some(unlock_conditions),
                _ => None,
            };
            paired.push((utxo, conditions));
        }
        Ok(paired)
    }

    /// Every tracked output including immature miner payouts.
    pub fn tracked_outputs(&self) -> Result<Vec<UtxoRecord>, EngineError> {
        Ok(self.read_ledger()?.view().utxos()?)
    }

    pub fn transaction(&self, txid: &TransactionId) -> Result<Option<HistoryEntry>, EngineError> {
        Ok(self.read_ledger()?.view().history_entry(txid)?)
    }

    /// Confirmed history, newest first.
    pub fn transactions(&self, limit: Limit) -> Result<Vec<HistoryEntry>, EngineError> {
        Ok(self.read_ledger()?.view().history(limit.as_option())?)
    }

    pub fn transactions_by_address(
        &self,
        address: &Address,
        limit: Limit,
    ) -> Result<Vec<HistoryEntry>, EngineError> {
        Ok(self
            .read_ledger()?
            .view()
            .history_for_address(address, limit.as_option())?)
    }

    /// History entries with their flows for the requested ids; unknown ids
    /// are omitted.
    pub fn batch_transactions_with_flow(
        &self,
        ids: &[TransactionId],
    ) -> Result<Vec<(HistoryEntry, TransactionFlow)>, EngineError> {
        let store = self.read_ledger()?;
        let view = store.view();
        let owned = owned_set(&view)?;
        let mut entries = Vec::with_capacity(ids.len());
        for txid in ids {
            if let Some(entry) = view.history_entry(txid)? {
                let flow = flow_of(&entry, &owned);
                entries.push((entry, flow));
            }
        }
        Ok(entries)
    }

    pub fn transaction_with_flow(
        &self,
        txid: &TransactionId,
    ) -> Result<Option<(HistoryEntry, TransactionFlow)>, EngineError> {
        let store = self.read_ledger()?;
        let view = store.view();
        let Some(entry) = view.history_entry(txid)? else {
            return Ok(None);
        };
        let flow = flow_of(&entry, &owned_set(&view)?);
        Ok(Some((entry, flow)))
    }

    pub fn transaction_flow(&self, txid: &TransactionId) -> Result<Option<TransactionFlow>, EngineError> {
        Ok(self.transaction_with_flow(txid)?.map(|(_, flow)| flow))
    }

    /// Limbo transactions whose outputs `txn` spends.
    pub fn unconfirmed_parents(&self, txn: &Transaction) -> Result<Vec<LimboEntry>, EngineError> {
        let spent: HashSet<OutputId> = txn
            .siacoin_inputs
            .iter()
            .map(|input| input.parent_id)
            .collect();
        let limbo = self.read_ledger()?.view().limbo_entries()?;
        Ok(limbo
            .into_iter()
            .filter(|entry| {
                entry
                    .transaction
                    .outputs_with_ids()
                    .iter()
                    .any(|(id, _)| spent.contains(id))
            })
            .collect())
    }

    /// Miner payouts to owned addresses, newest first.
    pub fn block_rewards(&self, limit: Limit) -> Result<Vec<BlockReward>, EngineError> {
        let mut rewards = self.read_ledger()?.view().block_rewards()?;
        rewards.reverse();
        Ok(limit.apply(rewards))
    }

    /// Latest revision of every contract, newest first by recorded height.
    pub fn file_contracts(&self, limit: Limit) -> Result<Vec<ContractRecord>, EngineError> {
        let revisions = self.read_ledger()?.view().contracts()?;
        let mut latest: BTreeMap<ContractId, ContractRecord> = BTreeMap::new();
        for record in revisions {
            // Revisions of one contract are stored in ascending order.
            latest.insert(record.id, record);
        }
        let mut contracts: Vec<ContractRecord> = latest.into_values().collect();
        contracts.sort_by(|a, b| {
            b.recorded_height
                .cmp(&a.recorded_height)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(limit.apply(contracts))
    }

    /// Every recorded revision of `id`, oldest first.
    pub fn file_contract_history(&self, id: &ContractId) -> Result<Vec<ContractRecord>, EngineError> {
        Ok(self.read_ledger()?.view().contract_revisions(id)?)
    }

    pub fn consensus_info(&self) -> Result<ConsensusInfo, EngineError> {
        let chain = self.read_ledger()?.view().chain_state()?;
        Ok(ConsensusInfo {
            cursor: chain.cursor,
            height: chain.height,
        })
    }
}
