use tracing::debug;

use crate::chain::{Transaction, TransactionId};
use crate::db::{LimboEntry, WalletStore, WalletStoreBatch};

use super::{now_ms, EngineError, WalletEngine};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LimboInsert {
    Inserted,
    /// Already pinned, or already confirmed in history. Nothing changed.
    Duplicate,
}

impl WalletEngine {
    /// Pin an unconfirmed transaction so queries that include limbo see it.
    pub fn add_to_limbo(&self, transaction: Transaction) -> Result<LimboInsert, EngineError> {
        let mut outcomes = self.add_set_to_limbo(vec![transaction])?;
        Ok(outcomes.pop().unwrap_or(LimboInsert::Duplicate))
    }

    /// Pin a transaction set in a single commit, reporting one outcome per transaction.
    pub fn add_set_to_limbo(
        &self,
        transactions: Vec<Transaction>,
    ) -> Result<Vec<LimboInsert>, EngineError> {
        let since = now_ms();
        let mut store = self.write_ledger()?;
        let mut batch = store.batch();
        let mut outcomes = Vec::with_capacity(transactions.len());
        for transaction in transactions {
            let txid = transaction.id();
            let view = batch.view();
            if view.contains_limbo(&txid) || view.contains_history(&txid) {
                outcomes.push(LimboInsert::Duplicate);
                continue;
            }
            batch.put_limbo_entry(&LimboEntry {
                transaction,
                limbo_since_ms: since,
            })?;
            debug!(%txid, "transaction pinned in limbo");
            outcomes.push(LimboInsert::Inserted);
        }
        batch.commit()?;
        Ok(outcomes)
    }

    /// Unpin a transaction. An unknown id is not an error.
    pub fn remove_from_limbo(&self, txid: &TransactionId) -> Result<Option<LimboEntry>, EngineError> {
        let mut store = self.write_ledger()?;
        let Some(entry) = store.view().limbo_entry(txid)? else {
            return Ok(None);
        };
        let mut batch = store.batch();
        batch.delete_limbo_entry(txid);
        batch.commit()?;
        debug!(%txid, "transaction removed from limbo");
        Ok(Some(entry))
    }

    pub fn limbo(&self) -> Result<Vec<LimboEntry>, EngineError> {
        Ok(self.read_ledger()?.view().limbo_entries()?)
    }

    pub fn limbo_entry(&self, txid: &TransactionId) -> Result<Option<LimboEntry>, EngineError> {
        Ok(self.read_ledger()?.view().limbo_entry(txid)?)
    }
}

/// Stage the removal of limbo entries for `confirmed` transactions in
/// `batch`, so they leave limbo in the commit that records them in history.
pub(crate) fn stage_confirmed(
    batch: &mut WalletStoreBatch<'_>,
    confirmed: &[TransactionId],
) -> usize {
    let mut removed = 0;
    for txid in confirmed {
        if batch.view().contains_limbo(txid) {
            batch.delete_limbo_entry(txid);
            debug!(%txid, "limbo transaction confirmed");
            removed += 1;
        }
    }
    removed
}

/// Reverted transactions stay out of limbo; whoever broadcast them resubmits.
pub(crate) fn reconcile_on_revert(reverted: &[TransactionId]) {
    for txid in reverted {
        debug!(%txid, "confirmed transaction reverted, not returned to limbo");
    }
}

/// Drop limbo entries whose transactions are already in history, as left by
/// ledgers written before confirmation and reconciliation shared a commit.
pub(crate) fn sweep_confirmed(store: &mut WalletStore) -> Result<usize, EngineError> {
    let confirmed: Vec<TransactionId> = {
        let view = store.view();
        view.limbo_entries()?
            .iter()
            .map(LimboEntry::id)
            .filter(|txid| view.contains_history(txid))
            .collect()
    };
    let mut batch = store.batch();
    let removed = stage_confirmed(&mut batch, &confirmed);
    batch.commit()?;
    Ok(removed)
}
