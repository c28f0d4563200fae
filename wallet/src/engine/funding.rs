use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::chain::{Address, Currency, OutputId, SiacoinInput, SiacoinOutput, Transaction, UnlockConditions};
use crate::db::{AddressPolicy, LedgerView};
use crate::modes::WalletKind;

use super::query::spendable_outputs;
use super::{EngineError, IntegrityError, WalletEngine};

/// Encoded size of one input with its whole-transaction signature.
pub const INPUT_BYTES: u64 = 32 + (8 + 8 + 32 + 8) + SIGNATURE_BYTES;
const SIGNATURE_BYTES: u64 = 32 + 8 + 8 + 1 + (8 + 64);
pub const OUTPUT_BYTES: u64 = 16 + 32;
/// Length prefixes of every transaction field plus a single miner fee.
pub const TRANSACTION_OVERHEAD_BYTES: u64 = 7 * 8 + 16;
/// Destination plus change.
const FUNDED_OUTPUTS: usize = 2;

pub fn estimated_size(inputs: usize, outputs: usize) -> u64 {
    TRANSACTION_OVERHEAD_BYTES + inputs as u64 * INPUT_BYTES + outputs as u64 * OUTPUT_BYTES
}

pub fn estimate_fee(inputs: usize, outputs: usize, fee_per_byte: Currency) -> Currency {
    u128::from(estimated_size(inputs, outputs)).saturating_mul(fee_per_byte)
}

/// Spendable output selected to fund a transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValuedInput {
    pub parent_id: OutputId,
    pub unlock_conditions: UnlockConditions,
    pub value: Currency,
    /// Created by an unconfirmed limbo transaction.
    pub from_limbo: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FundingPlan {
    pub inputs: Vec<ValuedInput>,
    pub fee: Currency,
    pub change: Currency,
}

impl FundingPlan {
    pub fn input_total(&self) -> Currency {
        self.inputs
            .iter()
            .fold(0, |acc, input| acc.saturating_add(input.value))
    }

    /// Unsigned transaction paying `destination`, returning change to
    /// `change_address` when there is any.
    pub fn into_transaction(self, destination: SiacoinOutput, change_address: Address) -> Transaction {
        let mut siacoin_outputs = vec![destination];
        if self.change > 0 {
            siacoin_outputs.push(SiacoinOutput {
                value: self.change,
                address: change_address,
            });
        }
        Transaction {
            siacoin_inputs: self
                .inputs
                .into_iter()
                .map(|input| SiacoinInput {
                    parent_id: input.parent_id,
                    unlock_conditions: input.unlock_conditions,
                })
                .collect(),
            siacoin_outputs,
            miner_fees: vec![self.fee],
            ..Transaction::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FundingError {
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: Currency,
        available: Currency,
    },
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl WalletEngine {
    /// Select inputs covering `amount` plus the fee at `fee_per_byte`.
    pub fn fund_transaction(
        &self,
        amount: Currency,
        fee_per_byte: Currency,
    ) -> Result<FundingPlan, FundingError> {
        self.fund_transaction_with(amount, fee_per_byte, &mut rand::thread_rng())
    }

    pub fn fund_transaction_with<R: Rng + ?Sized>(
        &self,
        amount: Currency,
        fee_per_byte: Currency,
        rng: &mut R,
    ) -> Result<FundingPlan, FundingError> {
        if self.kind != WalletKind::Seed {
            return Err(EngineError::Validation(format!(
                "a {} wallet cannot fund transactions",
                self.kind
            ))
            .into());
        }
        if amount == 0 {
            return Err(EngineError::Validation("funding amount must be positive".into()).into());
        }

        let (confirmed, pending) = {
            let store = self.read_ledger()?;
            candidates(&store.view())?
        };

        match select(confirmed.clone(), amount, fee_per_byte, rng) {
            Err(FundingError::InsufficientFunds { .. }) if !pending.is_empty() => {
                let mut all = confirmed;
                all.extend(pending);
                select(all, amount, fee_per_byte, rng)
            }
            result => result,
        }
    }
}

/// Spendable outputs split into confirmed ones and ones created in limbo.
fn candidates(view: &LedgerView<'_>) -> Result<(Vec<ValuedInput>, Vec<ValuedInput>), EngineError> {
    let confirmed_ids: HashSet<OutputId> = view.utxos()?.into_iter().map(|utxo| utxo.id).collect();
    let mut confirmed = Vec::new();
    let mut pending = Vec::new();
    for utxo in spendable_outputs(view, true)? {
        let unlock_conditions = match view.address_policy(&utxo.owner)? {
            Some(AddressPolicy::Derived {
                unlock_conditions, ..
            }) => unlock_conditions,
            Some(AddressPolicy::Watched { .. }) => continue,
            None => {
                return Err(IntegrityError::MissingOwner {
                    output: utxo.id,
                    address: utxo.owner,
                }
                .into())
            }
        };
        let from_limbo = !confirmed_ids.contains(&utxo.id);
        let input = ValuedInput {
            parent_id: utxo.id,
            unlock_conditions,
            value: utxo.value,
            from_limbo,
        };
        if from_limbo {
            pending.push(input);
        } else {
            confirmed.push(input);
        }
    }
    Ok((confirmed, pending))
}

fn select<R: Rng + ?Sized>(
    mut candidates: Vec<ValuedInput>,
    amount: Currency,
    fee_per_byte: Currency,
    rng: &mut R,
) -> Result<FundingPlan, FundingError> {
    let required_for =
        |inputs: usize| amount.saturating_add(estimate_fee(inputs, FUNDED_OUTPUTS, fee_per_byte));
    let available = candidates
        .iter()
        .fold(0u128, |acc, input| acc.saturating_add(input.value));

    candidates.shuffle(rng);
    let mut selected = Vec::new();
    let mut total: Currency = 0;
    for candidate in candidates {
        total = total.saturating_add(candidate.value);
        selected.push(candidate);
        if total >= required_for(selected.len()) {
            break;
        }
    }
    if selected.is_empty() || total < required_for(selected.len()) {
        return Err(FundingError::InsufficientFunds {
            required: required_for(selected.len().max(1)),
            available,
        });
    }

    // Drop the smallest inputs while the rest still covers amount and fee.
    selected.sort_by(|a, b| b.value.cmp(&a.value));
    while selected.len() > 1 {
        let smallest = selected[selected.len() - 1].value;
        if total - smallest >= required_for(selected.len() - 1) {
            selected.pop();
            total -= smallest;
        } else {
            break;
        }
    }

    let fee = estimate_fee(selected.len(), FUNDED_OUTPUTS, fee_per_byte);
    Ok(FundingPlan {
        change: total - amount - fee,
        inputs: selected,
        fee,
    })
}
