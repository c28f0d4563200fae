use serde::{Deserialize, Serialize};

use super::types::{Block, ChangeId, ContractId, FileContract, OutputId, SiacoinOutput};

/// Whether a diff adds state to the ledger or takes it away.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiffDirection {
    Apply,
    Revert,
}

impl DiffDirection {
    pub fn flipped(self) -> Self {
        match self {
            DiffDirection::Apply => DiffDirection::Revert,
            DiffDirection::Revert => DiffDirection::Apply,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiacoinOutputDiff {
    pub direction: DiffDirection,
    pub id: OutputId,
    pub output: SiacoinOutput,
}

/// Output that only becomes spendable once the chain reaches `maturity_height`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayedOutputDiff {
    pub direction: DiffDirection,
    pub id: OutputId,
    pub output: SiacoinOutput,
    pub maturity_height: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContractDiff {
    pub direction: DiffDirection,
    pub id: ContractId,
    pub contract: FileContract,
}

/// One ordered batch delivered by the consensus feed.
///
/// `prior` names the cursor the batch was computed against; `id` becomes the
/// stored cursor once the batch is applied.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusChange {
    pub id: ChangeId,
    pub prior: ChangeId,
    pub reverted_blocks: Vec<Block>,
    pub applied_blocks: Vec<Block>,
    pub siacoin_output_diffs: Vec<SiacoinOutputDiff>,
    pub delayed_output_diffs: Vec<DelayedOutputDiff>,
    pub file_contract_diffs: Vec<FileContractDiff>,
}

impl ConsensusChange {
    /// The batch that undoes `self`: blocks swap sides, diffs run backwards
    /// with their directions flipped, and the cursor moves back to `prior`.
    pub fn inverse(&self) -> ConsensusChange {
        ConsensusChange {
            id: self.prior,
            prior: self.id,
            reverted_blocks: self.applied_blocks.iter().rev().cloned().collect(),
            applied_blocks: self.reverted_blocks.iter().rev().cloned().collect(),
            siacoin_output_diffs: self
                .siacoin_output_diffs
                .iter()
                .rev()
                .map(|diff| SiacoinOutputDiff {
                    direction: diff.direction.flipped(),
                    ..diff.clone()
                })
                .collect(),
            delayed_output_diffs: self
                .delayed_output_diffs
                .iter()
                .rev()
                .map(|diff| DelayedOutputDiff {
                    direction: diff.direction.flipped(),
                    ..diff.clone()
                })
                .collect(),
            file_contract_diffs: self
                .file_contract_diffs
                .iter()
                .rev()
                .map(|diff| FileContractDiff {
                    direction: diff.direction.flipped(),
                    ..diff.clone()
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.reverted_blocks.is_empty()
            && self.applied_blocks.is_empty()
            && self.siacoin_output_diffs.is_empty()
            && self.delayed_output_diffs.is_empty()
            && self.file_contract_diffs.is_empty()
    }
}
