use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::chain::{
    BlockChange, BlockDiffs, DelayedOutputDiff, DiffDirection, EngineError, OutputDiff,
};
use crate::types::{
    Address, Block, BlockId, Currency, Output, OutputId, SignatureAlgorithm, Transaction,
    miner_payout_id,
};

use super::DevnetConfig;

/// Best chain plus the unspent and scheduled output sets it implies.
pub(super) struct ChainState {
    pub blocks: Vec<Block>,
    diffs: Vec<BlockDiffs>,
    heights: HashMap<BlockId, u64>,
    pub utxos: HashMap<OutputId, Output>,
    /// maturity height → payouts maturing there
    delayed: BTreeMap<u64, Vec<(OutputId, Output)>>,
    next_nonce: u64,
}

impl ChainState {
    pub fn new(cfg: &DevnetConfig) -> (Self, BlockChange) {
        let mut st = Self {
            blocks: Vec::new(),
            diffs: Vec::new(),
            heights: HashMap::new(),
            utxos: HashMap::new(),
            delayed: BTreeMap::new(),
            next_nonce: 1,
        };
        let genesis = Block {
            parent_id: BlockId::ZERO,
            nonce: 0,
            timestamp: cfg.genesis_timestamp,
            miner_payouts: Vec::new(),
            transactions: Vec::new(),
        };
        let mut change = st.apply_block(genesis, cfg);
        if cfg.emit_genesis_payout_diff {
            // reproduce the upstream diff for a payout that never existed
            let phantom = DelayedOutputDiff {
                direction: DiffDirection::Apply,
                id: miner_payout_id(&change.block.id(), 0),
                output: Output { value: cfg.block_reward, address: Address::VOID },
                maturity_height: cfg.maturity_delay,
            };
            change.diffs.delayed_output_diffs.insert(0, phantom.clone());
            st.diffs[0].delayed_output_diffs.insert(0, phantom);
        }
        (st, change)
    }

    pub fn height(&self) -> u64 {
        self.blocks.len() as u64
    }

    pub fn tip(&self) -> &Block {
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn block_by_id(&self, id: &BlockId) -> Option<(Block, u64)> {
        let h = *self.heights.get(id)?;
        self.blocks.get(h as usize).map(|b| (b.clone(), h))
    }

    /// Build the next block from `txns` (already validated) and apply it.
    pub fn mine(
        &mut self,
        cfg: &DevnetConfig,
        payout: Address,
        txns: Vec<Transaction>,
    ) -> BlockChange {
        let fees = Currency::sum(txns.iter().flat_map(|t| t.miner_fees.iter())).unwrap_or_default();
        let reward = cfg.block_reward.checked_add(fees).unwrap_or(cfg.block_reward);
        let height = self.height();
        let block = Block {
            parent_id: self.tip().id(),
            nonce: self.next_nonce,
            timestamp: cfg.genesis_timestamp + height * cfg.block_time,
            miner_payouts: vec![Output { value: reward, address: payout }],
            transactions: txns,
        };
        self.next_nonce += 1;
        self.apply_block(block, cfg)
    }

    fn apply_block(&mut self, block: Block, cfg: &DevnetConfig) -> BlockChange {
        let height = self.height();
        let id = block.id();
        let mut diffs = BlockDiffs::default();

        for txn in &block.transactions {
            for input in &txn.inputs {
                if let Some(output) = self.utxos.remove(&input.parent_id) {
                    diffs.output_diffs.push(OutputDiff {
                        direction: DiffDirection::Revert,
                        id: input.parent_id,
                        output,
                    });
                }
            }
            for (i, output) in txn.outputs.iter().enumerate() {
                let oid = txn.output_id(i as u64);
                self.utxos.insert(oid, output.clone());
                diffs.output_diffs.push(OutputDiff {
                    direction: DiffDirection::Apply,
                    id: oid,
                    output: output.clone(),
                });
            }
        }

        for (i, payout) in block.miner_payouts.iter().enumerate() {
            let oid = miner_payout_id(&id, i as u64);
            let maturity_height = height + cfg.maturity_delay;
            self.delayed.entry(maturity_height).or_default().push((oid, payout.clone()));
            diffs.delayed_output_diffs.push(DelayedOutputDiff {
                direction: DiffDirection::Apply,
                id: oid,
                output: payout.clone(),
                maturity_height,
            });
        }

        for (oid, output) in self.delayed.remove(&height).unwrap_or_default() {
            diffs.delayed_output_diffs.push(DelayedOutputDiff {
                direction: DiffDirection::Revert,
                id: oid,
                output: output.clone(),
                maturity_height: height,
            });
            self.utxos.insert(oid, output.clone());
            diffs.output_diffs.push(OutputDiff { direction: DiffDirection::Apply, id: oid, output });
        }

        self.heights.insert(id, height);
        self.blocks.push(block.clone());
        self.diffs.push(diffs.clone());
        BlockChange { block, diffs }
    }

    /// Pop the tip and undo its effects. Never pops genesis.
    pub fn revert_tip(&mut self) -> Option<BlockChange> {
        if self.blocks.len() <= 1 {
            return None;
        }
        let block = self.blocks.pop()?;
        let diffs = self.diffs.pop()?;
        self.heights.remove(&block.id());

        for d in diffs.output_diffs.iter().rev() {
            match d.direction {
                DiffDirection::Apply => {
                    self.utxos.remove(&d.id);
                }
                DiffDirection::Revert => {
                    self.utxos.insert(d.id, d.output.clone());
                }
            }
        }
        for d in diffs.delayed_output_diffs.iter().rev() {
            match d.direction {
                DiffDirection::Apply => {
                    if let Some(list) = self.delayed.get_mut(&d.maturity_height) {
                        list.retain(|(id, _)| *id != d.id);
                        if list.is_empty() {
                            self.delayed.remove(&d.maturity_height);
                        }
                    }
                }
                DiffDirection::Revert => {
                    self.delayed
                        .entry(d.maturity_height)
                        .or_default()
                        .push((d.id, d.output.clone()));
                }
            }
        }
        Some(BlockChange { block, diffs })
    }

    /// Check `txn` against the unspent set at the next height. `spent` holds
    /// outputs already claimed by other transactions in the same batch.
    pub fn validate(
        &self,
        txn: &Transaction,
        spent: &HashSet<OutputId>,
    ) -> Result<(), EngineError> {
        if txn.inputs.is_empty() {
            return Err(EngineError::NoInputs);
        }
        let height = self.height();
        let mut seen = HashSet::new();
        let mut inputs_total = Currency::ZERO;
        for input in &txn.inputs {
            let pid = input.parent_id;
            if !seen.insert(pid) || spent.contains(&pid) {
                return Err(EngineError::DoubleSpend(pid));
            }
            let parent = self.utxos.get(&pid).ok_or(EngineError::MissingInput(pid))?;
            if input.unlock_conditions.unlock_hash() != parent.address {
                return Err(EngineError::UnlockHashMismatch(pid));
            }
            if input.unlock_conditions.timelock > height {
                return Err(EngineError::Timelocked(pid));
            }
            inputs_total =
                inputs_total.checked_add(parent.value).ok_or(EngineError::ValueMismatch)?;
        }
        if txn.total_output_value() != Some(inputs_total) {
            return Err(EngineError::ValueMismatch);
        }

        let mut valid: HashSet<(OutputId, u64)> = HashSet::new();
        for (j, sig) in txn.signatures.iter().enumerate() {
            let input = txn
                .inputs
                .iter()
                .find(|i| i.parent_id == sig.parent_id)
                .ok_or(EngineError::InvalidSignature(j))?;
            let pk = input
                .unlock_conditions
                .public_keys
                .get(sig.public_key_index as usize)
                .ok_or(EngineError::InvalidSignature(j))?;
            if sig.timelock > height || pk.algorithm != SignatureAlgorithm::Ed25519 {
                return Err(EngineError::InvalidSignature(j));
            }
            let digest = txn.sig_hash(j).ok_or(EngineError::InvalidSignature(j))?;
            verify_ed25519(&pk.key, &digest, &sig.signature)
                .ok_or(EngineError::InvalidSignature(j))?;
            valid.insert((sig.parent_id, sig.public_key_index));
        }
        for input in &txn.inputs {
            let count = valid.iter().filter(|(pid, _)| *pid == input.parent_id).count() as u64;
            if count < input.unlock_conditions.signatures_required {
                return Err(EngineError::InsufficientSignatures(input.parent_id));
            }
        }
        Ok(())
    }
}

fn verify_ed25519(key: &[u8], msg: &[u8], sig: &[u8]) -> Option<()> {
    let key: [u8; 32] = key.try_into().ok()?;
    let vk = VerifyingKey::from_bytes(&key).ok()?;
    let sig = Signature::from_slice(sig).ok()?;
    vk.verify(msg, &sig).ok()
}
