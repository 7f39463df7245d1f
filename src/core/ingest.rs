//! Diff ingestion: the only writer of the index.
//!
//! Each batch is applied in one write transaction: reverted blocks are undone
//! newest first, applied blocks are recorded oldest first, and the cursor is
//! written alongside. Readers see either all of a batch or none of it.

use std::sync::{Mutex, PoisonError};
use tracing::{debug, error, info};

use crate::chain::{BlockChange, ChangeBatch, ChangeSubscriber, DiffDirection};
use crate::invariant_violation;
use crate::runtime::block_metadata::{BlockInfo, BlockMetadata, DelayedOutput};
use crate::runtime::store::{ChainCursor, IndexStore, WriteTxn};
use crate::runtime::{IndexError, utxo};
use crate::types::{BlockId, Output, OutputId, miner_payout_id};

/// Heights between "still syncing" progress lines.
const PROGRESS_EVERY: u64 = 1000;

pub struct Ingester {
    store: IndexStore,
    /// The upstream engine emits a delayed diff for the genesis block's
    /// first miner payout although that output never existed.
    genesis_payout: OutputId,
    writer: Mutex<()>,
}

impl Ingester {
    pub fn new(store: IndexStore, genesis_id: &BlockId) -> Self {
        Self { store, genesis_payout: miner_payout_id(genesis_id, 0), writer: Mutex::new(()) }
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// Apply one batch atomically and return the new cursor.
    pub fn apply_batch(&self, batch: &ChangeBatch) -> Result<ChainCursor, IndexError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let mut tx = self.store.begin_write()?;
        let mut cursor = ChainCursor::load(&tx)?;
        let start_height = cursor.height;

        for change in &batch.reverted {
            self.revert_block(&mut tx, &mut cursor, change)?;
        }
        for change in &batch.applied {
            self.apply_block(&mut tx, &mut cursor, change)?;
        }
        cursor.token = batch.id;
        tx.put_cursor(&cursor)?;
        tx.commit()?;

        debug!(
            reverted = batch.reverted.len(),
            applied = batch.applied.len(),
            height = cursor.height,
            "applied change batch"
        );
        if batch.synced {
            info!(height = cursor.height, block = %cursor.block_id, "synced");
        } else if start_height / PROGRESS_EVERY != cursor.height / PROGRESS_EVERY {
            info!(height = cursor.height, "still syncing");
        }
        Ok(cursor)
    }

    fn revert_block(
        &self,
        tx: &mut WriteTxn<'_>,
        cursor: &mut ChainCursor,
        change: &BlockChange,
    ) -> Result<(), IndexError> {
        let id = change.block.id();
        let Some(info) = BlockMetadata::get(&*tx, &id)? else {
            invariant_violation!("reverting block {id}, which is not indexed");
        };
        if cursor.tip() != Some((info.height, id)) {
            invariant_violation!(
                "reverting block {id} at height {}, but the indexed tip is {:?}",
                info.height,
                cursor.tip()
            );
        }

        // undo in the exact reverse of application order
        for diff in change.diffs.output_diffs.iter().rev() {
            if diff.id == self.genesis_payout {
                continue;
            }
            self.output_diff(tx, diff.direction.inverse(), &diff.id, &diff.output)?;
        }
        for diff in change.diffs.delayed_output_diffs.iter().rev() {
            if diff.id == self.genesis_payout {
                continue;
            }
            self.delayed_diff(tx, diff.direction.inverse(), &diff.id, &diff.output, diff.maturity_height)?;
        }

        BlockMetadata::delete(tx, &id);
        cursor.height = info.height;
        cursor.block_id = change.block.parent_id;
        Ok(())
    }

    fn apply_block(
        &self,
        tx: &mut WriteTxn<'_>,
        cursor: &mut ChainCursor,
        change: &BlockChange,
    ) -> Result<(), IndexError> {
        let id = change.block.id();
        if cursor.height > 0 && change.block.parent_id != cursor.block_id {
            invariant_violation!(
                "block {id} does not extend indexed tip {} at height {}",
                cursor.block_id,
                cursor.height - 1
            );
        }

        let mut delayed_outputs = Vec::new();
        for diff in &change.diffs.delayed_output_diffs {
            if diff.id == self.genesis_payout {
                continue;
            }
            self.delayed_diff(tx, diff.direction, &diff.id, &diff.output, diff.maturity_height)?;
            if diff.direction == DiffDirection::Apply {
                delayed_outputs.push(DelayedOutput {
                    id: diff.id,
                    address: diff.output.address,
                    value: diff.output.value,
                    maturity_height: diff.maturity_height,
                });
            }
        }
        for diff in &change.diffs.output_diffs {
            if diff.id == self.genesis_payout {
                continue;
            }
            self.output_diff(tx, diff.direction, &diff.id, &diff.output)?;
        }

        BlockMetadata::put(tx, &id, &BlockInfo { height: cursor.height, delayed_outputs })?;
        cursor.height += 1;
        cursor.block_id = id;
        Ok(())
    }

    /// Spendable outputs move ownership.
    fn output_diff(
        &self,
        tx: &mut WriteTxn<'_>,
        direction: DiffDirection,
        id: &OutputId,
        output: &Output,
    ) -> Result<(), IndexError> {
        match direction {
            DiffDirection::Apply => {
                utxo::create_output(tx, id, output.address, output.value, 0)?;
                utxo::credit(tx, &output.address, id, output.value)
            }
            DiffDirection::Revert => utxo::debit(tx, &output.address, id, output.value),
        }
    }

    /// Delayed outputs are only recorded; they become owned when the engine
    /// reports them as spendable outputs at maturity.
    fn delayed_diff(
        &self,
        tx: &mut WriteTxn<'_>,
        direction: DiffDirection,
        id: &OutputId,
        output: &Output,
        maturity_height: u64,
    ) -> Result<(), IndexError> {
        match direction {
            DiffDirection::Apply => {
                utxo::create_output(tx, id, output.address, output.value, maturity_height)
            }
            DiffDirection::Revert => Ok(()),
        }
    }
}

impl ChangeSubscriber for Ingester {
    fn process_change(&self, batch: &ChangeBatch) {
        if let Err(e) = self.apply_batch(batch) {
            error!(error = %e, "failed to update index");
            std::process::exit(1);
        }
    }
}
