use borsh::{BorshDeserialize, BorshSerialize};

use crate::runtime::error::IndexError;
use crate::runtime::store::{KvRead, WriteTxn, keys};
use crate::types::{Address, BlockId, Currency, OutputId};

/// A delayed output scheduled by a block (miner payouts).
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct DelayedOutput {
    pub id: OutputId,
    pub address: Address,
    pub value: Currency,
    pub maturity_height: u64,
}

/// Per-block record written when the block is applied and deleted when it
/// is reverted.
///
/// Storage keys:
/// - blocks{block_id} → borsh(BlockInfo)
///
/// The height is denormalized here so block queries never walk the chain,
/// and the delayed outputs let the block's payout operations be rebuilt
/// without re-executing it.
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct BlockInfo {
    pub height: u64,
    pub delayed_outputs: Vec<DelayedOutput>,
}

pub struct BlockMetadata;

impl BlockMetadata {
    pub fn get(r: &impl KvRead, id: &BlockId) -> Result<Option<BlockInfo>, IndexError> {
        r.get_decoded(&keys::block(id))
    }

    pub fn put(tx: &mut WriteTxn<'_>, id: &BlockId, info: &BlockInfo) -> Result<(), IndexError> {
        tx.put(&keys::block(id), info)
    }

    pub fn delete(tx: &mut WriteTxn<'_>, id: &BlockId) {
        tx.delete(&keys::block(id));
    }
}
