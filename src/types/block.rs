use borsh::{BorshDeserialize, BorshSerialize};

use super::{BlockId, HashWriter, Output, OutputId, Transaction, TransactionId};

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Block {
    pub parent_id: BlockId,
    pub nonce: u64,
    /// Seconds since the unix epoch.
    pub timestamp: u64,
    pub miner_payouts: Vec<Output>,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn id(&self) -> BlockId {
        let txids: Vec<TransactionId> = self.transactions.iter().map(Transaction::id).collect();
        BlockId(
            HashWriter::new(b"block")
                .put(&self.parent_id)
                .put(&self.nonce)
                .put(&self.timestamp)
                .put(&self.miner_payouts)
                .put(&txids)
                .finish(),
        )
    }

    pub fn miner_payout_id(&self, index: u64) -> OutputId {
        miner_payout_id(&self.id(), index)
    }
}

/// Deterministic id of the `index`th miner payout of block `block`.
pub fn miner_payout_id(block: &BlockId, index: u64) -> OutputId {
    OutputId(HashWriter::new(b"miner payout").put(block).put(&index).finish())
}
