//! Interfaces consumed from the consensus/mempool/networking engine.

use borsh::{BorshDeserialize, BorshSerialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::types::{Block, BlockId, Output, OutputId, Transaction, TransactionId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiffDirection {
    Apply,
    Revert,
}

impl DiffDirection {
    pub fn inverse(self) -> Self {
        match self {
            Self::Apply => Self::Revert,
            Self::Revert => Self::Apply,
        }
    }
}

/// A spendable output entering or leaving the unspent set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputDiff {
    pub direction: DiffDirection,
    pub id: OutputId,
    pub output: Output,
}

/// A delayed output (miner payout) being scheduled or leaving the schedule
/// because it matured.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DelayedOutputDiff {
    pub direction: DiffDirection,
    pub id: OutputId,
    pub output: Output,
    pub maturity_height: u64,
}

/// Diffs produced by applying one block, in application order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockDiffs {
    pub output_diffs: Vec<OutputDiff>,
    pub delayed_output_diffs: Vec<DelayedOutputDiff>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockChange {
    pub block: Block,
    /// The diffs as originally produced when the block was applied, even
    /// when the block is being reverted.
    pub diffs: BlockDiffs,
}

#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, BorshSerialize, BorshDeserialize,
)]
pub struct ResumeToken(pub [u8; 32]);

impl ResumeToken {
    /// Start of the stream; subscribing with it replays everything.
    pub const BEGINNING: Self = Self([0u8; 32]);
}

impl fmt::Debug for ResumeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResumeToken({})", hex::encode(&self.0[..8]))
    }
}

/// One delivery from the diff stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeBatch {
    pub id: ResumeToken,
    /// Newest first.
    pub reverted: Vec<BlockChange>,
    /// Oldest first.
    pub applied: Vec<BlockChange>,
    pub synced: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("unknown resume token {0:?}")]
    UnknownResumeToken(ResumeToken),
    #[error("input {0} does not exist")]
    MissingInput(OutputId),
    #[error("input {0} is already spent in the pool")]
    DoubleSpend(OutputId),
    #[error("unlock conditions for {0} do not match the output owner")]
    UnlockHashMismatch(OutputId),
    #[error("input {0} is timelocked")]
    Timelocked(OutputId),
    #[error("input {0} lacks valid signatures")]
    InsufficientSignatures(OutputId),
    #[error("signature {0} is invalid")]
    InvalidSignature(usize),
    #[error("inputs and outputs do not balance")]
    ValueMismatch,
    #[error("transaction has no inputs")]
    NoInputs,
    #[error("transaction {0} is already in the pool")]
    Duplicate(TransactionId),
    #[error("cannot revert {requested} blocks from a chain of {available}")]
    RevertTooDeep { requested: usize, available: usize },
}

pub trait ChainStore: Send + Sync {
    fn block_at_height(&self, height: u64) -> Option<Block>;
    /// Only blocks on the current best chain are returned.
    fn block_by_id(&self, id: &BlockId) -> Option<(Block, u64)>;
    fn genesis_block(&self) -> Block;
}

pub trait TransactionPool: Send + Sync {
    fn transactions(&self) -> Vec<Transaction>;
    fn transaction(&self, id: &TransactionId) -> Option<Transaction>;
    fn accept_transaction_set(&self, txns: Vec<Transaction>) -> Result<(), EngineError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Peer {
    pub net_address: String,
}

pub trait Gateway: Send + Sync {
    fn peers(&self) -> Vec<Peer>;
}

pub trait ChangeSubscriber: Send + Sync {
    fn process_change(&self, batch: &ChangeBatch);
}

pub trait ConsensusEngine: Send + Sync {
    /// Replays every batch after `from`, then streams new ones, strictly in
    /// order.
    fn subscribe(
        &self,
        subscriber: Arc<dyn ChangeSubscriber>,
        from: ResumeToken,
    ) -> Result<SubscriptionId, EngineError>;

    fn unsubscribe(&self, id: SubscriptionId);
}

/// The four collaborators an indexer needs, usually backed by one node.
#[derive(Clone)]
pub struct NodeHandles {
    pub chain: Arc<dyn ChainStore>,
    pub pool: Arc<dyn TransactionPool>,
    pub gateway: Arc<dyn Gateway>,
    pub consensus: Arc<dyn ConsensusEngine>,
}

impl NodeHandles {
    pub fn from_node<N>(node: Arc<N>) -> Self
    where
        N: ChainStore + TransactionPool + Gateway + ConsensusEngine + 'static,
    {
        Self {
            chain: node.clone(),
            pool: node.clone(),
            gateway: node.clone(),
            consensus: node,
        }
    }
}
