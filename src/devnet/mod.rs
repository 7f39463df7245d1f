//! In-process development node.
//!
//! A single-miner chain that implements the block store, transaction pool,
//! gateway and consensus-subscription interfaces. It produces the same diff
//! stream a full node would: spendable output diffs for transactions,
//! delayed diffs for miner payouts, and a matching output diff when a payout
//! matures. Used by the binary and by tests.

mod state;

use alloy_primitives::U256;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::chain::{
    BlockChange, ChainStore, ChangeBatch, ChangeSubscriber, ConsensusEngine, EngineError,
    Gateway, Peer, ResumeToken, SubscriptionId, TransactionPool,
};
use crate::types::{
    Address, Block, BlockId, Currency, HashWriter, Output, OutputId, Transaction, TransactionId,
};

use state::ChainState;

pub const DEFAULT_MATURITY_DELAY: u64 = 144;
/// 2015-06-06T14:13:20Z
pub const DEFAULT_GENESIS_TIMESTAMP: u64 = 1_433_600_000;
pub const DEFAULT_BLOCK_TIME: u64 = 600;

/// 300,000 coins at 24 decimals.
pub fn default_block_reward() -> Currency {
    Currency(U256::from(300_000u64) * U256::from(10u64).pow(U256::from(24u64)))
}

#[derive(Clone, Debug)]
pub struct DevnetConfig {
    /// Blocks between a payout and the height at which it becomes spendable.
    pub maturity_delay: u64,
    pub block_reward: Currency,
    /// Seconds.
    pub genesis_timestamp: u64,
    /// Seconds added per height.
    pub block_time: u64,
    /// Emit a delayed diff for a genesis payout that never exists, as mainnet
    /// nodes do.
    pub emit_genesis_payout_diff: bool,
    pub peers: Vec<String>,
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self {
            maturity_delay: DEFAULT_MATURITY_DELAY,
            block_reward: default_block_reward(),
            genesis_timestamp: DEFAULT_GENESIS_TIMESTAMP,
            block_time: DEFAULT_BLOCK_TIME,
            emit_genesis_payout_diff: false,
            peers: Vec::new(),
        }
    }
}

struct Inner {
    chain: ChainState,
    /// Unconfirmed transactions in acceptance order.
    pool: Vec<Transaction>,
    /// Every batch ever emitted; replayed to late subscribers.
    log: Vec<ChangeBatch>,
    subscribers: Vec<(SubscriptionId, Arc<dyn ChangeSubscriber>)>,
    next_subscription: u64,
}

pub struct Devnet {
    cfg: DevnetConfig,
    inner: Mutex<Inner>,
}

impl Devnet {
    pub fn new(cfg: DevnetConfig) -> Self {
        let (chain, genesis) = ChainState::new(&cfg);
        let mut inner = Inner {
            chain,
            pool: Vec::new(),
            log: Vec::new(),
            subscribers: Vec::new(),
            next_subscription: 1,
        };
        inner.emit(Vec::new(), vec![genesis]);
        info!(genesis = %inner.chain.blocks[0].id(), "devnet initialized");
        Self { cfg, inner: Mutex::new(inner) }
    }

    pub fn config(&self) -> &DevnetConfig {
        &self.cfg
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn genesis_id(&self) -> BlockId {
        self.lock().chain.blocks[0].id()
    }

    /// Number of blocks on the best chain, genesis included.
    pub fn block_count(&self) -> u64 {
        self.lock().chain.height()
    }

    pub fn tip_id(&self) -> BlockId {
        self.lock().chain.tip().id()
    }

    pub fn block_id_at(&self, height: u64) -> Option<BlockId> {
        self.lock().chain.blocks.get(height as usize).map(Block::id)
    }

    /// Unspent outputs sorted by id.
    pub fn unspent_outputs(&self) -> Vec<(OutputId, Output)> {
        let inner = self.lock();
        let mut out: Vec<_> = inner.chain.utxos.iter().map(|(id, o)| (*id, o.clone())).collect();
        out.sort_by_key(|(id, _)| *id);
        out
    }

    pub fn unspent_outputs_of(&self, address: &Address) -> Vec<(OutputId, Output)> {
        self.unspent_outputs().into_iter().filter(|(_, o)| o.address == *address).collect()
    }

    /// Mine one block paying `payout`, including every pool transaction that
    /// is still valid.
    pub fn mine_block(&self, payout: Address) -> Result<Block, EngineError> {
        let mut inner = self.lock();
        let txns = inner.take_valid_pool();
        let change = inner.chain.mine(&self.cfg, payout, txns);
        let block = change.block.clone();
        debug!(height = inner.chain.height() - 1, block = %block.id(), "mined block");
        inner.emit(Vec::new(), vec![change]);
        Ok(block)
    }

    /// Replace the last `revert_count` blocks with one new block per entry of
    /// `payouts`, delivered to subscribers as a single batch. Transactions
    /// from reverted blocks go back to the pool.
    pub fn reorg(&self, revert_count: usize, payouts: &[Address]) -> Result<Vec<Block>, EngineError> {
        let mut inner = self.lock();
        let available = inner.chain.blocks.len() - 1;
        if revert_count > available {
            return Err(EngineError::RevertTooDeep { requested: revert_count, available });
        }

        let mut reverted = Vec::with_capacity(revert_count);
        let mut returned = Vec::new();
        for _ in 0..revert_count {
            if let Some(change) = inner.chain.revert_tip() {
                let mut txns = change.block.transactions.clone();
                txns.append(&mut returned);
                returned = txns;
                reverted.push(change);
            }
        }
        let pool = std::mem::take(&mut inner.pool);
        inner.pool = returned;
        inner.pool.extend(pool);

        let mut applied = Vec::with_capacity(payouts.len());
        for payout in payouts {
            let txns = inner.take_valid_pool();
            applied.push(inner.chain.mine(&self.cfg, *payout, txns));
        }
        let blocks = applied.iter().map(|c| c.block.clone()).collect();

        let kept = inner.take_valid_pool();
        inner.pool = kept;
        info!(
            reverted = reverted.len(),
            applied = applied.len(),
            height = inner.chain.height() - 1,
            "devnet reorg"
        );
        inner.emit(reverted, applied);
        Ok(blocks)
    }

    pub fn pool_len(&self) -> usize {
        self.lock().pool.len()
    }
}

impl Inner {
    /// Drain the pool, keeping transactions in order while they stay valid
    /// against the chain and each other.
    fn take_valid_pool(&mut self) -> Vec<Transaction> {
        let mut spent = HashSet::new();
        let mut valid = Vec::new();
        for txn in std::mem::take(&mut self.pool) {
            match self.chain.validate(&txn, &spent) {
                Ok(()) => {
                    spent.extend(txn.inputs.iter().map(|i| i.parent_id));
                    valid.push(txn);
                }
                Err(e) => debug!(txid = %txn.id(), error = %e, "dropping pool transaction"),
            }
        }
        valid
    }

    fn pool_spent(&self) -> HashSet<OutputId> {
        self.pool.iter().flat_map(|t| t.inputs.iter().map(|i| i.parent_id)).collect()
    }

    fn emit(&mut self, reverted: Vec<BlockChange>, applied: Vec<BlockChange>) {
        let prev = self.log.last().map(|b| b.id).unwrap_or(ResumeToken::BEGINNING);
        let mut h = HashWriter::new(b"change");
        h.put(&prev);
        for change in reverted.iter().chain(applied.iter()) {
            h.put(&change.block.id());
        }
        h.put(&(self.log.len() as u64));
        let batch = ChangeBatch { id: ResumeToken(h.finish()), reverted, applied, synced: true };
        for (_, sub) in &self.subscribers {
            sub.process_change(&batch);
        }
        self.log.push(batch);
    }
}

impl ChainStore for Devnet {
    fn block_at_height(&self, height: u64) -> Option<Block> {
        self.lock().chain.blocks.get(height as usize).cloned()
    }

    fn block_by_id(&self, id: &BlockId) -> Option<(Block, u64)> {
        self.lock().chain.block_by_id(id)
    }

    fn genesis_block(&self) -> Block {
        self.lock().chain.blocks[0].clone()
    }
}

impl TransactionPool for Devnet {
    fn transactions(&self) -> Vec<Transaction> {
        self.lock().pool.clone()
    }

    fn transaction(&self, id: &TransactionId) -> Option<Transaction> {
        self.lock().pool.iter().find(|t| t.id() == *id).cloned()
    }

    /// Accepts all of `txns` or none. Inputs must be confirmed outputs not
    /// already claimed by the pool.
    fn accept_transaction_set(&self, txns: Vec<Transaction>) -> Result<(), EngineError> {
        let mut inner = self.lock();
        let mut spent = inner.pool_spent();
        let mut known: HashSet<TransactionId> = inner.pool.iter().map(Transaction::id).collect();
        for txn in &txns {
            let id = txn.id();
            if !known.insert(id) {
                return Err(EngineError::Duplicate(id));
            }
            inner.chain.validate(txn, &spent)?;
            spent.extend(txn.inputs.iter().map(|i| i.parent_id));
        }
        for txn in &txns {
            debug!(txid = %txn.id(), "accepted transaction");
        }
        inner.pool.extend(txns);
        Ok(())
    }
}

impl Gateway for Devnet {
    fn peers(&self) -> Vec<Peer> {
        self.cfg.peers.iter().map(|a| Peer { net_address: a.clone() }).collect()
    }
}

impl ConsensusEngine for Devnet {
    fn subscribe(
        &self,
        subscriber: Arc<dyn ChangeSubscriber>,
        from: ResumeToken,
    ) -> Result<SubscriptionId, EngineError> {
        let mut inner = self.lock();
        let start = if from == ResumeToken::BEGINNING {
            0
        } else {
            inner
                .log
                .iter()
                .position(|b| b.id == from)
                .map(|i| i + 1)
                .ok_or(EngineError::UnknownResumeToken(from))?
        };

        let last = inner.log.len().saturating_sub(1);
        for (i, batch) in inner.log.iter().enumerate().skip(start) {
            let mut replay = batch.clone();
            replay.synced = i == last;
            subscriber.process_change(&replay);
        }

        let id = SubscriptionId(inner.next_subscription);
        inner.next_subscription += 1;
        inner.subscribers.push((id, subscriber));
        debug!(subscription = id.0, replayed = inner.log.len() - start, "subscribed");
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.lock().subscribers.retain(|(sid, _)| *sid != id);
    }
}
