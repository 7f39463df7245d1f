use std::sync::Arc;

use crate::devnet::{Devnet, DevnetConfig};
use crate::types::{Address, Currency};

/// Builder for devnet chains used in tests.
///
/// Defaults differ from the production devnet: a maturity delay of 1 and a
/// block reward of 100 base units keep numbers readable.
pub struct ChainBuilder {
    cfg: DevnetConfig,
    mined: Vec<Address>,
}

impl ChainBuilder {
    pub fn new() -> Self {
        let cfg = DevnetConfig {
            maturity_delay: 1,
            block_reward: Currency::from(100),
            block_time: 600,
            ..DevnetConfig::default()
        };
        Self { cfg, mined: Vec::new() }
    }

    pub fn maturity_delay(mut self, delay: u64) -> Self {
        self.cfg.maturity_delay = delay;
        self
    }

    pub fn block_reward(mut self, reward: u64) -> Self {
        self.cfg.block_reward = Currency::from(reward);
        self
    }

    /// Emit the phantom genesis payout diff mainnet nodes produce.
    pub fn with_genesis_payout_diff(mut self) -> Self {
        self.cfg.emit_genesis_payout_diff = true;
        self
    }

    pub fn with_peers(mut self, peers: &[&str]) -> Self {
        self.cfg.peers = peers.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Mine `count` blocks paying `payout` once the node is built.
    pub fn mine(mut self, count: usize, payout: Address) -> Self {
        self.mined.extend(std::iter::repeat_n(payout, count));
        self
    }

    pub fn build(self) -> Arc<Devnet> {
        let node = Arc::new(Devnet::new(self.cfg));
        for payout in self.mined {
            node.mine_block(payout).expect("mine block");
        }
        node
    }
}

impl Default for ChainBuilder {
    fn default() -> Self {
        Self::new()
    }
}
