use tracing::debug;

use super::convert::{self, ConvertError};
use super::errors::{ApiError, ErrorKind};
use super::models::{
    self, BlockIdentifier, BlockRequest, BlockResponse, BlockTransactionRequest,
    PartialBlockIdentifier,
};
use super::IndexerService;
use crate::invariant_violation;
use crate::runtime::block_metadata::BlockMetadata;
use crate::runtime::{ChainCursor, ReadView};
use crate::types::{Block, BlockId};

impl IndexerService {
    /// GetBlock by height, by hash, or the indexed tip when neither is given.
    pub fn block(&self, req: &BlockRequest) -> Result<BlockResponse, ApiError> {
        self.check_network(&req.network_identifier)?;
        let block = self.resolve_block(&req.block_identifier)?;
        Ok(BlockResponse { block })
    }

    /// Every transaction is already returned by `block`.
    pub fn block_transaction(&self, req: &BlockTransactionRequest) -> Result<(), ApiError> {
        self.check_network(&req.network_identifier)?;
        Err(ErrorKind::NotImplemented.err())
    }

    pub(crate) fn resolve_block(&self, which: &PartialBlockIdentifier) -> Result<models::Block, ApiError> {
        let view = self.store().read()?;
        let cursor = ChainCursor::load(&view)?;

        if let Some(index) = which.index {
            let height = u64::try_from(index).map_err(|_| ErrorKind::UnknownBlock.err())?;
            if height >= cursor.height {
                return Err(ErrorKind::UnknownBlock.err());
            }
            let block = self.node().chain.block_at_height(height).ok_or(ErrorKind::UnknownBlock)?;
            let out = self.convert_block(&view, &block)?;
            if out.block_identifier.index != index {
                invariant_violation!(
                    "block {} requested at height {index} is indexed at height {}",
                    out.block_identifier.hash,
                    out.block_identifier.index
                );
            }
            if let Some(hash) = &which.hash {
                if *hash != out.block_identifier.hash {
                    return Err(ErrorKind::UnknownBlock.err());
                }
            }
            return Ok(out);
        }

        if let Some(hash) = &which.hash {
            let id: BlockId = hash.parse().map_err(|e| ErrorKind::InvalidBlockId.with(e))?;
            let (block, _) = self.node().chain.block_by_id(&id).ok_or(ErrorKind::UnknownBlock)?;
            let out = self.convert_block(&view, &block)?;
            if out.block_identifier.hash != id.to_string() {
                invariant_violation!("block {id} converted as {}", out.block_identifier.hash);
            }
            return Ok(out);
        }

        let (_, tip_id) = cursor.tip().ok_or(ErrorKind::UnknownBlock)?;
        let (block, _) = self.node().chain.block_by_id(&tip_id).ok_or(ErrorKind::UnknownBlock)?;
        self.convert_block(&view, &block)
    }

    pub(crate) fn genesis_identifier(&self) -> BlockIdentifier {
        BlockIdentifier { index: 0, hash: self.node().chain.genesis_block().id().to_string() }
    }

    /// Rebuild a block's operations from the index. Blocks the index has not
    /// reached are unknown.
    fn convert_block(&self, view: &ReadView<'_>, block: &Block) -> Result<models::Block, ApiError> {
        let id = block.id();
        let info = BlockMetadata::get(view, &id)?.ok_or(ErrorKind::UnknownBlock)?;

        let mut transactions = Vec::with_capacity(block.transactions.len() + 1);
        for txn in &block.transactions {
            let converted = convert::convert_transaction(view, txn).map_err(|e| match e {
                ConvertError::Index(e) => ApiError::from(e),
                ConvertError::UnknownInput(id) => {
                    ErrorKind::Database.with(format!("input {id} is not indexed"))
                }
            })?;
            if !converted.operations.is_empty() {
                transactions.push(converted);
            }
        }

        let payouts: Vec<_> = info
            .delayed_outputs
            .iter()
            .enumerate()
            .map(|(i, d)| convert::payout_op(i, &d.address, d.value, &d.id, d.maturity_height))
            .collect();
        if !payouts.is_empty() {
            transactions.push(models::Transaction {
                transaction_identifier: models::TransactionIdentifier { hash: id.to_string() },
                operations: payouts,
            });
        }

        let block_identifier = BlockIdentifier { index: info.height as i64, hash: id.to_string() };
        let parent_block_identifier = if info.height == 0 {
            block_identifier.clone()
        } else {
            BlockIdentifier { index: info.height as i64 - 1, hash: block.parent_id.to_string() }
        };
        debug!(height = info.height, block = %id, txns = transactions.len(), "converted block");
        Ok(models::Block {
            block_identifier,
            parent_block_identifier,
            timestamp: (block.timestamp as i64).saturating_mul(1000),
            transactions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::TransactionPool;
    use crate::test_utils::{ChainBuilder, fixtures, open_service as open};
    use crate::types::{Address, Currency};

    fn by_index(i: i64) -> PartialBlockIdentifier {
        PartialBlockIdentifier { index: Some(i), hash: None }
    }

    #[test]
    fn height_and_hash_lookups_agree() {
        let a = fixtures::address_for(&fixtures::test_key(1));
        let node = ChainBuilder::new().mine(3, a).build();
        let (svc, _dir) = open(node.clone());

        let by_height = svc.resolve_block(&by_index(2)).unwrap();
        let hash = Some(by_height.block_identifier.hash.clone());
        let by_hash = svc.resolve_block(&PartialBlockIdentifier { index: None, hash }).unwrap();
        assert_eq!(by_height, by_hash);
        assert_eq!(by_height.parent_block_identifier.index, 1);
        assert_eq!(by_height.parent_block_identifier.hash, node.block_id_at(1).unwrap().to_string());
    }

    #[test]
    fn out_of_range_heights_are_unknown() {
        let node = ChainBuilder::new().mine(2, Address::VOID).build();
        let (svc, _dir) = open(node);
        for i in [-1, 3, 100] {
            assert!(svc.resolve_block(&by_index(i)).unwrap_err().is(ErrorKind::UnknownBlock), "{i}");
        }
        let bad = PartialBlockIdentifier { index: None, hash: Some("zz".into()) };
        assert!(svc.resolve_block(&bad).unwrap_err().is(ErrorKind::InvalidBlockId));
    }

    #[test]
    fn genesis_is_its_own_parent() {
        let node = ChainBuilder::new().build();
        let (svc, _dir) = open(node.clone());
        let genesis = svc.resolve_block(&by_index(0)).unwrap();
        assert_eq!(genesis.parent_block_identifier, genesis.block_identifier);
        assert_eq!(genesis.block_identifier, svc.genesis_identifier());
        assert!(genesis.transactions.is_empty());
    }

    #[test]
    fn payouts_form_a_synthetic_transaction() {
        let a = fixtures::address_for(&fixtures::test_key(1));
        let node = ChainBuilder::new().maturity_delay(5).block_reward(42).mine(1, a).build();
        let (svc, _dir) = open(node.clone());

        let tip = svc.resolve_block(&PartialBlockIdentifier::default()).unwrap();
        assert_eq!(tip.block_identifier.index, 1);
        assert_eq!(tip.timestamp % 1000, 0);
        let synthetic = tip.transactions.last().unwrap();
        assert_eq!(synthetic.transaction_identifier.hash, tip.block_identifier.hash);
        let op = &synthetic.operations[0];
        assert_eq!(op.kind, convert::OP_CREDIT);
        assert_eq!(op.account.as_ref().unwrap().address, a.to_string());
        assert_eq!(op.amount.as_ref().unwrap().value, Currency::from(42).to_string());
        assert_eq!(op.metadata.as_ref().unwrap()["timelock"], 6);
    }

    #[test]
    fn spends_debit_the_original_owner() {
        let key = fixtures::test_key(1);
        let a = fixtures::address_for(&key);
        let b = fixtures::address_for(&fixtures::test_key(2));
        let node = ChainBuilder::new().maturity_delay(0).block_reward(10).mine(1, a).build();
        let (svc, _dir) = open(node.clone());
        let (oid, _) = node.unspent_outputs_of(&a).pop().unwrap();
        node.accept_transaction_set(vec![fixtures::spend(&key, oid, &[(b, Currency::from(10))])])
            .unwrap();
        node.mine_block(Address::VOID).unwrap();

        let block = svc.resolve_block(&by_index(2)).unwrap();
        let txn = &block.transactions[0];
        let kinds: Vec<&str> = txn.operations.iter().map(|o| o.kind.as_str()).collect();
        assert_eq!(kinds, ["Debit", "Credit"]);
        assert_eq!(txn.operations[0].account.as_ref().unwrap().address, a.to_string());
        assert_eq!(txn.operations[0].amount.as_ref().unwrap().value, "-10");
        assert_eq!(txn.operations[1].operation_identifier.index, 1);
    }

    #[test]
    fn reverted_blocks_become_unknown() {
        let a = fixtures::address_for(&fixtures::test_key(1));
        let node = ChainBuilder::new().mine(5, a).build();
        let (svc, _dir) = open(node.clone());
        let old: Vec<_> = (3..=5).map(|h| node.block_id_at(h).unwrap()).collect();

        let new_blocks = node.reorg(3, &[a, a, a, a]).unwrap();
        let tip = svc.resolve_block(&PartialBlockIdentifier::default()).unwrap();
        assert_eq!(tip.block_identifier.index, 6);
        assert_eq!(tip.block_identifier.hash, new_blocks[3].id().to_string());
        for id in old {
            let req = PartialBlockIdentifier { index: None, hash: Some(id.to_string()) };
            assert!(svc.resolve_block(&req).unwrap_err().is(ErrorKind::UnknownBlock));
        }
    }
}
