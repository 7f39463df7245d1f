use super::convert;
use super::errors::{ApiError, ErrorKind};
use super::models::{
    AccountBalanceRequest, AccountBalanceResponse, BalanceMetadata, BalanceOutput, BlockIdentifier,
    PartialBlockIdentifier,
};
use super::IndexerService;
use crate::invariant_violation;
use crate::runtime::{ChainCursor, utxo};
use crate::types::{Address, Currency};

impl IndexerService {
    /// Balance at the indexed tip. Historical lookups are refused unless
    /// they name the tip itself.
    pub fn account_balance(&self, req: &AccountBalanceRequest) -> Result<AccountBalanceResponse, ApiError> {
        self.check_network(&req.network_identifier)?;
        let address: Address = req
            .account_identifier
            .address
            .parse()
            .map_err(|e| ErrorKind::InvalidAddress.with(e))?;

        let view = self.store().read()?;
        let cursor = ChainCursor::load(&view)?;
        let (height, block_id) = cursor.tip().ok_or(ErrorKind::UnknownBlock)?;
        let block_identifier = BlockIdentifier { index: height as i64, hash: block_id.to_string() };
        if let Some(at) = &req.block_identifier {
            if !names_block(at, &block_identifier) {
                return Err(ErrorKind::HistoricalBalanceUnsupported.err());
            }
        }

        let (balance, utxos) = if address.is_void() {
            (utxo::void_balance(&view)?, Vec::new())
        } else {
            let records = utxo::owned_records(&view, &address)?;
            let Some(total) = Currency::sum(records.iter().map(|(_, r)| &r.value)) else {
                invariant_violation!("balance of {address} overflows");
            };
            let utxos = records
                .into_iter()
                .map(|(id, r)| BalanceOutput {
                    id: id.to_string(),
                    value: r.value.to_string(),
                    timelock: r.maturity_height,
                })
                .collect();
            (total, utxos)
        };

        Ok(AccountBalanceResponse {
            block_identifier,
            balances: vec![convert::amount(balance, true)],
            metadata: BalanceMetadata { utxos },
        })
    }
}

/// An empty partial identifier names the tip.
fn names_block(partial: &PartialBlockIdentifier, block: &BlockIdentifier) -> bool {
    partial.index.is_none_or(|i| i == block.index)
        && partial.hash.as_ref().is_none_or(|h| *h == block.hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::TransactionPool;
    use crate::service::models::{AccountIdentifier, NetworkIdentifier};
    use crate::test_utils::{ChainBuilder, fixtures, open_service};

    fn request(svc: &IndexerService, address: &str) -> AccountBalanceRequest {
        AccountBalanceRequest {
            network_identifier: svc.network().clone(),
            account_identifier: AccountIdentifier { address: address.to_string() },
            block_identifier: None,
        }
    }

    #[test]
    fn lists_owned_outputs_with_maturity() {
        let a = fixtures::address_for(&fixtures::test_key(1));
        let node = ChainBuilder::new().maturity_delay(1).block_reward(100).mine(3, a).build();
        let (svc, _dir) = open_service(node.clone());

        let res = svc.account_balance(&request(&svc, &a.to_string())).unwrap();
        // payouts from heights 1 and 2 have matured, height 3 has not
        assert_eq!(res.balances[0].value, "200");
        assert_eq!(res.metadata.utxos.len(), 2);
        let mut timelocks: Vec<u64> = res.metadata.utxos.iter().map(|u| u.timelock).collect();
        timelocks.sort();
        assert_eq!(timelocks, [2, 3]);
        assert_eq!(res.block_identifier.index, 3);
        assert_eq!(res.block_identifier.hash, node.tip_id().to_string());
    }

    #[test]
    fn void_reports_aggregate_only() {
        let key = fixtures::test_key(1);
        let a = fixtures::address_for(&key);
        let node = ChainBuilder::new().maturity_delay(0).block_reward(10).mine(1, a).build();
        let (svc, _dir) = open_service(node.clone());
        let (oid, _) = node.unspent_outputs_of(&a).pop().unwrap();
        let burn = fixtures::spend(&key, oid, &[(Address::VOID, Currency::from(4)), (a, Currency::from(6))]);
        node.accept_transaction_set(vec![burn]).unwrap();
        node.mine_block(a).unwrap();

        let res = svc.account_balance(&request(&svc, &Address::VOID.to_string())).unwrap();
        assert_eq!(res.balances[0].value, "4");
        assert!(res.metadata.utxos.is_empty());
    }

    #[test]
    fn malformed_address_and_history_are_refused() {
        let node = ChainBuilder::new().mine(2, Address::VOID).build();
        let (svc, _dir) = open_service(node);

        let err = svc.account_balance(&request(&svc, "not-an-address")).unwrap_err();
        assert!(err.is(ErrorKind::InvalidAddress));

        let mut req = request(&svc, &Address::VOID.to_string());
        req.block_identifier = Some(PartialBlockIdentifier { index: Some(1), hash: None });
        let err = svc.account_balance(&req).unwrap_err();
        assert!(err.is(ErrorKind::HistoricalBalanceUnsupported));

        req.block_identifier = Some(PartialBlockIdentifier { index: Some(2), hash: None });
        assert!(svc.account_balance(&req).is_ok());

        req.network_identifier = NetworkIdentifier { blockchain: "Sia".into(), network: "Zen".into() };
        assert!(svc.account_balance(&req).unwrap_err().is(ErrorKind::UnknownNetwork));
    }
}
