use super::convert::{OP_CREDIT, OP_DEBIT, STATUS_APPLIED};
use super::errors::{ApiError, ErrorKind};
use super::models::{
    Allow, BlockIdentifier, MetadataRequest, NetworkListResponse, NetworkOptionsResponse,
    NetworkRequest, NetworkStatusResponse, OperationStatus, Peer, Version,
};
use super::IndexerService;
use crate::runtime::ChainCursor;

pub const ROSETTA_VERSION: &str = "1.4.0";

impl IndexerService {
    pub fn network_list(&self, _req: &MetadataRequest) -> NetworkListResponse {
        NetworkListResponse { network_identifiers: vec![self.network().clone()] }
    }

    pub fn network_status(&self, req: &NetworkRequest) -> Result<NetworkStatusResponse, ApiError> {
        self.check_network(&req.network_identifier)?;
        let cursor = ChainCursor::load(&self.store().read()?)?;
        let (height, tip_id) = cursor.tip().ok_or(ErrorKind::UnknownBlock)?;
        let (tip, _) = self.node().chain.block_by_id(&tip_id).ok_or(ErrorKind::UnknownBlock)?;
        let peers = self
            .node()
            .gateway
            .peers()
            .into_iter()
            .map(|p| Peer { peer_id: p.net_address })
            .collect();
        Ok(NetworkStatusResponse {
            current_block_identifier: BlockIdentifier {
                index: height as i64,
                hash: tip_id.to_string(),
            },
            current_block_timestamp: (tip.timestamp as i64).saturating_mul(1000),
            genesis_block_identifier: self.genesis_identifier(),
            peers,
        })
    }

    pub fn network_options(&self, req: &NetworkRequest) -> Result<NetworkOptionsResponse, ApiError> {
        self.check_network(&req.network_identifier)?;
        Ok(NetworkOptionsResponse {
            version: Version {
                rosetta_version: ROSETTA_VERSION.to_string(),
                node_version: env!("CARGO_PKG_VERSION").to_string(),
            },
            allow: Allow {
                operation_statuses: vec![OperationStatus {
                    status: STATUS_APPLIED.to_string(),
                    successful: true,
                }],
                operation_types: vec![OP_DEBIT.to_string(), OP_CREDIT.to_string()],
                errors: ErrorKind::ALL.iter().map(|k| k.catalog_entry()).collect(),
                historical_balance_lookup: false,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ChainBuilder, open_service};

    #[test]
    fn status_reports_tip_genesis_and_peers() {
        let node = ChainBuilder::new()
            .with_peers(&["10.0.0.1:9981", "10.0.0.2:9981"])
            .mine(2, crate::types::Address::VOID)
            .build();
        let (svc, _dir) = open_service(node.clone());
        let req = NetworkRequest { network_identifier: svc.network().clone() };

        let status = svc.network_status(&req).unwrap();
        assert_eq!(status.current_block_identifier.index, 2);
        assert_eq!(status.current_block_identifier.hash, node.tip_id().to_string());
        assert_eq!(status.genesis_block_identifier.hash, node.genesis_id().to_string());
        assert_eq!(status.peers.len(), 2);
        assert_eq!(status.peers[0].peer_id, "10.0.0.1:9981");
        assert_eq!(status.current_block_timestamp % 1000, 0);
    }

    #[test]
    fn options_advertise_full_catalog() {
        let (svc, _dir) = open_service(ChainBuilder::new().build());
        let req = NetworkRequest { network_identifier: svc.network().clone() };
        let opts = svc.network_options(&req).unwrap();
        assert_eq!(opts.version.rosetta_version, "1.4.0");
        assert_eq!(opts.allow.operation_types, ["Debit", "Credit"]);
        assert_eq!(opts.allow.errors.len(), ErrorKind::ALL.len());
        assert_eq!(opts.allow.errors[9].details.as_ref().unwrap()["class"], "rejected");
        assert!(!opts.allow.historical_balance_lookup);
        assert_eq!(svc.network_list(&MetadataRequest::default()).network_identifiers.len(), 1);
    }
}
