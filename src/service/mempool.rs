use super::convert::{self, ConvertError};
use super::errors::{ApiError, ErrorKind};
use super::models::{
    MempoolResponse, MempoolTransactionRequest, MempoolTransactionResponse, NetworkRequest,
    TransactionIdentifier,
};
use super::IndexerService;
use crate::types::TransactionId;

impl IndexerService {
    pub fn mempool(&self, req: &NetworkRequest) -> Result<MempoolResponse, ApiError> {
        self.check_network(&req.network_identifier)?;
        let transaction_identifiers = self
            .node()
            .pool
            .transactions()
            .iter()
            .map(|t| TransactionIdentifier { hash: t.id().to_string() })
            .collect();
        Ok(MempoolResponse { transaction_identifiers })
    }

    /// A pending transaction spending another pending transaction's output
    /// cannot be resolved and is reported as unknown.
    pub fn mempool_transaction(
        &self,
        req: &MempoolTransactionRequest,
    ) -> Result<MempoolTransactionResponse, ApiError> {
        self.check_network(&req.network_identifier)?;
        let id: TransactionId = req
            .transaction_identifier
            .hash
            .parse()
            .map_err(|e| ErrorKind::InvalidTransactionId.with(e))?;
        let txn = self.node().pool.transaction(&id).ok_or(ErrorKind::UnknownTransaction)?;

        let view = self.store().read()?;
        let transaction = convert::convert_transaction(&view, &txn).map_err(|e| match e {
            ConvertError::Index(e) => ApiError::from(e),
            ConvertError::UnknownInput(parent) => ErrorKind::UnknownTransaction
                .with(format!("input {parent} is not confirmed")),
        })?;
        Ok(MempoolTransactionResponse { transaction })
    }
}
