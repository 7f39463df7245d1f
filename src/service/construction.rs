//! Offline transaction construction.
//!
//! The unsigned blob is self-contained: it carries the bare transaction and,
//! for each input, the owner and value of the output it spends, so it can be
//! signed and parsed without access to the index.

use std::collections::HashSet;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use borsh::{BorshDeserialize, BorshSerialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::convert::{self, OP_CREDIT, OP_DEBIT};
use super::errors::{ApiError, ErrorKind};
use super::models::{
    AccountIdentifier, ConstructionCombineRequest, ConstructionCombineResponse, ConstructionDeriveRequest,
    ConstructionDeriveResponse, ConstructionMetadataRequest, ConstructionMetadataResponse,
    ConstructionParseRequest, ConstructionParseResponse, ConstructionPayloadsRequest,
    ConstructionPayloadsResponse, ConstructionPreprocessRequest, ConstructionPreprocessResponse,
    ConstructionSignedRequest, CurveType, Operation, PublicKey, Signature, SignatureType,
    SigningPayload, TransactionIdentifier, TransactionIdentifierResponse,
};
use super::IndexerService;
use crate::runtime::{KvRead, utxo};
use crate::types::{
    Address, CoveredFields, Output, OutputId, Transaction, TransactionId, TransactionInput,
    TransactionSignature, UnlockConditions,
};

const ED25519_KEY_LEN: usize = 32;

/// A transaction plus the outputs its inputs spend, in input order.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ConstructionTxn {
    pub transaction: Transaction,
    pub input_parents: Vec<Output>,
}

impl ConstructionTxn {
    pub fn encode(&self) -> String {
        // writing into a Vec cannot fail
        STANDARD.encode(borsh::to_vec(self).unwrap_or_default())
    }

    pub fn decode(encoded: &str) -> Result<Self, ApiError> {
        let bytes = STANDARD.decode(encoded).map_err(|e| ErrorKind::InvalidTransaction.with(e))?;
        let txn: Self =
            borsh::from_slice(&bytes).map_err(|e| ErrorKind::InvalidTransaction.with(e))?;
        if txn.input_parents.len() != txn.transaction.inputs.len() {
            return Err(ErrorKind::InvalidTransaction.with(format!(
                "{} inputs but {} input parents",
                txn.transaction.inputs.len(),
                txn.input_parents.len()
            )));
        }
        Ok(txn)
    }
}

/// Address of the standard single-signature template for an ed25519 key.
pub fn derive_address(key: &PublicKey) -> Result<Address, ApiError> {
    if key.curve_type != CurveType::Edwards25519 {
        return Err(ErrorKind::UnsupportedCurve.err());
    }
    let bytes = decode_public_key(&key.hex_bytes)?;
    Ok(UnlockConditions::standard(bytes).unlock_hash())
}

fn decode_public_key(hex_key: &str) -> Result<Vec<u8>, ApiError> {
    let bytes = hex::decode(hex_key).map_err(|e| ErrorKind::InvalidPublicKey.with(e))?;
    if bytes.len() != ED25519_KEY_LEN {
        return Err(ErrorKind::InvalidPublicKey
            .with(format!("expected {ED25519_KEY_LEN} bytes, got {}", bytes.len())));
    }
    Ok(bytes)
}

fn op_address(op: &Operation) -> Result<Address, ApiError> {
    let account = op
        .account
        .as_ref()
        .ok_or_else(|| ErrorKind::InvalidOperation.with("operation has no account"))?;
    account.address.parse().map_err(|e| ErrorKind::InvalidAddress.with(e))
}

/// Build the unsigned transaction and one signing payload per input.
/// Digests are computed only after every input and output is in place.
pub fn build_payloads(ops: &[Operation]) -> Result<ConstructionPayloadsResponse, ApiError> {
    let mut txn = Transaction::default();
    let mut input_parents = Vec::new();
    let mut signer_addresses = Vec::new();
    let mut spent = HashSet::new();

    for op in ops {
        let amount = op
            .amount
            .as_ref()
            .ok_or_else(|| ErrorKind::InvalidOperation.with("operation has no amount"))?;
        let (debit, value) = convert::parse_amount(&amount.value)?;
        let expected_kind = if debit { OP_DEBIT } else { OP_CREDIT };
        if op.kind != expected_kind {
            return Err(ErrorKind::InvalidOperation
                .with(format!("{} operation with amount {}", op.kind, amount.value)));
        }
        let address = op_address(op)?;

        if !debit {
            txn.outputs.push(Output { value, address });
            continue;
        }

        let coin = op
            .coin_change
            .as_ref()
            .ok_or_else(|| ErrorKind::InvalidOperation.with("debit has no coin_change"))?;
        let parent_id: OutputId = coin
            .coin_identifier
            .identifier
            .parse()
            .map_err(|e| ErrorKind::InvalidOperation.with(e))?;
        if !spent.insert(parent_id) {
            return Err(ErrorKind::InvalidOperation.with(format!("duplicate input {parent_id}")));
        }
        let key_hex = op
            .metadata
            .as_ref()
            .and_then(|m| m.get("public_key"))
            .and_then(Value::as_str)
            .ok_or_else(|| ErrorKind::InvalidPublicKey.with("debit has no metadata.public_key"))?;
        let unlock_conditions = UnlockConditions::standard(decode_public_key(key_hex)?);
        if unlock_conditions.unlock_hash() != address {
            return Err(ErrorKind::InvalidPublicKey
                .with(format!("public key does not unlock {address}")));
        }

        txn.inputs.push(TransactionInput { parent_id, unlock_conditions });
        txn.signatures.push(TransactionSignature {
            parent_id,
            public_key_index: 0,
            timelock: 0,
            covered_fields: CoveredFields::whole(),
            signature: Vec::new(),
        });
        input_parents.push(Output { value, address });
        signer_addresses.push(address);
    }

    let mut payloads = Vec::with_capacity(signer_addresses.len());
    for (i, address) in signer_addresses.iter().enumerate() {
        let digest = txn
            .sig_hash(i)
            .ok_or_else(|| ErrorKind::InvalidTransaction.with("signature slot out of range"))?;
        payloads.push(SigningPayload {
            address: address.to_string(),
            hex_bytes: hex::encode(digest),
            signature_type: SignatureType::Ed25519,
        });
    }

    let unsigned = ConstructionTxn { transaction: txn, input_parents };
    debug!(
        inputs = unsigned.transaction.inputs.len(),
        outputs = unsigned.transaction.outputs.len(),
        "built unsigned transaction"
    );
    Ok(ConstructionPayloadsResponse { unsigned_transaction: unsigned.encode(), payloads })
}

/// Place each signature in the slot whose digest it declares. Signatures
/// matching no slot are dropped.
pub fn combine_signatures(unsigned: &str, signatures: &[Signature]) -> Result<String, ApiError> {
    let mut ctxn = ConstructionTxn::decode(unsigned)?;
    let txn = &mut ctxn.transaction;
    let digests: Vec<Option<[u8; 32]>> = (0..txn.signatures.len()).map(|i| txn.sig_hash(i)).collect();

    for sig in signatures {
        let declared = hex::decode(&sig.signing_payload.hex_bytes)
            .map_err(|e| ErrorKind::InvalidTransaction.with(e))?;
        let bytes =
            hex::decode(&sig.hex_bytes).map_err(|e| ErrorKind::InvalidTransaction.with(e))?;
        match digests.iter().position(|d| matches!(d, Some(d) if d[..] == declared[..])) {
            Some(slot) => txn.signatures[slot].signature = bytes,
            None => warn!(payload = %sig.signing_payload.hex_bytes, "signature matches no input; dropped"),
        }
    }
    Ok(ctxn.encode())
}

/// Decode into operations and the public keys of present signatures. When
/// `index` is given, embedded input parents the index knows must agree
/// with it.
pub fn parse_transaction(
    encoded: &str,
    index: Option<&impl KvRead>,
) -> Result<ConstructionParseResponse, ApiError> {
    let ctxn = ConstructionTxn::decode(encoded)?;
    let txn = &ctxn.transaction;

    if let Some(r) = index {
        for (input, parent) in txn.inputs.iter().zip(&ctxn.input_parents) {
            if let Some(rec) = utxo::get_output(r, &input.parent_id)? {
                if rec.address != parent.address || rec.value != parent.value {
                    return Err(ErrorKind::InvalidTransaction.with(format!(
                        "input {} is owned by {} with value {}",
                        input.parent_id, rec.address, rec.value
                    )));
                }
            }
        }
    }

    let mut operations = Vec::with_capacity(txn.inputs.len() + txn.outputs.len());
    for (input, parent) in txn.inputs.iter().zip(&ctxn.input_parents) {
        let mut op =
            convert::transfer_op(operations.len(), &parent.address, parent.value, &input.parent_id, false);
        if let Some(key) = input.unlock_conditions.public_keys.first() {
            op.metadata = Some(json!({ "public_key": hex::encode(&key.key) }));
        }
        op.status = None;
        operations.push(op);
    }
    for (i, output) in txn.outputs.iter().enumerate() {
        let id = txn.output_id(i as u64);
        let mut op = convert::transfer_op(operations.len(), &output.address, output.value, &id, true);
        op.status = None;
        operations.push(op);
    }

    let signers = txn
        .signatures
        .iter()
        .filter(|s| !s.signature.is_empty())
        .filter_map(|s| {
            let input = txn.inputs.iter().find(|i| i.parent_id == s.parent_id)?;
            let key = input.unlock_conditions.public_keys.get(s.public_key_index as usize)?;
            Some(hex::encode(&key.key))
        })
        .collect();

    Ok(ConstructionParseResponse { operations, signers })
}

pub fn transaction_hash(encoded: &str) -> Result<TransactionId, ApiError> {
    Ok(ConstructionTxn::decode(encoded)?.transaction.id())
}

impl IndexerService {
    pub fn construction_derive(
        &self,
        req: &ConstructionDeriveRequest,
    ) -> Result<ConstructionDeriveResponse, ApiError> {
        self.check_network(&req.network_identifier)?;
        let address = derive_address(&req.public_key)?.to_string();
        Ok(ConstructionDeriveResponse {
            account_identifier: AccountIdentifier { address: address.clone() },
            address,
        })
    }

    pub fn construction_preprocess(
        &self,
        req: &ConstructionPreprocessRequest,
    ) -> Result<ConstructionPreprocessResponse, ApiError> {
        self.check_network(&req.network_identifier)?;
        Ok(ConstructionPreprocessResponse::default())
    }

    pub fn construction_metadata(
        &self,
        req: &ConstructionMetadataRequest,
    ) -> Result<ConstructionMetadataResponse, ApiError> {
        self.check_network(&req.network_identifier)?;
        Ok(ConstructionMetadataResponse { metadata: json!({}) })
    }

    pub fn construction_payloads(
        &self,
        req: &ConstructionPayloadsRequest,
    ) -> Result<ConstructionPayloadsResponse, ApiError> {
        self.check_network(&req.network_identifier)?;
        build_payloads(&req.operations)
    }

    pub fn construction_combine(
        &self,
        req: &ConstructionCombineRequest,
    ) -> Result<ConstructionCombineResponse, ApiError> {
        self.check_network(&req.network_identifier)?;
        let signed_transaction = combine_signatures(&req.unsigned_transaction, &req.signatures)?;
        Ok(ConstructionCombineResponse { signed_transaction })
    }

    pub fn construction_parse(
        &self,
        req: &ConstructionParseRequest,
    ) -> Result<ConstructionParseResponse, ApiError> {
        self.check_network(&req.network_identifier)?;
        let view = self.store().read()?;
        parse_transaction(&req.transaction, Some(&view))
    }

    pub fn construction_hash(
        &self,
        req: &ConstructionSignedRequest,
    ) -> Result<TransactionIdentifierResponse, ApiError> {
        self.check_network(&req.network_identifier)?;
        let id = transaction_hash(&req.signed_transaction)?;
        Ok(TransactionIdentifierResponse {
            transaction_identifier: TransactionIdentifier { hash: id.to_string() },
        })
    }

    pub fn construction_submit(
        &self,
        req: &ConstructionSignedRequest,
    ) -> Result<TransactionIdentifierResponse, ApiError> {
        self.check_network(&req.network_identifier)?;
        let ctxn = ConstructionTxn::decode(&req.signed_transaction)?;
        let id = ctxn.transaction.id();
        self.node()
            .pool
            .accept_transaction_set(vec![ctxn.transaction])
            .map_err(|e| ErrorKind::TransactionNotAccepted.with(e))?;
        debug!(txid = %id, "submitted transaction");
        Ok(TransactionIdentifierResponse {
            transaction_identifier: TransactionIdentifier { hash: id.to_string() },
        })
    }
}
