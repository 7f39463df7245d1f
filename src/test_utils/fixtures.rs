/// Shared test fixtures: deterministic keys, addresses and signed spends.
use ed25519_dalek::{Signer, SigningKey};

use crate::types::{
    Address, CoveredFields, Currency, Output, OutputId, Transaction, TransactionInput,
    TransactionSignature, UnlockConditions,
};

/// Deterministic signing key whose seed is `n` repeated.
pub fn test_key(n: u8) -> SigningKey {
    SigningKey::from_bytes(&[n; 32])
}

pub fn public_key_bytes(key: &SigningKey) -> [u8; 32] {
    key.verifying_key().to_bytes()
}

pub fn public_key_hex(key: &SigningKey) -> String {
    hex::encode(public_key_bytes(key))
}

/// Address of the standard single-signature template for `key`.
pub fn address_for(key: &SigningKey) -> Address {
    UnlockConditions::standard(public_key_bytes(key)).unlock_hash()
}

/// Sign `message` and return the hex signature.
pub fn sign_hex(key: &SigningKey, message: &[u8]) -> String {
    hex::encode(key.sign(message).to_bytes())
}

/// Fill every signature slot whose input is unlocked by `key`.
pub fn sign_transaction(txn: &mut Transaction, key: &SigningKey) {
    let pk = public_key_bytes(key);
    for i in 0..txn.signatures.len() {
        let parent = txn.signatures[i].parent_id;
        let ours = txn.inputs.iter().any(|input| {
            input.parent_id == parent
                && input.unlock_conditions.public_keys.iter().any(|k| k.key == pk)
        });
        if !ours {
            continue;
        }
        if let Some(digest) = txn.sig_hash(i) {
            txn.signatures[i].signature = key.sign(&digest).to_bytes().to_vec();
        }
    }
}

/// A signed transaction spending one output owned by `key` into `outputs`.
pub fn spend(
    key: &SigningKey,
    parent_id: OutputId,
    outputs: &[(Address, Currency)],
) -> Transaction {
    let mut txn = Transaction {
        inputs: vec![TransactionInput {
            parent_id,
            unlock_conditions: UnlockConditions::standard(public_key_bytes(key)),
        }],
        outputs: outputs.iter().map(|(address, value)| Output { value: *value, address: *address }).collect(),
        miner_fees: Vec::new(),
        signatures: vec![TransactionSignature {
            parent_id,
            public_key_index: 0,
            timelock: 0,
            covered_fields: CoveredFields::whole(),
            signature: Vec::new(),
        }],
    };
    sign_transaction(&mut txn, key);
    txn
}
