use borsh::{BorshDeserialize, BorshSerialize};

use super::{Address, Currency, HashWriter, OutputId, TransactionId, UnlockConditions};

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Output {
    pub value: Currency,
    pub address: Address,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TransactionInput {
    pub parent_id: OutputId,
    pub unlock_conditions: UnlockConditions,
}

/// Which parts of a transaction a signature commits to.
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CoveredFields {
    pub whole_transaction: bool,
    pub inputs: Vec<u64>,
    pub outputs: Vec<u64>,
    pub miner_fees: Vec<u64>,
}

impl CoveredFields {
    pub fn whole() -> Self {
        Self { whole_transaction: true, ..Self::default() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TransactionSignature {
    pub parent_id: OutputId,
    pub public_key_index: u64,
    pub timelock: u64,
    pub covered_fields: CoveredFields,
    /// Empty until the slot is filled by combine.
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Transaction {
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<Output>,
    pub miner_fees: Vec<Currency>,
    pub signatures: Vec<TransactionSignature>,
}

impl Transaction {
    /// Content hash over everything except signatures, so it is stable
    /// across signing.
    pub fn id(&self) -> TransactionId {
        TransactionId(
            HashWriter::new(b"transaction")
                .put(&self.inputs)
                .put(&self.outputs)
                .put(&self.miner_fees)
                .finish(),
        )
    }

    pub fn output_id(&self, index: u64) -> OutputId {
        OutputId(HashWriter::new(b"siacoin output").put(&self.id()).put(&index).finish())
    }

    /// Digest the signature at `index` attests to; `None` when there is no
    /// such slot.
    pub fn sig_hash(&self, index: usize) -> Option<[u8; 32]> {
        let sig = self.signatures.get(index)?;
        let mut w = HashWriter::new(b"sighash");
        let cf = &sig.covered_fields;
        if cf.whole_transaction {
            w.put(&self.inputs).put(&self.outputs).put(&self.miner_fees);
        } else {
            for i in &cf.inputs {
                w.put(self.inputs.get(*i as usize)?);
            }
            for i in &cf.outputs {
                w.put(self.outputs.get(*i as usize)?);
            }
            for i in &cf.miner_fees {
                w.put(self.miner_fees.get(*i as usize)?);
            }
        }
        w.put(&sig.parent_id).put(&sig.public_key_index).put(&sig.timelock);
        Some(w.finish())
    }

    pub fn total_output_value(&self) -> Option<Currency> {
        Currency::sum(self.outputs.iter().map(|o| &o.value).chain(self.miner_fees.iter()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Transaction {
        let uc = UnlockConditions::standard([4u8; 32]);
        Transaction {
            inputs: vec![TransactionInput { parent_id: OutputId([1u8; 32]), unlock_conditions: uc }],
            outputs: vec![Output { value: Currency::from(5), address: Address::VOID }],
            miner_fees: vec![],
            signatures: vec![TransactionSignature {
                parent_id: OutputId([1u8; 32]),
                public_key_index: 0,
                timelock: 0,
                covered_fields: CoveredFields::whole(),
                signature: vec![],
            }],
        }
    }

    #[test]
    fn id_ignores_signatures() {
        let unsigned = sample();
        let mut signed = unsigned.clone();
        signed.signatures[0].signature = vec![0xAB; 64];
        assert_eq!(unsigned.id(), signed.id());
        assert_eq!(unsigned.sig_hash(0), signed.sig_hash(0));
    }

    #[test]
    fn sig_hash_commits_to_outputs() {
        let a = sample();
        let mut b = sample();
        b.outputs[0].value = Currency::from(6);
        assert_ne!(a.sig_hash(0), b.sig_hash(0));
        assert_eq!(a.sig_hash(1), None);
    }

    #[test]
    fn output_ids_are_positional() {
        let t = sample();
        assert_ne!(t.output_id(0), t.output_id(1));
        assert_eq!(t.output_id(0), sample().output_id(0));
    }
}
