//! Turning chain data into Rosetta operations.
//!
//! Every transaction becomes its debits (one per spent input, owner and
//! value taken from the index) followed by its credits (one per created
//! output), indexed from zero.

use serde_json::json;
use thiserror::Error;

use super::errors::{ApiError, ErrorKind};
use super::models::{self, AccountIdentifier, Amount, CoinAction, CoinChange, CoinIdentifier};
use crate::runtime::{IndexError, KvRead, utxo};
use crate::types::{Address, Currency, OutputId, Transaction};

pub const SYMBOL: &str = "SC";
pub const DECIMALS: u32 = 24;

pub const OP_DEBIT: &str = "Debit";
pub const OP_CREDIT: &str = "Credit";
pub const STATUS_APPLIED: &str = "Applied";

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("input {0} is not indexed")]
    UnknownInput(OutputId),
}

pub fn currency() -> models::Currency {
    models::Currency { symbol: SYMBOL.to_string(), decimals: DECIMALS }
}

/// Debits render with a leading minus.
pub fn amount(value: Currency, credit: bool) -> Amount {
    let value = if credit { value.to_string() } else { format!("-{value}") };
    Amount { value, currency: currency() }
}

/// Split a signed amount string into (is_debit, magnitude).
pub fn parse_amount(s: &str) -> Result<(bool, Currency), ApiError> {
    let (debit, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let value = digits.parse::<Currency>().map_err(|e| ErrorKind::InvalidAmount.with(e))?;
    Ok((debit, value))
}

pub fn transfer_op(
    index: usize,
    address: &Address,
    value: Currency,
    id: &OutputId,
    credit: bool,
) -> models::Operation {
    let (kind, action) =
        if credit { (OP_CREDIT, CoinAction::CoinCreated) } else { (OP_DEBIT, CoinAction::CoinSpent) };
    models::Operation {
        operation_identifier: models::OperationIdentifier { index: index as i64 },
        kind: kind.to_string(),
        status: Some(STATUS_APPLIED.to_string()),
        account: Some(AccountIdentifier { address: address.to_string() }),
        amount: Some(amount(value, credit)),
        coin_change: Some(CoinChange {
            coin_identifier: CoinIdentifier { identifier: id.to_string() },
            coin_action: action,
        }),
        metadata: None,
    }
}

/// Convert a confirmed or pending transaction, resolving each input against
/// the index.
pub fn convert_transaction(
    r: &impl KvRead,
    txn: &Transaction,
) -> Result<models::Transaction, ConvertError> {
    let mut ops = Vec::with_capacity(txn.inputs.len() + txn.outputs.len());
    for input in &txn.inputs {
        let rec = utxo::get_output(r, &input.parent_id)?
            .ok_or(ConvertError::UnknownInput(input.parent_id))?;
        ops.push(transfer_op(ops.len(), &rec.address, rec.value, &input.parent_id, false));
    }
    for (i, output) in txn.outputs.iter().enumerate() {
        let id = txn.output_id(i as u64);
        ops.push(transfer_op(ops.len(), &output.address, output.value, &id, true));
    }
    Ok(models::Transaction {
        transaction_identifier: models::TransactionIdentifier { hash: txn.id().to_string() },
        operations: ops,
    })
}

/// Payout credit carrying its maturity height.
pub fn payout_op(
    index: usize,
    address: &Address,
    value: Currency,
    id: &OutputId,
    maturity_height: u64,
) -> models::Operation {
    let mut op = transfer_op(index, address, value, id, true);
    op.metadata = Some(json!({ "timelock": maturity_height }));
    op
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_carry_sign_and_currency() {
        let a = amount(Currency::from(5), false);
        assert_eq!(a.value, "-5");
        assert_eq!(a.currency.symbol, "SC");
        assert_eq!(a.currency.decimals, 24);
        assert_eq!(parse_amount("-5").unwrap(), (true, Currency::from(5)));
        assert_eq!(parse_amount("12").unwrap(), (false, Currency::from(12)));
        assert!(parse_amount("1.5").unwrap_err().is(ErrorKind::InvalidAmount));
        assert!(parse_amount("--1").is_err());
    }

    #[test]
    fn operation_serializes_with_rosetta_names() {
        let op = transfer_op(3, &Address::VOID, Currency::from(1), &OutputId([2; 32]), false);
        let v = serde_json::to_value(&op).unwrap();
        assert_eq!(v["operation_identifier"]["index"], 3);
        assert_eq!(v["type"], "Debit");
        assert_eq!(v["status"], "Applied");
        assert_eq!(v["coin_change"]["coin_action"], "coin_spent");
        assert!(v.get("metadata").is_none());
    }
}
