use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use thiserror::Error;

use crate::runtime::IndexError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Unimplemented,
    Internal,
    Input,
    NotFound,
    Rejected,
}

/// The fixed error catalog. Codes are stable and advertised through
/// network options.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotImplemented,
    Database,
    InvalidAddress,
    InvalidBlockId,
    InvalidTransactionId,
    InvalidTransaction,
    UnsupportedCurve,
    UnknownBlock,
    UnknownTransaction,
    TransactionNotAccepted,
    InvalidAmount,
    InvalidPublicKey,
    InvalidOperation,
    HistoricalBalanceUnsupported,
    UnknownNetwork,
    RequestTimeout,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 16] = [
        Self::NotImplemented,
        Self::Database,
        Self::InvalidAddress,
        Self::InvalidBlockId,
        Self::InvalidTransactionId,
        Self::InvalidTransaction,
        Self::UnsupportedCurve,
        Self::UnknownBlock,
        Self::UnknownTransaction,
        Self::TransactionNotAccepted,
        Self::InvalidAmount,
        Self::InvalidPublicKey,
        Self::InvalidOperation,
        Self::HistoricalBalanceUnsupported,
        Self::UnknownNetwork,
        Self::RequestTimeout,
    ];

    pub fn code(self) -> u32 {
        match self {
            Self::NotImplemented => 0,
            Self::Database => 1,
            Self::InvalidAddress => 2,
            Self::InvalidBlockId => 3,
            Self::InvalidTransactionId => 4,
            Self::InvalidTransaction => 5,
            Self::UnsupportedCurve => 6,
            Self::UnknownBlock => 7,
            Self::UnknownTransaction => 8,
            Self::TransactionNotAccepted => 9,
            Self::InvalidAmount => 10,
            Self::InvalidPublicKey => 11,
            Self::InvalidOperation => 12,
            Self::HistoricalBalanceUnsupported => 13,
            Self::UnknownNetwork => 14,
            Self::RequestTimeout => 15,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::NotImplemented => "not implemented",
            Self::Database => "database error",
            Self::InvalidAddress => "invalid address",
            Self::InvalidBlockId => "invalid block ID",
            Self::InvalidTransactionId => "invalid transaction ID",
            Self::InvalidTransaction => "invalid transaction",
            Self::UnsupportedCurve => "unsupported curve",
            Self::UnknownBlock => "unknown block",
            Self::UnknownTransaction => "unknown transaction",
            Self::TransactionNotAccepted => "transaction not accepted",
            Self::InvalidAmount => "invalid amount",
            Self::InvalidPublicKey => "invalid public key",
            Self::InvalidOperation => "invalid operation",
            Self::HistoricalBalanceUnsupported => "historical balance lookup unsupported",
            Self::UnknownNetwork => "unknown network",
            Self::RequestTimeout => "request timeout",
        }
    }

    pub fn class(self) -> ErrorClass {
        match self {
            Self::NotImplemented | Self::HistoricalBalanceUnsupported => ErrorClass::Unimplemented,
            Self::Database | Self::RequestTimeout => ErrorClass::Internal,
            Self::UnknownBlock | Self::UnknownTransaction => ErrorClass::NotFound,
            Self::TransactionNotAccepted => ErrorClass::Rejected,
            _ => ErrorClass::Input,
        }
    }

    pub fn retriable(self) -> bool {
        matches!(
            self,
            Self::UnknownBlock
                | Self::UnknownTransaction
                | Self::TransactionNotAccepted
                | Self::RequestTimeout
        )
    }

    pub fn err(self) -> ApiError {
        ApiError {
            code: self.code(),
            message: self.message().to_string(),
            retriable: self.retriable(),
            details: None,
        }
    }

    /// Advertised form: the bare error with its class under `details.class`.
    pub fn catalog_entry(self) -> ApiError {
        ApiError { details: Some(json!({ "class": self.class() })), ..self.err() }
    }

    /// Catalog entry with the underlying cause attached as context.
    pub fn with(self, cause: impl fmt::Display) -> ApiError {
        ApiError { details: Some(json!({ "error": cause.to_string() })), ..self.err() }
    }
}

#[derive(Clone, Debug, PartialEq, Error, Serialize, Deserialize)]
#[error("{message} (code {code})")]
pub struct ApiError {
    pub code: u32,
    pub message: String,
    pub retriable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ApiError {
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.code == kind.code()
    }
}

impl From<ErrorKind> for ApiError {
    fn from(kind: ErrorKind) -> Self {
        kind.err()
    }
}

impl From<IndexError> for ApiError {
    fn from(e: IndexError) -> Self {
        ErrorKind::Database.with(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn codes_are_dense_and_unique() {
        let codes: HashSet<u32> = ErrorKind::ALL.iter().map(|k| k.code()).collect();
        assert_eq!(codes.len(), ErrorKind::ALL.len());
        for (i, kind) in ErrorKind::ALL.iter().enumerate() {
            assert_eq!(kind.code() as usize, i);
        }
    }

    #[test]
    fn only_not_found_rejection_and_timeout_retry() {
        for kind in ErrorKind::ALL {
            let expected = matches!(kind.class(), ErrorClass::NotFound | ErrorClass::Rejected)
                || kind == ErrorKind::RequestTimeout;
            assert_eq!(kind.retriable(), expected, "{kind:?}");
        }
    }

    #[test]
    fn details_are_omitted_when_absent() {
        let v = serde_json::to_value(ErrorKind::UnknownBlock.err()).unwrap();
        assert_eq!(v, json!({"code": 7, "message": "unknown block", "retriable": true}));
        let v = serde_json::to_value(ErrorKind::InvalidAddress.with("bad checksum")).unwrap();
        assert_eq!(v["details"]["error"], "bad checksum");
    }

    #[test]
    fn catalog_entries_carry_their_class() {
        let v = serde_json::to_value(ErrorKind::UnknownTransaction.catalog_entry()).unwrap();
        assert_eq!(v["code"], 8);
        assert_eq!(v["details"]["class"], "not_found");
        let v = serde_json::to_value(ErrorKind::HistoricalBalanceUnsupported.catalog_entry()).unwrap();
        assert_eq!(v["details"]["class"], "unimplemented");
        assert!(ErrorKind::InvalidAddress.catalog_entry().is(ErrorKind::InvalidAddress));
    }
}
